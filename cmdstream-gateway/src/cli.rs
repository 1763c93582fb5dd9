use clap::{Parser, Subcommand, ValueEnum};

/// The main CLI structure for the cmdstream gateway.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Defines the available subcommands for the application.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway service.
    /// This starts the gRPC server that hosts peer streams.
    Run(RunCmd),
    /// Send one command to a peer through the gateway that hosts it.
    Send(SendCmd),
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to the gateway configuration TOML file.
    /// If not provided, default values will be used.
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Arguments for the `send` subcommand.
#[derive(Parser, Debug)]
pub struct SendCmd {
    /// Address of the gateway hosting the peer, e.g. `http://127.0.0.1:50051`.
    #[arg(short, long)]
    pub address: String,

    /// Identifier of the target peer.
    #[arg(long)]
    pub client_id: String,

    /// The command to send.
    #[arg(value_enum)]
    pub command: CommandKind,

    /// Scope for `resync`; omitted means everything.
    #[arg(long)]
    pub scope: Option<String>,

    /// Nonce for `ping`.
    #[arg(long, default_value_t = 0)]
    pub nonce: u64,

    /// Wait for the peer's acknowledgment instead of fire-and-forget.
    #[arg(short, long)]
    pub wait: bool,

    /// How long to wait for the acknowledgment, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub timeout_ms: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Pause,
    Resume,
    Ping,
    Resync,
    Status,
}
