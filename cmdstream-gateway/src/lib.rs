pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod grpc;

use anyhow::Result;
use bridge::SyncRpcBridge;
use clap::Parser;
use cli::{Cli, CommandKind, Commands, SendCmd};
use cmdstream_core::{
    command::{Pause, Ping, RequestStatus, Resume, Resync},
    CommandBuilder, CommandEnvelope, StreamingCommandClient,
};
use config::{load_config, GatewayConfig};
use std::{sync::Arc, time::Duration};
use tokio::signal;

/// The main entry point for running the gateway application logic.
/// This function handles CLI parsing, configuration, and service startup.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(run_cmd) => {
            let config = load_config_from_cli(run_cmd)?;
            cmdstream_logger::init(&config.gateway.log)?;
            tracing::info!("Configuration loaded: {:#?}", &config);
            run_server(config).await
        }
        Commands::Send(send_cmd) => run_send(send_cmd).await,
    }
}

/// Loads the gateway configuration based on the provided CLI command.
fn load_config_from_cli(run_cmd: cli::RunCmd) -> Result<GatewayConfig> {
    if let Some(config_path) = run_cmd.config {
        println!("Loading configuration from '{}'", &config_path);
        load_config(&config_path)
    } else {
        println!("No config file provided, using default settings.");
        Ok(GatewayConfig::default())
    }
}

/// Starts the gRPC server and handles graceful shutdown.
async fn run_server(config: GatewayConfig) -> Result<()> {
    let handle = grpc::start(&config).await?;

    match signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            handle.stop();
            tracing::info!("Shutdown complete.");
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to listen for shutdown signal.");
        }
    }
    Ok(())
}

/// Builds the envelope requested on the command line.
pub fn envelope_for(cmd: &SendCmd) -> CommandEnvelope {
    let builder = CommandBuilder::create();
    match cmd.command {
        CommandKind::Pause => builder.with_payload(Pause),
        CommandKind::Resume => builder.with_payload(Resume),
        CommandKind::Ping => builder.with_payload(Ping { nonce: cmd.nonce }),
        CommandKind::Resync => builder.with_payload(Resync {
            scope: cmd.scope.clone(),
        }),
        CommandKind::Status => builder.with_payload(RequestStatus),
    }
}

/// Sends one command to a peer through the gateway at `cmd.address`.
async fn run_send(cmd: SendCmd) -> Result<()> {
    let bridge = Arc::new(SyncRpcBridge::new(config::BridgeConfig::default()));
    let client = StreamingCommandClient::cross_process(cmd.client_id.clone(), cmd.address.clone(), bridge);
    let envelope = envelope_for(&cmd);
    let command_id = envelope.command_id().clone();

    if !cmd.wait {
        if client.send(envelope).await {
            println!("Command {} queued for '{}'.", command_id, cmd.client_id);
            return Ok(());
        }
        anyhow::bail!("Client '{}' is not attached to {}", cmd.client_id, cmd.address);
    }

    let ack = client
        .send_and_wait(envelope, Duration::from_millis(cmd.timeout_ms))
        .await?;
    match (ack.success, ack.error.as_deref()) {
        (true, _) => println!("Command {} succeeded: {}", ack.command_id, ack.message),
        (false, code) => println!(
            "Command {} was rejected ({}): {}",
            ack.command_id,
            code.unwrap_or("no code"),
            ack.message
        ),
    }
    Ok(())
}
