use anyhow::{Context, Result};
use cmdstream_core::config::CoreConfig;
use cmdstream_logger::LogConfig;
use serde::Deserialize;
use std::collections::HashMap;

/// The top-level configuration for the cmdstream gateway application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub gateway: GatewaySpecificConfig,
}

/// Contains settings that are unique to the gateway binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GatewaySpecificConfig {
    pub grpc: GrpcConfig,
    pub bridge: BridgeConfig,
    /// How often pending completions are checked for leaks, in seconds.
    pub janitor_interval_secs: u64,
    /// Peers hosted by other gateways: `client_id -> "http://host:port"`.
    pub peers: HashMap<String, String>,
    /// Logging configuration.
    pub log: LogConfig,
}

/// gRPC server connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GrpcConfig {
    pub host: String,
    pub port: u16,
}

/// Settings for RPCs issued to other gateways on behalf of local callers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BridgeConfig {
    /// Lower bound of the client-side deadline of `ExecuteCommandSync`, in seconds.
    pub rpc_timeout_floor_secs: u64,
    /// Connection establishment timeout, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for GatewaySpecificConfig {
    fn default() -> Self {
        Self {
            grpc: GrpcConfig::default(),
            bridge: BridgeConfig::default(),
            janitor_interval_secs: 60,
            peers: HashMap::new(),
            log: LogConfig::default(),
        }
    }
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_floor_secs: 20,
            connect_timeout_secs: 5,
        }
    }
}

/// Loads the gateway configuration from a specified TOML file.
///
/// Values can be overridden with `CMDSTREAM__`-prefixed environment variables,
/// e.g. `CMDSTREAM__GATEWAY__GRPC__PORT=50052`.
pub fn load_config(path: &str) -> Result<GatewayConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("CMDSTREAM").separator("__"));

    let settings: GatewayConfig = builder
        .build()
        .context(format!("Failed to build configuration from '{}'", path))?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(settings)
}
