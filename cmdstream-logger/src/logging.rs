use anyhow::Result;
use serde::Deserialize;
use std::{fs::File, str::FromStr, sync::Arc};
use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter, Registry};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Plain,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    File,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case", default)]
pub struct LogConfig {
    /// Log level, e.g., "info", "debug", "trace". `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Path to the log file, required if output is "file".
    pub file_path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            output: LogOutput::Stdout,
            file_path: None,
        }
    }
}

/// Installs the global `tracing` subscriber described by `config`.
///
/// Fails if the log file cannot be created or a subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let log_level = Level::from_str(&config.level).unwrap_or(Level::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();
    let subscriber = Registry::default().with(filter);

    match config.output {
        LogOutput::File => {
            let file_path = config
                .file_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Log output is 'file' but 'file_path' is not specified"))?;
            let log_file = Arc::new(File::create(file_path)?);

            match config.format {
                LogFormat::Json => subscriber
                    .with(fmt::layer().with_writer(log_file).with_ansi(false).json())
                    .try_init()?,
                LogFormat::Plain => subscriber
                    .with(fmt::layer().with_writer(log_file).with_ansi(false))
                    .try_init()?,
            }
        }
        LogOutput::Stdout => match config.format {
            LogFormat::Json => subscriber
                .with(fmt::layer().with_writer(std::io::stdout).json())
                .try_init()?,
            LogFormat::Plain => subscriber
                .with(fmt::layer().with_writer(std::io::stdout).pretty())
                .try_init()?,
        },
    };

    Ok(())
}
