//! Process-wide `tracing` setup shared by the cmdstream binaries.
mod logging;

pub use logging::{init, LogConfig, LogFormat, LogOutput};
