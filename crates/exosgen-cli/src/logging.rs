use std::io::IsTerminal;

use clap::ValueEnum;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding a filter directive; wins over `--log-level`.
pub const LOG_ENV: &str = "EXOSGEN_LOG";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Installs the stderr subscriber. Stdout stays reserved for command output.
pub fn init(level: LogLevel, format: LogFormat) {
    let use_ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.directive()));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    match format {
        LogFormat::Json => {
            let subscriber = builder.with_ansi(false).json().finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogFormat::Text => {
            let subscriber = builder.with_ansi(use_ansi).compact().finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}
