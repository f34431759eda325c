use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How much the process reports. `All` is the startup default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticsLevel {
    Error,
    Warn,
    Info,
    Debug,
    #[default]
    All,
}

impl DiagnosticsLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            DiagnosticsLevel::Error => "error",
            DiagnosticsLevel::Warn => "warn",
            DiagnosticsLevel::Info => "info",
            DiagnosticsLevel::Debug => "debug",
            DiagnosticsLevel::All => "trace",
        }
    }

    /// Raises the level to at least `Debug`.
    pub fn verbose(self) -> Self {
        self.max(DiagnosticsLevel::Debug)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn build_filter(level: DiagnosticsLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

// stdout carries the CGI response, so every layer writes to stderr.
pub fn init_logger(level: DiagnosticsLevel, format: LogFormat) {
    let filter = build_filter(level);

    match format {
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .json(),
                )
                .init();
        }
    }
}
