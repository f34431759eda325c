pub mod toml_config;

pub use toml_config::ServiceConfig;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "action-dispatch")]
#[command(about = "Serves one web action request and exits")]
pub struct CliConfig {
    #[arg(long, env = "ACTION_DISPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Log at debug level or above")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Loads the TOML file when one is given, defaults otherwise.
    pub fn service_config(&self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };
        if self.verbose {
            config.diagnostics.level = config.diagnostics.level.verbose();
        }
        Ok(config)
    }
}
