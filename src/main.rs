use action_dispatch::adapters::cgi;
use action_dispatch::app::bootstrap::{self, Collaborators};
use action_dispatch::config::toml_config::DiagnosticsConfig;
use action_dispatch::utils::validation::Validate;
use action_dispatch::{ActionDispatcher, CliConfig, DispatchError, ServiceConfig};
use anyhow::Context;
use clap::Parser;

async fn fail(err: DispatchError) -> DispatchError {
    tracing::error!(
        "❌ request failed: {} (Category: {:?}, Severity: {:?})",
        err,
        err.category(),
        err.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", err.recovery_suggestion());

    if let Err(write_err) = cgi::write_response(&bootstrap::failure_response(&err)).await {
        tracing::error!("could not write error response: {}", write_err);
    }
    err
}

fn load_config(cli: &CliConfig) -> action_dispatch::Result<ServiceConfig> {
    let config = cli.service_config()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            // 配置無法載入時仍以預設診斷層級回報
            bootstrap::init_diagnostics(&DiagnosticsConfig::default());
            return Err(fail(e).await).context("failed to load configuration");
        }
    };

    let served = bootstrap::serve(
        &config,
        |diagnostics| {
            bootstrap::init_diagnostics(diagnostics);
            tracing::debug!("CLI config: {:?}", cli);
        },
        cgi::read_request(config.request.max_body_bytes),
        Collaborators::from_config,
        ActionDispatcher::new,
    )
    .await;

    let response = match served {
        Ok(response) => response,
        Err(e) => return Err(fail(e).await).context("failed to serve request"),
    };

    cgi::write_response(&response)
        .await
        .context("failed to write response")?;
    Ok(())
}
