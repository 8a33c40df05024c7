use anyhow::Result;
use selfdns::{Config, SelfDnsProvider, SharedConfig};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let config = config_init(std::env::args().nth(1))?;
    tracing::info!(
        "serving challenges as \"{}\" on {}",
        config.server_hostname(),
        config.dns_bind_addr()
    );
    let provider = Arc::new(SelfDnsProvider::new(config.clone()));

    tracing::info!("API listening on {}", &config.api_bind_addr);
    let api_server = selfdns::api::new(config.clone(), provider.clone())?;
    let api_handle = tokio::spawn(api_server);

    let outcome = tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
            Ok(())
        },
        joined = api_handle => api_exit(joined),
    };

    // Leave nothing bound on port 53, whichever way we're exiting.
    provider.shutdown().await?;
    tracing::info!("goodbye");
    outcome
}

/// The API server only returns when it fails; a panic in its task is a failure too.
fn api_exit(joined: Result<hyper::Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => {
            tracing::warn!("API server exited");
            Ok(())
        }
        Ok(Err(err)) => {
            tracing::error!("API server failed: {err}");
            Err(err.into())
        }
        Err(err) => {
            tracing::error!("API server task failed: {err}");
            Err(err.into())
        }
    }
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "selfdns=info".into()),
        )
        .init();
}

fn config_init(config_file: Option<String>) -> Result<SharedConfig> {
    let config = match config_file {
        None => {
            tracing::debug!("loading config from environment");
            Config::from_env()?
        }
        Some(config_file) => {
            tracing::debug!("loading config from {config_file}");
            Config::try_from_file(&config_file)?
        }
    };
    Ok(Arc::new(config))
}
