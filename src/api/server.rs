use crate::api::routes;
use crate::config::SharedConfig;
use crate::provider::DynProvider;
use std::future::Future;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: SharedConfig,
    pub provider: DynProvider,
}

/// Bind the API listener and return the future serving it.
///
/// # Errors
///
/// Returns a [`hyper::Error`] if [`Config::api_bind_addr`][crate::config::Config::api_bind_addr]
/// can't be bound.
pub fn new(
    config: SharedConfig,
    provider: DynProvider,
) -> hyper::Result<impl Future<Output = hyper::Result<()>>> {
    let server = axum::Server::try_bind(&config.api_bind_addr)?;
    Ok(server.serve(routes::new(AppState { config, provider }).into_make_service()))
}
