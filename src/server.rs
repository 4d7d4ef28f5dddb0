use axum::{Extension, Router, routing::get};
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::sync::Mutex;

use crate::{
    api, config,
    error::{PlayerError, Result},
    spotify::auth::SpotifyAccounts,
    types::PkceToken,
};

/// Serves the OAuth callback until the task is aborted.
pub async fn start_api_server(
    state: Arc<Mutex<Option<PkceToken>>>,
    accounts: Arc<SpotifyAccounts>,
) -> Result<()> {
    let app = Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback))
        .layer(Extension(state))
        .layer(Extension(accounts));

    let addr = SocketAddr::from_str(&config::server_addr())
        .map_err(|e| PlayerError::Config(format!("invalid SERVER_ADDRESS: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
