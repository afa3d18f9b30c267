pub mod adapters;
mod app;
pub mod codec;
pub mod config;
pub mod ports;
pub mod push;
pub mod state;
pub mod types;

use std::net::SocketAddr;
use std::path::Path;

use crate::adapters::LocalStore;
use crate::ports::SubscriptionStore;
use crate::types::push::{DispatchOutcome, VapidKeyRecord};

pub use app::app;
pub use push::{VapidCredentials, generate_vapid_credentials};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    State(#[from] state::StateError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
    #[error(transparent)]
    Store(#[from] ports::StoreError),
    #[error(transparent)]
    Dispatch(#[from] push::DispatchError),
}

pub async fn serve(config: config::AppConfig) -> Result<(), Error> {
    let addr = config.bind;
    let state = state::AppState::from_config(config).await?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::Serve)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// Delivers one notification to every subscription of `user_id` and returns.
pub async fn send_notification(
    config: config::AppConfig,
    user_id: &str,
    title: &str,
    body: &str,
    data: Option<serde_json::Value>,
) -> Result<DispatchOutcome, Error> {
    let state = state::AppState::from_config(config).await?;
    let outcome = state
        .dispatcher
        .dispatch_to_user(user_id, title, body, data)
        .await?;
    Ok(outcome)
}

/// Generates a key pair and stores it as the `vapid_keys` record of the store at `path`.
pub async fn init_vapid_keys(path: &Path) -> Result<VapidCredentials, Error> {
    let store = LocalStore::open(path).await?;
    let credentials = generate_vapid_credentials();
    store
        .put_vapid_keys(VapidKeyRecord {
            public_key: credentials.public_key.clone(),
            private_key: credentials.private_key.clone(),
        })
        .await?;
    tracing::info!(path = %path.display(), "stored VAPID keys");
    Ok(credentials)
}
