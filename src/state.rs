use crate::adapters::LocalStore;
use crate::config::AppConfig;
use crate::push;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: LocalStore,
    pub dispatcher: Arc<push::AppDispatcher>,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to open subscription store: {0}")]
    Store(#[from] crate::ports::StoreError),
    #[error(transparent)]
    Setup(#[from] push::SetupError),
}

impl AppState {
    pub async fn from_config(config: AppConfig) -> Result<Self, StateError> {
        let store = match config.store_path.as_ref() {
            Some(path) => LocalStore::open(path).await?,
            None => LocalStore::in_memory(),
        };
        let dispatcher = push::dispatcher_from_config(&config, store.clone())?;
        Ok(Self {
            config,
            store,
            dispatcher: Arc::new(dispatcher),
        })
    }
}
