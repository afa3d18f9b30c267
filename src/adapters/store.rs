use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::ports::{StoreError, StoreFuture, SubscriptionStore};
use crate::types::push::{PushSubscription, StoredSubscription, VapidKeyRecord};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    push_subscriptions: Vec<StoredSubscription>,
    #[serde(default)]
    vapid_keys: Option<VapidKeyRecord>,
}

/// Subscription store kept in memory, optionally mirrored to a JSON file.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: Option<Arc<PathBuf>>,
    state: Arc<Mutex<StoreFile>>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(Mutex::new(StoreFile::default())),
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => StoreFile::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: Some(Arc::new(path)),
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Applies `change` to a copy and only commits it once the file write succeeded.
    async fn update<R>(&self, change: impl FnOnce(&mut StoreFile) -> R) -> Result<R, StoreError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let result = change(&mut next);
        if let Some(path) = self.path.as_deref() {
            let json = serde_json::to_vec_pretty(&next)?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, path).await?;
        }
        *guard = next;
        Ok(result)
    }
}

impl SubscriptionStore for LocalStore {
    fn subscriptions_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> StoreFuture<'a, Vec<StoredSubscription>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .push_subscriptions
                .iter()
                .filter(|stored| stored.user_id == user_id)
                .cloned()
                .collect())
        })
    }

    fn save_subscription<'a>(
        &'a self,
        user_id: &'a str,
        subscription: PushSubscription,
    ) -> StoreFuture<'a, StoredSubscription> {
        Box::pin(async move {
            self.update(|state| {
                if let Some(existing) = state
                    .push_subscriptions
                    .iter_mut()
                    .find(|stored| stored.subscription.endpoint == subscription.endpoint)
                {
                    existing.user_id = user_id.to_string();
                    existing.subscription = subscription;
                    return existing.clone();
                }
                let stored = StoredSubscription {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    subscription,
                    created_at: OffsetDateTime::now_utc(),
                };
                state.push_subscriptions.push(stored.clone());
                stored
            })
            .await
        })
    }

    fn delete_subscription<'a>(&'a self, id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.update(|state| {
                let before = state.push_subscriptions.len();
                state.push_subscriptions.retain(|stored| stored.id != id);
                state.push_subscriptions.len() != before
            })
            .await
        })
    }

    fn delete_by_endpoint<'a>(
        &'a self,
        user_id: &'a str,
        endpoint: &'a str,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.update(|state| {
                let before = state.push_subscriptions.len();
                state.push_subscriptions.retain(|stored| {
                    stored.user_id != user_id || stored.subscription.endpoint != endpoint
                });
                state.push_subscriptions.len() != before
            })
            .await
        })
    }

    fn vapid_keys(&self) -> StoreFuture<'_, Option<VapidKeyRecord>> {
        Box::pin(async move { Ok(self.state.lock().await.vapid_keys.clone()) })
    }

    fn put_vapid_keys(&self, keys: VapidKeyRecord) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.update(|state| {
                state.vapid_keys = Some(keys);
            })
            .await
        })
    }
}
