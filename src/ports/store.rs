use std::future::Future;
use std::pin::Pin;

use crate::types::push::{PushSubscription, StoredSubscription, VapidKeyRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence for `push_subscriptions` rows and the single `vapid_keys` row.
pub trait SubscriptionStore: Clone + Send + Sync + 'static {
    fn subscriptions_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> StoreFuture<'a, Vec<StoredSubscription>>;

    /// Upserts by endpoint; a re-registered endpoint moves to the new owner.
    fn save_subscription<'a>(
        &'a self,
        user_id: &'a str,
        subscription: PushSubscription,
    ) -> StoreFuture<'a, StoredSubscription>;

    /// Returns whether a row was removed. Unknown ids are not an error.
    fn delete_subscription<'a>(&'a self, id: &'a str) -> StoreFuture<'a, bool>;

    fn delete_by_endpoint<'a>(
        &'a self,
        user_id: &'a str,
        endpoint: &'a str,
    ) -> StoreFuture<'a, bool>;

    fn vapid_keys(&self) -> StoreFuture<'_, Option<VapidKeyRecord>>;

    fn put_vapid_keys(&self, keys: VapidKeyRecord) -> StoreFuture<'_, ()>;
}
