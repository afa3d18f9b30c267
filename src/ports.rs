pub mod push;
pub mod store;
pub mod time;

pub use push::{PushRequest, PushResponse, PushTransport};
pub use store::{StoreError, StoreFuture, SubscriptionStore};
pub use self::time::TimeProvider;
