use std::str::FromStr;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::OnceCell;

use super::CryptoError;
use super::encrypt;
use super::vapid::{self, VapidError, VapidKeys};
use crate::ports::{PushRequest, PushTransport, StoreError, SubscriptionStore, TimeProvider};
use crate::types::push::{
    DispatchOutcome, NotificationPayload, PushSubscription, StoredSubscription,
    SubscriptionResult,
};

pub const DEFAULT_TTL_SECS: u32 = 24 * 60 * 60;
pub const DEFAULT_TOPIC: &str = "doorbell";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_ICON: &str = "/icons/icon-192.png";
pub const DEFAULT_BADGE: &str = "/icons/badge-72.png";
const MAX_TOPIC_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    VeryLow,
    Low,
    Normal,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::VeryLow => "very-low",
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "very-low" => Ok(Urgency::VeryLow),
            "low" => Ok(Urgency::Low),
            "normal" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            other => Err(format!(
                "invalid urgency '{other}'; expected very-low, low, normal or high"
            )),
        }
    }
}

/// Topics coalesce pending messages, so they must be short base64url tokens.
pub fn parse_topic(raw: &str) -> Result<Option<String>, String> {
    let topic = raw.trim();
    if topic.is_empty() {
        return Ok(None);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(format!("topic '{topic}' is longer than {MAX_TOPIC_LEN} characters"));
    }
    if !topic
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(format!("topic '{topic}' must use the base64url alphabet"));
    }
    Ok(Some(topic.to_string()))
}

#[derive(Debug, Clone)]
pub struct PushOptions {
    pub ttl_secs: u32,
    pub urgency: Urgency,
    pub topic: Option<String>,
    pub concurrency: usize,
    pub icon: String,
    pub badge: String,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            urgency: Urgency::High,
            topic: Some(DEFAULT_TOPIC.to_string()),
            concurrency: DEFAULT_CONCURRENCY,
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_BADGE.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("invalid push endpoint: {0}")]
    Endpoint(#[source] VapidError),
    #[error("invalid subscription: {0}")]
    Crypto(#[from] CryptoError),
    #[error("failed to sign VAPID assertion: {0}")]
    Vapid(#[source] VapidError),
    #[error("push request failed: {0}")]
    Transport(String),
    #[error("subscription is gone (HTTP {status})")]
    Gone { status: u16 },
    #[error("push service rejected message (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl SendError {
    /// 404/410: the push service will never accept this subscription again.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SendError::Gone { .. })
    }
}

/// Failures that abort a whole dispatch before any subscription is attempted.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] VapidError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode notification: {0}")]
    Payload(#[from] serde_json::Error),
}

pub struct Dispatcher<S, T, C> {
    store: S,
    transport: T,
    time: C,
    options: PushOptions,
    vapid_subject: String,
    vapid: OnceCell<Arc<VapidKeys>>,
}

impl<S, T, C> Dispatcher<S, T, C>
where
    S: SubscriptionStore,
    T: PushTransport,
    C: TimeProvider,
{
    pub fn new(store: S, transport: T, time: C, options: PushOptions, vapid_subject: &str) -> Self {
        Self {
            store,
            transport,
            time,
            options,
            vapid_subject: vapid_subject.to_string(),
            vapid: OnceCell::new(),
        }
    }

    /// Uses these keys instead of reading the store's `vapid_keys` row.
    pub fn with_vapid(mut self, keys: VapidKeys) -> Self {
        self.vapid = OnceCell::from(Arc::new(keys));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loaded on first use, then cached for the life of the process.
    pub async fn vapid_keys(&self) -> Result<Arc<VapidKeys>, DispatchError> {
        let keys = self
            .vapid
            .get_or_try_init(|| async {
                let record = self
                    .store
                    .vapid_keys()
                    .await?
                    .ok_or(VapidError::MissingKeys)?;
                let keys = VapidKeys::from_record(&record, &self.vapid_subject)?;
                tracing::info!(public_key = %keys.public_key_base64(), "loaded VAPID keys from store");
                Ok::<_, DispatchError>(Arc::new(keys))
            })
            .await?;
        Ok(Arc::clone(keys))
    }

    pub async fn send_to_subscription(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
        vapid: &VapidKeys,
    ) -> Result<(), SendError> {
        let audience = vapid::push_audience(&subscription.endpoint).map_err(SendError::Endpoint)?;
        let encrypted = encrypt::encrypt(payload, subscription)?;
        let assertion = vapid::create_vapid_assertion(&audience, vapid, self.time.now())
            .map_err(SendError::Vapid)?;

        let mut headers = vec![
            ("Content-Type", "application/octet-stream".to_string()),
            ("Content-Encoding", "aes128gcm".to_string()),
            ("TTL", self.options.ttl_secs.to_string()),
            ("Urgency", self.options.urgency.as_str().to_string()),
        ];
        if let Some(topic) = &self.options.topic {
            headers.push(("Topic", topic.clone()));
        }
        headers.push(("Authorization", vapid.authorization_header(&assertion)));

        let request = PushRequest {
            endpoint: subscription.endpoint.clone(),
            headers,
            body: encrypted.into_body(),
        };
        let response = self
            .transport
            .post(&request)
            .await
            .map_err(|err| SendError::Transport(err.to_string()))?;

        match response.status {
            200..=299 => Ok(()),
            404 | 410 => Err(SendError::Gone {
                status: response.status,
            }),
            status => Err(SendError::Rejected {
                status,
                body: response.body,
            }),
        }
    }

    pub async fn dispatch_to_user(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let vapid = self.vapid_keys().await?;
        let subscriptions = self.store.subscriptions_for_user(user_id).await?;
        if subscriptions.is_empty() {
            tracing::warn!(user_id, "no push subscriptions for user");
            return Ok(DispatchOutcome::from_results(Vec::new()));
        }

        let payload = serde_json::to_vec(&NotificationPayload {
            title: title.to_string(),
            body: body.to_string(),
            icon: self.options.icon.clone(),
            badge: self.options.badge.clone(),
            data: data.unwrap_or_else(|| serde_json::json!({})),
        })?;

        let deliveries: Vec<_> = subscriptions
            .iter()
            .map(|stored| self.deliver(stored, &payload, &vapid))
            .collect();
        let results: Vec<SubscriptionResult> = stream::iter(deliveries)
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        let outcome = DispatchOutcome::from_results(results);
        tracing::info!(
            user_id,
            attempted = outcome.results.len(),
            delivered = outcome.results.iter().filter(|result| result.success).count(),
            "push dispatch finished"
        );
        Ok(outcome)
    }

    async fn deliver(
        &self,
        stored: &StoredSubscription,
        payload: &[u8],
        vapid: &VapidKeys,
    ) -> SubscriptionResult {
        let endpoint = stored.subscription.endpoint.clone();
        let Err(err) = self
            .send_to_subscription(&stored.subscription, payload, vapid)
            .await
        else {
            tracing::debug!(%endpoint, "push delivered");
            return SubscriptionResult {
                endpoint,
                success: true,
                error: None,
            };
        };

        if err.is_permanent() {
            match self.store.delete_subscription(&stored.id).await {
                Ok(_) => tracing::info!(
                    %endpoint,
                    subscription_id = %stored.id,
                    error = %err,
                    "pruned stale push subscription"
                ),
                Err(delete_err) => tracing::warn!(
                    %endpoint,
                    subscription_id = %stored.id,
                    error = %delete_err,
                    "failed to prune stale push subscription"
                ),
            }
        } else {
            tracing::warn!(%endpoint, user_id = %stored.user_id, error = %err, "push delivery failed");
        }

        SubscriptionResult {
            endpoint,
            success: false,
            error: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::adapters::LocalStore;
    use crate::push::test_support::{self, FixedTime};
    use std::collections::HashMap;
    use std::pin::Pin;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct TestTransportError;

    impl std::fmt::Display for TestTransportError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("connection reset")
        }
    }

    #[derive(Clone, Default)]
    struct TestTransport {
        statuses: Arc<HashMap<String, u16>>,
        sent: Arc<Mutex<Vec<PushRequest>>>,
    }

    impl TestTransport {
        fn with_statuses(statuses: &[(&str, u16)]) -> Self {
            Self {
                statuses: Arc::new(
                    statuses
                        .iter()
                        .map(|(endpoint, status)| (endpoint.to_string(), *status))
                        .collect(),
                ),
                sent: Arc::default(),
            }
        }

        fn sent(&self) -> Vec<PushRequest> {
            self.sent.lock().expect("sent lock").clone()
        }
    }

    impl PushTransport for TestTransport {
        type Error = TestTransportError;
        type Fut<'a>
            = Pin<Box<dyn Future<Output = Result<crate::ports::PushResponse, Self::Error>> + Send + 'a>>
        where
            Self: 'a;

        fn post<'a>(&'a self, request: &'a PushRequest) -> Self::Fut<'a> {
            self.sent
                .lock()
                .expect("sent lock")
                .push(request.clone());
            let status = self.statuses.get(&request.endpoint).copied();
            Box::pin(async move {
                match status {
                    Some(status) => Ok(crate::ports::PushResponse {
                        status,
                        body: format!("status {status}"),
                    }),
                    None => Err(TestTransportError),
                }
            })
        }
    }

    fn dispatcher(
        store: LocalStore,
        transport: TestTransport,
    ) -> Dispatcher<LocalStore, TestTransport, FixedTime> {
        Dispatcher::new(
            store,
            transport,
            FixedTime::default(),
            PushOptions::default(),
            "ops@doorbell.example",
        )
        .with_vapid(test_support::vapid_keys())
    }

    #[tokio::test]
    async fn dispatch_to_user__should_report_partial_failure_and_prune_gone() {
        // Given
        let store = LocalStore::in_memory();
        let (gone, _, _) = test_support::subscriber("https://push.example/gone");
        let (alive, _, _) = test_support::subscriber("https://push.example/alive");
        store.save_subscription("user-1", gone).await.expect("save gone");
        store.save_subscription("user-1", alive).await.expect("save alive");
        let transport = TestTransport::with_statuses(&[
            ("https://push.example/gone", 410),
            ("https://push.example/alive", 200),
        ]);

        // When
        let outcome = dispatcher(store.clone(), transport.clone())
            .dispatch_to_user("user-1", "Doorbell", "Someone is at the door", None)
            .await
            .expect("dispatch");

        // Then
        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].endpoint, "https://push.example/gone");
        assert!(!outcome.results[0].success);
        assert!(outcome.results[0].error.as_deref().unwrap_or_default().contains("410"));
        assert!(outcome.results[1].success);
        let remaining = store.subscriptions_for_user("user-1").await.expect("load");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].subscription.endpoint, "https://push.example/alive");
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn dispatch_to_user__should_keep_subscriptions_on_transient_failures() {
        // Given
        let store = LocalStore::in_memory();
        let (throttled, _, _) = test_support::subscriber("https://push.example/throttled");
        let (offline, _, _) = test_support::subscriber("https://push.example/offline");
        store.save_subscription("user-1", throttled).await.expect("save");
        store.save_subscription("user-1", offline).await.expect("save");
        let transport = TestTransport::with_statuses(&[("https://push.example/throttled", 429)]);

        // When
        let outcome = dispatcher(store.clone(), transport)
            .dispatch_to_user("user-1", "Doorbell", "Ring", None)
            .await
            .expect("dispatch");

        // Then
        assert!(!outcome.success);
        assert_eq!(
            outcome.results[0].error.as_deref(),
            Some("push service rejected message (HTTP 429): status 429")
        );
        assert_eq!(
            outcome.results[1].error.as_deref(),
            Some("push request failed: connection reset")
        );
        assert_eq!(store.subscriptions_for_user("user-1").await.expect("load").len(), 2);
    }

    #[tokio::test]
    async fn dispatch_to_user__should_isolate_malformed_subscription() {
        // Given
        let store = LocalStore::in_memory();
        let (mut broken, _, _) = test_support::subscriber("https://push.example/broken");
        broken.p256dh = "dG9vLXNob3J0".to_string();
        let (valid, _, _) = test_support::subscriber("https://push.example/valid");
        store.save_subscription("user-1", broken).await.expect("save");
        store.save_subscription("user-1", valid).await.expect("save");
        let transport = TestTransport::with_statuses(&[("https://push.example/valid", 201)]);

        // When
        let outcome = dispatcher(store.clone(), transport.clone())
            .dispatch_to_user("user-1", "Doorbell", "Ring", None)
            .await
            .expect("dispatch");

        // Then
        assert!(!outcome.results[0].success);
        assert!(outcome.results[0].error.as_deref().unwrap_or_default().contains("p256dh"));
        assert!(outcome.results[1].success);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(store.subscriptions_for_user("user-1").await.expect("load").len(), 2);
    }

    #[tokio::test]
    async fn dispatch_to_user__should_fail_before_sending_without_vapid_keys() {
        // Given
        let store = LocalStore::in_memory();
        let (subscription, _, _) = test_support::subscriber("https://push.example/1");
        store.save_subscription("user-1", subscription).await.expect("save");
        let transport = TestTransport::with_statuses(&[("https://push.example/1", 201)]);
        let dispatcher = Dispatcher::new(
            store,
            transport.clone(),
            FixedTime::default(),
            PushOptions::default(),
            "ops@doorbell.example",
        );

        // When
        let result = dispatcher
            .dispatch_to_user("user-1", "Doorbell", "Ring", None)
            .await;

        // Then
        assert!(matches!(
            result,
            Err(DispatchError::Config(VapidError::MissingKeys))
        ));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn vapid_keys__should_load_from_store_once() {
        // Given
        let store = LocalStore::in_memory();
        let credentials = crate::push::vapid::generate_vapid_credentials();
        store
            .put_vapid_keys(crate::types::push::VapidKeyRecord {
                public_key: credentials.public_key.clone(),
                private_key: credentials.private_key.clone(),
            })
            .await
            .expect("put keys");
        let dispatcher = Dispatcher::new(
            store.clone(),
            TestTransport::default(),
            FixedTime::default(),
            PushOptions::default(),
            "ops@doorbell.example",
        );

        // When
        let first = dispatcher.vapid_keys().await.expect("first load");
        let rotated = crate::push::vapid::generate_vapid_credentials();
        store
            .put_vapid_keys(crate::types::push::VapidKeyRecord {
                public_key: rotated.public_key,
                private_key: rotated.private_key,
            })
            .await
            .expect("rotate");
        let second = dispatcher.vapid_keys().await.expect("second load");

        // Then
        assert_eq!(first.public_key_base64(), credentials.public_key);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn send_to_subscription__should_set_push_headers_and_body() {
        // Given
        let (subscription, _, _) =
            test_support::subscriber("https://push.example:8443/wpush/abc");
        let transport =
            TestTransport::with_statuses(&[("https://push.example:8443/wpush/abc", 201)]);
        let dispatcher = dispatcher(LocalStore::in_memory(), transport.clone());
        let vapid = dispatcher.vapid_keys().await.expect("vapid");
        let payload = br#"{"title":"Test","body":"Hello"}"#;

        // When
        dispatcher
            .send_to_subscription(&subscription, payload, &vapid)
            .await
            .expect("send");

        // Then
        let sent = transport.sent();
        let request = &sent[0];
        assert_eq!(request.header("content-type"), Some("application/octet-stream"));
        assert_eq!(request.header("Content-Encoding"), Some("aes128gcm"));
        assert_eq!(request.header("TTL"), Some("86400"));
        assert_eq!(request.header("Urgency"), Some("high"));
        assert_eq!(request.header("Topic"), Some("doorbell"));
        assert_eq!(request.body.len(), 86 + payload.len() + 1 + 16);

        let authorization = request.header("Authorization").expect("authorization");
        let (token, key) = authorization
            .strip_prefix("vapid t=")
            .and_then(|rest| rest.split_once(", k="))
            .expect("vapid scheme");
        assert_eq!(key, vapid.public_key_base64());
        let claims = token.split('.').nth(1).expect("claims");
        let claims: serde_json::Value = serde_json::from_slice(
            &crate::codec::decode_base64_url(claims).expect("claims b64"),
        )
        .expect("claims json");
        assert_eq!(claims["aud"], "https://push.example:8443");
        assert_eq!(
            claims["exp"],
            FixedTime::default().now().unix_timestamp() + vapid::VAPID_ASSERTION_TTL_SECS
        );
    }

    #[tokio::test]
    async fn send_to_subscription__should_classify_not_found_as_permanent() {
        // Given
        let (subscription, _, _) = test_support::subscriber("https://push.example/missing");
        let transport = TestTransport::with_statuses(&[("https://push.example/missing", 404)]);
        let dispatcher = dispatcher(LocalStore::in_memory(), transport);
        let vapid = dispatcher.vapid_keys().await.expect("vapid");

        // When
        let err = dispatcher
            .send_to_subscription(&subscription, b"{}", &vapid)
            .await
            .expect_err("should fail");

        // Then
        assert!(err.is_permanent());
        assert!(matches!(err, SendError::Gone { status: 404 }));
    }

    #[test]
    fn parse_topic__should_validate_alphabet_and_length() {
        assert_eq!(parse_topic("doorbell").expect("topic"), Some("doorbell".to_string()));
        assert_eq!(parse_topic("  ").expect("empty"), None);
        assert!(parse_topic("front door").is_err());
        assert!(parse_topic(&"a".repeat(33)).is_err());
    }

    #[test]
    fn urgency__should_parse_rfc8030_values() {
        assert_eq!("very-low".parse::<Urgency>(), Ok(Urgency::VeryLow));
        assert_eq!("HIGH".parse::<Urgency>(), Ok(Urgency::High));
        assert!("urgent".parse::<Urgency>().is_err());
    }
}
