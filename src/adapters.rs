use std::pin::Pin;
use std::time::Duration;

use time::OffsetDateTime;

use crate::ports;

mod store;

pub use store::LocalStore;

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl ports::TimeProvider for SystemTimeProvider {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Request(#[source] reqwest::Error),
}

/// Push services are third parties and may stall, so every request is bounded.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Build)?;
        Ok(Self { client, timeout })
    }
}

impl ports::PushTransport for ReqwestTransport {
    type Error = TransportError;
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<ports::PushResponse, Self::Error>> + Send + 'a>>
    where
        Self: 'a;

    fn post<'a>(&'a self, request: &'a ports::PushRequest) -> Self::Fut<'a> {
        Box::pin(async move {
            let mut builder = self.client.post(&request.endpoint);
            for (name, value) in &request.headers {
                builder = builder.header(*name, value.as_str());
            }
            let response = builder
                .body(request.body.clone())
                .send()
                .await
                .map_err(|err| self.classify(err))?;

            let status = response.status().as_u16();
            let body = if response.status().is_success() {
                String::new()
            } else {
                let text = response.text().await.unwrap_or_default();
                text.chars().take(MAX_ERROR_BODY_CHARS).collect()
            };
            Ok(ports::PushResponse { status, body })
        })
    }
}

impl ReqwestTransport {
    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Request(err)
        }
    }
}
