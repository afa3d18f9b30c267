use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::push::PushOptions;

pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// JSON file backing the subscription store; `None` keeps everything in memory.
    pub store_path: Option<PathBuf>,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: String,
    pub push: PushOptions,
    pub push_timeout: Duration,
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store_path: None,
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: "mailto:ops@doorbell.example".to_string(),
            push: PushOptions::default(),
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }
}
