//! Per-node runtime settings

use std::time::Duration;

/// Settings an [`EventService`](crate::EventService) needs about its host.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Public base URI of this host, sent to neighbors as the caller address
    pub public_uri: String,

    /// How long a read waits for a foreign lock to clear. Zero fails fast.
    pub lock_wait_timeout: Duration,
}

impl NodeSettings {
    /// Settings for a host reachable at `public_uri`
    pub fn new(public_uri: impl Into<String>) -> Self {
        Self {
            public_uri: public_uri.into(),
            ..Default::default()
        }
    }

    /// Replace the lock wait timeout
    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            public_uri: "http://127.0.0.1:8080".to_string(),
            lock_wait_timeout: Duration::from_secs(5),
        }
    }
}
