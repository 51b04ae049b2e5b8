//! Tunables for the stores and the HTTP backend.

use std::time::Duration;

/// Configuration shared by both stores.
///
/// # Examples
///
/// ```
/// use quicklists::StoreConfig;
///
/// let config = StoreConfig { queue_capacity: 64 };
/// assert_eq!(config.queue_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Bound of each store's inbound message queue. Senders wait when the
    /// queue is full.
    ///
    /// Default: 32.
    pub queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
        }
    }
}

/// Configuration for the HTTP backend.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use quicklists::ApiConfig;
///
/// let config = ApiConfig::new("https://lists.example.com/api");
/// assert_eq!(config.timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL every request path is appended to.
    ///
    /// Default: `http://localhost:3000`.
    pub base_url: String,

    /// Per-request timeout, covering connect through body read.
    ///
    /// Default: 10 seconds.
    pub timeout: Duration,
}

impl ApiConfig {
    /// Config for `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_owned(),
            timeout: Duration::from_secs(10),
        }
    }
}
