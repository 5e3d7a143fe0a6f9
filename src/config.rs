//! Configuration options for the bentolink client

use std::time::Duration;

/// Configuration options for the bentolink client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Quiet period before a reorder is flushed to storage
    pub reorder_debounce: Duration,

    /// Window within which a repeated analytics event is suppressed
    pub dedup_window: Duration,

    /// Maximum number of raw event rows fetched by the aggregator
    pub raw_event_limit: u32,

    /// Number of entries in the recent-activity feed
    pub recent_activity_len: usize,

    /// Minimum time between handle changes, in hours
    pub handle_cooldown_hours: i64,

    /// Maximum accepted avatar upload size, in bytes
    pub avatar_max_bytes: usize,

    /// Bucket that holds profile avatars
    pub avatar_bucket: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            reorder_debounce: Duration::from_millis(1000),
            dedup_window: Duration::from_secs(60 * 60),
            raw_event_limit: 1000,
            recent_activity_len: 15,
            handle_cooldown_hours: 24,
            avatar_max_bytes: 2 * 1024 * 1024,
            avatar_bucket: "avatars".to_string(),
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the reorder debounce quiet period
    pub fn with_reorder_debounce(mut self, value: Duration) -> Self {
        self.reorder_debounce = value;
        self
    }

    /// Set the analytics de-duplication window
    pub fn with_dedup_window(mut self, value: Duration) -> Self {
        self.dedup_window = value;
        self
    }

    /// Set the raw event fetch limit
    pub fn with_raw_event_limit(mut self, value: u32) -> Self {
        self.raw_event_limit = value;
        self
    }

    /// Set the recent-activity feed length
    pub fn with_recent_activity_len(mut self, value: usize) -> Self {
        self.recent_activity_len = value;
        self
    }

    /// Set the handle-change cooldown, in hours
    pub fn with_handle_cooldown_hours(mut self, value: i64) -> Self {
        self.handle_cooldown_hours = value;
        self
    }

    /// Set the maximum avatar upload size, in bytes
    pub fn with_avatar_max_bytes(mut self, value: usize) -> Self {
        self.avatar_max_bytes = value;
        self
    }

    /// Set the avatar bucket name
    pub fn with_avatar_bucket(mut self, value: &str) -> Self {
        self.avatar_bucket = value.to_string();
        self
    }
}
