use std::env;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub poll_interval_ms: u64,
    /// Base delay before a failed job becomes available again (multiplied by attempts)
    pub retry_delay_secs: i64,
    pub max_attempts: i32,
    pub cache_ttl_secs: u64,
    /// A reservation older than this is treated as abandoned and the job is claimable again
    pub reservation_timeout_secs: i64,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval_ms: env::var("BACKOFFICE_QUEUE_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            retry_delay_secs: env::var("BACKOFFICE_QUEUE_RETRY_DELAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            max_attempts: env::var("BACKOFFICE_QUEUE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            cache_ttl_secs: env::var("BACKOFFICE_CACHE_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            reservation_timeout_secs: env::var("BACKOFFICE_QUEUE_RESERVATION_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }
}
