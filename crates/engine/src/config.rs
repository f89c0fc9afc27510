use std::env;
use std::time::Duration;

use anyhow::Result;

/// Engine settings, read once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    /// How long a connection waits on a locked database file before giving up.
    pub busy_timeout: Duration,
    /// Extra attempts for a unit of work that failed with a transient
    /// storage error. Domain errors are never retried.
    pub max_retries: u32,
    /// Base backoff between retry attempts; grows linearly per attempt.
    pub retry_backoff: Duration,
    /// Buffered capacity of the notification channel.
    pub event_capacity: usize,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://hackathon.db".to_string()),
            busy_timeout: Duration::from_millis(env_u64("DATABASE_BUSY_TIMEOUT_MS", 5_000)),
            max_retries: env_u64("ENGINE_MAX_RETRIES", 3) as u32,
            retry_backoff: Duration::from_millis(env_u64("ENGINE_RETRY_BACKOFF_MS", 50)),
            event_capacity: env_u64("ENGINE_EVENT_CAPACITY", 100) as usize,
        })
    }

    /// Private throwaway database, used by tests and demos.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://hackathon.db".to_string(),
            busy_timeout: Duration::from_millis(5_000),
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
            event_capacity: 100,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
