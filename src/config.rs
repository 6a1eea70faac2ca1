use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub average_service_time_secs: i64,
    pub ring_timeout: Duration,
    pub max_queue_size: Option<usize>,
    pub event_channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://dialdesk.db?mode=rwc".to_string());

        let average_service_time_secs: i64 = env::var("AVERAGE_SERVICE_TIME_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidServiceTime)?;
        if average_service_time_secs <= 0 {
            return Err(ConfigError::InvalidServiceTime);
        }

        let ring_timeout_secs: u64 = env::var("RING_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidRingTimeout)?;

        // 0 means unbounded, same as leaving the variable unset.
        let max_queue_size = match env::var("MAX_QUEUE_SIZE") {
            Ok(raw) => {
                let size: usize = raw.parse().map_err(|_| ConfigError::InvalidQueueSize)?;
                if size == 0 {
                    None
                } else {
                    Some(size)
                }
            }
            Err(_) => None,
        };

        let event_channel_capacity: usize = env::var("EVENT_CHANNEL_CAPACITY")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidChannelCapacity)?;
        if event_channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity);
        }

        Ok(Config {
            database_url,
            average_service_time_secs,
            ring_timeout: Duration::from_secs(ring_timeout_secs),
            max_queue_size,
            event_channel_capacity,
        })
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            average_service_time_secs: self.average_service_time_secs,
            ring_timeout: self.ring_timeout,
            max_queue_size: self.max_queue_size,
        }
    }
}

/// Tunables the dispatcher itself consumes. A zero ring timeout disables the
/// unanswered-ring deadline; `max_queue_size: None` leaves the queue
/// unbounded.
#[derive(Clone, Debug)]
pub struct DispatchOptions {
    pub average_service_time_secs: i64,
    pub ring_timeout: Duration,
    pub max_queue_size: Option<usize>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            average_service_time_secs: 300,
            ring_timeout: Duration::from_secs(30),
            max_queue_size: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("AVERAGE_SERVICE_TIME_SECS must be a positive number of seconds")]
    InvalidServiceTime,

    #[error("RING_TIMEOUT_SECS must be a whole number of seconds")]
    InvalidRingTimeout,

    #[error("MAX_QUEUE_SIZE must be a non-negative integer")]
    InvalidQueueSize,

    #[error("EVENT_CHANNEL_CAPACITY must be a positive integer")]
    InvalidChannelCapacity,
}
