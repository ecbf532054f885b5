use crate::constants::defaults;
use crate::error::{DispatchError, DispatchResult};
use crate::validation::validate_identifier;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime settings for partitioning, dispatch and transports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub step_name: String,
    /// Number of partitions requested from the partitioner
    pub grid_size: u32,
    /// Items per committed chunk
    pub chunk_size: usize,
    /// Cap on simultaneously in-flight units; `None` leaves it to the transport
    pub max_in_flight: Option<usize>,
    pub local_workers: usize,
    pub local_queue_capacity: usize,
    pub step_timeout_ms: u64,
    pub reply_poll_interval_ms: u64,
    pub request_queue: String,
    pub reply_queue: String,
    pub event_channel_capacity: usize,
    pub database_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            step_name: defaults::STEP_NAME.to_string(),
            grid_size: defaults::GRID_SIZE,
            chunk_size: defaults::CHUNK_SIZE,
            max_in_flight: None,
            local_workers: defaults::LOCAL_WORKERS,
            local_queue_capacity: defaults::QUEUE_CAPACITY,
            step_timeout_ms: defaults::STEP_TIMEOUT_MS,
            reply_poll_interval_ms: defaults::REPLY_POLL_INTERVAL_MS,
            request_queue: defaults::REQUEST_QUEUE.to_string(),
            reply_queue: defaults::REPLY_QUEUE.to_string(),
            event_channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
            database_url: None,
        }
    }
}

impl DispatchConfig {
    /// Defaults overridden by `DISPATCH_*` variables (and `DATABASE_URL`)
    pub fn from_env() -> DispatchResult<Self> {
        let mut config = Self::default();

        if let Ok(step_name) = std::env::var("DISPATCH_STEP_NAME") {
            config.step_name = step_name;
        }
        if let Some(grid_size) = parse_env("DISPATCH_GRID_SIZE")? {
            config.grid_size = grid_size;
        }
        if let Some(chunk_size) = parse_env("DISPATCH_CHUNK_SIZE")? {
            config.chunk_size = chunk_size;
        }
        if let Some(max_in_flight) = parse_env("DISPATCH_MAX_IN_FLIGHT")? {
            config.max_in_flight = Some(max_in_flight);
        }
        if let Some(workers) = parse_env("DISPATCH_LOCAL_WORKERS")? {
            config.local_workers = workers;
        }
        if let Some(capacity) = parse_env("DISPATCH_LOCAL_QUEUE_CAPACITY")? {
            config.local_queue_capacity = capacity;
        }
        if let Some(timeout) = parse_env("DISPATCH_STEP_TIMEOUT_MS")? {
            config.step_timeout_ms = timeout;
        }
        if let Some(interval) = parse_env("DISPATCH_REPLY_POLL_INTERVAL_MS")? {
            config.reply_poll_interval_ms = interval;
        }
        if let Ok(queue) = std::env::var("DISPATCH_REQUEST_QUEUE") {
            config.request_queue = queue;
        }
        if let Ok(queue) = std::env::var("DISPATCH_REPLY_QUEUE") {
            config.reply_queue = queue;
        }
        if let Some(capacity) = parse_env("DISPATCH_EVENT_CHANNEL_CAPACITY")? {
            config.event_channel_capacity = capacity;
        }
        if let Ok(url) = std::env::var("DISPATCH_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            config.database_url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML/YAML/JSON file with a `DISPATCH_` environment overlay
    pub fn load(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("DISPATCH").try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            grid_size = config.grid_size,
            chunk_size = config.chunk_size,
            "Loaded dispatch configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.step_name.trim().is_empty() {
            return Err(DispatchError::configuration("step_name", "must not be empty"));
        }
        if self.grid_size == 0 {
            return Err(DispatchError::configuration("grid_size", "must be at least 1"));
        }
        if i32::try_from(self.grid_size).is_err() {
            return Err(DispatchError::configuration(
                "grid_size",
                format!("{} exceeds {}", self.grid_size, i32::MAX),
            ));
        }
        if self.chunk_size == 0 {
            return Err(DispatchError::configuration("chunk_size", "must be at least 1"));
        }
        if self.max_in_flight == Some(0) {
            return Err(DispatchError::configuration(
                "max_in_flight",
                "must be at least 1 when set",
            ));
        }
        if self.local_workers == 0 {
            return Err(DispatchError::configuration("local_workers", "must be at least 1"));
        }
        if self.local_queue_capacity == 0 {
            return Err(DispatchError::configuration(
                "local_queue_capacity",
                "must be at least 1",
            ));
        }
        if self.step_timeout_ms == 0 {
            return Err(DispatchError::configuration("step_timeout_ms", "must be positive"));
        }
        if self.reply_poll_interval_ms == 0 {
            return Err(DispatchError::configuration(
                "reply_poll_interval_ms",
                "must be positive",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(DispatchError::configuration(
                "event_channel_capacity",
                "must be at least 1",
            ));
        }
        validate_identifier(&self.request_queue, "request_queue")?;
        validate_identifier(&self.reply_queue, "reply_queue")?;
        if self.request_queue == self.reply_queue {
            return Err(DispatchError::configuration(
                "reply_queue",
                "must differ from request_queue",
            ));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn reply_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reply_poll_interval_ms)
    }
}

fn parse_env<T>(name: &str) -> DispatchResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| DispatchError::configuration(name, format!("invalid value {raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DispatchConfig::default();
        assert_eq!(config.grid_size, 4);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.max_in_flight, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_knobs() {
        let mut config = DispatchConfig::default();
        config.grid_size = 0;
        assert!(matches!(
            config.validate(),
            Err(DispatchError::Configuration { ref component, .. }) if component == "grid_size"
        ));

        let mut config = DispatchConfig::default();
        config.max_in_flight = Some(0);
        assert!(config.validate().is_err());

        let mut config = DispatchConfig::default();
        config.step_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_queue_names() {
        let mut config = DispatchConfig::default();
        config.request_queue = "requests; DROP TABLE x".to_string();
        assert!(config.validate().is_err());

        let mut config = DispatchConfig::default();
        config.reply_queue = config.request_queue.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "step_name = \"customer_load\"\ngrid_size = 8\nchunk_size = 250\nmax_in_flight = 2"
        )
        .unwrap();

        let config = DispatchConfig::load(file.path()).unwrap();
        assert_eq!(config.step_name, "customer_load");
        assert_eq!(config.grid_size, 8);
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.max_in_flight, Some(2));
        assert_eq!(config.local_workers, DispatchConfig::default().local_workers);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "chunk_size = 0").unwrap();
        assert!(matches!(
            DispatchConfig::load(file.path()),
            Err(DispatchError::Configuration { .. })
        ));
    }
}
