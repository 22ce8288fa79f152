use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const DEFAULT_EVENT_BUFFER: usize = 16;

/// Tuning knobs for a [`ContractDataDetector`](crate::ContractDataDetector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Capacity of the outcome channel handed to the caller.
    #[serde(rename = "eventBuffer")]
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Upper bound on each individual fetch. `None` leaves timeouts to the provider.
    #[serde(rename = "fetchTimeoutMs")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
            fetch_timeout_ms: None,
        }
    }
}

impl DetectorConfig {
    /// Parse and validate a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.event_buffer == 0 {
            return Err(Error::Config("eventBuffer must be greater than zero".to_string()));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(Error::Config("fetchTimeoutMs must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}
