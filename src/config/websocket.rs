//! WebSocket transport limits

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// WebSocket transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Close connections that send nothing for this many seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Maximum inbound message size in bytes
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,

    /// Outbound events buffered per connection
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl WebSocketConfig {
    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Validate transport limits
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.idle_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("websocket.idle_timeout_secs"));
        }
        if self.max_payload_bytes == 0 {
            return Err(ValidationError::InvalidPayloadLimit);
        }
        Ok(())
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            max_payload_bytes: default_max_payload(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_max_payload() -> usize {
    32 * 1024 * 1024
}

fn default_outbound_buffer() -> usize {
    64
}
