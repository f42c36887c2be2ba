use serde::{Deserialize, Serialize};

use super::defaults;

/// Room and connection behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct ServerConfig {
    /// Default seconds a human has to act before the turn is skipped.
    /// Hosts may override per room within sane bounds.
    pub turn_timeout_secs: u32,
    /// Seconds a disconnected seat survives before expiring.
    pub reconnect_window_secs: i64,
    /// Countdown between game-start acceptance and the first turn.
    pub countdown_secs: i64,
    /// Lead time for the AFK warning before the turn deadline.
    pub afk_warning_lead_secs: i64,
    /// Seconds an empty room lingers before the cleanup alarm destroys it.
    pub cleanup_after_secs: i64,
    /// Largest accepted inbound text frame.
    pub max_frame_bytes: usize,
    /// Outbound frames buffered per connection before it is dropped as a
    /// slow reader.
    pub outbound_queue_frames: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: defaults::default_turn_timeout_secs(),
            reconnect_window_secs: defaults::default_reconnect_window_secs(),
            countdown_secs: defaults::default_countdown_secs(),
            afk_warning_lead_secs: defaults::default_afk_warning_lead_secs(),
            cleanup_after_secs: defaults::default_cleanup_after_secs(),
            max_frame_bytes: defaults::default_max_frame_bytes(),
            outbound_queue_frames: defaults::default_outbound_queue_frames(),
        }
    }
}
