//! Default value functions shared by the config structs.

pub fn default_port() -> u16 {
    4310
}

pub fn default_turn_timeout_secs() -> u32 {
    60
}

pub fn default_reconnect_window_secs() -> i64 {
    300
}

pub fn default_countdown_secs() -> i64 {
    3
}

pub fn default_afk_warning_lead_secs() -> i64 {
    10
}

pub fn default_cleanup_after_secs() -> i64 {
    300
}

pub fn default_max_frame_bytes() -> usize {
    16 * 1024
}

pub fn default_outbound_queue_frames() -> usize {
    64
}
