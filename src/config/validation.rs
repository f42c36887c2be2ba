use super::types::Config;

/// Validate the loaded configuration, collecting every problem so the
/// operator fixes them in one pass.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut problems = Vec::new();

    if config.security.require_auth && config.security.jwt_secret.is_none() {
        problems.push(
            "security.jwt_secret is required while security.require_auth is enabled \
             (set DICEHALL_JWT_SECRET or disable auth for local development)"
                .to_string(),
        );
    }
    if let Some(secret) = &config.security.jwt_secret {
        if secret.len() < 16 {
            problems.push("security.jwt_secret must be at least 16 bytes".to_string());
        }
    }

    if config.server.turn_timeout_secs < 15 {
        problems.push("server.turn_timeout_secs must be at least 15".to_string());
    }
    if config.server.reconnect_window_secs <= 0 {
        problems.push("server.reconnect_window_secs must be positive".to_string());
    }
    if config.server.afk_warning_lead_secs < 0
        || config.server.afk_warning_lead_secs >= i64::from(config.server.turn_timeout_secs)
    {
        problems.push(
            "server.afk_warning_lead_secs must be non-negative and below the turn timeout"
                .to_string(),
        );
    }
    if config.server.max_frame_bytes < 256 {
        problems.push("server.max_frame_bytes must be at least 256".to_string());
    }
    if config.server.outbound_queue_frames == 0 {
        problems.push("server.outbound_queue_frames must be positive".to_string());
    }

    if config.chat.max_messages == 0 {
        problems.push("chat.max_messages must be positive".to_string());
    }
    if config.chat.max_message_length == 0 {
        problems.push("chat.max_message_length must be positive".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.security.jwt_secret = Some("a-sufficiently-long-shared-secret".to_string());
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = valid_config();
        config.security.jwt_secret = Some("short".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("at least 16 bytes"));
    }

    #[test]
    fn test_all_problems_collected() {
        let mut config = valid_config();
        config.server.turn_timeout_secs = 5;
        config.chat.max_messages = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("turn_timeout_secs"));
        assert!(err.contains("max_messages"));
    }
}
