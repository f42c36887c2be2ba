use std::path::Path;

use super::types::Config;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "DICEHALL_CONFIG";
/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Load configuration: file (if present), then environment overrides.
///
/// A missing file is not an error; defaults apply. A malformed file is
/// reported and the defaults are used so the operator sees the problem in
/// the logs rather than a silent fallback.
pub fn load() -> Config {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let mut config = load_file(Path::new(&path));
    apply_env_overrides(&mut config);
    config
}

fn load_file(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Config>(&contents) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to parse {}: {e}; using defaults", path.display());
                Config::default()
            }
        },
        Err(_) => Config::default(),
    }
}

/// Environment overrides for the settings operators most often need to set
/// without shipping a file.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(port) = std::env::var("PORT") {
        match port.parse() {
            Ok(port) => config.port = port,
            Err(_) => eprintln!("Ignoring non-numeric PORT value"),
        }
    }
    if let Ok(secret) = std::env::var("DICEHALL_JWT_SECRET") {
        if !secret.is_empty() {
            config.security.jwt_secret = Some(secret);
        }
    }
    if let Ok(value) = std::env::var("DICEHALL_REQUIRE_AUTH") {
        config.security.require_auth = matches!(value.as_str(), "1" | "true" | "yes");
    }
    if let Ok(value) = std::env::var("DICEHALL_TURN_TIMEOUT_SECS") {
        match value.parse() {
            Ok(secs) => config.server.turn_timeout_secs = secs,
            Err(_) => eprintln!("Ignoring non-numeric DICEHALL_TURN_TIMEOUT_SECS value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_file(Path::new("definitely-not-a-real-config.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: Config =
            serde_json::from_str(r#"{"port": 9000, "server": {"turn_timeout_secs": 30}}"#).unwrap();
        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.server.turn_timeout_secs, 30);
        // Untouched sections keep their defaults
        assert_eq!(parsed.server.reconnect_window_secs, 300);
        assert_eq!(parsed.chat.max_messages, 100);
    }
}
