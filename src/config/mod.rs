//! Configuration module.
//!
//! Configuration is loaded from an optional JSON file with environment
//! variable overrides on top of code defaults, then validated before the
//! server starts.
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`server`]: Room and connection behavior (timeouts, windows, queues)
//! - [`security`]: Token verification settings
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod security;
pub mod server;
pub mod types;
pub mod validation;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use security::SecurityConfig;
pub use server::ServerConfig;
pub use types::Config;
pub use validation::validate_config;
