use std::sync::OnceLock;

use tracing::Subscriber;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{prelude::*, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Keeps the non-blocking file writer flushing for the process lifetime.
/// A second init keeps the first guard; logging is set up once at startup.
static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialize tracing from the loaded configuration: a console layer plus an
/// optional rolling file layer, both in the configured format.
///
/// Level precedence: `logging.level` from config, then `RUST_LOG`, then
/// "info".
pub fn init_with_config(cfg: &LoggingConfig) {
    let filter = match cfg.level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> =
        vec![output_layer(cfg.format, true, std::io::stdout)];
    if cfg.enable_file_logging {
        match rolling_writer(cfg) {
            Ok(writer) => layers.push(output_layer(cfg.format, false, writer)),
            Err(e) => eprintln!("File logging disabled ({}): {e}", cfg.dir),
        }
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}

/// One fmt layer aimed at any writer. JSON output never carries ANSI codes;
/// text output colors only where the console allows it.
fn output_layer<S, W>(format: LogFormat, ansi: bool, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::Json => layer.json().with_ansi(false).boxed(),
        LogFormat::Text => layer.with_ansi(ansi).boxed(),
    }
}

/// Buffered writer onto a rolling file under the configured directory.
fn rolling_writer(
    cfg: &LoggingConfig,
) -> std::io::Result<tracing_appender::non_blocking::NonBlocking> {
    std::fs::create_dir_all(&cfg.dir)?;
    let appender = tracing_appender::rolling::RollingFileAppender::new(
        rotation_for(&cfg.rotation),
        &cfg.dir,
        &cfg.filename,
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Ok(writer)
}

/// "daily" unless the config names another supported rotation.
fn rotation_for(rotation: &str) -> tracing_appender::rolling::Rotation {
    match rotation.to_lowercase().as_str() {
        "hourly" => tracing_appender::rolling::Rotation::HOURLY,
        "never" => tracing_appender::rolling::Rotation::NEVER,
        _ => tracing_appender::rolling::Rotation::DAILY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_appender::rolling::Rotation;

    #[test]
    fn test_rotation_parsing() {
        assert_eq!(rotation_for("hourly"), Rotation::HOURLY);
        assert_eq!(rotation_for("HOURLY"), Rotation::HOURLY);
        assert_eq!(rotation_for("never"), Rotation::NEVER);
        assert_eq!(rotation_for("daily"), Rotation::DAILY);
        // Unrecognized values fall back to daily
        assert_eq!(rotation_for("weekly"), Rotation::DAILY);
    }
}
