//! Logging initialization

use anyhow::{Context, Result};
use odv_core::TelemetryConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level`.
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_telemetry(level: &str, json_logs: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to create environment filter")?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()
            .context("Failed to install JSON subscriber")?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to install subscriber")?;
    }

    Ok(())
}

/// Level and format from the command line, falling back to the config file.
pub fn effective_settings(config: &TelemetryConfig, level: Option<&str>, json_logs: bool) -> (String, bool) {
    let level = level.unwrap_or(&config.log_level).to_string();
    (level, json_logs || config.json_logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_effective_settings() {
        let config = TelemetryConfig {
            log_level: "warn".to_string(),
            json_logs: true,
        };

        assert_eq!(effective_settings(&config, None, false), ("warn".to_string(), true));
        assert_eq!(effective_settings(&config, Some("debug"), false), ("debug".to_string(), true));
        assert_eq!(
            effective_settings(&TelemetryConfig::default(), None, false),
            ("info".to_string(), false)
        );
    }
}
