//! # Spoolwatch
//!
//! Telemetry ingestion and print-completion detection for networked 3D
//! printers that report over MQTT.
//!
//! ## Architecture
//!
//! Spoolwatch is organized as a workspace with multiple crates:
//!
//! 1. **spoolwatch-core** - Domain model, errors, handler registry
//! 2. **spoolwatch-communication** - MQTT link, routing, normalization, completion detection, commands
//! 3. **spoolwatch-settings** - Configuration loading and validation
//! 4. **spoolwatch** - Logging setup and the monitoring binary

pub use spoolwatch_communication::{
    CommandTranslator, LinkManager, MessageRouter, MonitorConfig, PrinterCommand, PrinterMonitor,
    Publisher, TelemetryNormalizer, TelemetryPipeline,
};

pub use spoolwatch_core::{
    CommandError, CompletionOutcome, CompletionRecord, ConnectionError, DecodeRules, Error,
    LifecycleStatus, LinkConfig, LinkState, ParseError, Result, Snapshot,
};

pub use spoolwatch_settings::{Config, LoggingSettings, MonitorSettings, PrinterSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// `RUST_LOG` takes precedence over the configured level. Call once per
/// process.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if settings.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_current_span(false);
        registry.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true);
        registry.with(fmt_layer).try_init()?;
    }

    Ok(())
}

/// Monitor tuning for the configured settings
pub fn monitor_config(config: &Config) -> MonitorConfig {
    MonitorConfig {
        recent_snapshot_capacity: config.monitor.recent_snapshot_capacity,
        handler_queue_capacity: config.monitor.handler_queue_capacity,
        inbound_queue_capacity: config.monitor.inbound_queue_capacity,
        decode: config.decode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_config_mapping() {
        let mut config = Config::default();
        config.monitor.recent_snapshot_capacity = 8;
        config.decode.chamber_threshold = 90.0;

        let monitor = monitor_config(&config);
        assert_eq!(monitor.recent_snapshot_capacity, 8);
        assert_eq!(monitor.handler_queue_capacity, 256);
        assert_eq!(monitor.decode.chamber_threshold, 90.0);
    }
}
