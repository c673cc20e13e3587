use repricer_core::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber. Call once at startup, before any
/// other work emits events.
pub fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}
