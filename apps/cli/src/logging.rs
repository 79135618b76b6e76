//! Tracing subscriber setup for the `codeshell` binary.
//!
//! Logs go to stderr so stdout stays reserved for listings and file contents.
//! `RUST_LOG` takes precedence over the configured level.

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// 日誌輸出設定。 / Logging options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// Include the module target (e.g. `codeshell_core::watch`) in each line.
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            include_target: level >= Level::DEBUG,
        }
    }
}

/// 解析日誌等級字串，無法辨識時回傳 `None`。 / Parses a level name case-insensitively.
pub fn parse_level(value: &str) -> Option<Level> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(config.level).into())
            .from_env_lossy();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(config.include_target),
            )
            .try_init();
    });
}
