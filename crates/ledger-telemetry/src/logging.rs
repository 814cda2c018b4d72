//! Structured logging setup.
//!
//! Every crate logs through `tracing` macros with key/value fields
//! (`block_height`, `block_hash`, `peer_id`, `tx_id`, ...). This module
//! installs the subscriber that renders them, either human-readable or as
//! one JSON object per line for log shippers.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log level '{}': {}", config.log_level, e)))?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(config.ansi);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        filter = %config.log_level,
        "Logging initialized"
    );
    Ok(())
}

/// Log a block-related event with the standard fields.
#[macro_export]
macro_rules! log_block_event {
    ($level:ident, $msg:expr, $block:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            block_height = $block.index,
            block_hash = %$block.hash,
            signer = %$block.signer_id,
            transactions = $block.transactions.len(),
            $($($field)*,)?
            $msg
        )
    };
}
