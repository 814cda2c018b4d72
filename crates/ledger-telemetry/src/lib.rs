//! # Ledger Telemetry
//!
//! Structured logging and Prometheus metrics for an Orbis Ethica node.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledger_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ledger_telemetry::CHAIN_HEIGHT.set(12.0);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OE_SERVICE_NAME` | `orbis-ethica-node` | Service name on every log line |
//! | `OE_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `OE_JSON_LOGS` | `false` (`true` in containers) | One JSON object per log line |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, BLOCKS_ACCEPTED, BLOCKS_MINED, BLOCKS_REJECTED,
    CHAIN_HEIGHT, CHAIN_REPLACEMENTS, GOSSIP_BAD_SIGNATURES, GOSSIP_DEDUPLICATED,
    MINING_DURATION, PEERS_KNOWN, PENDING_TRANSACTIONS, REGISTRY, TRANSACTIONS_REJECTED,
    TRANSACTIONS_SUBMITTED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the log subscriber.
///
/// Returns a guard to hold for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    init_logging(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_inc_macro() {
        register_metrics().unwrap();
        let before = BLOCKS_REJECTED.with_label_values(&["stale"]).get();
        metric_inc!(BLOCKS_REJECTED, &["stale"]);
        assert_eq!(BLOCKS_REJECTED.with_label_values(&["stale"]).get(), before + 1.0);
    }
}
