//! Prometheus metrics for the ledger node.
//!
//! All metrics follow the naming convention: `oe_<area>_<metric>_<unit>`.
//! They are updated by the node runtime and rendered in the Prometheus text
//! format by [`encode_metrics`].

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CHAIN
    // =========================================================================

    /// Current chain height
    pub static ref CHAIN_HEIGHT: Gauge = Gauge::new(
        "oe_chain_height",
        "Index of the local chain tip"
    ).expect("metric creation failed");

    /// Blocks sealed by this node
    pub static ref BLOCKS_MINED: Counter = Counter::new(
        "oe_chain_blocks_mined_total",
        "Total number of blocks sealed by this node"
    ).expect("metric creation failed");

    /// Peer blocks appended to the local chain
    pub static ref BLOCKS_ACCEPTED: Counter = Counter::new(
        "oe_chain_blocks_accepted_total",
        "Total number of peer blocks appended"
    ).expect("metric creation failed");

    /// Peer blocks refused, by reason
    pub static ref BLOCKS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("oe_chain_blocks_rejected_total", "Peer blocks refused"),
        &["reason"]  // reason: known/stale/ahead/fork/seal/invalid
    ).expect("metric creation failed");

    /// Adopted longer chains
    pub static ref CHAIN_REPLACEMENTS: Counter = Counter::new(
        "oe_chain_replacements_total",
        "Total number of local chains replaced by a longer peer chain"
    ).expect("metric creation failed");

    /// Time spent searching for a nonce
    pub static ref MINING_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "oe_chain_mining_duration_seconds",
            "Wall time of one proof-of-work search"
        ).buckets(exponential_buckets(0.001, 2.0, 15).expect("valid bucket layout"))
    ).expect("metric creation failed");

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Pending pool size
    pub static ref PENDING_TRANSACTIONS: Gauge = Gauge::new(
        "oe_tx_pending",
        "Number of transactions waiting for a block"
    ).expect("metric creation failed");

    /// Transactions recorded through the API
    pub static ref TRANSACTIONS_SUBMITTED: Counter = Counter::new(
        "oe_tx_submitted_total",
        "Total transactions admitted to the pending pool"
    ).expect("metric creation failed");

    /// Rejected transactions, by rule
    pub static ref TRANSACTIONS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("oe_tx_rejected_total", "Transactions refused by validation"),
        &["rule"]
    ).expect("metric creation failed");

    // =========================================================================
    // PEERS
    // =========================================================================

    /// Peers in the local table
    pub static ref PEERS_KNOWN: Gauge = Gauge::new(
        "oe_peers_known",
        "Number of peers in the local peer table"
    ).expect("metric creation failed");

    /// Gossip dropped as already seen
    pub static ref GOSSIP_DEDUPLICATED: Gauge = Gauge::new(
        "oe_gossip_deduplicated",
        "Gossip messages dropped because they were already processed"
    ).expect("metric creation failed");

    /// Gossip dropped for a bad signature
    pub static ref GOSSIP_BAD_SIGNATURES: Gauge = Gauge::new(
        "oe_gossip_bad_signatures",
        "Gossip messages dropped because their signature did not verify"
    ).expect("metric creation failed");
}

/// Register every ledger metric with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CHAIN_HEIGHT.clone()),
        Box::new(BLOCKS_MINED.clone()),
        Box::new(BLOCKS_ACCEPTED.clone()),
        Box::new(BLOCKS_REJECTED.clone()),
        Box::new(CHAIN_REPLACEMENTS.clone()),
        Box::new(MINING_DURATION.clone()),
        Box::new(PENDING_TRANSACTIONS.clone()),
        Box::new(TRANSACTIONS_SUBMITTED.clone()),
        Box::new(TRANSACTIONS_REJECTED.clone()),
        Box::new(PEERS_KNOWN.clone()),
        Box::new(GOSSIP_DEDUPLICATED.clone()),
        Box::new(GOSSIP_BAD_SIGNATURES.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Render the registry in the Prometheus text exposition format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
