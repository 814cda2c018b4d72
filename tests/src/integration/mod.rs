//! Cross-crate integration scenarios.

mod consensus;
mod ledger_flows;
mod network;
mod startup;
