//! Driving port: transports hand received messages to this.

use async_trait::async_trait;
use shared_types::WireMessage;

#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process one inbound message and optionally answer it.
    ///
    /// `from` is the node id of the peer that handed this copy over, taken
    /// from the envelope's `relay_id` or from the transport. It differs
    /// from `message.sender_id` for relayed gossip.
    async fn handle(&self, message: WireMessage, from: Option<String>) -> Option<WireMessage>;
}
