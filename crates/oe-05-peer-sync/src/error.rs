//! Error types for peer synchronisation

use shared_types::EncodingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Peer {peer} timed out after {timeout_ms}ms")]
    Timeout { peer: String, timeout_ms: u64 },

    #[error("Connection to {peer} failed: {reason}")]
    Io { peer: String, reason: String },

    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Peer {peer} is unreachable")]
    Unreachable { peer: String },

    #[error("Peer {peer} answered with {got:?}, expected {expected:?}")]
    UnexpectedResponse {
        peer: String,
        expected: shared_types::MessageType,
        got: Option<shared_types::MessageType>,
    },

    #[error("Peer {peer} sent a {got} payload where {expected} was expected")]
    UnexpectedPayload {
        peer: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("Message from {sender} failed signature verification")]
    BadSignature { sender: String },

    #[error("Peer {peer} is on a different network: genesis {genesis_hash}")]
    WrongNetwork { peer: String, genesis_hash: String },

    #[error("Peer advertised our own node id")]
    SelfConnection,

    #[error("Malformed payload: {0}")]
    Encoding(#[from] EncodingError),
}

impl SyncError {
    /// Transport-level failure as opposed to a misbehaving peer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Timeout { .. } | SyncError::Io { .. } | SyncError::Unreachable { .. }
        )
    }
}
