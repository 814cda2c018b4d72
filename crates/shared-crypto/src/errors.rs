//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (wrong password or tampered ciphertext)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Invalid signature format
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Key derivation failed
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// Payload could not be canonicalised before signing
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

impl From<shared_types::EncodingError> for CryptoError {
    fn from(e: shared_types::EncodingError) -> Self {
        CryptoError::Encoding(e.to_string())
    }
}

/// Keystore errors. All of them are fatal at node startup.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Filesystem access failed
    #[error("Keystore I/O error at {path}: {reason}")]
    Io {
        /// File or directory involved
        path: String,
        /// Underlying error
        reason: String,
    },

    /// Key file exists but cannot be parsed
    #[error("Corrupt key file {path}: {reason}")]
    Corrupt {
        /// Key file
        path: String,
        /// What was wrong
        reason: String,
    },

    /// Key is encrypted and no password was supplied
    #[error("Key file {0} is encrypted but no password was provided")]
    PasswordRequired(String),

    /// Stored public key does not match the secret key
    #[error("Public key file does not match secret key for node {0}")]
    PublicKeyMismatch(String),

    /// Underlying cryptographic failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
