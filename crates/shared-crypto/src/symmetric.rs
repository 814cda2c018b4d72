//! # Password-Based Encryption
//!
//! XChaCha20-Poly1305 with a key stretched from a password by Argon2id.
//! Used to protect node secret keys at rest.

use crate::CryptoError;
use argon2::{Algorithm, Argon2, Params, ParamsBuilder, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use zeroize::{Zeroize, Zeroizing};

/// Salt length for key derivation.
pub const SALT_LEN: usize = 16;

/// XChaCha20 uses a 24-byte nonce.
pub const NONCE_LEN: usize = 24;

const KEY_LEN: usize = 32;

/// Argon2id cost parameters, persisted next to the ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    fn build(&self) -> Result<Params, CryptoError> {
        ParamsBuilder::new()
            .m_cost(self.memory_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .output_len(KEY_LEN)
            .build()
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))
    }
}

/// Secret key (256-bit).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Derive a key from `password` and `salt` with Argon2id.
    pub fn derive(password: &[u8], salt: &[u8; SALT_LEN], params: &KdfParams) -> Result<Self, CryptoError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.build()?);
        let mut out = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(password, salt, out.as_mut())
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        Ok(Self(*out))
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Fill a fresh random array.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    bytes
}

/// Encrypt plaintext with XChaCha20-Poly1305.
///
/// Returns (ciphertext, nonce).
pub fn encrypt(key: &SecretKey, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = random_bytes::<NONCE_LEN>();

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok((ciphertext, nonce))
}

/// Decrypt ciphertext with XChaCha20-Poly1305.
pub fn decrypt(key: &SecretKey, ciphertext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let salt = random_bytes::<SALT_LEN>();
        let key = SecretKey::derive(b"hunter2", &salt, &cheap()).unwrap();
        let (ciphertext, nonce) = encrypt(&key, b"seed material").unwrap();
        assert_eq!(decrypt(&key, &ciphertext, &nonce).unwrap(), b"seed material");
    }

    #[test]
    fn test_wrong_password_fails() {
        let salt = random_bytes::<SALT_LEN>();
        let key = SecretKey::derive(b"right", &salt, &cheap()).unwrap();
        let wrong = SecretKey::derive(b"wrong", &salt, &cheap()).unwrap();
        let (ciphertext, nonce) = encrypt(&key, b"secret").unwrap();
        assert!(matches!(
            decrypt(&wrong, &ciphertext, &nonce),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let salt = random_bytes::<SALT_LEN>();
        let key = SecretKey::derive(b"pw", &salt, &cheap()).unwrap();
        let (mut ciphertext, nonce) = encrypt(&key, b"secret").unwrap();
        ciphertext[0] ^= 0xFF;
        assert!(decrypt(&key, &ciphertext, &nonce).is_err());
    }
}
