//! # Keystore
//!
//! Persists the node's Ed25519 seed under `<dir>/<label>.sk` with the public
//! key alongside in `<label>.pk`, both hex.
//!
//! The secret file is either a bare 64-character hex seed or, when a
//! password is configured, an encrypted document:
//!
//! ```json
//! { "version": 1, "kdf": { "algorithm": "argon2id", "salt": "..", "memory_kib": 65536,
//!   "iterations": 3, "parallelism": 1 }, "cipher": "xchacha20poly1305",
//!   "nonce": "..", "ciphertext": ".." }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::identity::NodeIdentity;
use crate::signatures::{Ed25519KeyPair, Ed25519PublicKey};
use crate::symmetric::{decrypt, encrypt, random_bytes, KdfParams, SecretKey, NONCE_LEN, SALT_LEN};
use crate::{CryptoError, KeystoreError};

const KEYSTORE_VERSION: u32 = 1;
const KDF_ALGORITHM: &str = "argon2id";
const CIPHER_ALGORITHM: &str = "xchacha20poly1305";

#[derive(Debug, Serialize, Deserialize)]
struct KdfSection {
    algorithm: String,
    salt: String,
    #[serde(flatten)]
    params: KdfParams,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedKeyFile {
    version: u32,
    kdf: KdfSection,
    cipher: String,
    nonce: String,
    ciphertext: String,
}

/// Directory-backed store of node keys.
#[derive(Debug, Clone)]
pub struct Keystore {
    dir: PathBuf,
    kdf: KdfParams,
}

impl Keystore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            kdf: KdfParams::default(),
        }
    }

    /// Override the Argon2id cost used when writing new encrypted keys.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    fn secret_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{label}.sk"))
    }

    fn public_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{label}.pk"))
    }

    /// Load the identity stored under `label`, generating and persisting a
    /// new one if none exists.
    pub fn load_or_generate(
        &self,
        label: &str,
        password: Option<&str>,
    ) -> Result<NodeIdentity, KeystoreError> {
        let secret_path = self.secret_path(label);
        if secret_path.exists() {
            let identity = self.load(label, password)?;
            info!(node_id = %identity.keypair().public_key().to_hex(), "Loaded node identity");
            return Ok(identity);
        }

        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let keypair = Ed25519KeyPair::generate();
        self.store(label, &keypair, password)?;
        let identity = NodeIdentity::new(keypair);
        info!(
            node_id = %identity.keypair().public_key().to_hex(),
            encrypted = password.is_some(),
            "Generated new node identity"
        );
        Ok(identity)
    }

    /// Load an existing identity.
    pub fn load(&self, label: &str, password: Option<&str>) -> Result<NodeIdentity, KeystoreError> {
        let secret_path = self.secret_path(label);
        let raw = fs::read_to_string(&secret_path).map_err(|e| io_err(&secret_path, e))?;
        let raw = Zeroizing::new(raw);
        let trimmed = raw.trim();

        let seed = if trimmed.starts_with('{') {
            let password =
                password.ok_or_else(|| KeystoreError::PasswordRequired(display(&secret_path)))?;
            decrypt_seed(&secret_path, trimmed, password)?
        } else {
            if password.is_some() {
                warn!(path = %secret_path.display(), "Password supplied but key file is not encrypted");
            }
            parse_seed(&secret_path, trimmed)?
        };

        let keypair = Ed25519KeyPair::from_seed(*seed);
        self.check_public_key(label, &keypair)?;
        Ok(NodeIdentity::new(keypair))
    }

    fn check_public_key(&self, label: &str, keypair: &Ed25519KeyPair) -> Result<(), KeystoreError> {
        let public_path = self.public_path(label);
        if !public_path.exists() {
            return Ok(());
        }
        let stored = fs::read_to_string(&public_path).map_err(|e| io_err(&public_path, e))?;
        let stored = Ed25519PublicKey::from_hex(stored.trim()).map_err(|e| KeystoreError::Corrupt {
            path: display(&public_path),
            reason: e.to_string(),
        })?;
        if stored != keypair.public_key() {
            return Err(KeystoreError::PublicKeyMismatch(label.to_string()));
        }
        Ok(())
    }

    fn store(
        &self,
        label: &str,
        keypair: &Ed25519KeyPair,
        password: Option<&str>,
    ) -> Result<(), KeystoreError> {
        let seed = Zeroizing::new(keypair.to_seed());
        let contents = match password {
            Some(password) => {
                let salt = random_bytes::<SALT_LEN>();
                let key = SecretKey::derive(password.as_bytes(), &salt, &self.kdf)?;
                let (ciphertext, nonce) = encrypt(&key, seed.as_ref())?;
                let file = EncryptedKeyFile {
                    version: KEYSTORE_VERSION,
                    kdf: KdfSection {
                        algorithm: KDF_ALGORITHM.to_string(),
                        salt: hex::encode(salt),
                        params: self.kdf,
                    },
                    cipher: CIPHER_ALGORITHM.to_string(),
                    nonce: hex::encode(nonce),
                    ciphertext: hex::encode(ciphertext),
                };
                Zeroizing::new(
                    serde_json::to_string_pretty(&file)
                        .map_err(|e| CryptoError::Encoding(e.to_string()))?,
                )
            }
            None => Zeroizing::new(hex::encode(seed.as_ref())),
        };

        let secret_path = self.secret_path(label);
        write_private(&secret_path, contents.as_bytes())?;
        let public_path = self.public_path(label);
        fs::write(&public_path, keypair.public_key().to_hex()).map_err(|e| io_err(&public_path, e))?;
        Ok(())
    }
}

fn decrypt_seed(path: &Path, raw: &str, password: &str) -> Result<Zeroizing<[u8; 32]>, KeystoreError> {
    let corrupt = |reason: String| KeystoreError::Corrupt {
        path: display(path),
        reason,
    };
    let file: EncryptedKeyFile = serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;
    if file.version != KEYSTORE_VERSION {
        return Err(corrupt(format!("unsupported version {}", file.version)));
    }
    if file.kdf.algorithm != KDF_ALGORITHM || file.cipher != CIPHER_ALGORITHM {
        return Err(corrupt(format!(
            "unsupported algorithms {}/{}",
            file.kdf.algorithm, file.cipher
        )));
    }

    let salt: [u8; SALT_LEN] = decode_fixed(&file.kdf.salt).ok_or_else(|| corrupt("bad salt".into()))?;
    let nonce: [u8; NONCE_LEN] = decode_fixed(&file.nonce).ok_or_else(|| corrupt("bad nonce".into()))?;
    let ciphertext = hex::decode(&file.ciphertext).map_err(|e| corrupt(e.to_string()))?;

    let key = SecretKey::derive(password.as_bytes(), &salt, &file.kdf.params)?;
    let plaintext = Zeroizing::new(decrypt(&key, &ciphertext, &nonce)?);
    let seed: [u8; 32] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| corrupt("decrypted seed has wrong length".into()))?;
    Ok(Zeroizing::new(seed))
}

fn parse_seed(path: &Path, raw: &str) -> Result<Zeroizing<[u8; 32]>, KeystoreError> {
    decode_fixed(raw)
        .map(Zeroizing::new)
        .ok_or_else(|| KeystoreError::Corrupt {
            path: display(path),
            reason: "expected 64 hex characters".to_string(),
        })
}

fn decode_fixed<const N: usize>(raw: &str) -> Option<[u8; N]> {
    hex::decode(raw).ok()?.try_into().ok()
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<(), KeystoreError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.write_all(contents).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<(), KeystoreError> {
    fs::write(path, contents).map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, e: std::io::Error) -> KeystoreError {
    KeystoreError::Io {
        path: display(path),
        reason: e.to_string(),
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
