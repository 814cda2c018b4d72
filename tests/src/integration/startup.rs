//! # Startup Failures
//!
//! Conditions that must stop a node before it joins the network.

#[cfg(test)]
mod tests {
    use node_runtime::adapters::StorageError;
    use node_runtime::container::StorageBackend;
    use node_runtime::{NodeContainer, StartupError};
    use shared_crypto::{CryptoError, KdfParams, Keystore, KeystoreError};
    use tempfile::TempDir;

    use crate::fixtures::{alice_genesis, node_config};

    fn cheap_kdf() -> KdfParams {
        KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_malformed_genesis_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("genesis.json");
        std::fs::write(&path, "{ \"initial_balances\": [1, 2").unwrap();

        let mut config = node_config(dir.path(), "node");
        config.genesis_path = path;
        let err = NodeContainer::build(config).unwrap_err();
        assert!(matches!(err, StartupError::Genesis(_)));
    }

    #[test]
    fn test_genesis_over_supply_cap_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut genesis = alice_genesis();
        genesis.params.max_supply = 10.0;

        let err = NodeContainer::with_genesis(node_config(dir.path(), "node"), genesis).unwrap_err();
        assert!(matches!(err, StartupError::Genesis(_)));
    }

    #[test]
    fn test_encrypted_key_needs_password() {
        let dir = TempDir::new().unwrap();
        let config = node_config(dir.path(), "node");
        Keystore::new(&config.identity.key_dir)
            .with_kdf_params(cheap_kdf())
            .load_or_generate("node", Some("correct horse"))
            .unwrap();

        let err = NodeContainer::with_genesis(config, alice_genesis()).unwrap_err();
        assert!(matches!(err, StartupError::Identity(KeystoreError::PasswordRequired(_))));
    }

    #[test]
    fn test_wrong_key_password_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut config = node_config(dir.path(), "node");
        let created = Keystore::new(&config.identity.key_dir)
            .with_kdf_params(cheap_kdf())
            .load_or_generate("node", Some("correct horse"))
            .unwrap();

        config.identity.password = Some("battery staple".into());
        let err = NodeContainer::with_genesis(config.clone(), alice_genesis()).unwrap_err();
        assert!(matches!(
            err,
            StartupError::Identity(KeystoreError::Crypto(CryptoError::DecryptionFailed(_)))
        ));

        config.identity.password = Some("correct horse".into());
        let container = NodeContainer::with_genesis(config, alice_genesis()).unwrap();
        assert_eq!(container.identity.keypair().public_key(), created.keypair().public_key());
    }

    #[test]
    fn test_rocksdb_backend_requires_feature() {
        let dir = TempDir::new().unwrap();
        let mut config = node_config(dir.path(), "node");
        config.storage.backend = StorageBackend::Rocksdb;

        let err = NodeContainer::with_genesis(config, alice_genesis()).unwrap_err();
        assert!(matches!(err, StartupError::Storage(StorageError::Unavailable("rocksdb"))));
    }
}
