//! Wallet management module
//!
//! Loads the single signing identity used for every network. The key is read
//! as hex from an environment variable or a key file; the intermediate string
//! buffers are zeroized once parsed.

use crate::config::WalletConfig;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::path::Path;
use zeroize::Zeroizing;

/// Wallet manager holding the local signing key
#[derive(Clone)]
pub struct WalletManager {
    signer: PrivateKeySigner,
}

impl WalletManager {
    /// Resolve the key from config: environment variable first, then key file
    pub fn from_config(config: &WalletConfig) -> Result<Self> {
        if let Ok(value) = std::env::var(&config.private_key_env) {
            let value = Zeroizing::new(value);
            return Self::from_hex(&value)
                .with_context(|| format!("Invalid key in ${}", config.private_key_env));
        }
        match &config.key_file {
            Some(path) => Self::from_file(path),
            None => anyhow::bail!(
                "No signing key: set ${} or wallet.key_file",
                config.private_key_env
            ),
        }
    }

    /// Create a wallet from a file containing a hex private key
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read key file: {}", path.display()))?,
        );
        Self::from_hex(content.trim())
            .with_context(|| format!("Invalid key in file: {}", path.display()))
    }

    /// Parse a 32-byte hex private key, with or without `0x`
    pub fn from_hex(key: &str) -> Result<Self> {
        let trimmed = key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(hex::decode(digits).context("Key is not valid hex")?);
        if bytes.len() != 32 {
            anyhow::bail!("Invalid key length: expected 32 bytes, got {}", bytes.len());
        }
        if bytes.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid key: all-zero key rejected");
        }
        let signer = PrivateKeySigner::from_slice(&bytes).context("Key is not a valid secp256k1 scalar")?;
        Ok(Self { signer })
    }

    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Clone of the underlying signer for the transaction builder
    pub fn signer(&self) -> PrivateKeySigner {
        self.signer.clone()
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Well-known development key (first account of the default test mnemonic)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_from_hex() {
        let wallet = WalletManager::from_hex(DEV_KEY).unwrap();
        assert_eq!(
            format!("{:?}", wallet.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        let no_prefix = WalletManager::from_hex(&DEV_KEY[2..]).unwrap();
        assert_eq!(wallet.address(), no_prefix.address());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(WalletManager::from_hex("0x1234").is_err());
        assert!(WalletManager::from_hex("not hex").is_err());
        assert!(WalletManager::from_hex(&"00".repeat(32)).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", DEV_KEY).unwrap();
        let wallet = WalletManager::from_file(file.path()).unwrap();
        assert_eq!(wallet.address(), WalletManager::from_hex(DEV_KEY).unwrap().address());
        // Debug never prints key material
        assert!(!format!("{:?}", wallet).contains("ac0974"));
    }

    #[test]
    fn test_from_config_falls_back_to_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", DEV_KEY).unwrap();
        let config = WalletConfig {
            private_key_env: "REALTIME_BENCH_TEST_KEY_UNSET".to_string(),
            key_file: Some(file.path().display().to_string()),
        };
        assert!(WalletManager::from_config(&config).is_ok());

        let config = WalletConfig {
            private_key_env: "REALTIME_BENCH_TEST_KEY_UNSET".to_string(),
            key_file: None,
        };
        assert!(WalletManager::from_config(&config).is_err());
    }
}
