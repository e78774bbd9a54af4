//! Managed-account registry and encrypted key storage.
//!
//! Private keys for the wallet pool live in an encrypted flat file. The
//! engine never sees the file format: it goes through the [`KeyProvider`]
//! seam, and the file implementation goes through the [`Cipher`] seam, so the
//! storage mechanism (file, secret manager, HSM) is swappable without
//! touching the trading code.

use crate::errors::{KeyStoreError, Result};
use crate::config::parse_and_validate_private_key;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Symmetric encryption capability. The blob format is opaque to callers.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8>;
}

/// Default cipher: a SHA-256 keystream derived from the shared secret,
/// XORed over the payload. Symmetric, so encrypt and decrypt coincide.
pub struct KeystreamCipher {
    key: [u8; 32],
}

impl KeystreamCipher {
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes()).into();
        Self { key }
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for (block_idx, chunk) in data.chunks(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.key);
            hasher.update((block_idx as u64).to_le_bytes());
            let stream = hasher.finalize();
            out.extend(chunk.iter().zip(stream.iter()).map(|(b, k)| b ^ k));
        }
        out
    }
}

impl Cipher for KeystreamCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.apply(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        self.apply(ciphertext)
    }
}

/// Source of managed-account private keys.
pub trait KeyProvider: Send + Sync {
    /// List all stored private keys as hex strings.
    fn list_keys(&self) -> Result<Vec<String>>;
}

/// Encrypted JSON key file on disk: the ciphertext decrypts to a JSON array
/// of hex private keys.
pub struct EncryptedKeyFile {
    path: PathBuf,
    cipher: Box<dyn Cipher>,
}

impl EncryptedKeyFile {
    pub fn new(path: impl AsRef<Path>, cipher: Box<dyn Cipher>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cipher,
        }
    }

    /// Encrypt and write the full key list, replacing any previous content.
    pub fn store_keys(&self, keys: &[String]) -> Result<()> {
        let plain = serde_json::to_vec(keys)?;
        let blob = self.cipher.encrypt(&plain);
        std::fs::write(&self.path, blob).map_err(|source| KeyStoreError::Unwritable {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), keys = keys.len(), "Key file written");
        Ok(())
    }
}

impl KeyProvider for EncryptedKeyFile {
    fn list_keys(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Err(KeyStoreError::Missing {
                path: self.path.clone(),
            }
            .into());
        }
        let blob = std::fs::read(&self.path).map_err(|source| KeyStoreError::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        let plain = self.cipher.decrypt(&blob);
        let keys: Vec<String> =
            serde_json::from_slice(&plain).map_err(|e| KeyStoreError::DecryptFailed {
                reason: e.to_string(),
            })?;
        Ok(keys)
    }
}

/// One wallet of the trading pool.
///
/// `held_asset` always indexes one of the two alternating basis assets
/// (0 or 1). `exhausted` collects the symbols found below the tradeable
/// floor in the current funding epoch; once it holds both, the engine
/// refunds the wallet and clears it.
pub struct ManagedAccount {
    pub signer: PrivateKeySigner,
    pub address: Address,
    pub held_asset: usize,
    pub exhausted: HashSet<String>,
}

impl ManagedAccount {
    /// Build an account from a stored hex key; the address is derived from
    /// the key, never stored separately.
    pub fn from_key(key: &str, index: usize) -> Result<Self> {
        let signer = parse_and_validate_private_key(key, "managed key").map_err(|e| {
            KeyStoreError::MalformedKey {
                index,
                reason: e.to_string(),
            }
        })?;
        Ok(Self::from_signer(signer))
    }

    /// Wrap a signer; the starting held asset is drawn uniformly at random.
    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self {
            signer,
            address,
            held_asset: rand::thread_rng().gen_range(0..2),
            exhausted: HashSet::new(),
        }
    }

    /// Generate a fresh account with a random key (provisioning runs).
    pub fn generate() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    /// The account's key as a hex string for storage.
    pub fn key_hex(&self) -> String {
        hex::encode(self.signer.to_bytes())
    }

    /// Alternate the held asset after a successful trade (0 <-> 1).
    pub fn flip_held_asset(&mut self) {
        self.held_asset = (self.held_asset + 1) % 2;
    }

    pub fn mark_exhausted(&mut self, symbol: &str) {
        self.exhausted.insert(symbol.to_string());
    }

    /// Both alternating assets are below the floor; a refund cycle is due.
    pub fn fully_exhausted(&self) -> bool {
        self.exhausted.len() >= 2
    }

    pub fn clear_exhausted(&mut self) {
        self.exhausted.clear();
    }
}

/// The operator account plus the managed wallet pool.
pub struct AccountRegistry {
    pub operator: PrivateKeySigner,
    pub accounts: Vec<ManagedAccount>,
}

impl AccountRegistry {
    /// Load the pool from a key provider. Missing key material is fatal.
    pub fn load(operator: PrivateKeySigner, provider: &dyn KeyProvider) -> Result<Self> {
        let keys = provider.list_keys()?;
        let accounts = keys
            .iter()
            .enumerate()
            .map(|(i, key)| ManagedAccount::from_key(key, i))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(accounts = accounts.len(), "Account registry loaded");
        Ok(Self { operator, accounts })
    }

    /// Registry with no managed accounts yet (provisioning entry point).
    pub fn empty(operator: PrivateKeySigner) -> Self {
        Self {
            operator,
            accounts: Vec::new(),
        }
    }

    pub fn operator_address(&self) -> Address {
        self.operator.address()
    }

    /// Export all managed keys for storage.
    pub fn export_keys(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.key_hex()).collect()
    }
}
