//! Password-encrypted mnemonic snapshot
//!
//! The snapshot is a small JSON file holding the mnemonic encrypted with
//! AES-256-GCM under a key stretched from the password with Argon2id. The
//! seed is decrypted per call into a zeroizing buffer and never cached.

use super::mnemonic::{addresses_from_seed, mnemonic_to_seed, sign_with_seed};
use super::types::{Chain, GenerateAddressOptions};
use super::SecretManage;
use crate::block::payload::SignatureUnlock;
use crate::block::Address;
use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

const SNAPSHOT_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    version: u32,
    created_at: DateTime<Utc>,
    salt: String,
    nonce: String,
    ciphertext: String,
}

pub struct VaultSecretManager {
    snapshot_path: PathBuf,
    password: Option<Zeroizing<String>>,
}

impl core::fmt::Debug for VaultSecretManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VaultSecretManager")
            .field("snapshot_path", &self.snapshot_path)
            .finish_non_exhaustive()
    }
}

fn stretch_password(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| Error::Vault(format!("key derivation failed: {}", e)))?;
    Ok(key)
}

fn decode_field(value: &str, name: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| Error::Vault(format!("corrupt snapshot {}: {}", name, e)))
}

impl VaultSecretManager {
    pub fn new(snapshot_path: impl AsRef<Path>, password: Option<String>) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
            password: password.map(Zeroizing::new),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn has_mnemonic(&self) -> bool {
        self.snapshot_path.exists()
    }

    fn password(&self) -> Result<&str> {
        self.password
            .as_ref()
            .map(|p| p.as_str())
            .ok_or(Error::MissingParameter("password"))
    }

    /// Encrypts `mnemonic` into a new snapshot. An existing snapshot is
    /// never overwritten.
    pub fn store_mnemonic(&self, mnemonic: &str) -> Result<()> {
        let mnemonic = Zeroizing::new(mnemonic.trim().to_string());
        mnemonic_to_seed(&mnemonic)?;
        if self.has_mnemonic() {
            return Err(Error::MnemonicAlreadyStored);
        }

        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let key = stretch_password(self.password()?, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| Error::Vault(format!("invalid key: {}", e)))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), mnemonic.as_bytes())
            .map_err(|e| Error::Vault(format!("encryption failed: {}", e)))?;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            salt: STANDARD.encode(salt),
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        };
        if let Some(parent) = self.snapshot_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.snapshot_path.with_extension("tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(&snapshot)?)?;
        fs::rename(&tmp_path, &self.snapshot_path)?;
        info!(path = %self.snapshot_path.display(), "mnemonic stored in vault");
        Ok(())
    }

    fn load_seed(&self) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = fs::read(&self.snapshot_path).map_err(|e| {
            Error::Vault(format!("cannot read snapshot {}: {}", self.snapshot_path.display(), e))
        })?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Vault(format!("corrupt snapshot: {}", e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Vault(format!("unsupported snapshot version {}", snapshot.version)));
        }

        let salt = decode_field(&snapshot.salt, "salt")?;
        let nonce = decode_field(&snapshot.nonce, "nonce")?;
        let ciphertext = decode_field(&snapshot.ciphertext, "ciphertext")?;
        if nonce.len() != NONCE_LEN {
            return Err(Error::Vault("corrupt snapshot nonce".to_string()));
        }

        let key = stretch_password(self.password()?, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| Error::Vault(format!("invalid key: {}", e)))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
                .map_err(|_| Error::VaultPassword)?,
        );
        let mnemonic = std::str::from_utf8(&plaintext)
            .map_err(|_| Error::Vault("snapshot does not hold a mnemonic".to_string()))?;
        mnemonic_to_seed(mnemonic)
    }
}

#[async_trait]
impl SecretManage for VaultSecretManager {
    async fn generate_addresses(
        &self,
        coin_type: u32,
        account_index: u32,
        range: Range<u32>,
        internal: bool,
        _options: Option<GenerateAddressOptions>,
    ) -> Result<Vec<Address>> {
        let seed = self.load_seed()?;
        addresses_from_seed(&seed, coin_type, account_index, range, internal)
    }

    async fn sign(&self, message: &[u8], chain: &Chain) -> Result<SignatureUnlock> {
        let seed = self.load_seed()?;
        sign_with_seed(&seed, message, chain)
    }
}
