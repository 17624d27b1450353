//! secp256k1 keys and signature unlocks
//!
//! Unlocks sign SHA-256 of the message with compact ECDSA. Key addresses are
//! SHA-256 of the compressed public key.

use crate::block::payload::SignatureUnlock;
use crate::block::Address;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::constants::SECRET_KEY_SIZE;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

fn message_digest(message: &[u8]) -> Message {
    Message::from_digest(Sha256::digest(message).into())
}

/// Bytes of the key address owned by `public_key`.
pub fn key_address_bytes(public_key: &PublicKey) -> [u8; 32] {
    Sha256::digest(public_key.serialize()).into()
}

/// Parses a compressed public key given as hex, with or without `0x`.
pub fn public_key_from_hex(hex: &str) -> Result<PublicKey> {
    let bytes = crate::block::serde_hex::decode(hex)?;
    PublicKey::from_slice(&bytes).map_err(|e| Error::Crypto(format!("invalid public key {}: {}", hex, e)))
}

/// A derived signing key. Exists only for the duration of a signing call;
/// the scalar is wiped on drop.
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_secret_key(SecretKey::new(&mut OsRng))
    }

    fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(Error::Crypto(format!(
                "secret key must be {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn public_key_bytes(&self) -> [u8; secp256k1::constants::PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    /// Signature unlock over SHA-256(`message`).
    pub fn sign(&self, message: &[u8]) -> SignatureUnlock {
        let signature = SECP.sign_ecdsa(&message_digest(message), &self.secret_key);
        SignatureUnlock {
            public_key: self.public_key_bytes(),
            signature: signature.serialize_compact(),
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.non_secure_erase();
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Checks that `unlock` signs SHA-256(`message`).
pub fn verify_unlock(unlock: &SignatureUnlock, message: &[u8]) -> Result<()> {
    let public_key = PublicKey::from_slice(&unlock.public_key)?;
    let signature = Signature::from_compact(&unlock.signature)?;
    SECP.verify_ecdsa(&message_digest(message), &signature, &public_key)
        .map_err(|_| Error::Crypto("signature does not match the public key".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_address() {
        let pair = KeyPair::generate();
        assert_eq!(pair.address(), Address::Key(key_address_bytes(pair.public_key())));
    }

    #[test]
    fn test_unlock_verifies_against_its_message() {
        let pair = KeyPair::from_secret_bytes(&[7u8; 32]).unwrap();
        let unlock = pair.sign(b"essence hash");
        verify_unlock(&unlock, b"essence hash").unwrap();
        assert!(verify_unlock(&unlock, b"another essence").is_err());
        // RFC 6979 nonces
        assert_eq!(unlock, pair.sign(b"essence hash"));
    }

    #[test]
    fn test_swapped_public_key_is_rejected() {
        let mut unlock = KeyPair::generate().sign(b"m");
        unlock.public_key = KeyPair::generate().public_key_bytes();
        let err = verify_unlock(&unlock, b"m").unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_secret_key_length() {
        assert!(KeyPair::from_secret_bytes(&[1u8; 31]).is_err());
        assert!(KeyPair::from_secret_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_public_key_from_hex() {
        let pair = KeyPair::generate();
        let hex = crate::block::serde_hex::encode(pair.public_key_bytes());
        assert_eq!(&public_key_from_hex(&hex).unwrap(), pair.public_key());
        assert!(public_key_from_hex("0x1234").is_err());
    }
}
