//! Credential vault: AES-256-GCM over secrets at rest.
//!
//! The 256-bit key is stretched from a single process secret with
//! scrypt and a fixed application salt. Key uniqueness comes entirely
//! from the process secret; treat it as a root secret.
//!
//! At-rest format: `hex(nonce):hex(tag):hex(ciphertext)`, three fields
//! exactly. A fresh random 96-bit nonce is drawn per encryption, so two
//! encryptions of the same plaintext never collide.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use once_cell::sync::OnceCell;
use rand::RngCore;

use crate::errors::CryptoError;

/// Fixed application-wide KDF salt. Deliberate tradeoff: per-value
/// salts would force re-deriving the key on every operation.
const KDF_SALT: &[u8] = b"toolgate-vault-v1";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug)]
pub struct VaultCrypto {
    key: [u8; 32],
}

impl VaultCrypto {
    /// Derive the vault key from the process secret. `None` means the
    /// deployment never configured a secret; the error is raised here,
    /// at call time, so the process itself can still start.
    pub fn new(master_secret: Option<&str>) -> Result<Self, CryptoError> {
        let secret = master_secret.ok_or(CryptoError::MissingMasterSecret)?;

        let params = scrypt::Params::new(14, 8, 1, 32)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let mut key = [0u8; 32];
        scrypt::scrypt(secret.as_bytes(), KDF_SALT, &params, &mut key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the 16-byte tag to the ciphertext; split it
        // back out so the stored format carries the tag as its own field.
        let mut sealed = cipher
            .encrypt(nonce, Payload::from(plaintext.as_bytes()))
            .map_err(|_| CryptoError::Authentication)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(sealed)
        ))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let parts: Vec<&str> = stored.split(':').collect();
        if parts.len() != 3 {
            return Err(CryptoError::Format);
        }

        let nonce_bytes = hex::decode(parts[0]).map_err(|_| CryptoError::Format)?;
        let tag = hex::decode(parts[1]).map_err(|_| CryptoError::Format)?;
        let ciphertext = hex::decode(parts[2]).map_err(|_| CryptoError::Format)?;

        if nonce_bytes.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(CryptoError::Format);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(nonce, Payload::from(sealed.as_slice()))
            .map_err(|_| CryptoError::Authentication)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Format)
    }
}

/// Process-wide vault handle. Key derivation is deferred to first use
/// so a missing master secret fails the operation, not the process.
pub struct Vault {
    master_secret: Option<String>,
    crypto: OnceCell<VaultCrypto>,
}

impl Vault {
    pub fn new(master_secret: Option<String>) -> Self {
        Self {
            master_secret,
            crypto: OnceCell::new(),
        }
    }

    fn crypto(&self) -> Result<&VaultCrypto, CryptoError> {
        self.crypto
            .get_or_try_init(|| VaultCrypto::new(self.master_secret.as_deref()))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.crypto()?.encrypt(plaintext)
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        self.crypto()?.decrypt(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> VaultCrypto {
        VaultCrypto::new(Some("test-master-secret")).unwrap()
    }

    #[test]
    fn roundtrip() {
        let v = vault();
        let stored = v.encrypt("ya29.a0AfH6-refresh-token").unwrap();
        assert_eq!(v.decrypt(&stored).unwrap(), "ya29.a0AfH6-refresh-token");
    }

    #[test]
    fn nonce_randomness_prevents_identical_ciphertexts() {
        let v = vault();
        let a = v.encrypt("same-plaintext").unwrap();
        let b = v.encrypt("same-plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn stored_format_has_three_hex_fields() {
        let v = vault();
        let stored = v.encrypt("x").unwrap();
        let parts: Vec<&str> = stored.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), NONCE_LEN * 2);
        assert_eq!(parts[1].len(), TAG_LEN * 2);
        assert!(parts.iter().all(|p| hex::decode(p).is_ok()));
    }

    #[test]
    fn wrong_field_count_is_a_format_error() {
        let v = vault();
        let err = v.decrypt("deadbeef:cafebabe").unwrap_err();
        assert!(matches!(err, CryptoError::Format));
    }

    #[test]
    fn flipped_ciphertext_is_an_authentication_error() {
        let v = vault();
        let stored = v.encrypt("secret-value").unwrap();
        let mut parts: Vec<String> = stored.split(':').map(String::from).collect();
        // Flip one hex character in the ciphertext field.
        let ct = &mut parts[2];
        let first = ct.remove(0);
        let flipped = if first == '0' { '1' } else { '0' };
        ct.insert(0, flipped);

        let err = v.decrypt(&parts.join(":")).unwrap_err();
        assert!(matches!(err, CryptoError::Authentication));
    }

    #[test]
    fn missing_master_secret_fails_at_call_time() {
        let err = VaultCrypto::new(None).unwrap_err();
        assert!(matches!(err, CryptoError::MissingMasterSecret));
    }

    #[test]
    fn vault_handle_defers_missing_secret_to_first_use() {
        let v = Vault::new(None);
        let err = v.encrypt("anything").unwrap_err();
        assert!(matches!(err, CryptoError::MissingMasterSecret));
    }
}
