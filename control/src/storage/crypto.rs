//! Encryption of node keys at rest
//!
//! Keys are sealed with AES-256-GCM under a 32-byte key from the settings.
//! The stored form is `base64(nonce || ciphertext)` with a fresh 96-bit nonce
//! per write.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::ControlError;

const NONCE_LEN: usize = 12;

/// Seals and opens node keys
#[derive(Clone)]
pub struct KeyCipher {
    cipher: Aes256Gcm,
}

impl KeyCipher {
    /// Build from a base64-encoded 32-byte key
    pub fn from_base64(encoded: &SecretString) -> Result<Self, ControlError> {
        let bytes = STANDARD
            .decode(encoded.expose_secret().trim())
            .map_err(|e| ControlError::CryptoError(format!("encryption key is not base64: {}", e)))?;

        let cipher = Aes256Gcm::new_from_slice(&bytes).map_err(|_| {
            ControlError::CryptoError(format!(
                "encryption key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;

        Ok(Self { cipher })
    }

    /// Generate a new random key, base64-encoded
    pub fn generate_key() -> String {
        let key = Aes256Gcm::generate_key(OsRng);
        STANDARD.encode(key)
    }

    pub fn encrypt(&self, secret: &SecretString) -> Result<String, ControlError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, secret.expose_secret().as_bytes())
            .map_err(|_| ControlError::CryptoError("failed to encrypt node key".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<SecretString, ControlError> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|e| ControlError::CryptoError(format!("sealed key is not base64: {}", e)))?;
        if bytes.len() <= NONCE_LEN {
            return Err(ControlError::CryptoError("sealed key is truncated".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map_err(|_| {
                ControlError::CryptoError("failed to decrypt node key (wrong key?)".to_string())
            })?;

        String::from_utf8(plaintext)
            .map(SecretString::from)
            .map_err(|_| ControlError::CryptoError("decrypted key is not UTF-8".to_string()))
    }
}
