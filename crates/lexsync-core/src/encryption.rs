// Note: Deprecation warnings from generic-array 0.14.x are expected
// until aes-gcm moves to generic-array 1.x
#![allow(deprecated)]

use aes_gcm::{
    aead::{Aead, KeyInit},
    AeadCore, Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;

const NONCE_LENGTH: usize = 12;

/// Encrypts connection credentials (access/refresh tokens) at rest with
/// AES-256-GCM. Tokens are stored as base64(nonce + ciphertext).
#[derive(Debug)]
pub struct EncryptionService {
    master_key: Arc<[u8; 32]>,
}

impl EncryptionService {
    /// Creates a new EncryptionService with the given master key.
    /// Accepts either a raw 32-byte key or a hex-encoded 64-character key.
    pub fn new(master_key: &str) -> Result<Self> {
        let key_bytes = if master_key.len() == 32 {
            master_key.as_bytes().to_vec()
        } else if master_key.len() == 64 {
            hex::decode(master_key).map_err(|e| anyhow!("Invalid hex key: {}", e))?
        } else {
            return Err(anyhow!(
                "Master key must be exactly 32 bytes or 64 hex characters"
            ));
        };

        if key_bytes.len() != 32 {
            return Err(anyhow!("Master key must be exactly 32 bytes"));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);

        Ok(Self {
            master_key: Arc::new(key),
        })
    }

    /// Encrypts data, returning base64 encoded nonce + ciphertext
    pub fn encrypt(&self, data: &[u8]) -> Result<String> {
        let cipher = Aes256Gcm::new(self.master_key.as_slice().into());
        let nonce = Aes256Gcm::generate_nonce(&mut aes_gcm::aead::OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, data)
            .map_err(|e| anyhow!("Encryption error: {}", e))?;

        let mut combined = nonce.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypts base64 encoded data that was encrypted with encrypt()
    pub fn decrypt(&self, encoded_data: &str) -> Result<Vec<u8>> {
        let data = BASE64
            .decode(encoded_data)
            .map_err(|e| anyhow!("Base64 decode error: {}", e))?;

        if data.len() < NONCE_LENGTH {
            return Err(anyhow!("Invalid encrypted data"));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LENGTH);
        let cipher = Aes256Gcm::new(self.master_key.as_slice().into());

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| anyhow!("Decryption error: {}", e))?;

        Ok(plaintext)
    }

    /// Encrypts a string token
    pub fn encrypt_string(&self, data: &str) -> Result<String> {
        self.encrypt(data.as_bytes())
    }

    /// Decrypts to a UTF-8 string token
    pub fn decrypt_string(&self, encoded_data: &str) -> Result<String> {
        let decrypted = self.decrypt(encoded_data)?;
        String::from_utf8(decrypted).map_err(|e| anyhow!("UTF-8 decode failed: {}", e))
    }

    /// Generates a random 32-byte key as a hex string (for direct use with new())
    pub fn generate_raw_key() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_new_with_valid_keys() {
        assert!(EncryptionService::new("12345678901234567890123456789012").is_ok());
        assert!(EncryptionService::new(TEST_KEY).is_ok());
    }

    #[test]
    fn test_new_with_invalid_key() {
        assert!(EncryptionService::new("too-short").is_err());
        assert!(EncryptionService::new(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let service = EncryptionService::new(TEST_KEY).unwrap();
        let token = "oauth-access-token-xyz";
        let encrypted = service.encrypt_string(token).unwrap();
        assert_ne!(encrypted, token);
        assert_eq!(service.decrypt_string(&encrypted).unwrap(), token);
    }

    #[test]
    fn test_decrypt_garbage_fails() {
        let service = EncryptionService::new(TEST_KEY).unwrap();
        assert!(service.decrypt("not base64 at all!!!").is_err());
        assert!(service.decrypt("YWJj").is_err()); // too short for a nonce
    }

    #[test]
    fn test_generated_key_is_usable() {
        let key = EncryptionService::generate_raw_key();
        assert_eq!(key.len(), 64);
        assert!(EncryptionService::new(&key).is_ok());
    }
}
