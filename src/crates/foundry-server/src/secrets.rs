//! AEAD encryption of workflow environments
//!
//! Workflow secrets are stored as one opaque blob: 12-byte random nonce
//! followed by the AES-256-GCM ciphertext of the JSON-encoded variable map,
//! base64-encoded. The key is process-wide and immutable after startup.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::HashMap;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("encryption key must be 32 base64-encoded bytes: {0}")]
    BadKey(String),

    #[error("malformed environment blob: {0}")]
    Malformed(String),

    #[error("decryption failed")]
    Decrypt,
}

/// Process-wide cipher for `encryptedEnvironment` blobs.
pub struct EnvCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EnvCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCipher").finish_non_exhaustive()
    }
}

impl EnvCipher {
    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, SecretError> {
        let bytes = BASE64
            .decode(key_b64.trim())
            .map_err(|e| SecretError::BadKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(SecretError::BadKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a variable map into an opaque blob.
    pub fn encrypt_env(&self, vars: &HashMap<String, String>) -> Result<String, SecretError> {
        let plaintext =
            serde_json::to_vec(vars).map_err(|e| SecretError::Malformed(e.to_string()))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| SecretError::Decrypt)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a blob back into the variable map.
    pub fn decrypt_env(&self, blob: &str) -> Result<HashMap<String, String>, SecretError> {
        let bytes = BASE64
            .decode(blob.trim())
            .map_err(|e| SecretError::Malformed(e.to_string()))?;
        if bytes.len() < NONCE_LEN {
            return Err(SecretError::Malformed("blob shorter than nonce".into()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Decrypt)?;
        serde_json::from_slice(&plaintext).map_err(|e| SecretError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        BASE64.encode([7u8; 32])
    }

    #[test]
    fn test_round_trip() {
        let cipher = EnvCipher::from_base64_key(&test_key()).unwrap();
        let vars = HashMap::from([
            ("API_KEY".to_string(), "sk-123".to_string()),
            ("REGION".to_string(), "eu-west-1".to_string()),
        ]);
        let blob = cipher.encrypt_env(&vars).unwrap();
        assert_eq!(cipher.decrypt_env(&blob).unwrap(), vars);
    }

    #[test]
    fn test_blobs_are_nondeterministic() {
        let cipher = EnvCipher::from_base64_key(&test_key()).unwrap();
        let vars = HashMap::from([("A".to_string(), "1".to_string())]);
        assert_ne!(
            cipher.encrypt_env(&vars).unwrap(),
            cipher.encrypt_env(&vars).unwrap()
        );
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let cipher = EnvCipher::from_base64_key(&test_key()).unwrap();
        let other = EnvCipher::from_base64_key(&BASE64.encode([9u8; 32])).unwrap();
        let blob = cipher
            .encrypt_env(&HashMap::from([("A".to_string(), "1".to_string())]))
            .unwrap();
        assert!(matches!(other.decrypt_env(&blob), Err(SecretError::Decrypt)));
    }

    #[test]
    fn test_bad_key_length() {
        let err = EnvCipher::from_base64_key(&BASE64.encode([1u8; 16])).unwrap_err();
        assert!(matches!(err, SecretError::BadKey(_)));
    }

    #[test]
    fn test_malformed_blob() {
        let cipher = EnvCipher::from_base64_key(&test_key()).unwrap();
        assert!(matches!(
            cipher.decrypt_env("not base64!!!"),
            Err(SecretError::Malformed(_))
        ));
        assert!(matches!(
            cipher.decrypt_env(&BASE64.encode([0u8; 4])),
            Err(SecretError::Malformed(_))
        ));
    }
}
