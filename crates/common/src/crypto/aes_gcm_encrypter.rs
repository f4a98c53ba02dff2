use crate::domain::{DomainError, DomainResult, EncryptError, EncryptedData, Encrypter};
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use base64::Engine as _;
use rand::RngCore;
use std::fmt;

pub const AES_GCM_ALG: &str = "aes-256-gcm";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// AES-256-GCM encrypter with a fresh random 96-bit nonce per message
pub struct AesGcmEncrypter {
    cipher: Aes256Gcm,
    kid: String,
}

impl fmt::Debug for AesGcmEncrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmEncrypter")
            .field("kid", &self.kid)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl AesGcmEncrypter {
    pub fn new(key: &[u8], kid: impl Into<String>) -> DomainResult<Self> {
        if key.len() != KEY_LEN {
            return Err(DomainError::InvalidEncryptionKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| DomainError::InvalidEncryptionKey(e.to_string()))?;

        Ok(Self {
            cipher,
            kid: kid.into(),
        })
    }

    /// Build from a standard base64 encoded key
    pub fn from_base64(encoded_key: &str, kid: impl Into<String>) -> DomainResult<Self> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded_key.trim())
            .map_err(|e| DomainError::InvalidEncryptionKey(e.to_string()))?;
        Self::new(&key, kid)
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Reverse of [`Encrypter::encrypt_message`]
    pub fn decrypt_message(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, EncryptError> {
        if nonce.len() != NONCE_LEN {
            return Err(EncryptError::Encryption(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            )));
        }
        self.cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| EncryptError::Encryption(e.to_string()))
    }
}

impl Encrypter for AesGcmEncrypter {
    fn encrypt_message(&self, plaintext: &[u8]) -> Result<EncryptedData, EncryptError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| EncryptError::Encryption(e.to_string()))?;

        Ok(EncryptedData {
            ciphertext,
            nonce: nonce.to_vec(),
            alg: AES_GCM_ALG.to_string(),
            kid: self.kid.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_encrypter() -> AesGcmEncrypter {
        AesGcmEncrypter::new(&[7u8; 32], "key-1").unwrap()
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let encrypter = test_encrypter();
        let encrypted = encrypter.encrypt_message(b"device payload").unwrap();

        assert_ne!(encrypted.ciphertext, b"device payload".to_vec());
        assert_eq!(encrypted.nonce.len(), 12);
        assert_eq!(encrypted.alg, "aes-256-gcm");
        assert_eq!(encrypted.kid, "key-1");

        let plaintext = encrypter
            .decrypt_message(&encrypted.ciphertext, &encrypted.nonce)
            .unwrap();
        assert_eq!(plaintext, b"device payload".to_vec());
    }

    #[test]
    fn test_nonces_are_unique() {
        let encrypter = test_encrypter();
        let first = encrypter.encrypt_message(b"same").unwrap();
        let second = encrypter.encrypt_message(b"same").unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let encrypter = test_encrypter();
        let mut encrypted = encrypter.encrypt_message(b"secret").unwrap();
        encrypted.ciphertext[0] ^= 0xff;

        let result = encrypter.decrypt_message(&encrypted.ciphertext, &encrypted.nonce);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_key_length_is_rejected() {
        let result = AesGcmEncrypter::new(&[1u8; 16], "short");
        assert!(matches!(result, Err(DomainError::InvalidEncryptionKey(_))));
    }

    #[test]
    fn test_from_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([9u8; 32]);
        let encrypter = AesGcmEncrypter::from_base64(&encoded, "b64").unwrap();
        assert_eq!(encrypter.kid(), "b64");

        let invalid = AesGcmEncrypter::from_base64("not base64!!", "b64");
        assert!(invalid.is_err());
    }
}
