use thiserror::Error;

/// Output of a successful encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    /// Algorithm name stored alongside the record so readers can pick a decrypter
    pub alg: String,
    /// Identifier of the key that produced the ciphertext
    pub kid: String,
}

#[derive(Error, Debug)]
pub enum EncryptError {
    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// Capability boundary for payload encryption
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Encrypter: Send + Sync {
    fn encrypt_message(&self, plaintext: &[u8]) -> Result<EncryptedData, EncryptError>;
}
