use crate::domain::{EncryptError, EncryptedData, Encrypter};

pub const NOOP_ALG: &str = "none";
pub const NOOP_KID: &str = "none";

/// Pass-through encrypter for deployments that store plaintext
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEncrypter;

impl Encrypter for NoopEncrypter {
    fn encrypt_message(&self, plaintext: &[u8]) -> Result<EncryptedData, EncryptError> {
        Ok(EncryptedData {
            ciphertext: plaintext.to_vec(),
            nonce: Vec::new(),
            alg: NOOP_ALG.to_string(),
            kid: NOOP_KID.to_string(),
        })
    }
}
