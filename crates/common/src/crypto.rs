mod aes_gcm_encrypter;
mod noop_encrypter;

pub use aes_gcm_encrypter::*;
pub use noop_encrypter::*;
