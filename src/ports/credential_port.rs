use crate::error::Result;

/// Decrypts ciphertext credential fields. Encryption/secret storage is an
/// external collaborator; this crate only ever handles already-encrypted
/// bytes and calls through this trait to obtain plaintext transiently, for
/// the duration of one authentication attempt.
pub trait CredentialDecryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String>;
}

/// Test-only decryptor that treats ciphertext as already-plaintext UTF-8.
pub struct PlaintextDecryptor;

impl CredentialDecryptor for PlaintextDecryptor {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        String::from_utf8(ciphertext.to_vec())
            .map_err(|e| crate::error::AppError::parse(e.to_string()))
    }
}
