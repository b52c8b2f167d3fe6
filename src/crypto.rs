//! At-rest encryption for respondent PII (email, source IP).
//!
//! Sealed values are `base64(nonce || ciphertext)` with a fresh 96-bit nonce
//! per value.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand_core::RngCore;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption error")]
    Seal,
    #[error("decryption error")]
    Open,
    #[error("invalid key")]
    InvalidKey,
}

#[derive(Clone)]
pub struct PiiCipher {
    cipher: Aes256Gcm,
}

impl PiiCipher {
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, CryptoError> {
        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKey);
        }
        let cipher = Aes256Gcm::new_from_slice(key_bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, value: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let mut ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), value.as_bytes())
            .map_err(|_| CryptoError::Seal)?;
        let mut combined = nonce_bytes.to_vec();
        combined.append(&mut ciphertext);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let data = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|_| CryptoError::Open)?;
        if data.len() <= NONCE_LEN {
            return Err(CryptoError::Open);
        }
        let (nonce_bytes, cipher_bytes) = data.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), cipher_bytes)
            .map_err(|_| CryptoError::Open)?;
        String::from_utf8(plain).map_err(|_| CryptoError::Open)
    }

    pub fn seal_opt(&self, value: Option<&str>) -> Result<Option<String>, CryptoError> {
        value.map(|v| self.seal(v)).transpose()
    }

    /// Opens an optional column. A value that fails to open is logged and
    /// dropped rather than failing the whole read.
    pub fn open_lossy(&self, sealed: Option<&str>, column: &str) -> Option<String> {
        let sealed = sealed?;
        match self.open(sealed) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Failed to open sealed {}: {}", column, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> PiiCipher {
        PiiCipher::from_key_bytes(&[42u8; 32]).unwrap()
    }

    #[test]
    fn test_seal_then_open() {
        let c = cipher();
        let sealed = c.seal("someone@example.com").unwrap();
        assert_ne!(sealed, "someone@example.com");
        assert_eq!(c.open(&sealed).unwrap(), "someone@example.com");
        assert_ne!(c.seal("someone@example.com").unwrap(), sealed);
    }

    #[test]
    fn test_wrong_key_or_tampering_fails() {
        let sealed = cipher().seal("203.0.113.7").unwrap();
        let other = PiiCipher::from_key_bytes(&[7u8; 32]).unwrap();
        assert!(other.open(&sealed).is_err());
        assert!(cipher().open("bm90IHNlYWxlZA==").is_err());
        assert_eq!(cipher().open_lossy(Some("garbage"), "email"), None);
        assert_eq!(cipher().open_lossy(None, "email"), None);
    }

    #[test]
    fn test_key_length_checked() {
        assert!(matches!(PiiCipher::from_key_bytes(&[1u8; 16]), Err(CryptoError::InvalidKey)));
    }
}
