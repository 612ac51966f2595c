use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::error::AppError;
use crate::Result;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Base64 ciphertext and nonce of a platform access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedToken {
    pub ciphertext: String,
    pub nonce: String,
}

/// Encrypts platform tokens at rest with AES-256-GCM.
pub struct TokenVault {
    key: [u8; KEY_SIZE],
}

impl TokenVault {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    pub fn from_base64_key(key: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|e| AppError::ConfigError(format!("Invalid encryption key: {}", e)))?;

        if bytes.len() != KEY_SIZE {
            return Err(AppError::ConfigError(format!(
                "Encryption key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::InternalError(format!("Cipher setup failed: {}", e)))
    }

    pub fn seal(&self, token: &str) -> Result<SealedToken> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), token.as_bytes())
            .map_err(|e| AppError::InternalError(format!("Encryption failed: {}", e)))?;

        Ok(SealedToken {
            ciphertext: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce_bytes),
        })
    }

    pub fn open(&self, sealed: &SealedToken) -> Result<String> {
        let nonce = BASE64
            .decode(&sealed.nonce)
            .map_err(|e| AppError::InternalError(format!("Invalid nonce: {}", e)))?;
        if nonce.len() != NONCE_SIZE {
            return Err(AppError::InternalError("Invalid nonce length".into()));
        }
        let ciphertext = BASE64
            .decode(&sealed.ciphertext)
            .map_err(|e| AppError::InternalError(format!("Invalid ciphertext: {}", e)))?;

        let plain = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|e| AppError::InternalError(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plain).map_err(|e| AppError::InternalError(format!("Invalid UTF-8: {}", e)))
    }
}
