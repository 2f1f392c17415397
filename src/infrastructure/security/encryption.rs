//! Vault value encryption
//!
//! API key values are sealed with AES-256-GCM under the configured master
//! key. A sealed value is `enc:v1:` followed by base64 of the 12-byte nonce
//! and the ciphertext. Values without the prefix are treated as plaintext so
//! keys stored before a master key was configured stay readable.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::models::SecurityConfig;
use crate::core::error::AppError;
use crate::core::result::{AppResult, ResultExt};

/// Prefix marking a sealed value
pub const SEALED_PREFIX: &str = "enc:v1:";

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// AES-256-GCM sealing for vault values
pub struct VaultCipher {
    key: Option<Zeroizing<[u8; KEY_SIZE]>>,
}

impl std::fmt::Debug for VaultCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCipher")
            .field("enabled", &self.key.is_some())
            .finish()
    }
}

impl VaultCipher {
    /// Build from configuration; an empty key disables sealing
    pub fn from_config(config: &SecurityConfig) -> AppResult<Self> {
        if config.encryption_key.is_empty() {
            warn!("⚠️  No vault encryption key configured, API keys are stored as given");
            return Ok(Self { key: None });
        }

        let decoded = Zeroizing::new(
            BASE64
                .decode(config.encryption_key.trim())
                .map_config_err(|| "Invalid vault encryption key".to_string())?,
        );
        Self::from_key_bytes(&decoded)
    }

    /// Build from raw key material
    pub fn from_key_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(AppError::config(format!(
                "Vault encryption key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(bytes);
        info!("🔐 Vault encryption enabled (AES-256-GCM)");
        Ok(Self { key: Some(key) })
    }

    /// Cipher that passes values through unchanged
    pub fn disabled() -> Self {
        Self { key: None }
    }

    /// Whether values are sealed
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Seal a plaintext value
    pub fn seal(&self, plaintext: &str) -> AppResult<String> {
        let Some(key) = &self.key else {
            return Ok(plaintext.to_string());
        };

        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| AppError::internal(format!("Invalid cipher key: {}", e)))?;
        let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| AppError::vault("Encryption failed"))?;

        let mut payload = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        debug!("🔒 Sealed vault value ({} bytes)", plaintext.len());
        Ok(format!("{}{}", SEALED_PREFIX, BASE64.encode(payload)))
    }

    /// Open a sealed value; unsealed values are returned as is
    pub fn open(&self, stored: &str) -> AppResult<Zeroizing<String>> {
        let Some(encoded) = stored.strip_prefix(SEALED_PREFIX) else {
            return Ok(Zeroizing::new(stored.to_string()));
        };
        let Some(key) = &self.key else {
            return Err(AppError::vault("Value is encrypted but no vault encryption key is configured"));
        };

        let payload = BASE64
            .decode(encoded)
            .map_err(|e| AppError::vault(format!("Sealed value is not valid base64: {}", e)))?;
        if payload.len() <= NONCE_SIZE {
            return Err(AppError::vault("Sealed value is truncated"));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| AppError::internal(format!("Invalid cipher key: {}", e)))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| AppError::vault("Decryption failed: wrong key or tampered value"))?,
        );

        String::from_utf8(plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| AppError::vault("Decrypted value is not UTF-8"))
    }
}

/// Whether a stored value is sealed
pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_seal_and_open() {
        let cipher = VaultCipher::from_key_bytes(&[42u8; 32]).unwrap();
        let sealed = cipher.seal("helius-secret-key").unwrap();

        assert!(is_sealed(&sealed));
        assert!(!sealed.contains("helius-secret-key"));
        assert_eq!(cipher.open(&sealed).unwrap().as_str(), "helius-secret-key");
    }

    #[test]
    fn test_nonces_differ() {
        let cipher = VaultCipher::from_key_bytes(&[1u8; 32]).unwrap();
        assert_ne!(cipher.seal("same").unwrap(), cipher.seal("same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = VaultCipher::from_key_bytes(&[1u8; 32]).unwrap().seal("value").unwrap();
        let other = VaultCipher::from_key_bytes(&[2u8; 32]).unwrap();

        assert_matches!(other.open(&sealed), Err(AppError::Vault { .. }));
        assert_matches!(VaultCipher::disabled().open(&sealed), Err(AppError::Vault { .. }));
    }

    #[test]
    fn test_plaintext_passthrough() {
        let cipher = VaultCipher::disabled();
        assert_eq!(cipher.seal("plain").unwrap(), "plain");
        assert_eq!(cipher.open("plain").unwrap().as_str(), "plain");
    }

    #[test]
    fn test_config_key_length_checked() {
        let config = SecurityConfig {
            encryption_key: BASE64.encode([0u8; 16]),
            ..SecurityConfig::default()
        };
        assert_matches!(VaultCipher::from_config(&config), Err(AppError::Config { .. }));
    }
}
