//! Vault passphrase verification
//!
//! The vault passphrase is never stored; configuration holds its Argon2 PHC
//! hash and unlock attempts are verified against it.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use tracing::{debug, warn};

use crate::core::error::AppError;
use crate::core::result::AppResult;

/// Hash a passphrase into a PHC string suitable for configuration
pub fn hash_passphrase(passphrase: &str) -> AppResult<String> {
    if passphrase.len() < 8 {
        return Err(AppError::validation("Vault passphrase must be at least 8 characters"));
    }

    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::internal(format!("Failed to encode salt: {}", e)))?;

    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("Failed to hash passphrase: {}", e)))
}

/// Check a passphrase against a PHC hash
pub fn verify_passphrase(passphrase: &str, phc_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(phc_hash)
        .map_err(|e| AppError::config(format!("Invalid vault passphrase hash: {}", e)))?;

    match Argon2::default().verify_password(passphrase.as_bytes(), &parsed) {
        Ok(()) => {
            debug!("🔓 Vault passphrase verified");
            Ok(true)
        }
        Err(argon2::password_hash::Error::Password) => {
            warn!("🚫 Vault passphrase rejected");
            Ok(false)
        }
        Err(e) => Err(AppError::security(format!("Passphrase verification failed: {}", e))),
    }
}
