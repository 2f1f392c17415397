//! Security infrastructure module
//!
//! Vault value encryption and passphrase verification.

pub mod authentication;
pub mod encryption;

pub use authentication::{hash_passphrase, verify_passphrase};
pub use encryption::{is_sealed, VaultCipher};

/// Secrets shorter than this are masked completely
const MIN_PARTIAL_MASK_LEN: usize = 16;

/// Mask a secret for display, keeping the first and last four characters
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < MIN_PARTIAL_MASK_LEN {
        return "•".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}
