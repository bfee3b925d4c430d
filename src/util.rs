//! Shared helpers: key generation, expiry arithmetic and password hashing.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::rngs::OsRng;

use crate::error::Result;

/// Length of generated API keys and license keys.
pub const KEY_LENGTH: usize = 32;

const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Random URL-safe key of `len` characters.
pub fn generate_key(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Random 256-bit session token, hex encoded.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}

/// `base` plus `days` whole days.
pub fn expiry_after_days(base: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    base + Duration::days(i64::from(days))
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Prefixes of bcrypt hashes written by older deployments.
const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

/// Verifies argon2 hashes and legacy bcrypt hashes. False for a malformed
/// stored hash as well as a wrong password.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    if BCRYPT_PREFIXES.iter().any(|p| password_hash.starts_with(p)) {
        return bcrypt::verify(password, password_hash).unwrap_or(false);
    }
    let hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}
