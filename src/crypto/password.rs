use argon2::Argon2;
use rand::Rng;
use subtle::ConstantTimeEq;

use crate::db::models::PasswordDigest;
use crate::error::AppError;

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; 32] {
    rand::thread_rng().gen()
}

/// Hash a password with Argon2id using the provided salt
pub fn hash_password(password: &str, salt: &[u8]) -> Result<[u8; 32], AppError> {
    let argon2 = Argon2::default();
    let mut hash = [0u8; 32];

    argon2
        .hash_password_into(password.as_bytes(), salt, &mut hash)
        .map_err(|e| AppError::Crypto(format!("Password hashing failed: {}", e)))?;

    Ok(hash)
}

/// Salt and hash a password into the form kept on a user record.
pub fn digest_password(password: &str) -> Result<PasswordDigest, AppError> {
    let salt = generate_salt();
    let hash = hash_password(password, &salt)?;

    Ok(PasswordDigest {
        hash: hex::encode(hash),
        salt: hex::encode(salt),
    })
}

/// Verify a password against a stored digest
pub fn verify_password(password: &str, digest: &PasswordDigest) -> Result<bool, AppError> {
    let salt = hex::decode(&digest.salt)
        .map_err(|e| AppError::Crypto(format!("Stored salt is not hex: {}", e)))?;
    let stored = hex::decode(&digest.hash)
        .map_err(|e| AppError::Crypto(format!("Stored hash is not hex: {}", e)))?;

    let computed = hash_password(password, &salt)?;
    Ok(bool::from(computed.as_slice().ct_eq(stored.as_slice())))
}
