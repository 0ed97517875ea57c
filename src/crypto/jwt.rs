use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Issuer tag carried by access tokens.
pub const ACCESS_ISSUER: &str = "chirpy-access";
/// Issuer tag reserved for refresh credentials. Refresh tokens here are
/// opaque store keys, so nothing signs with it in normal operation; it stays
/// as the distinct tag that must never pass where `ACCESS_ISSUER` is
/// expected, which is what the issuer-mismatch checks exercise.
pub const REFRESH_ISSUER: &str = "chirpy-refresh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Whether `verify` rejects tokens past their `exp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Enforce,
    Ignore,
}

pub fn sign(secret: &str, issuer: &str, subject: &str, ttl: Duration) -> Result<String, AppError> {
    sign_at(secret, issuer, subject, Utc::now(), ttl)
}

/// Signs an HS256 token as if issued at `issued_at`.
pub fn sign_at(
    secret: &str,
    issuer: &str,
    subject: &str,
    issued_at: DateTime<Utc>,
    ttl: Duration,
) -> Result<String, AppError> {
    let claims = Claims {
        iss: issuer.to_string(),
        sub: subject.to_string(),
        iat: issued_at.timestamp(),
        exp: (issued_at + ttl).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Crypto(format!("Token signing failed: {}", e)))
}

/// Checks signature, expiry and issuer, in that order, and returns the claims.
pub fn verify(
    token: &str,
    secret: &str,
    expected_issuer: &str,
    expiry: Expiry,
) -> Result<Claims, AppError> {
    if token.is_empty() {
        return Err(AppError::TokenMalformed("empty token".to_string()));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = expiry == Expiry::Enforce;
    validation.set_required_spec_claims(&["exp", "sub", "iss"]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            AppError::TokenSignatureInvalid
        }
        _ => AppError::TokenMalformed(e.to_string()),
    })?;

    let claims = data.claims;
    if claims.iss != expected_issuer {
        return Err(AppError::TokenIssuerMismatch {
            expected: expected_issuer.to_string(),
            found: claims.iss,
        });
    }

    Ok(claims)
}
