use std::fmt;

use thiserror::Error;

use crate::db::models::Entity;

/// Coarse classification of every failure the core can report.
///
/// The transport layer maps these to responses; the core itself never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Unauthorized,
    Conflict,
    Validation,
    StorageIo,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::StorageIo => "storage_io",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{entity} {key} was not found")]
    NotFound { entity: Entity, key: String },

    #[error("subject {subject} may not modify {entity} {key}")]
    Forbidden {
        entity: Entity,
        key: String,
        subject: String,
    },

    #[error("{entity} conflict: {reason}")]
    Conflict { entity: Entity, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("token expired")]
    TokenExpired,

    #[error("malformed token: {0}")]
    TokenMalformed(String),

    #[error("token signature invalid")]
    TokenSignatureInvalid,

    #[error("token issuer mismatch: expected {expected}, found {found}")]
    TokenIssuerMismatch { expected: String, found: String },

    #[error("refresh token revoked")]
    RefreshTokenRevoked,

    #[error("refresh token expired")]
    RefreshTokenExpired,

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn not_found(entity: Entity, key: impl fmt::Display) -> Self {
        AppError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Forbidden { .. } => ErrorKind::Forbidden,
            AppError::Conflict { .. } => ErrorKind::Conflict,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Storage(_) => ErrorKind::StorageIo,
            AppError::TokenExpired
            | AppError::TokenMalformed(_)
            | AppError::TokenSignatureInvalid
            | AppError::TokenIssuerMismatch { .. }
            | AppError::RefreshTokenRevoked
            | AppError::RefreshTokenExpired
            | AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Crypto(_) | AppError::Config(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Conflict => 409,
            ErrorKind::Validation => 400,
            ErrorKind::StorageIo | ErrorKind::Internal => 500,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(format!("snapshot encoding: {}", err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(format!("database: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_failures_are_unauthorized_but_distinct() {
        let expired = AppError::TokenExpired;
        let forged = AppError::TokenSignatureInvalid;

        assert_eq!(expired.kind(), ErrorKind::Unauthorized);
        assert_eq!(forged.kind(), ErrorKind::Unauthorized);
        assert!(!matches!(expired, AppError::TokenSignatureInvalid));
        assert_eq!(expired.status_code(), 401);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::not_found(Entity::Chirp, 3).status_code(), 404);
        assert_eq!(
            AppError::Conflict {
                entity: Entity::User,
                reason: "email taken".to_string(),
            }
            .status_code(),
            409
        );
        assert_eq!(AppError::Storage("disk".to_string()).status_code(), 500);
        assert_eq!(AppError::Validation("too long".to_string()).status_code(), 400);
    }

    #[test]
    fn test_io_error_is_storage() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind(), ErrorKind::StorageIo);
    }
}
