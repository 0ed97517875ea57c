use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::crypto::jwt::{self, Expiry, ACCESS_ISSUER};
use crate::crypto::generate_refresh_token;
use crate::db::models::{NewRefreshToken, RefreshToken, RevokeAt, Subject};
use crate::db::Store;
use crate::error::AppError;

/// Issues and checks credentials.
///
/// Access tokens are signed and stateless: validating one never touches the
/// store. Refresh tokens are opaque and live in the store's refresh-token
/// collection, which is the only place revocation is recorded. A refresh
/// token may be presented any number of times until it is revoked or
/// expires.
#[derive(Clone)]
pub struct Credentials {
    store: Store,
    secret: Arc<str>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl Credentials {
    pub fn new(store: Store, config: &Config) -> Self {
        Credentials {
            store,
            secret: Arc::from(config.jwt_secret.as_str()),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        }
    }

    pub fn issue_access_token(&self, subject: Subject) -> Result<String, AppError> {
        jwt::sign(&self.secret, ACCESS_ISSUER, &subject.to_string(), self.access_ttl)
    }

    /// Mints a refresh token and records it before handing it out. If the
    /// store write fails the token is dropped and never reaches the caller.
    pub async fn issue_refresh_token(&self, subject: Subject) -> Result<String, AppError> {
        let record = self
            .store
            .refresh_tokens()
            .create(NewRefreshToken {
                token: generate_refresh_token(),
                subject,
                expires_at: Utc::now() + self.refresh_ttl,
            })
            .await?;

        tracing::info!(%subject, expires_at = %record.expires_at, "refresh token issued");
        Ok(record.token)
    }

    /// Verifies a signed token and returns the subject it asserts.
    pub fn validate(&self, token: &str, expected_issuer: &str) -> Result<Subject, AppError> {
        let claims = jwt::verify(token, &self.secret, expected_issuer, Expiry::Enforce)
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                err
            })?;
        claims.sub.parse()
    }

    /// Exchanges a live refresh token for a new access token.
    ///
    /// When the caller also presents its previous access token, that token
    /// must carry a valid signature and the access issuer (its expiry is not
    /// checked) and must name the refresh token's owner.
    pub async fn refresh_cycle(
        &self,
        refresh_token: &str,
        accompanying_access_token: Option<&str>,
    ) -> Result<String, AppError> {
        let record = self
            .store
            .refresh_tokens()
            .get_by_id(&refresh_token.to_string())
            .await?;

        if record.is_revoked() {
            tracing::warn!(subject = %record.subject, "revoked refresh token presented");
            return Err(AppError::RefreshTokenRevoked);
        }
        if record.is_expired_at(Utc::now()) {
            tracing::debug!(subject = %record.subject, "expired refresh token presented");
            return Err(AppError::RefreshTokenExpired);
        }

        let subject: Subject = record
            .subject
            .parse()
            .map_err(|_| AppError::Storage(format!("refresh token owner {:?} is not a user id", record.subject)))?;

        if let Some(access_token) = accompanying_access_token {
            let claims = jwt::verify(access_token, &self.secret, ACCESS_ISSUER, Expiry::Ignore)
                .map_err(|err| AppError::Unauthorized(format!("accompanying access token: {}", err)))?;
            if claims.sub != record.subject {
                return Err(AppError::Unauthorized(
                    "accompanying access token belongs to another subject".to_string(),
                ));
            }
        }

        self.issue_access_token(subject)
    }

    /// Marks a refresh token revoked. Revoking twice is not an error and
    /// keeps the first revocation time.
    pub async fn revoke(&self, refresh_token: &str) -> Result<RefreshToken, AppError> {
        let record = self
            .store
            .refresh_tokens()
            .update(&refresh_token.to_string(), RevokeAt(Utc::now()))
            .await?;

        tracing::info!(subject = %record.subject, "refresh token revoked");
        Ok(record)
    }

    /// Drops refresh tokens that expired before `now`. Returns how many.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let removed = self
            .store
            .mutate(|snapshot| {
                let before = snapshot.refresh_tokens.len();
                snapshot
                    .refresh_tokens
                    .retain(|_, record| !record.is_expired_at(now));
                Ok(before - snapshot.refresh_tokens.len())
            })
            .await?;

        tracing::info!(removed, "expired refresh tokens pruned");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::jwt::REFRESH_ISSUER;
    use crate::db::JsonFileBackend;
    use crate::error::ErrorKind;

    const SECRET: &str = "test-secret";

    async fn setup() -> (tempfile::TempDir, Store, Credentials) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(JsonFileBackend::new(dir.path().join("database.json")))
            .await
            .unwrap();
        let credentials = Credentials::new(store.clone(), &Config::with_secrets(SECRET, "polka"));
        (dir, store, credentials)
    }

    #[tokio::test]
    async fn test_access_token_round_trip() {
        let (_dir, _store, credentials) = setup().await;

        let token = credentials.issue_access_token(Subject(7)).unwrap();
        assert_eq!(credentials.validate(&token, ACCESS_ISSUER).unwrap(), Subject(7));

        let err = credentials.validate(&token, REFRESH_ISSUER).unwrap_err();
        assert!(matches!(err, AppError::TokenIssuerMismatch { .. }));
    }

    #[tokio::test]
    async fn test_foreign_secret_rejected() {
        let (_dir, store, credentials) = setup().await;
        let other = Credentials::new(store, &Config::with_secrets("other-secret", "polka"));

        let token = other.issue_access_token(Subject(7)).unwrap();
        let err = credentials.validate(&token, ACCESS_ISSUER).unwrap_err();
        assert!(matches!(err, AppError::TokenSignatureInvalid));
    }

    #[tokio::test]
    async fn test_non_numeric_subject_is_malformed() {
        let (_dir, _store, credentials) = setup().await;
        let token = jwt::sign(SECRET, ACCESS_ISSUER, "not-a-user", Duration::minutes(5)).unwrap();

        let err = credentials.validate(&token, ACCESS_ISSUER).unwrap_err();
        assert!(matches!(err, AppError::TokenMalformed(_)));
    }

    #[tokio::test]
    async fn test_refresh_token_is_registered_before_return() {
        let (_dir, store, credentials) = setup().await;

        let token = credentials.issue_refresh_token(Subject(7)).await.unwrap();
        let record = store.refresh_tokens().get_by_id(&token).await.unwrap();

        assert_eq!(record.subject, "7");
        assert!(!record.is_revoked());
        assert!(record.expires_at > Utc::now() + Duration::days(59));
    }

    #[tokio::test]
    async fn test_refresh_cycle_reuses_token_until_revoked() {
        let (_dir, _store, credentials) = setup().await;
        let refresh = credentials.issue_refresh_token(Subject(7)).await.unwrap();

        for _ in 0..2 {
            let access = credentials.refresh_cycle(&refresh, None).await.unwrap();
            assert_eq!(credentials.validate(&access, ACCESS_ISSUER).unwrap(), Subject(7));
        }

        credentials.revoke(&refresh).await.unwrap();
        let err = credentials.refresh_cycle(&refresh, None).await.unwrap_err();
        assert!(matches!(err, AppError::RefreshTokenRevoked));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_unknown_refresh_token_not_found() {
        let (_dir, _store, credentials) = setup().await;

        let err = credentials.refresh_cycle("deadbeef", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = credentials.revoke("deadbeef").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_double_revoke_keeps_first_timestamp() {
        let (_dir, _store, credentials) = setup().await;
        let refresh = credentials.issue_refresh_token(Subject(3)).await.unwrap();

        let first = credentials.revoke(&refresh).await.unwrap();
        let second = credentials.revoke(&refresh).await.unwrap();

        assert!(first.is_revoked());
        assert_eq!(first.revoked_at, second.revoked_at);
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_terminal() {
        let (_dir, store, credentials) = setup().await;
        let record = store
            .refresh_tokens()
            .create(NewRefreshToken {
                token: generate_refresh_token(),
                subject: Subject(4),
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .await
            .unwrap();

        for _ in 0..2 {
            let err = credentials.refresh_cycle(&record.token, None).await.unwrap_err();
            assert!(matches!(err, AppError::RefreshTokenExpired));
        }
    }

    #[tokio::test]
    async fn test_accompanying_access_token_must_match_owner() {
        let (_dir, store, credentials) = setup().await;
        let refresh = credentials.issue_refresh_token(Subject(7)).await.unwrap();

        let stale = jwt::sign_at(
            SECRET,
            ACCESS_ISSUER,
            "7",
            Utc::now() - Duration::hours(3),
            Duration::hours(1),
        )
        .unwrap();
        assert!(credentials.refresh_cycle(&refresh, Some(&stale)).await.is_ok());

        let someone_else = credentials.issue_access_token(Subject(8)).unwrap();
        let err = credentials
            .refresh_cycle(&refresh, Some(&someone_else))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let forged = Credentials::new(store, &Config::with_secrets("forger", "polka"))
            .issue_access_token(Subject(7))
            .unwrap();
        let err = credentials.refresh_cycle(&refresh, Some(&forged)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let wrong_issuer = jwt::sign(SECRET, REFRESH_ISSUER, "7", Duration::hours(1)).unwrap();
        let err = credentials
            .refresh_cycle(&refresh, Some(&wrong_issuer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_prune_expired_keeps_live_tokens() {
        let (_dir, store, credentials) = setup().await;
        let live = credentials.issue_refresh_token(Subject(1)).await.unwrap();
        store
            .refresh_tokens()
            .create(NewRefreshToken {
                token: generate_refresh_token(),
                subject: Subject(1),
                expires_at: Utc::now() - Duration::days(1),
            })
            .await
            .unwrap();

        assert_eq!(credentials.prune_expired(Utc::now()).await.unwrap(), 1);
        let remaining = store.refresh_tokens().get_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token, live);
    }
}
