//! Transport-agnostic operations. Each function takes the shared
//! [`AppState`] plus already-parsed inputs (header values, request bodies)
//! and returns domain values or an [`crate::error::AppError`].

pub mod auth;
pub mod chirps;
pub mod credentials;
pub mod middleware;
pub mod state;
pub mod users;
pub mod webhooks;

pub use credentials::Credentials;
pub use state::AppState;

#[cfg(test)]
pub(crate) async fn test_state() -> (tempfile::TempDir, AppState) {
    use std::sync::Arc;

    use crate::config::Config;
    use crate::db::{JsonFileBackend, Store};

    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(JsonFileBackend::new(dir.path().join("database.json")))
        .await
        .unwrap();
    let config = Arc::new(Config::with_secrets("test-jwt-secret", "test-polka-key"));
    (dir, AppState::new(store, config))
}
