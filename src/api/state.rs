use std::sync::Arc;

use crate::api::credentials::Credentials;
use crate::config::Config;
use crate::db::Store;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub credentials: Credentials,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Store, config: Arc<Config>) -> Self {
        let credentials = Credentials::new(store.clone(), &config);
        AppState {
            store,
            credentials,
            config,
        }
    }

    /// Opens the configured backend, bootstrapping it if needed.
    pub async fn from_config(config: Arc<Config>) -> Result<Self, AppError> {
        let store = Store::from_config(&config).await?;
        Ok(AppState::new(store, config))
    }
}
