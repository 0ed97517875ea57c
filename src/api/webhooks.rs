use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::api::middleware::api_key;
use crate::api::state::AppState;
use crate::api::users::upgrade_user;
use crate::error::AppError;

pub const USER_UPGRADED: &str = "user.upgraded";

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub user_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Upgraded,
    Ignored,
}

/// Payment provider callback. Only `user.upgraded` has an effect; any other
/// event is acknowledged without touching the store.
pub async fn handle_webhook(
    state: &AppState,
    authorization: Option<&str>,
    event: WebhookEvent,
) -> Result<WebhookOutcome, AppError> {
    let key = api_key(authorization)?;
    if !bool::from(key.as_bytes().ct_eq(state.config.polka_key.as_bytes())) {
        tracing::warn!("webhook rejected: api key mismatch");
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    if event.event != USER_UPGRADED {
        tracing::debug!(event = %event.event, "webhook event ignored");
        return Ok(WebhookOutcome::Ignored);
    }

    upgrade_user(state, event.data.user_id).await?;
    Ok(WebhookOutcome::Upgraded)
}
