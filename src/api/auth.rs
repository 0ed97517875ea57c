use serde::{Deserialize, Serialize};

use crate::api::middleware::bearer_token;
use crate::api::state::AppState;
use crate::api::users::validate_email;
use crate::crypto::verify_password;
use crate::db::models::{PublicUser, RefreshToken, Subject};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: PublicUser,
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub token: String,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".to_string())
}

/// Checks email and password, then issues an access token and a stored
/// refresh token.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<LoginResponse, AppError> {
    let email = validate_email(&req.email).map_err(|_| invalid_credentials())?;

    let user = state
        .store
        .read(|snapshot| snapshot.user_by_email(&email).cloned())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&req.password, &user.digest())? {
        tracing::debug!(user_id = user.id, "password mismatch");
        return Err(invalid_credentials());
    }

    let subject = Subject(user.id);
    let token = state.credentials.issue_access_token(subject)?;
    let refresh_token = state.credentials.issue_refresh_token(subject).await?;

    tracing::info!(user_id = user.id, "user logged in");
    Ok(LoginResponse {
        user: PublicUser::from(&user),
        token,
        refresh_token,
    })
}

/// Trades the refresh token in `authorization` for a new access token.
pub async fn refresh(
    state: &AppState,
    authorization: Option<&str>,
    previous_access_token: Option<&str>,
) -> Result<RefreshResponse, AppError> {
    let refresh_token = bearer_token(authorization)?;
    let token = state
        .credentials
        .refresh_cycle(refresh_token, previous_access_token)
        .await?;
    Ok(RefreshResponse { token })
}

/// Revokes the refresh token in `authorization`.
pub async fn logout(
    state: &AppState,
    authorization: Option<&str>,
) -> Result<RefreshToken, AppError> {
    let refresh_token = bearer_token(authorization)?;
    state.credentials.revoke(refresh_token).await
}
