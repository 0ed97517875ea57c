use chrono::Utc;
use serde::Deserialize;

use crate::api::state::AppState;
use crate::authz::authorize_owner_action;
use crate::crypto::digest_password;
use crate::db::models::{Entity, NewUser, PublicUser, Subject, UserPatch};
use crate::error::AppError;

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Fields left empty are not changed.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Validate and normalize an email address
pub(crate) fn validate_email(email: &str) -> Result<String, AppError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(AppError::Validation("Email must not be empty".to_string()));
    }

    if !trimmed.contains('@') || trimmed.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(format!("Invalid email address: {}", trimmed)));
    }

    Ok(trimmed.to_lowercase())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<PublicUser, AppError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let user = state
        .store
        .users()
        .create(NewUser {
            email,
            password: digest_password(&req.password)?,
        })
        .await?;

    tracing::info!(user_id = user.id, "user registered");
    Ok(PublicUser::from(&user))
}

pub async fn list_users(state: &AppState) -> Result<Vec<PublicUser>, AppError> {
    let users = state.store.users().get_all().await?;
    Ok(users.iter().map(PublicUser::from).collect())
}

pub async fn get_user(state: &AppState, id: u64) -> Result<PublicUser, AppError> {
    let user = state.store.users().get_by_id(&id).await?;
    Ok(PublicUser::from(&user))
}

/// Changes the caller's own email and/or password.
pub async fn update_user(
    state: &AppState,
    subject: Subject,
    id: u64,
    req: UpdateUserRequest,
) -> Result<PublicUser, AppError> {
    authorize_owner_action(subject, Some(Subject(id)), Entity::User, id)?;

    let mut patch = UserPatch::default();
    if !req.email.trim().is_empty() {
        patch.email = Some(validate_email(&req.email)?);
    }
    if !req.password.is_empty() {
        validate_password(&req.password)?;
        patch.password = Some(digest_password(&req.password)?);
    }

    let user = state.store.users().update(&id, patch).await?;
    tracing::info!(user_id = user.id, "user updated");
    Ok(PublicUser::from(&user))
}

/// Deletes the caller's own account and revokes its refresh tokens in the
/// same write. Chirps by the user are kept.
pub async fn delete_user(state: &AppState, subject: Subject, id: u64) -> Result<(), AppError> {
    authorize_owner_action(subject, Some(Subject(id)), Entity::User, id)?;

    let now = Utc::now();
    let owner = subject.to_string();
    let revoked = state
        .store
        .mutate(|snapshot| {
            snapshot
                .users
                .remove(&id)
                .ok_or_else(|| AppError::not_found(Entity::User, id))?;

            let mut revoked = 0;
            for record in snapshot.refresh_tokens.values_mut() {
                if record.subject == owner && record.revoked_at.is_none() {
                    record.revoked_at = Some(now);
                    revoked += 1;
                }
            }
            Ok(revoked)
        })
        .await?;

    tracing::info!(user_id = id, revoked_tokens = revoked, "user deleted");
    Ok(())
}

/// Sets the paid-tier flag on a user.
pub async fn upgrade_user(state: &AppState, id: u64) -> Result<PublicUser, AppError> {
    let user = state
        .store
        .users()
        .update(
            &id,
            UserPatch {
                is_chirpy_red: Some(true),
                ..UserPatch::default()
            },
        )
        .await?;

    tracing::info!(user_id = id, "user upgraded");
    Ok(PublicUser::from(&user))
}
