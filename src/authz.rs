//! Resource-ownership checks for mutating calls.

use std::fmt;

use crate::db::models::{Entity, Subject};
use crate::error::AppError;

/// Allows the action only when the authenticated subject owns the resource.
///
/// Pure comparison; callers fetch the owner themselves.
pub fn authorize_owner_action(
    subject: Subject,
    owner: Option<Subject>,
    entity: Entity,
    key: impl fmt::Display,
) -> Result<(), AppError> {
    if owner == Some(subject) {
        return Ok(());
    }

    tracing::warn!(%subject, %entity, key = %key, "rejected action on resource owned by another subject");
    Err(AppError::Forbidden {
        entity,
        key: key.to_string(),
        subject: subject.to_string(),
    })
}
