use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;

use crate::db::models::{
    Chirp, ChirpPatch, Entity, NewChirp, NewRefreshToken, NewUser, RefreshToken, RevokeAt,
    Snapshot, Subject, User, UserPatch,
};
use crate::error::AppError;

/// A record type stored in one collection of the [`Snapshot`].
///
/// Every collection goes through the same create/read/update/delete cycle in
/// [`crate::db::Collection`]; the per-type rules (key allocation, uniqueness,
/// referential checks, ownership) live in the implementations below.
pub trait Document: Clone + Send + Sync + 'static {
    type Key: Ord + Clone + fmt::Display + Send + Sync;
    type Draft: Send;
    type Patch: Send;

    const ENTITY: Entity;

    fn key(&self) -> Self::Key;

    /// The user allowed to delete or modify this record.
    fn owner(&self) -> Option<Subject>;

    fn table(snapshot: &Snapshot) -> &BTreeMap<Self::Key, Self>;

    fn table_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<Self::Key, Self>;

    /// Turns a draft into a keyed record. Runs under the write lock with the
    /// freshly loaded snapshot.
    fn materialize(draft: Self::Draft, snapshot: &mut Snapshot) -> Result<Self, AppError>;

    /// Applies the supplied fields of a patch. `snapshot` is the state the
    /// record was read from, for cross-record checks.
    fn apply(&mut self, patch: Self::Patch, snapshot: &Snapshot) -> Result<(), AppError>;
}

impl Document for User {
    type Key = u64;
    type Draft = NewUser;
    type Patch = UserPatch;

    const ENTITY: Entity = Entity::User;

    fn key(&self) -> u64 {
        self.id
    }

    fn owner(&self) -> Option<Subject> {
        Some(Subject(self.id))
    }

    fn table(snapshot: &Snapshot) -> &BTreeMap<u64, User> {
        &snapshot.users
    }

    fn table_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<u64, User> {
        &mut snapshot.users
    }

    fn materialize(draft: NewUser, snapshot: &mut Snapshot) -> Result<User, AppError> {
        if draft.email.is_empty() {
            return Err(AppError::Validation("email must not be empty".to_string()));
        }
        if snapshot.user_by_email(&draft.email).is_some() {
            return Err(AppError::Conflict {
                entity: Entity::User,
                reason: format!("email {} is already registered", draft.email),
            });
        }

        Ok(User {
            id: snapshot.next_user_id(),
            email: draft.email,
            password_hash: draft.password.hash,
            password_salt: draft.password.salt,
            is_chirpy_red: false,
        })
    }

    fn apply(&mut self, patch: UserPatch, snapshot: &Snapshot) -> Result<(), AppError> {
        if let Some(email) = patch.email.filter(|email| !email.is_empty()) {
            if let Some(other) = snapshot.user_by_email(&email) {
                if other.id != self.id {
                    return Err(AppError::Conflict {
                        entity: Entity::User,
                        reason: format!("email {} is already registered", email),
                    });
                }
            }
            self.email = email;
        }
        if let Some(password) = patch.password {
            self.password_hash = password.hash;
            self.password_salt = password.salt;
        }
        if let Some(is_chirpy_red) = patch.is_chirpy_red {
            self.is_chirpy_red = is_chirpy_red;
        }
        Ok(())
    }
}

impl Document for Chirp {
    type Key = u64;
    type Draft = NewChirp;
    type Patch = ChirpPatch;

    const ENTITY: Entity = Entity::Chirp;

    fn key(&self) -> u64 {
        self.id
    }

    fn owner(&self) -> Option<Subject> {
        Some(Subject(self.author_id))
    }

    fn table(snapshot: &Snapshot) -> &BTreeMap<u64, Chirp> {
        &snapshot.chirps
    }

    fn table_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<u64, Chirp> {
        &mut snapshot.chirps
    }

    fn materialize(draft: NewChirp, snapshot: &mut Snapshot) -> Result<Chirp, AppError> {
        // Authors must exist now; the reference may dangle later.
        if !snapshot.users.contains_key(&draft.author_id) {
            return Err(AppError::not_found(Entity::User, draft.author_id));
        }

        Ok(Chirp {
            id: snapshot.next_chirp_id(),
            author_id: draft.author_id,
            body: draft.body,
        })
    }

    fn apply(&mut self, patch: ChirpPatch, _snapshot: &Snapshot) -> Result<(), AppError> {
        if let Some(body) = patch.body.filter(|body| !body.is_empty()) {
            self.body = body;
        }
        Ok(())
    }
}

impl Document for RefreshToken {
    type Key = String;
    type Draft = NewRefreshToken;
    type Patch = RevokeAt;

    const ENTITY: Entity = Entity::RefreshToken;

    fn key(&self) -> String {
        self.token.clone()
    }

    fn owner(&self) -> Option<Subject> {
        self.subject.parse().ok()
    }

    fn table(snapshot: &Snapshot) -> &BTreeMap<String, RefreshToken> {
        &snapshot.refresh_tokens
    }

    fn table_mut(snapshot: &mut Snapshot) -> &mut BTreeMap<String, RefreshToken> {
        &mut snapshot.refresh_tokens
    }

    fn materialize(
        draft: NewRefreshToken,
        snapshot: &mut Snapshot,
    ) -> Result<RefreshToken, AppError> {
        if draft.token.is_empty() {
            return Err(AppError::Validation("refresh token must not be empty".to_string()));
        }
        if snapshot.refresh_tokens.contains_key(&draft.token) {
            return Err(AppError::Conflict {
                entity: Entity::RefreshToken,
                reason: "token value already issued".to_string(),
            });
        }

        Ok(RefreshToken {
            token: draft.token,
            subject: draft.subject.to_string(),
            created_at: Utc::now(),
            expires_at: draft.expires_at,
            revoked_at: None,
        })
    }

    fn apply(&mut self, patch: RevokeAt, _snapshot: &Snapshot) -> Result<(), AppError> {
        // Revocation is permanent; the first timestamp wins.
        if self.revoked_at.is_none() {
            self.revoked_at = Some(patch.0);
        }
        Ok(())
    }
}
