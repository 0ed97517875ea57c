use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The three collections held in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Chirp,
    RefreshToken,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::User => "user",
            Entity::Chirp => "chirp",
            Entity::RefreshToken => "refresh token",
        };
        f.write_str(name)
    }
}

/// Identity asserted by a validated token: a user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject(pub u64);

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Subject {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
            .map(Subject)
            .ok_or_else(|| AppError::TokenMalformed(format!("subject {:?} is not a user id", s)))
    }
}

/// Salted Argon2id digest, both halves hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordDigest {
    pub hash: String,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    #[serde(default)]
    pub is_chirpy_red: bool,
}

impl User {
    pub fn digest(&self) -> PasswordDigest {
        PasswordDigest {
            hash: self.password_hash.clone(),
            salt: self.password_salt.clone(),
        }
    }
}

/// What callers outside the core are allowed to see of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: u64,
    pub email: String,
    pub is_chirpy_red: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id,
            email: user.email.clone(),
            is_chirpy_red: user.is_chirpy_red,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: PasswordDigest,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password: Option<PasswordDigest>,
    pub is_chirpy_red: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chirp {
    pub id: u64,
    pub author_id: u64,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NewChirp {
    pub author_id: u64,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChirpPatch {
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: String,
    /// String form of the owning user's id.
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token: String,
    pub subject: Subject,
    pub expires_at: DateTime<Utc>,
}

/// Revocation is the only mutation a refresh token accepts.
#[derive(Debug, Clone, Copy)]
pub struct RevokeAt(pub DateTime<Utc>);

/// Highest id ever handed out per integer-keyed collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequences {
    #[serde(default)]
    pub users: u64,
    #[serde(default)]
    pub chirps: u64,
}

/// The whole persisted state; the unit of atomic read and write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub users: BTreeMap<u64, User>,
    pub chirps: BTreeMap<u64, Chirp>,
    pub refresh_tokens: BTreeMap<String, RefreshToken>,
    pub sequences: Sequences,
}

impl Snapshot {
    /// Next user id: one past the larger of the recorded high-water mark
    /// and the largest id present.
    pub fn next_user_id(&mut self) -> u64 {
        allocate(&mut self.sequences.users, self.users.keys().next_back())
    }

    pub fn next_chirp_id(&mut self) -> u64 {
        allocate(&mut self.sequences.chirps, self.chirps.keys().next_back())
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|user| user.email == email)
    }
}

fn allocate(sequence: &mut u64, max_present: Option<&u64>) -> u64 {
    let next = (*sequence).max(max_present.copied().unwrap_or(0)) + 1;
    *sequence = next;
    next
}
