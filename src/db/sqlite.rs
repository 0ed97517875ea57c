use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};

use crate::db::models::Snapshot;
use crate::db::store::SnapshotBackend;
use crate::error::AppError;

const USERS: &str = "users";
const CHIRPS: &str = "chirps";
const REFRESH_TOKENS: &str = "refresh_tokens";

/// Relational home for the snapshot: one row per record, keyed by
/// collection name and record key, with the record itself as JSON.
///
/// A save rewrites every row inside one transaction, so the database holds
/// either the previous snapshot or the new one, never a mix.
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    collection: String,
    doc_key: String,
    body: String,
}

#[derive(Debug, FromRow)]
struct SequenceRow {
    collection: String,
    value: i64,
}

impl SqliteBackend {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        Self::connect_with(options, max_connections).await
    }

    pub async fn connect_with(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Ok(SqliteBackend { pool })
    }
}

#[async_trait]
impl SnapshotBackend for SqliteBackend {
    async fn bootstrap(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    doc_key TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (collection, doc_key)
)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS sequences (
    collection TEXT PRIMARY KEY,
    value INTEGER NOT NULL
)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, AppError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT collection, doc_key, body FROM documents",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot = Snapshot::default();
        for row in rows {
            match row.collection.as_str() {
                USERS => {
                    snapshot.users.insert(parse_id(&row.doc_key)?, decode(&row.body)?);
                }
                CHIRPS => {
                    snapshot.chirps.insert(parse_id(&row.doc_key)?, decode(&row.body)?);
                }
                REFRESH_TOKENS => {
                    snapshot.refresh_tokens.insert(row.doc_key, decode(&row.body)?);
                }
                other => {
                    tracing::warn!(collection = other, "ignoring rows of unknown collection");
                }
            }
        }

        let sequences = sqlx::query_as::<_, SequenceRow>("SELECT collection, value FROM sequences")
            .fetch_all(&self.pool)
            .await?;
        for row in sequences {
            let value = u64::try_from(row.value)
                .map_err(|_| AppError::Storage(format!("negative sequence for {}", row.collection)))?;
            match row.collection.as_str() {
                USERS => snapshot.sequences.users = value,
                CHIRPS => snapshot.sequences.chirps = value,
                _ => {}
            }
        }

        Ok(snapshot)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        let mut rows = Vec::with_capacity(
            snapshot.users.len() + snapshot.chirps.len() + snapshot.refresh_tokens.len(),
        );
        for (id, user) in &snapshot.users {
            rows.push((USERS, id.to_string(), encode(user)?));
        }
        for (id, chirp) in &snapshot.chirps {
            rows.push((CHIRPS, id.to_string(), encode(chirp)?));
        }
        for (token, record) in &snapshot.refresh_tokens {
            rows.push((REFRESH_TOKENS, token.clone(), encode(record)?));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        for (collection, key, body) in rows {
            sqlx::query("INSERT INTO documents (collection, doc_key, body) VALUES (?, ?, ?)")
                .bind(collection)
                .bind(key)
                .bind(body)
                .execute(&mut *tx)
                .await?;
        }

        for (collection, value) in [
            (USERS, snapshot.sequences.users),
            (CHIRPS, snapshot.sequences.chirps),
        ] {
            let value = i64::try_from(value)
                .map_err(|_| AppError::Storage(format!("sequence overflow for {}", collection)))?;
            sqlx::query(
                r#"
INSERT INTO sequences (collection, value) VALUES (?, ?)
ON CONFLICT(collection) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(collection)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn describe(&self) -> String {
        "sqlite".to_string()
    }
}

fn parse_id(key: &str) -> Result<u64, AppError> {
    key.parse()
        .map_err(|_| AppError::Storage(format!("invalid document id {:?}", key)))
}

fn encode<T: Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, AppError> {
    Ok(serde_json::from_str(body)?)
}
