pub mod document;
pub mod json_file;
pub mod models;
pub mod sqlite;
pub mod store;

pub use document::Document;
pub use json_file::JsonFileBackend;
pub use models::{Chirp, Entity, PublicUser, RefreshToken, Snapshot, Subject, User};
pub use sqlite::SqliteBackend;
pub use store::{Collection, SnapshotBackend, Store};
