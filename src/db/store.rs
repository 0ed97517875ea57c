use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::authz::authorize_owner_action;
use crate::config::{Config, StoreBackend};
use crate::db::document::Document;
use crate::db::json_file::JsonFileBackend;
use crate::db::models::{Chirp, RefreshToken, Snapshot, Subject, User};
use crate::db::sqlite::SqliteBackend;
use crate::error::AppError;

/// A medium that can hold exactly one [`Snapshot`].
///
/// Backends do no locking of their own; [`Store`] serializes every call.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Creates the medium holding an empty snapshot if it does not exist.
    async fn bootstrap(&self) -> Result<(), AppError>;

    async fn load(&self) -> Result<Snapshot, AppError>;

    /// Replaces the whole persisted snapshot.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), AppError>;

    fn describe(&self) -> String;
}

/// Shared handle to the persisted snapshot.
///
/// Reads take the lock shared and writes take it exclusively for the whole
/// load/mutate/save cycle. Nothing is cached between calls: every operation
/// starts from what the backend currently holds.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn SnapshotBackend>,
    lock: Arc<RwLock<()>>,
}

impl Store {
    pub async fn open<B>(backend: B) -> Result<Self, AppError>
    where
        B: SnapshotBackend + 'static,
    {
        let store = Store {
            backend: Arc::new(backend),
            lock: Arc::new(RwLock::new(())),
        };

        let guard = store.lock.clone().write_owned().await;
        let backend = Arc::clone(&store.backend);
        run_detached(async move {
            let _guard = guard;
            backend.bootstrap().await
        })
        .await?;

        tracing::info!(backend = %store.backend.describe(), "document store ready");
        Ok(store)
    }

    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        match config.store_backend {
            StoreBackend::Json => Store::open(JsonFileBackend::new(&config.database_path)).await,
            StoreBackend::Sqlite => {
                let backend =
                    SqliteBackend::connect(&config.database_url, config.db_max_connections).await?;
                Store::open(backend).await
            }
        }
    }

    pub fn users(&self) -> Collection<User> {
        Collection::new(self.clone())
    }

    pub fn chirps(&self) -> Collection<Chirp> {
        Collection::new(self.clone())
    }

    pub fn refresh_tokens(&self) -> Collection<RefreshToken> {
        Collection::new(self.clone())
    }

    /// Runs `operation` against a freshly loaded snapshot under shared access.
    pub async fn read<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnOnce(&Snapshot) -> T,
    {
        let _guard = self.lock.read().await;
        let snapshot = self.backend.load().await?;
        Ok(operation(&snapshot))
    }

    /// Load, mutate and save the whole snapshot under exclusive access.
    ///
    /// The snapshot is only written back when `operation` succeeds. Once the
    /// save starts it runs on its own task, which owns the guard: dropping
    /// the caller's future cannot interrupt a write or let the next writer
    /// in before it lands.
    pub async fn mutate<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, AppError>,
    {
        let guard = self.lock.clone().write_owned().await;
        let mut snapshot = self.backend.load().await?;
        let result = operation(&mut snapshot)?;

        let backend = Arc::clone(&self.backend);
        run_detached(async move {
            let _guard = guard;
            backend.save(&snapshot).await
        })
        .await?;
        Ok(result)
    }
}

async fn run_detached<F>(write: F) -> Result<(), AppError>
where
    F: Future<Output = Result<(), AppError>> + Send + 'static,
{
    tokio::spawn(write)
        .await
        .map_err(|e| AppError::Storage(format!("snapshot write task failed: {}", e)))?
}

/// One collection of the snapshot, viewed through its [`Document`] type.
pub struct Collection<D> {
    store: Store,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> Collection<D> {
    fn new(store: Store) -> Self {
        Collection {
            store,
            _marker: PhantomData,
        }
    }

    pub async fn create(&self, draft: D::Draft) -> Result<D, AppError> {
        let created = self
            .store
            .mutate(|snapshot| {
                let document = D::materialize(draft, snapshot)?;
                D::table_mut(snapshot).insert(document.key(), document.clone());
                Ok(document)
            })
            .await?;

        tracing::debug!(collection = %D::ENTITY, key = %created.key(), "document created");
        Ok(created)
    }

    /// Every record in the collection, in key order.
    pub async fn get_all(&self) -> Result<Vec<D>, AppError> {
        self.store
            .read(|snapshot| D::table(snapshot).values().cloned().collect())
            .await
    }

    pub async fn get_where<P>(&self, predicate: P) -> Result<Vec<D>, AppError>
    where
        P: Fn(&D) -> bool,
    {
        self.store
            .read(|snapshot| {
                D::table(snapshot)
                    .values()
                    .filter(|document| predicate(*document))
                    .cloned()
                    .collect()
            })
            .await
    }

    pub async fn get_by_id(&self, key: &D::Key) -> Result<D, AppError> {
        self.store
            .read(|snapshot| D::table(snapshot).get(key).cloned())
            .await?
            .ok_or_else(|| AppError::not_found(D::ENTITY, key))
    }

    pub async fn update(&self, key: &D::Key, patch: D::Patch) -> Result<D, AppError> {
        self.patch(key, patch, None).await
    }

    /// Like [`Collection::update`], but only the record's owner may apply it.
    /// The ownership check and the write share one exclusive section.
    pub async fn update_as(
        &self,
        key: &D::Key,
        requester: Subject,
        patch: D::Patch,
    ) -> Result<D, AppError> {
        self.patch(key, patch, Some(requester)).await
    }

    async fn patch(
        &self,
        key: &D::Key,
        patch: D::Patch,
        requester: Option<Subject>,
    ) -> Result<D, AppError> {
        let updated = self
            .store
            .mutate(|snapshot| {
                let mut document = D::table(snapshot)
                    .get(key)
                    .cloned()
                    .ok_or_else(|| AppError::not_found(D::ENTITY, key))?;
                if let Some(requester) = requester {
                    authorize_owner_action(requester, document.owner(), D::ENTITY, key)?;
                }
                document.apply(patch, snapshot)?;
                D::table_mut(snapshot).insert(key.clone(), document.clone());
                Ok(document)
            })
            .await?;

        tracing::debug!(collection = %D::ENTITY, key = %key, "document updated");
        Ok(updated)
    }

    /// Removes a record on behalf of `requester`, who must own it.
    pub async fn delete_by_id(&self, key: &D::Key, requester: Subject) -> Result<(), AppError> {
        self.store
            .mutate(|snapshot| {
                let document = D::table(snapshot)
                    .get(key)
                    .ok_or_else(|| AppError::not_found(D::ENTITY, key))?;
                authorize_owner_action(requester, document.owner(), D::ENTITY, key)?;
                D::table_mut(snapshot).remove(key);
                Ok(())
            })
            .await?;

        tracing::debug!(collection = %D::ENTITY, key = %key, subject = %requester, "document deleted");
        Ok(())
    }
}
