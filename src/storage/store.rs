//! Async facade over the document database.
//!
//! redb calls block, so each operation runs on the blocking pool. Reads are
//! bounded by the configured store timeout; writes only warn past it.

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use super::db::{Database, DatabaseError};
use super::models::{Course, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Store task failed: {0}")]
    Task(String),
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Database(DatabaseError::Conflict(_)))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Database(DatabaseError::NotFound(_)))
    }
}

#[derive(Clone)]
pub struct Store {
    db: Database,
    timeout: Duration,
}

impl Store {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Run a database operation on the blocking pool under the store timeout
    pub async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || op(&db));

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(StoreError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(StoreError::Task(e.to_string())),
            Ok(Ok(result)) => result.map_err(StoreError::from),
        }
    }

    /// Run a mutation on the blocking pool. A mutation is never abandoned:
    /// past the store timeout it is awaited to completion, so the caller
    /// always learns whether it committed and can invalidate after it.
    pub async fn run_write<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let mut task = tokio::task::spawn_blocking(move || op(&db));

        let joined = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Store write exceeded its timeout, waiting for it to finish"
                );
                task.await
            }
        };

        match joined {
            Err(e) => Err(StoreError::Task(e.to_string())),
            Ok(result) => result.map_err(StoreError::from),
        }
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let id = id.to_string();
        self.run(move |db| db.get_user(&id)).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_string();
        self.run(move |db| db.find_user_by_email(&email)).await
    }

    pub async fn put_user(&self, user: User) -> Result<User, StoreError> {
        self.run_write(move |db| db.put_user(&user).map(|_| user)).await
    }

    /// See [`Database::update_user`]
    pub async fn update_user<F>(&self, id: &str, update: F) -> Result<Option<User>, StoreError>
    where
        F: FnOnce(&mut User) -> Result<(), DatabaseError> + Send + 'static,
    {
        let id = id.to_string();
        self.run_write(move |db| db.update_user(&id, update)).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.run_write(move |db| db.delete_user(&id)).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.run(|db| db.list_users()).await
    }

    pub async fn get_course(&self, id: &str) -> Result<Option<Course>, StoreError> {
        let id = id.to_string();
        self.run(move |db| db.get_course(&id)).await
    }

    pub async fn put_course(&self, course: Course) -> Result<Course, StoreError> {
        self.run_write(move |db| db.put_course(&course).map(|_| course))
            .await
    }

    /// See [`Database::update_course`]
    pub async fn update_course<F>(&self, id: &str, update: F) -> Result<Option<Course>, StoreError>
    where
        F: FnOnce(&mut Course) -> Result<(), DatabaseError> + Send + 'static,
    {
        let id = id.to_string();
        self.run_write(move |db| db.update_course(&id, update)).await
    }

    pub async fn delete_course(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.run_write(move |db| db.delete_course(&id)).await
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        self.run(|db| db.find_courses(|_| true)).await
    }
}
