//! Shared test helpers for the `#[cfg(test)]` modules of the crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use crate::cache::{CacheError, KvStore, MemoryCache};
use crate::config::{CacheConfig, Config, CookieConfig, NodeConfig, StoreConfig, TokenConfig};
use crate::mail::{LogMailer, Mail, MailDispatcher};
use crate::storage::models::{Course, Role, User};
use crate::storage::Database;
use crate::AppState;

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard; the caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A valid `Config` with short cache timeouts and distinct secrets.
pub fn test_config() -> Config {
    Config {
        cache: CacheConfig {
            op_timeout_ms: 50,
            ..CacheConfig::default()
        },
        cookies: CookieConfig::default(),
        node: NodeConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: "/tmp/test".to_string(),
        },
        store: StoreConfig::default(),
        tokens: TokenConfig {
            access_secret: "access-secret-for-unit-tests-0123456789".to_string(),
            refresh_secret: "refresh-secret-for-unit-tests-9876543210".to_string(),
            ..TokenConfig::default()
        },
    }
}

/// Build a full `Arc<AppState>` over an in-process cache.
pub fn test_state(db: Database) -> Arc<AppState> {
    test_state_with(db, Arc::new(MemoryCache::new()), Arc::new(LogMailer))
}

pub fn test_state_with(
    db: Database,
    kv: Arc<dyn KvStore>,
    mailer: Arc<dyn MailDispatcher>,
) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(), db, kv, mailer))
}

/// A verified account without a password (social-auth shape).
pub fn make_user(id: &str, email: &str, role: Role) -> User {
    let now = Utc::now();
    User {
        avatar: None,
        courses: Vec::new(),
        created_at: now,
        email: email.to_string(),
        id: id.to_string(),
        is_verified: true,
        name: format!("User {id}"),
        password_hash: None,
        role,
        updated_at: now,
    }
}

pub fn make_course(id: &str, name: &str) -> Course {
    let now = Utc::now();
    Course {
        benefits: Vec::new(),
        created_at: now,
        demo_url: None,
        description: format!("{name} description"),
        estimated_price: None,
        id: id.to_string(),
        lessons: Vec::new(),
        level: "beginner".to_string(),
        name: name.to_string(),
        prerequisites: Vec::new(),
        price: 10.0,
        purchased: 0,
        ratings: 0.0,
        reviews: Vec::new(),
        tags: Vec::new(),
        thumbnail: None,
        updated_at: now,
    }
}

/// Wraps a `MemoryCache` and counts writes, to observe cache population.
pub struct CountingKv {
    inner: MemoryCache,
    sets: AtomicUsize,
}

impl CountingKv {
    pub fn new(inner: MemoryCache) -> Self {
        Self {
            inner,
            sets: AtomicUsize::new(0),
        }
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for CountingKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn replace(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, CacheError> {
        self.inner.replace(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }
}

/// A backend that refuses every operation.
pub struct FailingKv;

fn refused() -> CacheError {
    CacheError::Connection("connection refused".to_string())
}

#[async_trait]
impl KvStore for FailingKv {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(refused())
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(refused())
    }

    async fn replace(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<bool, CacheError> {
        Err(refused())
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(refused())
    }
}

/// A backend that answers only after `delay`.
pub struct SlowKv {
    delay: Duration,
    inner: MemoryCache,
}

impl SlowKv {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: MemoryCache::new(),
        }
    }
}

#[async_trait]
impl KvStore for SlowKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl).await
    }

    async fn replace(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.replace(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(key).await
    }
}

/// Captures dispatched mail instead of logging it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Mail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailDispatcher for RecordingMailer {
    fn send(&self, mail: Mail) {
        self.sent.lock().unwrap().push(mail);
    }
}
