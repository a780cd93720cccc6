//! learnhub-auth - Session lifecycle and cache-aside data layer for a
//! learning platform backend
//!
//! This crate provides:
//! - Compact HMAC-signed access and refresh tokens
//! - Server-side sessions in a TTL key-value store (Redis or in-process),
//!   one per principal, revocable independently of token expiry
//! - Role-gated axum routes with fail-closed authentication
//! - A read-through cache with write-path invalidation for users and courses
//! - redb embedded database as the authoritative store

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod expiration;
pub mod mail;
pub mod session;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use std::sync::Arc;

use auth::AuthGate;
use cache::{CacheAsideReader, Invalidator, KvStore};
use config::Config;
use mail::MailDispatcher;
use session::SessionStore;
use storage::{Database, Store};
use tokens::{TokenCodec, TokenKey};

/// Shared application state
pub struct AppState {
    pub codec: TokenCodec,
    pub config: Config,
    pub invalidator: Invalidator,
    /// Backend shared by sessions, pending registrations and the entity cache
    pub kv: Arc<dyn KvStore>,
    pub mailer: Arc<dyn MailDispatcher>,
    pub reader: CacheAsideReader,
    pub sessions: SessionStore,
    pub store: Store,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        kv: Arc<dyn KvStore>,
        mailer: Arc<dyn MailDispatcher>,
    ) -> Self {
        let tokens = &config.tokens;
        let codec = TokenCodec::new(
            TokenKey::new(&tokens.access_secret, tokens.access_ttl()),
            TokenKey::new(&tokens.refresh_secret, tokens.refresh_ttl()),
        );
        let cache_timeout = config.cache.op_timeout();

        Self {
            codec,
            invalidator: Invalidator::new(Arc::clone(&kv), cache_timeout),
            mailer,
            reader: CacheAsideReader::new(Arc::clone(&kv), config.cache.ttl(), cache_timeout),
            sessions: SessionStore::new(Arc::clone(&kv), tokens.session_ttl(), cache_timeout),
            store: Store::new(db, config.store.op_timeout()),
            kv,
            config,
        }
    }

    pub fn gate(&self) -> AuthGate<'_> {
        AuthGate::new(&self.codec, &self.sessions)
    }
}
