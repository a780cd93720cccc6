//! Server-side session records, one per principal, held in the KV backend
//! with native TTL. A token is only honoured while the record it was minted
//! under is alive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::cache::{bounded, CacheError, KvStore};
use crate::storage::models::Principal;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session backend error: {0}")]
    Backend(#[from] CacheError),
    #[error("Corrupt session record: {0}")]
    Corrupt(serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub issued_at: DateTime<Utc>,
    pub principal: Principal,
    /// Session nonce carried by every token minted for this session
    pub sid: String,
}

pub fn session_key(principal_id: &str) -> String {
    format!("session:{principal_id}")
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KvStore>,
    timeout: Duration,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KvStore>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start (or supersede) the session of `principal` under `sid`
    pub async fn put(
        &self,
        principal: &Principal,
        sid: &str,
    ) -> Result<SessionRecord, SessionError> {
        let record = SessionRecord {
            issued_at: Utc::now(),
            principal: principal.clone(),
            sid: sid.to_string(),
        };
        let data = serde_json::to_vec(&record).map_err(CacheError::from)?;
        let key = session_key(&principal.id);
        bounded(self.timeout, self.backend.set(&key, data, self.ttl)).await?;
        debug!(principal_id = %principal.id, "Stored session");
        Ok(record)
    }

    /// The live session of `principal_id`, if any
    pub async fn get(&self, principal_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let key = session_key(principal_id);
        let Some(data) = bounded(self.timeout, self.backend.get(&key)).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(SessionError::Corrupt)
    }

    /// End the session of `principal_id`; returns whether one was alive
    pub async fn delete(&self, principal_id: &str) -> Result<bool, SessionError> {
        let key = session_key(principal_id);
        let deleted = bounded(self.timeout, self.backend.delete(&key)).await?;
        if deleted {
            debug!(principal_id = %principal_id, "Deleted session");
        }
        Ok(deleted)
    }

    /// Swap the principal snapshot of a live session, keeping its `sid`.
    /// Returns `false` (and writes nothing) when there is no session.
    pub async fn replace_snapshot(&self, principal: &Principal) -> Result<bool, SessionError> {
        let Some(current) = self.get(&principal.id).await? else {
            return Ok(false);
        };
        self.write_existing(SessionRecord {
            issued_at: current.issued_at,
            principal: principal.clone(),
            sid: current.sid,
        })
        .await
    }

    /// Renew the session of `principal` under `sid` on refresh. Unlike
    /// [`SessionStore::put`] this never recreates a session that was deleted
    /// in the meantime; returns `false` in that case.
    pub async fn renew(&self, principal: &Principal, sid: &str) -> Result<bool, SessionError> {
        self.write_existing(SessionRecord {
            issued_at: Utc::now(),
            principal: principal.clone(),
            sid: sid.to_string(),
        })
        .await
    }

    /// Overwrite a live entry only, so a concurrent logout stays logged out
    async fn write_existing(&self, record: SessionRecord) -> Result<bool, SessionError> {
        let data = serde_json::to_vec(&record).map_err(CacheError::from)?;
        let key = session_key(&record.principal.id);
        let replaced = bounded(self.timeout, self.backend.replace(&key, data, self.ttl)).await?;
        if replaced {
            debug!(principal_id = %record.principal.id, "Rewrote live session");
        }
        Ok(replaced)
    }
}
