//! Compact signed tokens.
//!
//! Format: `base64url(claims json) "." base64url(HMAC-SHA256(secret, payload))`.
//! The MAC covers the encoded payload text, so it is checked before anything
//! is decoded.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Absolute expiry, unix seconds
    pub exp: i64,
    /// Issued at, unix seconds
    pub iat: i64,
    pub kind: TokenKind,
    /// Session nonce the token was minted under
    pub sid: String,
    /// Principal id
    pub sub: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("malformed token")]
    Malformed,
    #[error("unexpected token kind")]
    WrongKind,
}

/// Sign `claims` with `secret`
pub fn encode(claims: &Claims, secret: &[u8]) -> String {
    // Claims only hold strings and integers
    let json = serde_json::to_vec(claims).unwrap_or_default();
    let payload = URL_SAFE_NO_PAD.encode(json);
    let signature = URL_SAFE_NO_PAD.encode(sign(secret, payload.as_bytes()));
    format!("{payload}.{signature}")
}

/// Issue a token valid for `ttl` from `now`
pub fn issue_at(
    principal_id: &str,
    sid: &str,
    kind: TokenKind,
    secret: &[u8],
    ttl: Duration,
    now: DateTime<Utc>,
) -> String {
    let claims = Claims {
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
        kind,
        sid: sid.to_string(),
        sub: principal_id.to_string(),
    };
    encode(&claims, secret)
}

pub fn issue(principal_id: &str, sid: &str, kind: TokenKind, secret: &[u8], ttl: Duration) -> String {
    issue_at(principal_id, sid, kind, secret, ttl, Utc::now())
}

/// Verify signature and expiry as of `now`
pub fn verify_at(token: &str, secret: &[u8], now: DateTime<Utc>) -> Result<Claims, TokenError> {
    let (payload, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
    if payload.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::InvalidSignature)?;
    let mut mac = new_mac(secret);
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

    if now.timestamp() >= claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

pub fn verify(token: &str, secret: &[u8]) -> Result<Claims, TokenError> {
    verify_at(token, secret, Utc::now())
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length
    match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take key of any size"),
    }
}

fn sign(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(secret);
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Secret and lifetime for one token kind
#[derive(Clone)]
pub struct TokenKey {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl TokenKey {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenKey")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// A freshly minted access + refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and verifies both token kinds, each with its own key
#[derive(Debug, Clone)]
pub struct TokenCodec {
    access: TokenKey,
    refresh: TokenKey,
}

impl TokenCodec {
    pub fn new(access: TokenKey, refresh: TokenKey) -> Self {
        Self { access, refresh }
    }

    pub fn key(&self, kind: TokenKind) -> &TokenKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn issue(&self, principal_id: &str, sid: &str, kind: TokenKind) -> String {
        let key = self.key(kind);
        issue(principal_id, sid, kind, &key.secret, key.ttl)
    }

    pub fn issue_pair(&self, principal_id: &str, sid: &str) -> TokenPair {
        TokenPair {
            access: self.issue(principal_id, sid, TokenKind::Access),
            refresh: self.issue(principal_id, sid, TokenKind::Refresh),
        }
    }

    /// Verify with the key of `kind`; a token of another kind is rejected
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = verify(token, &self.key(kind).secret)?;
        if claims.kind != kind {
            return Err(TokenError::WrongKind);
        }
        Ok(claims)
    }
}
