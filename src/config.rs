use cookie::SameSite;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub cookies: CookieConfig,
    pub node: NodeConfig,
    pub store: StoreConfig,
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl_minutes: u64,
    /// Lifetime of a pending registration awaiting its activation code
    pub activation_ttl_seconds: u64,
    pub refresh_secret: String,
    pub refresh_ttl_days: u64,
    pub session_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How often the in-memory backend sweeps expired entries
    pub cleanup_interval_seconds: u64,
    pub op_timeout_ms: u64,
    /// Redis is used when set, otherwise the in-process backend
    pub redis_url: Option<String>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub same_site: SameSite,
    pub secure: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            access_ttl_minutes: 5,
            activation_ttl_seconds: 300,
            refresh_secret: String::new(),
            refresh_ttl_days: 3,
            session_ttl_seconds: 604_800, // 7 days
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("activation_ttl_seconds", &self.activation_ttl_seconds)
            .field("refresh_secret", &"<redacted>")
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .finish()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: 60,
            op_timeout_ms: 250,
            redis_url: None,
            ttl_seconds: 604_800,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: 2000,
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            same_site: SameSite::Lax,
            secure: false,
        }
    }
}

impl TokenConfig {
    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_ttl_minutes as i64)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_ttl_days as i64)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn activation_ttl(&self) -> Duration {
        Duration::from_secs(self.activation_ttl_seconds)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl StoreConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Parse an environment variable, falling back to `default` when it is unset
/// or unparsable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::Missing(name))
}

pub fn parse_same_site(value: &str) -> Option<SameSite> {
    match value.trim().to_lowercase().as_str() {
        "lax" => Some(SameSite::Lax),
        "strict" => Some(SameSite::Strict),
        "none" => Some(SameSite::None),
        _ => None,
    }
}

/// One day of access token lifetime
const MAX_ACCESS_TTL_MINUTES: u64 = 24 * 60;
const MAX_REFRESH_TTL_DAYS: u64 = 365;
/// One year; bounds every TTL kept by the session and cache backends
const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;
const MAX_TIMEOUT_MS: u64 = 60_000;

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let token_defaults = TokenConfig::default();
        let tokens = TokenConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            access_ttl_minutes: env_or(
                "ACCESS_TOKEN_TTL_MINUTES",
                token_defaults.access_ttl_minutes,
            ),
            activation_ttl_seconds: env_or(
                "ACTIVATION_TTL_SECONDS",
                token_defaults.activation_ttl_seconds,
            ),
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            refresh_ttl_days: env_or("REFRESH_TOKEN_TTL_DAYS", token_defaults.refresh_ttl_days),
            session_ttl_seconds: env_or("SESSION_TTL_SECONDS", token_defaults.session_ttl_seconds),
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            cleanup_interval_seconds: env_or(
                "CACHE_CLEANUP_INTERVAL_SECONDS",
                cache_defaults.cleanup_interval_seconds,
            ),
            op_timeout_ms: env_or("CACHE_TIMEOUT_MS", cache_defaults.op_timeout_ms),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            ttl_seconds: env_or("CACHE_TTL_SECONDS", cache_defaults.ttl_seconds),
        };

        let store = StoreConfig {
            op_timeout_ms: env_or("STORE_TIMEOUT_MS", StoreConfig::default().op_timeout_ms),
        };

        let same_site = match std::env::var("COOKIE_SAME_SITE") {
            Ok(value) => parse_same_site(&value).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "COOKIE_SAME_SITE must be lax, strict or none, got {value:?}"
                ))
            })?,
            Err(_) => SameSite::Lax,
        };
        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let config = Config {
            cache,
            cookies: CookieConfig {
                same_site,
                secure: production,
            },
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            store,
            tokens,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tokens = &self.tokens;
        if tokens.access_secret.is_empty() || tokens.refresh_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "token secrets cannot be empty".to_string(),
            ));
        }
        if tokens.access_secret == tokens.refresh_secret {
            return Err(ConfigError::ValidationError(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ".to_string(),
            ));
        }

        let ttls = [
            ("ACCESS_TOKEN_TTL_MINUTES", tokens.access_ttl_minutes),
            ("REFRESH_TOKEN_TTL_DAYS", tokens.refresh_ttl_days),
            ("SESSION_TTL_SECONDS", tokens.session_ttl_seconds),
            ("ACTIVATION_TTL_SECONDS", tokens.activation_ttl_seconds),
            ("CACHE_TTL_SECONDS", self.cache.ttl_seconds),
            ("CACHE_TIMEOUT_MS", self.cache.op_timeout_ms),
            ("CACHE_CLEANUP_INTERVAL_SECONDS", self.cache.cleanup_interval_seconds),
            ("STORE_TIMEOUT_MS", self.store.op_timeout_ms),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be greater than zero"
            )));
        }

        let limits = [
            ("ACCESS_TOKEN_TTL_MINUTES", tokens.access_ttl_minutes, MAX_ACCESS_TTL_MINUTES),
            ("REFRESH_TOKEN_TTL_DAYS", tokens.refresh_ttl_days, MAX_REFRESH_TTL_DAYS),
            ("SESSION_TTL_SECONDS", tokens.session_ttl_seconds, MAX_TTL_SECONDS),
            ("ACTIVATION_TTL_SECONDS", tokens.activation_ttl_seconds, MAX_TTL_SECONDS),
            ("CACHE_TTL_SECONDS", self.cache.ttl_seconds, MAX_TTL_SECONDS),
            ("CACHE_TIMEOUT_MS", self.cache.op_timeout_ms, MAX_TIMEOUT_MS),
            (
                "CACHE_CLEANUP_INTERVAL_SECONDS",
                self.cache.cleanup_interval_seconds,
                MAX_TTL_SECONDS,
            ),
            ("STORE_TIMEOUT_MS", self.store.op_timeout_ms, MAX_TIMEOUT_MS),
        ];
        if let Some((name, _, max)) = limits.iter().find(|(_, value, max)| value > max) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must not exceed {max}"
            )));
        }

        if self.cookies.same_site == SameSite::None && !self.cookies.secure {
            tracing::warn!(
                "COOKIE_SAME_SITE=none without APP_ENV=production; browsers reject \
                 SameSite=None cookies that are not Secure"
            );
        }

        Ok(())
    }
}
