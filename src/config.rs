//! Service Configuration
//! Mission: Read every tunable once at startup and hand it to the components

use crate::middleware::RateLimitConfig;
use std::env;
use std::time::Duration;
use tracing::warn;

const DEV_TOKEN_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

/// Top-level configuration, built once in `main` and passed into constructors.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    pub env: String,
    pub db: DbConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub invitation_exp: Duration,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
    /// Upper bound for a single system-of-record call.
    pub query_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_addr: String,
    pub ttl: Duration,
    /// Upper bound for a single cache command.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub basic: BasicAuthConfig,
    pub token: TokenConfig,
    /// bcrypt work factor for newly set passwords.
    pub bcrypt_cost: u32,
}

/// Operator identity for internal routes. Not an end-user account.
#[derive(Debug, Clone)]
pub struct BasicAuthConfig {
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub exp: Duration,
    pub iss: String,
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Self {
        let secret = env::var("AUTH_TOKEN_SECRET").unwrap_or_else(|_| {
            warn!("⚠️  AUTH_TOKEN_SECRET not set, using development secret");
            DEV_TOKEN_SECRET.to_string()
        });

        let backend = match env::var("CACHE_BACKEND").as_deref() {
            Ok("memory") => CacheBackend::Memory,
            _ => CacheBackend::Redis,
        };

        Self {
            addr: env_string("ADDR", "0.0.0.0:8080"),
            env: env_string("ENV", "development"),
            db: DbConfig {
                path: env_string("DB_PATH", "socialnet.db"),
                query_timeout: Duration::from_secs(env_parse("DB_QUERY_TIMEOUT_SECS", 5)),
            },
            cache: CacheConfig {
                enabled: env_flag("REDIS_ENABLED", false),
                backend,
                redis_addr: env_string("REDIS_ADDR", "redis://127.0.0.1:6379"),
                ttl: Duration::from_secs(env_parse("REDIS_TTL_SECS", 60)),
                timeout: Duration::from_millis(env_parse("CACHE_TIMEOUT_MS", 500)),
            },
            rate_limit: RateLimitConfig {
                enabled: env_flag("RATELIMITER_ENABLED", true),
                max_requests: env_parse("RATELIMITER_REQUESTS_COUNT", 20),
                window: Duration::from_secs(env_parse("RATELIMITER_WINDOW_SECS", 5)),
            },
            auth: AuthConfig {
                basic: BasicAuthConfig {
                    user: env_string("AUTH_BASIC_USER", "admin"),
                    pass: env_string("AUTH_BASIC_PASS", "admin"),
                },
                token: TokenConfig {
                    secret,
                    exp: env_hours("AUTH_TOKEN_EXP_HOURS", 72),
                    iss: env_string("AUTH_TOKEN_ISS", "socialnet"),
                },
                bcrypt_cost: env_parse("AUTH_BCRYPT_COST", bcrypt::DEFAULT_COST),
            },
            invitation_exp: env_hours("INVITATION_EXP_HOURS", 72),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            env: "development".to_string(),
            db: DbConfig {
                path: "socialnet.db".to_string(),
                query_timeout: Duration::from_secs(5),
            },
            cache: CacheConfig {
                enabled: false,
                backend: CacheBackend::Redis,
                redis_addr: "redis://127.0.0.1:6379".to_string(),
                ttl: Duration::from_secs(60),
                timeout: Duration::from_millis(500),
            },
            rate_limit: RateLimitConfig::default(),
            auth: AuthConfig {
                basic: BasicAuthConfig {
                    user: "admin".to_string(),
                    pass: "admin".to_string(),
                },
                token: TokenConfig {
                    secret: DEV_TOKEN_SECRET.to_string(),
                    exp: Duration::from_secs(72 * 3600),
                    iss: "socialnet".to_string(),
                },
                bcrypt_cost: bcrypt::DEFAULT_COST,
            },
            invitation_exp: Duration::from_secs(72 * 3600),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

/// Whole hours, saturating instead of overflowing on absurd values.
fn env_hours(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse(key, default).saturating_mul(3600))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
