//! Connection configuration.
//!
//! [`PostgresConfig`] is built once from an environment-style lookup source, with every
//! field validated and cast up front. It renders the connection URLs and derives the
//! [`TargetIdentity`] that the registry keys managers by.

use crate::driver::{EngineOptions, SessionOptions};
use crate::error::ConfigError;
use serde::Serialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_DATABASE: &str = "database";
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

// Pool sizing defaults
pub const DEFAULT_POOL_SIZE: u32 = 100;
pub const DEFAULT_MAX_POOL_CON: u32 = 80;
pub const DEFAULT_POOL_OVERFLOW: u32 = 20;

// Session behaviour defaults
pub const DEFAULT_ECHO_LOG: bool = false;
pub const DEFAULT_EXPIRE_ON_COMMIT: bool = true;
pub const DEFAULT_AUTOFLUSH: bool = true;

/// Scheme used for the asynchronous-style URL.
pub const ASYNC_SCHEME: &str = "postgresql+asyncpg";
/// Scheme used for the synchronous-style URL.
pub const SYNC_SCHEME: &str = "postgresql";

const MASK: &str = "****";

/// Environment variable names recognised by [`PostgresConfig::from_lookup`].
pub mod env {
    pub const HOST: &str = "POSTGRES_HOST";
    pub const PORT: &str = "POSTGRES_PORT";
    pub const USER: &str = "POSTGRES_USER";
    pub const PASSWORD: &str = "POSTGRES_PASSWORD";
    pub const DATABASE: &str = "POSTGRES_DB";
    pub const URL: &str = "POSTGRES_URL";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const POOL_SIZE: &str = "POOL_SIZE";
    pub const MAX_POOL_CON: &str = "MAX_POOL_CON";
    pub const POOL_OVERFLOW: &str = "POOL_OVERFLOW";
    pub const ECHO_LOG: &str = "ECHO_LOG";
    pub const EXPIRE_ON_COMMIT: &str = "EXPIRE_ON_COMMIT";
    pub const AUTO_FLUSH: &str = "AUTO_FLUSH";
}

/// Normalized key identifying one database endpoint.
///
/// The key is the asynchronous-style URL (or the raw override). `Display` masks the
/// password so identities are safe to log; [`as_str`](Self::as_str) returns the key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TargetIdentity(String);

impl TargetIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display-safe form of the key (password replaced by `****`).
    pub fn masked(&self) -> String {
        mask_url(&self.0)
    }
}

impl std::fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.masked())
    }
}

impl std::fmt::Debug for TargetIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TargetIdentity").field(&self.masked()).finish()
    }
}

/// Replace the password of a connection URL with `****`.
///
/// Strings without a password are returned unchanged. Strings that do not parse as URLs
/// have everything between the first `:` of the user info and the last `@` redacted.
pub fn mask_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => match url.set_password(Some(MASK)) {
            Ok(()) => url.to_string(),
            Err(()) => redact_userinfo(raw),
        },
        _ => redact_userinfo(raw),
    }
}

fn redact_userinfo(raw: &str) -> String {
    let Some(start) = raw.find("://").map(|i| i + 3) else {
        return raw.to_string();
    };
    let rest = &raw[start..];
    let Some(at) = rest.rfind('@') else {
        return raw.to_string();
    };
    let userinfo = &rest[..at];
    match userinfo.find(':') {
        Some(colon) => format!(
            "{}{}:{}{}",
            &raw[..start],
            &userinfo[..colon],
            MASK,
            &rest[at..]
        ),
        None => raw.to_string(),
    }
}

/// PostgreSQL connection and pool configuration.
///
/// Fields are private so every value passes through [`from_lookup`](Self::from_lookup)
/// or the `with_*` builders. The manager keeps its own copy and never observes later
/// changes.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PostgresConfig {
    host: String,
    port: u16,
    user: String,
    #[serde(skip_serializing)]
    password: String,
    database: String,
    /// Pool acquisition timeout in seconds.
    timeout: u64,
    pool_size: u32,
    /// Hard cap on live connections, applied after `pool_size + pool_overflow`.
    max_pool_con: u32,
    /// Connections allowed beyond `pool_size` under burst load.
    pool_overflow: u32,
    /// Log every statement the driver executes.
    echo_log: bool,
    expire_on_commit: bool,
    autoflush: bool,
    /// Raw URL override. When set, both rendered URLs equal it exactly.
    #[serde(skip_serializing)]
    url: Option<String>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            pool_size: DEFAULT_POOL_SIZE,
            max_pool_con: DEFAULT_MAX_POOL_CON,
            pool_overflow: DEFAULT_POOL_OVERFLOW,
            echo_log: DEFAULT_ECHO_LOG,
            expire_on_commit: DEFAULT_EXPIRE_ON_COMMIT,
            autoflush: DEFAULT_AUTOFLUSH,
            url: None,
        }
    }
}

impl PostgresConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Missing or empty entries fall back to the defaults. Values that cannot be cast
    /// to the field's type are rejected here rather than on first use.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            host: get(env::HOST).unwrap_or(defaults.host),
            port: parse_number(env::PORT, get(env::PORT), defaults.port, "a port number")?,
            user: get(env::USER).unwrap_or(defaults.user),
            password: get(env::PASSWORD).unwrap_or(defaults.password),
            database: get(env::DATABASE).unwrap_or(defaults.database),
            timeout: parse_number(
                env::TIMEOUT,
                get(env::TIMEOUT),
                defaults.timeout,
                "a number of seconds",
            )?,
            pool_size: parse_number(
                env::POOL_SIZE,
                get(env::POOL_SIZE),
                defaults.pool_size,
                "a connection count",
            )?,
            max_pool_con: parse_number(
                env::MAX_POOL_CON,
                get(env::MAX_POOL_CON),
                defaults.max_pool_con,
                "a connection count",
            )?,
            pool_overflow: parse_number(
                env::POOL_OVERFLOW,
                get(env::POOL_OVERFLOW),
                defaults.pool_overflow,
                "a connection count",
            )?,
            echo_log: parse_bool(env::ECHO_LOG, get(env::ECHO_LOG), defaults.echo_log)?,
            expire_on_commit: parse_bool(
                env::EXPIRE_ON_COMMIT,
                get(env::EXPIRE_ON_COMMIT),
                defaults.expire_on_commit,
            )?,
            autoflush: parse_bool(env::AUTO_FLUSH, get(env::AUTO_FLUSH), defaults.autoflush)?,
            url: None,
        };

        match get(env::URL) {
            Some(raw) => config.with_url(raw),
            None => Ok(config),
        }
    }

    /// Return a copy that renders `url` for both connection strings.
    pub fn with_url(self, url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        Url::parse(&url).map_err(|e| ConfigError::invalid_url(e.to_string()))?;
        Ok(Self {
            url: Some(url),
            ..self
        })
    }

    pub fn with_host(self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self
        }
    }

    pub fn with_port(self, port: u16) -> Self {
        Self { port, ..self }
    }

    pub fn with_user(self, user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..self
        }
    }

    pub fn with_password(self, password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            ..self
        }
    }

    pub fn with_database(self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self
        }
    }

    /// Pool acquisition timeout in seconds.
    pub fn with_timeout(self, timeout: u64) -> Self {
        Self { timeout, ..self }
    }

    pub fn with_pool_size(self, pool_size: u32) -> Self {
        Self { pool_size, ..self }
    }

    pub fn with_max_pool_con(self, max_pool_con: u32) -> Self {
        Self {
            max_pool_con,
            ..self
        }
    }

    pub fn with_pool_overflow(self, pool_overflow: u32) -> Self {
        Self {
            pool_overflow,
            ..self
        }
    }

    pub fn with_echo_log(self, echo_log: bool) -> Self {
        Self { echo_log, ..self }
    }

    pub fn with_expire_on_commit(self, expire_on_commit: bool) -> Self {
        Self {
            expire_on_commit,
            ..self
        }
    }

    pub fn with_autoflush(self, autoflush: bool) -> Self {
        Self { autoflush, ..self }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    pub fn max_pool_con(&self) -> u32 {
        self.max_pool_con
    }

    pub fn pool_overflow(&self) -> u32 {
        self.pool_overflow
    }

    pub fn echo_log(&self) -> bool {
        self.echo_log
    }

    pub fn expire_on_commit(&self) -> bool {
        self.expire_on_commit
    }

    pub fn autoflush(&self) -> bool {
        self.autoflush
    }

    /// Raw URL override, if one was set.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Asynchronous-style connection URL (`postgresql+asyncpg://...`).
    pub fn async_url(&self) -> String {
        self.render_url(ASYNC_SCHEME)
    }

    /// Synchronous-style connection URL (`postgresql://...`).
    pub fn sync_url(&self) -> String {
        self.render_url(SYNC_SCHEME)
    }

    /// User and password are percent-encoded so reserved characters survive parsing.
    fn render_url(&self, scheme: &str) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let base = format!("{}://{}:{}/{}", scheme, self.host, self.port, self.database);
        let fallback = || {
            format!(
                "{}://{}:{}@{}:{}/{}",
                scheme, self.user, self.password, self.host, self.port, self.database
            )
        };
        match Url::parse(&base) {
            Ok(mut url) => {
                if url.set_username(&self.user).is_ok()
                    && url.set_password(Some(&self.password)).is_ok()
                {
                    url.to_string()
                } else {
                    fallback()
                }
            }
            Err(_) => fallback(),
        }
    }

    pub fn identity(&self) -> TargetIdentity {
        TargetIdentity::new(self.async_url())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Options handed to the driver when building the engine.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            url: self.async_url(),
            pool_size: self.pool_size,
            max_overflow: self.pool_overflow,
            max_pool_connections: self.max_pool_con,
            acquire_timeout: self.timeout_duration(),
            echo: self.echo_log,
        }
    }

    /// Options handed to the session factory.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            expire_on_commit: self.expire_on_commit,
            autoflush: self.autoflush,
        }
    }

    /// JSON rendering of every field plus both URLs, with the password masked.
    pub fn summary(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(map) = value.as_object_mut() {
            map.insert("password".to_string(), MASK.into());
            map.insert("async_url".to_string(), mask_url(&self.async_url()).into());
            map.insert("sync_url".to_string(), mask_url(&self.sync_url()).into());
        }
        value
    }
}

impl std::fmt::Display for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = serde_json::to_string_pretty(&self.summary()).map_err(|_| std::fmt::Error)?;
        write!(f, "PostgresConfig({})", body)
    }
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &MASK)
            .field("database", &self.database)
            .field("timeout", &self.timeout)
            .field("pool_size", &self.pool_size)
            .field("max_pool_con", &self.max_pool_con)
            .field("pool_overflow", &self.pool_overflow)
            .field("echo_log", &self.echo_log)
            .field("expire_on_commit", &self.expire_on_commit)
            .field("autoflush", &self.autoflush)
            .field("url", &self.url.as_deref().map(mask_url))
            .finish()
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    raw: Option<String>,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_value(key, v, expected)),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(v) = raw else {
        return Ok(default);
    };
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" | "t" => Ok(true),
        "false" | "0" | "no" | "n" | "off" | "f" => Ok(false),
        _ => Err(ConfigError::invalid_value(key, v, "a boolean")),
    }
}
