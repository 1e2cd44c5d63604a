//! PostgreSQL driver built on `sqlx`.
//!
//! Engines are lazy `PgPool`s: creating one parses the URL and sizes the pool, and the
//! first physical connection is opened by the probe or the first session.

use super::{Driver, Engine, EngineOptions, Session, SessionOptions};
use crate::error::DriverError;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgConnection, PgPool, Postgres, Transaction};
use std::str::FromStr;
use tracing::debug;

/// Strip a `+driver` suffix from the URL scheme (`postgresql+asyncpg://` → `postgresql://`).
pub fn normalize_scheme(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    match url[..scheme_end].find('+') {
        Some(plus) => format!("{}{}", &url[..plus], &url[scheme_end..]),
        None => url.to_string(),
    }
}

/// Connection settings for `options.url`; statement logging is off unless `echo`.
fn connect_options(options: &EngineOptions) -> Result<PgConnectOptions, DriverError> {
    let connect = PgConnectOptions::from_str(&normalize_scheme(&options.url))?;
    Ok(if options.echo {
        connect
    } else {
        connect.disable_statement_logging()
    })
}

fn pool_options(options: &EngineOptions) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(options.max_connections())
        .acquire_timeout(options.acquire_timeout)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PgDriver;

impl Driver for PgDriver {
    type Engine = PgEngine;
    type Session = PgSession;

    fn create_engine(&self, options: &EngineOptions) -> Result<PgEngine, DriverError> {
        let pool = pool_options(options).connect_lazy_with(connect_options(options)?);

        debug!(
            max_connections = options.max_connections(),
            acquire_timeout_secs = options.acquire_timeout.as_secs(),
            echo = options.echo,
            "Created lazy PostgreSQL pool"
        );

        Ok(PgEngine { pool })
    }
}

/// Lazily connected PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgEngine {
    pool: PgPool,
}

impl PgEngine {
    /// Number of connections currently held by the pool (idle or in use).
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl Engine for PgEngine {
    type Session = PgSession;

    async fn probe(&self) -> Result<(), DriverError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    fn open_session(&self, options: &SessionOptions) -> PgSession {
        PgSession {
            pool: self.pool.clone(),
            options: *options,
            tx: None,
            closed: false,
        }
    }

    async fn dispose(&self) {
        self.pool.close().await;
    }
}

/// PostgreSQL unit of work.
///
/// A transaction is begun on first use and held until the scope that owns the session
/// commits or rolls it back.
pub struct PgSession {
    pool: PgPool,
    options: SessionOptions,
    tx: Option<Transaction<'static, Postgres>>,
    closed: bool,
}

impl PgSession {
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Connection bound to this session's transaction, beginning one if needed.
    pub async fn connection(&mut self) -> Result<&mut PgConnection, DriverError> {
        if self.closed {
            return Err(DriverError::other("Session is closed"));
        }
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        let tx = self.tx.insert(tx);
        Ok(&mut **tx)
    }

    /// Execute a statement inside the session's transaction. Returns rows affected.
    pub async fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        let conn = self.connection().await?;
        let result = sqlx::query(sql).execute(conn).await?;
        Ok(result.rows_affected())
    }
}

impl Session for PgSession {
    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn begin(&mut self) -> Result<(), DriverError> {
        self.connection().await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        self.rollback().await
    }
}

impl std::fmt::Debug for PgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession")
            .field("options", &self.options)
            .field("in_transaction", &self.tx.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
