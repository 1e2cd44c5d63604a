//! Database driver seam.
//!
//! The manager never talks to the network itself. It builds an [`Engine`] through a
//! [`Driver`], probes it, and hands out [`Session`]s the engine opens. The shipped
//! implementation is [`PgDriver`], backed by an `sqlx` PostgreSQL pool.

pub mod postgres;

pub use postgres::{PgDriver, PgEngine, PgSession};

use crate::error::DriverError;
use std::future::Future;
use std::time::Duration;

/// Pool construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Connection URL; may carry a `+driver` scheme suffix.
    pub url: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub max_pool_connections: u32,
    pub acquire_timeout: Duration,
    /// Log executed statements.
    pub echo: bool,
}

impl EngineOptions {
    /// Upper bound on live connections: `pool_size + max_overflow`, capped by
    /// `max_pool_connections`, never below one.
    pub fn max_connections(&self) -> u32 {
        self.pool_size
            .saturating_add(self.max_overflow)
            .min(self.max_pool_connections)
            .max(1)
    }
}

/// Flags a session factory applies to every session it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub expire_on_commit: bool,
    pub autoflush: bool,
}

/// Builds engines. Construction must not perform I/O; connections are opened lazily.
pub trait Driver: Send + Sync + 'static {
    type Engine: Engine<Session = Self::Session>;
    type Session: Session;

    fn create_engine(&self, options: &EngineOptions) -> Result<Self::Engine, DriverError>;
}

/// A pool of connections to one target.
pub trait Engine: Send + Sync + 'static {
    type Session: Session;

    /// Open one raw connection, run a no-op round-trip, release it.
    fn probe(&self) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn open_session(&self, options: &SessionOptions) -> Self::Session;

    /// Release every pooled connection. Sessions still holding one finish normally.
    fn dispose(&self) -> impl Future<Output = ()> + Send;
}

/// A unit-of-work handle. Owned by exactly one caller at a time.
pub trait Session: Send + 'static {
    fn in_transaction(&self) -> bool;

    fn begin(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// No-op when no transaction is open.
    fn rollback(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;
}
