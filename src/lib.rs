//! PostgreSQL Session Pool
//!
//! This library keeps exactly one connection pool per database target for the whole
//! process, validates it with a connectivity probe, and hands out scoped sessions that
//! commit on success, roll back on failure, and are always closed.

pub mod config;
pub mod db;
pub mod driver;
pub mod error;

pub use config::{PostgresConfig, TargetIdentity};
pub use db::{Manager, ManagerState, Registry, get_or_create};
pub use driver::{PgDriver, PgSession};
pub use error::{ConfigError, DriverError, PoolError, PoolResult};
