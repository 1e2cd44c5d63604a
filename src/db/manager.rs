//! Per-target pool manager.
//!
//! A [`Manager`] owns at most one engine handle and one session factory for its
//! target. The engine is built lazily, validated with a probe, and can be torn down
//! and rebuilt. Work against the database happens inside [`Manager::with_session`].

use crate::config::{PostgresConfig, TargetIdentity};
use crate::db::session::{SessionFactory, SessionGuard};
use crate::driver::{Driver, Engine};
use crate::error::{BoxError, PoolError, PoolResult};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Lifecycle of a manager's engine handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No engine has been built yet.
    Uninitialized,
    Ready,
    /// The engine was disposed; the next session or reconnect rebuilds it.
    Disconnected,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

struct Handles<D: Driver> {
    engine: Option<Arc<D::Engine>>,
    factory: Option<SessionFactory<D::Engine>>,
    state: ManagerState,
}

pub struct Manager<D: Driver> {
    driver: Arc<D>,
    config: PostgresConfig,
    identity: TargetIdentity,
    /// Never held across driver I/O.
    handles: RwLock<Handles<D>>,
}

impl<D: Driver> Manager<D> {
    /// Create an uninitialized manager. No engine is built until [`init`](Self::init).
    pub fn new(driver: Arc<D>, config: PostgresConfig) -> Self {
        let identity = config.identity();
        Self {
            driver,
            config,
            identity,
            handles: RwLock::new(Handles {
                engine: None,
                factory: None,
                state: ManagerState::Uninitialized,
            }),
        }
    }

    pub fn identity(&self) -> &TargetIdentity {
        &self.identity
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    pub fn async_url(&self) -> String {
        self.config.async_url()
    }

    pub fn sync_url(&self) -> String {
        self.config.sync_url()
    }

    pub async fn state(&self) -> ManagerState {
        self.handles.read().await.state
    }

    /// True while an engine handle exists.
    pub async fn is_initialized(&self) -> bool {
        self.handles.read().await.engine.is_some()
    }

    /// Build the engine and bind a session factory to it. No-op if an engine exists.
    pub async fn init(&self) -> PoolResult<()> {
        if self.handles.read().await.engine.is_some() {
            return Ok(());
        }

        let mut handles = self.handles.write().await;
        // Double-check after acquiring write lock
        if handles.engine.is_some() {
            return Ok(());
        }

        let engine = self
            .driver
            .create_engine(&self.config.engine_options())
            .map_err(|e| PoolError::engine_initialization(&self.identity, e.to_string()))?;
        handles.engine = Some(Arc::new(engine));

        let factory = SessionFactory::bind(
            handles.engine.as_ref(),
            self.config.session_options(),
            &self.identity,
        )?;
        handles.factory = Some(factory);
        handles.state = ManagerState::Ready;

        info!(
            identity = %self.identity,
            pool_size = self.config.pool_size(),
            pool_overflow = self.config.pool_overflow(),
            timeout_secs = self.config.timeout(),
            "Engine initialized"
        );
        Ok(())
    }

    /// [`init`](Self::init), then confirm reachability with one round-trip.
    ///
    /// A failed probe leaves the engine in place; only the probe result is reported.
    pub async fn initialize_and_probe(&self) -> PoolResult<()> {
        self.init().await?;

        let engine = self.handles.read().await.engine.clone().ok_or_else(|| {
            PoolError::engine_initialization(&self.identity, "Engine disposed before probe")
        })?;

        engine
            .probe()
            .await
            .map_err(|e| PoolError::connection(&self.identity, e))?;

        info!(identity = %self.identity, "Connectivity probe succeeded");
        Ok(())
    }

    /// Run `scope` as one unit of work.
    ///
    /// On success an open transaction is committed. If the scope or the commit fails,
    /// the session is rolled back and the failure is returned as `SessionCreation`.
    /// The session is closed exactly once on every path, including cancellation.
    /// Initializes the engine first if needed.
    ///
    /// The returned future may only borrow the session (`BoxFuture<'s, _>`), so anything
    /// else the scope needs must be moved in as owned data. If the caller is cancelled
    /// the scope's future is dropped and only the rollback and close run on a spawned task.
    ///
    /// ```ignore
    /// let rows = manager
    ///     .with_session(|session| Box::pin(async move {
    ///         session.execute("UPDATE jobs SET done = true").await
    ///     }))
    ///     .await?;
    /// ```
    pub async fn with_session<T, E, F>(&self, scope: F) -> PoolResult<T>
    where
        F: for<'s> FnOnce(&'s mut D::Session) -> BoxFuture<'s, Result<T, E>>,
        T: Send,
        E: Into<BoxError> + Send,
    {
        self.init().await?;

        let factory = self.handles.read().await.factory.clone().ok_or_else(|| {
            PoolError::session_creation(&self.identity, "Session factory is unavailable")
        })?;

        let mut guard = SessionGuard::new(factory.create(), self.identity.clone());
        debug!(identity = %self.identity, "Session opened");

        let outcome = match guard.session_mut() {
            Some(session) => scope(session).await.map_err(Into::into),
            None => Err(BoxError::from("Session released before use")),
        };

        match outcome {
            Ok(value) => {
                if let Err(e) = guard.commit_if_open().await {
                    guard.rollback_and_close().await;
                    return Err(PoolError::session_creation(&self.identity, e));
                }
                guard
                    .close()
                    .await
                    .map_err(|e| PoolError::session_creation(&self.identity, e))?;
                Ok(value)
            }
            Err(cause) => {
                debug!(
                    identity = %self.identity,
                    error = %cause,
                    "Session scope failed, rolling back"
                );
                guard.rollback_and_close().await;
                Err(PoolError::session_creation(&self.identity, cause))
            }
        }
    }

    /// Dispose the engine and drop the handle. No-op if there is none.
    pub async fn disconnect(&self) {
        // Take handles under lock, dispose outside lock
        let engine = {
            let mut handles = self.handles.write().await;
            handles.factory = None;
            let engine = handles.engine.take();
            if engine.is_some() {
                handles.state = ManagerState::Disconnected;
            }
            engine
        };

        if let Some(engine) = engine {
            engine.dispose().await;
            info!(identity = %self.identity, "Engine disposed");
        }
    }

    /// [`disconnect`](Self::disconnect) followed by
    /// [`initialize_and_probe`](Self::initialize_and_probe).
    pub async fn reconnect(&self) -> PoolResult<()> {
        self.disconnect().await;
        self.initialize_and_probe().await
    }
}

impl<D: Driver> std::fmt::Debug for Manager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
