//! Session factory and release guard.

use crate::config::TargetIdentity;
use crate::driver::{Engine, Session, SessionOptions};
use crate::error::{DriverError, PoolError, PoolResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces sessions bound to one engine handle.
///
/// Rebuilt whenever the manager rebuilds its engine.
pub struct SessionFactory<E: Engine> {
    engine: Arc<E>,
    options: SessionOptions,
}

impl<E: Engine> SessionFactory<E> {
    /// Bind a factory to `engine`.
    ///
    /// Fails with `EngineInitialization` when no engine has been built yet.
    pub fn bind(
        engine: Option<&Arc<E>>,
        options: SessionOptions,
        identity: &TargetIdentity,
    ) -> PoolResult<Self> {
        let engine = engine.ok_or_else(|| {
            PoolError::engine_initialization(
                identity,
                "Session factory requested before the engine was created",
            )
        })?;
        Ok(Self {
            engine: Arc::clone(engine),
            options,
        })
    }

    pub fn create(&self) -> E::Session {
        self.engine.open_session(&self.options)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl<E: Engine> Clone for SessionFactory<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            options: self.options,
        }
    }
}

impl<E: Engine> std::fmt::Debug for SessionFactory<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Owns a session for the length of one scope and guarantees it is closed once.
///
/// The normal paths release the session explicitly. If the guard is dropped while
/// still holding it (the scope's future was cancelled or panicked), `Drop` spawns a
/// task on the current runtime that rolls back and closes it.
pub(crate) struct SessionGuard<S: Session> {
    session: Option<S>,
    identity: TargetIdentity,
    /// Set once a rollback has been issued, so `Drop` does not issue a second one.
    rolled_back: bool,
}

impl<S: Session> SessionGuard<S> {
    pub(crate) fn new(session: S, identity: TargetIdentity) -> Self {
        Self {
            session: Some(session),
            identity,
            rolled_back: false,
        }
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    /// Commit if the session holds an open transaction.
    pub(crate) async fn commit_if_open(&mut self) -> Result<(), DriverError> {
        match self.session.as_mut() {
            Some(session) if session.in_transaction() => session.commit().await,
            _ => Ok(()),
        }
    }

    /// Close the session, consuming the guard's hold on it.
    pub(crate) async fn close(&mut self) -> Result<(), DriverError> {
        match self.session.take() {
            Some(mut session) => {
                debug!(identity = %self.identity, "Closing session");
                session.close().await
            }
            None => Ok(()),
        }
    }

    /// Roll back then close. Failures are logged; the caller reports the original error.
    pub(crate) async fn rollback_and_close(&mut self) {
        if let Some(session) = self.session.as_mut() {
            self.rolled_back = true;
            if let Err(e) = session.rollback().await {
                warn!(identity = %self.identity, error = %e, "Session rollback failed");
            }
        }
        if let Err(e) = self.close().await {
            warn!(identity = %self.identity, error = %e, "Session close failed");
        }
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let identity = self.identity.clone();
        let needs_rollback = !self.rolled_back;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if needs_rollback {
                        if let Err(e) = session.rollback().await {
                            warn!(identity = %identity, error = %e, "Abandoned session rollback failed");
                        }
                    }
                    if let Err(e) = session.close().await {
                        warn!(identity = %identity, error = %e, "Abandoned session close failed");
                    }
                    warn!(
                        identity = %identity,
                        "Session released via Drop - its scope was cancelled or panicked"
                    );
                });
            }
            Err(_) => {
                warn!(
                    identity = %identity,
                    "No runtime available to release abandoned session"
                );
            }
        }
    }
}
