//! Process-wide registry of pool managers.
//!
//! # Design Decisions
//!
//! - **`OnceCell` per target identity**: single-flight manager creation. Concurrent
//!   first requests for one identity run the init-and-probe sequence once; the others
//!   await its result. A failed or cancelled attempt leaves the cell empty, so the next
//!   caller retries from scratch and nothing half-built is ever published.
//! - **Coarse lock only around cell creation**: the map's write lock is held just long
//!   enough to insert an empty cell, never during initialization, so unrelated
//!   identities do not serialize each other.
//! - **Managers are never evicted**: a manager lives for the rest of the process once
//!   published. `disconnect_all` releases connections but keeps the managers cached.

use crate::config::{PostgresConfig, TargetIdentity};
use crate::db::manager::Manager;
use crate::driver::{Driver, PgDriver};
use crate::error::PoolResult;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

type ManagerCell<D> = Arc<OnceCell<Arc<Manager<D>>>>;

pub struct Registry<D: Driver> {
    driver: Arc<D>,
    managers: RwLock<HashMap<TargetIdentity, ManagerCell<D>>>,
}

impl<D: Driver> Registry<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
            managers: RwLock::new(HashMap::new()),
        }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Return the manager for `config`'s identity, creating and probing it on first use.
    ///
    /// Only a manager whose probe succeeded is published. On failure the error is
    /// returned, the half-built engine is disposed, and nothing is cached.
    pub async fn get_or_create(&self, config: &PostgresConfig) -> PoolResult<Arc<Manager<D>>> {
        let identity = config.identity();
        let cell = self.cell_for(&identity).await;

        let manager = cell
            .get_or_try_init(|| async {
                info!(identity = %identity, "Creating pool manager");
                let manager = Arc::new(Manager::new(Arc::clone(&self.driver), config.clone()));
                if let Err(e) = manager.initialize_and_probe().await {
                    warn!(identity = %identity, error = %e, "Pool manager initialization failed");
                    manager.disconnect().await;
                    return Err(e);
                }
                Ok(manager)
            })
            .await?;

        Ok(Arc::clone(manager))
    }

    /// Get or create the one-shot cell for an identity.
    async fn cell_for(&self, identity: &TargetIdentity) -> ManagerCell<D> {
        {
            let managers = self.managers.read().await;
            if let Some(cell) = managers.get(identity) {
                return Arc::clone(cell);
            }
        }

        let mut managers = self.managers.write().await;
        // Double-check after acquiring write lock
        Arc::clone(
            managers
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Published manager for `identity`, if any.
    pub async fn get(&self, identity: &TargetIdentity) -> Option<Arc<Manager<D>>> {
        let managers = self.managers.read().await;
        managers.get(identity).and_then(|cell| cell.get().cloned())
    }

    /// Identities with a published manager.
    pub async fn identities(&self) -> Vec<TargetIdentity> {
        let managers = self.managers.read().await;
        managers
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    /// Number of published managers.
    pub async fn len(&self) -> usize {
        let managers = self.managers.read().await;
        managers.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Disconnect every published manager. Managers stay registered.
    pub async fn disconnect_all(&self) {
        // Collect under lock, disconnect outside lock
        let managers: Vec<Arc<Manager<D>>> = {
            let managers = self.managers.read().await;
            managers
                .values()
                .filter_map(|cell| cell.get().cloned())
                .collect()
        };

        for manager in managers {
            manager.disconnect().await;
        }
        info!("All pool managers disconnected");
    }
}

impl<D: Driver> std::fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<Registry<PgDriver>> = OnceLock::new();

impl Registry<PgDriver> {
    /// The process-wide PostgreSQL registry.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Registry::new(PgDriver))
    }
}

/// Get or create the manager for `config` in the process-wide registry.
pub async fn get_or_create(config: &PostgresConfig) -> PoolResult<Arc<Manager<PgDriver>>> {
    Registry::global().get_or_create(config).await
}
