//! Application state management
//!
//! This module contains the shared application state that is passed
//! to all request handlers via Axum's State extractor.

use std::sync::Arc;

use bollard::Docker;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::pool::SandboxPool;
use crate::store::EnvironmentStore;
use sysinfo::System;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Inner state (wrapped in Arc for cheap cloning)
struct AppStateInner {
    /// Container runtime, kept around for endpoints that don't go through
    /// the pool (the scheduler's own jobs use it too).
    pub docker: Docker,

    /// Fixed-size pool of pre-created sandbox containers. Kept behind an
    /// `Arc` of its own (on top of the state's own `Arc`) so an
    /// `AcquiredSlot` guard can hold a handle back to it independent of any
    /// particular request's `AppState` clone.
    pub pool: Arc<SandboxPool>,

    /// Filesystem-backed store of saved environments.
    pub store: EnvironmentStore,

    /// Application configuration.
    pub config: Config,

    /// Host/process metrics handle; sysinfo's `System` is not safe to
    /// refresh concurrently, so every reader goes through this mutex.
    pub system: Mutex<System>,

    /// Engine version string, fetched once at startup.
    pub docker_version: String,
}

impl AppState {
    pub fn new(
        docker: Docker,
        pool: Arc<SandboxPool>,
        store: EnvironmentStore,
        config: Config,
        docker_version: String,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                docker,
                pool,
                store,
                config,
                system: Mutex::new(System::new_all()),
                docker_version,
            }),
        }
    }

    pub fn docker(&self) -> &Docker {
        &self.inner.docker
    }

    pub fn pool(&self) -> &SandboxPool {
        &self.inner.pool
    }

    /// A clonable handle to the pool, for callers (like `/execute/`) that
    /// need to build an [`crate::pool::AcquiredSlot`] guard.
    pub fn pool_handle(&self) -> Arc<SandboxPool> {
        Arc::clone(&self.inner.pool)
    }

    pub fn store(&self) -> &EnvironmentStore {
        &self.inner.store
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn system(&self) -> &Mutex<System> {
        &self.inner.system
    }

    pub fn docker_version(&self) -> &str {
        &self.inner.docker_version
    }
}
