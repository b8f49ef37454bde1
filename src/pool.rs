//! Sandbox pool (component B)
//!
//! A fixed-size set of pre-warmed containers with acquire-with-timeout,
//! release-with-reset, and crash-reset. Grounded in the original's
//! `sandbox.containers` module: a bounded blocking queue is the sole
//! synchronization primitive, collapsing all locking into the queue
//! primitive and guaranteeing FIFO-ish fairness bounded by the wait time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::config::Config;
use crate::container::ContainerRuntime;
use crate::error::{AppError, AppResult};

/// One pre-created container plus its private writable host directory.
pub struct Slot {
    pub index: usize,
    pub name: String,
    pub container_id: String,
    pub envpath: PathBuf,
}

/// A slot checked out via [`SandboxPool::acquire_guarded`]. Derefs to the
/// underlying [`Slot`]. Call [`AcquiredSlot::release`] when done for a
/// deterministic reset; dropping the guard without calling it (including on
/// panic) still releases the slot, via a background task, since `Drop`
/// cannot `.await`.
pub struct AcquiredSlot {
    pool: Arc<SandboxPool>,
    slot: Option<Slot>,
}

impl AcquiredSlot {
    /// Reset and return the slot to the pool, awaiting completion.
    pub async fn release(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot).await;
        }
    }
}

impl std::ops::Deref for AcquiredSlot {
    type Target = Slot;

    fn deref(&self) -> &Slot {
        self.slot.as_ref().expect("slot already released")
    }
}

impl Drop for AcquiredSlot {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let pool = Arc::clone(&self.pool);
            tracing::warn!(
                slot = slot.index,
                "sandbox slot dropped without explicit release (likely a panic); releasing in background"
            );
            tokio::spawn(async move {
                pool.release(slot).await;
            });
        }
    }
}

/// Fixed-size set of pre-warmed containers. Checked-out slots should go
/// through [`SandboxPool::acquire_guarded`] rather than [`SandboxPool::acquire`]
/// directly: the returned [`AcquiredSlot`] releases itself on drop, so a
/// caller that panics mid-execution still gives its slot back instead of
/// leaking it and shrinking the pool.
pub struct SandboxPool {
    runtime: Arc<dyn ContainerRuntime>,
    sender: mpsc::Sender<Slot>,
    receiver: Mutex<mpsc::Receiver<Slot>>,
    size: usize,
    available: AtomicUsize,
    containers_env_root: PathBuf,
    libs_root: PathBuf,
    image: String,
    wait: Duration,
}

impl SandboxPool {
    /// Purge any stale containers and build `N` fresh ones, per configuration.
    pub async fn init(config: &Config, runtime: Arc<dyn ContainerRuntime>) -> AppResult<Self> {
        let size = config.container.docker_count;
        let (sender, receiver) = mpsc::channel(size);

        let pool = Self {
            runtime,
            sender,
            receiver: Mutex::new(receiver),
            size,
            available: AtomicUsize::new(0),
            containers_env_root: config.storage.containers_env_root.clone(),
            libs_root: config.external_libraries.root.clone(),
            image: config.container.image.clone(),
            wait: Duration::from_secs_f64(config.execution.wait_for_container_duration_seconds),
        };

        pool.reset_all().await?;
        Ok(pool)
    }

    /// Number of ready slots currently queued (approximate under concurrency).
    pub fn available(&self) -> usize {
        self.available.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The container runtime backing this pool's slots, for the executor to
    /// drive `exec` calls against an acquired slot.
    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    fn slot_envpath(&self, index: usize) -> PathBuf {
        self.containers_env_root.join(format!("c{index}"))
    }

    async fn create_slot(&self, index: usize) -> AppResult<Slot> {
        let name = format!("c{index}");
        let envpath = self.slot_envpath(index);
        std::fs::create_dir_all(&envpath).map_err(AppError::from)?;

        let envpath_host = envpath.to_string_lossy().to_string();
        let libs_root = self.libs_root.to_string_lossy().to_string();
        let container_id = self
            .runtime
            .create(&name, &envpath_host, &libs_root)
            .await
            .map_err(AppError::Internal)?;

        Ok(Slot {
            index,
            name,
            container_id,
            envpath,
        })
    }

    /// Acquire an exclusively-held slot, blocking up to the configured wait.
    /// Prefer [`SandboxPool::acquire_guarded`], which guarantees the slot
    /// comes back even if the caller panics before calling `release`.
    pub async fn acquire(&self) -> AppResult<Slot> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(self.wait, receiver.recv()).await {
            Ok(Some(slot)) => {
                self.available.fetch_sub(1, Ordering::Relaxed);
                Ok(slot)
            }
            Ok(None) => Err(AppError::Internal(anyhow::anyhow!("pool channel closed"))),
            Err(_) => Err(AppError::ServiceUnavailable),
        }
    }

    /// Acquire a slot wrapped in an RAII guard. The caller should still call
    /// [`AcquiredSlot::release`] once it is done, for a prompt, synchronous
    /// reset; if the caller panics first, the guard's `Drop` releases the
    /// slot in a background task instead of leaking it.
    pub async fn acquire_guarded(self: &Arc<Self>) -> AppResult<AcquiredSlot> {
        let slot = self.acquire().await?;
        Ok(AcquiredSlot {
            pool: Arc::clone(self),
            slot: Some(slot),
        })
    }

    /// Empty the slot's scratch directory, restart the container, and
    /// re-enqueue it. Falls back to a full reset if restart fails.
    pub async fn release(&self, slot: Slot) {
        let Slot {
            index,
            name,
            container_id,
            envpath,
        } = slot;

        if let Err(e) = clear_dir(&envpath) {
            tracing::warn!(slot = index, "failed to clear envpath: {e}");
        }

        match self.runtime.restart(&container_id).await {
            Ok(()) => {
                let slot = Slot {
                    index,
                    name,
                    container_id,
                    envpath,
                };
                self.enqueue(slot).await;
            }
            Err(e) => {
                tracing::warn!(slot = index, "restart failed, resetting: {e}");
                let _ = self.runtime.remove(&container_id).await;
                match self.create_slot(index).await {
                    Ok(fresh) => self.enqueue(fresh).await,
                    Err(e) => tracing::error!(slot = index, "failed to recreate slot: {e}"),
                }
            }
        }
    }

    async fn enqueue(&self, slot: Slot) {
        if self.sender.send(slot).await.is_ok() {
            self.available.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Rebuild the pool from scratch: purge stale containers, recreate `N`
    /// fresh ones, and push them all into the queue.
    pub async fn reset_all(&self) -> AppResult<()> {
        // Drain whatever is currently queued so we don't leak containers.
        {
            let mut receiver = self.receiver.lock().await;
            while let Ok(slot) = receiver.try_recv() {
                let _ = self.runtime.remove(&slot.container_id).await;
            }
        }
        self.available.store(0, Ordering::Relaxed);

        std::fs::create_dir_all(&self.containers_env_root).map_err(AppError::from)?;
        std::fs::create_dir_all(&self.libs_root).map_err(AppError::from)?;
        tracing::info!(image = %self.image, count = self.size, "(re)initialising sandbox pool");

        for index in 0..self.size {
            let slot = self.create_slot(index).await?;
            self.enqueue(slot).await;
        }

        Ok(())
    }

    /// Best-effort removal of every pooled container, called once on
    /// process shutdown. In-flight requests holding a slot are abandoned.
    pub async fn shutdown(&self) {
        let mut receiver = self.receiver.lock().await;
        while let Ok(slot) = receiver.try_recv() {
            if let Err(e) = self.runtime.remove(&slot.container_id).await {
                tracing::warn!(slot = slot.index, "failed to remove container on shutdown: {e}");
            }
        }
        self.available.store(0, Ordering::Relaxed);
    }
}

fn clear_dir(path: &PathBuf) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)
}
