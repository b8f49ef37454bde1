//! Background scheduler (component H)
//!
//! Two coalesced cron jobs: expire stale environments, and keep the
//! external-libraries directory in sync. Grounded in
//! `crates/horus/src/scheduler.rs`'s `Job::new_async` pattern, adapted from
//! a database-backed cleanup runner to the store/libraries of this service.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::{Config, ExternalLibrariesConfig};
use crate::libraries;
use crate::store::EnvironmentStore;

pub struct BackgroundScheduler {
    scheduler: JobScheduler,
}

impl BackgroundScheduler {
    pub async fn new(
        config: &Config,
        store: Arc<EnvironmentStore>,
    ) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;

        let expire_cron = config.scheduler.expire_environments_cron.clone();
        let expire_store = store.clone();
        tracing::info!(cron = %expire_cron, "scheduling environment expiration job");
        let expire_job = Job::new_async(expire_cron.as_str(), move |_uuid, _lock| {
            let store = expire_store.clone();
            Box::pin(async move {
                match store.expire() {
                    Ok(removed) => tracing::info!(removed, "environment expiration swept"),
                    Err(e) => tracing::error!("environment expiration failed: {e}"),
                }
            })
        })?;
        scheduler.add(expire_job).await?;

        let refresh_cron = config.scheduler.refresh_libraries_cron.clone();
        let libraries_config = config.external_libraries.clone();
        tracing::info!(cron = %refresh_cron, "scheduling external library refresh job");
        let refresh_job = Job::new_async(refresh_cron.as_str(), move |_uuid, _lock| {
            let libraries_config = libraries_config.clone();
            Box::pin(async move { run_refresh(&libraries_config).await })
        })?;
        scheduler.add(refresh_job).await?;

        Ok(Self { scheduler })
    }

    /// Refresh the libraries directory once, synchronously, before serving
    /// any requests, then start the cron jobs.
    pub async fn start(&self, config: &Config) -> anyhow::Result<()> {
        run_refresh(&config.external_libraries).await;
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.scheduler.shutdown().await?;
        Ok(())
    }
}

async fn run_refresh(config: &ExternalLibrariesConfig) {
    tracing::info!("refreshing external libraries");
    if let Err(e) = libraries::refresh_all(config).await {
        tracing::error!("external library refresh failed: {e}");
    }
}
