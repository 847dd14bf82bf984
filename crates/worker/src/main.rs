use std::sync::Arc;
use std::thread;

use anyhow::Context;

use stocksync_feed::DropboxClient;
use stocksync_infra::jobs::{InMemoryJobStore, JobExecutor, JobExecutorConfig, JobKind};
use stocksync_infra::redis_store::RedisConnector;
use stocksync_worker::{SyncConfig, SyncPipeline, SyncServices, TenantDirectory};

fn main() -> anyhow::Result<()> {
    stocksync_observability::init();

    let config = SyncConfig::from_env().context("invalid configuration")?;
    tracing::info!(config = ?config, "starting stocksync worker");

    let tenants = TenantDirectory::load(&config.tenants_file)?;
    tracing::info!(tenants = tenants.len(), "tenant directory loaded");

    let redis = RedisConnector::open(&config.redis_url).context("cannot open redis")?;
    let files = DropboxClient::new(config.dropbox_token.clone()).context("cannot build dropbox client")?;
    let services = SyncServices {
        files: Arc::new(files),
        cursors: Arc::new(redis.cursor_store()),
        cache: Arc::new(redis.inventory_cache()),
        sku_map: Arc::new(redis.sku_map_store()),
        locks: Arc::new(redis.lock_store()),
    };
    let pipeline = Arc::new(SyncPipeline::new(services, tenants, config.pipeline_settings())?);

    if pipeline.prime().context("cannot prime change cursor")? {
        tracing::info!("first run: existing exports are treated as already seen");
    }

    let jobs = InMemoryJobStore::arc();
    let mut executor = JobExecutor::new(jobs.clone(), config.job_timeout);
    let handler = pipeline.clone();
    executor.register_handler(JobKind::INVENTORY_SYNC, move |job| handler.handle(job));

    if config.run_once {
        let summary = pipeline.discover(jobs.as_ref())?;
        let processed = executor.run_until_idle(config.poll_interval.min(config.retry_delay))?;
        tracing::info!(jobs_enqueued = summary.jobs_enqueued, processed, "run-once complete");
        if config.reset_cursor_on_exit {
            pipeline.reset_cursor().context("cannot delete change cursor")?;
        }
        return Ok(());
    }

    let _executor = executor.spawn(
        JobExecutorConfig::default()
            .with_name("stocksync")
            .with_workers(config.workers),
    )?;

    loop {
        if let Err(e) = pipeline.discover(jobs.as_ref()) {
            tracing::warn!(error = %e, "discovery failed, retrying next poll");
        }
        thread::sleep(config.poll_interval);
    }
}
