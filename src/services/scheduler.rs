//! Background status sweep with its own start/stop lifecycle.
//!
//! The sweep talks to request handlers only through the database: it holds a
//! [`Store`] clone and a clock, nothing else from the request path.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::db::{Store, SweepCounts};
use crate::services::clock::Clock;
use crate::services::kv::KeyValueStore;

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

async fn sweep_job(store: &Store, clock: &dyn Clock) -> Result<SweepCounts> {
    let start = Instant::now();
    info!(event = "job_started", job_name = "status_sweep", "Starting event status sweep");

    let counts = store.event_repo().sweep(clock.now_local()).await?;

    info!(
        event = "job_finished",
        job_name = "status_sweep",
        published = counts.published,
        expired = counts.expired,
        duration_ms = elapsed_ms(start),
        "Event status sweep finished"
    );
    Ok(counts)
}

async fn purge_job(kv: &dyn KeyValueStore) {
    let start = Instant::now();
    match kv.purge_expired().await {
        Ok(purged) => info!(
            event = "job_finished",
            job_name = "purge_sessions",
            purged,
            duration_ms = elapsed_ms(start),
            "Expired session purge finished"
        ),
        Err(e) => {
            error!(event = "job_failed", job_name = "purge_sessions", error = %e, "Expired session purge failed");
        }
    }
}

pub struct Scheduler {
    store: Store,
    clock: Arc<dyn Clock>,
    kv: Arc<dyn KeyValueStore>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        store: Store,
        clock: Arc<dyn Clock>,
        kv: Arc<dyn KeyValueStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            kv,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Runs until [`Self::stop`] is called. Returns immediately when disabled.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let store = self.store.clone();
        let clock = Arc::clone(&self.clock);
        let running = Arc::clone(&self.running);
        let sweep = Job::new_async(cron_expr, move |_uuid, _lock| {
            let store = store.clone();
            let clock = Arc::clone(&clock);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                if let Err(e) = sweep_job(&store, clock.as_ref()).await {
                    error!(event = "job_failed", job_name = "status_sweep", error = %e, "Event status sweep failed");
                }
            })
        })?;

        let purge_minutes = self.config.kv_purge_interval_minutes.max(1);
        let purge_cron = if purge_minutes >= 60 {
            "0 0 * * * *".to_string()
        } else {
            format!("0 */{purge_minutes} * * * *")
        };
        let kv = Arc::clone(&self.kv);
        let purge = Job::new_async(&purge_cron, move |_uuid, _lock| {
            let kv = Arc::clone(&kv);
            Box::pin(async move {
                purge_job(kv.as_ref()).await;
            })
        })?;

        sched.add(sweep).await?;
        sched.add(purge).await?;
        sched.start().await?;

        info!("Scheduler running with cron: {}", cron_expr);
        info!("Session purge scheduled: {}", purge_cron);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let sweep_secs = self.config.sweep_interval_seconds.max(1);
        let purge_mins = self.config.kv_purge_interval_minutes.max(1);

        info!(
            "Scheduler running: sweep every {}s, session purge every {}m",
            sweep_secs, purge_mins
        );

        let mut sweep_interval = interval(Duration::from_secs(sweep_secs));
        let mut purge_interval = interval(Duration::from_secs(purge_mins * 60));
        // re-check the flag between ticks so stop() takes effect promptly
        let mut stop_check = interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                    if let Err(e) = sweep_job(&self.store, self.clock.as_ref()).await {
                        error!(event = "job_failed", job_name = "status_sweep", error = %e, "Event status sweep failed");
                    }
                }
                _ = purge_interval.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                    purge_job(self.kv.as_ref()).await;
                }
                _ = stop_check.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                }
            }
        }

        info!("Scheduler loop exited");
        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// One sweep outside the schedule, as used by `eventdesk sweep`.
    pub async fn run_once(&self) -> Result<SweepCounts> {
        info!("Running manual sweep...");
        sweep_job(&self.store, self.clock.as_ref()).await
    }
}
