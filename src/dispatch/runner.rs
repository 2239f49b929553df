//! Campaign watch loop.
//!
//! Polls the store for active campaigns and runs them one after another.
//! Sleeps `idle_sleep` when there is nothing to do, `cycle_sleep` after a
//! productive cycle and `error_sleep` when the store could not be read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::dispatch::budget::{RunBudget, shutdown_requested};
use crate::dispatch::controller::DispatchController;
use crate::error::DatabaseError;
use crate::pipeline::types::RunSummary;
use crate::store::Database;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub idle_sleep: Duration,
    pub cycle_sleep: Duration,
    pub error_sleep: Duration,
    /// Wall-clock budget per campaign run.
    pub run_budget: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_secs(300),
            cycle_sleep: Duration::from_secs(600),
            error_sleep: Duration::from_secs(120),
            run_budget: Duration::from_secs(3600),
        }
    }
}

pub struct CampaignRunner {
    controller: Arc<DispatchController>,
    store: Arc<dyn Database>,
    config: RunnerConfig,
}

impl CampaignRunner {
    pub fn new(controller: Arc<DispatchController>, store: Arc<dyn Database>, config: RunnerConfig) -> Self {
        Self {
            controller,
            store,
            config,
        }
    }

    /// Run every active campaign once, in order. Stops early on shutdown.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> Result<Vec<RunSummary>, DatabaseError> {
        let campaigns = self.store.list_active_campaigns().await?;
        info!(count = campaigns.len(), "Active campaigns loaded");

        let mut summaries = Vec::with_capacity(campaigns.len());
        for campaign in campaigns {
            if *shutdown.borrow() {
                break;
            }
            info!(campaign = %campaign.id, name = %campaign.name, "Starting campaign run");
            let budget = RunBudget::new(shutdown.clone()).with_time_limit(self.config.run_budget);
            summaries.push(self.controller.run_campaign(&campaign, &budget).await);
        }
        Ok(summaries)
    }

    /// Loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Campaign runner started");
        loop {
            let pause = match self.run_cycle(&shutdown).await {
                Ok(summaries) if summaries.is_empty() => self.config.idle_sleep,
                Ok(_) => self.config.cycle_sleep,
                Err(e) => {
                    error!(error = %e, "Failed to load campaigns");
                    self.config.error_sleep
                }
            };

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }
        info!("Campaign runner stopped");
    }
}

/// Spawn the watch loop as a background task.
pub fn spawn_runner(runner: Arc<CampaignRunner>, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { runner.run(shutdown).await })
}
