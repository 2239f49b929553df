//! Dispatch controller: one campaign run from discovery to delivery.
//!
//! discover → (skip terminal) → gate → select channel → pace → send,
//! rotating to the next scheduled channel on failure. Every state change
//! is written to the lead sink before moving on.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::channels::{Channel, CapabilityTable};
use crate::dispatch::budget::RunBudget;
use crate::dispatch::metrics::DispatchMetrics;
use crate::error::ChannelError;
use crate::pipeline::compose::compose;
use crate::pipeline::contact::{reachable_channels, target_for};
use crate::pipeline::discovery::LeadPipeline;
use crate::pipeline::gate::IntentGate;
use crate::pipeline::types::{Campaign, Lead, LeadStatus, RunSummary};
use crate::quota::{ChannelSelection, RateLimiter};
use crate::store::{Database, DispatchRecord};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Send attempts per lead before it is marked failed.
    pub max_attempts: u32,
    /// Leads processed concurrently.
    pub max_in_flight: usize,
    /// Upper bound on a single send.
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// How processing of a single lead ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeadOutcome {
    /// Not started: terminal in the store, or the run was cancelled.
    Skipped,
    Rejected,
    Dispatched,
    Failed,
    /// Accepted, then cut off by cancellation. Stays `accepted` in the
    /// store and is resumed by a later run.
    Interrupted,
}

pub struct DispatchController {
    capabilities: Arc<CapabilityTable>,
    limiter: Arc<RateLimiter>,
    pipeline: LeadPipeline,
    gate: IntentGate,
    store: Arc<dyn Database>,
    metrics: Arc<DispatchMetrics>,
    config: DispatchConfig,
}

impl DispatchController {
    pub fn new(
        capabilities: Arc<CapabilityTable>,
        limiter: Arc<RateLimiter>,
        pipeline: LeadPipeline,
        gate: IntentGate,
        store: Arc<dyn Database>,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            capabilities,
            limiter,
            pipeline,
            gate,
            store,
            metrics,
            config: DispatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Execute one campaign cycle. Per-lead and per-channel errors are
    /// contained; the run always ends with a summary.
    pub async fn run_campaign(&self, campaign: &Campaign, budget: &RunBudget) -> RunSummary {
        let span = info_span!("campaign_run", campaign = %campaign.id, run_id = %Uuid::new_v4());
        self.run_campaign_inner(campaign, budget).instrument(span).await
    }

    async fn run_campaign_inner(&self, campaign: &Campaign, budget: &RunBudget) -> RunSummary {
        let mut summary = RunSummary {
            campaign_id: campaign.id.clone(),
            ..RunSummary::default()
        };

        if budget.is_cancelled() {
            info!(campaign = %campaign.id, "Run budget exhausted before discovery");
            return summary;
        }

        let leads = tokio::select! {
            leads = self.pipeline.discover(campaign) => leads,
            _ = budget.cancelled() => {
                info!(campaign = %campaign.id, "Discovery cancelled");
                return summary;
            }
        };
        summary.discovered = leads.len();
        self.metrics.record_discovered(leads.len());

        let outcomes: Vec<(bool, LeadOutcome)> = stream::iter(
            leads
                .into_iter()
                .map(|lead| self.process_lead(lead, campaign, budget)),
        )
        .buffer_unordered(self.config.max_in_flight.max(1))
        .collect()
        .await;

        for (accepted, outcome) in outcomes {
            if accepted {
                summary.accepted += 1;
            }
            match outcome {
                LeadOutcome::Skipped => summary.skipped += 1,
                LeadOutcome::Rejected => summary.rejected += 1,
                LeadOutcome::Dispatched => summary.dispatched += 1,
                LeadOutcome::Failed => summary.failed += 1,
                LeadOutcome::Interrupted => {}
            }
        }

        info!(campaign = %campaign.id, %summary, "Campaign run complete");
        self.metrics.log_status();
        summary
    }

    /// Drive one discovered lead to a terminal state (or as far as the
    /// budget allows). Returns whether it was accepted in this run.
    async fn process_lead(&self, fresh: Lead, campaign: &Campaign, budget: &RunBudget) -> (bool, LeadOutcome) {
        let stored = match self.store.get_lead(&fresh.source_url).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(url = %fresh.source_url, error = %e, "Lead lookup failed; skipping");
                return (false, LeadOutcome::Skipped);
            }
        };

        let mut lead = match stored {
            Some(existing) if existing.status.is_terminal() => {
                debug!(url = %existing.source_url, status = %existing.status, "Lead already terminal");
                return (false, LeadOutcome::Skipped);
            }
            // Accepted by an interrupted run of this campaign: resume at dispatch.
            Some(existing)
                if existing.status == LeadStatus::Accepted && existing.campaign_id == campaign.id =>
            {
                existing
            }
            _ => fresh,
        };

        if budget.is_cancelled() {
            return (false, LeadOutcome::Skipped);
        }

        if lead.status != LeadStatus::Accepted {
            self.persist(&lead).await;
            match self.gate.evaluate(&mut lead, campaign).await {
                Ok(_) => self.persist(&lead).await,
                Err(e) => {
                    warn!(url = %lead.source_url, error = %e, "Lead could not be scored");
                    return (false, LeadOutcome::Skipped);
                }
            }
            if lead.status == LeadStatus::Rejected {
                return (false, LeadOutcome::Rejected);
            }
        }

        (true, self.dispatch_lead(lead, campaign, budget).await)
    }

    /// Send loop for an accepted lead.
    async fn dispatch_lead(&self, mut lead: Lead, campaign: &Campaign, budget: &RunBudget) -> LeadOutcome {
        let scheduled = self.limiter.channels().await;
        let reachable = reachable_channels(&lead, &scheduled);
        if reachable.is_empty() {
            return self.fail(lead, "no reachable channel for this lead").await;
        }

        while lead.attempts < self.config.max_attempts {
            if budget.is_cancelled() {
                return LeadOutcome::Interrupted;
            }

            let channel = match self.limiter.next_available_among(Some(&reachable)).await {
                ChannelSelection::Available(channel) => channel,
                ChannelSelection::Unavailable { wait } => {
                    self.metrics.record_quota_wait();
                    info!(
                        url = %lead.source_url,
                        wait_secs = wait.as_secs(),
                        "All reachable channels exhausted; waiting"
                    );
                    if !budget.sleep(wait).await {
                        return LeadOutcome::Interrupted;
                    }
                    continue;
                }
                ChannelSelection::Unreachable => {
                    return self.fail(lead, "no scheduled channel can reach this lead").await;
                }
            };

            let delay = self.limiter.delay_for(channel).await;
            if !budget.sleep(delay).await {
                self.limiter.release(channel).await;
                return LeadOutcome::Interrupted;
            }

            match self.send_on(&lead, campaign, channel).await {
                Ok(()) => {
                    self.limiter.record_send(channel).await;
                    self.metrics.record_sent(channel);
                    self.log_attempt(DispatchRecord::success(&lead.source_url, channel)).await;

                    lead.dispatched_via = Some(channel);
                    lead.last_error = None;
                    if let Err(e) = lead.transition_to(LeadStatus::Dispatched) {
                        warn!(url = %lead.source_url, error = %e, "Unexpected lead state after send");
                    }
                    self.persist(&lead).await;
                    info!(url = %lead.source_url, channel = %channel, "Outreach dispatched");
                    return LeadOutcome::Dispatched;
                }
                Err(e) => {
                    self.limiter.release(channel).await;
                    lead.attempts += 1;
                    let rotating = lead.attempts < self.config.max_attempts;
                    self.metrics.record_send_failure(channel, rotating);
                    self.log_attempt(DispatchRecord::failure(&lead.source_url, channel, e.to_string()))
                        .await;

                    warn!(
                        url = %lead.source_url,
                        channel = %channel,
                        attempt = lead.attempts,
                        error = %e,
                        "Send failed"
                    );
                    lead.last_error = Some(e.to_string());
                    self.persist(&lead).await;
                }
            }
        }

        let reason = lead
            .last_error
            .clone()
            .unwrap_or_else(|| "send attempts exhausted".to_string());
        self.fail(lead, &reason).await
    }

    async fn send_on(&self, lead: &Lead, campaign: &Campaign, channel: Channel) -> Result<(), ChannelError> {
        let sender = self
            .capabilities
            .sender(channel)
            .ok_or_else(|| ChannelError::SendFailed {
                name: channel.to_string(),
                reason: "no sender registered".to_string(),
            })?;
        let target = target_for(lead, channel).ok_or_else(|| ChannelError::NoTarget {
            name: channel.to_string(),
        })?;
        let message = compose(lead, campaign, channel);

        debug!(url = %lead.source_url, channel = %channel, sender = sender.name(), "Sending");
        match tokio::time::timeout(self.config.send_timeout, sender.send(&target, &message)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                name: channel.to_string(),
                timeout: self.config.send_timeout,
            }),
        }
    }

    async fn fail(&self, mut lead: Lead, reason: &str) -> LeadOutcome {
        warn!(url = %lead.source_url, reason, "Lead failed");
        lead.last_error = Some(reason.to_string());
        if let Err(e) = lead.transition_to(LeadStatus::Failed) {
            warn!(url = %lead.source_url, error = %e, "Unexpected lead state on failure");
        }
        self.metrics.record_lead_failed();
        self.persist(&lead).await;
        LeadOutcome::Failed
    }

    async fn persist(&self, lead: &Lead) {
        if let Err(e) = self.store.upsert_lead(lead).await {
            warn!(url = %lead.source_url, status = %lead.status, error = %e, "Failed to persist lead");
        }
    }

    async fn log_attempt(&self, record: DispatchRecord) {
        if let Err(e) = self.store.log_dispatch(&record).await {
            warn!(url = %record.lead_url, error = %e, "Failed to write dispatch log");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::{ChannelLimits, OutreachMessage, OutreachSender};
    use crate::error::{LlmError, SearchError};
    use crate::pipeline::gate::{OracleVerdict, ScoringOracle};
    use crate::pipeline::search::WebSearcher;
    use crate::pipeline::types::SearchHit;
    use crate::quota::{LimiterConfig, PacerConfig};
    use crate::store::LibSqlBackend;

    struct StaticSearcher(Vec<SearchHit>);

    #[async_trait]
    impl WebSearcher for StaticSearcher {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    /// Scores by the first number-like word in the title, else 0.
    struct TitleOracle;

    #[async_trait]
    impl ScoringOracle for TitleOracle {
        async fn score(&self, text: &str, _usp: &str, _link: &str) -> Result<OracleVerdict, LlmError> {
            let score = text
                .split_whitespace()
                .find_map(|w| w.parse::<i64>().ok())
                .unwrap_or(0);
            Ok(OracleVerdict {
                score,
                rationale: "test".into(),
                draft_message: "Hello there".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OutreachSender for RecordingSender {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, target: &str, _message: &OutreachMessage) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::SendFailed {
                    name: "recording".into(),
                    reason: "boom".into(),
                });
            }
            self.sent.lock().unwrap().push(target.to_string());
            Ok(())
        }
    }

    fn hit(url: &str, title: &str) -> SearchHit {
        SearchHit {
            url: url.into(),
            title: title.into(),
            snippet: String::new(),
        }
    }

    fn campaign() -> Campaign {
        let mut c = Campaign::new("c1", "Acme");
        c.keywords = vec!["crm".into()];
        c.channels = vec![Channel::Generic];
        c
    }

    async fn controller(
        hits: Vec<SearchHit>,
        senders: HashMap<Channel, Arc<RecordingSender>>,
    ) -> (DispatchController, Arc<LibSqlBackend>) {
        let mut table = CapabilityTable::new();
        for (channel, sender) in senders {
            table.register(channel, ChannelLimits::new(100, 1000), sender);
        }
        let limiter = RateLimiter::new(
            &table.limits(),
            LimiterConfig {
                pacer: PacerConfig::default().scaled(0.0),
                ..LimiterConfig::default()
            },
        );
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let metrics = Arc::new(DispatchMetrics::new());
        let controller = DispatchController::new(
            Arc::new(table),
            Arc::new(limiter),
            LeadPipeline::new(Arc::new(StaticSearcher(hits))),
            IntentGate::new(Arc::new(TitleOracle)),
            store.clone(),
            metrics,
        );
        (controller, store)
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_leads_are_dispatched_and_rejected_are_not() {
        let generic = Arc::new(RecordingSender::default());
        let (ctl, store) = controller(
            vec![
                hit("https://blog.example/a", "score 90 need crm"),
                hit("https://blog.example/b", "score 10 just chatting"),
            ],
            HashMap::from([(Channel::Generic, generic.clone())]),
        )
        .await;

        let summary = ctl.run_campaign(&campaign(), &RunBudget::unbounded()).await;
        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(
            *generic.sent.lock().unwrap(),
            vec!["https://blog.example/a".to_string()]
        );

        let a = store.get_lead("https://blog.example/a").await.unwrap().unwrap();
        assert_eq!(a.status, LeadStatus::Dispatched);
        assert_eq!(a.dispatched_via, Some(Channel::Generic));
        let b = store.get_lead("https://blog.example/b").await.unwrap().unwrap();
        assert_eq!(b.status, LeadStatus::Rejected);
        assert_eq!(ctl.metrics().snapshot().total_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_skips_terminal_leads() {
        let generic = Arc::new(RecordingSender::default());
        let (ctl, _store) = controller(
            vec![hit("https://blog.example/a", "score 90")],
            HashMap::from([(Channel::Generic, generic.clone())]),
        )
        .await;

        ctl.run_campaign(&campaign(), &RunBudget::unbounded()).await;
        let again = ctl.run_campaign(&campaign(), &RunBudget::unbounded()).await;
        assert_eq!(again.skipped, 1);
        assert_eq!(again.dispatched, 0);
        assert_eq!(generic.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sender_exhausts_attempts() {
        let broken = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let (ctl, store) = controller(
            vec![hit("https://blog.example/a", "score 95")],
            HashMap::from([(Channel::Generic, broken)]),
        )
        .await;

        let summary = ctl.run_campaign(&campaign(), &RunBudget::unbounded()).await;
        assert_eq!(summary.failed, 1);

        let lead = store.get_lead("https://blog.example/a").await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Failed);
        assert_eq!(lead.attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(lead.last_error.unwrap().contains("boom"));

        let log = store.dispatch_log_for_lead("https://blog.example/a").await.unwrap();
        assert_eq!(log.len(), DEFAULT_MAX_ATTEMPTS as usize);
        let m = ctl.metrics().snapshot();
        assert_eq!(m.total_failed, 1);
        assert_eq!(m.rotation_events, u64::from(DEFAULT_MAX_ATTEMPTS - 1));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_lead_fails_without_sending() {
        // Only email is configured, and the lead text carries no address.
        let email = Arc::new(RecordingSender::default());
        let (ctl, store) = controller(
            vec![hit("https://blog.example/a", "score 95")],
            HashMap::from([(Channel::Email, email.clone())]),
        )
        .await;

        let summary = ctl.run_campaign(&campaign(), &RunBudget::unbounded()).await;
        assert_eq!(summary.failed, 1);
        assert!(email.sent.lock().unwrap().is_empty());
        let lead = store.get_lead("https://blog.example/a").await.unwrap().unwrap();
        assert!(lead.last_error.unwrap().contains("no reachable channel"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_budget_starts_nothing() {
        let generic = Arc::new(RecordingSender::default());
        let (ctl, _store) = controller(
            vec![hit("https://blog.example/a", "score 95")],
            HashMap::from([(Channel::Generic, generic.clone())]),
        )
        .await;

        let (tx, rx) = tokio::sync::watch::channel(true);
        let summary = ctl.run_campaign(&campaign(), &RunBudget::new(rx)).await;
        drop(tx);
        assert_eq!(summary.discovered, 0);
        assert!(generic.sent.lock().unwrap().is_empty());
    }
}
