//! Intent gate: every send candidate passes through here.
//!
//! The oracle's verdict is trusted only if it arrives and is well-formed.
//! Anything else is a score of 0, i.e. rejected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchMetrics;
use crate::error::{LlmError, PipelineError};
use crate::pipeline::types::{Campaign, Lead, LeadStatus, ScoredResult};

/// Raw oracle output, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub score: i64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub draft_message: String,
}

/// External scoring capability.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn score(&self, text: &str, usp: &str, product_link: &str) -> Result<OracleVerdict, LlmError>;
}

pub struct IntentGate {
    oracle: Arc<dyn ScoringOracle>,
    timeout: Duration,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl IntentGate {
    pub fn new(oracle: Arc<dyn ScoringOracle>) -> Self {
        Self {
            oracle,
            timeout: Duration::from_secs(60),
            metrics: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Score a lead against a campaign. Never errors: failures become a
    /// rejected verdict.
    pub async fn score(&self, lead: &Lead, campaign: &Campaign) -> ScoredResult {
        let text = lead.text();
        let call = self
            .oracle
            .score(&text, &campaign.usp, &campaign.product_link);

        let verdict = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return self.fail_closed(lead, format!("oracle error: {e}")),
            Err(_) => {
                return self.fail_closed(
                    lead,
                    format!("oracle timed out after {}s", self.timeout.as_secs()),
                );
            }
        };

        let Ok(score) = u8::try_from(verdict.score) else {
            return self.fail_closed(lead, format!("score out of range: {}", verdict.score));
        };
        if score > 100 {
            return self.fail_closed(lead, format!("score out of range: {score}"));
        }

        let accepted = campaign.accepts(score);
        tracing::debug!(
            url = %lead.source_url,
            score,
            threshold = campaign.min_intent_score,
            accepted,
            "Lead scored"
        );
        ScoredResult {
            score,
            rationale: verdict.rationale,
            draft_message: verdict.draft_message,
            accepted,
        }
    }

    fn fail_closed(&self, lead: &Lead, reason: String) -> ScoredResult {
        tracing::warn!(url = %lead.source_url, reason = %reason, "Scoring failed; rejecting lead");
        if let Some(ref m) = self.metrics {
            m.record_oracle_failure();
        }
        ScoredResult::rejected(reason)
    }

    /// Score `lead` and move it through `scored` to `accepted` or
    /// `rejected`, copying the verdict onto it.
    pub async fn evaluate(&self, lead: &mut Lead, campaign: &Campaign) -> Result<ScoredResult, PipelineError> {
        let result = self.score(lead, campaign).await;

        lead.transition_to(LeadStatus::Scored)?;
        lead.intent_score = Some(result.score);
        lead.rationale = Some(result.rationale.clone()).filter(|r| !r.is_empty());
        lead.draft_message = Some(result.draft_message.clone()).filter(|d| !d.trim().is_empty());
        lead.transition_to(if result.accepted {
            LeadStatus::Accepted
        } else {
            LeadStatus::Rejected
        })?;

        if let Some(ref m) = self.metrics {
            if result.accepted {
                m.record_accepted();
            } else {
                m.record_rejected();
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Channel;

    enum Script {
        Score(i64),
        Fail,
        Hang,
    }

    struct FakeOracle(Script);

    #[async_trait]
    impl ScoringOracle for FakeOracle {
        async fn score(&self, _text: &str, _usp: &str, _link: &str) -> Result<OracleVerdict, LlmError> {
            match self.0 {
                Script::Score(score) => Ok(OracleVerdict {
                    score,
                    rationale: "asked for a CRM".into(),
                    draft_message: "Hi!".into(),
                }),
                Script::Fail => Err(LlmError::RequestFailed {
                    provider: "fake".into(),
                    reason: "boom".into(),
                }),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    fn gate(script: Script) -> IntentGate {
        IntentGate::new(Arc::new(FakeOracle(script)))
    }

    fn lead() -> Lead {
        Lead::new("c1", "https://reddit.com/r/x/1", "Need CRM", "", Channel::Reddit)
    }

    fn campaign() -> Campaign {
        Campaign::new("c1", "Acme")
    }

    #[tokio::test]
    async fn threshold_is_hard() {
        let r = gate(Script::Score(74)).score(&lead(), &campaign()).await;
        assert_eq!(r.score, 74);
        assert!(!r.accepted);

        let r = gate(Script::Score(75)).score(&lead(), &campaign()).await;
        assert!(r.accepted);
        assert_eq!(r.draft_message, "Hi!");
    }

    #[tokio::test]
    async fn oracle_error_fails_closed() {
        let r = gate(Script::Fail).score(&lead(), &campaign()).await;
        assert_eq!(r.score, 0);
        assert!(!r.accepted);
        assert!(r.rationale.contains("boom"));
    }

    #[tokio::test]
    async fn out_of_range_scores_fail_closed() {
        for bad in [-1, 101, 1_000] {
            let r = gate(Script::Score(bad)).score(&lead(), &campaign()).await;
            assert!(!r.accepted, "score {bad} must not be accepted");
            assert_eq!(r.score, 0);
        }
    }

    #[tokio::test]
    async fn zero_threshold_still_rejects_failures() {
        let mut c = campaign();
        c.min_intent_score = 0;
        // A failed oracle scores 0, which would pass a 0 threshold; the
        // verdict itself must still say rejected.
        let r = gate(Script::Fail).score(&lead(), &c).await;
        assert!(!r.accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_oracle_times_out_closed() {
        let g = gate(Script::Hang).with_timeout(Duration::from_secs(5));
        let r = g.score(&lead(), &campaign()).await;
        assert!(!r.accepted);
        assert!(r.rationale.contains("timed out"));
    }

    #[tokio::test]
    async fn evaluate_moves_lead_through_states() {
        let metrics = Arc::new(DispatchMetrics::new());
        let g = gate(Script::Score(90)).with_metrics(Arc::clone(&metrics));
        let mut l = lead();
        g.evaluate(&mut l, &campaign()).await.unwrap();
        assert_eq!(l.status, LeadStatus::Accepted);
        assert_eq!(l.intent_score, Some(90));
        assert_eq!(l.draft_message.as_deref(), Some("Hi!"));
        assert_eq!(metrics.snapshot().accepted, 1);

        let g = gate(Script::Fail).with_metrics(Arc::clone(&metrics));
        let mut l = lead();
        g.evaluate(&mut l, &campaign()).await.unwrap();
        assert_eq!(l.status, LeadStatus::Rejected);
        assert_eq!(l.intent_score, Some(0));
        assert_eq!(metrics.snapshot().oracle_failures, 1);
    }

    #[tokio::test]
    async fn evaluate_refuses_already_scored_lead() {
        let g = gate(Script::Score(90));
        let mut l = lead();
        l.status = LeadStatus::Dispatched;
        assert!(g.evaluate(&mut l, &campaign()).await.is_err());
    }
}
