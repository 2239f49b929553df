//! Shared types for the lead pipeline.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels::Channel;
use crate::error::PipelineError;

/// Default acceptance threshold for new campaigns.
pub const DEFAULT_MIN_INTENT_SCORE: u8 = 75;

/// Default per-campaign lead quota.
pub const DEFAULT_MAX_LEADS: usize = 20;

// ── Lead status ─────────────────────────────────────────────────────

/// Lifecycle of a lead within a campaign run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Found by search, not yet scored.
    Discovered,
    /// Oracle has returned a score.
    Scored,
    /// Score met the campaign threshold; eligible for dispatch.
    Accepted,
    /// Score below threshold (or oracle failure).
    Rejected,
    /// Outreach delivered on some channel.
    Dispatched,
    /// Every dispatch attempt failed.
    Failed,
}

impl LeadStatus {
    /// Check if this status allows transitioning to another.
    pub fn can_transition_to(&self, target: LeadStatus) -> bool {
        use LeadStatus::*;

        matches!(
            (self, target),
            (Discovered, Scored) |
            (Scored, Accepted) | (Scored, Rejected) |
            (Accepted, Dispatched) | (Accepted, Failed)
        )
    }

    /// Terminal leads are never reprocessed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dispatched | Self::Failed | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Scored => "scored",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Dispatched => "dispatched",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "scored" => Ok(Self::Scored),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "dispatched" => Ok(Self::Dispatched),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown lead status: {other}")),
        }
    }
}

// ── Lead ────────────────────────────────────────────────────────────

/// A discovered candidate contact, keyed by canonical source URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Canonical URL; unique key in the lead sink.
    pub source_url: String,
    pub campaign_id: String,
    pub title: String,
    pub snippet: String,
    /// Channel inferred from the URL's host.
    pub detected_channel: Channel,
    /// 0–100, set once scored.
    pub intent_score: Option<u8>,
    pub rationale: Option<String>,
    /// Outreach text drafted by the oracle.
    pub draft_message: Option<String>,
    /// Email address or platform handle, if one could be derived.
    pub contact_target: Option<String>,
    pub status: LeadStatus,
    /// Failed send attempts so far.
    pub attempts: u32,
    pub dispatched_via: Option<Channel>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(
        campaign_id: impl Into<String>,
        source_url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        detected_channel: Channel,
    ) -> Self {
        let now = Utc::now();
        Self {
            source_url: source_url.into(),
            campaign_id: campaign_id.into(),
            title: title.into(),
            snippet: snippet.into(),
            detected_channel,
            intent_score: None,
            rationale: None,
            draft_message: None,
            contact_target: None,
            status: LeadStatus::Discovered,
            attempts: 0,
            dispatched_via: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, rejecting moves the state machine forbids.
    pub fn transition_to(&mut self, status: LeadStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(status) {
            return Err(PipelineError::InvalidTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Text handed to the scoring oracle.
    pub fn text(&self) -> String {
        if self.snippet.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.snippet)
        }
    }
}

// ── Campaign ────────────────────────────────────────────────────────

/// An outreach campaign. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    /// Channels searched for leads.
    pub channels: Vec<Channel>,
    /// Cap on leads per discovery cycle.
    pub max_leads: usize,
    /// Acceptance threshold; leads scoring below are rejected.
    pub min_intent_score: u8,
    /// Unique selling proposition given to the oracle and templates.
    pub usp: String,
    pub product_link: String,
    pub product_name: String,
    pub signature: Option<String>,
    /// Appended to search queries when set (e.g. "Berlin").
    pub region: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// A campaign with default threshold and lead quota.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            product_name: name.clone(),
            name,
            keywords: Vec::new(),
            channels: Vec::new(),
            max_leads: DEFAULT_MAX_LEADS,
            min_intent_score: DEFAULT_MIN_INTENT_SCORE,
            usp: String::new(),
            product_link: String::new(),
            signature: None,
            region: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Search query for one channel: keywords, region, then the channel's
    /// qualifier.
    pub fn query_for(&self, channel: Channel) -> String {
        let mut parts: Vec<&str> = self
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        if let Some(region) = self.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            parts.push(region);
        }
        parts.push(channel.search_qualifier());
        parts.join(" ")
    }

    /// Score decision for this campaign's threshold.
    pub fn accepts(&self, score: u8) -> bool {
        score >= self.min_intent_score
    }
}

// ── Search / scoring ────────────────────────────────────────────────

/// One raw search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Oracle verdict for a lead, already thresholded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub score: u8,
    pub rationale: String,
    pub draft_message: String,
    pub accepted: bool,
}

impl ScoredResult {
    /// Fail-closed verdict used whenever the oracle cannot be trusted.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            score: 0,
            rationale: reason.into(),
            draft_message: String::new(),
            accepted: false,
        }
    }
}

// ── Run summary ─────────────────────────────────────────────────────

/// Per-campaign outcome of one execution cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub campaign_id: String,
    pub discovered: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub dispatched: usize,
    pub failed: usize,
    /// Leads not started: already terminal in the store, or cut off by
    /// cancellation.
    pub skipped: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "discovered={} accepted={} rejected={} dispatched={} failed={} skipped={}",
            self.discovered, self.accepted, self.rejected, self.dispatched, self.failed, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> Lead {
        Lead::new(
            "c1",
            "https://reddit.com/r/saas/1",
            "Need a CRM",
            "Looking for recommendations",
            Channel::Reddit,
        )
    }

    #[test]
    fn happy_path_transitions() {
        let mut l = lead();
        l.transition_to(LeadStatus::Scored).unwrap();
        l.transition_to(LeadStatus::Accepted).unwrap();
        l.transition_to(LeadStatus::Dispatched).unwrap();
        assert!(l.status.is_terminal());
    }

    #[test]
    fn skipping_scoring_is_rejected() {
        let mut l = lead();
        let err = l.transition_to(LeadStatus::Accepted).unwrap_err();
        assert!(err.to_string().contains("discovered"));
        assert_eq!(l.status, LeadStatus::Discovered);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [LeadStatus::Rejected, LeadStatus::Dispatched, LeadStatus::Failed] {
            assert!(terminal.is_terminal());
            for target in [
                LeadStatus::Discovered,
                LeadStatus::Scored,
                LeadStatus::Accepted,
                LeadStatus::Rejected,
                LeadStatus::Dispatched,
                LeadStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
        assert!(!LeadStatus::Accepted.is_terminal());
    }

    #[test]
    fn status_round_trips_through_text() {
        for s in ["discovered", "scored", "accepted", "rejected", "dispatched", "failed"] {
            assert_eq!(s.parse::<LeadStatus>().unwrap().as_str(), s);
        }
        assert!("pending".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn threshold_is_inclusive() {
        let c = Campaign::new("c1", "Acme");
        assert_eq!(c.min_intent_score, 75);
        assert!(!c.accepts(74));
        assert!(c.accepts(75));
    }

    #[test]
    fn query_includes_keywords_region_and_qualifier() {
        let mut c = Campaign::new("c1", "Acme");
        c.keywords = vec!["crm".into(), " small business ".into(), "".into()];
        c.region = Some("Berlin".into());
        assert_eq!(
            c.query_for(Channel::Github),
            "crm small business Berlin site:github.com"
        );
    }

    #[test]
    fn lead_text_joins_title_and_snippet() {
        assert_eq!(lead().text(), "Need a CRM\n\nLooking for recommendations");
        let mut l = lead();
        l.snippet.clear();
        assert_eq!(l.text(), "Need a CRM");
    }

    #[test]
    fn rejected_result_fails_closed() {
        let r = ScoredResult::rejected("oracle timeout");
        assert_eq!(r.score, 0);
        assert!(!r.accepted);
    }
}
