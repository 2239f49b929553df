//! `Database` trait: campaign source and lead sink behind one async interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::channels::Channel;
use crate::error::DatabaseError;
use crate::pipeline::types::{Campaign, Lead};

/// One send attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub lead_url: String,
    pub channel: Channel,
    pub success: bool,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl DispatchRecord {
    pub fn success(lead_url: impl Into<String>, channel: Channel) -> Self {
        Self {
            lead_url: lead_url.into(),
            channel,
            success: true,
            error: None,
            attempted_at: Utc::now(),
        }
    }

    pub fn failure(lead_url: impl Into<String>, channel: Channel, error: impl Into<String>) -> Self {
        Self {
            lead_url: lead_url.into(),
            channel,
            success: false,
            error: Some(error.into()),
            attempted_at: Utc::now(),
        }
    }
}

/// Backend-agnostic persistence for campaigns, leads and the dispatch log.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Campaigns ───────────────────────────────────────────────────

    /// Insert a campaign or replace the stored one with the same id.
    async fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), DatabaseError>;

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, DatabaseError>;

    /// Active campaigns, oldest first.
    async fn list_active_campaigns(&self) -> Result<Vec<Campaign>, DatabaseError>;

    /// Returns `false` if no campaign has that id.
    async fn set_campaign_active(&self, id: &str, active: bool) -> Result<bool, DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert or update a lead keyed by `source_url`. Idempotent.
    async fn upsert_lead(&self, lead: &Lead) -> Result<(), DatabaseError>;

    async fn get_lead(&self, source_url: &str) -> Result<Option<Lead>, DatabaseError>;

    /// All leads of a campaign, oldest first.
    async fn leads_for_campaign(&self, campaign_id: &str) -> Result<Vec<Lead>, DatabaseError>;

    // ── Dispatch log ────────────────────────────────────────────────

    async fn log_dispatch(&self, record: &DispatchRecord) -> Result<(), DatabaseError>;

    /// Attempts for one lead, in order.
    async fn dispatch_log_for_lead(&self, lead_url: &str) -> Result<Vec<DispatchRecord>, DatabaseError>;
}
