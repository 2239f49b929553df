//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Channels and statuses are
//! stored as their lowercase names, list fields as JSON text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::channels::Channel;
use crate::error::DatabaseError;
use crate::pipeline::types::{Campaign, Lead, LeadStatus};
use crate::store::migrations;
use crate::store::traits::{Database, DispatchRecord};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_channel(s: &str) -> Result<Channel, DatabaseError> {
    s.parse().map_err(DatabaseError::Serialization)
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn row_err(context: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{context} row parse: {e}"))
}

/// Column order matches CAMPAIGN_COLUMNS.
fn row_to_campaign(row: &libsql::Row) -> Result<Campaign, DatabaseError> {
    let err = row_err("campaign");
    let keywords_json: String = row.get(2).map_err(&err)?;
    let channels_json: String = row.get(3).map_err(&err)?;
    let max_leads: i64 = row.get(4).map_err(&err)?;
    let min_score: i64 = row.get(5).map_err(&err)?;
    let active: i64 = row.get(11).map_err(&err)?;
    let created_str: String = row.get(12).map_err(&err)?;

    let keywords: Vec<String> = serde_json::from_str(&keywords_json)
        .map_err(|e| DatabaseError::Serialization(format!("campaign keywords: {e}")))?;
    let channels: Vec<Channel> = serde_json::from_str(&channels_json)
        .map_err(|e| DatabaseError::Serialization(format!("campaign channels: {e}")))?;

    Ok(Campaign {
        id: row.get(0).map_err(&err)?,
        name: row.get(1).map_err(&err)?,
        keywords,
        channels,
        max_leads: max_leads.max(0) as usize,
        min_intent_score: min_score.clamp(0, 100) as u8,
        usp: row.get(6).map_err(&err)?,
        product_link: row.get(7).map_err(&err)?,
        product_name: row.get(8).map_err(&err)?,
        signature: row.get(9).ok(),
        region: row.get(10).ok(),
        active: active != 0,
        created_at: parse_datetime(&created_str),
    })
}

/// Column order matches LEAD_COLUMNS.
fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let err = row_err("lead");
    let channel_str: String = row.get(4).map_err(&err)?;
    let score: Option<i64> = row.get::<i64>(5).ok();
    let status_str: String = row.get(9).map_err(&err)?;
    let attempts: i64 = row.get(10).map_err(&err)?;
    let via_str: Option<String> = row.get(11).ok();
    let created_str: String = row.get(13).map_err(&err)?;
    let updated_str: String = row.get(14).map_err(&err)?;

    Ok(Lead {
        source_url: row.get(0).map_err(&err)?,
        campaign_id: row.get(1).map_err(&err)?,
        title: row.get(2).map_err(&err)?,
        snippet: row.get(3).map_err(&err)?,
        detected_channel: parse_channel(&channel_str)?,
        intent_score: score.map(|s| s.clamp(0, 100) as u8),
        rationale: row.get(6).ok(),
        draft_message: row.get(7).ok(),
        contact_target: row.get(8).ok(),
        status: status_str
            .parse::<LeadStatus>()
            .map_err(DatabaseError::Serialization)?,
        attempts: attempts.max(0) as u32,
        dispatched_via: via_str.as_deref().map(parse_channel).transpose()?,
        last_error: row.get(12).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_dispatch(row: &libsql::Row) -> Result<DispatchRecord, DatabaseError> {
    let err = row_err("dispatch_log");
    let channel_str: String = row.get(1).map_err(&err)?;
    let success: i64 = row.get(2).map_err(&err)?;
    let attempted_str: String = row.get(4).map_err(&err)?;

    Ok(DispatchRecord {
        lead_url: row.get(0).map_err(&err)?,
        channel: parse_channel(&channel_str)?,
        success: success != 0,
        error: row.get(3).ok(),
        attempted_at: parse_datetime(&attempted_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const CAMPAIGN_COLUMNS: &str = "id, name, keywords, channels, max_leads, min_intent_score, usp, product_link, product_name, signature, region, active, created_at";

const LEAD_COLUMNS: &str = "source_url, campaign_id, title, snippet, detected_channel, intent_score, rationale, draft_message, contact_target, status, attempts, dispatched_via, last_error, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Campaigns ───────────────────────────────────────────────────

    async fn upsert_campaign(&self, campaign: &Campaign) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO campaigns ({CAMPAIGN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT (id) DO UPDATE SET
                    name = ?2, keywords = ?3, channels = ?4, max_leads = ?5,
                    min_intent_score = ?6, usp = ?7, product_link = ?8,
                    product_name = ?9, signature = ?10, region = ?11, active = ?12"
            ),
            params![
                campaign.id.as_str(),
                campaign.name.as_str(),
                to_json(&campaign.keywords)?,
                to_json(&campaign.channels)?,
                campaign.max_leads as i64,
                i64::from(campaign.min_intent_score),
                campaign.usp.as_str(),
                campaign.product_link.as_str(),
                campaign.product_name.as_str(),
                opt_text(campaign.signature.as_deref()),
                opt_text(campaign.region.as_deref()),
                i64::from(campaign.active),
                campaign.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_campaign: {e}")))?;

        debug!(campaign = %campaign.id, "Campaign saved");
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_campaign: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_campaign(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_campaign: {e}"))),
        }
    }

    async fn list_active_campaigns(&self) -> Result<Vec<Campaign>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE active = 1 ORDER BY created_at ASC, id ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_campaigns: {e}")))?;

        let mut campaigns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_campaigns: {e}")))?
        {
            match row_to_campaign(&row) {
                Ok(c) => campaigns.push(c),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable campaign row"),
            }
        }
        Ok(campaigns)
    }

    async fn set_campaign_active(&self, id: &str, active: bool) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE campaigns SET active = ?1 WHERE id = ?2",
                params![i64::from(active), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_campaign_active: {e}")))?;
        Ok(count > 0)
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn upsert_lead(&self, lead: &Lead) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO leads ({LEAD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                     ON CONFLICT (source_url) DO UPDATE SET
                        campaign_id = ?2, title = ?3, snippet = ?4, detected_channel = ?5,
                        intent_score = ?6, rationale = ?7, draft_message = ?8,
                        contact_target = ?9, status = ?10, attempts = ?11,
                        dispatched_via = ?12, last_error = ?13, updated_at = ?15"
                ),
                params![
                    lead.source_url.as_str(),
                    lead.campaign_id.as_str(),
                    lead.title.as_str(),
                    lead.snippet.as_str(),
                    lead.detected_channel.as_str(),
                    opt_int(lead.intent_score.map(i64::from)),
                    opt_text(lead.rationale.as_deref()),
                    opt_text(lead.draft_message.as_deref()),
                    opt_text(lead.contact_target.as_deref()),
                    lead.status.as_str(),
                    i64::from(lead.attempts),
                    opt_text(lead.dispatched_via.map(|c| c.as_str())),
                    opt_text(lead.last_error.as_deref()),
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_lead: {e}")))?;
        Ok(())
    }

    async fn get_lead(&self, source_url: &str) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE source_url = ?1"),
                params![source_url],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_lead: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_lead: {e}"))),
        }
    }

    async fn leads_for_campaign(&self, campaign_id: &str) -> Result<Vec<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE campaign_id = ?1 ORDER BY created_at ASC"
                ),
                params![campaign_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("leads_for_campaign: {e}")))?;

        let mut leads = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("leads_for_campaign: {e}")))?
        {
            leads.push(row_to_lead(&row)?);
        }
        Ok(leads)
    }

    // ── Dispatch log ────────────────────────────────────────────────

    async fn log_dispatch(&self, record: &DispatchRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO dispatch_log (lead_url, channel, success, error, attempted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.lead_url.as_str(),
                    record.channel.as_str(),
                    i64::from(record.success),
                    opt_text(record.error.as_deref()),
                    record.attempted_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("log_dispatch: {e}")))?;
        Ok(())
    }

    async fn dispatch_log_for_lead(&self, lead_url: &str) -> Result<Vec<DispatchRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT lead_url, channel, success, error, attempted_at
                 FROM dispatch_log WHERE lead_url = ?1 ORDER BY id ASC",
                params![lead_url],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("dispatch_log_for_lead: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("dispatch_log_for_lead: {e}")))?
        {
            records.push(row_to_dispatch(&row)?);
        }
        Ok(records)
    }
}
