//! File-backed libSQL store: data survives reopening the database.

use nexus_outreach::channels::Channel;
use nexus_outreach::pipeline::{Campaign, Lead, LeadStatus};
use nexus_outreach::store::{Database, DispatchRecord, LibSqlBackend};

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    // Parent directories are created on open.
    let path = dir.path().join("state").join("nexus.db");

    {
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let mut campaign = Campaign::new("c1", "Acme");
        campaign.keywords = vec!["crm".into()];
        campaign.channels = vec![Channel::Reddit];
        db.upsert_campaign(&campaign).await.unwrap();

        let mut lead = Lead::new(
            "c1",
            "https://reddit.com/r/saas/comments/1",
            "Need a CRM",
            "",
            Channel::Reddit,
        );
        lead.transition_to(LeadStatus::Scored).unwrap();
        lead.intent_score = Some(40);
        lead.transition_to(LeadStatus::Rejected).unwrap();
        db.upsert_lead(&lead).await.unwrap();
        db.log_dispatch(&DispatchRecord::failure(&lead.source_url, Channel::Reddit, "timeout"))
            .await
            .unwrap();
    }

    // Reopening runs migrations again; they must be no-ops.
    let db = LibSqlBackend::new_local(&path).await.unwrap();
    let campaigns = db.list_active_campaigns().await.unwrap();
    assert_eq!(campaigns.len(), 1);
    assert_eq!(campaigns[0].channels, vec![Channel::Reddit]);

    let lead = db
        .get_lead("https://reddit.com/r/saas/comments/1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lead.status, LeadStatus::Rejected);
    assert_eq!(lead.intent_score, Some(40));
    assert_eq!(db.dispatch_log_for_lead(&lead.source_url).await.unwrap().len(), 1);
}
