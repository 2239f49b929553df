//! Lead discovery: fan-out search, canonicalization and dedup.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use reqwest::Url;

use crate::channels::Channel;
use crate::dispatch::DispatchMetrics;
use crate::pipeline::contact::primary_contact;
use crate::pipeline::search::{RetryPolicy, WebSearcher, search_with_retry};
use crate::pipeline::types::{Campaign, Lead, SearchHit};

/// Query parameters that only identify the referrer.
const TRACKING_PARAMS: &[&str] = &["ref", "ref_src", "fbclid", "gclid", "igshid", "si"];

/// Canonical form used as the lead key: https, lowercase host without
/// `www.`, no fragment, no tracking parameters, no trailing slash.
/// Returns `None` for anything that is not an absolute http(s) URL.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return None;
    }

    url.set_scheme("https").ok()?;
    url.set_host(Some(&host)).ok()?;
    url.set_port(None).ok()?;
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut out = url.to_string();
    if url.query().is_none() && out.ends_with('/') {
        out.pop();
    } else if let Some(pos) = out.find("/?") {
        out.remove(pos);
    }
    Some(out)
}

/// Collapse raw hits into leads: canonical URL key, first seen wins,
/// capped at `max_leads`.
pub fn dedup_hits(campaign_id: &str, hits: impl IntoIterator<Item = SearchHit>, max_leads: usize) -> Vec<Lead> {
    let mut seen = HashSet::new();
    let mut leads = Vec::new();

    for hit in hits {
        if leads.len() >= max_leads {
            break;
        }
        let Some(url) = canonical_url(&hit.url) else {
            tracing::debug!(url = %hit.url, "Dropping hit with unusable URL");
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let channel = Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(Channel::from_host))
            .unwrap_or(Channel::Generic);

        let mut lead = Lead::new(campaign_id, url, hit.title, hit.snippet, channel);
        lead.contact_target = primary_contact(&lead);
        leads.push(lead);
    }
    leads
}

/// Searches every campaign channel and yields deduplicated leads.
pub struct LeadPipeline {
    searcher: Arc<dyn WebSearcher>,
    retry: RetryPolicy,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl LeadPipeline {
    pub fn new(searcher: Arc<dyn WebSearcher>) -> Self {
        Self {
            searcher,
            retry: RetryPolicy::default(),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// One search per target channel, run concurrently. A channel whose
    /// search fails contributes nothing; the others still count.
    pub async fn discover(&self, campaign: &Campaign) -> Vec<Lead> {
        if campaign.channels.is_empty() || campaign.max_leads == 0 {
            return Vec::new();
        }
        let per_channel = campaign.max_leads.div_ceil(campaign.channels.len()).max(1);

        let searches = campaign.channels.iter().map(|channel| {
            let query = campaign.query_for(*channel);
            async move {
                let result =
                    search_with_retry(self.searcher.as_ref(), &query, per_channel, self.retry).await;
                (*channel, result)
            }
        });

        let mut hits = Vec::new();
        for (channel, result) in join_all(searches).await {
            match result {
                Ok(found) => {
                    tracing::debug!(
                        campaign = %campaign.id,
                        channel = %channel,
                        hits = found.len(),
                        "Channel search complete"
                    );
                    hits.extend(found);
                }
                Err(e) => {
                    tracing::warn!(
                        campaign = %campaign.id,
                        channel = %channel,
                        error = %e,
                        "Channel search failed; treating as empty"
                    );
                    if let Some(ref m) = self.metrics {
                        m.record_search_failure();
                    }
                }
            }
        }

        let leads = dedup_hits(&campaign.id, hits, campaign.max_leads);
        tracing::info!(campaign = %campaign.id, leads = leads.len(), "Discovery complete");
        leads
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::error::SearchError;

    fn hit(url: &str, title: &str) -> SearchHit {
        SearchHit {
            url: url.into(),
            title: title.into(),
            snippet: String::new(),
        }
    }

    #[test]
    fn canonicalizes_urls() {
        assert_eq!(
            canonical_url("http://WWW.Reddit.com/r/saas/comments/1/?utm_source=x&ref=y#top").as_deref(),
            Some("https://reddit.com/r/saas/comments/1")
        );
        assert_eq!(
            canonical_url("https://news.ycombinator.com/item?id=42&utm_medium=z").as_deref(),
            Some("https://news.ycombinator.com/item?id=42")
        );
        assert_eq!(
            canonical_url("https://example.com/").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            canonical_url("https://example.com/page/?q=1").as_deref(),
            Some("https://example.com/page?q=1")
        );
    }

    #[test]
    fn rejects_unusable_urls() {
        assert_eq!(canonical_url(""), None);
        assert_eq!(canonical_url("not a url"), None);
        assert_eq!(canonical_url("mailto:a@b.com"), None);
        assert_eq!(canonical_url("ftp://example.com/file"), None);
    }

    #[test]
    fn same_url_from_two_channels_is_one_lead() {
        let hits = vec![
            hit("https://twitter.com/alice/status/1", "first"),
            hit("https://www.twitter.com/alice/status/1/?utm_source=google", "second"),
            hit("https://github.com/alice", "gh"),
        ];
        let leads = dedup_hits("c1", hits, 10);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].title, "first");
        assert_eq!(leads[0].detected_channel, Channel::Twitter);
        assert_eq!(leads[0].contact_target.as_deref(), Some("@alice"));
        assert_eq!(leads[1].detected_channel, Channel::Github);
    }

    #[test]
    fn dedup_respects_cap_and_drops_invalid() {
        let hits = vec![
            hit("garbage", "x"),
            hit("https://a.com/1", "a"),
            hit("https://a.com/2", "b"),
            hit("https://a.com/3", "c"),
        ];
        let leads = dedup_hits("c1", hits, 2);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].detected_channel, Channel::Generic);
    }

    #[test]
    fn rerunning_dedup_is_stable() {
        let hits = vec![hit("https://a.com/1", "a"), hit("https://a.com/1#x", "b")];
        let first = dedup_hits("c1", hits.clone(), 10);
        let second = dedup_hits("c1", hits, 10);
        assert_eq!(first.len(), 1);
        assert_eq!(
            first.iter().map(|l| &l.source_url).collect::<Vec<_>>(),
            second.iter().map(|l| &l.source_url).collect::<Vec<_>>()
        );
    }

    /// Returns canned hits per query substring; errors for queries
    /// containing "reddit".
    struct ScriptedSearcher {
        results: HashMap<&'static str, Vec<SearchHit>>,
    }

    #[async_trait]
    impl WebSearcher for ScriptedSearcher {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            if query.contains("reddit") {
                return Err(SearchError::Rejected("quota".into()));
            }
            Ok(self
                .results
                .iter()
                .find(|(k, _)| query.contains(*k))
                .map(|(_, v)| v.clone())
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn failing_channel_does_not_abort_discovery() {
        let mut results = HashMap::new();
        results.insert("twitter", vec![hit("https://x.com/bob", "bob")]);
        results.insert("github", vec![hit("https://github.com/bob", "bob gh"), hit("https://x.com/bob", "dup")]);
        let metrics = Arc::new(DispatchMetrics::new());
        let pipeline = LeadPipeline::new(Arc::new(ScriptedSearcher { results }))
            .with_metrics(Arc::clone(&metrics));

        let mut campaign = Campaign::new("c1", "Acme");
        campaign.keywords = vec!["crm".into()];
        campaign.channels = vec![Channel::Twitter, Channel::Reddit, Channel::Github];

        let leads = pipeline.discover(&campaign).await;
        assert_eq!(leads.len(), 2);
        assert_eq!(metrics.snapshot().search_failures, 1);
    }

    #[tokio::test]
    async fn no_channels_means_no_leads() {
        let pipeline = LeadPipeline::new(Arc::new(ScriptedSearcher {
            results: HashMap::new(),
        }));
        let campaign = Campaign::new("c1", "Acme");
        assert!(pipeline.discover(&campaign).await.is_empty());
    }
}
