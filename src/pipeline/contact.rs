//! Contact extraction: which address or handle can a lead be reached on.
//!
//! Email addresses are pulled from the lead's text. Platform handles are
//! derived from the source URL and are only usable on the platform the URL
//! belongs to.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;

use crate::channels::Channel;
use crate::channels::email::is_valid_email;
use crate::pipeline::types::Lead;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")
            .expect("email regex is valid")
    })
}

/// First plausible email address in `text`.
pub fn extract_email(text: &str) -> Option<String> {
    email_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.').to_ascii_lowercase())
        .find(|candidate| is_valid_email(candidate))
}

/// Path segments that name site features rather than accounts.
const RESERVED_SEGMENTS: &[&str] = &[
    "about", "explore", "features", "hashtag", "home", "i", "intent", "login", "marketplace",
    "orgs", "search", "settings", "share", "signup", "topics", "trending",
];

/// Account handle embedded in a platform URL, if any.
pub fn handle_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let channel = Channel::from_host(host);
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let account = |seg: Option<&&str>| {
        seg.map(|s| s.trim_start_matches('@'))
            .filter(|s| !s.is_empty() && !RESERVED_SEGMENTS.contains(&s.to_ascii_lowercase().as_str()))
            .map(str::to_string)
    };

    match channel {
        Channel::Twitter => account(segments.first()).map(|h| format!("@{h}")),
        Channel::Linkedin => match segments.as_slice() {
            ["in", slug, ..] => Some((*slug).to_string()),
            _ => None,
        },
        Channel::Reddit => match segments.as_slice() {
            ["user", name, ..] | ["u", name, ..] => Some(format!("u/{name}")),
            _ => None,
        },
        Channel::Github | Channel::Facebook | Channel::Instagram => account(segments.first()),
        Channel::Medium | Channel::Producthunt => segments
            .first()
            .filter(|s| s.starts_with('@'))
            .and_then(|s| account(Some(s)))
            .map(|h| format!("@{h}")),
        Channel::Quora => match segments.as_slice() {
            ["profile", name, ..] => Some((*name).to_string()),
            _ => None,
        },
        Channel::Hackernews => parsed
            .query_pairs()
            .find(|(k, _)| k == "id")
            .filter(|_| segments.first() == Some(&"user"))
            .map(|(_, v)| v.into_owned()),
        Channel::Stackoverflow => match segments.as_slice() {
            ["users", id, ..] => Some((*id).to_string()),
            _ => None,
        },
        Channel::Email | Channel::Generic => None,
    }
}

/// Best single contact for a freshly discovered lead: an email address from
/// its text, else a handle from its URL.
pub fn primary_contact(lead: &Lead) -> Option<String> {
    extract_email(&lead.snippet)
        .or_else(|| extract_email(&lead.title))
        .or_else(|| handle_from_url(&lead.source_url))
}

/// Address to use when sending `lead` over `channel`, or `None` if the lead
/// cannot be reached there.
pub fn target_for(lead: &Lead, channel: Channel) -> Option<String> {
    match channel {
        Channel::Email => lead
            .contact_target
            .as_deref()
            .filter(|t| is_valid_email(t))
            .map(str::to_string)
            .or_else(|| extract_email(&lead.snippet))
            .or_else(|| extract_email(&lead.title)),
        // Generic relays post to the page itself (contact forms, comments).
        Channel::Generic => Some(lead.source_url.clone()),
        c if c == lead.detected_channel => lead
            .contact_target
            .as_deref()
            .filter(|t| !is_valid_email(t))
            .map(str::to_string)
            .or_else(|| handle_from_url(&lead.source_url)),
        _ => None,
    }
}

/// The subset of `scheduled` channels `lead` can be reached on.
pub fn reachable_channels(lead: &Lead, scheduled: &[Channel]) -> Vec<Channel> {
    scheduled
        .iter()
        .copied()
        .filter(|c| target_for(lead, *c).is_some())
        .collect()
}
