//! Outreach message rendering.
//!
//! The oracle's draft is preferred. When it is empty, a per-channel template
//! is filled from the campaign and a few heuristics over the lead's text.

use chrono::Timelike;

use crate::channels::email::extract_subject;
use crate::channels::{Channel, OutreachMessage};
use crate::pipeline::types::{Campaign, Lead};

const TWITTER_TRUNCATE_AT: usize = 275;

/// Greeting for the local hour of day.
pub fn intro_for_hour(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Hope you're having a great morning!",
        12..=16 => "Hope you're having a productive day!",
        17..=20 => "Hope you're having a great evening!",
        _ => "Hope you're doing well!",
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// One-line observation about what the lead wrote.
pub fn observation(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if contains_any(&lower, &["looking for", "need", "searching for"]) {
        "you're looking for solutions in this area"
    } else if contains_any(&lower, &["problem", "challenge", "issue"]) {
        "you mentioned some challenges that we might be able to help with"
    } else if contains_any(&lower, &["interest", "passionate about"]) {
        "your interest in this field"
    } else {
        "your work in this field"
    }
}

fn hashtags(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if contains_any(&lower, &["tech", "software", "developer"]) {
        "#tech #software"
    } else if contains_any(&lower, &["marketing", "growth", "seo"]) {
        "#marketing #growth"
    } else if contains_any(&lower, &["startup", "entrepreneur", "founder"]) {
        "#startup #entrepreneur"
    } else {
        "#business"
    }
}

fn product_name(campaign: &Campaign) -> &str {
    if campaign.product_name.trim().is_empty() {
        "our solution"
    } else {
        &campaign.product_name
    }
}

fn signature(campaign: &Campaign) -> &str {
    campaign
        .signature
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("Best regards")
}

/// Render the template for `channel` at the given local hour.
pub fn render_template(lead: &Lead, campaign: &Campaign, channel: Channel, hour: u32) -> OutreachMessage {
    let intro = intro_for_hour(hour);
    let text = lead.text();
    let product = product_name(campaign);

    match channel {
        Channel::Twitter => {
            let body = format!(
                "Hi there!\n\n{intro}\n\n{usp}\n\nCheck it out: {link}\n\n{tags}",
                usp = campaign.usp,
                link = campaign.product_link,
                tags = hashtags(&text),
            );
            OutreachMessage::new(fit_to_channel(body, channel))
        }
        Channel::Email => {
            let body = format!(
                "Hi there,\n\n{intro}\n\nI noticed {obs} and thought you might be interested in \
                 {product}.\n\n{usp}\n\nYou can learn more here: {link}\n\nLooking forward to \
                 connecting!\n\n{sig}",
                obs = observation(&text),
                usp = campaign.usp,
                link = campaign.product_link,
                sig = signature(campaign),
            );
            OutreachMessage::new(body).with_subject(format!("Regarding {product}"))
        }
        _ => {
            let body = format!(
                "Hi there,\n\n{intro}\n\nI came across your post and noticed {obs}. I believe \
                 {product} could be valuable for you.\n\n{usp}\n\nLearn more: {link}\n\nWould \
                 love to connect and discuss further.\n\n{sig}",
                obs = observation(&text),
                usp = campaign.usp,
                link = campaign.product_link,
                sig = signature(campaign),
            );
            OutreachMessage::new(fit_to_channel(body, channel))
        }
    }
}

/// Enforce the channel's length cap by truncating with an ellipsis.
pub fn fit_to_channel(body: String, channel: Channel) -> String {
    match channel.max_message_chars() {
        Some(max) if body.chars().count() > max => {
            let keep = TWITTER_TRUNCATE_AT.min(max.saturating_sub(3));
            let mut cut: String = body.chars().take(keep).collect();
            cut.push_str("...");
            cut
        }
        _ => body,
    }
}

/// Final message for `lead` on `channel`: the oracle draft when present,
/// otherwise the template.
pub fn compose(lead: &Lead, campaign: &Campaign, channel: Channel) -> OutreachMessage {
    let draft = lead.draft_message.as_deref().map(str::trim).unwrap_or("");
    if draft.is_empty() {
        let hour = chrono::Local::now().hour();
        return render_template(lead, campaign, channel, hour);
    }

    if channel == Channel::Email {
        let (subject, body) = extract_subject(draft);
        let subject = subject.unwrap_or_else(|| format!("Regarding {}", product_name(campaign)));
        return OutreachMessage::new(body.trim()).with_subject(subject);
    }

    // Non-email channels have no subject line; drop one if the draft has it.
    let (_, body) = extract_subject(draft);
    OutreachMessage::new(fit_to_channel(body.trim().to_string(), channel))
}
