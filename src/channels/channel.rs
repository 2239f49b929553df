//! The closed set of outreach channels and their static attributes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An outreach medium with its own rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Twitter,
    Linkedin,
    Reddit,
    Github,
    Producthunt,
    Medium,
    Quora,
    Hackernews,
    Stackoverflow,
    Facebook,
    Instagram,
    Generic,
}

/// Host suffix → channel. Checked in order; first match wins.
const DOMAIN_TABLE: &[(&str, Channel)] = &[
    ("twitter.com", Channel::Twitter),
    ("x.com", Channel::Twitter),
    ("linkedin.com", Channel::Linkedin),
    ("reddit.com", Channel::Reddit),
    ("github.com", Channel::Github),
    ("producthunt.com", Channel::Producthunt),
    ("medium.com", Channel::Medium),
    ("quora.com", Channel::Quora),
    ("news.ycombinator.com", Channel::Hackernews),
    ("stackoverflow.com", Channel::Stackoverflow),
    ("facebook.com", Channel::Facebook),
    ("instagram.com", Channel::Instagram),
];

/// Static hourly/daily capacity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLimits {
    pub hourly: u32,
    pub daily: u32,
}

impl ChannelLimits {
    pub const fn new(hourly: u32, daily: u32) -> Self {
        Self { hourly, daily }
    }
}

impl Channel {
    pub const ALL: [Channel; 13] = [
        Channel::Email,
        Channel::Twitter,
        Channel::Linkedin,
        Channel::Reddit,
        Channel::Github,
        Channel::Producthunt,
        Channel::Medium,
        Channel::Quora,
        Channel::Hackernews,
        Channel::Stackoverflow,
        Channel::Facebook,
        Channel::Instagram,
        Channel::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Twitter => "twitter",
            Self::Linkedin => "linkedin",
            Self::Reddit => "reddit",
            Self::Github => "github",
            Self::Producthunt => "producthunt",
            Self::Medium => "medium",
            Self::Quora => "quora",
            Self::Hackernews => "hackernews",
            Self::Stackoverflow => "stackoverflow",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Generic => "generic",
        }
    }

    /// Detect the channel a host belongs to. Matches the host itself or any
    /// subdomain of a table entry, so `mobile.twitter.com` is twitter but
    /// `box.com` is not.
    pub fn from_host(host: &str) -> Channel {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        DOMAIN_TABLE
            .iter()
            .find(|(domain, _)| {
                host == *domain
                    || host
                        .strip_suffix(domain)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(|(_, channel)| *channel)
            .unwrap_or(Channel::Generic)
    }

    /// Qualifier appended to campaign keywords when searching this channel.
    pub fn search_qualifier(&self) -> &'static str {
        match self {
            Self::Twitter => "site:twitter.com OR site:x.com",
            Self::Linkedin => "site:linkedin.com/in/",
            Self::Reddit => r#"site:reddit.com ("looking for" OR "recommend" OR "help needed")"#,
            Self::Github => "site:github.com",
            Self::Producthunt => "site:producthunt.com",
            Self::Medium => "site:medium.com",
            Self::Quora => "site:quora.com",
            Self::Hackernews => "site:news.ycombinator.com",
            Self::Stackoverflow => "site:stackoverflow.com",
            Self::Facebook => "site:facebook.com",
            Self::Instagram => "site:instagram.com",
            Self::Email | Self::Generic => {
                r#"contact email hire consult services "looking for""#
            }
        }
    }

    /// Conservative default capacity, used unless overridden by configuration.
    pub fn default_limits(&self) -> ChannelLimits {
        match self {
            Self::Email => ChannelLimits::new(25, 150),
            Self::Twitter => ChannelLimits::new(15, 100),
            Self::Linkedin => ChannelLimits::new(10, 50),
            Self::Reddit => ChannelLimits::new(10, 50),
            Self::Github | Self::Producthunt | Self::Medium => ChannelLimits::new(5, 25),
            Self::Quora | Self::Hackernews | Self::Stackoverflow => ChannelLimits::new(5, 25),
            Self::Facebook | Self::Instagram => ChannelLimits::new(10, 50),
            Self::Generic => ChannelLimits::new(5, 20),
        }
    }

    /// Hard cap on message length, if the platform has one.
    pub fn max_message_chars(&self) -> Option<usize> {
        match self {
            Self::Twitter => Some(280),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        match normalized.as_str() {
            "x" => Ok(Self::Twitter),
            "hn" => Ok(Self::Hackernews),
            other => Self::ALL
                .iter()
                .copied()
                .find(|c| c.as_str() == other)
                .ok_or_else(|| format!("unknown channel: {s}")),
        }
    }
}
