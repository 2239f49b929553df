//! Email channel: outbound SMTP via lettre.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{OutreachMessage, OutreachSender};
use crate::error::ChannelError;

/// Subject used when a message carries none.
const DEFAULT_SUBJECT: &str = "Quick question";

// ── Configuration ───────────────────────────────────────────────────

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (email channel disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

// ── Sender ──────────────────────────────────────────────────────────

/// SMTP email sender.
pub struct EmailSender {
    config: SmtpConfig,
}

impl EmailSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build the lettre message. Split out so address validation can be
    /// tested without a server.
    fn build_message(&self, to: &str, message: &OutreachMessage) -> Result<Message, ChannelError> {
        let subject = message.subject.as_deref().unwrap_or(DEFAULT_SUBJECT);

        Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                ChannelError::SendFailed {
                    name: "email".into(),
                    reason: format!("Invalid from address: {e}"),
                }
            })?)
            .to(to.parse().map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("Invalid to address: {e}"),
            })?)
            .subject(subject)
            .body(message.body.clone())
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("Failed to build email: {e}"),
            })
    }
}

/// Blocking SMTP submission (run inside `spawn_blocking`).
fn send_blocking(config: &SmtpConfig, email: &Message) -> Result<(), ChannelError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    // Port 465 is implicit TLS; everything else negotiates STARTTLS.
    let builder = if config.port == 465 {
        SmtpTransport::relay(&config.host)
    } else {
        SmtpTransport::starttls_relay(&config.host)
    }
    .map_err(|e| ChannelError::SendFailed {
        name: "email".into(),
        reason: format!("SMTP relay error: {e}"),
    })?;

    let transport = builder.port(config.port).credentials(creds).build();

    transport.send(email).map_err(|e| ChannelError::SendFailed {
        name: "email".into(),
        reason: format!("SMTP send failed: {e}"),
    })?;
    Ok(())
}

#[async_trait]
impl OutreachSender for EmailSender {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, target: &str, message: &OutreachMessage) -> Result<(), ChannelError> {
        if !is_valid_email(target) {
            return Err(ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("Not an email address: {target}"),
            });
        }

        let email = self.build_message(target, message)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || send_blocking(&config, &email))
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("SMTP task panicked: {e}"),
            })??;

        tracing::info!("Email sent to {target}");
        Ok(())
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Basic syntactic email check.
pub fn is_valid_email(candidate: &str) -> bool {
    static EMAIL: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    EMAIL
        .get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
                .expect("email regex is valid")
        })
        .is_match(candidate)
}

/// Extract subject from drafted content.
///
/// If content starts with `Subject: ...`, uses that line as subject
/// and the rest as body. Otherwise there is no subject.
pub fn extract_subject(content: &str) -> (Option<String>, &str) {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed
        .strip_prefix("Subject: ")
        .or_else(|| trimmed.strip_prefix("subject: "))
        && let Some(pos) = rest.find('\n')
    {
        let subject = rest[..pos].trim().to_string();
        let body = rest[pos + 1..].trim_start();
        return (Some(subject), body);
    }
    (None, content)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.test.com".into(),
            port: 587,
            username: "user".into(),
            password: SecretString::from("pass"),
            from_address: "outreach@test.com".into(),
        }
    }

    // ── Address validation ──────────────────────────────────────────

    #[test]
    fn valid_emails_accepted() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co"));
    }

    #[test]
    fn invalid_emails_rejected() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("@handle"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice example.com"));
    }

    // ── Subject extraction tests ────────────────────────────────────

    #[test]
    fn extract_subject_present() {
        let (subject, body) = extract_subject("Subject: Hello World\nThis is the body");
        assert_eq!(subject.as_deref(), Some("Hello World"));
        assert_eq!(body, "This is the body");
    }

    #[test]
    fn extract_subject_missing() {
        let (subject, body) = extract_subject("Just a plain message");
        assert_eq!(subject, None);
        assert_eq!(body, "Just a plain message");
    }

    #[test]
    fn extract_subject_no_newline() {
        let (subject, body) = extract_subject("Subject: Only subject");
        assert_eq!(subject, None);
        assert_eq!(body, "Subject: Only subject");
    }

    #[test]
    fn extract_subject_with_leading_whitespace() {
        let (subject, body) = extract_subject("\n  Subject: Test\n\n  Body with leading space");
        assert_eq!(subject.as_deref(), Some("Test"));
        assert_eq!(body, "Body with leading space");
    }

    // ── Message construction ────────────────────────────────────────

    #[test]
    fn build_message_uses_default_subject() {
        let sender = EmailSender::new(test_config());
        let msg = sender
            .build_message("bob@example.com", &OutreachMessage::new("hello"))
            .unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("Subject: Quick question"));
        assert!(raw.contains("To: bob@example.com"));
    }

    #[test]
    fn build_message_rejects_bad_from() {
        let mut config = test_config();
        config.from_address = "not an address".into();
        let sender = EmailSender::new(config);
        let err = sender
            .build_message("bob@example.com", &OutreachMessage::new("hello"))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid from address"));
    }

    #[tokio::test]
    async fn send_rejects_non_email_target() {
        let sender = EmailSender::new(test_config());
        let err = sender
            .send("@twitter_handle", &OutreachMessage::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
    }

    #[test]
    fn config_from_env_returns_none_when_no_host() {
        // SAFETY: no other test reads SMTP_HOST concurrently.
        unsafe { std::env::remove_var("SMTP_HOST") };
        assert!(SmtpConfig::from_env().is_none());
    }

    #[test]
    fn sender_name() {
        let sender = EmailSender::new(test_config());
        assert_eq!(sender.name(), "smtp");
    }
}
