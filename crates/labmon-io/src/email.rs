//! Email notification delivery via SMTP.
//!
//! [`EmailReporter`] sends each interlock notification as a plain-text mail
//! to every configured recipient. The SMTP session itself is handled by
//! `lettre`'s blocking transport; a failed send surfaces as a
//! [`ReportError`] that the interlock logs and drops.

use interlock_core::ReportError;
use serde::{Deserialize, Serialize};

const DEFAULT_SMTP_PORT: u16 = 25;
const DEFAULT_SUBJECT: &str = "Lab interlock warning";
const PASSWORD_ENV: &str = "LABMON_SMTP_PASSWORD";

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Unencrypted, as with an in-house relay.
    #[default]
    Plain,
    Starttls,
    Tls,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub security: SmtpSecurity,
    pub sender_name: String,
    pub sender: String,
    pub recipients: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Falls back to `LABMON_SMTP_PASSWORD` when absent.
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

impl EmailConfig {
    pub fn password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
    }
}

#[cfg(feature = "email")]
pub use reporter::EmailReporter;

#[cfg(feature = "email")]
mod reporter {
    use super::{EmailConfig, SmtpSecurity};
    use interlock_core::{ReportError, Reporter};
    use lettre::message::header::ContentType;
    use lettre::message::Mailbox;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{Address, Message, SmtpTransport, Transport};
    use std::time::Duration;

    const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

    pub struct EmailReporter {
        from: Mailbox,
        to: Vec<Mailbox>,
        subject: String,
        mailer: SmtpTransport,
    }

    impl EmailReporter {
        /// Validates the addresses and prepares the transport. No
        /// connection is made until the first report.
        pub fn new(config: &EmailConfig) -> Result<Self, ReportError> {
            let sender: Address = config
                .sender
                .parse()
                .map_err(|e| super::address_error(&config.sender, e))?;
            let from = Mailbox::new(Some(config.sender_name.clone()), sender);

            let to = config
                .recipients
                .iter()
                .map(|r| {
                    r.parse::<Mailbox>()
                        .map_err(|e| super::address_error(r, e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if to.is_empty() {
                return Err(ReportError::Build("no recipients configured".to_string()));
            }

            let builder = match config.security {
                SmtpSecurity::Plain => SmtpTransport::builder_dangerous(&config.server),
                SmtpSecurity::Starttls => SmtpTransport::starttls_relay(&config.server)
                    .map_err(|e| ReportError::Transport(e.to_string()))?,
                SmtpSecurity::Tls => SmtpTransport::relay(&config.server)
                    .map_err(|e| ReportError::Transport(e.to_string()))?,
            };
            let mut builder = builder.port(config.port).timeout(Some(SMTP_TIMEOUT));
            if let (Some(user), Some(pass)) = (&config.username, config.password()) {
                builder = builder.credentials(Credentials::new(user.clone(), pass));
            }

            Ok(Self {
                from,
                to,
                subject: config.subject.clone(),
                mailer: builder.build(),
            })
        }

        pub fn compose(&self, body: &str) -> Result<Message, ReportError> {
            let mut builder = Message::builder()
                .from(self.from.clone())
                .subject(self.subject.clone())
                .header(ContentType::TEXT_PLAIN);
            for recipient in &self.to {
                builder = builder.to(recipient.clone());
            }
            builder
                .body(body.to_string())
                .map_err(|e| ReportError::Build(e.to_string()))
        }
    }

    impl Reporter for EmailReporter {
        fn report(&self, message: &str) -> Result<(), ReportError> {
            let email = self.compose(message)?;
            self.mailer
                .send(&email)
                .map_err(|e| ReportError::Transport(e.to_string()))?;
            tracing::info!(recipients = self.to.len(), "Interlock notification emailed");
            Ok(())
        }
    }
}

fn address_error(address: &str, reason: impl std::fmt::Display) -> ReportError {
    ReportError::Address {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        serde_json::from_str(
            r#"{
                "server": "smtp.lab.example",
                "sender_name": "E5 Logger",
                "sender": "logger@lab.example",
                "recipients": ["oncall@lab.example", "Lab Manager <manager@lab.example>"],
                "subject": "E5 Keithley Logger Problem"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_to_plain_relay() {
        let config = config();
        assert_eq!(config.port, 25);
        assert_eq!(config.security, SmtpSecurity::Plain);
        assert!(config.username.is_none());
    }

    #[test]
    fn address_error_display() {
        let err = address_error("nobody", "missing domain");
        assert_eq!(
            err.to_string(),
            "invalid notification address nobody: missing domain"
        );
    }

    #[cfg(feature = "email")]
    #[test]
    fn composes_plain_text_message() {
        let reporter = EmailReporter::new(&config()).unwrap();
        let email = reporter
            .compose("Status: running\nWarnings: N/A")
            .unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("logger@lab.example"));
        assert!(raw.contains("manager@lab.example"));
        assert!(raw.contains("Subject: E5 Keithley Logger Problem"));
        assert!(raw.contains("Warnings: N/A"));
    }

    #[cfg(feature = "email")]
    #[test]
    fn rejects_bad_sender() {
        let mut config = config();
        config.sender = "not-an-email".to_string();
        assert!(matches!(
            EmailReporter::new(&config),
            Err(ReportError::Address { .. })
        ));
    }

    #[cfg(feature = "email")]
    #[test]
    fn rejects_empty_recipients() {
        let mut config = config();
        config.recipients.clear();
        assert!(matches!(
            EmailReporter::new(&config),
            Err(ReportError::Build(_))
        ));
    }
}
