use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::Path;
use tracing::{info, warn};

use super::GatewayError;
use crate::config::MailConfig;
use crate::pipeline::publish::{MailMessage, MailSink};

/// SMTP submission over STARTTLS with password authentication.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    pub fn recipients_header(&self) -> String {
        self.config.recipient_emails.join(", ")
    }
}

fn mailbox(raw: &str) -> Result<Mailbox, GatewayError> {
    raw.trim()
        .parse::<Mailbox>()
        .map_err(|err| GatewayError::Message(format!("invalid address '{raw}': {err}")))
}

fn attachment_part(path: &Path) -> Option<SinglePart> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "attachment not found; sending without it");
            return None;
        }
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let guessed = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = ContentType::parse(guessed.essence_str())
        .unwrap_or(ContentType::TEXT_PLAIN);
    info!(file = %file_name, "attachment added");
    Some(Attachment::new(file_name).body(bytes, content_type))
}

/// Builds the multipart message: an HTML body followed by any readable
/// attachments. Unreadable attachments are skipped.
pub(crate) fn build_message(config: &MailConfig, mail: &MailMessage) -> Result<Message, GatewayError> {
    let mut builder = Message::builder()
        .from(mailbox(&config.sender_email)?)
        .subject(mail.subject.clone());
    for recipient in &config.recipient_emails {
        builder = builder.to(mailbox(recipient)?);
    }

    let mut parts = MultiPart::mixed().singlepart(SinglePart::html(mail.html_body.clone()));
    for path in &mail.attachments {
        if let Some(part) = attachment_part(path) {
            parts = parts.singlepart(part);
        }
    }

    builder
        .multipart(parts)
        .map_err(|err| GatewayError::Message(err.to_string()))
}

impl MailSink for SmtpMailer {
    fn send(&self, mail: &MailMessage) -> Result<(), GatewayError> {
        let message = build_message(&self.config, mail)?;
        let transport = SmtpTransport::starttls_relay(&self.config.smtp_server)
            .map_err(GatewayError::transport)?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                self.config.sender_email.clone(),
                self.config.app_password.clone(),
            ))
            .build();

        transport
            .send(&message)
            .map_err(GatewayError::transport)?;
        info!(recipients = %self.recipients_header(), "mail accepted by smtp relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> MailConfig {
        MailConfig {
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            sender_email: "bot@example.com".to_string(),
            app_password: "secret".to_string(),
            recipient_emails: vec!["qa@example.com".to_string(), "dev@example.com".to_string()],
        }
    }

    #[test]
    fn message_carries_recipients_and_attachment() {
        let dir = tempfile::tempdir().expect("dir");
        let csv = dir.path().join("digest.csv");
        std::fs::write(&csv, "key,url\nQA-1,https://x\n").expect("write");

        let mail = MailMessage {
            subject: "Stale issue digest (3 total) - 2024-06-14".to_string(),
            html_body: "<h1>digest</h1>".to_string(),
            attachments: vec![csv, PathBuf::from("/missing/file.csv")],
        };
        let message = build_message(&config(), &mail).expect("message builds");
        let raw = String::from_utf8(message.formatted()).expect("utf8");
        assert!(raw.contains("qa@example.com"));
        assert!(raw.contains("dev@example.com"));
        assert!(raw.contains("digest.csv"));
        assert!(!raw.contains("file.csv\""));
        assert_eq!(message.envelope().to().len(), 2);
    }

    #[test]
    fn invalid_sender_is_a_message_error() {
        let mut config = config();
        config.sender_email = "not an address".to_string();
        let mail = MailMessage {
            subject: "s".to_string(),
            html_body: "b".to_string(),
            attachments: Vec::new(),
        };
        let error = build_message(&config, &mail).expect_err("invalid sender");
        assert!(matches!(error, GatewayError::Message(_)));
    }
}
