//! SMTP submission with STARTTLS and login credentials.

use anyhow::{anyhow, Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use zeroize::Zeroizing;

use super::{MailTransport, NotificationJob, ATTACHMENT_CONTENT_TYPE};

pub const DEFAULT_SMTP_PORT: u16 = 587;
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct SmtpMailer {
    settings: SmtpSettings,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let credentials = Credentials::new(
            self.settings.username.clone(),
            self.settings.password.as_str().to_string(),
        );
        let transport = SmtpTransport::starttls_relay(&self.settings.host)
            .with_context(|| format!("configure STARTTLS relay {}", self.settings.host))?
            .port(self.settings.port)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Ok(transport)
    }
}

/// Build the MIME message: text body plus the clip attachment.
pub(crate) fn build_message(
    from: &str,
    job: &NotificationJob,
    attachment: Vec<u8>,
) -> Result<Message> {
    let from: Mailbox = from
        .parse()
        .with_context(|| format!("invalid from address '{}'", from))?;
    let mut builder = Message::builder().from(from).subject(job.subject.as_str());
    for recipient in &job.recipients {
        let to: Mailbox = recipient
            .parse()
            .with_context(|| format!("invalid recipient address '{}'", recipient))?;
        builder = builder.to(to);
    }
    let content_type = ContentType::parse(ATTACHMENT_CONTENT_TYPE)
        .map_err(|e| anyhow!("invalid attachment content type: {}", e))?;
    let clip = Attachment::new(job.attachment.file_name()).body(attachment, content_type);
    let message = builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(job.body.clone()))
                .singlepart(clip),
        )
        .context("build notification message")?;
    Ok(message)
}

impl MailTransport for SmtpMailer {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn deliver(&self, from: &str, job: &NotificationJob, attachment: Vec<u8>) -> Result<()> {
        let message = build_message(from, job, attachment)?;
        let response = self
            .transport()?
            .send(&message)
            .with_context(|| {
                format!(
                    "submit to {}:{}",
                    self.settings.host, self.settings.port
                )
            })?;
        log::debug!("smtp relay answered {:?}", response.code());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::ClipArtifact;

    fn job() -> NotificationJob {
        NotificationJob {
            subject: "Motion Detected - 2024-05-01_13-45-09".into(),
            body: "Motion detected.\n".into(),
            attachment: ClipArtifact {
                path: "/clips/motion_2024-05-01_13-45-09.mp4".into(),
                duration_seconds: 15,
                created_at: chrono::Local::now(),
                size_bytes: 3,
            },
            recipients: vec!["a@x.com".into(), "b@x.com".into()],
        }
    }

    #[test]
    fn message_carries_mp4_attachment_and_all_recipients() -> Result<()> {
        let message = build_message("cam@x.com", &job(), vec![1, 2, 3])?;
        let raw = String::from_utf8(message.formatted())?;

        assert!(raw.contains("From: cam@x.com"));
        assert!(raw.contains("a@x.com"));
        assert!(raw.contains("b@x.com"));
        assert!(raw.contains("Subject: Motion Detected - 2024-05-01_13-45-09"));
        assert!(raw.contains("Content-Type: video/mp4"));
        assert!(raw.contains("motion_2024-05-01_13-45-09.mp4"));
        Ok(())
    }

    #[test]
    fn invalid_recipient_is_reported() {
        let mut job = job();
        job.recipients = vec!["not an address".into()];
        let err = build_message("cam@x.com", &job, vec![]).unwrap_err();
        assert!(err.to_string().contains("invalid recipient"));
    }

    #[test]
    fn debug_redacts_password() {
        let settings = SmtpSettings {
            host: "smtp.example.com".into(),
            port: DEFAULT_SMTP_PORT,
            username: "cam@x.com".into(),
            password: Zeroizing::new("hunter2".into()),
        };
        let dbg = format!("{:?}", settings);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
