//! Clip notifications.
//!
//! One message per accepted motion event, carrying the clip as a `video/mp4`
//! attachment. Delivery is best-effort: failures are reported to the caller
//! and never retried or queued.

use anyhow::{anyhow, Context, Result};

use crate::clock::stamp;
use crate::recorder::ClipArtifact;

pub mod smtp;

pub use smtp::{SmtpMailer, SmtpSettings};

pub const ATTACHMENT_CONTENT_TYPE: &str = "video/mp4";
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 25 * 1024 * 1024;

/// Split a comma-separated recipient list, dropping blank entries.
pub fn parse_recipients(raw: &str) -> Result<Vec<String>> {
    let recipients = clean_recipients(raw.split(','));
    if recipients.is_empty() {
        return Err(anyhow!("EMAIL_TO is empty or invalid"));
    }
    Ok(recipients)
}

/// Trim each address and drop blank ones, keeping order.
fn clean_recipients<'a>(entries: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    entries
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// A composed message, built once per event and consumed once.
#[derive(Clone, Debug)]
pub struct NotificationJob {
    pub subject: String,
    pub body: String,
    pub attachment: ClipArtifact,
    pub recipients: Vec<String>,
}

impl NotificationJob {
    pub fn for_clip(clip: ClipArtifact, recipients: &[String], detected_stamp: &str) -> Self {
        let subject = format!("Motion Detected - {detected_stamp}");
        let body = format!(
            "Motion detected at {}.\nClip length: {}s\nFile: {}\nClip finished: {}\n",
            detected_stamp,
            clip.duration_seconds,
            clip.file_name(),
            stamp(&clip.created_at),
        );
        Self {
            subject,
            body,
            attachment: clip,
            recipients: recipients.to_vec(),
        }
    }
}

/// Delivers a composed message with its attachment bytes.
pub trait MailTransport: Send {
    fn name(&self) -> &'static str;

    fn deliver(&self, from: &str, job: &NotificationJob, attachment: Vec<u8>) -> Result<()>;
}

pub struct Notifier {
    from: String,
    recipients: Vec<String>,
    max_attachment_bytes: u64,
    transport: Box<dyn MailTransport>,
}

impl Notifier {
    pub fn new(
        from: impl Into<String>,
        recipients: Vec<String>,
        max_attachment_bytes: u64,
        transport: Box<dyn MailTransport>,
    ) -> Result<Self> {
        let recipients = clean_recipients(recipients.iter().map(String::as_str));
        if recipients.is_empty() {
            return Err(anyhow!("notifier needs at least one recipient"));
        }
        Ok(Self {
            from: from.into(),
            recipients,
            max_attachment_bytes,
            transport,
        })
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn job_for(&self, clip: ClipArtifact, detected_stamp: &str) -> NotificationJob {
        NotificationJob::for_clip(clip, &self.recipients, detected_stamp)
    }

    /// Send `job`. Size and recipient checks happen before any network activity.
    pub fn send(&self, job: NotificationJob) -> Result<()> {
        if job.recipients.is_empty() {
            return Err(anyhow!("refusing to send with zero recipients"));
        }
        let path = &job.attachment.path;
        let size = std::fs::metadata(path)
            .with_context(|| format!("stat attachment {}", path.display()))?
            .len();
        if size > self.max_attachment_bytes {
            return Err(anyhow!(
                "attachment {} is {} bytes, above the {} byte limit",
                path.display(),
                size,
                self.max_attachment_bytes
            ));
        }
        let data = std::fs::read(path)
            .with_context(|| format!("read attachment {}", path.display()))?;
        self.transport
            .deliver(&self.from, &job, data)
            .with_context(|| format!("{} delivery failed", self.transport.name()))
    }
}
