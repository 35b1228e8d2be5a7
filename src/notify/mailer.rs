use async_trait::async_trait;
use chrono::Local;
use rand::Rng;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// recipient addresses
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("no recipient")]
    NoRecipient,
    #[error("failed to spool message: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivery channel for notifications.
///
/// Implementations are stateless with regard to the messages: everything
/// needed to deliver one is in the `Notification` value.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), MailError>;
}

/// Writes each message as an RFC 822 file into a spool directory,
/// the local MTA picks them up from there.
pub struct SpoolMailer {
    directory: PathBuf,
    from: String,
}

impl SpoolMailer {
    pub fn new(directory: impl Into<PathBuf>, from: &str) -> Self {
        Self {
            directory: directory.into(),
            from: from.to_string(),
        }
    }

    /// format `notification` as a mail message
    pub fn format_message(&self, notification: &Notification) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\n\r\n{}",
            self.from,
            notification.to.join(","),
            notification.subject,
            Local::now().to_rfc2822(),
            notification.body
        )
    }
}

#[async_trait]
impl Mailer for SpoolMailer {
    async fn send(&self, notification: &Notification) -> Result<(), MailError> {
        if notification.to.is_empty() {
            return Err(MailError::NoRecipient);
        }
        tokio::fs::create_dir_all(&self.directory).await?;
        let file_name = format!(
            "{}-{:08x}.eml",
            Local::now().format("%Y%m%d%H%M%S"),
            rand::thread_rng().gen::<u32>()
        );
        let path = self.directory.join(file_name);
        tokio::fs::write(&path, self.format_message(notification)).await?;
        debug!("spooled '{}' to {:?}", notification.subject, path);
        Ok(())
    }
}

/// Only logs messages, used when no spool directory is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, notification: &Notification) -> Result<(), MailError> {
        if notification.to.is_empty() {
            return Err(MailError::NoRecipient);
        }
        info!(
            to = %notification.to.join(","),
            subject = %notification.subject,
            "notification:\n{}",
            notification.body
        );
        Ok(())
    }
}
