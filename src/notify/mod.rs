mod mailer;
mod notifier;

pub use crate::notify::mailer::{LogMailer, Mailer, Notification, SpoolMailer};
pub use crate::notify::notifier::Notifier;

#[cfg(test)]
pub use crate::notify::notifier::test::{recording_notifier, RecordingMailer};
