mod init_database;
mod run_server;
mod submit_job;

pub use crate::commands::init_database::init_database;
pub use crate::commands::run_server::run_server;
pub use crate::commands::submit_job::submit_job;

use crate::config::Config;
use crate::notify::{LogMailer, Mailer, Notifier, SpoolMailer};
use std::sync::Arc;

/// Notifier delivering through the configured mail spool, or the logs.
pub fn build_notifier(config: &Config) -> Notifier {
    let mailer: Arc<dyn Mailer> = match &config.mail.spool_directory {
        Some(directory) => Arc::new(SpoolMailer::new(directory, &config.mail.from)),
        None => Arc::new(LogMailer),
    };
    Notifier::new(mailer, config.admin.emails.clone())
}
