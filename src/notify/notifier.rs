use crate::models::{Job, JobId};
use crate::notify::{Mailer, Notification};
use std::sync::Arc;
use tracing::{error, info};

const SUBJECT_PREFIX: &str = "[WebPagetest]";

/// Builds the submitter and administrator messages and hands them
/// to the `Mailer`.
///
/// Delivery failures are logged, never returned: a notification
/// must not abort the job it is about.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    admins: Vec<String>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, admins: Vec<String>) -> Self {
        Self { mailer, admins }
    }

    fn subject(job: Option<&Job<JobId>>, subject: &str) -> String {
        match job {
            Some(job) => format!(
                "{} Job {} Label {} {}",
                SUBJECT_PREFIX, job.id, job.label, subject
            ),
            None => format!("{} {}", SUBJECT_PREFIX, subject),
        }
    }

    /// subject, job summary, then `message`
    fn body(job: Option<&Job<JobId>>, subject: &str, message: &str) -> String {
        let summary = match job {
            Some(job) => format!(
                "Job:       {}\n\
                 Label:     {}\n\
                 Build:     {}\n\
                 Locations: {}\n\
                 Urls:      {}\n\
                 Speeds:    {}\n\
                 Runs:      {}\n\
                 tcpdump:   {}\n\
                 video:     {}\n\
                 warehouse: {}\n\
                 prescript: {}\n\
                 postscript: {}\n\
                 Status:    {}\n",
                job.id,
                job.label,
                job.build,
                job.locations.join(", "),
                job.urls.join(", "),
                job.speeds.join(", "),
                job.runs,
                job.tcpdump,
                job.video,
                job.warehouse,
                job.prescript.as_deref().unwrap_or(""),
                job.postscript.as_deref().unwrap_or(""),
                job.status,
            ),
            None => String::new(),
        };
        format!("{}\n\n{}\n\n{}\n\n", subject, summary, message)
    }

    fn contact_footer(&self) -> String {
        format!(
            "Please contact your administrators {} for help.",
            self.admins.join(", ")
        )
    }

    async fn deliver(&self, notification: Notification) {
        if let Err(e) = self.mailer.send(&notification).await {
            error!(
                "failed to send '{}' to {:?}: {}",
                notification.subject, notification.to, e
            );
        }
    }

    /// Informative message to the submitter of `job`.
    pub async fn user_info(&self, job: &Job<JobId>, subject: &str, message: &str) {
        info!("job {}: {}", job.id, subject);
        self.deliver(Notification {
            to: vec![job.email.clone()],
            subject: Self::subject(Some(job), subject),
            body: Self::body(Some(job), subject, message),
        })
        .await;
    }

    /// Failure message to the submitter of `job`,
    /// pointing them to the administrators.
    pub async fn user_error(&self, job: &Job<JobId>, subject: &str, message: &str) {
        let body = format!(
            "{}{}",
            Self::body(Some(job), subject, message),
            self.contact_footer()
        );
        self.deliver(Notification {
            to: vec![job.email.clone()],
            subject: Self::subject(Some(job), subject),
            body,
        })
        .await;
    }

    /// Diagnostic message to the administrators.
    pub async fn admin_error(&self, job: Option<&Job<JobId>>, subject: &str, detail: &str) {
        error!("{}: {}", Self::subject(job, subject), detail);
        if self.admins.is_empty() {
            return;
        }
        self.deliver(Notification {
            to: self.admins.clone(),
            subject: Self::subject(job, subject),
            body: Self::body(job, subject, detail),
        })
        .await;
    }
}
