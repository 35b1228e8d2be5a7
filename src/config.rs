use crate::models::JobSpec;
use rocket::serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, SqliteConnection};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// User customizable settings, read from `Rocket.toml` / `ROCKET_*`.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub wpt: WptConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub install: InstallConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub automatic_jobs: Vec<AutomaticJobConfig>,
}

/// WebPagetest server
#[derive(Deserialize, Debug, Clone)]
pub struct WptConfig {
    /// host (and port) of the server tests are submitted to
    pub server: String,
    /// host used in the result links of the reports, `server` if unset
    #[serde(default)]
    pub results_server: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl WptConfig {
    pub fn results_server(&self) -> &str {
        self.results_server.as_deref().unwrap_or(&self.server)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct SchedulerConfig {
    /// delay between two status polls of a batch
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// delay between two scheduler cycles
    #[serde(default = "default_idle_sleep")]
    pub idle_sleep_secs: u64,
    /// waiting jobs are checked at most once every `check_minutes`
    #[serde(default = "default_check_minutes")]
    pub check_minutes: i64,
    /// expected duration of one run of one view
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u64,
    /// directory url bare revisions are rewritten into
    #[serde(default = "default_try_build_template")]
    pub try_build_template: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            idle_sleep_secs: default_idle_sleep(),
            check_minutes: default_check_minutes(),
            time_limit_secs: default_time_limit(),
            try_build_template: default_try_build_template(),
        }
    }
}

/// Where builds are published for the test agents.
#[derive(Deserialize, Debug, Clone)]
pub struct InstallConfig {
    /// path the build is downloaded to
    pub build_path: PathBuf,
    /// path of the descriptor the agents poll
    pub descriptor_path: PathBuf,
    #[serde(default = "default_browser")]
    pub browser: String,
    /// url the agents download the build from
    pub install_url: String,
    #[serde(default = "default_install_command")]
    pub install_command: String,
    /// time left to the agents to pick up the new build
    #[serde(default = "default_propagation_delay")]
    pub propagation_delay_secs: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MailConfig {
    /// outgoing messages are written there, only logged if unset
    #[serde(default)]
    pub spool_directory: Option<PathBuf>,
    #[serde(default = "default_mail_from")]
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            spool_directory: None,
            from: default_mail_from(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct WarehouseConfig {
    /// endpoint datasets are POSTed to
    pub url: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ReportsConfig {
    /// reports and raw results are appended to files there
    #[serde(default)]
    pub dump_directory: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    /// daily log files are written there, console only if unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_log_prefix(),
        }
    }
}

/// A job submitted once a day, after `hour` (local time).
#[derive(Deserialize, Debug, Clone)]
pub struct AutomaticJobConfig {
    pub hour: u32,
    #[serde(flatten)]
    pub job: JobSpec,
}

fn default_request_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    60
}
fn default_idle_sleep() -> u64 {
    60
}
fn default_check_minutes() -> i64 {
    5
}
fn default_time_limit() -> u64 {
    240
}
fn default_try_build_template() -> String {
    "http://ftp.mozilla.org/pub/mozilla.org/firefox/try-builds/{email}-{revision}/try-win32/"
        .to_string()
}
fn default_browser() -> String {
    "Firefox".to_string()
}
fn default_install_command() -> String {
    "firefox-installer.exe /INI=c:\\webpagetest\\firefox.ini".to_string()
}
fn default_propagation_delay() -> u64 {
    120
}
fn default_mail_from() -> String {
    "wpt-scheduler@localhost".to_string()
}
fn default_log_prefix() -> String {
    "wpt-scheduler.log".to_string()
}

impl Config {
    /// Pool used by the front end.
    pub async fn database_pool(&self) -> Result<SqlitePool, String> {
        let options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(|e| format!("failed to build database options: {:?}", e))?
            .create_if_missing(true)
            .foreign_keys(true)
            .disable_statement_logging();
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| format!("failed to get database pool: {:?}", e))?;

        Ok(pool)
    }

    /// Connection owned by the scheduler loop.
    pub async fn database_connection(&self) -> Result<SqliteConnection, String> {
        let conn = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(|e| format!("failed to build database options: {:?}", e))?
            .create_if_missing(true)
            .foreign_keys(true)
            .disable_statement_logging()
            .connect()
            .await
            .map_err(|e| format!("failed to connect to database: {:?}", e))?;
        Ok(conn)
    }
}
