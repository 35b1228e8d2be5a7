use crate::build::{BuildInstaller, BuildResolver, HttpArtifactHost};
use crate::commands::build_notifier;
use crate::config::Config;
use crate::metrics::{DatasetBuilder, HttpWarehouse, MetricsWarehouse};
use crate::models::{create_schema, JobId};
use crate::notify::Notifier;
use crate::rest;
use crate::scheduling::{
    AutomaticJobs, BatchEngine, JobManager, ResultAggregator, Scheduler, SchedulerClient, Stages,
};
use crate::wpt::WptClient;
use chrono::Local;
use rocket::{Build, Rocket};
use sqlx::SqliteConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::info;

/// Wire the scheduler loop to its collaborators.
fn build_scheduler(
    conn: SqliteConnection,
    config: &Config,
    notifier: Notifier,
    cancellations: UnboundedReceiver<JobId>,
) -> Result<Scheduler, String> {
    let timeout = config.wpt.request_timeout();
    let service = Arc::new(
        WptClient::new(&config.wpt.server, &config.wpt.api_key, timeout)
            .map_err(|e| format!("failed to build the test service client: {}", e))?,
    );
    let host = Arc::new(
        HttpArtifactHost::new(timeout)
            .map_err(|e| format!("failed to build the artifact client: {}", e))?,
    );
    let warehouse = match &config.warehouse {
        Some(warehouse) => Some(Arc::new(
            HttpWarehouse::new(&warehouse.url, Duration::from_secs(warehouse.timeout_secs))
                .map_err(|e| format!("failed to build the warehouse client: {}", e))?,
        ) as Arc<dyn MetricsWarehouse>),
        None => None,
    };

    let stages = Stages {
        resolver: BuildResolver::new(host.clone()).map_err(|e| e.to_string())?,
        installer: BuildInstaller::new(host, config.install.clone()),
        engine: BatchEngine::new(
            service.clone(),
            Duration::from_secs(config.scheduler.poll_interval_secs),
            Duration::from_secs(config.scheduler.time_limit_secs),
        ),
        aggregator: ResultAggregator::new(
            service,
            DatasetBuilder::new().map_err(|e| e.to_string())?,
            warehouse,
            notifier.clone(),
            config.wpt.results_server(),
            config.reports.dump_directory.clone(),
        ),
    };
    let manager = JobManager::new(
        conn,
        stages,
        notifier,
        cancellations,
        config.scheduler.check_minutes,
        &config.scheduler.try_build_template,
    );
    let automatic_jobs =
        AutomaticJobs::new(config.automatic_jobs.clone(), Local::now().naive_local());
    Ok(Scheduler::new(
        manager,
        automatic_jobs,
        Duration::from_secs(config.scheduler.idle_sleep_secs),
    ))
}

/// Start the scheduler loop and the web front end.
///
/// Returns when either of them stops.
pub async fn run_server(rocket: Rocket<Build>, config: &Config) -> Result<(), String> {
    let mut conn = config.database_connection().await?;
    create_schema(&mut conn)
        .await
        .map_err(|e| format!("failed to create tables: {}", e))?;
    let pool = config.database_pool().await?;

    let notifier = build_notifier(config);
    let (cancel_sender, cancellations) = unbounded_channel();
    let scheduler = build_scheduler(conn, config, notifier.clone(), cancellations)?;
    let client = SchedulerClient::new(
        pool,
        cancel_sender,
        notifier,
        &config.scheduler.try_build_template,
    );

    info!("starting, tests go to {}", config.wpt.server);
    let server = rocket.manage(client).mount("/wpt", rest::routes()).launch();
    tokio::select! {
        result = server => {
            result.map_err(|e| format!("front end failed: {}", e))?;
            Ok(())
        }
        result = scheduler.run() => result.map_err(|e| format!("scheduler failed: {}", e)),
    }
}
