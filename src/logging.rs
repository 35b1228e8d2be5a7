use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "wpt_scheduler=info,rocket=warn,sqlx=warn";

/// Console output, plus daily rotated files when a log directory is set.
///
/// Keep the returned guard alive until exit, buffered file output is
/// lost otherwise.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, String> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .map_err(|e| format!("failed to create log directory {:?}: {}", directory, e))?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("failed to set global default subscriber: {}", e))?;
    Ok(guard)
}
