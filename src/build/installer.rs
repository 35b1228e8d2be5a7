use crate::build::{ArtifactHost, BuildInfo};
use crate::config::InstallConfig;
use crate::error::JobError;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Publishes a build to the test agents.
///
/// The agents poll the descriptor file, a changed `version` makes them
/// download and install the build from `install_url`.
pub struct BuildInstaller {
    host: Arc<dyn ArtifactHost>,
    config: InstallConfig,
}

impl BuildInstaller {
    pub fn new(host: Arc<dyn ArtifactHost>, config: InstallConfig) -> Self {
        Self { host, config }
    }

    /// Content of the install descriptor.
    fn descriptor(&self) -> String {
        // a fresh version forces the agents to reinstall
        let version: u32 = rand::thread_rng().gen_range(0..100);
        format!(
            "browser={}\nurl={}\nversion={}\ncommand={}\nupdate=1\n",
            self.config.browser, self.config.install_url, version, self.config.install_command
        )
    }

    /// Download `build_url`, publish it, then give the agents
    /// time to pick it up.
    ///
    /// Returns the identity of the build when it could be read from it.
    pub async fn install(&self, build_url: &str) -> Result<Option<BuildInfo>, JobError> {
        let build_path = &self.config.build_path;
        if tokio::fs::metadata(build_path).await.is_ok() {
            tokio::fs::remove_file(build_path).await.map_err(|e| {
                JobError::Artifact(format!("failed to remove {:?}: {}", build_path, e))
            })?;
        }
        info!("downloading build {}", build_url);
        self.host.download(build_url, build_path).await?;

        tokio::fs::write(&self.config.descriptor_path, self.descriptor())
            .await
            .map_err(|e| {
                JobError::Artifact(format!(
                    "failed to write {:?}: {}",
                    self.config.descriptor_path, e
                ))
            })?;

        let archive: PathBuf = build_path.clone();
        let build_info = match tokio::task::spawn_blocking(move || BuildInfo::from_archive(&archive))
            .await
        {
            Ok(Ok(build_info)) => {
                debug!("installed {}", build_info);
                Some(build_info)
            }
            Ok(Err(e)) => {
                warn!("failed to read build information of {}: {}", build_url, e);
                None
            }
            Err(e) => {
                warn!("build information reader panicked: {}", e);
                None
            }
        };

        tokio::time::sleep(Duration::from_secs(self.config.propagation_delay_secs)).await;
        Ok(build_info)
    }
}
