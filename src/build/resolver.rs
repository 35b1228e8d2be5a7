use crate::error::JobError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where builds are published.
#[async_trait]
pub trait ArtifactHost: Send + Sync {
    /// HTML listing of a build directory.
    async fn fetch_listing(&self, url: &str) -> Result<String, JobError>;

    /// HEAD request, true on a 2xx answer.
    async fn exists(&self, url: &str) -> Result<bool, JobError>;

    /// Download `url` into `destination`.
    async fn download(&self, url: &str, destination: &Path) -> Result<(), JobError>;
}

pub struct HttpArtifactHost {
    client: Client,
}

impl HttpArtifactHost {
    pub fn new(timeout: Duration) -> Result<Self, JobError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl ArtifactHost for HttpArtifactHost {
    async fn fetch_listing(&self, url: &str) -> Result<String, JobError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn exists(&self, url: &str) -> Result<bool, JobError> {
        let response = self.client.head(url).send().await?;
        Ok(response.status().is_success())
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<(), JobError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| JobError::Artifact(format!("failed to download {}: {}", url, e)))?;
        let content = response
            .bytes()
            .await
            .map_err(|e| JobError::Artifact(format!("failed to download {}: {}", url, e)))?;
        tokio::fs::write(destination, &content).await.map_err(|e| {
            JobError::Artifact(format!("failed to write {:?}: {}", destination, e))
        })?;
        info!("downloaded {} ({} bytes)", url, content.len());
        Ok(())
    }
}

/// Turns build locators into concrete, fetchable build urls.
///
/// A locator ending with `/` is a directory listing, the first entry
/// looking like a win32 installer is picked. Anything else is a direct
/// link to the build.
pub struct BuildResolver {
    host: Arc<dyn ArtifactHost>,
    href: Regex,
    installer: Regex,
}

impl BuildResolver {
    pub fn new(host: Arc<dyn ArtifactHost>) -> Result<Self, regex::Error> {
        Ok(Self {
            host,
            href: Regex::new(r#"(?i)<a\s[^>]*href\s*=\s*["']([^"']+)["']"#)?,
            installer: Regex::new(r"^firefox-([0-9]+).*\.win32\.installer\.exe")?,
        })
    }

    /// First installer link of a directory listing.
    fn find_installer(&self, listing: &str) -> Option<String> {
        self.href
            .captures_iter(listing)
            .filter_map(|captures| captures.get(1))
            .map(|href| href.as_str())
            .find(|href| self.installer.is_match(href))
            .map(str::to_string)
    }

    /// Concrete build url, `None` if the build is not available (yet).
    pub async fn resolve(&self, locator: &str) -> Option<String> {
        let candidate = if locator.ends_with('/') {
            let listing = match self.host.fetch_listing(locator).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!("failed to list build directory {}: {}", locator, e);
                    return None;
                }
            };
            let href = self.find_installer(&listing)?;
            format!("{}{}", locator, href)
        } else {
            locator.to_string()
        };

        match self.host.exists(&candidate).await {
            Ok(true) => {
                debug!("build {} is available", candidate);
                Some(candidate)
            }
            Ok(false) => None,
            Err(e) => {
                warn!("failed to check build {}: {}", candidate, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory artifact host.
    #[derive(Default)]
    pub struct FakeArtifactHost {
        pub listings: HashMap<String, String>,
        pub files: HashMap<String, Vec<u8>>,
        pub head_requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArtifactHost for FakeArtifactHost {
        async fn fetch_listing(&self, url: &str) -> Result<String, JobError> {
            self.listings
                .get(url)
                .cloned()
                .ok_or_else(|| JobError::Network(format!("404 for {}", url)))
        }

        async fn exists(&self, url: &str) -> Result<bool, JobError> {
            self.head_requests.lock().unwrap().push(url.to_string());
            Ok(self.files.contains_key(url))
        }

        async fn download(&self, url: &str, destination: &Path) -> Result<(), JobError> {
            let content = self
                .files
                .get(url)
                .ok_or_else(|| JobError::Artifact(format!("404 for {}", url)))?;
            tokio::fs::write(destination, content)
                .await
                .map_err(|e| JobError::Artifact(e.to_string()))
        }
    }

    const DIRECTORY: &str = "http://builds.example.org/try/";

    fn resolver(host: FakeArtifactHost) -> (BuildResolver, Arc<FakeArtifactHost>) {
        let host = Arc::new(host);
        (BuildResolver::new(host.clone()).unwrap(), host)
    }

    #[tokio::test]
    async fn test_direct_url_resolves_only_if_it_exists() {
        let mut host = FakeArtifactHost::default();
        host.files
            .insert("http://builds.example.org/firefox.exe".to_string(), vec![1]);
        let (resolver, host) = resolver(host);

        assert_eq!(
            resolver.resolve("http://builds.example.org/firefox.exe").await,
            Some("http://builds.example.org/firefox.exe".to_string())
        );
        assert_eq!(resolver.resolve("http://builds.example.org/missing.exe").await, None);
        assert_eq!(host.head_requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_directory_first_installer_wins() {
        let mut host = FakeArtifactHost::default();
        host.listings.insert(
            DIRECTORY.to_string(),
            r#"<html><body>
            <a href="../">Parent</a>
            <a href="firefox-100.en-US.win32.txt">txt</a>
            <a href="firefox-100.en-US.win32.installer.exe">100</a>
            <a href="firefox-99.en-US.win32.installer.exe">99</a>
            </body></html>"#
                .to_string(),
        );
        for version in ["100", "99"] {
            host.files.insert(
                format!("{}firefox-{}.en-US.win32.installer.exe", DIRECTORY, version),
                vec![0],
            );
        }
        let (resolver, host) = resolver(host);

        assert_eq!(
            resolver.resolve(DIRECTORY).await,
            Some(format!("{}firefox-100.en-US.win32.installer.exe", DIRECTORY))
        );
        // only the candidate is checked
        assert_eq!(host.head_requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_directory_without_installer_or_listing() {
        let mut host = FakeArtifactHost::default();
        host.listings.insert(
            DIRECTORY.to_string(),
            r#"<a href="firefox-100.en-US.linux-x86_64.tar.bz2">linux</a>"#.to_string(),
        );
        let (resolver, _) = resolver(host);
        assert_eq!(resolver.resolve(DIRECTORY).await, None);
        assert_eq!(resolver.resolve("http://builds.example.org/other/").await, None);
    }

    #[tokio::test]
    async fn test_listed_installer_must_exist() {
        let mut host = FakeArtifactHost::default();
        host.listings.insert(
            DIRECTORY.to_string(),
            r#"<a href="firefox-100.en-US.win32.installer.exe">100</a>"#.to_string(),
        );
        let (resolver, host) = resolver(host);
        assert_eq!(resolver.resolve(DIRECTORY).await, None);
        assert_eq!(
            host.head_requests.lock().unwrap()[0],
            format!("{}firefox-100.en-US.win32.installer.exe", DIRECTORY)
        );
    }
}
