// src/assembler/provider.rs

//! Package indexes built from Debian repositories
//!
//! For each source of a package set the binary `Packages` index is read
//! (`Packages.gz` first, then plain `Packages`), from HTTP or from local
//! `copy:`/`file:` repositories. The dpkg status file under the sysroot
//! supplies the installed set, and archives are fetched into the sysroot's
//! apt cache.

use super::IndexProvider;
use crate::error::{Error, Result};
use crate::index::fetch::local_source;
use crate::index::{HttpFetcher, MemoryIndex, PackageIndex};
use crate::model::{PackageSet, RepositorySource};
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::{debug, info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// dpkg status file, relative to the sysroot
pub const STATUS_FILE: &str = "var/lib/dpkg/status";

/// Archive cache, relative to the sysroot
pub const ARCHIVES_DIR: &str = "var/cache/apt/archives";

/// Opens a [`MemoryIndex`] per package set from its repository sources
pub struct RepositoryIndexProvider {
    client: Client,
    architecture: String,
    fetch_jobs: usize,
    fetch_retries: u32,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl RepositoryIndexProvider {
    pub fn new(architecture: &str, fetch_jobs: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            architecture: architecture.to_string(),
            fetch_jobs,
            fetch_retries: 0,
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: true,
        })
    }

    /// Share the assembler's cancellation flag with archive downloads
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extra attempts for failed archive downloads
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.fetch_retries = retries;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Location of a source's binary index, without compression suffix
    pub fn index_location(&self, source: &RepositorySource) -> String {
        format!(
            "{}/dists/{}/{}/binary-{}/Packages",
            source.url.trim_end_matches('/'),
            source.distribution,
            source.component,
            self.architecture
        )
    }

    fn read_bytes(&self, location: &str) -> Result<Option<Vec<u8>>> {
        if let Some(path) = local_source(location) {
            if !path.exists() {
                return Ok(None);
            }
            return Ok(Some(std::fs::read(&path)?));
        }

        let response = self
            .client
            .get(location)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {}: {}", location, e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                location
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {}", e)))?;
        Ok(Some(bytes.to_vec()))
    }

    /// Text of a source's `Packages` index
    pub fn fetch_index(&self, source: &RepositorySource) -> Result<String> {
        let location = self.index_location(source);

        let gz_location = format!("{}.gz", location);
        if let Some(bytes) = self.read_bytes(&gz_location)? {
            debug!("Decompressing {}", gz_location);
            let mut text = String::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_string(&mut text)
                .map_err(|e| {
                    Error::ParseError(format!("Failed to decompress {}: {}", gz_location, e))
                })?;
            return Ok(text);
        }

        match self.read_bytes(&location)? {
            Some(bytes) => String::from_utf8(bytes).map_err(|e| {
                Error::ParseError(format!("Invalid UTF-8 in {}: {}", location, e))
            }),
            None => Err(Error::DownloadError(format!(
                "No package index at {}",
                location
            ))),
        }
    }
}

impl IndexProvider for RepositoryIndexProvider {
    fn open(&self, set: &PackageSet, sysroot: &Path) -> Result<Box<dyn PackageIndex + Send>> {
        let mut index = MemoryIndex::new();

        for source in &set.sources {
            info!("Reading package index for {}", source);
            let text = self.fetch_index(source)?;
            let count = index.add_packages_str(&text, Some(&source.url))?;
            debug!("{}: {} packages", source, count);
        }

        let status = sysroot.join(STATUS_FILE);
        if status.exists() {
            index.load_status_file(&status)?;
        } else {
            warn!("No dpkg status at {}", status.display());
        }

        let archives = sysroot.join(ARCHIVES_DIR);
        std::fs::create_dir_all(&archives)?;
        let fetcher = HttpFetcher::new(&archives, self.fetch_jobs)?
            .with_cancel_flag(Arc::clone(&self.cancel))
            .with_retries(self.fetch_retries)
            .with_progress(self.show_progress);
        index.set_fetcher(Box::new(fetcher));

        Ok(Box::new(index))
    }
}
