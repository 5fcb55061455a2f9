// src/index/fetch.rs

//! Archive download for marked packages
//!
//! [`HttpFetcher`] downloads the `.deb` of every marked package into an
//! archives directory (the rootfs `var/cache/apt/archives` during
//! assembly). Downloads run in parallel on a rayon pool, are streamed to a
//! temporary file, verified against the repository SHA256 and only then
//! moved into place, so a failed or cancelled fetch never leaves a partial
//! archive behind.
//!
//! Local repositories (`file:` and `copy:` URLs) are copied instead of
//! downloaded.

use super::VersionedPackage;
use crate::error::{Error, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// One archive to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub package: VersionedPackage,
    /// Repository root the filename is relative to
    pub base_url: Option<String>,
    /// Repository-relative path, e.g. `pool/main/f/foo/foo_1.0_amd64.deb`
    pub filename: Option<String>,
    pub size: Option<u64>,
    pub sha256: Option<String>,
}

impl ArchiveRequest {
    /// Name of the archive inside the archives directory
    pub fn file_name(&self) -> String {
        self.filename
            .as_deref()
            .and_then(|f| f.rsplit('/').next())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}_{}.deb",
                    self.package.package,
                    self.package.version.replace(':', "%3a")
                )
            })
    }

    /// Full source location of the archive
    pub fn location(&self) -> Result<String> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            Error::DownloadError(format!("No repository URL for {}", self.package))
        })?;
        let filename = self.filename.as_deref().ok_or_else(|| {
            Error::DownloadError(format!("No Filename for {}", self.package))
        })?;
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            filename.trim_start_matches('/')
        ))
    }
}

/// Something that can bring archives of marked packages to local disk
pub trait ArchiveFetcher: Send + Sync {
    /// Fetch every archive, returning local paths in request order
    fn fetch(&self, requests: &[ArchiveRequest]) -> Result<Vec<PathBuf>>;
}

/// Local path for `file:` and `copy:` URLs
pub(crate) fn local_source(location: &str) -> Option<PathBuf> {
    if let Some(rest) = location.strip_prefix("copy:") {
        return Some(PathBuf::from(rest));
    }
    if location.starts_with("file:") {
        return url::Url::parse(location).ok()?.to_file_path().ok();
    }
    None
}

/// Verify the SHA256 of a file on disk
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let actual = hex::encode(hasher.finalize());
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

fn create_progress_bar(size: Option<u64>, name: &str) -> ProgressBar {
    let pb = ProgressBar::new(size.unwrap_or(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(name.to_string());
    pb
}

/// Parallel HTTP/local archive fetcher
pub struct HttpFetcher {
    client: Client,
    archives_dir: PathBuf,
    jobs: usize,
    /// Extra attempts after a failed download
    retries: u32,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl HttpFetcher {
    /// Fetcher writing into `archives_dir` with `jobs` parallel downloads
    pub fn new(archives_dir: &Path, jobs: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            archives_dir: archives_dir.to_path_buf(),
            jobs: jobs.max(1),
            retries: 0,
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: io::stderr().is_terminal(),
        })
    }

    /// Share a cancellation flag; setting it aborts pending downloads
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Retry failed downloads; by default a failure is final
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn archives_dir(&self) -> &Path {
        &self.archives_dir
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(Error::FetchCancelled)
        } else {
            Ok(())
        }
    }

    fn fetch_one(&self, request: &ArchiveRequest, pb: &ProgressBar) -> Result<PathBuf> {
        self.check_cancelled()?;

        let dest = self.archives_dir.join(request.file_name());
        if dest.exists() {
            match request.sha256 {
                Some(ref expected) if verify_sha256(&dest, expected).is_ok() => {
                    debug!("{} already present", dest.display());
                    pb.finish_and_clear();
                    return Ok(dest);
                }
                Some(_) => {
                    warn!("Removing stale archive {}", dest.display());
                    if let Err(e) = fs::remove_file(&dest) {
                        warn!("Failed to remove {}: {}", dest.display(), e);
                    }
                }
                None => {
                    debug!("{} already present (no checksum)", dest.display());
                    pb.finish_and_clear();
                    return Ok(dest);
                }
            }
        }

        let location = request.location()?;
        let mut temp = NamedTempFile::new_in(&self.archives_dir)?;

        let digest = match local_source(&location) {
            Some(path) => {
                debug!("Copying {} from {}", request.package, path.display());
                let mut source = File::open(&path).map_err(|e| {
                    Error::DownloadError(format!("Failed to open {}: {}", path.display(), e))
                })?;
                self.stream(&mut source, temp.as_file_mut(), request.size, pb)?
            }
            None => self.download(&location, temp.as_file_mut(), request.size, pb)?,
        };

        if let Some(ref expected) = request.sha256 {
            if !digest.eq_ignore_ascii_case(expected.trim()) {
                // Dropping the temp file removes the corrupt download
                return Err(Error::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        temp.persist(&dest)
            .map_err(|e| Error::IoError(format!("Failed to store {}: {}", dest.display(), e)))?;
        pb.finish_with_message(format!("{} done", request.package));
        Ok(dest)
    }

    fn download(
        &self,
        url: &str,
        file: &mut File,
        size: Option<u64>,
        pb: &ProgressBar,
    ) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.check_cancelled()?;

            let result = self
                .client
                .get(url)
                .send()
                .map_err(|e| Error::DownloadError(format!("{url}: {e}")))
                .and_then(|response| {
                    if response.status().is_success() {
                        Ok(response)
                    } else {
                        Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )))
                    }
                })
                .and_then(|mut response| {
                    file.set_len(0)?;
                    let size = size.or(response.content_length());
                    self.stream(&mut response, file, size, pb)
                });

            match result {
                Ok(digest) => return Ok(digest),
                Err(Error::FetchCancelled) => return Err(Error::FetchCancelled),
                Err(e) if attempt > self.retries => {
                    return Err(Error::DownloadError(format!(
                        "Failed after {attempt} attempt(s): {e}"
                    )));
                }
                Err(e) => {
                    warn!("Attempt {} for {} failed: {}", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                }
            }
        }
    }

    /// Copy `reader` into `file`, hashing on the way; returns the hex SHA256
    fn stream(
        &self,
        reader: &mut dyn Read,
        file: &mut File,
        size: Option<u64>,
        pb: &ProgressBar,
    ) -> Result<String> {
        use std::io::Seek;

        file.rewind()?;
        if let Some(size) = size {
            pb.set_length(size);
        }

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        let mut written: u64 = 0;

        loop {
            self.check_cancelled()?;
            let n = reader
                .read(&mut buffer)
                .map_err(|e| Error::IoError(format!("Failed to read archive data: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            hasher.update(&buffer[..n]);
            written += n as u64;
            pb.set_position(written);
        }

        file.flush()?;
        Ok(hex::encode(hasher.finalize()))
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, requests: &[ArchiveRequest]) -> Result<Vec<PathBuf>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        fs::create_dir_all(&self.archives_dir)?;

        let total: u64 = requests.iter().filter_map(|r| r.size).sum();
        info!(
            "Fetching {} archives ({:.2} MB) into {}",
            requests.len(),
            total as f64 / 1_048_576.0,
            self.archives_dir.display()
        );

        let multi = MultiProgress::new();
        let bars: Vec<ProgressBar> = requests
            .iter()
            .map(|r| {
                if self.show_progress {
                    multi.add(create_progress_bar(r.size, &r.package.package))
                } else {
                    ProgressBar::hidden()
                }
            })
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| Error::FetchFailed(format!("Failed to start download pool: {e}")))?;

        let results: Vec<Result<PathBuf>> = pool.install(|| {
            requests
                .par_iter()
                .zip(bars.par_iter())
                .map(|(request, pb)| {
                    let result = self.fetch_one(request, pb);
                    if let Err(ref e) = result {
                        pb.abandon_with_message(format!("{} failed: {}", request.package, e));
                    }
                    result
                })
                .collect()
        });

        let mut paths = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(path) => paths.push(path),
                Err(Error::FetchCancelled) => return Err(Error::FetchCancelled),
                Err(e) => failures.push(format!("{}: {}", request.package, e)),
            }
        }

        if !failures.is_empty() {
            return Err(Error::FetchFailed(failures.join("; ")));
        }
        info!("Fetched {} archives", paths.len());
        Ok(paths)
    }
}
