//! Blocking HTTP client for the mod database, with optional retries for transient failures.

use super::ModDbError;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://mods.vintagestory.at";
const DEFAULT_USER_AGENT: &str = concat!("modsupdater/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for get_with_retry (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429 (rate limit).
const BACKOFF_429_SECS: [u64; 3] = [5, 10, 20];

/// Blocking client bound to one mod database base URL.
#[derive(Debug)]
pub struct ModDbClient {
    inner: reqwest::blocking::Client,
    base_url: String,
    retry_count: u32,
    backoff_secs: Vec<u64>,
    show_progress: bool,
}

/// Removes a partially written download unless the transfer completed.
struct PartialFileGuard {
    path: PathBuf,
    keep: bool,
}

impl PartialFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} @ {binary_bytes_per_sec} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-")
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ModDbError {
    let path = path.to_path_buf();
    move |source| ModDbError::Io { path, source }
}

/// `<dest>.part`, next to the destination so the final rename stays on one filesystem.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl ModDbClient {
    /// Client for the public mod database with default settings.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> ModDbClientBuilder {
        ModDbClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET with retries on timeout, connection errors, HTTP 5xx and HTTP 429. Other failures,
    /// and the last attempt's result, are returned as they are.
    pub fn get_with_retry(&self, url: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        let mut attempt: u32 = 0;
        loop {
            let last_attempt = attempt + 1 >= self.retry_count;
            match self.inner.get(url).send() {
                Ok(response) => {
                    let status = response.status();
                    let rate_limited = status == reqwest::StatusCode::TOO_MANY_REQUESTS;
                    if (status.is_server_error() || rate_limited) && !last_attempt {
                        let backoff = if rate_limited {
                            BACKOFF_429_SECS
                                .get(attempt as usize)
                                .or(BACKOFF_429_SECS.last())
                                .copied()
                                .unwrap_or(5)
                        } else {
                            self.backoff(attempt)
                        };
                        warn!(%url, status = status.as_u16(), backoff, "retrying request");
                        std::thread::sleep(Duration::from_secs(backoff));
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if (e.is_timeout() || e.is_connect()) && !last_attempt {
                        let backoff = self.backoff(attempt);
                        warn!(%url, error = %e, backoff, "retrying request");
                        std::thread::sleep(Duration::from_secs(backoff));
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> u64 {
        self.backoff_secs
            .get(attempt as usize)
            .or(self.backoff_secs.last())
            .copied()
            .unwrap_or(1)
    }

    /// GET and require a success status.
    fn fetch(&self, url: &str) -> Result<reqwest::blocking::Response, ModDbError> {
        debug!(%url, "GET");
        let response = self.get_with_retry(url).map_err(|e| ModDbError::Network {
            url: url.to_string(),
            source: e,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ModDbError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Response body as text.
    pub fn fetch_text(&self, url: &str) -> Result<String, ModDbError> {
        self.fetch(url)?.text().map_err(|e| ModDbError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }

    /// Stream `url` into `dest` through a `.part` file renamed on success. Returns the byte count.
    pub fn download_to(&self, url: &str, dest: &Path) -> Result<u64, ModDbError> {
        let response = self.fetch(url)?;
        let part = part_path(dest);

        let mut guard = PartialFileGuard::new(part.clone());
        let file = File::create(&part).map_err(io_err(&part))?;
        let mut writer = BufWriter::new(file);

        let bar = match (self.show_progress, response.content_length()) {
            (true, Some(len)) => {
                let bar = ProgressBar::new(len);
                bar.set_style(download_style());
                bar
            }
            _ => ProgressBar::hidden(),
        };
        let mut reader = bar.wrap_read(response);
        // Body read failures surface here as io errors too.
        let written = std::io::copy(&mut reader, &mut writer).map_err(io_err(&part))?;
        writer.flush().map_err(io_err(&part))?;
        drop(writer);
        bar.finish_and_clear();

        std::fs::rename(&part, dest).map_err(io_err(dest))?;
        guard.keep();
        debug!(%url, file = %dest.display(), bytes = written, "downloaded");
        Ok(written)
    }
}

/// Builder for ModDbClient with optional base URL, User-Agent, timeout and retry settings.
#[derive(Debug)]
pub struct ModDbClientBuilder {
    base_url: String,
    user_agent: Option<String>,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
    show_progress: bool,
}

impl Default for ModDbClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
            show_progress: false,
        }
    }
}

impl ModDbClientBuilder {
    /// Point the client at another server, e.g. a local mock. A trailing slash is removed.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Number of HTTP attempts for transient failures (default 3, at least 1).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Backoff delays in seconds before each retry. If shorter than needed, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    /// Show a progress bar while downloading.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn build(self) -> Result<ModDbClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(ModDbClient {
            inner,
            base_url: self.base_url,
            retry_count: self.retry_count,
            backoff_secs: self.retry_backoff_secs,
            show_progress: self.show_progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_normalizes_settings() {
        let client = ModDbClient::builder()
            .base_url("http://localhost:1234/")
            .retry_count(0)
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234");
        assert_eq!(client.retry_count, 1);
        assert_eq!(ModDbClient::new().unwrap().base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn backoff_reuses_last_value() {
        let client = ModDbClient::builder()
            .retry_backoff_secs(vec![1, 3])
            .build()
            .unwrap();
        assert_eq!(client.backoff(0), 1);
        assert_eq!(client.backoff(1), 3);
        assert_eq!(client.backoff(7), 3);
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/mods/a_1.0.zip")),
            PathBuf::from("/mods/a_1.0.zip.part")
        );
    }

    #[test]
    fn partial_file_guard_removes_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("a.part");
        std::fs::write(&dropped, b"x").unwrap();
        drop(PartialFileGuard::new(dropped.clone()));
        assert!(!dropped.exists());

        let kept = dir.path().join("b.part");
        std::fs::write(&kept, b"x").unwrap();
        let mut guard = PartialFileGuard::new(kept.clone());
        guard.keep();
        drop(guard);
        assert!(kept.exists());
    }
}
