use std::cmp;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_page_buffer")]
    pub page_buffer: usize,

    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    #[serde(default)]
    pub throttle: Option<Throttle>,

    /// Hostnames that may be fetched, any host when empty
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Request timeout in seconds, none by default
    #[serde(default)]
    pub timeout: Option<f64>,

    #[serde(default = "default_on_dl_error")]
    pub on_dl_error: OnError,

    #[serde(default = "default_on_scrap_error")]
    pub on_scrap_error: OnError,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            page_buffer: default_page_buffer(),
            concurrent_downloads: default_concurrent_downloads(),
            num_workers: default_num_workers(),
            throttle: None,
            allowed_domains: vec![],
            timeout: None,
            on_dl_error: default_on_dl_error(),
            on_scrap_error: default_on_scrap_error(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs_f64)
    }
}

fn default_user_agent() -> String {
    String::from("Mozilla/5.0 (X11; Linux x86_64; rv:78.0) Gecko/20100101 Firefox/78.0")
}

fn default_page_buffer() -> usize {
    10_000
}

fn default_concurrent_downloads() -> usize {
    100
}

fn default_num_workers() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_on_dl_error() -> OnError {
    OnError::SkipAndLog
}

fn default_on_scrap_error() -> OnError {
    OnError::SkipAndLog
}

fn default_handle_sigint() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Throttle {
    /// The maximum number of concurrent requests
    Concurrent { max: NonZeroUsize },
    /// The number of requests per second, per domain
    PerSecond { requests: NonZeroUsize },
    /// The delay in seconds between requests to a domain, plus a random jitter
    /// of up to `jitter` seconds
    Delay { delay: f64, jitter: f64 },
}

impl Throttle {
    /// Upper bound on in flight downloads
    pub fn concurrency(&self, default: usize) -> usize {
        match self {
            Self::Concurrent { max } => max.get(),
            _ => default,
        }
    }

    /// Base spacing and jitter between two request starts on the same domain
    pub fn spacing(&self) -> Option<(Duration, Duration)> {
        match *self {
            Self::Concurrent { .. } => None,
            Self::PerSecond { requests } => Some((
                Duration::from_secs_f64(1.0 / requests.get() as f64),
                Duration::ZERO,
            )),
            Self::Delay { delay, jitter } => Some((
                Duration::from_secs_f64(delay.max(0.0)),
                Duration::from_secs_f64(jitter.max(0.0)),
            )),
        }
    }
}
