mod config;
mod crawler;
mod fetch;
mod limiter;
mod scope;
mod scrapable;

pub use config::{CrawlerConfig, OnError, Throttle};
pub use crawler::{crawl_site, CrawlStats};
pub use fetch::{Fetch, FetchError, FetchFuture, HttpFetcher, MemoryFetcher};
pub use limiter::DomainLimiter;
pub use scope::DomainScope;
pub use scrapable::{CountedTx, CrawlTask, Scrapable, ScrapingContext};

pub use anyhow;
pub use url;
