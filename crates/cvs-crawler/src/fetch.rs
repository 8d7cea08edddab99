use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use url::Url;

use crate::config::CrawlerConfig;

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{url} answered {status}")]
    Status { url: Url, status: StatusCode },
    #[error("couldn't download {url}: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("no page for {0}")]
    NotFound(Url),
}

/// Downloads the html of a page.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::ClientBuilder::new().gzip(true).deflate(true);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            user_agent: config.user_agent.clone(),
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        Box::pin(async move {
            let transport = |source| FetchError::Transport {
                url: url.clone(),
                source,
            };

            let resp = self
                .client
                .get(url.clone())
                .header(USER_AGENT, &self.user_agent)
                .send()
                .await
                .map_err(transport)?;

            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.clone(),
                    status,
                });
            }

            resp.text().await.map_err(transport)
        })
    }
}

/// Serves pages from memory, keyed by absolute url.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    pages: HashMap<String, String>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.insert(url, html);
        self
    }

    pub fn insert(&mut self, url: &str, html: impl Into<String>) {
        let key = Url::parse(url)
            .map(String::from)
            .unwrap_or_else(|_| url.to_string());
        self.pages.insert(key, html.into());
    }
}

impl Fetch for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        let page = self
            .pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.clone()));
        Box::pin(async move { page })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_fetcher_normalizes_keys() {
        let fetcher = MemoryFetcher::new().with_page("https://www.cvs.com", "<html></html>");
        let url = Url::parse("https://www.cvs.com/").unwrap();
        assert_eq!(fetcher.fetch(&url).await.unwrap(), "<html></html>");
    }

    #[tokio::test]
    async fn memory_fetcher_misses() {
        let fetcher = MemoryFetcher::new();
        let url = Url::parse("https://www.cvs.com/nowhere").unwrap();
        match fetcher.fetch(&url).await {
            Err(FetchError::NotFound(u)) => assert_eq!(u, url),
            other => panic!("unexpected {other:?}"),
        }
    }
}
