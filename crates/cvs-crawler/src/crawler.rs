use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Error, Result};
use futures::{future, try_join, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, timeout};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::{CrawlerConfig, OnError};
use crate::fetch::Fetch;
use crate::limiter::DomainLimiter;
use crate::scope::DomainScope;
use crate::scrapable::{CountedTx, CrawlTask, Scrapable, ScrapingContext};

const IDLE_POLL: Duration = Duration::from_millis(200);

/// Counters of a finished crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Tasks accepted by the domain scope, seeds included
    pub scheduled: usize,
    /// Pages downloaded and handed to the scraper
    pub scraped: usize,
    /// Pages that couldn't be downloaded
    pub failed: usize,
}

#[derive(Debug)]
struct Page<S> {
    body: String,
    task: CrawlTask<S>,
}

async fn download<S: std::fmt::Debug>(
    fetcher: &dyn Fetch,
    limiter: Option<&DomainLimiter>,
    on_request: fn(&CrawlTask<S>),
    task: CrawlTask<S>,
) -> Result<Page<S>> {
    if let Some(limiter) = limiter {
        limiter.acquire(&task.url).await;
    }
    on_request(&task);
    log::debug!("Downloading {:?} {}", task.stage, task.url);
    let body = fetcher.fetch(&task.url).await?;
    Ok(Page { body, task })
}

fn until_err<T, E>(
    err: &mut &mut Result<(), E>,
    item: Result<T, E>,
) -> impl Future<Output = Option<T>> {
    match item {
        Ok(item) => future::ready(Some(item)),
        Err(e) => {
            **err = Err(e);
            future::ready(None)
        }
    }
}

pub async fn crawl_site<T>(
    crawler_conf: &CrawlerConfig,
    scraper_conf: &T::Config,
    fetcher: Arc<dyn Fetch>,
) -> Result<CrawlStats>
where
    T: Scrapable,
{
    let pages_in = Arc::new(AtomicUsize::new(0));
    let pages_out = Arc::new(AtomicUsize::new(0));
    let pages_failed = Arc::new(AtomicUsize::new(0));

    let (tx_stop, rx_stop) = crossbeam_channel::unbounded::<()>();
    let (tx_url, rx_url) = mpsc::unbounded_channel::<CrawlTask<T::Stage>>();
    let (tx_page, rx_page) =
        crossbeam_channel::bounded::<Page<T::Stage>>(crawler_conf.page_buffer.max(1));

    let scope = Arc::new(DomainScope::new(&crawler_conf.allowed_domains));
    let tx_url = CountedTx::new(tx_url, pages_in.clone(), scope);

    // Workers

    let num_workers = crawler_conf.num_workers.max(1);
    let mut workers = vec![];
    for id in 0..num_workers {
        let rx_stop = rx_stop.clone();
        let rx_page = rx_page.clone();
        let tx_url = tx_url.clone();
        let pages_out = pages_out.clone();
        let scraper_conf = scraper_conf.clone();
        let on_scrap_error = crawler_conf.on_scrap_error;
        let worker = thread::Builder::new()
            .name(format!("scraper-{id}"))
            .spawn(move || {
                let mut scraper = <T as Scrapable>::new(&scraper_conf)?;
                scraper.init(tx_url);
                loop {
                    crossbeam_channel::select! {
                        recv(rx_page) -> page => {
                            if let Ok(Page { body, task }) = page {
                                let url = task.url.clone();
                                match scraper.scrap(body, ScrapingContext::new(task)) {
                                    Ok(()) => (),
                                    Err(e) => match on_scrap_error {
                                        OnError::SkipAndLog => {
                                            log::error!("Skipping scrap for page {url} got: {e}");
                                        }
                                        OnError::Fail => {
                                            pages_out.fetch_add(1, Ordering::SeqCst);
                                            return Err(e.context(format!("Couldn't scrap {url}")));
                                        }
                                    },
                                }
                                pages_out.fetch_add(1, Ordering::SeqCst);
                            } else {
                                break
                            }
                        },
                        recv(rx_stop) -> _ => break
                    }
                }
                Ok::<(), Error>(())
            })?;
        workers.push(worker);
    }
    let workers = async move {
        tokio::task::spawn_blocking(|| {
            for w in workers {
                w.join().map_err(|_| anyhow!("Scraper thread panicked"))??;
            }
            Ok::<(), Error>(())
        })
        .await?
    };

    // Downloader

    let limiter = DomainLimiter::from_throttle(crawler_conf.throttle.as_ref());
    let concurrency = crawler_conf
        .throttle
        .map(|t| t.concurrency(crawler_conf.concurrent_downloads))
        .unwrap_or(crawler_conf.concurrent_downloads)
        .max(1);
    let pages_in_c = pages_in.clone();
    let pages_failed_c = pages_failed.clone();
    let on_dl_error = crawler_conf.on_dl_error;
    let on_request: fn(&CrawlTask<T::Stage>) = <T as Scrapable>::on_request;
    let downloader = async move {
        let stream = UnboundedReceiverStream::new(rx_url)
            .map(|task| {
                let fetcher = fetcher.clone();
                let limiter = limiter.clone();
                let pages_in = pages_in_c.clone();
                let pages_failed = pages_failed_c.clone();
                async move {
                    download(fetcher.as_ref(), limiter.as_ref(), on_request, task)
                        .await
                        .map_err(|e| {
                            pages_failed.fetch_add(1, Ordering::SeqCst);
                            pages_in.fetch_sub(1, Ordering::SeqCst);
                            e
                        })
                }
            })
            .buffer_unordered(concurrency);

        match on_dl_error {
            OnError::Fail => {
                let mut err = Ok::<(), Error>(());
                stream
                    .scan(&mut err, until_err)
                    .map(|page| tx_page.send(page).ok())
                    .collect::<Vec<_>>()
                    .await;
                err
            }
            OnError::SkipAndLog => {
                stream
                    .filter_map(
                        |dl| async move { dl.map_err(|e| log::warn!("Skipping URL: {e}")).ok() },
                    )
                    .map(|page| tx_page.send(page).ok())
                    .collect::<Vec<_>>()
                    .await;

                Ok(())
            }
        }
    };

    // Seeds

    let scraper = <T as Scrapable>::new(scraper_conf)?;
    for task in scraper.seed() {
        let url = task.url.clone();
        if !tx_url.send(task) {
            log::warn!("Seed {url} is outside of the allowed domains");
        }
    }
    drop(tx_url);
    drop(scraper);

    // Run all tasks

    let handle_sigint = crawler_conf.handle_sigint;
    let pages_in_c = pages_in.clone();
    let pages_out_c = pages_out.clone();
    let done: Pin<Box<dyn Future<Output = Result<()>>>> = Box::pin(async move {
        loop {
            if handle_sigint {
                match timeout(IDLE_POLL, tokio::signal::ctrl_c()).await {
                    Ok(Ok(())) => return Err(anyhow!("Interrupted")),
                    Ok(Err(e)) => return Err(anyhow!("Couldn't listen for SIGINT: {e}")),
                    Err(_) => (),
                }
            } else {
                time::sleep(IDLE_POLL).await;
            }
            let out = pages_out_c.load(Ordering::SeqCst);
            if out == pages_in_c.load(Ordering::SeqCst) {
                for _ in 0..num_workers {
                    tx_stop.send(()).ok();
                }
                return Ok(());
            }
        }
    });

    let res = try_join!(workers, downloader, done);
    <T as Scrapable>::new(scraper_conf)?.finalizer();
    res?;

    let failed = pages_failed.load(Ordering::SeqCst);
    Ok(CrawlStats {
        scheduled: pages_in.load(Ordering::SeqCst) + failed,
        scraped: pages_out.load(Ordering::SeqCst),
        failed,
    })
}
