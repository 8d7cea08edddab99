use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use crate::scope::DomainScope;

pub trait Scrapable {
    type Config: Clone + Send + 'static;

    /// Tags each task with the level of the site it belongs to
    type Stage: Clone + fmt::Debug + Send + 'static;

    fn new(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn init(&mut self, _tx_url: CountedTx<Self::Stage>) {}

    fn seed(&self) -> Vec<CrawlTask<Self::Stage>>;

    /// Called by the downloader right before a task is fetched, whether the
    /// download then succeeds or not
    fn on_request(_task: &CrawlTask<Self::Stage>)
    where
        Self: Sized,
    {
    }

    fn scrap(&mut self, page: String, ctx: ScrapingContext<Self::Stage>) -> anyhow::Result<()>;

    fn finalizer(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask<S> {
    pub url: Url,
    pub stage: S,
    /// Number of links followed from a seed, seeds are at depth 0
    pub depth: usize,
}

impl<S> CrawlTask<S> {
    pub fn new(url: Url, stage: S) -> Self {
        Self {
            url,
            stage,
            depth: 0,
        }
    }

    /// A task for a link found on this task's page
    pub fn child(&self, url: Url, stage: S) -> Self {
        Self {
            url,
            stage,
            depth: self.depth + 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapingContext<S> {
    task: Rc<CrawlTask<S>>,
}

impl<S> ScrapingContext<S> {
    pub fn new(task: CrawlTask<S>) -> Self {
        Self {
            task: Rc::new(task),
        }
    }

    pub fn url(&self) -> &Url {
        &self.task.url
    }

    pub fn stage(&self) -> &S {
        &self.task.stage
    }

    pub fn depth(&self) -> usize {
        self.task.depth
    }

    pub fn child(&self, url: Url, stage: S) -> CrawlTask<S> {
        self.task.child(url, stage)
    }
}

/// Sends tasks to the downloader, counting every accepted one.
///
/// Tasks whose url is outside of the crawler's domain scope are dropped
/// and not counted.
#[derive(Debug)]
pub struct CountedTx<S> {
    tx: mpsc::UnboundedSender<CrawlTask<S>>,
    counter: Arc<AtomicUsize>,
    scope: Arc<DomainScope>,
}

impl<S> Clone for CountedTx<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            counter: self.counter.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<S: fmt::Debug> CountedTx<S> {
    pub fn new(
        tx: mpsc::UnboundedSender<CrawlTask<S>>,
        counter: Arc<AtomicUsize>,
        scope: Arc<DomainScope>,
    ) -> Self {
        Self { tx, counter, scope }
    }

    pub fn send(&self, task: CrawlTask<S>) -> bool {
        if !self.scope.allows(&task.url) {
            log::debug!("Skipping out of scope URL: {}", task.url);
            return false;
        }
        // Counted first so the crawl can't be seen as done while in flight
        self.counter.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(task) {
            Ok(()) => true,
            Err(e) => {
                self.counter.fetch_sub(1, Ordering::SeqCst);
                log::error!("Couldn't send task: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accepted_tasks_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let counter = Arc::new(AtomicUsize::new(0));
        let scope = Arc::new(DomainScope::new(["www.cvs.com"]));
        let tx = CountedTx::new(tx, counter.clone(), scope);

        let inside = Url::parse("https://www.cvs.com/store-locator/ny").unwrap();
        let outside = Url::parse("https://www.example.com/").unwrap();
        assert!(tx.send(CrawlTask::new(inside.clone(), 1)));
        assert!(!tx.send(CrawlTask::new(outside, 1)));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_recv().unwrap().url, inside);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn children_are_one_level_deeper() {
        let seed = CrawlTask::new(Url::parse("https://www.cvs.com/").unwrap(), "state");
        assert_eq!(seed.depth, 0);

        let ctx = ScrapingContext::new(seed);
        let town = ctx.child(Url::parse("https://www.cvs.com/ny").unwrap(), "town");
        assert_eq!(town.depth, 1);
        assert_eq!(town.stage, "town");

        let store = town.child(Url::parse("https://www.cvs.com/ny/a").unwrap(), "store");
        assert_eq!(store.depth, 2);
        assert_eq!(ScrapingContext::new(store).depth(), 2);
    }

    #[test]
    fn closed_channel_is_not_counted() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let counter = Arc::new(AtomicUsize::new(0));
        let tx = CountedTx::new(tx, counter.clone(), Arc::new(DomainScope::default()));
        let url = Url::parse("https://www.cvs.com/").unwrap();
        assert!(!tx.send(CrawlTask::new(url, ())));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
