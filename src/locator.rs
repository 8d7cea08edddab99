use std::fmt;

use anyhow::{Context, Result};
use cvs_crawler::{CountedTx, CrawlTask, CrawlerConfig, Scrapable, ScrapingContext, Throttle};
use select::document::Document;
use url::Url;

use crate::extract::{listing_links, store_addresses};
use crate::output::{AddressRecord, RecordSink};

pub const BASE_SEARCH_URL: &str = "https://www.cvs.com/store-locator/cvs-pharmacy-locations";

pub const ALLOWED_DOMAINS: [&str; 2] = ["cvs.com", "www.cvs.com"];

/// Links found deeper than this are not followed. Store pages sit at depth 3
/// below the base search page.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Crawler settings used when no configuration file is given.
pub fn default_crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        allowed_domains: ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect(),
        throttle: Some(Throttle::Delay {
            delay: 1.0,
            jitter: 1.0,
        }),
        ..CrawlerConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    States,
    Towns,
    Stores,
}

impl Stage {
    pub fn next(self) -> Self {
        match self {
            Self::States => Self::Towns,
            Self::Towns | Self::Stores => Self::Stores,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::States => write!(f, "state"),
            Self::Towns => write!(f, "town"),
            Self::Stores => write!(f, "store"),
        }
    }
}

/// How listing links are followed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Topology {
    /// States, then towns, then stores: addresses are only read on store pages
    Staged,
    /// Every page follows listing links and reads addresses, down to the
    /// maximum depth
    #[default]
    Recursive,
}

impl Topology {
    pub fn follows_links(&self, stage: Stage) -> bool {
        match self {
            Self::Staged => stage != Stage::Stores,
            Self::Recursive => true,
        }
    }

    pub fn extracts_addresses(&self, stage: Stage) -> bool {
        match self {
            Self::Staged => stage == Stage::Stores,
            Self::Recursive => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreLocatorConfig {
    pub base_url: Url,
    pub topology: Topology,
    /// Pages at this depth don't follow links anymore
    pub max_depth: usize,
    pub sink: RecordSink,
}

pub struct StoreLocator {
    config: StoreLocatorConfig,
    tx_url: Option<CountedTx<Stage>>,
}

impl Scrapable for StoreLocator {
    type Config = StoreLocatorConfig;
    type Stage = Stage;

    fn new(config: &StoreLocatorConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            tx_url: None,
        })
    }

    fn init(&mut self, tx_url: CountedTx<Stage>) {
        self.tx_url = Some(tx_url);
    }

    fn seed(&self) -> Vec<CrawlTask<Stage>> {
        vec![CrawlTask::new(self.config.base_url.clone(), Stage::States)]
    }

    fn on_request(task: &CrawlTask<Stage>) {
        println!("Visiting {}: {}", task.stage, task.url);
    }

    fn scrap(&mut self, page: String, ctx: ScrapingContext<Stage>) -> Result<()> {
        let stage = *ctx.stage();
        let document = Document::from(page.as_str());
        let topology = self.config.topology;

        if topology.follows_links(stage) {
            if ctx.depth() < self.config.max_depth {
                let tx_url = self
                    .tx_url
                    .as_ref()
                    .context("Scraper used before being initialized")?;
                for url in listing_links(&document, ctx.url()) {
                    tx_url.send(ctx.child(url, stage.next()));
                }
            } else {
                log::info!(
                    "Not following links of {} past depth {}",
                    ctx.url(),
                    ctx.depth()
                );
            }
        }

        if topology.extracts_addresses(stage) {
            for address in store_addresses(&document) {
                println!("{address}");
                self.config.sink.send(AddressRecord { address });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_and_saturate() {
        assert_eq!(Stage::States.next(), Stage::Towns);
        assert_eq!(Stage::Towns.next(), Stage::Stores);
        assert_eq!(Stage::Stores.next(), Stage::Stores);
    }

    #[test]
    fn staged_topology() {
        let t = Topology::Staged;
        assert!(t.follows_links(Stage::States));
        assert!(t.follows_links(Stage::Towns));
        assert!(!t.follows_links(Stage::Stores));
        assert!(!t.extracts_addresses(Stage::States));
        assert!(!t.extracts_addresses(Stage::Towns));
        assert!(t.extracts_addresses(Stage::Stores));
    }

    #[test]
    fn recursive_topology() {
        let t = Topology::Recursive;
        for stage in [Stage::States, Stage::Towns, Stage::Stores] {
            assert!(t.follows_links(stage));
            assert!(t.extracts_addresses(stage));
        }
    }

    #[test]
    fn default_crawler_is_polite() {
        let conf = default_crawler_config();
        assert_eq!(conf.allowed_domains, vec!["cvs.com", "www.cvs.com"]);
        assert_eq!(
            conf.throttle,
            Some(Throttle::Delay {
                delay: 1.0,
                jitter: 1.0
            })
        );
    }
}
