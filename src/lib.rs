use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use cvs_crawler::{crawl_site, CrawlStats, CrawlerConfig, DomainScope, Fetch};
use select::document::Document;
use url::Url;

pub mod extract;
pub mod locator;
pub mod output;

pub use locator::{
    default_crawler_config, Stage, StoreLocator, StoreLocatorConfig, Topology, ALLOWED_DOMAINS,
    BASE_SEARCH_URL, DEFAULT_MAX_DEPTH,
};
pub use output::{AddressRecord, CsvOutput, FileNaming, RecordSink};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: Url,
    pub topology: Topology,
    /// Depth past which listing links are no longer followed
    pub max_depth: usize,
    pub naming: FileNaming,
    pub output_dir: PathBuf,
    /// Date used in the file name, today when unset
    pub date: Option<NaiveDate>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(BASE_SEARCH_URL).expect("Invalid base search URL"),
            topology: Topology::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            naming: FileNaming::default(),
            output_dir: PathBuf::from("."),
            date: None,
        }
    }
}

impl RunConfig {
    pub fn output_path(&self) -> PathBuf {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        self.output_dir.join(self.naming.file_name(date))
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub path: PathBuf,
    pub records: usize,
    pub stats: CrawlStats,
}

/// Crawls the store locator and writes every store address found to a
/// dated csv file.
///
/// The file is created before anything is fetched, failing to create it
/// aborts the run.
pub async fn run(
    config: &RunConfig,
    crawler_conf: &CrawlerConfig,
    fetcher: Arc<dyn Fetch>,
) -> Result<RunSummary> {
    let output = CsvOutput::create(config.output_path())?;
    log::info!("Writing store addresses to {}", output.path().display());

    let scraper_conf = StoreLocatorConfig {
        base_url: config.base_url.clone(),
        topology: config.topology,
        max_depth: config.max_depth,
        sink: output.sink(),
    };
    let crawled = crawl_site::<StoreLocator>(crawler_conf, &scraper_conf, fetcher).await;

    let path = output.path().to_path_buf();
    let records = output.finish()?;
    let stats = crawled?;

    if stats.scraped == 0 {
        log::warn!("Couldn't visit {}, no store was found", config.base_url);
    }
    log::info!(
        "Crawled {} page(s) ({} failed), wrote {records} address(es)",
        stats.scraped,
        stats.failed
    );

    Ok(RunSummary {
        path,
        records,
        stats,
    })
}

/// What the locator rules find on a single page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReport {
    /// Listing links, with whether they are inside the allowed domains
    pub links: Vec<(Url, bool)>,
    pub addresses: Vec<String>,
}

pub fn scrap_page(page: &str, page_url: &Url, scope: &DomainScope) -> PageReport {
    let document = Document::from(page);
    let links = extract::listing_links(&document, page_url)
        .into_iter()
        .map(|url| {
            let allowed = scope.allows(&url);
            (url, allowed)
        })
        .collect();
    PageReport {
        links,
        addresses: extract::store_addresses(&document),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_path() {
        let config = RunConfig {
            output_dir: PathBuf::from("/tmp/out"),
            date: NaiveDate::from_ymd_opt(2023, 11, 2),
            ..Default::default()
        };
        assert_eq!(
            config.output_path(),
            PathBuf::from("/tmp/out/cvs-store-locations-2023-11-02.csv")
        );
    }

    #[test]
    fn report_marks_out_of_scope_links() {
        let html = r#"
<div class="states"><ul>
  <li><a href="/store-locator/ny">NY</a></li>
  <li><a href="https://www.example.com/ny">Elsewhere</a></li>
</ul></div>
<p class="store-address"> 1 Broadway, New York, NY </p>"#;
        let page_url = Url::parse(BASE_SEARCH_URL).unwrap();
        let report = scrap_page(html, &page_url, &DomainScope::new(ALLOWED_DOMAINS));

        assert_eq!(
            report.links,
            vec![
                (
                    Url::parse("https://www.cvs.com/store-locator/ny").unwrap(),
                    true
                ),
                (Url::parse("https://www.example.com/ny").unwrap(), false),
            ]
        );
        assert_eq!(report.addresses, vec!["1 Broadway, New York, NY"]);
    }
}
