use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use cvs_crawler::{CrawlerConfig, DomainScope, HttpFetcher, OnError};
use cvs_locations::{
    default_crawler_config, run, scrap_page, FileNaming, RunConfig, Topology, BASE_SEARCH_URL,
};
use env_logger::Env;
use serde_yaml::Value;
use tokio::runtime;
use url::Url;

/// CVS store locator crawler
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<SubCommand>,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "crawl")]
    Crawl(CrawlArgs),
    #[command(name = "scrap")]
    Scrap(ScrapArgs),
    #[command(hide = true)]
    Completion,
}

/// Crawl the store locator and write store addresses to a dated csv file
#[derive(Debug, Default, clap::Args)]
pub struct CrawlArgs {
    /// Page listing the states
    #[arg(long, default_value = BASE_SEARCH_URL)]
    pub base_url: Option<Url>,
    /// Directory where the csv file is created
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,
    /// How listing links are followed
    #[arg(value_enum, long)]
    pub topology: Option<Topology>,
    /// Depth past which listing links are no longer followed
    #[arg(long)]
    pub max_depth: Option<usize>,
    /// Output file naming convention
    #[arg(value_enum, long)]
    pub naming: Option<FileNaming>,
    /// Optional crawler yaml configuration file
    #[arg(env = "CVS_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override crawler's maximum concurrent page downloads
    #[arg(long)]
    pub concurrent_downloads: Option<usize>,
    /// Override crawler's number of CPU workers used to parse pages
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// No SIGINT handling
    #[arg(long)]
    pub no_sigint: bool,
    /// Override crawler's download error handling strategy
    #[arg(value_enum, long)]
    pub on_dl_error: Option<OnError>,
    /// Override crawler's scrap error handling strategy
    #[arg(value_enum, long)]
    pub on_scrap_error: Option<OnError>,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

/// Reads a yaml crawler configuration, keys it leaves out keep the values of
/// [`default_crawler_config`].
fn layered_crawler_config<R: Read>(reader: R) -> anyhow::Result<CrawlerConfig> {
    let mut conf = serde_yaml::to_value(default_crawler_config())?;
    let file: Value = serde_yaml::from_reader(reader)?;
    match (&mut conf, file) {
        (Value::Mapping(conf), Value::Mapping(file)) => {
            for (key, value) in file {
                conf.insert(key, value);
            }
        }
        (_, Value::Null) => (),
        (_, other) => anyhow::bail!("Crawler config should be a mapping, got: {other:?}"),
    }
    Ok(serde_yaml::from_value(conf)?)
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(File::open) {
            layered_crawler_config(file?)?
        } else {
            default_crawler_config()
        };
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(concurrent_downloads) = args.concurrent_downloads {
            conf.concurrent_downloads = concurrent_downloads;
        }
        if let Some(num_workers) = args.num_workers {
            conf.num_workers = num_workers;
        }
        if let Some(on_dl_error) = args.on_dl_error {
            conf.on_dl_error = on_dl_error;
        }
        if let Some(on_scrap_error) = args.on_scrap_error {
            conf.on_scrap_error = on_scrap_error;
        }
        if args.no_sigint {
            conf.handle_sigint = false;
        }
        Ok(conf)
    }
}

impl From<&CrawlArgs> for RunConfig {
    fn from(args: &CrawlArgs) -> Self {
        let mut conf = RunConfig::default();
        if let Some(base_url) = &args.base_url {
            conf.base_url = base_url.clone();
        }
        if let Some(output_dir) = &args.output_dir {
            conf.output_dir = output_dir.clone();
        }
        if let Some(topology) = args.topology {
            conf.topology = topology;
        }
        if let Some(max_depth) = args.max_depth {
            conf.max_depth = max_depth;
        }
        if let Some(naming) = args.naming {
            conf.naming = naming;
        }
        conf
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let crawler_conf: CrawlerConfig = (&args).try_into()?;
    let run_conf = RunConfig::from(&args);
    let fetcher = Arc::new(HttpFetcher::new(&crawler_conf)?);
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let summary = rt.block_on(run(&run_conf, &crawler_conf, fetcher))?;
    println!(
        "Wrote {} store address(es) to {}",
        summary.records,
        summary.path.display()
    );
    Ok(())
}

/// Apply the locator rules to a single page and print what they find
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("page").required(true))]
pub struct ScrapArgs {
    /// A local html page to scrap
    #[arg(group = "page", long)]
    pub file: Option<PathBuf>,
    /// A distant html page to scrap
    #[arg(group = "page", long)]
    pub url: Option<Url>,
    /// Url relative links of a local page are resolved against
    #[arg(long, default_value = BASE_SEARCH_URL, conflicts_with = "url")]
    pub base_url: Url,
    /// Custom user agent to download the page
    #[arg(long, conflicts_with = "file")]
    pub ua: Option<String>,
}

pub fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let (page, page_url) = if let Some(url) = args.url {
        let mut builder = reqwest::blocking::ClientBuilder::new();
        if let Some(ua) = args.ua {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;
        let page = client.get(url.clone()).send()?.error_for_status()?.text()?;
        (page, url)
    } else if let Some(path) = args.file {
        (fs::read_to_string(path)?, args.base_url)
    } else {
        anyhow::bail!("Missing `url` or `file`");
    };

    let scope = DomainScope::new(&default_crawler_config().allowed_domains);
    let report = scrap_page(&page, &page_url, &scope);
    for (link, allowed) in &report.links {
        let mark = if *allowed { "follow" } else { "skip" };
        println!("{mark}\t{link}");
    }
    for address in &report.addresses {
        println!("address\t{address}");
    }
    Ok(())
}

fn init_logger(filters: &str) {
    env_logger::Builder::from_env(Env::default().default_filter_or(filters)).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        None => {
            init_logger("cvs_crawler=warn,cvs_locations=info");
            crawl(CrawlArgs::default())
        }
        Some(SubCommand::Crawl(args)) => {
            if !args.quiet {
                init_logger("cvs_crawler=warn,cvs_locations=info");
            }
            crawl(args)
        }
        Some(SubCommand::Scrap(args)) => {
            init_logger("cvs_crawler=warn,cvs_locations=warn");
            scrap(args)
        }
        Some(SubCommand::Completion) => {
            generate(
                Shell::Bash,
                &mut Args::command(),
                "cvs-locations",
                &mut io::stdout(),
            );
            Ok(())
        }
    }
}
