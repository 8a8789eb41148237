//! Listing-Harvester main entry point
//!
//! This is the command-line interface for the listing harvester.

use anyhow::bail;
use clap::Parser;
use listing_harvester::browser::{
    build_http_client, ExtractorRegistry, PageEnvironment, TabHost, TracingProgressSink,
};
use listing_harvester::config::{load_config_with_hash, Config, ScraperConfig};
use listing_harvester::messaging::{
    ControlMessage, ControlReply, MessageBus, PanelEvent, ScrapeRequest, SendOptions,
};
use listing_harvester::output::{print_report, print_result_detail, print_results};
use listing_harvester::scrape::{Controller, ControllerHandle, Orchestrator, PageNavigator};
use listing_harvester::storage::{open_storage, ResultStore};
use listing_harvester::url::{find_scrapers_for_url, Pagination};
use listing_harvester::{HarvestError, ScrapeMode, StateStore, UrlError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;
use url::Url;

const PANEL_CHANNEL: usize = 64;

/// Listing-Harvester: paginated listing scraper
///
/// Walks the pages of a configured listing site one at a time, extracts the
/// listed items with per-site CSS selectors and saves them to SQLite.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version)]
#[command(about = "Paginated listing scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Listing page to start from
    #[arg(long)]
    url: Option<String>,

    /// Scraper id (defaults to the first scraper whose domain matches the URL)
    #[arg(long)]
    scraper: Option<String>,

    /// Scrape only the given page ("current") or every page ("all")
    #[arg(long, default_value = "all", value_parser = parse_mode)]
    mode: ScrapeMode,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be scraped without scraping
    #[arg(long, conflicts_with_all = ["results", "show"])]
    dry_run: bool,

    /// List saved results and exit
    #[arg(long, conflicts_with_all = ["dry_run", "show"])]
    results: bool,

    /// Print the items of one saved result and exit
    #[arg(long, value_name = "ID", conflicts_with_all = ["dry_run", "results"])]
    show: Option<String>,
}

fn parse_mode(s: &str) -> Result<ScrapeMode, String> {
    ScrapeMode::from_str_opt(s)
        .ok_or_else(|| format!("unknown mode '{}', expected current or all", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, cli.url.as_deref(), cli.scraper.as_deref())?;
    } else if cli.results {
        handle_results(&config)?;
    } else if let Some(id) = &cli.show {
        handle_show(&config, id)?;
    } else {
        let Some(url) = cli.url.clone() else {
            bail!("--url is required to start a scrape");
        };
        handle_scrape(config, url, cli.scraper.as_deref(), cli.mode).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_harvester=info,harvest=info,warn"),
            1 => EnvFilter::new("listing_harvester=debug,harvest=debug,info"),
            2 => EnvFilter::new("listing_harvester=trace,harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Picks the scraper named on the command line or the first one matching `url`
fn resolve_scraper<'a>(
    config: &'a Config,
    url: &str,
    requested: Option<&str>,
) -> listing_harvester::Result<&'a ScraperConfig> {
    Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;

    match requested {
        Some(id) => config
            .scraper(id)
            .ok_or_else(|| HarvestError::UnknownScraper(id.to_string())),
        None => find_scrapers_for_url(&config.scrapers, url)
            .into_iter()
            .next()
            .ok_or_else(|| UrlError::NoScraper(url.to_string()).into()),
    }
}

/// Handles the --dry-run mode: validates config and shows what would be scraped
fn handle_dry_run(config: &Config, url: Option<&str>, scraper: Option<&str>) -> anyhow::Result<()> {
    println!("=== Listing-Harvester Dry Run ===\n");

    println!("Orchestrator:");
    println!("  Dwell time per page: {}ms", config.orchestrator.dwell_ms);
    println!(
        "  Extraction attempts: {} ({}ms apart, {}ms timeout)",
        config.orchestrator.max_extract_attempts,
        config.orchestrator.extract_retry_delay_ms,
        config.orchestrator.extract_timeout_ms
    );

    println!("\nNavigation:");
    println!("  Page load timeout: {}ms", config.navigation.page_load_timeout_ms);
    println!("  Settle delay: {}ms", config.navigation.settle_delay_ms);

    println!("\nFetch:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  HTTPS only: {}", config.fetch.https_only);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nScrapers ({}):", config.scrapers.len());
    for entry in &config.scrapers {
        println!("  - {} ({}) on {}", entry.id, entry.name, entry.domain);
        println!(
            "    items: {} / page parameter: {} from {}",
            entry.item_selector, entry.page_param, entry.first_page
        );
        for field in &entry.fields {
            match &field.attribute {
                Some(attribute) => {
                    println!("    * {} <- {} @{}", field.name, field.selector, attribute)
                }
                None => println!("    * {} <- {}", field.name, field.selector),
            }
        }
    }

    println!("\n✓ Configuration is valid");

    if let Some(url) = url {
        let scraper = resolve_scraper(config, url, scraper)?;
        let pagination = Pagination::from(scraper);
        println!(
            "✓ Would scrape {} with '{}' starting at {}",
            url,
            scraper.id,
            pagination.normalize_start_url(url)
        );
    }

    Ok(())
}

/// Handles the --results mode: lists saved results
fn handle_results(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_storage(Path::new(&config.output.database_path))?;
    print_results(&store.list()?);

    Ok(())
}

/// Handles the --show mode: prints one saved result
fn handle_show(config: &Config, id: &str) -> anyhow::Result<()> {
    let store = open_storage(Path::new(&config.output.database_path))?;
    print_result_detail(&store.get(id)?);

    Ok(())
}

/// Handles the main scrape operation
async fn handle_scrape(
    config: Config,
    url: String,
    scraper: Option<&str>,
    mode: ScrapeMode,
) -> anyhow::Result<()> {
    let scraper = resolve_scraper(&config, &url, scraper)?.clone();
    tracing::info!("Using scraper '{}' ({}) in {} mode", scraper.id, scraper.name, mode);

    let config = Arc::new(config);
    let results: Arc<dyn ResultStore> =
        Arc::new(open_storage(Path::new(&config.output.database_path))?);
    let state = StateStore::in_memory();
    let (panel, mut events) = broadcast::channel(PANEL_CHANNEL);
    let (controller_handle, inbox) = ControllerHandle::channel();
    let defaults = SendOptions::from(&config.messaging);

    // page side
    let page_bus = MessageBus::builder()
        .background(Arc::new(controller_handle.clone()))
        .defaults(defaults.clone())
        .build();
    let env = PageEnvironment {
        extractors: Arc::new(ExtractorRegistry::from_config(&config)?),
        sink: Arc::new(TracingProgressSink::new()),
        state: state.clone(),
        bus: page_bus,
    };
    let host = TabHost::new(build_http_client(&config.fetch)?, env);

    // controller side
    let bus = MessageBus::builder()
        .tabs(Arc::new(host.clone()))
        .panel(panel)
        .defaults(defaults.clone())
        .build();
    let orchestrator = Orchestrator::new(
        Arc::new(host.clone()),
        bus.clone(),
        state,
        results,
        Arc::clone(&config),
    );
    let controller = Controller::with_inbox(Arc::new(orchestrator), inbox);
    let controller_task = tokio::spawn(controller.run());

    let tab_id = host.open_tab().await;
    if mode == ScrapeMode::Current {
        // single-page mode scrapes whatever the tab shows
        let navigator = PageNavigator::new(
            Arc::new(host.clone()),
            Pagination::from(&scraper),
            &config.navigation,
        );
        navigator.navigate_to_page(tab_id, &url).await?;
    }

    let cli_bus = MessageBus::builder()
        .background(Arc::new(controller_handle))
        .defaults(defaults.clone())
        .build();
    let request = ScrapeRequest {
        tab_id,
        scraper_id: scraper.id.clone(),
        mode,
        base_url: url,
    };
    match cli_bus
        .send_to_background(ControlMessage::StartScrape(request), &defaults)
        .await?
    {
        ControlReply::Started => tracing::info!("Scrape started on tab {}", tab_id),
        ControlReply::Rejected(reason) => return Err(HarvestError::Rejected(reason).into()),
        other => bail!("unexpected reply to start request: {:?}", other),
    }

    let mut listen_for_interrupt = true;
    let mut stop_accepted = false;
    let report = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if listen_for_interrupt => {
                if let Err(e) = signal {
                    tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                    listen_for_interrupt = false;
                    continue;
                }
                if stop_accepted {
                    bail!("interrupted again, not waiting for the session to stop");
                }

                tracing::info!("Interrupted, stopping after the current page");
                let stop = ControlMessage::StopScrape { tab_id };
                match cli_bus.send_to_background(stop, &defaults).await {
                    Ok(ControlReply::Stopping) => stop_accepted = true,
                    Ok(reply) => tracing::warn!("Stop not accepted: {:?}", reply),
                    Err(e) => tracing::warn!("Failed to request stop: {}", e),
                }
            }
            event = events.recv() => match event {
                Ok(PanelEvent::ScrapeComplete(report)) if report.tab_id == tab_id => break report,
                Ok(PanelEvent::ScrapeProgress { progress, .. }) => {
                    tracing::debug!(
                        "Progress: page {} of {}, {} items",
                        progress.current_page + 1,
                        progress
                            .total_pages
                            .map(|total| total.to_string())
                            .unwrap_or_else(|| "?".to_string()),
                        progress.items_collected
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Panel listener lagged by {} events", skipped);
                }
                Err(RecvError::Closed) => bail!("panel channel closed before the session ended"),
            }
        }
    };

    let stats = bus.stats();
    tracing::debug!(
        "Messages: {} sent, {} failed, {:?} average latency, {} dead letters",
        stats.sent,
        stats.failed,
        stats.avg_latency(),
        bus.dead_letters().len()
    );

    controller_task.abort();
    print_report(&report);

    Ok(())
}
