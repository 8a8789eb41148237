//! Integration tests for the scraping pipeline
//!
//! These tests use wiremock to serve a paginated listing site and drive a
//! whole session through the HTTP tab host, the page contexts, the selector
//! extractor and the SQLite result store.

use listing_harvester::browser::{
    build_http_client, ExtractorRegistry, PageEnvironment, TabHost, TracingProgressSink,
};
use listing_harvester::config::parse_config;
use listing_harvester::messaging::{
    ControlMessage, ControlReply, MessageBus, PanelEvent, ScrapeRequest, SendOptions,
};
use listing_harvester::scrape::{Controller, ControllerHandle, Orchestrator, SessionReport};
use listing_harvester::storage::{ResultStore, SqliteResultStore};
use listing_harvester::{ScrapeMode, SessionStatus, StateStore, TabId};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGES: u32 = 3;

/// Renders one listing page with five items
fn listing_page(page: u32) -> String {
    let items: String = (0..5)
        .map(|i| {
            format!(
                r#"<div class="item"><span class="id">p{page}-{i}</span>{name}</div>"#,
                name = format!(r#"<span class="name">Product {page}.{i}</span>"#)
            )
        })
        .collect();
    let next = if page + 1 < PAGES {
        format!(r#"<a class="next" href="/list?pagenum={}">Next</a>"#, page + 1)
    } else {
        String::new()
    };

    format!(
        r#"<html><head><title>Listing page {}</title></head>
<body><span class="total">Page {} of {}</span>{}{}</body></html>"#,
        page + 1,
        page + 1,
        PAGES,
        items,
        next
    )
}

async fn listing_site() -> MockServer {
    let server = MockServer::start().await;
    for page in 0..PAGES {
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("pagenum", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_raw(listing_page(page), "text/html"))
            .mount(&server)
            .await;
    }
    server
}

fn config_toml(db_path: &str, dwell_ms: u64) -> String {
    format!(
        r#"
[orchestrator]
dwell-ms = {dwell_ms}
extract-retry-delay-ms = 50

[navigation]
page-load-timeout-ms = 5000
settle-delay-ms = 10

[output]
database-path = "{db_path}"

[[scraper]]
id = "products"
name = "Product list"
domain = "127.0.0.1"
page-param = "pagenum"
item-selector = ".item"
id-field = "id"
next-page-selector = "a.next"
total-pages-selector = ".total"

[[scraper.field]]
name = "id"
selector = ".id"

[[scraper.field]]
name = "name"
selector = ".name"
"#
    )
}

struct Harness {
    host: TabHost,
    store: Arc<SqliteResultStore>,
    state: StateStore,
    bus: MessageBus,
    events: broadcast::Receiver<PanelEvent>,
    _dir: TempDir,
}

/// Wires the controller, tab host and result store the way the CLI does
fn harness(dwell_ms: u64) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("results.db");
    let config =
        Arc::new(parse_config(&config_toml(&db_path.to_string_lossy(), dwell_ms)).unwrap());

    let store = Arc::new(SqliteResultStore::new(&db_path).unwrap());
    let state = StateStore::in_memory();
    let (panel, events) = broadcast::channel(64);
    let (handle, inbox) = ControllerHandle::channel();

    let env = PageEnvironment {
        extractors: Arc::new(ExtractorRegistry::from_config(&config).unwrap()),
        sink: Arc::new(TracingProgressSink::new()),
        state: state.clone(),
        bus: MessageBus::builder().background(Arc::new(handle.clone())).build(),
    };
    let host = TabHost::new(build_http_client(&config.fetch).unwrap(), env);

    let controller_bus = MessageBus::builder()
        .tabs(Arc::new(host.clone()))
        .panel(panel)
        .build();
    let orchestrator = Orchestrator::new(
        Arc::new(host.clone()),
        controller_bus,
        state.clone(),
        store.clone(),
        config,
    );
    tokio::spawn(Controller::with_inbox(Arc::new(orchestrator), inbox).run());

    Harness {
        host,
        store,
        state,
        bus: MessageBus::builder().background(Arc::new(handle)).build(),
        events,
        _dir: dir,
    }
}

async fn start(harness: &Harness, tab_id: TabId, base_url: String) {
    let request = ScrapeRequest {
        tab_id,
        scraper_id: "products".to_string(),
        mode: ScrapeMode::All,
        base_url,
    };
    let reply = harness
        .bus
        .send_to_background(ControlMessage::StartScrape(request), &SendOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, ControlReply::Started);
}

async fn wait_for_completion(events: &mut broadcast::Receiver<PanelEvent>) -> SessionReport {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if let PanelEvent::ScrapeComplete(report) = events.recv().await.unwrap() {
                return report;
            }
        }
    })
    .await
    .expect("session did not complete in time")
}

#[tokio::test]
async fn test_three_page_listing_is_scraped_and_saved() {
    let server = listing_site().await;
    let mut harness = harness(50);
    let tab_id = harness.host.open_tab().await;

    start(&harness, tab_id, format!("{}/list?pagenum=7", server.uri())).await;
    let report = wait_for_completion(&mut harness.events).await;

    assert_eq!(report.status, SessionStatus::Finished);
    assert_eq!(report.pages_visited, 3);
    assert_eq!(report.items_collected, 15);

    // one request per page, starting from the normalized first page
    let requests = server.received_requests().await.unwrap();
    let mut pages: Vec<String> = requests
        .iter()
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "pagenum")
                .map(|(_, v)| v.into_owned())
        })
        .collect();
    pages.sort();
    assert_eq!(pages, vec!["0", "1", "2"]);

    let summaries = harness.store.list().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].item_count, 15);
    assert_eq!(summaries[0].page_title.as_deref(), Some("Listing page 3"));

    let record = harness.store.get(&summaries[0].id).unwrap();
    assert_eq!(record.items[0].id, "p0-0");
    assert_eq!(
        record.items[14].fields.get("name").map(String::as_str),
        Some("Product 2.4")
    );

    let session = harness.state.get_state().await;
    assert!(!session.is_active);
    assert!(!session.modal_visible);
}

#[tokio::test]
async fn test_overlay_stop_button_ends_session_early() {
    let server = listing_site().await;
    let mut harness = harness(2000);
    let tab_id = harness.host.open_tab().await;

    start(&harness, tab_id, format!("{}/list?pagenum=0", server.uri())).await;

    // wait for the first page, then press stop on the page side
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let PanelEvent::ScrapeProgress { .. } = harness.events.recv().await.unwrap() {
                return;
            }
        }
    })
    .await
    .unwrap();
    let page = harness.host.page_context(tab_id).await.unwrap();
    assert_eq!(page.request_stop().await.unwrap(), ControlReply::Stopping);

    let report = wait_for_completion(&mut harness.events).await;
    assert_eq!(report.status, SessionStatus::Stopped);
    assert_eq!(report.pages_visited, 1);
    assert_eq!(report.items_collected, 5);

    // partial results are kept
    let summaries = harness.store.list().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].item_count, 5);
    assert!(!harness.state.get_state().await.is_active);
}
