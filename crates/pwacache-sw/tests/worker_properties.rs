//! End-to-end worker behavior against a mock origin

use async_trait::async_trait;
use pwacache_common::{CacheError, Result};
use pwacache_core::{Request, Response, ResponseSource, VersionTag, WorkerConfig};
use pwacache_sw::{
    CacheBackend, EventOutcome, FetchOutcome, Fetcher, HttpFetcher, InProcessHost,
    LifecycleState, MemoryBackend, PassthroughReason, ServiceWorker, SqliteBackend, WorkerEvent,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Real HTTP fetcher with a switch that simulates losing connectivity.
struct Flaky {
    inner: HttpFetcher,
    offline: AtomicBool,
}

impl Flaky {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HttpFetcher::new().unwrap(),
            offline: AtomicBool::new(false),
        })
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for Flaky {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::network(format!("offline: {}", request.url)));
        }
        self.inner.fetch(request).await
    }
}

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn dashboard_origin() -> MockServer {
    let server = MockServer::start().await;
    serve(&server, "/dashboard/", "<h1>Panel</h1>").await;
    serve(&server, "/dashboard/home/", "<h1>Inicio</h1>").await;
    serve(&server, "/dashboard/offline/", "<h1>Sin conexión</h1>").await;
    serve(&server, "/dashboard/manifest.json", "{}").await;
    Mock::given(method("GET"))
        .and(path("/static/dashboard/icons/icon-512.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn config(version: &str) -> Arc<WorkerConfig> {
    let mut config = WorkerConfig {
        version: VersionTag::new(version),
        ..WorkerConfig::default()
    };
    config.precache.manifest = vec![
        "/dashboard/".into(),
        "/dashboard/offline/".into(),
        "/static/dashboard/icons/icon-512.png".into(),
        "/dashboard/manifest.json".into(),
    ];
    Arc::new(config)
}

fn url(server: &MockServer, path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), path)).unwrap()
}

fn worker(
    server: &MockServer,
    version: &str,
    scope: &str,
    backend: Arc<dyn CacheBackend>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<InProcessHost>,
) -> ServiceWorker {
    ServiceWorker::new(config(version), url(server, scope), backend, fetcher, host)
}

fn generation(version: &str) -> BTreeSet<String> {
    ["static", "pages", "images"]
        .iter()
        .map(|prefix| format!("{}-{}", prefix, version))
        .collect()
}

fn response(outcome: FetchOutcome) -> Result<Response> {
    outcome.into_response().expect("request should be intercepted")
}

#[tokio::test]
async fn install_tolerates_one_missing_asset() {
    let server = dashboard_origin().await;
    let host = Arc::new(InProcessHost::new());
    let sw = worker(
        &server,
        "v1",
        "/dashboard/",
        Arc::new(MemoryBackend::new()),
        Flaky::new(),
        host.clone(),
    );

    let EventOutcome::Installed(report) = sw.dispatch(WorkerEvent::Install).await.unwrap() else {
        panic!("expected install report");
    };
    let precache = report.precache.unwrap();

    assert_eq!(precache.stored.len(), 3);
    assert_eq!(
        precache.failed_urls(),
        vec!["/static/dashboard/icons/icon-512.png"]
    );
    assert_eq!(host.skip_waiting_calls(), 1);
    assert_eq!(sw.state().await, LifecycleState::Waiting);
}

#[tokio::test]
async fn offline_navigation_falls_back_to_precached_page() {
    let server = dashboard_origin().await;
    let fetcher = Flaky::new();
    let sw = worker(
        &server,
        "v1",
        "/dashboard/",
        Arc::new(MemoryBackend::new()),
        fetcher.clone(),
        Arc::new(InProcessHost::new()),
    );
    sw.dispatch(WorkerEvent::Install).await.unwrap();
    sw.dispatch(WorkerEvent::Activate).await.unwrap();

    let online = response(
        sw.handle_fetch(&Request::navigate(url(&server, "/dashboard/home/?tab=2")))
            .await,
    )
    .unwrap();
    assert_eq!(online.source, ResponseSource::Network);
    assert_eq!(online.text(), "<h1>Inicio</h1>");

    fetcher.go_offline();

    // Previously visited page: served from the pages cache, query ignored.
    let cached = response(
        sw.handle_fetch(&Request::navigate(url(&server, "/dashboard/home/?tab=9")))
            .await,
    )
    .unwrap();
    assert_eq!(cached.source, ResponseSource::Cache);
    assert_eq!(cached.text(), "<h1>Inicio</h1>");

    // Never visited: the precached offline page.
    let fallback = response(
        sw.handle_fetch(&Request::navigate(url(&server, "/dashboard/contratos/")))
            .await,
    )
    .unwrap();
    assert_eq!(fallback.source, ResponseSource::Fallback);
    assert_eq!(fallback.text(), "<h1>Sin conexión</h1>");

    // Not a navigation: no page fallback.
    let err = response(
        sw.handle_fetch(&Request::get(url(&server, "/dashboard/api/resumen")))
            .await,
    )
    .unwrap_err();
    assert!(err.is_network());
}

#[tokio::test]
async fn cached_image_is_served_without_network() {
    let server = dashboard_origin().await;
    Mock::given(method("GET"))
        .and(path("/media/pool.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
        .expect(1)
        .mount(&server)
        .await;

    let sw = worker(
        &server,
        "v1",
        "/dashboard/",
        Arc::new(MemoryBackend::new()),
        Flaky::new(),
        Arc::new(InProcessHost::new()),
    );
    sw.dispatch(WorkerEvent::Install).await.unwrap();
    sw.dispatch(WorkerEvent::Activate).await.unwrap();

    for _ in 0..3 {
        let image = response(sw.handle_fetch(&Request::get(url(&server, "/media/pool.jpg"))).await)
            .unwrap();
        assert_eq!(&image.body[..], &[0xFF, 0xD8, 0xFF]);
    }
    // `expect(1)` is verified when the server drops.
}

#[tokio::test]
async fn upgrade_keeps_only_current_generation() {
    let server = dashboard_origin().await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cache.sqlite");

    {
        let sw = worker(
            &server,
            "v1",
            "/dashboard/",
            Arc::new(SqliteBackend::open(&db).unwrap()),
            Flaky::new(),
            Arc::new(InProcessHost::new()),
        );
        sw.dispatch(WorkerEvent::Install).await.unwrap();
        sw.dispatch(WorkerEvent::Activate).await.unwrap();
        assert_eq!(sw.store().list_generations().await.unwrap(), generation("v1"));
    }

    let sw = worker(
        &server,
        "v2",
        "/dashboard/",
        Arc::new(SqliteBackend::open(&db).unwrap()),
        Flaky::new(),
        Arc::new(InProcessHost::new()),
    );
    sw.dispatch(WorkerEvent::Install).await.unwrap();
    let EventOutcome::Activated(report) = sw.dispatch(WorkerEvent::Activate).await.unwrap() else {
        panic!("expected activate report");
    };

    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["images-v1", "pages-v1", "static-v1"]);
    assert_eq!(sw.store().list_generations().await.unwrap(), generation("v2"));

    // An active worker refuses a late install and keeps serving.
    assert!(sw.dispatch(WorkerEvent::Install).await.is_err());
    assert_eq!(sw.state().await, LifecycleState::Active);
    drop(sw);

    // A fresh worker with the same tag changes nothing.
    let sw = worker(
        &server,
        "v2",
        "/dashboard/",
        Arc::new(SqliteBackend::open(&db).unwrap()),
        Flaky::new(),
        Arc::new(InProcessHost::new()),
    );
    sw.dispatch(WorkerEvent::Install).await.unwrap();
    let EventOutcome::Activated(report) = sw.dispatch(WorkerEvent::Activate).await.unwrap() else {
        panic!("expected activate report");
    };
    assert!(report.deleted.is_empty());
    assert_eq!(sw.store().list_generations().await.unwrap(), generation("v2"));
}

#[tokio::test]
async fn wrong_scope_unregisters_and_never_intercepts() {
    let server = MockServer::start().await;
    let host = Arc::new(InProcessHost::new());
    let sw = worker(
        &server,
        "v1",
        "/",
        Arc::new(MemoryBackend::new()),
        Flaky::new(),
        host.clone(),
    );

    sw.dispatch(WorkerEvent::Install).await.unwrap();
    let EventOutcome::Activated(report) = sw.dispatch(WorkerEvent::Activate).await.unwrap() else {
        panic!("expected activate report");
    };
    assert!(report.unregistered);
    assert_eq!(host.unregister_calls(), 1);
    assert_eq!(sw.state().await, LifecycleState::Redundant);

    for path in ["/dashboard/", "/static/dashboard/app.css", "/media/a.png"] {
        let outcome = sw.handle_fetch(&Request::get(url(&server, path))).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Passthrough(PassthroughReason::ScopeRejected)
        ));
    }

    assert!(sw.dispatch(WorkerEvent::Activate).await.is_err());
    assert_eq!(host.unregister_calls(), 1);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    assert!(sw.store().list_generations().await.unwrap().is_empty());
}

#[tokio::test]
async fn cross_origin_requests_are_left_alone() {
    let server = dashboard_origin().await;
    let other = MockServer::start().await;
    let sw = worker(
        &server,
        "v1",
        "/dashboard/",
        Arc::new(MemoryBackend::new()),
        Flaky::new(),
        Arc::new(InProcessHost::new()),
    );
    sw.dispatch(WorkerEvent::Install).await.unwrap();
    sw.dispatch(WorkerEvent::Activate).await.unwrap();

    let outcome = sw
        .handle_fetch(&Request::get(url(&other, "/static/dashboard/app.css")))
        .await;
    assert!(matches!(
        outcome,
        FetchOutcome::Passthrough(PassthroughReason::CrossOrigin)
    ));
    assert!(other.received_requests().await.unwrap_or_default().is_empty());
}
