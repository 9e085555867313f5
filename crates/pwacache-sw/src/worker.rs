//! Event dispatcher.

use crate::classifier::classify;
use crate::clients::Client;
use crate::fetch::Fetcher;
use crate::host::WorkerHost;
use crate::lifecycle::{ActivateReport, InstallReport, LifecycleManager, LifecycleState};
use crate::push::{notification_click, Notification, PushPayload};
use crate::router::CacheStrategyRouter;
use crate::scope::ScopeGuard;
use crate::store::{CacheBackend, CacheGeneration, CacheStore};
use http::Method;
use pwacache_common::Result;
use pwacache_core::{Request, Response, WorkerConfig};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

/// Events delivered by the host runtime.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    /// Control message from a page.
    Message(String),
    /// Intercepted request.
    Fetch(Request),
    /// Raw push payload.
    Push(String),
    NotificationClick(Notification),
}

/// Why a request is left to the runtime's default network handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    NonGet,
    CrossOrigin,
    Bypassed,
    ScopeRejected,
    NotActive,
}

/// Outcome of a fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted.
    Passthrough(PassthroughReason),
    /// Intercepted; the strategy's result.
    Respond(Result<Response>),
}

impl FetchOutcome {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchOutcome::Passthrough(_))
    }

    pub fn into_response(self) -> Option<Result<Response>> {
        match self {
            FetchOutcome::Passthrough(_) => None,
            FetchOutcome::Respond(result) => Some(result),
        }
    }
}

/// Outcome of a dispatched event.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Message { skip_waiting: bool },
    Fetch(FetchOutcome),
    Notification(Notification),
    ClientFocused(Client),
}

/// The offline cache worker.
///
/// Owns the lifecycle and routes every event the host delivers. Install and
/// activate finish all their work before returning.
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    guard: ScopeGuard,
    store: CacheStore,
    lifecycle: LifecycleManager,
    router: CacheStrategyRouter,
    host: Arc<dyn WorkerHost>,
}

impl ServiceWorker {
    /// Create a worker registered at `registration_scope`.
    pub fn new(
        config: Arc<WorkerConfig>,
        registration_scope: Url,
        backend: Arc<dyn CacheBackend>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn WorkerHost>,
    ) -> Self {
        let guard = ScopeGuard::new(&config.scope, &registration_scope);
        let store = CacheStore::new(backend, registration_scope.origin());
        let generation = CacheGeneration::new(config.version.clone());
        let router = CacheStrategyRouter::new(
            store.clone(),
            Arc::clone(&fetcher),
            generation,
            &config.routing,
        );
        let lifecycle = LifecycleManager::new(
            &config,
            store.clone(),
            fetcher,
            guard.clone(),
            Arc::clone(&host),
        );

        Self {
            config,
            guard,
            store,
            lifecycle,
            router,
            host,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn scope_guard(&self) -> &ScopeGuard {
        &self.guard
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    /// Dispatch one event.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => self.lifecycle.on_install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.lifecycle.on_activate().await.map(EventOutcome::Activated),
            WorkerEvent::Message(message) => {
                let skip_waiting = self.lifecycle.on_message(&message).await?;
                Ok(EventOutcome::Message { skip_waiting })
            }
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetch(self.handle_fetch(&request).await)),
            WorkerEvent::Push(payload) => Ok(EventOutcome::Notification(self.push(&payload))),
            WorkerEvent::NotificationClick(notification) => self
                .notification_click(&notification)
                .await
                .map(EventOutcome::ClientFocused),
        }
    }

    /// Decide whether to intercept a request and, if so, serve it.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if let Some(reason) = self.passthrough_reason(request).await {
            trace!(url = %request.url, reason = ?reason, "Passing request through");
            return FetchOutcome::Passthrough(reason);
        }

        let classification = classify(request, &self.config.routing, self.guard.expected());
        if classification.is_bypassed() {
            debug!(url = %request.url, "Bypassed path");
            return FetchOutcome::Passthrough(PassthroughReason::Bypassed);
        }

        FetchOutcome::Respond(self.router.route(&classification).await)
    }

    async fn passthrough_reason(&self, request: &Request) -> Option<PassthroughReason> {
        if !self.guard.is_controlled_scope() {
            return Some(PassthroughReason::ScopeRejected);
        }
        if !self.lifecycle.is_active().await {
            return Some(PassthroughReason::NotActive);
        }
        if request.method != Method::GET {
            return Some(PassthroughReason::NonGet);
        }
        if !request.is_same_origin(self.store.origin()) {
            return Some(PassthroughReason::CrossOrigin);
        }
        None
    }

    /// Build the notification for a push payload.
    pub fn push(&self, payload: &str) -> Notification {
        Notification::from_payload(
            PushPayload::parse(payload),
            &self.config.push,
            self.guard.expected(),
        )
    }

    /// Focus or open the window a notification points at.
    pub async fn notification_click(&self, notification: &Notification) -> Result<Client> {
        notification_click(self.host.as_ref(), self.store.origin(), notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InProcessHost;
    use crate::store::MemoryBackend;
    use crate::testing::{FakeNetwork, ORIGIN};
    use pwacache_core::ResponseSource;

    struct Fixture {
        network: Arc<FakeNetwork>,
        host: Arc<InProcessHost>,
        worker: ServiceWorker,
    }

    fn fixture(scope_path: &str) -> Fixture {
        let mut config = WorkerConfig::default();
        config.precache.manifest = vec!["/dashboard/".into(), "/dashboard/offline/".into()];

        let network = Arc::new(FakeNetwork::new());
        network.serve("/dashboard/", "panel");
        network.serve("/dashboard/offline/", "offline");

        let host = Arc::new(InProcessHost::new());
        let worker = ServiceWorker::new(
            Arc::new(config),
            Url::parse(&format!("{ORIGIN}{scope_path}")).unwrap(),
            Arc::new(MemoryBackend::new()),
            network.clone(),
            host.clone(),
        );
        Fixture {
            network,
            host,
            worker,
        }
    }

    async fn activated(scope_path: &str) -> Fixture {
        let f = fixture(scope_path);
        f.worker.dispatch(WorkerEvent::Install).await.unwrap();
        f.worker.dispatch(WorkerEvent::Activate).await.unwrap();
        f
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("{ORIGIN}{path}")).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through() {
        let f = fixture("/dashboard/");
        let outcome = f.worker.handle_fetch(&Request::navigate(url("/dashboard/"))).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Passthrough(PassthroughReason::NotActive)
        ));
    }

    #[tokio::test]
    async fn test_passthrough_reasons() {
        let f = activated("/dashboard/").await;
        let calls = f.network.calls();

        let post = Request::get(url("/dashboard/api/")).with_method(Method::POST);
        assert!(matches!(
            f.worker.handle_fetch(&post).await,
            FetchOutcome::Passthrough(PassthroughReason::NonGet)
        ));

        let cdn = Request::get(Url::parse("https://cdn.example/bootstrap.css").unwrap());
        assert!(matches!(
            f.worker.handle_fetch(&cdn).await,
            FetchOutcome::Passthrough(PassthroughReason::CrossOrigin)
        ));

        let admin = Request::navigate(url("/admin/"));
        assert!(matches!(
            f.worker.handle_fetch(&admin).await,
            FetchOutcome::Passthrough(PassthroughReason::Bypassed)
        ));

        assert_eq!(f.network.calls(), calls);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_offline_page() {
        let f = activated("/dashboard/").await;
        f.network.set_offline(true);

        let outcome = f
            .worker
            .dispatch(WorkerEvent::Fetch(Request::navigate(url("/dashboard/clientes/"))))
            .await
            .unwrap();

        let EventOutcome::Fetch(fetch) = outcome else {
            panic!("expected fetch outcome");
        };
        let response = fetch.into_response().unwrap().unwrap();
        assert_eq!(response.text(), "offline");
        assert_eq!(response.source, ResponseSource::Fallback);
    }

    #[tokio::test]
    async fn test_rejected_scope_never_intercepts() {
        let f = activated("/").await;
        assert_eq!(f.worker.state().await, LifecycleState::Redundant);
        assert_eq!(f.host.unregister_calls(), 1);

        let calls = f.network.calls();
        let outcome = f.worker.handle_fetch(&Request::navigate(url("/dashboard/"))).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Passthrough(PassthroughReason::ScopeRejected)
        ));
        assert_eq!(f.network.calls(), calls);
        assert!(f.worker.store().list_generations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_worker_keeps_serving_after_late_install() {
        let f = activated("/dashboard/").await;
        assert!(f.worker.dispatch(WorkerEvent::Install).await.is_err());
        assert_eq!(f.worker.state().await, LifecycleState::Active);

        f.network.set_offline(true);
        let outcome = f.worker.handle_fetch(&Request::navigate(url("/dashboard/ventas/"))).await;
        let response = outcome.into_response().unwrap().unwrap();
        assert_eq!(response.source, ResponseSource::Fallback);
    }

    #[tokio::test]
    async fn test_scope_without_trailing_slash_only_normalizes_its_subtree() {
        let mut config = WorkerConfig::default();
        config.scope = "/dashboard".into();
        config.precache.manifest = vec!["/dashboard/offline/".into()];

        let network = Arc::new(FakeNetwork::new());
        network.serve("/dashboard/offline/", "offline");
        network.serve_url(&format!("{ORIGIN}/dashboard-archive/?q=1"), "archive");

        let worker = ServiceWorker::new(
            Arc::new(config),
            url("/dashboard/"),
            Arc::new(MemoryBackend::new()),
            network.clone(),
            Arc::new(InProcessHost::new()),
        );
        assert!(worker.scope_guard().is_controlled_scope());
        worker.dispatch(WorkerEvent::Install).await.unwrap();
        worker.dispatch(WorkerEvent::Activate).await.unwrap();

        let response = worker
            .handle_fetch(&Request::navigate(url("/dashboard-archive/?q=1")))
            .await
            .into_response()
            .unwrap()
            .unwrap();
        assert_eq!(response.text(), "archive");

        let sent = network.requests().pop().unwrap();
        assert_eq!(sent.url.query(), Some("q=1"));
    }

    #[tokio::test]
    async fn test_message_event() {
        let f = fixture("/dashboard/");
        let outcome = f
            .worker
            .dispatch(WorkerEvent::Message("SKIP_WAITING".into()))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Message { skip_waiting: true }));
        assert_eq!(f.host.skip_waiting_calls(), 1);
    }

    #[tokio::test]
    async fn test_push_then_click() {
        let f = fixture("/dashboard/");
        let outcome = f
            .worker
            .dispatch(WorkerEvent::Push(r#"{"title":"Aviso","url":"/dashboard/home/"}"#.into()))
            .await
            .unwrap();
        let EventOutcome::Notification(notification) = outcome else {
            panic!("expected notification");
        };
        assert_eq!(notification.title, "Aviso");

        let outcome = f
            .worker
            .dispatch(WorkerEvent::NotificationClick(notification))
            .await
            .unwrap();
        let EventOutcome::ClientFocused(client) = outcome else {
            panic!("expected client");
        };
        assert_eq!(client.url, url("/dashboard/home/"));
    }
}
