use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use village_jobs::config::MarketplaceConfig;
use village_jobs::marketplace::{
    spawn_dispatcher, CachedStore, ChannelEventSink, InMemoryNotifications, InMemoryStore,
    Marketplace, NotificationEmitter,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ServiceStore = CachedStore<InMemoryStore>;

/// Marketplace served over HTTP: cached reads, notifications fanned out on a background task.
pub(crate) type ServiceMarketplace =
    Marketplace<ServiceStore, ChannelEventSink, InMemoryNotifications>;

/// Marketplace used by the CLI demo: notifications are recorded before each call returns.
pub(crate) type DemoMarketplace = Marketplace<
    InMemoryStore,
    NotificationEmitter<InMemoryStore, InMemoryNotifications>,
    InMemoryNotifications,
>;

/// Must be called from within a tokio runtime.
pub(crate) fn build_service_marketplace(
    config: MarketplaceConfig,
) -> (ServiceMarketplace, Arc<ServiceStore>, JoinHandle<()>) {
    let store = Arc::new(CachedStore::new(InMemoryStore::new()));
    let notifications = Arc::new(InMemoryNotifications::new());
    let emitter = Arc::new(NotificationEmitter::new(
        store.clone(),
        notifications.clone(),
    ));
    let (sink, dispatcher) = spawn_dispatcher(emitter);
    let marketplace = Marketplace::new(store.clone(), Arc::new(sink), notifications, config);
    (marketplace, store, dispatcher)
}

pub(crate) fn build_demo_marketplace(
    config: MarketplaceConfig,
) -> (DemoMarketplace, Arc<InMemoryNotifications>) {
    let store = Arc::new(InMemoryStore::new());
    let notifications = Arc::new(InMemoryNotifications::new());
    let emitter = Arc::new(NotificationEmitter::new(
        store.clone(),
        notifications.clone(),
    ));
    let marketplace = Marketplace::new(store, emitter, notifications.clone(), config);
    (marketplace, notifications)
}
