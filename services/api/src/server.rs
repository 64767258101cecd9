use crate::cli::ServeArgs;
use crate::demo::seed_village;
use crate::infra::{build_service_marketplace, AppState};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use village_jobs::config::AppConfig;
use village_jobs::error::AppError;
use village_jobs::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.seed_demo {
        config.marketplace.seed_demo_data = true;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (marketplace, store, _dispatcher) = build_service_marketplace(config.marketplace);
    if config.marketplace.seed_demo_data {
        let seed = seed_village(&marketplace)?;
        info!(
            harvest_job = %seed.harvest,
            festival_job = %seed.festival,
            "demo village seeded"
        );
    }

    let app = with_marketplace_routes(Arc::new(marketplace))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        commit_attempts = config.marketplace.commit_attempts,
        cache_misses = store.stats().misses,
        "village job marketplace ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
