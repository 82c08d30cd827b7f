use crate::cli::ServeArgs;
use crate::infra::{mitigation_settings, AppState, ConfiguredFlagStore, InMemorySubmissionLedger};
use crate::routes::with_lead_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lead_intake::config::AppConfig;
use lead_intake::error::AppError;
use lead_intake::telemetry;
use lead_intake::workflows::leads::{
    AllowListGate, FormCatalog, HttpRelay, LeadApi, LeadSubmissionService,
    TracingNotificationSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let leads = &config.leads;
    if leads.admin_emails.is_empty() {
        warn!("LEAD_ADMIN_EMAILS is empty; submission history is closed to everyone");
    }

    let catalog = Arc::new(FormCatalog::standard(leads));
    let relay = Arc::new(HttpRelay::new(leads.relay_timeout)?);
    let flags = Arc::new(ConfiguredFlagStore::from_config(leads)?);
    let ledger = Arc::new(InMemorySubmissionLedger::default());
    let service = Arc::new(LeadSubmissionService::new(
        catalog,
        relay,
        flags,
        ledger,
        Arc::new(TracingNotificationSink),
        mitigation_settings(leads),
    ));
    let api = LeadApi {
        service,
        access: Arc::new(AllowListGate::new(&leads.admin_emails)),
    };

    let app = with_lead_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lead intake service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
