//! HTTP API
//!
//! Provides:
//! - Agreement, ESG, compliance, participant and document records
//! - AI relay status, analysis and inbound webhook events
//! - Analytics, audit log and snapshot export/import

pub mod analytics;
pub mod error;
pub mod routes;
pub mod webhook;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::relay::InsightRelay;
use crate::store::RecordStore;

pub use error::{ApiError, ApiJson, ApiResult};

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<RecordStore>>,
    pub relay: Arc<InsightRelay>,
}

impl AppState {
    pub fn new(store: RecordStore, relay: InsightRelay) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            relay: Arc::new(relay),
        }
    }
}

/// CORS layer for `origin`; `*` allows any origin.
pub fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin, "Invalid CORS origin, allowing any");
            CorsLayer::permissive()
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        // Health check
        .route("/health", get(routes::health))
        .route("/api/stats", get(routes::stats))
        // Agreements
        .route(
            "/api/agreements",
            get(routes::list_agreements).post(routes::create_agreement),
        )
        .route(
            "/api/agreements/:id",
            get(routes::get_agreement).put(routes::update_agreement),
        )
        // ESG
        .route(
            "/api/esg-metrics",
            get(routes::all_esg_metrics).post(routes::update_esg_metrics),
        )
        .route("/api/esg-metrics/:agreement_id", get(routes::get_esg_metrics))
        // Compliance
        .route(
            "/api/compliance",
            get(routes::list_compliance_reports).post(routes::create_compliance_report),
        )
        .route("/api/compliance/:id", put(routes::update_compliance_report))
        // Participants
        .route(
            "/api/participants",
            get(routes::list_participants).post(routes::register_participant),
        )
        .route(
            "/api/participants/:address",
            get(routes::get_participant).put(routes::update_participant),
        )
        // Documents
        .route("/api/documents", post(routes::store_document))
        .route("/api/documents/:agreement_id", get(routes::list_documents))
        // AI relay
        .route("/api/ai/status", get(routes::ai_status))
        .route("/api/ai/test", get(routes::ai_test))
        .route("/api/ai/insights", get(routes::ai_insights))
        .route("/api/ai/process-agreement/:id", post(routes::process_agreement))
        .route("/api/ai/report/:agreement_id", post(routes::generate_report))
        .route("/api/ai-webhook", post(webhook::receive))
        // Analytics and data
        .route(
            "/api/analytics",
            get(routes::get_analytics).post(routes::update_analytics),
        )
        .route("/api/audit-log", get(routes::audit_log))
        .route("/api/export", get(routes::export_data))
        .route("/api/import", post(routes::import_data))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
