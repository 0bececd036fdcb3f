//! API route handlers
//!
//! Relay calls run without holding the store lock; the lock is taken again
//! to record their results.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use super::analytics::{self, TimeRange, TradeAnalytics};
use super::{ApiError, ApiJson, ApiResult, AppState};
use crate::error::StoreError;
use crate::relay::{AgreementAnalysis, ConnectionTest, RelayStatus};
use crate::store::{
    Agreement, AgreementStatus, AiInsight, AuditLogEntry, ComplianceReport, DatabaseStats,
    Document, EsgMetrics, Participant, SnapshotExport, SnapshotImport, DEFAULT_AUDIT_LIMIT,
    DEFAULT_INSIGHT_LIMIT,
};

/// Single-key insight payload
fn payload(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

/// `?limit=` parsed leniently; missing, zero or garbage means `default`
fn parse_limit(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(default)
}

fn to_json<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Store(StoreError::from(e)))
}

/// Run every relay analysis for `agreement` and record it as an insight.
async fn analyze(state: &AppState, agreement: &Agreement) -> ApiResult<AgreementAnalysis> {
    let analysis = state.relay.process_agreement(agreement).await;

    let mut fields = payload("analysis", to_json(&analysis)?);
    fields.insert("status".into(), json!("completed"));
    state
        .store
        .write()
        .await
        .store_ai_insight("trade_agreement_analysis", Some(&agreement.id), fields)
        .await?;

    Ok(analysis)
}

// === Health ===

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub database: DatabaseStats,
    pub ai: RelayStatus,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = state.store.read().await.stats()?;
    Ok(Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        database,
        ai: state.relay.status(),
    }))
}

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<DatabaseStats>> {
    let stats = state.store.read().await.stats()?;
    Ok(Json(stats))
}

// === Agreements ===

#[derive(Debug, Deserialize)]
pub struct AgreementFilter {
    pub status: Option<String>,
    pub participant: Option<String>,
}

/// GET /api/agreements
pub async fn list_agreements(
    State(state): State<AppState>,
    Query(filter): Query<AgreementFilter>,
) -> Json<Vec<Agreement>> {
    let store = state.store.read().await;

    let agreements = match (filter.status.as_deref(), filter.participant.as_deref()) {
        (None, None) => store.agreements().to_vec(),
        (Some(status), None) => store.agreements_by_status(status).into_iter().cloned().collect(),
        (None, Some(address)) => store
            .agreements_by_participant(address)
            .into_iter()
            .cloned()
            .collect(),
        (Some(status), Some(address)) => store
            .agreements_by_status(status)
            .into_iter()
            .filter(|a| a.involves(address))
            .cloned()
            .collect(),
    };

    Json(agreements)
}

/// POST /api/agreements
///
/// Responds with the agreement as created; the analysis and the
/// `ai_processed` status land on the stored record afterwards.
pub async fn create_agreement(
    State(state): State<AppState>,
    ApiJson(fields): ApiJson<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<Agreement>)> {
    let agreement = state.store.write().await.create_agreement(fields).await?;

    let analysis = analyze(&state, &agreement).await?;

    let mut patch = payload("aiAnalysis", to_json(&analysis)?);
    patch.insert("status".into(), json!(AgreementStatus::AiProcessed));
    state
        .store
        .write()
        .await
        .update_agreement(&agreement.id, patch)
        .await?;

    Ok((StatusCode::CREATED, Json(agreement)))
}

/// GET /api/agreements/:id
pub async fn get_agreement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Agreement>> {
    let store = state.store.read().await;
    store
        .agreement(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Agreement not found".to_string()))
}

/// PUT /api/agreements/:id
pub async fn update_agreement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<Map<String, Value>>,
) -> ApiResult<Json<Agreement>> {
    let updated = state.store.write().await.update_agreement(&id, patch).await?;
    Ok(Json(updated))
}

// === ESG ===

/// GET /api/esg-metrics
pub async fn all_esg_metrics(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, EsgMetrics>> {
    let store = state.store.read().await;
    Json(store.all_esg_metrics().clone())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsgUpdateRequest {
    #[serde(default)]
    pub agreement_id: String,
    #[serde(default)]
    pub metrics: Map<String, Value>,
}

/// POST /api/esg-metrics
pub async fn update_esg_metrics(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EsgUpdateRequest>,
) -> ApiResult<Json<EsgMetrics>> {
    let (metrics, agreement) = {
        let mut store = state.store.write().await;
        let metrics = store
            .update_esg_metrics(&req.agreement_id, req.metrics)
            .await?;
        (metrics, store.agreement(&req.agreement_id).cloned())
    };

    if let Some(agreement) = agreement {
        let analysis = state.relay.analyze_esg(&agreement).await.into_value();
        state
            .store
            .write()
            .await
            .store_ai_insight("esg_analysis", Some(&agreement.id), payload("analysis", analysis))
            .await?;
    }

    Ok(Json(metrics))
}

/// GET /api/esg-metrics/:agreement_id
pub async fn get_esg_metrics(
    State(state): State<AppState>,
    Path(agreement_id): Path<String>,
) -> ApiResult<Json<EsgMetrics>> {
    let store = state.store.read().await;
    store
        .esg_metrics(&agreement_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("ESG metrics not found".to_string()))
}

// === Compliance ===

/// GET /api/compliance
pub async fn list_compliance_reports(State(state): State<AppState>) -> Json<Vec<ComplianceReport>> {
    let store = state.store.read().await;
    Json(store.compliance_reports().to_vec())
}

/// POST /api/compliance
pub async fn create_compliance_report(
    State(state): State<AppState>,
    ApiJson(fields): ApiJson<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<ComplianceReport>)> {
    let (report, agreement) = {
        let mut store = state.store.write().await;
        let report = store.create_compliance_report(fields).await?;
        let agreement = report
            .agreement_id
            .as_deref()
            .and_then(|id| store.agreement(id))
            .cloned();
        (report, agreement)
    };

    if let Some(agreement) = agreement {
        let validation = state.relay.validate_compliance(&agreement).await.into_value();
        state
            .store
            .write()
            .await
            .store_ai_insight(
                "compliance_validation",
                Some(&agreement.id),
                payload("analysis", validation),
            )
            .await?;
    }

    Ok((StatusCode::CREATED, Json(report)))
}

/// PUT /api/compliance/:id
pub async fn update_compliance_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<Map<String, Value>>,
) -> ApiResult<Json<ComplianceReport>> {
    let updated = state
        .store
        .write()
        .await
        .update_compliance_report(&id, patch)
        .await?;
    Ok(Json(updated))
}

// === Participants ===

/// GET /api/participants
pub async fn list_participants(State(state): State<AppState>) -> Json<Vec<Participant>> {
    let store = state.store.read().await;
    Json(store.participants().into_iter().cloned().collect())
}

/// POST /api/participants
pub async fn register_participant(
    State(state): State<AppState>,
    ApiJson(mut profile): ApiJson<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<Participant>)> {
    let address = match profile.remove("address") {
        Some(Value::String(address)) => address,
        _ => return Err(ApiError::Validation("address is required".to_string())),
    };

    let participant = state
        .store
        .write()
        .await
        .register_participant(&address, profile)
        .await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

/// GET /api/participants/:address
pub async fn get_participant(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Participant>> {
    let store = state.store.read().await;
    store
        .participant(&address)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Participant not found".to_string()))
}

/// PUT /api/participants/:address
pub async fn update_participant(
    State(state): State<AppState>,
    Path(address): Path<String>,
    ApiJson(patch): ApiJson<Map<String, Value>>,
) -> ApiResult<Json<Participant>> {
    let updated = state
        .store
        .write()
        .await
        .update_participant(&address, patch)
        .await?;
    Ok(Json(updated))
}

// === Documents ===

/// POST /api/documents
pub async fn store_document(
    State(state): State<AppState>,
    ApiJson(mut fields): ApiJson<Map<String, Value>>,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let agreement_id = match fields.remove("agreementId") {
        Some(Value::String(id)) => id,
        _ => return Err(ApiError::Validation("agreementId is required".to_string())),
    };

    let document = state
        .store
        .write()
        .await
        .store_document(&agreement_id, fields)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/documents/:agreement_id
pub async fn list_documents(
    State(state): State<AppState>,
    Path(agreement_id): Path<String>,
) -> Json<Vec<Document>> {
    let store = state.store.read().await;
    Json(store.documents_for(&agreement_id).into_iter().cloned().collect())
}

// === AI relay ===

/// GET /api/ai/status
pub async fn ai_status(State(state): State<AppState>) -> Json<RelayStatus> {
    Json(state.relay.status())
}

/// GET /api/ai/test
pub async fn ai_test(State(state): State<AppState>) -> Json<ConnectionTest> {
    Json(state.relay.test_connection().await)
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

/// GET /api/ai/insights
pub async fn ai_insights(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<AiInsight>> {
    let limit = parse_limit(query.limit.as_deref(), DEFAULT_INSIGHT_LIMIT);
    let store = state.store.read().await;
    Json(store.ai_insights(limit).into_iter().cloned().collect())
}

/// POST /api/ai/process-agreement/:id
pub async fn process_agreement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgreementAnalysis>> {
    let agreement = state
        .store
        .read()
        .await
        .agreement(&id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound("Agreement not found".to_string()))?;

    let analysis = analyze(&state, &agreement).await?;

    let mut patch = payload("aiAnalysis", to_json(&analysis)?);
    patch.insert("lastAIAnalysis".into(), json!(Utc::now()));
    state.store.write().await.update_agreement(&id, patch).await?;

    info!(agreement_id = %id, "Agreement analysis stored");
    Ok(Json(analysis))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub report_type: Option<String>,
}

/// POST /api/ai/report/:agreement_id
pub async fn generate_report(
    State(state): State<AppState>,
    Path(agreement_id): Path<String>,
    body: Option<ApiJson<ReportRequest>>,
) -> Json<Value> {
    let report_type = body
        .and_then(|ApiJson(req)| req.report_type)
        .unwrap_or_else(|| "comprehensive".to_string());

    Json(
        state
            .relay
            .generate_report(&agreement_id, &report_type)
            .await
            .into_value(),
    )
}

// === Analytics ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub time_range: Option<String>,
}

/// GET /api/analytics
pub async fn get_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<TradeAnalytics>> {
    let range = match query.time_range.as_deref() {
        None => TimeRange::default(),
        Some(raw) => raw.parse::<TimeRange>().map_err(ApiError::Validation)?,
    };

    let store = state.store.read().await;
    Ok(Json(analytics::calculate(&store, range, Utc::now())))
}

/// POST /api/analytics
pub async fn update_analytics(
    State(state): State<AppState>,
    ApiJson(fields): ApiJson<Map<String, Value>>,
) -> ApiResult<Json<Map<String, Value>>> {
    let analytics = state.store.write().await.update_analytics(fields).await?;
    Ok(Json(analytics))
}

// === Audit log and data ===

/// GET /api/audit-log
pub async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<AuditLogEntry>> {
    let limit = parse_limit(query.limit.as_deref(), DEFAULT_AUDIT_LIMIT);
    let store = state.store.read().await;
    Json(store.audit_log(limit).into_iter().cloned().collect())
}

/// GET /api/export
pub async fn export_data(State(state): State<AppState>) -> Json<SnapshotExport> {
    let store = state.store.read().await;
    Json(store.export())
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub message: &'static str,
}

/// POST /api/import
pub async fn import_data(
    State(state): State<AppState>,
    ApiJson(data): ApiJson<SnapshotImport>,
) -> ApiResult<Json<ImportResponse>> {
    state.store.write().await.import(data).await?;
    Ok(Json(ImportResponse {
        success: true,
        message: "Data imported successfully",
    }))
}
