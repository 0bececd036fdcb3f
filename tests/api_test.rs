//! HTTP API integration tests against the router

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt;

use tradehub_node::api::{cors_layer, create_router, AppState};
use tradehub_node::config::{AiConfig, DatabaseConfig};
use tradehub_node::{InsightRelay, RecordStore};

async fn test_app(dir: &TempDir) -> Router {
    let config = DatabaseConfig {
        data_dir: dir.path().to_path_buf(),
        backup_retention: 10,
    };
    let store = RecordStore::open(&config).await.unwrap();
    let relay = InsightRelay::new(&AiConfig::default());
    create_router(AppState::new(store, relay), cors_layer("*"))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn create_agreement(app: &Router, body: Value) -> String {
    let (status, created) = send(app, "POST", "/api/agreements", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_store_and_relay() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["totalAgreements"], 0);
    assert_eq!(body["ai"]["enabled"], false);
    assert_eq!(body["ai"]["health"], "healthy");
}

#[tokio::test]
async fn test_create_agreement_runs_analysis() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, created) = send(
        &app,
        "POST",
        "/api/agreements",
        Some(json!({
            "importer": "0x1",
            "exporter": "0x2",
            "goodsDescription": "Organic Cotton",
            "originCountry": "India",
            "destinationCountry": "United States",
            "amount": "2000000"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    let id = created["id"].as_str().unwrap();

    let (status, stored) = send(&app, "GET", &format!("/api/agreements/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], "ai_processed");
    assert_eq!(stored["aiAnalysis"]["compliance"]["score"], 80);
    assert_eq!(stored["aiAnalysis"]["riskAssessment"]["overallRisk"], "high");
    assert_eq!(stored["aiAnalysis"]["esgAnalysis"]["environmentalScore"], 85);

    let (_, insights) = send(&app, "GET", "/api/ai/insights?limit=5", None).await;
    assert_eq!(insights[0]["type"], "trade_agreement_analysis");
    assert_eq!(insights[0]["agreementId"], id);
    assert_eq!(insights[0]["status"], "completed");
}

#[tokio::test]
async fn test_agreement_errors() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, body) = send(&app, "GET", "/api/agreements/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(&app, "PUT", "/api/agreements/missing", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    let (status, body) = send(&app, "POST", "/api/agreements", Some(json!({"amount": "lots"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(&app, "POST", "/api/agreements", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_agreement_list_filters() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let first = create_agreement(&app, json!({"importer": "0x1", "exporter": "0x2"})).await;
    create_agreement(&app, json!({"importer": "0x3", "exporter": "0x4"})).await;

    send(
        &app,
        "PUT",
        &format!("/api/agreements/{first}"),
        Some(json!({"status": "shipped"})),
    )
    .await;

    let (_, all) = send(&app, "GET", "/api/agreements", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, shipped) = send(&app, "GET", "/api/agreements?status=shipped", None).await;
    assert_eq!(shipped.as_array().unwrap().len(), 1);
    assert_eq!(shipped[0]["id"], first.as_str());

    let (_, mine) = send(&app, "GET", "/api/agreements?participant=0x4", None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["importer"], "0x3");
}

#[tokio::test]
async fn test_esg_metrics_flow() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let id = create_agreement(&app, json!({"goodsDescription": "Steel"})).await;

    let (status, metrics) = send(
        &app,
        "POST",
        "/api/esg-metrics",
        Some(json!({
            "agreementId": id,
            "metrics": {"carbonFootprint": "90", "waterUsage": "40"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["calculatedScore"], 45);

    let (status, fetched) = send(&app, "GET", &format!("/api/esg-metrics/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["carbonFootprint"], "90");

    let (_, all) = send(&app, "GET", "/api/esg-metrics", None).await;
    assert_eq!(all[&id]["calculatedScore"], 45);

    let (_, insights) = send(&app, "GET", "/api/ai/insights", None).await;
    assert_eq!(insights[0]["type"], "esg_analysis");
    assert_eq!(insights[0]["analysis"]["overallScore"], 80);

    let (status, _) = send(&app, "GET", "/api/esg-metrics/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/api/esg-metrics", Some(json!({"metrics": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_compliance_reports() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let agreement_id = create_agreement(&app, json!({"originCountry": "India"})).await;

    let (status, report) = send(
        &app,
        "POST",
        "/api/compliance",
        Some(json!({"agreementId": agreement_id, "standard": "FTA"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["status"], "pending");
    let report_id = report["id"].as_str().unwrap();

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/compliance/{report_id}"),
        Some(json!({"status": "approved"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "approved");
    assert_eq!(updated["standard"], "FTA");

    let (_, reports) = send(&app, "GET", "/api/compliance", None).await;
    assert_eq!(reports.as_array().unwrap().len(), 1);

    let (_, insights) = send(&app, "GET", "/api/ai/insights?limit=1", None).await;
    assert_eq!(insights[0]["type"], "compliance_validation");
    assert_eq!(insights[0]["analysis"]["isCompliant"], true);
}

#[tokio::test]
async fn test_participants_and_documents() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, _) = send(&app, "POST", "/api/participants", Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, participant) = send(
        &app,
        "POST",
        "/api/participants",
        Some(json!({"address": "0xabc", "name": "Acme", "reputationScore": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(participant["reputationScore"], 0.0);
    assert!(participant.get("address").is_some());

    let (status, updated) = send(
        &app,
        "PUT",
        "/api/participants/0xabc",
        Some(json!({"verificationStatus": "verified"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["verificationStatus"], "verified");

    let (status, _) = send(&app, "GET", "/api/participants/0xnone", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, document) = send(
        &app,
        "POST",
        "/api/documents",
        Some(json!({"agreementId": "agr-1", "content": "abc", "type": "invoice"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        document["hash"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert!(document.get("agreementId").is_some());

    let (_, documents) = send(&app, "GET", "/api/documents/agr-1", None).await;
    assert_eq!(documents.as_array().unwrap().len(), 1);
    let (_, none) = send(&app, "GET", "/api/documents/agr-2", None).await;
    assert!(none.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ai_endpoints_without_webhook() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (_, test) = send(&app, "GET", "/api/ai/test", None).await;
    assert_eq!(test["success"], true);
    assert_eq!(test["status"], "fallback_mode");

    let (status, report) = send(&app, "POST", "/api/ai/report/agr-9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["reportType"], "comprehensive");
    assert_eq!(report["agreementId"], "agr-9");

    let (_, report) = send(
        &app,
        "POST",
        "/api/ai/report/agr-9",
        Some(json!({"reportType": "esg"})),
    )
    .await;
    assert_eq!(report["reportType"], "esg");

    let (status, _) = send(&app, "POST", "/api/ai/process-agreement/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let id = create_agreement(&app, json!({"amount": 10})).await;
    let (status, analysis) = send(&app, "POST", &format!("/api/ai/process-agreement/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["agreementId"], id.as_str());

    let (_, stored) = send(&app, "GET", &format!("/api/agreements/{id}"), None).await;
    assert!(stored.get("lastAIAnalysis").is_some());
}

#[tokio::test]
async fn test_inbound_webhook_updates_agreement() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    let id = create_agreement(&app, json!({"amount": 100})).await;

    let (status, ack) = send(
        &app,
        "POST",
        "/api/ai-webhook",
        Some(json!({
            "event": "compliance_validation",
            "data": {"agreementId": id, "complianceResult": {"isCompliant": true, "score": 92}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "processed");

    send(
        &app,
        "POST",
        "/api/ai-webhook",
        Some(json!({
            "event": "risk_assessment",
            "data": {"agreementId": id, "riskAssessment": {"overallRisk": "low"}}
        })),
    )
    .await;

    let (_, stored) = send(&app, "GET", &format!("/api/agreements/{id}"), None).await;
    assert_eq!(stored["complianceStatus"], "compliant");
    assert_eq!(stored["compliance"]["score"], 92);
    assert_eq!(stored["riskAssessment"]["overallRisk"], "low");

    send(
        &app,
        "POST",
        "/api/ai-webhook",
        Some(json!({
            "event": "market_insights",
            "data": {"agreementId": id, "marketInsights": {"trend": "up"}}
        })),
    )
    .await;
    let (_, insights) = send(&app, "GET", "/api/ai/insights?limit=1", None).await;
    assert_eq!(insights[0]["type"], "market_insights");
    assert_eq!(insights[0]["insights"]["trend"], "up");

    let (status, ack) = send(
        &app,
        "POST",
        "/api/ai-webhook",
        Some(json!({"event": "something_else", "data": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "processed");

    let (_, analytics) = send(&app, "GET", "/api/analytics?timeRange=7d", None).await;
    assert_eq!(analytics["totalAgreements"], 1);
    assert_eq!(analytics["totalValue"], 100.0);
    assert_eq!(analytics["complianceRate"], 100.0);
}

#[tokio::test]
async fn test_analytics_and_audit_log() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    create_agreement(&app, json!({"amount": "250"})).await;

    let (status, body) = send(&app, "GET", "/api/analytics?timeRange=2w", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (_, analytics) = send(&app, "GET", "/api/analytics", None).await;
    assert_eq!(analytics["totalValue"], 250.0);
    assert_eq!(analytics["complianceRate"], 0.0);
    assert_eq!(analytics["averageESGScore"], 0.0);
    assert_eq!(analytics["topProducts"], json!([]));

    let (_, stored) = send(&app, "POST", "/api/analytics", Some(json!({"dashboards": 2}))).await;
    assert_eq!(stored["dashboards"], 2);
    assert!(stored.get("lastUpdated").is_some());

    let (_, log) = send(&app, "GET", "/api/audit-log?limit=2", None).await;
    let log = log.as_array().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0]["action"], "agreement_updated");
    assert_eq!(log[1]["action"], "ai_insight_created");
}

#[tokio::test]
async fn test_export_import_round_trip() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;
    create_agreement(&app, json!({"importer": "A"})).await;

    let (_, exported) = send(&app, "GET", "/api/export", None).await;
    assert_eq!(exported["version"], "1.0.0");
    assert_eq!(exported["agreements"].as_array().unwrap().len(), 1);

    let other_dir = TempDir::new().unwrap();
    let other = test_app(&other_dir).await;
    let (status, result) = send(&other, "POST", "/api/import", Some(exported.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], true);

    let (_, stats) = send(&other, "GET", "/api/stats", None).await;
    assert_eq!(stats["totalAgreements"], 1);
    assert_eq!(stats["totalAIInsights"], 1);

    let (status, _) = send(&other, "POST", "/api/import", Some(json!({"agreements": 5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
