//! Inbound events from the automation webhook
//!
//! The workflow posts results back as `{"event": ..., "data": {...}}`.
//! Compliance and risk results are written onto the agreement; the other
//! kinds become AI insights. Unknown events are acknowledged.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{ApiError, ApiJson, ApiResult, AppState};
use crate::relay::RelayEvent;

#[derive(Debug, Deserialize)]
pub struct InboundEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

fn agreement_id(data: &Value) -> Option<&str> {
    data.get("agreementId").and_then(Value::as_str)
}

fn field(data: &Value, key: &str) -> Value {
    data.get(key).cloned().unwrap_or(Value::Null)
}

/// POST /api/ai-webhook
pub async fn receive(
    State(state): State<AppState>,
    ApiJson(inbound): ApiJson<InboundEvent>,
) -> ApiResult<Json<Ack>> {
    info!(event = %inbound.event, "AI agent event received");

    match inbound.event.parse::<RelayEvent>() {
        Ok(RelayEvent::ComplianceValidation) => compliance_result(&state, &inbound.data).await?,
        Ok(RelayEvent::RiskAssessment) => risk_result(&state, &inbound.data).await?,
        Ok(RelayEvent::EsgAnalysis) => {
            insight(&state, "esg_analysis", &inbound.data, "esgAnalysis", "analysis").await?
        }
        Ok(RelayEvent::TradeRecommendation) => {
            insight(
                &state,
                "trade_recommendation",
                &inbound.data,
                "recommendations",
                "recommendations",
            )
            .await?
        }
        Ok(RelayEvent::MarketInsights) => {
            insight(&state, "market_insights", &inbound.data, "marketInsights", "insights").await?
        }
        _ => warn!(event = %inbound.event, "Unknown AI agent event"),
    }

    Ok(Json(Ack {
        status: "processed",
        timestamp: Utc::now(),
    }))
}

async fn compliance_result(state: &AppState, data: &Value) -> ApiResult<()> {
    let result = data
        .get("complianceResult")
        .filter(|r| r.is_object())
        .ok_or_else(|| ApiError::Validation("complianceResult is required".to_string()))?;

    let Some(id) = agreement_id(data) else {
        return Ok(());
    };

    let mut store = state.store.write().await;
    if store.agreement(id).is_none() {
        return Ok(());
    }

    let compliant = result.get("isCompliant").and_then(Value::as_bool) == Some(true);
    let mut patch = Map::new();
    patch.insert("compliance".into(), result.clone());
    patch.insert(
        "complianceStatus".into(),
        json!(if compliant { "compliant" } else { "non-compliant" }),
    );
    store.update_agreement(id, patch).await?;
    Ok(())
}

async fn risk_result(state: &AppState, data: &Value) -> ApiResult<()> {
    let Some(id) = agreement_id(data) else {
        return Ok(());
    };

    let mut store = state.store.write().await;
    if store.agreement(id).is_none() {
        return Ok(());
    }

    let mut patch = Map::new();
    patch.insert("riskAssessment".into(), field(data, "riskAssessment"));
    store.update_agreement(id, patch).await?;
    Ok(())
}

/// Store `data[source]` as an insight payload under `target`.
async fn insight(
    state: &AppState,
    insight_type: &str,
    data: &Value,
    source: &str,
    target: &str,
) -> ApiResult<()> {
    let mut payload = Map::new();
    payload.insert(target.to_string(), field(data, source));

    state
        .store
        .write()
        .await
        .store_ai_insight(insight_type, agreement_id(data), payload)
        .await?;
    Ok(())
}
