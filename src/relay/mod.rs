//! Insight relay
//!
//! Forwards analysis events to the automation webhook as
//! `{"event": <name>, "data": <payload>}` POSTs. Whenever the webhook is not
//! configured or does not answer with a success status and a JSON body, the
//! matching local fallback from [`fallback`] is returned instead. Delivery
//! failures are logged and never reach the caller.

pub mod fallback;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::AiConfig;
use crate::store::Agreement;

/// Event names understood by the webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayEvent {
    ComplianceValidation,
    RiskAssessment,
    EsgAnalysis,
    TradeRecommendation,
    MarketInsights,
    GenerateReport,
    TestConnection,
}

impl RelayEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayEvent::ComplianceValidation => "compliance_validation",
            RelayEvent::RiskAssessment => "risk_assessment",
            RelayEvent::EsgAnalysis => "esg_analysis",
            RelayEvent::TradeRecommendation => "trade_recommendation",
            RelayEvent::MarketInsights => "market_insights",
            RelayEvent::GenerateReport => "generate_report",
            RelayEvent::TestConnection => "test_connection",
        }
    }
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compliance_validation" => Ok(RelayEvent::ComplianceValidation),
            "risk_assessment" => Ok(RelayEvent::RiskAssessment),
            "esg_analysis" => Ok(RelayEvent::EsgAnalysis),
            "trade_recommendation" => Ok(RelayEvent::TradeRecommendation),
            "market_insights" => Ok(RelayEvent::MarketInsights),
            "generate_report" => Ok(RelayEvent::GenerateReport),
            "test_connection" => Ok(RelayEvent::TestConnection),
            other => Err(format!("unknown event: {other}")),
        }
    }
}

/// Why a webhook call produced no usable result
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("No webhook URL configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Webhook response was not JSON: {0}")]
    Decode(String),
}

/// Result of a relayed analysis: exactly one of the two sources
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// Answer from the webhook
    Remote(Value),
    /// Local stand-in after a failed or skipped delivery
    Fallback(Value),
}

impl RelayOutcome {
    pub fn is_remote(&self) -> bool {
        matches!(self, RelayOutcome::Remote(_))
    }

    pub fn value(&self) -> &Value {
        match self {
            RelayOutcome::Remote(v) | RelayOutcome::Fallback(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            RelayOutcome::Remote(v) | RelayOutcome::Fallback(v) => v,
        }
    }
}

/// Combined output of all five analyses for one agreement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementAnalysis {
    pub agreement_id: String,
    pub timestamp: DateTime<Utc>,
    pub compliance: Value,
    pub risk_assessment: Value,
    pub esg_analysis: Value,
    pub recommendations: Value,
    pub market_insights: Value,
}

/// Relay configuration summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub enabled: bool,
    #[serde(rename = "n8nConnected")]
    pub n8n_connected: bool,
    pub openai_connected: bool,
    pub last_activity: DateTime<Utc>,
    pub health: &'static str,
}

/// Result of probing the webhook
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub status: ProbeStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProbeStatus {
    /// HTTP status returned by the webhook
    Http(u16),
    /// `fallback_mode` or `error`
    Mode(&'static str),
}

/// Webhook client with local fallbacks
pub struct InsightRelay {
    client: reqwest::Client,
    webhook_url: Option<String>,
    openai_configured: bool,
    enabled: bool,
    test_timeout: Duration,
}

fn to_json<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl InsightRelay {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.webhook_url().map(str::to_string),
            openai_configured: config.openai_configured(),
            enabled: config.enabled(),
            test_timeout: Duration::from_secs(config.test_timeout_secs),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// POST one event and decode the JSON answer.
    pub async fn send(
        &self,
        event: RelayEvent,
        data: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value, RelayError> {
        self.post(event, data, timeout)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| RelayError::Decode(e.to_string()))
    }

    /// POST one event; any non-success status is an error.
    async fn post(
        &self,
        event: RelayEvent,
        data: &Value,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, RelayError> {
        let url = self.webhook_url.as_deref().ok_or(RelayError::NotConfigured)?;

        let mut request = self
            .client
            .post(url)
            .json(&json!({ "event": event, "data": data }));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RelayError::Status(response.status()));
        }
        Ok(response)
    }

    async fn relay<F>(&self, event: RelayEvent, data: Value, fallback: F) -> RelayOutcome
    where
        F: FnOnce() -> Value,
    {
        match self.send(event, &data, None).await {
            Ok(result) => {
                debug!(%event, "Webhook answered");
                RelayOutcome::Remote(result)
            }
            Err(RelayError::NotConfigured) => {
                debug!(%event, "No webhook configured, using local fallback");
                RelayOutcome::Fallback(fallback())
            }
            Err(e) => {
                warn!(%event, error = %e, "Webhook delivery failed, using local fallback");
                RelayOutcome::Fallback(fallback())
            }
        }
    }

    pub async fn validate_compliance(&self, agreement: &Agreement) -> RelayOutcome {
        let data = json!({
            "agreementId": agreement.id,
            "goodsDescription": agreement.goods_description,
            "originCountry": agreement.origin_country,
            "destinationCountry": agreement.destination_country,
            "amount": agreement.amount,
            "incoterms": agreement.incoterms,
        });
        self.relay(RelayEvent::ComplianceValidation, data, || {
            to_json(fallback::compliance(agreement))
        })
        .await
    }

    pub async fn assess_risk(&self, agreement: &Agreement) -> RelayOutcome {
        let data = json!({
            "agreementId": agreement.id,
            "importer": agreement.importer,
            "exporter": agreement.exporter,
            "amount": agreement.amount,
            "goodsDescription": agreement.goods_description,
            "originCountry": agreement.origin_country,
            "destinationCountry": agreement.destination_country,
        });
        self.relay(RelayEvent::RiskAssessment, data, || {
            to_json(fallback::risk(agreement))
        })
        .await
    }

    pub async fn analyze_esg(&self, agreement: &Agreement) -> RelayOutcome {
        let data = json!({
            "agreementId": agreement.id,
            "goodsDescription": agreement.goods_description,
            "originCountry": agreement.origin_country,
            "destinationCountry": agreement.destination_country,
            "amount": agreement.amount,
        });
        self.relay(RelayEvent::EsgAnalysis, data, || {
            to_json(fallback::esg(agreement))
        })
        .await
    }

    pub async fn generate_recommendations(&self, agreement: &Agreement) -> RelayOutcome {
        let data = json!({
            "agreementId": agreement.id,
            "goodsDescription": agreement.goods_description,
            "amount": agreement.amount,
            "originCountry": agreement.origin_country,
            "destinationCountry": agreement.destination_country,
        });
        self.relay(RelayEvent::TradeRecommendation, data, || {
            to_json(fallback::recommendations())
        })
        .await
    }

    pub async fn market_insights(&self, agreement: &Agreement) -> RelayOutcome {
        let data = json!({
            "goodsDescription": agreement.goods_description,
            "originCountry": agreement.origin_country,
            "destinationCountry": agreement.destination_country,
            "amount": agreement.amount,
        });
        self.relay(RelayEvent::MarketInsights, data, || {
            to_json(fallback::market_insights())
        })
        .await
    }

    /// Run every analysis for `agreement`, one after another.
    pub async fn process_agreement(&self, agreement: &Agreement) -> AgreementAnalysis {
        info!(agreement_id = %agreement.id, "Analyzing trade agreement");

        AgreementAnalysis {
            agreement_id: agreement.id.clone(),
            timestamp: Utc::now(),
            compliance: self.validate_compliance(agreement).await.into_value(),
            risk_assessment: self.assess_risk(agreement).await.into_value(),
            esg_analysis: self.analyze_esg(agreement).await.into_value(),
            recommendations: self.generate_recommendations(agreement).await.into_value(),
            market_insights: self.market_insights(agreement).await.into_value(),
        }
    }

    pub async fn generate_report(&self, agreement_id: &str, report_type: &str) -> RelayOutcome {
        let data = json!({
            "agreementId": agreement_id,
            "reportType": report_type,
            "timestamp": Utc::now(),
        });
        self.relay(RelayEvent::GenerateReport, data, || {
            to_json(fallback::report(agreement_id, report_type))
        })
        .await
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            enabled: self.is_enabled(),
            n8n_connected: self.webhook_url.is_some(),
            openai_connected: self.openai_configured,
            last_activity: Utc::now(),
            health: "healthy",
        }
    }

    /// Probe the webhook with a short timeout.
    pub async fn test_connection(&self) -> ConnectionTest {
        if self.webhook_url.is_none() {
            return ConnectionTest {
                success: true,
                status: ProbeStatus::Mode("fallback_mode"),
                message: "Using fallback AI functions".to_string(),
            };
        }

        let data = json!({ "timestamp": Utc::now() });
        match self
            .post(RelayEvent::TestConnection, &data, Some(self.test_timeout))
            .await
        {
            // Any success status counts; the body is not read
            Ok(response) => ConnectionTest {
                success: true,
                status: ProbeStatus::Http(response.status().as_u16()),
                message: "n8n connection successful".to_string(),
            },
            Err(RelayError::Status(code)) => ConnectionTest {
                success: false,
                status: ProbeStatus::Http(code.as_u16()),
                message: "n8n connection failed".to_string(),
            },
            Err(e) => ConnectionTest {
                success: false,
                status: ProbeStatus::Mode("error"),
                message: e.to_string(),
            },
        }
    }
}
