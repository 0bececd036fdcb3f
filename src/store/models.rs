//! Record types persisted in the snapshot
//!
//! Field names follow the camelCase layout of the snapshot file. Records
//! created from client submissions keep any field they do not model in a
//! flattened `extra` map, so nothing a client sends is dropped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::esg::EsgInputs;

/// Free-form fields carried alongside the modelled ones
pub type Extra = Map<String, Value>;

//=============================================================================
// AGREEMENTS
//=============================================================================

/// Lifecycle state of an agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgreementStatus {
    /// Just submitted
    Pending,
    /// Analysis attached by the relay
    AiProcessed,
    /// Any later workflow state set by a client
    Other(String),
}

impl AgreementStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgreementStatus::Pending => "pending",
            AgreementStatus::AiProcessed => "ai_processed",
            AgreementStatus::Other(s) => s,
        }
    }
}

impl From<String> for AgreementStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => AgreementStatus::Pending,
            "ai_processed" => AgreementStatus::AiProcessed,
            _ => AgreementStatus::Other(s),
        }
    }
}

impl From<AgreementStatus> for String {
    fn from(status: AgreementStatus) -> Self {
        status.as_str().to_string()
    }
}

/// A trade record between an importer and an exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goods_description: Option<String>,

    /// Monetary value; numeric strings are accepted on input
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_amount"
    )]
    pub amount: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoterms: Option<String>,

    pub status: AgreementStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// On-chain transaction reference, null until the client records one
    #[serde(default)]
    pub blockchain_tx: Option<Value>,

    #[serde(default)]
    pub audit_trail: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<Value>,

    #[serde(
        default,
        rename = "lastAIAnalysis",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_ai_analysis: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<Value>,

    /// `compliant` or `non-compliant` once a validation result arrives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<Value>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Agreement {
    /// True when `address` is either party
    pub fn involves(&self, address: &str) -> bool {
        self.importer.as_deref() == Some(address) || self.exporter.as_deref() == Some(address)
    }
}

/// Accept `50000`, `"50000"`, `""` and null for amounts.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("amount out of range")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid amount: {s:?}"))),
        Some(other) => Err(D::Error::custom(format!("invalid amount: {other}"))),
    }
}

//=============================================================================
// ESG
//=============================================================================

/// Scored ESG inputs for one agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsgMetrics {
    #[serde(flatten)]
    pub inputs: EsgInputs,

    pub calculated_score: u32,

    pub updated_at: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: Extra,
}

//=============================================================================
// COMPLIANCE
//=============================================================================

/// Trade-compliance workflow record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_id: Option<String>,

    pub status: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Extra,
}

//=============================================================================
// PARTICIPANTS
//=============================================================================

/// A registered trading party, keyed by wallet address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub address: String,

    pub registered_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    pub reputation_score: f64,

    pub verification_status: String,

    /// Profile fields (name, company, country, ...)
    #[serde(flatten)]
    pub extra: Extra,
}

//=============================================================================
// DOCUMENTS
//=============================================================================

/// A stored document, addressed by the SHA-256 of its content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,

    pub agreement_id: String,

    pub content: String,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    pub stored_at: DateTime<Utc>,

    /// Hex SHA-256 of `content`
    pub hash: String,

    #[serde(flatten)]
    pub extra: Extra,
}

//=============================================================================
// AI INSIGHTS
//=============================================================================

/// Analysis output attached to an agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInsight {
    pub id: String,

    #[serde(rename = "type")]
    pub insight_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_id: Option<String>,

    pub created_at: DateTime<Utc>,

    /// `analysis`, `recommendations`, `insights`, `status`, ...
    #[serde(flatten)]
    pub payload: Extra,
}

//=============================================================================
// AUDIT LOG
//=============================================================================

/// Actions recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    AgreementCreated,
    AgreementUpdated,
    EsgUpdated,
    ComplianceReportCreated,
    ComplianceReportUpdated,
    ParticipantRegistered,
    ParticipantUpdated,
    DocumentStored,
    AiInsightCreated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AgreementCreated => "agreement_created",
            AuditAction::AgreementUpdated => "agreement_updated",
            AuditAction::EsgUpdated => "esg_updated",
            AuditAction::ComplianceReportCreated => "compliance_report_created",
            AuditAction::ComplianceReportUpdated => "compliance_report_updated",
            AuditAction::ParticipantRegistered => "participant_registered",
            AuditAction::ParticipantUpdated => "participant_updated",
            AuditAction::DocumentStored => "document_stored",
            AuditAction::AiInsightCreated => "ai_insight_created",
        }
    }
}

/// One mutating action. `action` stays a string so imported logs with
/// unfamiliar actions still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub action: String,
    pub entity_id: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
}

//=============================================================================
// SNAPSHOT
//=============================================================================

/// Full serialized state, written to the primary file on every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub agreements: Vec<Agreement>,
    pub esg_metrics: BTreeMap<String, EsgMetrics>,
    pub compliance_reports: Vec<ComplianceReport>,
    pub participants: BTreeMap<String, Participant>,
    pub documents: BTreeMap<String, Document>,
    pub ai_insights: Vec<AiInsight>,
    pub analytics: Map<String, Value>,
    pub audit_log: Vec<AuditLogEntry>,
    pub last_updated: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            agreements: Vec::new(),
            esg_metrics: BTreeMap::new(),
            compliance_reports: Vec::new(),
            participants: BTreeMap::new(),
            documents: BTreeMap::new(),
            ai_insights: Vec::new(),
            analytics: Map::new(),
            audit_log: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Partial snapshot accepted by import; each present collection replaces
/// the current one
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotImport {
    pub agreements: Option<Vec<Agreement>>,
    pub esg_metrics: Option<BTreeMap<String, EsgMetrics>>,
    pub compliance_reports: Option<Vec<ComplianceReport>>,
    pub participants: Option<BTreeMap<String, Participant>>,
    pub documents: Option<BTreeMap<String, Document>>,
    pub ai_insights: Option<Vec<AiInsight>>,
    pub analytics: Option<Map<String, Value>>,
    pub audit_log: Option<Vec<AuditLogEntry>>,
}

/// Snapshot plus export metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotExport {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub export_date: DateTime<Utc>,
    pub version: &'static str,
}

/// Record counts reported by health and stats endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub total_agreements: usize,
    pub total_participants: usize,
    pub total_documents: usize,
    #[serde(rename = "totalAIInsights")]
    pub total_ai_insights: usize,
    pub total_audit_logs: usize,
    pub last_updated: DateTime<Utc>,
    /// Compact serialized size in bytes
    pub database_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agreement_json() -> Value {
        json!({
            "id": "a1",
            "importer": "0xA",
            "exporter": "0xB",
            "amount": "50000",
            "status": "pending",
            "createdAt": "2024-05-01T10:00:00Z",
            "blockchainTx": null,
            "auditTrail": [],
            "shippingPort": "Mumbai"
        })
    }

    #[test]
    fn test_agreement_accepts_string_amount_and_keeps_extra() {
        let a: Agreement = serde_json::from_value(agreement_json()).unwrap();
        assert_eq!(a.amount, Some(50000.0));
        assert_eq!(a.status, AgreementStatus::Pending);
        assert_eq!(a.extra.get("shippingPort"), Some(&json!("Mumbai")));
        assert!(a.involves("0xA"));
        assert!(a.involves("0xB"));
        assert!(!a.involves("0xC"));
    }

    #[test]
    fn test_agreement_rejects_garbage_amount() {
        let mut v = agreement_json();
        v["amount"] = json!("fifty thousand");
        assert!(serde_json::from_value::<Agreement>(v).is_err());
    }

    #[test]
    fn test_agreement_serializes_null_blockchain_tx() {
        let a: Agreement = serde_json::from_value(agreement_json()).unwrap();
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["blockchainTx"], Value::Null);
        assert_eq!(v["status"], "pending");
        assert_eq!(v["shippingPort"], "Mumbai");
    }

    #[test]
    fn test_custom_status_round_trips() {
        let status: AgreementStatus = "shipped".to_string().into();
        assert_eq!(status, AgreementStatus::Other("shipped".into()));
        assert_eq!(String::from(status), "shipped");
        let ai: AgreementStatus = "ai_processed".to_string().into();
        assert_eq!(ai, AgreementStatus::AiProcessed);
    }

    #[test]
    fn test_esg_metrics_keeps_inputs_and_extra_apart() {
        let m: EsgMetrics = serde_json::from_value(json!({
            "carbonFootprint": "90",
            "calculatedScore": 25,
            "updatedAt": "2024-05-01T10:00:00Z",
            "notes": "supplier audit pending"
        }))
        .unwrap();
        assert!(m.inputs.carbon_footprint.is_some());
        assert_eq!(m.extra.len(), 1);
        assert_eq!(m.extra["notes"], "supplier audit pending");
    }

    #[test]
    fn test_missing_snapshot_fields_default() {
        let s: Snapshot = serde_json::from_str(r#"{"agreements": []}"#).unwrap();
        assert!(s.audit_log.is_empty());
        assert!(s.participants.is_empty());
    }
}
