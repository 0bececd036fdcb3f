//! Record store
//!
//! Owns the in-memory snapshot of every entity and writes it to disk after
//! each mutation. The store has a single owner; callers share it behind a
//! lock and every mutating method takes `&mut self`, so mutations and their
//! persists run one at a time in call order.
//!
//! Memory is updated before the write is attempted. When a persist fails the
//! error is returned and the in-memory state stays ahead of the file.

pub mod merge;
pub mod models;
pub mod persist;

use chrono::Utc;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::esg::{calculate_score, EsgInputs};
use merge::merge_record;
pub use models::*;
use persist::SnapshotFile;

/// Audit entries kept; older ones are dropped first
pub const AUDIT_LOG_CAPACITY: usize = 1000;

/// Version tag written into exports
pub const EXPORT_VERSION: &str = "1.0.0";

pub const DEFAULT_INSIGHT_LIMIT: usize = 50;
pub const DEFAULT_AUDIT_LIMIT: usize = 100;

/// Keys a merge update may never change
const PROTECTED_AGREEMENT_KEYS: &[&str] = &["id", "createdAt"];
const PROTECTED_REPORT_KEYS: &[&str] = &["id", "createdAt"];
const PROTECTED_PARTICIPANT_KEYS: &[&str] = &["address", "registeredAt"];

/// File-backed store for all trade records
pub struct RecordStore {
    snapshot: Snapshot,
    file: SnapshotFile,
}

impl RecordStore {
    /// Open the store in `config.data_dir`, loading the existing snapshot or
    /// writing a fresh one.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let file = SnapshotFile::new(&config.data_dir, config.backup_retention);
        file.prepare().await?;

        let mut store = match file.load().await? {
            Some(snapshot) => {
                info!(
                    path = %file.data_file().display(),
                    agreements = snapshot.agreements.len(),
                    "Database loaded"
                );
                Self { snapshot, file }
            }
            None => {
                info!(path = %file.data_file().display(), "Creating new database");
                let mut store = Self {
                    snapshot: Snapshot::default(),
                    file,
                };
                store.persist().await?;
                store
            }
        };

        // Older files may hold more than the cap
        store.trim_audit_log();
        Ok(store)
    }

    /// Current in-memory state
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn file(&self) -> &SnapshotFile {
        &self.file
    }

    /// Stamp `lastUpdated` and write the snapshot plus a backup.
    pub async fn persist(&mut self) -> Result<(), StoreError> {
        self.snapshot.last_updated = Utc::now();
        self.file.save(&self.snapshot).await?;
        Ok(())
    }

    // === Agreements ===

    /// Create an agreement from submitted fields. A client-supplied `id` is
    /// ignored; `status` always starts as pending.
    pub async fn create_agreement(
        &mut self,
        mut fields: Map<String, Value>,
    ) -> Result<Agreement, StoreError> {
        let audit_data = Value::Object(fields.clone());
        let id = generate_id();

        fields.insert("id".into(), json!(id));
        fields.insert("createdAt".into(), json!(Utc::now()));
        fields.insert("status".into(), json!(AgreementStatus::Pending));
        fields.insert("blockchainTx".into(), Value::Null);
        fields.insert("auditTrail".into(), json!([]));

        let agreement: Agreement = serde_json::from_value(Value::Object(fields))
            .map_err(|e| StoreError::validation(e.to_string()))?;
        validate_amount(agreement.amount)?;

        self.snapshot.agreements.push(agreement.clone());
        self.record_audit(AuditAction::AgreementCreated, &id, audit_data);
        self.persist().await?;

        info!(agreement_id = %id, "Agreement created");
        Ok(agreement)
    }

    /// Merge `patch` over an existing agreement.
    pub async fn update_agreement(
        &mut self,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Agreement, StoreError> {
        let index = self
            .snapshot
            .agreements
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| StoreError::not_found("Agreement", id))?;

        let audit_data = Value::Object(patch.clone());
        let mut updated =
            merge_record(&self.snapshot.agreements[index], patch, PROTECTED_AGREEMENT_KEYS)?;
        validate_amount(updated.amount)?;
        updated.updated_at = Some(Utc::now());

        self.snapshot.agreements[index] = updated.clone();
        self.record_audit(AuditAction::AgreementUpdated, id, audit_data);
        self.persist().await?;

        debug!(agreement_id = %id, "Agreement updated");
        Ok(updated)
    }

    pub fn agreement(&self, id: &str) -> Option<&Agreement> {
        self.snapshot.agreements.iter().find(|a| a.id == id)
    }

    pub fn agreements(&self) -> &[Agreement] {
        &self.snapshot.agreements
    }

    pub fn agreements_by_status(&self, status: &str) -> Vec<&Agreement> {
        self.snapshot
            .agreements
            .iter()
            .filter(|a| a.status.as_str() == status)
            .collect()
    }

    /// Agreements where `address` is importer or exporter
    pub fn agreements_by_participant(&self, address: &str) -> Vec<&Agreement> {
        self.snapshot
            .agreements
            .iter()
            .filter(|a| a.involves(address))
            .collect()
    }

    // === ESG metrics ===

    /// Score `metrics` and store the result for `agreement_id`, replacing
    /// any previous record.
    pub async fn update_esg_metrics(
        &mut self,
        agreement_id: &str,
        metrics: Map<String, Value>,
    ) -> Result<EsgMetrics, StoreError> {
        if agreement_id.trim().is_empty() {
            return Err(StoreError::validation("agreementId is required"));
        }

        let audit_data = Value::Object(metrics.clone());
        let mut extra = metrics;
        let inputs: EsgInputs = serde_json::from_value(Value::Object(extra.clone()))
            .map_err(|e| StoreError::validation(e.to_string()))?;
        for key in [
            "carbonFootprint",
            "waterUsage",
            "wasteGenerated",
            "renewableEnergy",
            "laborCompliance",
            "certifications",
            "calculatedScore",
            "updatedAt",
        ] {
            extra.remove(key);
        }

        let record = EsgMetrics {
            calculated_score: calculate_score(&inputs),
            inputs,
            updated_at: Utc::now(),
            extra,
        };

        self.snapshot
            .esg_metrics
            .insert(agreement_id.to_string(), record.clone());
        self.record_audit(AuditAction::EsgUpdated, agreement_id, audit_data);
        self.persist().await?;

        info!(agreement_id, score = record.calculated_score, "ESG metrics updated");
        Ok(record)
    }

    pub fn esg_metrics(&self, agreement_id: &str) -> Option<&EsgMetrics> {
        self.snapshot.esg_metrics.get(agreement_id)
    }

    pub fn all_esg_metrics(&self) -> &std::collections::BTreeMap<String, EsgMetrics> {
        &self.snapshot.esg_metrics
    }

    // === Compliance reports ===

    pub async fn create_compliance_report(
        &mut self,
        mut fields: Map<String, Value>,
    ) -> Result<ComplianceReport, StoreError> {
        let audit_data = Value::Object(fields.clone());
        let id = generate_id();

        fields.insert("id".into(), json!(id));
        fields.insert("createdAt".into(), json!(Utc::now()));
        fields.insert("status".into(), json!("pending"));

        let report: ComplianceReport = serde_json::from_value(Value::Object(fields))
            .map_err(|e| StoreError::validation(e.to_string()))?;

        self.snapshot.compliance_reports.push(report.clone());
        self.record_audit(AuditAction::ComplianceReportCreated, &id, audit_data);
        self.persist().await?;

        info!(report_id = %id, "Compliance report created");
        Ok(report)
    }

    pub async fn update_compliance_report(
        &mut self,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<ComplianceReport, StoreError> {
        let index = self
            .snapshot
            .compliance_reports
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found("Compliance report", id))?;

        let audit_data = Value::Object(patch.clone());
        let mut updated = merge_record(
            &self.snapshot.compliance_reports[index],
            patch,
            PROTECTED_REPORT_KEYS,
        )?;
        updated.updated_at = Some(Utc::now());

        self.snapshot.compliance_reports[index] = updated.clone();
        self.record_audit(AuditAction::ComplianceReportUpdated, id, audit_data);
        self.persist().await?;
        Ok(updated)
    }

    pub fn compliance_reports(&self) -> &[ComplianceReport] {
        &self.snapshot.compliance_reports
    }

    // === Participants ===

    /// Register (or re-register) a participant. Reputation and verification
    /// always start at their defaults regardless of what the profile says.
    pub async fn register_participant(
        &mut self,
        address: &str,
        mut profile: Map<String, Value>,
    ) -> Result<Participant, StoreError> {
        if address.trim().is_empty() {
            return Err(StoreError::validation("address is required"));
        }

        let audit_data = Value::Object(profile.clone());
        profile.insert("address".into(), json!(address));
        profile.insert("registeredAt".into(), json!(Utc::now()));
        profile.insert("reputationScore".into(), json!(0.0));
        profile.insert("verificationStatus".into(), json!("pending"));
        profile.remove("updatedAt");

        let participant: Participant = serde_json::from_value(Value::Object(profile))
            .map_err(|e| StoreError::validation(e.to_string()))?;

        self.snapshot
            .participants
            .insert(address.to_string(), participant.clone());
        self.record_audit(AuditAction::ParticipantRegistered, address, audit_data);
        self.persist().await?;

        info!(address, "Participant registered");
        Ok(participant)
    }

    /// Merge `patch` over a participant; the only way reputation and
    /// verification status change.
    pub async fn update_participant(
        &mut self,
        address: &str,
        patch: Map<String, Value>,
    ) -> Result<Participant, StoreError> {
        let existing = self
            .snapshot
            .participants
            .get(address)
            .ok_or_else(|| StoreError::not_found("Participant", address))?;

        let audit_data = Value::Object(patch.clone());
        let mut updated = merge_record(existing, patch, PROTECTED_PARTICIPANT_KEYS)?;
        updated.updated_at = Some(Utc::now());

        self.snapshot
            .participants
            .insert(address.to_string(), updated.clone());
        self.record_audit(AuditAction::ParticipantUpdated, address, audit_data);
        self.persist().await?;
        Ok(updated)
    }

    pub fn participant(&self, address: &str) -> Option<&Participant> {
        self.snapshot.participants.get(address)
    }

    pub fn participants(&self) -> Vec<&Participant> {
        self.snapshot.participants.values().collect()
    }

    // === Documents ===

    /// Store a document under a fresh id, hashing its `content`.
    pub async fn store_document(
        &mut self,
        agreement_id: &str,
        mut fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        if agreement_id.trim().is_empty() {
            return Err(StoreError::validation("agreementId is required"));
        }
        let content = match fields.get("content") {
            Some(Value::String(content)) => content.clone(),
            _ => return Err(StoreError::validation("document content must be a string")),
        };

        let id = generate_id();
        let audit_data = json!({
            "agreementId": agreement_id,
            "type": fields.get("type").cloned().unwrap_or(Value::Null),
        });

        fields.insert("id".into(), json!(id));
        fields.insert("agreementId".into(), json!(agreement_id));
        fields.insert("storedAt".into(), json!(Utc::now()));
        fields.insert("hash".into(), json!(content_hash(&content)));

        let document: Document = serde_json::from_value(Value::Object(fields))
            .map_err(|e| StoreError::validation(e.to_string()))?;

        self.snapshot.documents.insert(id.clone(), document.clone());
        self.record_audit(AuditAction::DocumentStored, &id, audit_data);
        self.persist().await?;

        info!(document_id = %id, agreement_id, hash = %document.hash, "Document stored");
        Ok(document)
    }

    pub fn documents_for(&self, agreement_id: &str) -> Vec<&Document> {
        self.snapshot
            .documents
            .values()
            .filter(|d| d.agreement_id == agreement_id)
            .collect()
    }

    // === AI insights ===

    /// Append an insight of `insight_type` with the given payload fields.
    pub async fn store_ai_insight(
        &mut self,
        insight_type: &str,
        agreement_id: Option<&str>,
        payload: Map<String, Value>,
    ) -> Result<AiInsight, StoreError> {
        let insight = AiInsight {
            id: generate_id(),
            insight_type: insight_type.to_string(),
            agreement_id: agreement_id.map(str::to_string),
            created_at: Utc::now(),
            payload,
        };

        let mut audit_data = insight.payload.clone();
        audit_data.insert("type".into(), json!(insight.insight_type));
        if let Some(agreement_id) = &insight.agreement_id {
            audit_data.insert("agreementId".into(), json!(agreement_id));
        }

        self.snapshot.ai_insights.push(insight.clone());
        self.record_audit(
            AuditAction::AiInsightCreated,
            &insight.id,
            Value::Object(audit_data),
        );
        self.persist().await?;

        debug!(insight_id = %insight.id, insight_type, "AI insight stored");
        Ok(insight)
    }

    /// Most recent insights first, at most `limit`.
    pub fn ai_insights(&self, limit: usize) -> Vec<&AiInsight> {
        let mut insights: Vec<&AiInsight> = self.snapshot.ai_insights.iter().rev().collect();
        // Stable sort: equal timestamps keep newest-appended first
        insights.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        insights.truncate(limit);
        insights
    }

    // === Audit log ===

    fn record_audit(&mut self, action: AuditAction, entity_id: &str, data: Value) {
        let user_id = data
            .get("userId")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .unwrap_or("system")
            .to_string();

        self.snapshot.audit_log.push(AuditLogEntry {
            id: generate_id(),
            action: action.as_str().to_string(),
            entity_id: entity_id.to_string(),
            data,
            timestamp: Utc::now(),
            user_id,
        });
        self.trim_audit_log();
    }

    fn trim_audit_log(&mut self) {
        let len = self.snapshot.audit_log.len();
        if len > AUDIT_LOG_CAPACITY {
            self.snapshot.audit_log.drain(..len - AUDIT_LOG_CAPACITY);
        }
    }

    /// Most recent entries first, at most `limit`.
    pub fn audit_log(&self, limit: usize) -> Vec<&AuditLogEntry> {
        let mut entries: Vec<&AuditLogEntry> = self.snapshot.audit_log.iter().rev().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        entries
    }

    // === Analytics ===

    /// Shallow-merge client analytics into the stored map.
    pub async fn update_analytics(
        &mut self,
        analytics: Map<String, Value>,
    ) -> Result<Map<String, Value>, StoreError> {
        merge_map_shallow(&mut self.snapshot.analytics, analytics);
        self.snapshot
            .analytics
            .insert("lastUpdated".into(), json!(Utc::now()));
        self.persist().await?;
        Ok(self.snapshot.analytics.clone())
    }

    pub fn analytics(&self) -> &Map<String, Value> {
        &self.snapshot.analytics
    }

    // === Export / import ===

    pub fn export(&self) -> SnapshotExport {
        SnapshotExport {
            snapshot: self.snapshot.clone(),
            export_date: Utc::now(),
            version: EXPORT_VERSION,
        }
    }

    /// Replace every collection present in `data`, then persist.
    pub async fn import(&mut self, data: SnapshotImport) -> Result<(), StoreError> {
        let s = &mut self.snapshot;
        if let Some(v) = data.agreements {
            s.agreements = v;
        }
        if let Some(v) = data.esg_metrics {
            s.esg_metrics = v;
        }
        if let Some(v) = data.compliance_reports {
            s.compliance_reports = v;
        }
        if let Some(v) = data.participants {
            s.participants = v;
        }
        if let Some(v) = data.documents {
            s.documents = v;
        }
        if let Some(v) = data.ai_insights {
            s.ai_insights = v;
        }
        if let Some(v) = data.analytics {
            s.analytics = v;
        }
        if let Some(v) = data.audit_log {
            s.audit_log = v;
        }
        self.trim_audit_log();
        self.persist().await?;

        info!(agreements = self.snapshot.agreements.len(), "Data imported");
        Ok(())
    }

    pub fn stats(&self) -> Result<DatabaseStats, StoreError> {
        let s = &self.snapshot;
        Ok(DatabaseStats {
            total_agreements: s.agreements.len(),
            total_participants: s.participants.len(),
            total_documents: s.documents.len(),
            total_ai_insights: s.ai_insights.len(),
            total_audit_logs: s.audit_log.len(),
            last_updated: s.last_updated,
            database_size: serde_json::to_vec(s)?.len(),
        })
    }
}

fn merge_map_shallow(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        base.insert(key, value);
    }
}

fn validate_amount(amount: Option<f64>) -> Result<(), StoreError> {
    match amount {
        Some(a) if !a.is_finite() || a < 0.0 => Err(StoreError::validation(format!(
            "amount must be a non-negative number, got {a}"
        ))),
        _ => Ok(()),
    }
}

/// Random 128-bit identifier, hex encoded
pub fn generate_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Hex SHA-256 of document content
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> RecordStore {
        let config = DatabaseConfig {
            data_dir: dir.path().to_path_buf(),
            backup_retention: 10,
        };
        RecordStore::open(&config).await.unwrap()
    }

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_generate_id_is_128_bit_hex() {
        let id = generate_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_id());
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_open_writes_fresh_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        assert!(store.file().data_file().exists());
        assert_eq!(store.file().list_backups().await.unwrap().len(), 1);
        assert!(store.agreements().is_empty());
    }

    #[tokio::test]
    async fn test_update_agreement_merges_and_protects_id() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;
        let created = store
            .create_agreement(fields(json!({"importer": "A", "amount": 10})))
            .await
            .unwrap();

        let updated = store
            .update_agreement(
                &created.id,
                fields(json!({"id": "other", "status": "shipped", "incoterms": "FOB"})),
            )
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.status, AgreementStatus::Other("shipped".into()));
        assert_eq!(updated.incoterms.as_deref(), Some("FOB"));
        assert_eq!(updated.importer.as_deref(), Some("A"));
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_agreement_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;
        let err = store.update_agreement("nope", Map::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "Agreement", .. }));
    }

    #[tokio::test]
    async fn test_invalid_patch_leaves_agreement_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;
        let created = store
            .create_agreement(fields(json!({"amount": "100"})))
            .await
            .unwrap();

        let err = store
            .update_agreement(&created.id, fields(json!({"amount": -5})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.agreement(&created.id).unwrap().amount, Some(100.0));
    }

    #[tokio::test]
    async fn test_negative_amount_rejected_on_create() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;
        let err = store
            .create_agreement(fields(json!({"amount": "-1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.agreements().is_empty());
    }

    #[tokio::test]
    async fn test_participant_registration_resets_reputation() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;
        let p = store
            .register_participant(
                "0xabc",
                fields(json!({"name": "Acme", "reputationScore": 99, "verificationStatus": "verified"})),
            )
            .await
            .unwrap();
        assert_eq!(p.reputation_score, 0.0);
        assert_eq!(p.verification_status, "pending");
        assert_eq!(p.extra["name"], "Acme");

        let p = store
            .update_participant("0xabc", fields(json!({"reputationScore": 4.5, "verificationStatus": "verified"})))
            .await
            .unwrap();
        assert_eq!(p.reputation_score, 4.5);
        assert_eq!(p.verification_status, "verified");
        assert_eq!(p.address, "0xabc");
    }

    #[tokio::test]
    async fn test_document_requires_content() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;
        let err = store
            .store_document("agr-1", fields(json!({"type": "invoice"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_audit_user_id_from_data() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;
        store
            .create_agreement(fields(json!({"importer": "A", "userId": "0xuser"})))
            .await
            .unwrap();
        store.create_agreement(fields(json!({"importer": "B"}))).await.unwrap();

        let log = store.audit_log(10);
        assert_eq!(log[0].user_id, "system");
        assert_eq!(log[1].user_id, "0xuser");
        assert_eq!(log[1].action, "agreement_created");
    }

    #[tokio::test]
    async fn test_analytics_merge_is_shallow() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).await;
        store
            .update_analytics(fields(json!({"regions": {"asia": 1}, "views": 3})))
            .await
            .unwrap();
        let analytics = store
            .update_analytics(fields(json!({"regions": {"europe": 2}})))
            .await
            .unwrap();
        assert_eq!(analytics["regions"], json!({"europe": 2}));
        assert_eq!(analytics["views"], 3);
        assert!(analytics.contains_key("lastUpdated"));
    }
}
