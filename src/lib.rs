//! tradehub-node: record service for trade agreements
//!
//! Persists agreements and their ESG, compliance, participant, document and
//! AI insight records to a JSON snapshot with rotating backups, and relays
//! analysis events to an automation webhook with local fallbacks.

pub mod api;
pub mod config;
pub mod error;
pub mod esg;
pub mod relay;
pub mod store;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::StoreError;
pub use relay::InsightRelay;
pub use store::RecordStore;
