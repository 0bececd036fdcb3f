//! Computed trade analytics

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::store::RecordStore;

/// Window of agreements included in the analytics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl TimeRange {
    pub fn duration(&self) -> Duration {
        match self {
            TimeRange::Week => Duration::days(7),
            TimeRange::Month => Duration::days(30),
            TimeRange::Quarter => Duration::days(90),
            TimeRange::Year => Duration::days(365),
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(TimeRange::Week),
            "30d" => Ok(TimeRange::Month),
            "90d" => Ok(TimeRange::Quarter),
            "1y" => Ok(TimeRange::Year),
            other => Err(format!(
                "unknown timeRange {other:?}, expected 7d, 30d, 90d or 1y"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeAnalytics {
    pub total_agreements: usize,
    pub total_value: f64,
    /// Percentage of agreements whose compliance status is `compliant`
    pub compliance_rate: f64,
    #[serde(rename = "averageESGScore")]
    pub average_esg_score: f64,
    pub top_products: Vec<Value>,
    pub country_stats: Map<String, Value>,
}

/// Analytics over agreements created within `range` of `now`.
///
/// The ESG average covers every stored metrics record with a non-zero
/// score, independent of the range.
pub fn calculate(store: &RecordStore, range: TimeRange, now: DateTime<Utc>) -> TradeAnalytics {
    let window = range.duration();
    let recent: Vec<_> = store
        .agreements()
        .iter()
        .filter(|a| now - a.created_at <= window)
        .collect();

    let total_value = recent.iter().filter_map(|a| a.amount).sum();

    let compliant = recent
        .iter()
        .filter(|a| a.compliance_status.as_deref() == Some("compliant"))
        .count();
    let compliance_rate = if recent.is_empty() {
        0.0
    } else {
        compliant as f64 / recent.len() as f64 * 100.0
    };

    let scores: Vec<u32> = store
        .all_esg_metrics()
        .values()
        .map(|m| m.calculated_score)
        .filter(|s| *s > 0)
        .collect();
    let average_esg_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64
    };

    TradeAnalytics {
        total_agreements: recent.len(),
        total_value,
        compliance_rate,
        average_esg_score,
        top_products: Vec::new(),
        country_stats: Map::new(),
    }
}
