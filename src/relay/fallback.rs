//! Local stand-ins for webhook analyses
//!
//! Used whenever the webhook cannot answer. Each result starts from a fixed
//! baseline and applies a few threshold rules to the agreement.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::Agreement;

/// Above this amount compliance needs extra scrutiny
const COMPLIANCE_SCRUTINY_AMOUNT: f64 = 1_000_000.0;

/// Above this amount the overall risk tier is high
const HIGH_RISK_AMOUNT: f64 = 500_000.0;

const INDIA: &str = "India";
const UNITED_STATES: &str = "United States";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn amount_exceeds(agreement: &Agreement, limit: f64) -> bool {
    agreement.amount.is_some_and(|a| a > limit)
}

fn from_india(agreement: &Agreement) -> bool {
    agreement.origin_country.as_deref() == Some(INDIA)
}

// === Compliance ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheck {
    pub is_compliant: bool,
    pub score: i32,
    pub details: ComplianceDetails,
    pub recommendations: Vec<String>,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceDetails {
    pub tariff_compliance: bool,
    pub origin_verification: bool,
    pub regulatory_compliance: bool,
    pub documentation_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub india_us_trade: Option<bool>,
}

pub fn compliance(agreement: &Agreement) -> ComplianceCheck {
    let mut check = ComplianceCheck {
        is_compliant: true,
        score: 85,
        details: ComplianceDetails {
            tariff_compliance: true,
            origin_verification: true,
            regulatory_compliance: true,
            documentation_complete: true,
            india_us_trade: None,
        },
        recommendations: strings(&[
            "Ensure all required documents are uploaded",
            "Verify origin certificates are valid",
            "Check tariff classifications",
        ]),
        risks: strings(&[
            "Potential delays in customs clearance",
            "Documentation requirements may change",
        ]),
    };

    if amount_exceeds(agreement, COMPLIANCE_SCRUTINY_AMOUNT) {
        check.score -= 10;
        check
            .risks
            .push("High-value transaction requires additional scrutiny".to_string());
    }

    if from_india(agreement) && agreement.destination_country.as_deref() == Some(UNITED_STATES) {
        check.score += 5;
        check.details.india_us_trade = Some(true);
    }

    check
}

// === Risk ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub overall_risk: RiskTier,
    pub score: i32,
    pub factors: RiskFactors,
    pub recommendations: Vec<String>,
    pub mitigation: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    pub country_risk: RiskTier,
    pub counterparty_risk: RiskTier,
    pub market_risk: RiskTier,
    pub regulatory_risk: RiskTier,
}

pub fn risk(agreement: &Agreement) -> RiskAssessment {
    let mut risk = RiskAssessment {
        overall_risk: RiskTier::Medium,
        score: 65,
        factors: RiskFactors {
            country_risk: RiskTier::Low,
            counterparty_risk: RiskTier::Medium,
            market_risk: RiskTier::Medium,
            regulatory_risk: RiskTier::Low,
        },
        recommendations: strings(&[
            "Monitor exchange rate fluctuations",
            "Verify counterparty credentials",
            "Consider trade insurance",
        ]),
        mitigation: strings(&[
            "Use escrow services",
            "Implement payment terms",
            "Regular monitoring",
        ]),
    };

    if amount_exceeds(agreement, HIGH_RISK_AMOUNT) {
        risk.overall_risk = RiskTier::High;
        risk.score += 20;
    }

    if from_india(agreement) {
        risk.factors.country_risk = RiskTier::Low;
        risk.score -= 10;
    }

    risk
}

// === ESG ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EsgAnalysis {
    pub environmental_score: u32,
    pub social_score: u32,
    pub governance_score: u32,
    pub overall_score: u32,
    pub recommendations: Vec<String>,
    pub certifications: Vec<String>,
}

pub fn esg(agreement: &Agreement) -> EsgAnalysis {
    let mut esg = EsgAnalysis {
        environmental_score: 75,
        social_score: 80,
        governance_score: 85,
        overall_score: 80,
        recommendations: strings(&[
            "Consider carbon offset programs",
            "Implement sustainable packaging",
            "Verify labor standards compliance",
        ]),
        certifications: strings(&[
            "ISO 14001 (Environmental Management)",
            "Fair Trade Certification",
            "Organic Certification",
        ]),
    };

    let organic = agreement
        .goods_description
        .as_deref()
        .is_some_and(|d| d.to_lowercase().contains("organic"));
    if organic {
        esg.environmental_score += 10;
        esg.overall_score += 5;
    }

    if from_india(agreement) {
        esg.social_score += 5;
        esg.governance_score += 5;
    }

    esg
}

// === Recommendations ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecommendations {
    pub trade_optimization: Vec<String>,
    pub compliance: Vec<String>,
    pub risk_management: Vec<String>,
    pub sustainability: Vec<String>,
}

pub fn recommendations() -> TradeRecommendations {
    TradeRecommendations {
        trade_optimization: strings(&[
            "Consider bulk shipping for cost reduction",
            "Explore alternative payment terms",
            "Negotiate better freight rates",
        ]),
        compliance: strings(&[
            "Ensure all regulatory requirements are met",
            "Maintain proper documentation",
            "Regular compliance audits",
        ]),
        risk_management: strings(&[
            "Implement trade insurance",
            "Use secure payment methods",
            "Monitor market conditions",
        ]),
        sustainability: strings(&[
            "Choose eco-friendly packaging",
            "Optimize transportation routes",
            "Partner with sustainable suppliers",
        ]),
    }
}

// === Market insights ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInsights {
    pub market_trends: Vec<String>,
    pub opportunities: Vec<String>,
    pub challenges: Vec<String>,
    pub forecasts: Forecasts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecasts {
    pub short_term: String,
    pub medium_term: String,
    pub long_term: String,
}

pub fn market_insights() -> MarketInsights {
    MarketInsights {
        market_trends: strings(&[
            "Growing demand for sustainable products",
            "Digital trade platforms gaining popularity",
            "Increased focus on supply chain transparency",
        ]),
        opportunities: strings(&[
            "Expand to emerging markets",
            "Develop digital trade capabilities",
            "Focus on ESG-compliant products",
        ]),
        challenges: strings(&[
            "Regulatory complexity",
            "Currency fluctuations",
            "Supply chain disruptions",
        ]),
        forecasts: Forecasts {
            short_term: "Stable growth expected".to_string(),
            medium_term: "Digital transformation accelerating".to_string(),
            long_term: "Sustainability becoming key differentiator".to_string(),
        },
    }
}

// === Reports ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicReport {
    pub report_id: String,
    pub agreement_id: String,
    pub report_type: String,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub sections: ReportSections,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSections {
    pub compliance: String,
    pub risk: String,
    pub esg: String,
    pub recommendations: String,
}

pub fn report(agreement_id: &str, report_type: &str) -> BasicReport {
    let now = Utc::now();
    BasicReport {
        report_id: format!("report_{}", now.timestamp_millis()),
        agreement_id: agreement_id.to_string(),
        report_type: report_type.to_string(),
        generated_at: now,
        summary: "Trade agreement analysis report".to_string(),
        sections: ReportSections {
            compliance: "Compliance validation completed".to_string(),
            risk: "Risk assessment performed".to_string(),
            esg: "ESG analysis conducted".to_string(),
            recommendations: "Recommendations provided".to_string(),
        },
        status: "completed".to_string(),
    }
}
