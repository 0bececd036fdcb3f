//! ESG compliance scoring
//!
//! Maps a bundle of environmental, social and governance inputs onto a
//! point total. Five numeric factors each land in a fixed bucket and a
//! free-text certification list adds a capped bonus.
//!
//! The total is not clamped: a record that maxes every factor and carries
//! the best certifications scores above 100.

use serde::{Deserialize, Serialize};

/// A metric as submitted by a client: either a JSON number or the raw text
/// typed into a form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricInput {
    Number(f64),
    Text(String),
}

impl MetricInput {
    /// Whether the input counts as supplied. Empty text and a literal zero
    /// are treated as "not filled in".
    pub fn is_present(&self) -> bool {
        match self {
            MetricInput::Number(n) => *n != 0.0 && !n.is_nan(),
            MetricInput::Text(s) => !s.is_empty(),
        }
    }

    /// Numeric value, NaN when the text has no numeric prefix.
    pub fn value(&self) -> f64 {
        match self {
            MetricInput::Number(n) => *n,
            MetricInput::Text(s) => leading_float(s),
        }
    }
}

impl From<f64> for MetricInput {
    fn from(n: f64) -> Self {
        MetricInput::Number(n)
    }
}

impl From<&str> for MetricInput {
    fn from(s: &str) -> Self {
        MetricInput::Text(s.to_string())
    }
}

/// Raw scoring inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsgInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_footprint: Option<MetricInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_usage: Option<MetricInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waste_generated: Option<MetricInput>,

    /// Percentage of energy from renewable sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewable_energy: Option<MetricInput>,

    /// Percentage of labor audits passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labor_compliance: Option<MetricInput>,

    /// Free text, e.g. "ISO 14001, Fair Trade"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certifications: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Better {
    Lower,
    Higher,
}

/// Bucket table for one numeric factor. Buckets are checked in order; a
/// value that matches none (including NaN) gets `floor`.
struct Scale {
    better: Better,
    buckets: &'static [(f64, u32)],
    floor: u32,
}

impl Scale {
    fn points(&self, value: f64) -> u32 {
        self.buckets
            .iter()
            .find(|(limit, _)| match self.better {
                Better::Lower => value <= *limit,
                Better::Higher => value >= *limit,
            })
            .map(|(_, points)| *points)
            .unwrap_or(self.floor)
    }
}

const CARBON: Scale = Scale {
    better: Better::Lower,
    buckets: &[(100.0, 25), (200.0, 20), (300.0, 15), (500.0, 10)],
    floor: 5,
};

const WATER: Scale = Scale {
    better: Better::Lower,
    buckets: &[(50.0, 20), (100.0, 15), (200.0, 10), (500.0, 5)],
    floor: 2,
};

const WASTE: Scale = Scale {
    better: Better::Lower,
    buckets: &[(10.0, 15), (25.0, 12), (50.0, 8), (100.0, 4)],
    floor: 1,
};

const RENEWABLE: Scale = Scale {
    better: Better::Higher,
    buckets: &[(80.0, 20), (60.0, 15), (40.0, 10), (20.0, 5)],
    floor: 2,
};

const LABOR: Scale = Scale {
    better: Better::Higher,
    buckets: &[(90.0, 20), (80.0, 15), (70.0, 10), (60.0, 5)],
    floor: 2,
};

/// Certification keywords and their bonus points
const CERTIFICATION_BONUS: &[(&str, u32)] = &[
    ("iso 14001", 3),
    ("iso 9001", 2),
    ("fair trade", 2),
    ("organic", 2),
    ("fsc", 1),
];

const CERTIFICATION_CAP: u32 = 10;

/// Compute the compliance score for a set of inputs.
///
/// Returns 0 when none of the five numeric factors is present, even if the
/// certification text would have earned a bonus.
pub fn calculate_score(inputs: &EsgInputs) -> u32 {
    let factors = [
        (&inputs.carbon_footprint, &CARBON),
        (&inputs.water_usage, &WATER),
        (&inputs.waste_generated, &WASTE),
        (&inputs.renewable_energy, &RENEWABLE),
        (&inputs.labor_compliance, &LABOR),
    ];

    let mut score = 0;
    let mut counted = 0;
    for (input, scale) in factors {
        if let Some(input) = input.as_ref().filter(|i| i.is_present()) {
            score += scale.points(input.value());
            counted += 1;
        }
    }

    score += certification_bonus(inputs.certifications.as_deref());

    if counted > 0 {
        score
    } else {
        0
    }
}

/// Bonus for recognised certifications, capped at 10.
pub fn certification_bonus(certifications: Option<&str>) -> u32 {
    let Some(text) = certifications.filter(|c| !c.trim().is_empty()) else {
        return 0;
    };
    let text = text.to_lowercase();
    let bonus: u32 = CERTIFICATION_BONUS
        .iter()
        .filter(|(keyword, _)| text.contains(keyword))
        .map(|(_, points)| points)
        .sum();
    bonus.min(CERTIFICATION_CAP)
}

/// Parse the longest numeric prefix of `s` the way a lenient form parser
/// would: "90kg" is 90, "abc" is NaN.
fn leading_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        return s[..end + "Infinity".len()].parse().unwrap_or(f64::NAN);
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return f64::NAN;
    }

    // Exponent only counts when it carries at least one digit
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}
