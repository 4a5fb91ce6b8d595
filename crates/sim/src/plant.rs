//! Plant health: the canned assessment catalogue shown by the demo page, and
//! defensive parsing of ranked results from an external image classifier.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Growth classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthClass {
    Healthy,
    OptimalGrowth,
    NutrientDeficiency,
    Disease,
}

impl GrowthClass {
    pub fn label(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::OptimalGrowth => "Optimal Growth",
            Self::NutrientDeficiency => "Nutrient Deficiency",
            Self::Disease => "Disease",
        }
    }
}

impl FromStr for GrowthClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        match norm.as_str() {
            "healthy" => Ok(Self::Healthy),
            "optimal growth" | "optimal" => Ok(Self::OptimalGrowth),
            "nutrient deficiency" | "deficiency" => Ok(Self::NutrientDeficiency),
            "disease" => Ok(Self::Disease),
            _ => Err(format!("unknown growth class '{}'", s.trim())),
        }
    }
}

impl fmt::Display for GrowthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Canned assessments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantSample {
    Healthy,
    Deficiency,
    Disease,
    Optimal,
}

impl PlantSample {
    pub const ALL: [PlantSample; 4] = [
        PlantSample::Healthy,
        PlantSample::Deficiency,
        PlantSample::Disease,
        PlantSample::Optimal,
    ];
}

impl FromStr for PlantSample {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "deficiency" => Ok(Self::Deficiency),
            "disease" => Ok(Self::Disease),
            "optimal" => Ok(Self::Optimal),
            other => Err(format!("unknown plant sample '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked {
    pub class: GrowthClass,
    /// Percent.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub severity: Severity,
    pub message: &'static str,
    pub actions: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub name: &'static str,
    pub prediction: Ranked,
    pub details: Vec<Ranked>,
    pub recommendation: Recommendation,
}

fn ranked(pairs: &[(GrowthClass, f64)]) -> Vec<Ranked> {
    pairs
        .iter()
        .map(|&(class, confidence)| Ranked { class, confidence })
        .collect()
}

/// Fixed result for a sample; no model is consulted.
pub fn assess(sample: PlantSample) -> Assessment {
    use GrowthClass::*;

    let (name, details, recommendation) = match sample {
        PlantSample::Healthy => (
            "Healthy Lettuce",
            ranked(&[
                (Healthy, 94.2),
                (OptimalGrowth, 4.1),
                (NutrientDeficiency, 1.2),
                (Disease, 0.5),
            ]),
            Recommendation {
                severity: Severity::Success,
                message: "Plant is healthy! Maintain current conditions.",
                actions: &[
                    "Continue pH: 5.8 ± 0.15",
                    "Maintain EC: 1.2 ± 0.08 mS/cm",
                    "Keep water temp: 18-22°C",
                    "Monitor daily for changes",
                ],
            },
        ),
        PlantSample::Deficiency => (
            "Nutrient Deficiency",
            ranked(&[
                (NutrientDeficiency, 89.7),
                (Healthy, 7.3),
                (Disease, 2.5),
                (OptimalGrowth, 0.5),
            ]),
            Recommendation {
                severity: Severity::Warning,
                message: "Nutrient deficiency detected! Adjust feeding.",
                actions: &[
                    "Increase EC to 1.3-1.4 mS/cm",
                    "Verify pH is at 5.8",
                    "Add balanced nutrient solution",
                    "Check again in 48 hours",
                ],
            },
        ),
        PlantSample::Disease => (
            "Disease Detected",
            ranked(&[
                (Disease, 86.3),
                (NutrientDeficiency, 9.2),
                (Healthy, 3.8),
                (OptimalGrowth, 0.7),
            ]),
            Recommendation {
                severity: Severity::Error,
                message: "Disease or pest issue detected! Take action now.",
                actions: &[
                    "Isolate affected plants",
                    "Check water temp (18-22°C)",
                    "Improve air circulation",
                    "Consider H₂O₂ treatment",
                    "Consult specialist if persists",
                ],
            },
        ),
        PlantSample::Optimal => (
            "Ready for Harvest",
            ranked(&[
                (OptimalGrowth, 92.8),
                (Healthy, 6.1),
                (NutrientDeficiency, 0.8),
                (Disease, 0.3),
            ]),
            Recommendation {
                severity: Severity::Info,
                message: "Plant is ready for harvest!",
                actions: &[
                    "Harvest when crisp (15-20cm)",
                    "Best time: morning hours",
                    "Store at 4°C with humidity",
                    "Use within 7 days for best quality",
                ],
            },
        ),
    };

    Assessment {
        name,
        prediction: details[0].clone(),
        details,
        recommendation,
    }
}

// ---------------------------------------------------------------------------
// External classifier responses
// ---------------------------------------------------------------------------

/// Outcome of an external classification. Probabilities are reported as
/// received and are not normalised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Classification {
    Available { ranked: Vec<Prediction> },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class: GrowthClass,
    pub probability: f64,
}

impl Classification {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn top(&self) -> Option<&Prediction> {
        match self {
            Self::Available { ranked } => ranked.first(),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Accepts a bare JSON array or an object with a `predictions` array. Each
/// entry needs `label` (or `class`) and `probability` (or `confidence`).
/// Entries with unknown labels or bad numbers are skipped.
pub fn parse_classifier_response(body: &[u8]) -> Classification {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => return Classification::unavailable(format!("malformed response: {e}")),
    };

    let entries = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("predictions") {
            Some(Value::Array(items)) => items,
            _ => return Classification::unavailable("response has no predictions array"),
        },
        _ => return Classification::unavailable("response is neither an array nor an object"),
    };

    let mut ranked: Vec<Prediction> = entries.iter().filter_map(parse_entry).collect();
    if ranked.is_empty() {
        return Classification::unavailable("no recognised predictions");
    }
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    Classification::Available { ranked }
}

fn parse_entry(entry: &Value) -> Option<Prediction> {
    let label = entry
        .get("label")
        .or_else(|| entry.get("class"))
        .and_then(Value::as_str)?;
    let class = label.parse::<GrowthClass>().ok()?;
    let probability = entry
        .get("probability")
        .or_else(|| entry.get("confidence"))
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite() && *p >= 0.0)?;
    Some(Prediction { class, probability })
}

// ===========================================================================
// Tests
// ===========================================================================
