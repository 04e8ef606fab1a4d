//! Uploaded scans as the backend stores them, and the edits a user may send
//! back: a corrected weight or timestamp, or independently verified body
//! composition.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::models::{MetricKind, parse_timestamp};
use crate::units::{WeightUnit, to_canonical};

/// Upper bound for a single verified percentage.
pub const MAX_VERIFIED_PERCENT: f64 = 80.0;
/// Fat and muscle percentages above this combined total are rejected.
pub const MAX_COMBINED_PERCENT: f64 = 120.0;

// --- Stored scans ---

/// One upload. Every value is canonical (pounds for weight and masses).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub id: i64,
    pub taken_at: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub fat_percent: Option<f64>,
    #[serde(default)]
    pub fat_mass: Option<f64>,
    #[serde(default)]
    pub skeletal_muscle_percent: Option<f64>,
    #[serde(default)]
    pub skeletal_muscle_pounds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
}

impl MetricEntry {
    #[must_use]
    pub fn value(&self, metric: MetricKind) -> Option<f64> {
        match metric {
            MetricKind::Weight => self.weight,
            MetricKind::Bmi => self.bmi,
            MetricKind::FatPercent => self.fat_percent,
            MetricKind::FatMass => self.fat_mass,
            MetricKind::SkeletalMusclePercent => self.skeletal_muscle_percent,
            MetricKind::SkeletalMusclePounds => self.skeletal_muscle_pounds,
        }
    }

    pub fn taken(&self) -> Result<DateTime<Utc>, MetricsError> {
        parse_timestamp(&self.taken_at)
    }
}

/// Body of `GET /metrics/{user_id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricHistory {
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
}

/// Order entries newest first. Entries sharing a timestamp keep their input
/// order. A malformed timestamp is an error.
pub fn newest_first(entries: Vec<MetricEntry>) -> Result<Vec<MetricEntry>, MetricsError> {
    let mut keyed = entries
        .into_iter()
        .map(|e| Ok((e.taken()?, e)))
        .collect::<Result<Vec<_>, MetricsError>>()?;
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(keyed.into_iter().map(|(_, e)| e).collect())
}

// --- Editing ---

/// Form fields for `PUT /metrics/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEdit {
    /// Canonical pounds, unrounded.
    pub weight: f64,
    pub taken_at: String,
}

impl MetricEdit {
    /// Build an edit from a weight typed in `unit`.
    pub fn new(
        weight: f64,
        unit: WeightUnit,
        taken_at: DateTime<Utc>,
    ) -> Result<Self, MetricsError> {
        if !weight.is_finite() {
            return Err(MetricsError::NonFiniteValue("Weight"));
        }
        if weight <= 0.0 {
            return Err(MetricsError::InvalidWeight(weight));
        }
        Ok(Self {
            weight: to_canonical(weight, unit),
            taken_at: taken_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

// --- Verification ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMethod {
    #[default]
    Dexa,
    Calipers,
    Scale,
    Other,
}

impl VerifyMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dexa => "dexa",
            Self::Calipers => "calipers",
            Self::Scale => "scale",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Dexa => "DEXA",
            Self::Calipers => "Calipers",
            Self::Scale => "Smart Scale",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for VerifyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerifyMethod {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dexa" => Ok(Self::Dexa),
            "calipers" => Ok(Self::Calipers),
            "scale" | "smart_scale" => Ok(Self::Scale),
            "other" => Ok(Self::Other),
            _ => Err(MetricsError::UnknownVerifyMethod(s.to_string())),
        }
    }
}

/// Verified body composition for the latest scan. Form fields for
/// `PUT /metrics_verify/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verification {
    pub fat_percent: f64,
    pub skeletal_muscle_percent: f64,
    pub verify_method: VerifyMethod,
}

impl Verification {
    /// Each percentage is clamped to `0..=80`; a combined total above 120 is
    /// rejected after clamping.
    pub fn new(
        fat_percent: f64,
        skeletal_muscle_percent: f64,
        verify_method: VerifyMethod,
    ) -> Result<Self, MetricsError> {
        if !fat_percent.is_finite() {
            return Err(MetricsError::NonFiniteValue("Fat %"));
        }
        if !skeletal_muscle_percent.is_finite() {
            return Err(MetricsError::NonFiniteValue("Muscle %"));
        }
        let fat = clamp_percent(fat_percent);
        let muscle = clamp_percent(skeletal_muscle_percent);
        if fat + muscle > MAX_COMBINED_PERCENT {
            return Err(MetricsError::ImplausibleComposition { fat, muscle });
        }
        Ok(Self {
            fat_percent: fat,
            skeletal_muscle_percent: muscle,
            verify_method,
        })
    }

    /// Prefer the values the backend echoed back; keep what was sent for
    /// anything it left out.
    #[must_use]
    pub fn confirmed(self, ack: &VerifyAck) -> Self {
        Self {
            fat_percent: ack.fat_percent.unwrap_or(self.fat_percent),
            skeletal_muscle_percent: ack
                .skeletal_muscle_percent
                .unwrap_or(self.skeletal_muscle_percent),
            ..self
        }
    }
}

fn clamp_percent(v: f64) -> f64 {
    v.clamp(0.0, MAX_VERIFIED_PERCENT)
}

/// Response to a verification update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyAck {
    #[serde(default)]
    pub fat_percent: Option<f64>,
    #[serde(default)]
    pub skeletal_muscle_percent: Option<f64>,
}
