use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

pub const LBS_PER_KG: f64 = 2.20462;

/// Display unit for body weight. Pounds are canonical: every stored or
/// transmitted weight is in pounds, kilograms only ever appear on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Lbs,
    Kg,
}

impl WeightUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lbs => "lbs",
            Self::Kg => "kg",
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Lbs => Self::Kg,
            Self::Kg => Self::Lbs,
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightUnit {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lbs" | "lb" => Ok(Self::Lbs),
            "kg" => Ok(Self::Kg),
            _ => Err(MetricsError::UnknownUnit(s.to_string())),
        }
    }
}

#[must_use]
pub fn to_kg(lbs: f64) -> f64 {
    lbs / LBS_PER_KG
}

#[must_use]
pub fn to_lbs(kg: f64) -> f64 {
    kg * LBS_PER_KG
}

/// Convert a weight entered in `unit` to canonical pounds. Unrounded.
#[must_use]
pub fn to_canonical(value: f64, unit: WeightUnit) -> f64 {
    match unit {
        WeightUnit::Lbs => value,
        WeightUnit::Kg => to_lbs(value),
    }
}

/// Convert canonical pounds to `unit` without rounding.
#[must_use]
pub fn from_canonical(lbs: f64, unit: WeightUnit) -> f64 {
    match unit {
        WeightUnit::Lbs => lbs,
        WeightUnit::Kg => to_kg(lbs),
    }
}

/// Round to one decimal place for display. Never feed the result back into storage.
#[must_use]
pub fn round1(v: f64) -> f64 {
    no_neg_zero((v * 10.0).round() / 10.0)
}

/// Canonical pounds as shown on a chart in `unit`, rounded to one decimal.
#[must_use]
pub fn display_value(lbs: f64, unit: WeightUnit) -> f64 {
    round1(from_canonical(lbs, unit))
}

#[must_use]
pub fn format_weight(lbs: f64, unit: WeightUnit) -> String {
    format!("{:.1} {unit}", display_value(lbs, unit))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}
