use serde::{Deserialize, Serialize};

use crate::models::{MetricKind, ValueKind};
use crate::units::{WeightUnit, format_weight, from_canonical, no_neg_zero};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
}

impl TrendDirection {
    /// Zero counts as up.
    #[must_use]
    pub fn of(delta: f64) -> Self {
        if delta >= 0.0 { Self::Up } else { Self::Down }
    }

    #[must_use]
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Up => "▲",
            Self::Down => "▼",
        }
    }
}

/// `▲ 1.5%` / `▼ 2.0` style change label.
#[must_use]
pub fn trend_label(delta: f64, kind: ValueKind) -> String {
    let arrow = TrendDirection::of(delta).arrow();
    let suffix = match kind {
        ValueKind::Percent => "%",
        ValueKind::Absolute => "",
    };
    format!("{arrow} {:.1}{suffix}", delta.abs())
}

#[must_use]
pub fn unit_suffix(metric: MetricKind, weight_unit: WeightUnit) -> &'static str {
    if metric.follows_weight_unit() {
        return weight_unit.as_str();
    }
    match metric.value_kind() {
        ValueKind::Percent => "%",
        ValueKind::Absolute => "",
    }
}

#[must_use]
pub fn per_week_unit(metric: MetricKind, weight_unit: WeightUnit) -> String {
    format!("{}/week", unit_suffix(metric, weight_unit))
}

/// BMI is shown with two decimals in goal details, everything else with one.
#[must_use]
pub fn decimals_for(metric: MetricKind) -> usize {
    match metric {
        MetricKind::Bmi => 2,
        _ => 1,
    }
}

/// A canonical value as shown on a card: `81.6 kg`, `22.5%`, `24.3`.
#[must_use]
pub fn format_metric_value(metric: MetricKind, value: f64, weight_unit: WeightUnit) -> String {
    if metric.follows_weight_unit() {
        return format_weight(value, weight_unit);
    }
    match metric.value_kind() {
        ValueKind::Percent => format!("{value:.1}%"),
        ValueKind::Absolute => format!("{value:.1}"),
    }
}

/// A canonical value in goal-detail precision, with a spaced unit suffix when
/// the metric has one.
#[must_use]
pub fn format_goal_value(metric: MetricKind, value: f64, weight_unit: WeightUnit) -> String {
    let shown = if metric.follows_weight_unit() {
        from_canonical(value, weight_unit)
    } else {
        value
    };
    let decimals = decimals_for(metric);
    match unit_suffix(metric, weight_unit) {
        "" => format!("{:.decimals$}", no_neg_zero(shown)),
        unit => format!("{:.decimals$} {unit}", no_neg_zero(shown)),
    }
}

/// Signed weekly rate such as `+0.50 lbs/week`. Weight rates are converted
/// into the display unit.
#[must_use]
pub fn format_weekly_change(change: f64, metric: MetricKind, weight_unit: WeightUnit) -> String {
    let shown = if metric.follows_weight_unit() {
        from_canonical(change, weight_unit)
    } else {
        change
    };
    let sign = if shown >= 0.0 { "+" } else { "-" };
    format!(
        "{sign}{:.2} {}",
        shown.abs(),
        per_week_unit(metric, weight_unit)
    )
}
