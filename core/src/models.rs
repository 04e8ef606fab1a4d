use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

// --- Metric kinds ---

/// Whether a metric's values are percentages (already on a 0-100 scale) or
/// absolute quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Percent,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Weight,
    Bmi,
    FatPercent,
    SkeletalMusclePercent,
    SkeletalMusclePounds,
    FatMass,
}

impl MetricKind {
    pub const ALL: [Self; 6] = [
        Self::Weight,
        Self::Bmi,
        Self::FatPercent,
        Self::SkeletalMusclePercent,
        Self::SkeletalMusclePounds,
        Self::FatMass,
    ];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::Bmi => "bmi",
            Self::FatPercent => "fat_percent",
            Self::SkeletalMusclePercent => "skeletal_muscle_percent",
            Self::SkeletalMusclePounds => "skeletal_muscle_pounds",
            Self::FatMass => "fat_mass",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Weight => "Weight",
            Self::Bmi => "BMI",
            Self::FatPercent => "Fat %",
            Self::SkeletalMusclePercent => "Muscle %",
            Self::SkeletalMusclePounds => "Muscle lbs",
            Self::FatMass => "Fat Mass",
        }
    }

    #[must_use]
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::FatPercent | Self::SkeletalMusclePercent => ValueKind::Percent,
            _ => ValueKind::Absolute,
        }
    }

    /// Only body weight follows the user's lbs/kg display preference.
    #[must_use]
    pub fn follows_weight_unit(self) -> bool {
        self == Self::Weight
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.key() == lower)
            .ok_or_else(|| {
                let keys: Vec<&str> = Self::ALL.iter().map(|m| m.key()).collect();
                MetricsError::UnknownMetric(s.to_string(), keys.join(", "))
            })
    }
}

// --- Chart ranges ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartRange {
    #[serde(rename = "1week")]
    Week,
    #[serde(rename = "1month")]
    Month,
    #[default]
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl ChartRange {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "1week",
            Self::Month => "1month",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for ChartRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartRange {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1week" | "week" => Ok(Self::Week),
            "1month" | "month" => Ok(Self::Month),
            "ytd" => Ok(Self::YearToDate),
            "max" | "all" => Ok(Self::Max),
            _ => Err(MetricsError::UnknownRange(s.to_string())),
        }
    }
}

// --- Wire types (metrics backend) ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub taken_at: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartResponse {
    #[serde(default)]
    pub points: Vec<MetricPoint>,
    #[serde(default)]
    pub trend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Canceled,
}

impl GoalStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalStatus {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            _ => Err(MetricsError::UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub metric: MetricKind,
    /// In the metric's canonical unit (pounds for weight).
    pub target_value: f64,
    pub target_date: String,
    pub status: GoalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_track: Option<bool>,
}

impl Goal {
    pub fn target_day(&self) -> Result<NaiveDate, MetricsError> {
        parse_goal_date(&self.target_date)
    }
}

/// Server-computed projection for one goal, consumed as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalProgressResult {
    #[serde(default)]
    pub predicted_value: Option<f64>,
    #[serde(default)]
    pub difference_to_goal: Option<f64>,
    #[serde(default)]
    pub weekly_change: Option<f64>,
    #[serde(default)]
    pub required_weekly_change: Option<f64>,
    #[serde(default)]
    pub on_track: Option<bool>,
}

// --- Domain types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSample {
    pub taken_at: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub day: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub progress_pct: f64,
    pub on_track: bool,
}

impl GoalProgress {
    /// Neutral result for missing or unusable data.
    pub const INSUFFICIENT: Self = Self {
        progress_pct: 0.0,
        on_track: false,
    };
}

// --- Parsing ---

/// Parse a backend timestamp. Offsets are honoured; a timestamp without an
/// offset is taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MetricsError> {
    let s = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| MetricsError::InvalidTimestamp(raw.to_string()))
}

/// Parse a goal target date. A trailing time component (`2026-03-16T00:00:00Z`)
/// is ignored; anything else that isn't `YYYY-MM-DD` is an error.
pub fn parse_goal_date(raw: &str) -> Result<NaiveDate, MetricsError> {
    let date_part = raw.trim().split('T').next().unwrap_or_default();
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| MetricsError::InvalidDate(raw.to_string()))
}

impl MetricPoint {
    pub fn to_sample(&self) -> Result<MetricSample, MetricsError> {
        Ok(MetricSample {
            taken_at: parse_timestamp(&self.taken_at)?,
            value: self.value,
        })
    }
}

/// Validate a goal received from the backend.
pub fn validate_goal(goal: &Goal) -> anyhow::Result<()> {
    validate_target(goal.metric, goal.target_value, &goal.target_date)
}

fn validate_target(metric: MetricKind, target_value: f64, target_date: &str) -> anyhow::Result<()> {
    if !target_value.is_finite() {
        anyhow::bail!("Goal target_value must be a finite number");
    }
    if target_value < 0.0 {
        anyhow::bail!("Goal target_value must not be negative");
    }
    if metric.value_kind() == ValueKind::Percent && target_value > 100.0 {
        anyhow::bail!("Percent goal target_value must be between 0 and 100");
    }
    parse_goal_date(target_date)?;
    Ok(())
}

/// Goal fields sent on create (`POST /goals`) and edit (`PUT /goals/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalDraft {
    pub metric: MetricKind,
    /// Canonical unit, unrounded.
    pub target_value: f64,
    /// `YYYY-MM-DD`.
    pub target_date: String,
}

impl GoalDraft {
    /// Build a draft and check it with the same rules applied to goals read
    /// back from the backend.
    pub fn new(metric: MetricKind, target_value: f64, target_date: NaiveDate) -> anyhow::Result<Self> {
        let draft = Self {
            metric,
            target_value,
            target_date: target_date.format("%Y-%m-%d").to_string(),
        };
        validate_target(draft.metric, draft.target_value, &draft.target_date)?;
        Ok(draft)
    }
}
