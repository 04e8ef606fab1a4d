use serde::{Deserialize, Serialize};

use crate::models::{DailyPoint, Goal, GoalProgress};

/// Which way a metric has to move to reach its target from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalDirection {
    Decrease,
    Increase,
    Reached,
}

impl GoalDirection {
    #[must_use]
    pub fn classify(first_value: f64, target_value: f64) -> Self {
        if first_value > target_value {
            Self::Decrease
        } else if first_value < target_value {
            Self::Increase
        } else {
            Self::Reached
        }
    }
}

/// Coarse bucket used to colour progress bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressBand {
    Behind,
    Approaching,
    Ahead,
}

impl ProgressBand {
    #[must_use]
    pub fn from_pct(pct: f64) -> Self {
        let clamped = if pct.is_finite() { pct.clamp(0.0, 100.0) } else { 0.0 };
        if clamped <= 50.0 {
            Self::Behind
        } else if clamped <= 75.0 {
            Self::Approaching
        } else {
            Self::Ahead
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Behind => "behind",
            Self::Approaching => "approaching",
            Self::Ahead => "ahead",
        }
    }
}

/// Completion percentage in `[0, 100]`, or `None` if any input is non-finite.
#[must_use]
pub fn progress_percent(first_value: f64, latest_value: f64, target_value: f64) -> Option<f64> {
    if !(first_value.is_finite() && latest_value.is_finite() && target_value.is_finite()) {
        return None;
    }
    let pct = match GoalDirection::classify(first_value, target_value) {
        GoalDirection::Reached => 100.0,
        GoalDirection::Decrease => {
            (first_value - latest_value) / (first_value - target_value) * 100.0
        }
        GoalDirection::Increase => {
            (latest_value - first_value) / (target_value - first_value) * 100.0
        }
    };
    Some(pct.clamp(0.0, 100.0))
}

/// Progress toward a target from a baseline.
///
/// `server_on_track` is the backend's pace classification; when it is missing
/// the result reports "not on track". A baseline that already equals the
/// target is complete and on track. Non-finite input yields
/// [`GoalProgress::INSUFFICIENT`].
#[must_use]
pub fn goal_progress(
    first_value: f64,
    latest_value: f64,
    target_value: f64,
    server_on_track: Option<bool>,
) -> GoalProgress {
    let Some(progress_pct) = progress_percent(first_value, latest_value, target_value) else {
        return GoalProgress::INSUFFICIENT;
    };
    let on_track = match GoalDirection::classify(first_value, target_value) {
        GoalDirection::Reached => true,
        _ => server_on_track.unwrap_or(false),
    };
    GoalProgress {
        progress_pct,
        on_track,
    }
}

/// Progress for `goal` from the oldest and newest points of its metric's daily
/// series. The series must be ascending by day, as produced by
/// [`crate::aggregate::daily_series`].
#[must_use]
pub fn progress_for_goal(goal: &Goal, series: &[DailyPoint], on_track: Option<bool>) -> GoalProgress {
    let (Some(first), Some(latest)) = (series.first(), series.last()) else {
        return GoalProgress::INSUFFICIENT;
    };
    goal_progress(
        first.value,
        latest.value,
        goal.target_value,
        on_track.or(goal.on_track),
    )
}
