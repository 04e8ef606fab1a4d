use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::aggregate::{daily_series, samples_from_points};
use crate::db::{Database, KNOWN_SETTINGS, SETTING_API_URL, SETTING_USER_ID, SETTING_WEIGHT_UNIT};
use crate::entries::{
    MetricEdit, MetricEntry, Verification, VerifyAck, VerifyMethod, newest_first,
};
use crate::models::{
    ChartRange, ChartResponse, DailyPoint, Goal, GoalDraft, GoalProgress, GoalProgressResult,
    GoalStatus, MetricKind, parse_goal_date, parse_timestamp, validate_goal,
};
use crate::progress::{ProgressBand, progress_for_goal};
use crate::refresh::{Dashboard, DerivedState, DisplayContext};
use crate::units::{WeightUnit, to_canonical};

/// Source and sink of metric history and goals.
///
/// The CLI implements this with reqwest against the metrics backend; tests use
/// an in-memory mock. Called synchronously.
pub trait MetricsProvider: Send + Sync {
    fn fetch_chart(&self, metric: MetricKind, range: ChartRange) -> Result<ChartResponse>;
    fn fetch_goals(&self) -> Result<Vec<Goal>>;
    fn fetch_goal_progress(&self, goal_id: i64) -> Result<GoalProgressResult>;
    fn create_goal(&self, draft: &GoalDraft) -> Result<()>;
    fn update_goal(&self, goal_id: i64, draft: &GoalDraft) -> Result<()>;
    fn delete_goal(&self, goal_id: i64) -> Result<()>;

    /// Every upload for the user, in whatever order the backend returns them.
    fn fetch_entries(&self) -> Result<Vec<MetricEntry>>;
    /// The most recent upload, if there is one.
    fn fetch_latest_entry(&self) -> Result<Option<MetricEntry>>;
    fn update_entry(&self, entry_id: i64, edit: &MetricEdit) -> Result<()>;
    fn delete_entry(&self, entry_id: i64) -> Result<()>;
    fn verify_entry(&self, entry_id: i64, verification: &Verification) -> Result<VerifyAck>;
}

/// A goal with its locally computed completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalSummary {
    #[serde(flatten)]
    pub goal: Goal,
    pub progress: GoalProgress,
    pub band: ProgressBand,
    /// Days from today (viewer zone) until the target date; negative once past.
    pub days_left: i64,
}

/// A goal that could not be summarized, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedGoal {
    pub id: i64,
    pub error: String,
}

/// Goals list. One malformed goal does not hide the others.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalList {
    pub goals: Vec<GoalSummary>,
    pub skipped: Vec<SkippedGoal>,
}

/// Latest scan after its composition was verified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VerifiedScan {
    pub entry_id: i64,
    #[serde(flatten)]
    pub values: Verification,
    /// Whether either value was clamped into range before sending.
    pub clamped: bool,
}

/// Goal detail view: local progress plus the backend's projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalDetail {
    #[serde(flatten)]
    pub summary: GoalSummary,
    pub projection: GoalProgressResult,
}

pub struct TrendService {
    db: Database,
}

impl TrendService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Preferences ---

    pub fn weight_unit(&self) -> Result<WeightUnit> {
        self.db.weight_unit()
    }

    pub fn set_weight_unit(&self, unit: WeightUnit) -> Result<()> {
        self.db.set_weight_unit(unit)
    }

    pub fn toggle_weight_unit(&self) -> Result<WeightUnit> {
        let next = self.db.weight_unit()?.toggled();
        self.db.set_weight_unit(next)?;
        Ok(next)
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.db.get_setting(key)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        self.db.list_settings()
    }

    /// Store a known preference after validating its value.
    pub fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            SETTING_WEIGHT_UNIT => {
                let unit: WeightUnit = value.parse()?;
                return self.db.set_weight_unit(unit);
            }
            SETTING_API_URL => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    bail!("api_url must start with http:// or https://");
                }
                return self.db.set_setting(key, value.trim_end_matches('/'));
            }
            SETTING_USER_ID => {
                if value.is_empty() {
                    bail!("user_id must not be empty");
                }
            }
            _ => bail!(
                "Unknown setting '{key}'. Valid settings: {}",
                KNOWN_SETTINGS.join(", ")
            ),
        }
        self.db.set_setting(key, value)
    }

    pub fn clear_preference(&self, key: &str) -> Result<bool> {
        if !KNOWN_SETTINGS.contains(&key) {
            bail!(
                "Unknown setting '{key}'. Valid settings: {}",
                KNOWN_SETTINGS.join(", ")
            );
        }
        self.db.delete_setting(key)
    }

    // --- Charts ---

    /// Fetch and derive one metric chart in the stored display unit.
    pub fn chart<Tz: TimeZone>(
        &self,
        provider: &dyn MetricsProvider,
        metric: MetricKind,
        range: ChartRange,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> Result<DerivedState> {
        let ctx = DisplayContext {
            metric,
            unit: self.db.weight_unit()?,
            range,
            now,
        };
        let mut dashboard = Dashboard::new(ctx, tz.clone());
        let generation = dashboard.request();
        let response = provider
            .fetch_chart(metric, range)
            .with_context(|| format!("Failed to fetch {metric} history"))?;
        dashboard.complete(generation, &response)?;
        dashboard
            .into_state()
            .context("Chart response was superseded before it could be applied")
    }

    // --- Goals ---

    /// Goals with progress computed from each metric's full history. Only
    /// active goals unless `include_closed`.
    pub fn goals_with_progress<Tz: TimeZone>(
        &self,
        provider: &dyn MetricsProvider,
        include_closed: bool,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> Result<GoalList> {
        let goals: Vec<Goal> = provider
            .fetch_goals()
            .context("Failed to fetch goals")?
            .into_iter()
            .filter(|g| include_closed || g.status == GoalStatus::Active)
            .collect();

        let mut history: HashMap<MetricKind, Vec<DailyPoint>> = HashMap::new();
        let mut summaries = Vec::with_capacity(goals.len());
        let mut skipped = Vec::new();
        for goal in goals {
            if !history.contains_key(&goal.metric) {
                let series = full_history(provider, goal.metric, tz)?;
                history.insert(goal.metric, series);
            }
            let series = history.get(&goal.metric).map_or(&[][..], Vec::as_slice);
            let id = goal.id;
            match summarize(goal, series, None, tz, now) {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    tracing::warn!(goal = id, "skipping goal: {e:#}");
                    skipped.push(SkippedGoal {
                        id,
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        Ok(GoalList {
            goals: summaries,
            skipped,
        })
    }

    pub fn goal_details<Tz: TimeZone>(
        &self,
        provider: &dyn MetricsProvider,
        goal_id: i64,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> Result<GoalDetail> {
        let goal = find_goal(provider, goal_id)?;
        let projection = provider
            .fetch_goal_progress(goal_id)
            .with_context(|| format!("Failed to fetch progress for goal {goal_id}"))?;
        let series = full_history(provider, goal.metric, tz)?;
        let summary = summarize(goal, &series, projection.on_track, tz, now)?;
        Ok(GoalDetail {
            summary,
            projection,
        })
    }

    /// Create a goal. A weight target is read in `entered_in` (the stored
    /// display unit when `None`) and sent in canonical pounds.
    pub fn create_goal(
        &self,
        provider: &dyn MetricsProvider,
        metric: MetricKind,
        target: f64,
        entered_in: Option<WeightUnit>,
        target_date: &str,
    ) -> Result<GoalDraft> {
        let target_value = self.canonical_target(metric, target, entered_in)?;
        let draft = GoalDraft::new(metric, target_value, parse_goal_date(target_date)?)?;
        provider
            .create_goal(&draft)
            .context("Failed to create goal")?;
        tracing::info!(%metric, target = draft.target_value, "created goal");
        Ok(draft)
    }

    /// Change a goal's target and/or date. Fields left as `None` keep the
    /// stored value untouched.
    pub fn update_goal(
        &self,
        provider: &dyn MetricsProvider,
        goal_id: i64,
        target: Option<f64>,
        entered_in: Option<WeightUnit>,
        target_date: Option<&str>,
    ) -> Result<GoalDraft> {
        if target.is_none() && target_date.is_none() {
            bail!("Nothing to change. Pass a new target and/or date");
        }
        let goal = find_goal(provider, goal_id)?;
        let target_value = match target {
            Some(v) => self.canonical_target(goal.metric, v, entered_in)?,
            None => goal.target_value,
        };
        let day = match target_date {
            Some(raw) => parse_goal_date(raw)?,
            None => goal.target_day()?,
        };
        let draft = GoalDraft::new(goal.metric, target_value, day)?;
        provider
            .update_goal(goal_id, &draft)
            .with_context(|| format!("Failed to update goal {goal_id}"))?;
        Ok(draft)
    }

    pub fn delete_goal(&self, provider: &dyn MetricsProvider, goal_id: i64) -> Result<()> {
        provider
            .delete_goal(goal_id)
            .with_context(|| format!("Failed to delete goal {goal_id}"))
    }

    fn canonical_target(
        &self,
        metric: MetricKind,
        target: f64,
        entered_in: Option<WeightUnit>,
    ) -> Result<f64> {
        if !metric.follows_weight_unit() {
            return Ok(target);
        }
        let unit = match entered_in {
            Some(unit) => unit,
            None => self.db.weight_unit()?,
        };
        Ok(to_canonical(target, unit))
    }

    // --- Upload history ---

    /// All uploads, newest first.
    pub fn history(&self, provider: &dyn MetricsProvider) -> Result<Vec<MetricEntry>> {
        let entries = provider
            .fetch_entries()
            .context("Failed to fetch metric history")?;
        Ok(newest_first(entries)?)
    }

    pub fn delete_entry(&self, provider: &dyn MetricsProvider, entry_id: i64) -> Result<()> {
        provider
            .delete_entry(entry_id)
            .with_context(|| format!("Failed to delete metric entry {entry_id}"))
    }

    /// Correct an upload's weight and optionally its timestamp. The weight is
    /// read in `entered_in` (stored display unit when `None`) and sent in
    /// canonical pounds; the timestamp defaults to the entry's own.
    pub fn edit_entry(
        &self,
        provider: &dyn MetricsProvider,
        entry_id: i64,
        weight: f64,
        entered_in: Option<WeightUnit>,
        taken_at: Option<&str>,
    ) -> Result<MetricEdit> {
        let entry = provider
            .fetch_entries()
            .context("Failed to fetch metric history")?
            .into_iter()
            .find(|e| e.id == entry_id)
            .with_context(|| format!("Metric entry {entry_id} not found"))?;
        let taken = match taken_at {
            Some(raw) => parse_timestamp(raw)?,
            None => entry.taken()?,
        };
        let unit = match entered_in {
            Some(unit) => unit,
            None => self.db.weight_unit()?,
        };
        let edit = MetricEdit::new(weight, unit, taken)?;
        provider
            .update_entry(entry_id, &edit)
            .with_context(|| format!("Failed to update metric entry {entry_id}"))?;
        Ok(edit)
    }

    /// Replace the latest scan's fat and muscle percentages with verified
    /// values.
    pub fn verify_latest(
        &self,
        provider: &dyn MetricsProvider,
        fat_percent: f64,
        skeletal_muscle_percent: f64,
        method: VerifyMethod,
    ) -> Result<VerifiedScan> {
        let verification = Verification::new(fat_percent, skeletal_muscle_percent, method)?;
        let latest = provider
            .fetch_latest_entry()
            .context("Failed to fetch the latest scan")?
            .context("No recent scan found to update")?;
        let ack = provider
            .verify_entry(latest.id, &verification)
            .with_context(|| format!("Failed to verify scan {}", latest.id))?;
        let clamped = (verification.fat_percent - fat_percent).abs() > f64::EPSILON
            || (verification.skeletal_muscle_percent - skeletal_muscle_percent).abs()
                > f64::EPSILON;
        Ok(VerifiedScan {
            entry_id: latest.id,
            values: verification.confirmed(&ack),
            clamped,
        })
    }
}

fn find_goal(provider: &dyn MetricsProvider, goal_id: i64) -> Result<Goal> {
    provider
        .fetch_goals()
        .context("Failed to fetch goals")?
        .into_iter()
        .find(|g| g.id == goal_id)
        .with_context(|| format!("Goal {goal_id} not found"))
}

fn full_history<Tz: TimeZone>(
    provider: &dyn MetricsProvider,
    metric: MetricKind,
    tz: &Tz,
) -> Result<Vec<DailyPoint>> {
    let response = provider
        .fetch_chart(metric, ChartRange::Max)
        .with_context(|| format!("Failed to fetch {metric} history"))?;
    let samples = samples_from_points(&response.points)?;
    Ok(daily_series(&samples, tz))
}

fn summarize<Tz: TimeZone>(
    goal: Goal,
    series: &[DailyPoint],
    on_track: Option<bool>,
    tz: &Tz,
    now: DateTime<Utc>,
) -> Result<GoalSummary> {
    validate_goal(&goal).with_context(|| format!("Goal {} is malformed", goal.id))?;
    let today = now.with_timezone(tz).date_naive();
    let days_left = (goal.target_day()? - today).num_days();
    let progress = progress_for_goal(&goal, series, on_track);
    Ok(GoalSummary {
        band: ProgressBand::from_pct(progress.progress_pct),
        progress,
        days_left,
        goal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricPoint;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        CreateGoal(GoalDraft),
        UpdateGoal(i64, GoalDraft),
        DeleteGoal(i64),
        UpdateEntry(i64, MetricEdit),
        DeleteEntry(i64),
        Verify(i64, Verification),
    }

    struct MockProvider {
        charts: HashMap<MetricKind, ChartResponse>,
        goals: Vec<Goal>,
        progress: HashMap<i64, GoalProgressResult>,
        entries: Vec<MetricEntry>,
        verify_ack: VerifyAck,
        chart_calls: Mutex<Vec<(MetricKind, ChartRange)>>,
        sent: Mutex<Vec<Sent>>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                charts: HashMap::new(),
                goals: Vec::new(),
                progress: HashMap::new(),
                entries: Vec::new(),
                verify_ack: VerifyAck::default(),
                chart_calls: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, sent: Sent) -> Result<()> {
            self.sent.lock().unwrap().push(sent);
            Ok(())
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MetricsProvider for MockProvider {
        fn fetch_chart(&self, metric: MetricKind, range: ChartRange) -> Result<ChartResponse> {
            self.chart_calls.lock().unwrap().push((metric, range));
            Ok(self.charts.get(&metric).cloned().unwrap_or_default())
        }

        fn fetch_goals(&self) -> Result<Vec<Goal>> {
            Ok(self.goals.clone())
        }

        fn fetch_goal_progress(&self, goal_id: i64) -> Result<GoalProgressResult> {
            self.progress
                .get(&goal_id)
                .cloned()
                .with_context(|| format!("no progress for {goal_id}"))
        }

        fn create_goal(&self, draft: &GoalDraft) -> Result<()> {
            self.record(Sent::CreateGoal(draft.clone()))
        }

        fn update_goal(&self, goal_id: i64, draft: &GoalDraft) -> Result<()> {
            self.record(Sent::UpdateGoal(goal_id, draft.clone()))
        }

        fn delete_goal(&self, goal_id: i64) -> Result<()> {
            self.record(Sent::DeleteGoal(goal_id))
        }

        fn fetch_entries(&self) -> Result<Vec<MetricEntry>> {
            Ok(self.entries.clone())
        }

        fn fetch_latest_entry(&self) -> Result<Option<MetricEntry>> {
            Ok(newest_first(self.entries.clone())?.into_iter().next())
        }

        fn update_entry(&self, entry_id: i64, edit: &MetricEdit) -> Result<()> {
            self.record(Sent::UpdateEntry(entry_id, edit.clone()))
        }

        fn delete_entry(&self, entry_id: i64) -> Result<()> {
            self.record(Sent::DeleteEntry(entry_id))
        }

        fn verify_entry(&self, entry_id: i64, verification: &Verification) -> Result<VerifyAck> {
            self.record(Sent::Verify(entry_id, *verification))?;
            Ok(self.verify_ack.clone())
        }
    }

    fn entry(id: i64, taken_at: &str, weight: f64) -> MetricEntry {
        MetricEntry {
            id,
            taken_at: taken_at.to_string(),
            weight: Some(weight),
            bmi: None,
            fat_percent: Some(22.0),
            fat_mass: None,
            skeletal_muscle_percent: Some(38.0),
            skeletal_muscle_pounds: None,
            verified_method: None,
            verified_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap()
    }

    fn chart(points: &[(&str, Option<f64>)], trend: f64) -> ChartResponse {
        ChartResponse {
            points: points
                .iter()
                .map(|&(taken_at, value)| MetricPoint {
                    taken_at: taken_at.to_string(),
                    value,
                })
                .collect(),
            trend,
        }
    }

    fn goal(id: i64, metric: MetricKind, target_value: f64, status: GoalStatus) -> Goal {
        Goal {
            id,
            metric,
            target_value,
            target_date: "2024-06-30".to_string(),
            status,
            on_track: None,
        }
    }

    fn weight_provider() -> MockProvider {
        let mut p = MockProvider::new();
        p.charts.insert(
            MetricKind::Weight,
            chart(
                &[
                    ("2024-06-01T08:00:00Z", Some(200.0)),
                    ("2024-06-10T08:00:00Z", Some(195.0)),
                    ("2024-06-19T08:00:00Z", Some(190.0)),
                ],
                -1.0,
            ),
        );
        p
    }

    #[test]
    fn test_chart_uses_stored_unit() {
        let service = TrendService::new_in_memory().unwrap();
        service.set_weight_unit(WeightUnit::Kg).unwrap();
        let provider = weight_provider();

        let state = service
            .chart(&provider, MetricKind::Weight, ChartRange::Month, &Utc, now())
            .unwrap();
        assert_eq!(state.unit, WeightUnit::Kg);
        assert_eq!(state.series.len(), 3);
        assert!((state.series[0].value - 90.7).abs() < 1e-9);
        assert_eq!(state.per_week_unit, "kg/week");
        assert_eq!(
            provider.chart_calls.lock().unwrap().as_slice(),
            &[(MetricKind::Weight, ChartRange::Month)]
        );
    }

    #[test]
    fn test_chart_bad_timestamp_is_error() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = MockProvider::new();
        provider
            .charts
            .insert(MetricKind::Bmi, chart(&[("later", Some(24.0))], 0.0));
        assert!(
            service
                .chart(&provider, MetricKind::Bmi, ChartRange::Max, &Utc, now())
                .is_err()
        );
    }

    #[test]
    fn test_goals_with_progress() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = weight_provider();
        let mut g = goal(1, MetricKind::Weight, 180.0, GoalStatus::Active);
        g.on_track = Some(true);
        provider.goals = vec![g, goal(2, MetricKind::Weight, 170.0, GoalStatus::Completed)];

        let list = service
            .goals_with_progress(&provider, false, &Utc, now())
            .unwrap();
        assert_eq!(list.goals.len(), 1);
        assert!(list.skipped.is_empty());
        let s = &list.goals[0];
        assert!((s.progress.progress_pct - 50.0).abs() < 1e-9);
        assert!(s.progress.on_track);
        assert_eq!(s.band, ProgressBand::Behind);
        assert_eq!(s.days_left, 10);
        assert_eq!(
            provider.chart_calls.lock().unwrap().as_slice(),
            &[(MetricKind::Weight, ChartRange::Max)]
        );
    }

    #[test]
    fn test_goals_share_history_per_metric() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = weight_provider();
        provider.goals = vec![
            goal(1, MetricKind::Weight, 180.0, GoalStatus::Active),
            goal(2, MetricKind::Weight, 170.0, GoalStatus::Completed),
            goal(3, MetricKind::FatPercent, 18.0, GoalStatus::Active),
        ];
        let goals = service
            .goals_with_progress(&provider, true, &Utc, now())
            .unwrap()
            .goals;
        assert_eq!(goals.len(), 3);
        assert_eq!(provider.chart_calls.lock().unwrap().len(), 2);
        // No fat history at all.
        assert_eq!(goals[2].progress, GoalProgress::INSUFFICIENT);
    }

    #[test]
    fn test_goals_malformed_goal_is_skipped_not_fatal() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = weight_provider();
        let mut bad = goal(1, MetricKind::Weight, 180.0, GoalStatus::Active);
        bad.target_date = "next spring".to_string();
        provider.goals = vec![bad, goal(2, MetricKind::Weight, 185.0, GoalStatus::Active)];

        let list = service
            .goals_with_progress(&provider, false, &Utc, now())
            .unwrap();
        assert_eq!(list.goals.len(), 1);
        assert_eq!(list.goals[0].goal.id, 2);
        assert_eq!(list.skipped.len(), 1);
        assert_eq!(list.skipped[0].id, 1);
        assert!(list.skipped[0].error.contains("next spring"));
    }

    #[test]
    fn test_goal_details_malformed_date_is_error() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = weight_provider();
        let mut g = goal(1, MetricKind::Weight, 180.0, GoalStatus::Active);
        g.target_date = "next spring".to_string();
        provider.goals = vec![g];
        provider.progress.insert(1, GoalProgressResult::default());
        assert!(service.goal_details(&provider, 1, &Utc, now()).is_err());
    }

    #[test]
    fn test_create_weight_goal_in_kg_sends_unrounded_lbs() {
        let service = TrendService::new_in_memory().unwrap();
        service.set_weight_unit(WeightUnit::Kg).unwrap();
        let provider = MockProvider::new();

        let draft = service
            .create_goal(&provider, MetricKind::Weight, 80.0, None, "2024-09-01")
            .unwrap();
        assert!((draft.target_value - 80.0 * 2.20462).abs() < 1e-9);
        assert_eq!(provider.sent(), vec![Sent::CreateGoal(draft)]);
    }

    #[test]
    fn test_create_goal_explicit_unit_overrides_preference() {
        let service = TrendService::new_in_memory().unwrap();
        service.set_weight_unit(WeightUnit::Kg).unwrap();
        let provider = MockProvider::new();
        let draft = service
            .create_goal(
                &provider,
                MetricKind::Weight,
                176.0,
                Some(WeightUnit::Lbs),
                "2024-09-01T00:00:00Z",
            )
            .unwrap();
        assert!((draft.target_value - 176.0).abs() < f64::EPSILON);
        assert_eq!(draft.target_date, "2024-09-01");
    }

    #[test]
    fn test_create_percent_goal_is_not_converted() {
        let service = TrendService::new_in_memory().unwrap();
        service.set_weight_unit(WeightUnit::Kg).unwrap();
        let provider = MockProvider::new();
        let draft = service
            .create_goal(&provider, MetricKind::FatPercent, 18.0, None, "2024-09-01")
            .unwrap();
        assert!((draft.target_value - 18.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_create_invalid_goal_sends_nothing() {
        let service = TrendService::new_in_memory().unwrap();
        let provider = MockProvider::new();
        assert!(
            service
                .create_goal(&provider, MetricKind::FatPercent, 140.0, None, "2024-09-01")
                .is_err()
        );
        assert!(
            service
                .create_goal(&provider, MetricKind::Bmi, 22.0, None, "someday")
                .is_err()
        );
        assert!(provider.sent().is_empty());
    }

    #[test]
    fn test_update_goal_keeps_untouched_fields() {
        let service = TrendService::new_in_memory().unwrap();
        service.set_weight_unit(WeightUnit::Kg).unwrap();
        let mut provider = MockProvider::new();
        provider.goals = vec![goal(5, MetricKind::Weight, 176.37, GoalStatus::Active)];

        let draft = service
            .update_goal(&provider, 5, None, None, Some("2024-12-31"))
            .unwrap();
        // The stored pounds are sent back as-is, not round-tripped through kg.
        assert!((draft.target_value - 176.37).abs() < f64::EPSILON);
        assert_eq!(draft.target_date, "2024-12-31");

        let draft = service.update_goal(&provider, 5, Some(79.0), None, None).unwrap();
        assert!((draft.target_value - 79.0 * 2.20462).abs() < 1e-9);
        assert_eq!(draft.target_date, "2024-06-30");
        assert_eq!(provider.sent().len(), 2);
    }

    #[test]
    fn test_update_goal_requires_a_change_and_an_existing_goal() {
        let service = TrendService::new_in_memory().unwrap();
        let provider = MockProvider::new();
        assert!(service.update_goal(&provider, 5, None, None, None).is_err());
        let err = service
            .update_goal(&provider, 5, Some(170.0), None, None)
            .unwrap_err();
        assert!(err.to_string().contains("Goal 5 not found"));
        assert!(provider.sent().is_empty());
    }

    #[test]
    fn test_delete_goal() {
        let service = TrendService::new_in_memory().unwrap();
        let provider = MockProvider::new();
        service.delete_goal(&provider, 9).unwrap();
        assert_eq!(provider.sent(), vec![Sent::DeleteGoal(9)]);
    }

    #[test]
    fn test_history_newest_first() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = MockProvider::new();
        provider.entries = vec![
            entry(1, "2024-06-01T08:00:00Z", 200.0),
            entry(2, "2024-06-19T08:00:00Z", 190.0),
            entry(3, "2024-06-10T08:00:00Z", 195.0),
        ];
        let ids: Vec<i64> = service
            .history(&provider)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_edit_entry_in_kg_keeps_timestamp() {
        let service = TrendService::new_in_memory().unwrap();
        service.set_weight_unit(WeightUnit::Kg).unwrap();
        let mut provider = MockProvider::new();
        provider.entries = vec![entry(4, "2024-06-10T08:00:00Z", 195.0)];

        let edit = service.edit_entry(&provider, 4, 88.0, None, None).unwrap();
        assert!((edit.weight - 88.0 * 2.20462).abs() < 1e-9);
        assert_eq!(edit.taken_at, "2024-06-10T08:00:00.000Z");
        assert_eq!(provider.sent(), vec![Sent::UpdateEntry(4, edit)]);
    }

    #[test]
    fn test_edit_entry_new_timestamp_and_missing_entry() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = MockProvider::new();
        provider.entries = vec![entry(4, "2024-06-10T08:00:00Z", 195.0)];

        let edit = service
            .edit_entry(&provider, 4, 194.0, None, Some("2024-06-11T07:30:00+02:00"))
            .unwrap();
        assert_eq!(edit.taken_at, "2024-06-11T05:30:00.000Z");

        let err = service
            .edit_entry(&provider, 5, 194.0, None, None)
            .unwrap_err();
        assert!(err.to_string().contains("Metric entry 5 not found"));
        assert!(service.edit_entry(&provider, 4, -1.0, None, None).is_err());
        assert_eq!(provider.sent().len(), 1);
    }

    #[test]
    fn test_delete_entry() {
        let service = TrendService::new_in_memory().unwrap();
        let provider = MockProvider::new();
        service.delete_entry(&provider, 3).unwrap();
        assert_eq!(provider.sent(), vec![Sent::DeleteEntry(3)]);
    }

    #[test]
    fn test_verify_latest_targets_newest_scan() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = MockProvider::new();
        provider.entries = vec![
            entry(1, "2024-06-01T08:00:00Z", 200.0),
            entry(2, "2024-06-19T08:00:00Z", 190.0),
        ];
        provider.verify_ack = VerifyAck {
            fat_percent: Some(24.5),
            skeletal_muscle_percent: None,
        };

        let scan = service
            .verify_latest(&provider, 24.5, 85.0, VerifyMethod::Dexa)
            .unwrap();
        assert_eq!(scan.entry_id, 2);
        assert!(scan.clamped);
        assert!((scan.values.skeletal_muscle_percent - 80.0).abs() < f64::EPSILON);
        match provider.sent().as_slice() {
            [Sent::Verify(2, v)] => {
                assert!((v.skeletal_muscle_percent - 80.0).abs() < f64::EPSILON);
                assert_eq!(v.verify_method, VerifyMethod::Dexa);
            }
            other => panic!("unexpected calls: {other:?}"),
        }
    }

    #[test]
    fn test_verify_latest_rejects_before_sending() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = MockProvider::new();
        provider.entries = vec![entry(1, "2024-06-01T08:00:00Z", 200.0)];
        assert!(
            service
                .verify_latest(&provider, 70.0, 60.0, VerifyMethod::Dexa)
                .is_err()
        );
        assert!(provider.sent().is_empty());

        let empty = MockProvider::new();
        let err = service
            .verify_latest(&empty, 20.0, 40.0, VerifyMethod::Other)
            .unwrap_err();
        assert!(err.to_string().contains("No recent scan"));
    }

    #[test]
    fn test_goal_details_uses_server_on_track() {
        let service = TrendService::new_in_memory().unwrap();
        let mut provider = weight_provider();
        provider.goals = vec![goal(4, MetricKind::Weight, 180.0, GoalStatus::Active)];
        provider.progress.insert(
            4,
            GoalProgressResult {
                predicted_value: Some(184.0),
                difference_to_goal: Some(4.0),
                weekly_change: Some(-2.5),
                required_weekly_change: Some(-7.0),
                on_track: Some(false),
            },
        );

        let detail = service.goal_details(&provider, 4, &Utc, now()).unwrap();
        assert!(!detail.summary.progress.on_track);
        assert!((detail.summary.progress.progress_pct - 50.0).abs() < 1e-9);
        assert_eq!(detail.projection.predicted_value, Some(184.0));
    }

    #[test]
    fn test_goal_details_not_found() {
        let service = TrendService::new_in_memory().unwrap();
        let provider = weight_provider();
        let err = service.goal_details(&provider, 99, &Utc, now()).unwrap_err();
        assert!(err.to_string().contains("Goal 99 not found"));
    }

    #[test]
    fn test_toggle_weight_unit() {
        let service = TrendService::new_in_memory().unwrap();
        assert_eq!(service.toggle_weight_unit().unwrap(), WeightUnit::Kg);
        assert_eq!(service.toggle_weight_unit().unwrap(), WeightUnit::Lbs);
    }

    #[test]
    fn test_set_preference_validation() {
        let service = TrendService::new_in_memory().unwrap();
        service.set_preference("weight_unit", "KG").unwrap();
        assert_eq!(service.weight_unit().unwrap(), WeightUnit::Kg);

        service
            .set_preference("api_url", "https://metrics.example.com/")
            .unwrap();
        assert_eq!(
            service.get_setting("api_url").unwrap().as_deref(),
            Some("https://metrics.example.com")
        );

        service.set_preference("user_id", "42/").unwrap();
        assert_eq!(
            service.get_setting("user_id").unwrap().as_deref(),
            Some("42/")
        );

        assert!(service.set_preference("weight_unit", "stone").is_err());
        assert!(service.set_preference("api_url", "ftp://x").is_err());
        assert!(service.set_preference("user_id", "  ").is_err());
        assert!(service.set_preference("theme", "dark").is_err());
    }

    #[test]
    fn test_clear_preference() {
        let service = TrendService::new_in_memory().unwrap();
        service.set_preference("user_id", "42").unwrap();
        assert!(service.clear_preference("user_id").unwrap());
        assert!(!service.clear_preference("user_id").unwrap());
        assert!(service.clear_preference("theme").is_err());
    }
}
