use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::aggregate::{daily_series, filter_range, samples_from_points};
use crate::error::MetricsError;
use crate::labels::axis_labels;
use crate::models::{ChartRange, ChartResponse, DailyPoint, MetricKind, MetricSample};
use crate::trend::{format_metric_value, per_week_unit, trend_label};
use crate::units::{WeightUnit, display_value, from_canonical, round1};

/// Tag attached to every outgoing fetch. Later requests compare greater.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Hands out generations and tells whether a finished fetch is still wanted.
#[derive(Debug, Default)]
pub struct RequestTracker {
    current: Generation,
}

impl RequestTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request; every earlier generation becomes stale.
    pub fn begin(&mut self) -> Generation {
        self.current = Generation(self.current.0 + 1);
        self.current
    }

    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.current
    }

    /// Pass `payload` through only if `generation` is the latest one issued.
    pub fn accept<T>(&self, generation: Generation, payload: T) -> Option<T> {
        if self.is_current(generation) {
            Some(payload)
        } else {
            tracing::debug!(
                stale = generation.value(),
                current = self.current.value(),
                "dropping stale response"
            );
            None
        }
    }
}

/// Everything about the viewer that shapes the derived chart, besides the zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayContext {
    pub metric: MetricKind,
    pub unit: WeightUnit,
    pub range: ChartRange,
    pub now: DateTime<Utc>,
}

/// Chart-ready state derived from one accepted response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedState {
    pub generation: Generation,
    pub metric: MetricKind,
    pub unit: WeightUnit,
    pub range: ChartRange,
    /// Daily values in the display unit.
    pub series: Vec<DailyPoint>,
    pub labels: Vec<String>,
    /// Backend trend delta in the display unit, rounded to one decimal.
    pub trend: f64,
    pub trend_label: String,
    pub per_week_unit: String,
    pub latest: Option<String>,
    /// Daily values in the canonical unit, for goal progress.
    #[serde(skip)]
    pub canonical: Vec<DailyPoint>,
}

/// Derive chart state from already-parsed samples. A non-finite `trend` is
/// treated as no change.
#[must_use]
pub fn refresh<Tz: TimeZone>(
    generation: Generation,
    samples: &[MetricSample],
    trend: f64,
    ctx: &DisplayContext,
    tz: &Tz,
) -> DerivedState {
    let in_range = filter_range(samples, ctx.range, ctx.now, tz);
    let canonical = daily_series(&in_range, tz);

    let converts = ctx.metric.follows_weight_unit();
    let series: Vec<DailyPoint> = canonical
        .iter()
        .map(|p| DailyPoint {
            day: p.day,
            value: if converts {
                display_value(p.value, ctx.unit)
            } else {
                p.value
            },
        })
        .collect();

    let trend = if trend.is_finite() { trend } else { 0.0 };
    let shown_trend = if converts {
        from_canonical(trend, ctx.unit)
    } else {
        trend
    };

    DerivedState {
        generation,
        metric: ctx.metric,
        unit: ctx.unit,
        range: ctx.range,
        labels: axis_labels(&series),
        series,
        trend: round1(shown_trend),
        trend_label: trend_label(shown_trend, ctx.metric.value_kind()),
        per_week_unit: per_week_unit(ctx.metric, ctx.unit),
        latest: canonical
            .last()
            .map(|p| format_metric_value(ctx.metric, p.value, ctx.unit)),
        canonical,
    }
}

/// Parse a raw backend response and derive its state.
pub fn refresh_response<Tz: TimeZone>(
    generation: Generation,
    response: &ChartResponse,
    ctx: &DisplayContext,
    tz: &Tz,
) -> Result<DerivedState, MetricsError> {
    let samples = samples_from_points(&response.points)?;
    Ok(refresh(generation, &samples, response.trend, ctx, tz))
}

/// Holds the chart currently on screen and ignores responses that arrive after
/// a newer request was issued.
#[derive(Debug)]
pub struct Dashboard<Tz: TimeZone> {
    tracker: RequestTracker,
    ctx: DisplayContext,
    tz: Tz,
    state: Option<DerivedState>,
}

impl<Tz: TimeZone> Dashboard<Tz> {
    pub fn new(ctx: DisplayContext, tz: Tz) -> Self {
        Self {
            tracker: RequestTracker::new(),
            ctx,
            tz,
            state: None,
        }
    }

    /// Start a fetch for the current context.
    pub fn request(&mut self) -> Generation {
        self.tracker.begin()
    }

    /// Switch metric, unit or range. In-flight fetches become stale.
    pub fn set_context(&mut self, ctx: DisplayContext) -> Generation {
        self.ctx = ctx;
        self.tracker.begin()
    }

    /// Apply a finished fetch. Returns `Ok(false)` when the response was stale
    /// and left the current state untouched.
    pub fn complete(
        &mut self,
        generation: Generation,
        response: &ChartResponse,
    ) -> Result<bool, MetricsError> {
        let Some(response) = self.tracker.accept(generation, response) else {
            return Ok(false);
        };
        let derived = refresh_response(generation, response, &self.ctx, &self.tz)?;
        self.state = Some(derived);
        Ok(true)
    }

    #[must_use]
    pub fn state(&self) -> Option<&DerivedState> {
        self.state.as_ref()
    }

    #[must_use]
    pub fn into_state(self) -> Option<DerivedState> {
        self.state
    }
}
