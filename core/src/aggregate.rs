use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use crate::error::MetricsError;
use crate::models::{ChartRange, DailyPoint, MetricPoint, MetricSample};

/// Parse wire points into samples. The first malformed timestamp aborts the
/// whole batch.
pub fn samples_from_points(points: &[MetricPoint]) -> Result<Vec<MetricSample>, MetricsError> {
    points.iter().map(MetricPoint::to_sample).collect()
}

/// Collapse samples into one point per calendar day in `tz`, ascending by day.
///
/// Samples without a finite value are dropped. Within a day the latest
/// `taken_at` wins; when two samples share the exact same instant, the one
/// appearing later in `samples` wins.
pub fn daily_series<Tz: TimeZone>(samples: &[MetricSample], tz: &Tz) -> Vec<DailyPoint> {
    let mut latest_by_day: HashMap<NaiveDate, (DateTime<Utc>, f64)> = HashMap::new();
    let mut discarded = 0usize;

    for sample in samples {
        let Some(value) = sample.value.filter(|v| v.is_finite()) else {
            discarded += 1;
            continue;
        };
        let day = sample.taken_at.with_timezone(tz).date_naive();
        match latest_by_day.entry(day) {
            Entry::Occupied(mut slot) => {
                if sample.taken_at >= slot.get().0 {
                    slot.insert((sample.taken_at, value));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert((sample.taken_at, value));
            }
        }
    }

    if discarded > 0 {
        tracing::debug!(discarded, "dropped samples without a usable value");
    }

    let mut series: Vec<DailyPoint> = latest_by_day
        .into_iter()
        .map(|(day, (_, value))| DailyPoint { day, value })
        .collect();
    series.sort_by_key(|p| p.day);
    series
}

/// Apply the client-side part of a chart range. The backend already trims
/// every range except year-to-date, whose start depends on the viewer's zone:
/// only samples at or after local midnight on January 1st of `now`'s local
/// year are kept.
pub fn filter_range<Tz: TimeZone>(
    samples: &[MetricSample],
    range: ChartRange,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<MetricSample> {
    if range != ChartRange::YearToDate {
        return samples.to_vec();
    }
    let year = now.with_timezone(tz).year();
    let Some(cutoff) = NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return samples.to_vec();
    };
    samples
        .iter()
        .filter(|s| s.taken_at.with_timezone(tz).naive_local() >= cutoff)
        .copied()
        .collect()
}
