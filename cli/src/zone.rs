use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, Utc};

use bodytrend_core::error::MetricsError;
use bodytrend_core::models::{ChartRange, ChartResponse, MetricKind};
use bodytrend_core::refresh::{DerivedState, DisplayContext, Generation, refresh_response};
use bodytrend_core::service::{GoalDetail, GoalList, MetricsProvider, TrendService};

/// Timezone used to decide which calendar day a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerZone {
    Local,
    Named(chrono_tz::Tz),
}

impl ViewerZone {
    pub fn from_arg(tz: Option<&str>) -> Result<Self> {
        tz.map_or(Ok(Self::Local), str::parse)
    }

    pub fn chart(
        self,
        service: &TrendService,
        provider: &dyn MetricsProvider,
        metric: MetricKind,
        range: ChartRange,
        now: DateTime<Utc>,
    ) -> Result<DerivedState> {
        match self {
            Self::Local => service.chart(provider, metric, range, &Local, now),
            Self::Named(tz) => service.chart(provider, metric, range, &tz, now),
        }
    }

    pub fn goals(
        self,
        service: &TrendService,
        provider: &dyn MetricsProvider,
        include_closed: bool,
        now: DateTime<Utc>,
    ) -> Result<GoalList> {
        match self {
            Self::Local => service.goals_with_progress(provider, include_closed, &Local, now),
            Self::Named(tz) => service.goals_with_progress(provider, include_closed, &tz, now),
        }
    }

    pub fn goal_detail(
        self,
        service: &TrendService,
        provider: &dyn MetricsProvider,
        goal_id: i64,
        now: DateTime<Utc>,
    ) -> Result<GoalDetail> {
        match self {
            Self::Local => service.goal_details(provider, goal_id, &Local, now),
            Self::Named(tz) => service.goal_details(provider, goal_id, &tz, now),
        }
    }

    /// An instant as wall-clock time in this zone, e.g. `2024-06-15 08:30`.
    pub fn local_time(self, at: DateTime<Utc>) -> String {
        const FMT: &str = "%Y-%m-%d %H:%M";
        match self {
            Self::Local => at.with_timezone(&Local).format(FMT).to_string(),
            Self::Named(tz) => at.with_timezone(&tz).format(FMT).to_string(),
        }
    }

    pub fn derive(
        self,
        generation: Generation,
        response: &ChartResponse,
        ctx: &DisplayContext,
    ) -> Result<DerivedState, MetricsError> {
        match self {
            Self::Local => refresh_response(generation, response, ctx, &Local),
            Self::Named(tz) => refresh_response(generation, response, ctx, &tz),
        }
    }
}

impl FromStr for ViewerZone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if name.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        name.parse::<chrono_tz::Tz>()
            .map(Self::Named)
            .map_err(|_| anyhow!("Unknown timezone '{s}'. Use an IANA name like 'Europe/Berlin'"))
    }
}

impl fmt::Display for ViewerZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}
