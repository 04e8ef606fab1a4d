use anyhow::Result;
use chrono::Utc;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bodytrend_core::models::{ChartRange, MetricKind};
use bodytrend_core::refresh::DerivedState;
use bodytrend_core::service::{MetricsProvider, TrendService};

use super::helpers::{display_cell, or_dash};
use crate::zone::ViewerZone;

pub(crate) fn cmd_chart(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    zone: ViewerZone,
    metric: &str,
    range: &str,
    json: bool,
) -> Result<()> {
    let metric: MetricKind = metric.parse()?;
    let range: ChartRange = range.parse()?;
    let state = zone.chart(service, provider, metric, range, Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    if state.series.is_empty() {
        eprintln!("No {} data for range {range}", metric.label());
        return Ok(());
    }

    print_chart(&state);
    Ok(())
}

fn print_chart(state: &DerivedState) {
    #[derive(Tabled)]
    struct PointRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Axis")]
        axis: String,
        #[tabled(rename = "Value")]
        value: String,
    }

    println!("=== {} ({}) ===\n", state.metric.label(), state.range);
    println!(
        "  Latest: {}   Trend: {}",
        or_dash(state.latest.clone()),
        state.trend_label
    );
    println!();

    let rows: Vec<PointRow> = state
        .series
        .iter()
        .zip(&state.labels)
        .map(|(p, label)| PointRow {
            date: p.day.format("%Y-%m-%d").to_string(),
            axis: label.clone(),
            value: display_cell(p.value, state.metric, state.unit),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
