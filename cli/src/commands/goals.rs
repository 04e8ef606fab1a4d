use anyhow::Result;
use chrono::Utc;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bodytrend_core::models::{GoalDraft, MetricKind};
use bodytrend_core::service::{GoalDetail, MetricsProvider, TrendService};
use bodytrend_core::trend::{format_goal_value, format_weekly_change};
use bodytrend_core::units::WeightUnit;

use super::helpers::{on_track_label, or_dash, progress_bar};
use crate::zone::ViewerZone;

pub(crate) fn cmd_goals(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    zone: ViewerZone,
    all: bool,
    json: bool,
) -> Result<()> {
    let list = zone.goals(service, provider, all, Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    for skipped in &list.skipped {
        eprintln!("Warning: goal {} skipped: {}", skipped.id, skipped.error);
    }

    let goals = &list.goals;
    if goals.is_empty() {
        let which = if all { "" } else { "active " };
        eprintln!("No {which}goals found");
        return Ok(());
    }

    #[derive(Tabled)]
    struct GoalRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Metric")]
        metric: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Due")]
        due: String,
        #[tabled(rename = "Days Left")]
        days_left: i64,
        #[tabled(rename = "Progress")]
        progress: String,
        #[tabled(rename = "Pace")]
        pace: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    let unit = service.weight_unit()?;
    let rows: Vec<GoalRow> = goals
        .iter()
        .map(|s| GoalRow {
            id: s.goal.id,
            metric: s.goal.metric.label().to_string(),
            target: format_goal_value(s.goal.metric, s.goal.target_value, unit),
            due: s.goal.target_date.chars().take(10).collect(),
            days_left: s.days_left,
            progress: format!(
                "{} {:>5.1}%",
                progress_bar(s.progress.progress_pct),
                s.progress.progress_pct
            ),
            pace: on_track_label(s.progress.on_track).to_string(),
            status: s.goal.status.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_goal_show(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    zone: ViewerZone,
    goal_id: i64,
    json: bool,
) -> Result<()> {
    let detail = zone.goal_detail(service, provider, goal_id, Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let unit = service.weight_unit()?;
        for line in detail_lines(&detail, unit) {
            println!("{line}");
        }
    }
    Ok(())
}

pub(crate) fn cmd_goal_add(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    metric: &str,
    target: f64,
    unit: Option<&str>,
    by: &str,
    json: bool,
) -> Result<()> {
    let metric: MetricKind = metric.parse()?;
    let entered_in = parse_unit(unit)?;
    let draft = service.create_goal(provider, metric, target, entered_in, by)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&draft)?);
    } else {
        let shown_in = shown_unit(service, entered_in)?;
        println!("Created goal: {}", draft_line(&draft, shown_in));
    }
    Ok(())
}

pub(crate) fn cmd_goal_edit(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    goal_id: i64,
    target: Option<f64>,
    unit: Option<&str>,
    by: Option<&str>,
    json: bool,
) -> Result<()> {
    let entered_in = parse_unit(unit)?;
    let draft = service.update_goal(provider, goal_id, target, entered_in, by)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "id": goal_id, "goal": draft })
        );
    } else {
        let shown_in = shown_unit(service, entered_in)?;
        println!("Updated goal {goal_id}: {}", draft_line(&draft, shown_in));
    }
    Ok(())
}

pub(crate) fn cmd_goal_delete(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    goal_id: i64,
    json: bool,
) -> Result<()> {
    service.delete_goal(provider, goal_id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": goal_id }));
    } else {
        println!("Deleted goal {goal_id}");
    }
    Ok(())
}

fn parse_unit(unit: Option<&str>) -> Result<Option<WeightUnit>> {
    Ok(unit.map(str::parse).transpose()?)
}

fn shown_unit(service: &TrendService, entered_in: Option<WeightUnit>) -> Result<WeightUnit> {
    match entered_in {
        Some(unit) => Ok(unit),
        None => service.weight_unit(),
    }
}

fn draft_line(draft: &GoalDraft, unit: WeightUnit) -> String {
    format!(
        "{} to {} by {}",
        draft.metric.label(),
        format_goal_value(draft.metric, draft.target_value, unit),
        draft.target_date
    )
}

fn detail_lines(detail: &GoalDetail, unit: WeightUnit) -> Vec<String> {
    let summary = &detail.summary;
    let goal = &summary.goal;
    let metric = goal.metric;
    let projection = &detail.projection;
    let value = |v: Option<f64>| or_dash(v.map(|v| format_goal_value(metric, v, unit)));
    let rate = |v: Option<f64>| or_dash(v.map(|v| format_weekly_change(v, metric, unit)));

    let days = match summary.days_left {
        d if d < 0 => format!("{} days overdue", -d),
        1 => "1 day left".to_string(),
        d => format!("{d} days left"),
    };

    vec![
        format!(
            "Goal {}: {} to {} by {} ({days})",
            goal.id,
            metric.label(),
            format_goal_value(metric, goal.target_value, unit),
            goal.target_date.chars().take(10).collect::<String>(),
        ),
        format!(
            "  Progress:               {:.1}% {} {}",
            summary.progress.progress_pct,
            progress_bar(summary.progress.progress_pct),
            summary.band.as_str()
        ),
        format!(
            "  Pace:                   {}",
            on_track_label(summary.progress.on_track)
        ),
        format!(
            "  Projected value:        {}",
            value(projection.predicted_value)
        ),
        format!(
            "  Difference to goal:     {}",
            value(projection.difference_to_goal)
        ),
        format!(
            "  Weekly change:          {}",
            rate(projection.weekly_change)
        ),
        format!(
            "  Required weekly change: {}",
            rate(projection.required_weekly_change)
        ),
    ]
}
