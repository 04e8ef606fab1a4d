use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bodytrend_core::entries::MetricEntry;
use bodytrend_core::models::MetricKind;
use bodytrend_core::service::{MetricsProvider, TrendService};
use bodytrend_core::trend::format_metric_value;
use bodytrend_core::units::WeightUnit;

use super::helpers::or_dash;
use crate::zone::ViewerZone;

#[derive(Debug, Tabled)]
struct HistoryRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Taken")]
    taken: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "BMI")]
    bmi: String,
    #[tabled(rename = "Fat %")]
    fat_percent: String,
    #[tabled(rename = "Fat Mass")]
    fat_mass: String,
    #[tabled(rename = "Muscle %")]
    muscle_percent: String,
    #[tabled(rename = "Muscle lbs")]
    muscle_pounds: String,
    #[tabled(rename = "Verified")]
    verified: String,
}

fn history_rows(
    entries: &[MetricEntry],
    zone: ViewerZone,
    unit: WeightUnit,
) -> Result<Vec<HistoryRow>> {
    entries
        .iter()
        .map(|e| -> Result<HistoryRow> {
            let cell = |metric: MetricKind| {
                or_dash(e.value(metric).map(|v| format_metric_value(metric, v, unit)))
            };
            Ok(HistoryRow {
                id: e.id,
                taken: zone.local_time(e.taken()?),
                weight: cell(MetricKind::Weight),
                bmi: cell(MetricKind::Bmi),
                fat_percent: cell(MetricKind::FatPercent),
                fat_mass: cell(MetricKind::FatMass),
                muscle_percent: cell(MetricKind::SkeletalMusclePercent),
                muscle_pounds: cell(MetricKind::SkeletalMusclePounds),
                verified: or_dash(e.verified_method.clone()),
            })
        })
        .collect()
}

pub(crate) fn cmd_history(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    zone: ViewerZone,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut entries = service.history(provider)?;
    if let Some(n) = limit {
        entries.truncate(n);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No metrics recorded yet.");
        return Ok(());
    }

    let rows = history_rows(&entries, zone, service.weight_unit()?)?;
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_history_delete(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    entry_id: i64,
    json: bool,
) -> Result<()> {
    service.delete_entry(provider, entry_id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": entry_id }));
    } else {
        println!("Deleted metric entry {entry_id}");
    }
    Ok(())
}

pub(crate) fn cmd_metric_edit(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    entry_id: i64,
    weight: f64,
    unit: Option<&str>,
    taken_at: Option<&str>,
    json: bool,
) -> Result<()> {
    let entered_in: Option<WeightUnit> = unit.map(str::parse).transpose()?;
    let edit = service.edit_entry(provider, entry_id, weight, entered_in, taken_at)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "id": entry_id, "weight": edit.weight, "taken_at": edit.taken_at })
        );
    } else {
        let shown_in = match entered_in {
            Some(u) => u,
            None => service.weight_unit()?,
        };
        println!(
            "Updated metric entry {entry_id}: {} at {}",
            format_metric_value(MetricKind::Weight, edit.weight, shown_in),
            edit.taken_at
        );
    }
    Ok(())
}
