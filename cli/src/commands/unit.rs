use anyhow::{Result, bail};

use bodytrend_core::service::TrendService;
use bodytrend_core::units::{WeightUnit, round1, to_kg, to_lbs};

pub(crate) fn cmd_unit_show(service: &TrendService, json: bool) -> Result<()> {
    let unit = service.weight_unit()?;
    if json {
        println!("{}", serde_json::json!({ "weight_unit": unit }));
    } else {
        println!("Weight unit: {unit}");
    }
    Ok(())
}

pub(crate) fn cmd_unit_set(service: &TrendService, unit: &str, json: bool) -> Result<()> {
    let unit: WeightUnit = unit.parse()?;
    service.set_weight_unit(unit)?;
    if json {
        println!("{}", serde_json::json!({ "weight_unit": unit }));
    } else {
        println!("Weight unit set to {unit}");
    }
    Ok(())
}

pub(crate) fn cmd_unit_toggle(service: &TrendService, json: bool) -> Result<()> {
    let unit = service.toggle_weight_unit()?;
    if json {
        println!("{}", serde_json::json!({ "weight_unit": unit }));
    } else {
        println!("Weight unit set to {unit}");
    }
    Ok(())
}

/// Convert a weight between units. Returns `(converted, target_unit)`.
pub(crate) fn convert(value: f64, from: WeightUnit) -> Result<(f64, WeightUnit)> {
    if !value.is_finite() {
        bail!("Weight must be a finite number");
    }
    if value < 0.0 {
        bail!("Weight must not be negative");
    }
    let converted = match from {
        WeightUnit::Lbs => to_kg(value),
        WeightUnit::Kg => to_lbs(value),
    };
    Ok((converted, from.toggled()))
}

pub(crate) fn cmd_unit_convert(value: f64, from: &str, json: bool) -> Result<()> {
    let from: WeightUnit = from.parse()?;
    let (converted, to) = convert(value, from)?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "value": value,
                "unit": from,
                "converted": converted,
                "converted_unit": to,
            })
        );
    } else {
        println!("{:.1} {from} = {:.1} {to}", round1(value), round1(converted));
    }
    Ok(())
}
