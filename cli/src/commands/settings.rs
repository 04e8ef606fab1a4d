use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use bodytrend_core::db::SETTING_WEIGHT_UNIT;
use bodytrend_core::service::TrendService;

use crate::config::Config;

pub(crate) fn cmd_config_show(service: &TrendService, config: &Config, json: bool) -> Result<()> {
    let mut settings = service.list_settings()?;
    if !settings.iter().any(|(k, _)| k == SETTING_WEIGHT_UNIT) {
        settings.push((
            SETTING_WEIGHT_UNIT.to_string(),
            format!("{} (default)", service.weight_unit()?),
        ));
        settings.sort();
    }

    if json {
        let map: serde_json::Map<String, serde_json::Value> = settings
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "data_dir": config.data_dir.display().to_string(),
                "db_path": config.db_path.display().to_string(),
                "settings": map,
            })
        );
        return Ok(());
    }

    #[derive(Tabled)]
    struct SettingRow {
        #[tabled(rename = "Setting")]
        key: String,
        #[tabled(rename = "Value")]
        value: String,
    }

    let rows: Vec<SettingRow> = settings
        .into_iter()
        .map(|(key, value)| SettingRow { key, value })
        .collect();
    println!("Database: {}", config.db_path.display());
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_config_set(
    service: &TrendService,
    key: &str,
    value: &str,
    json: bool,
) -> Result<()> {
    service.set_preference(key, value)?;
    let stored = service.get_setting(key)?.unwrap_or_default();
    if json {
        println!("{}", serde_json::json!({ "key": key, "value": stored }));
    } else {
        println!("{key} = {stored}");
    }
    Ok(())
}

pub(crate) fn cmd_config_unset(service: &TrendService, key: &str, json: bool) -> Result<()> {
    let cleared = service.clear_preference(key)?;
    if json {
        println!("{}", serde_json::json!({ "key": key, "cleared": cleared }));
    } else if cleared {
        println!("{key} cleared");
    } else {
        eprintln!("{key} was not set");
    }
    Ok(())
}
