use serde::Serialize;

use bodytrend_core::models::MetricKind;
use bodytrend_core::trend::unit_suffix;
use bodytrend_core::units::WeightUnit;

const BAR_WIDTH: usize = 10;

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Text progress bar, e.g. `[█████░░░░░]` for 50%.
pub(crate) fn progress_bar(pct: f64) -> String {
    let pct = if pct.is_finite() { pct.clamp(0.0, 100.0) } else { 0.0 };
    #[allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((pct / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}]",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH - filled)
    )
}

pub(crate) fn on_track_label(on_track: bool) -> &'static str {
    if on_track { "On Track" } else { "Not On Track" }
}

/// A value that is already in the display unit, with its suffix.
pub(crate) fn display_cell(value: f64, metric: MetricKind, unit: WeightUnit) -> String {
    match unit_suffix(metric, unit) {
        "" => format!("{value:.1}"),
        "%" => format!("{value:.1}%"),
        suffix => format!("{value:.1} {suffix}"),
    }
}

pub(crate) fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}
