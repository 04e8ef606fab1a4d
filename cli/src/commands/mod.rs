mod chart;
mod goals;
pub(crate) mod helpers;
mod history;
mod settings;
mod unit;
mod verify;

pub(crate) use chart::cmd_chart;
pub(crate) use goals::{cmd_goal_add, cmd_goal_delete, cmd_goal_edit, cmd_goal_show, cmd_goals};
pub(crate) use history::{cmd_history, cmd_history_delete, cmd_metric_edit};
pub(crate) use settings::{cmd_config_set, cmd_config_show, cmd_config_unset};
pub(crate) use unit::{cmd_unit_convert, cmd_unit_set, cmd_unit_show, cmd_unit_toggle};
pub(crate) use verify::cmd_verify;
