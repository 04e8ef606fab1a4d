mod api;
mod commands;
mod config;
mod logging;
mod server;
mod zone;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process;

use crate::api::MetricsApiClient;
use crate::commands::helpers::json_error;
use crate::commands::{
    cmd_chart, cmd_config_set, cmd_config_show, cmd_config_unset, cmd_goal_add, cmd_goal_delete,
    cmd_goal_edit, cmd_goal_show, cmd_goals, cmd_history, cmd_history_delete, cmd_metric_edit,
    cmd_unit_convert, cmd_unit_set, cmd_unit_show, cmd_unit_toggle, cmd_verify,
};
use crate::config::{Config, resolve_endpoint};
use crate::zone::ViewerZone;
use bodytrend_core::service::TrendService;

#[derive(Parser)]
#[command(
    name = "bodytrend",
    version,
    about = "Body metric trends and goal progress",
    long_about = "Fetches body-composition history from a metrics backend, collapses it \
                  into one value per day in your timezone, and shows trends and goal progress."
)]
struct Cli {
    /// Metrics backend base URL (overrides the stored api_url)
    #[arg(long, global = true, env = "BODYTREND_API_URL")]
    api_url: Option<String>,
    /// User whose metrics to read (overrides the stored user_id)
    #[arg(long, global = true, env = "BODYTREND_USER")]
    user: Option<String>,
    /// IANA timezone used to group samples by day (default: system local)
    #[arg(long, global = true, env = "BODYTREND_TZ")]
    tz: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the daily series for one metric
    Chart {
        /// Metric: weight, bmi, fat_percent, skeletal_muscle_percent, skeletal_muscle_pounds, fat_mass
        metric: String,
        /// Range: 1week, 1month, ytd, max
        #[arg(short, long, default_value = "ytd")]
        range: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List goals with progress
    Goals {
        /// Include completed and canceled goals
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show, create, edit or delete a single goal
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// List uploaded scans, newest first
    History {
        #[command(subcommand)]
        command: Option<HistoryCommands>,
        /// Show at most this many entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Correct an uploaded scan
    Metric {
        #[command(subcommand)]
        command: MetricCommands,
    },
    /// Replace the latest scan's fat and muscle percentages with verified values
    Verify {
        /// Verified body fat percentage (limited to 0-80)
        #[arg(long)]
        fat: f64,
        /// Verified skeletal muscle percentage (limited to 0-80)
        #[arg(long)]
        muscle: f64,
        /// How the values were measured: dexa, calipers, scale, other
        #[arg(short, long, default_value = "dexa")]
        method: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Weight display unit (lbs or kg)
    Unit {
        #[command(subcommand)]
        command: UnitCommands,
    },
    /// Stored preferences
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Start the local derivation API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Show one goal with the backend's projection
    Show {
        /// Goal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a goal
    Add {
        /// Metric: weight, bmi, fat_percent, skeletal_muscle_percent, skeletal_muscle_pounds, fat_mass
        metric: String,
        /// Target value (weight in --unit, default: your display unit)
        target: f64,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        by: String,
        /// Unit of a weight target: lbs or kg
        #[arg(short, long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a goal's target and/or date
    Edit {
        /// Goal ID
        id: i64,
        /// New target value
        #[arg(short, long)]
        target: Option<f64>,
        /// New target date (YYYY-MM-DD)
        #[arg(long)]
        by: Option<String>,
        /// Unit of a weight target: lbs or kg
        #[arg(short, long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a goal
    Delete {
        /// Goal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Delete an uploaded scan by ID
    Delete {
        /// Metric entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MetricCommands {
    /// Correct the weight (and optionally the time) of an uploaded scan
    Edit {
        /// Metric entry ID
        id: i64,
        /// Corrected weight
        #[arg(short, long)]
        weight: f64,
        /// Unit of the weight: lbs or kg (default: your display unit)
        #[arg(short, long)]
        unit: Option<String>,
        /// New timestamp (RFC 3339), default: keep the current one
        #[arg(long)]
        taken_at: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UnitCommands {
    /// Show the current display unit
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the display unit
    Set {
        /// lbs or kg
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Switch between lbs and kg
    Toggle {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert a weight to the other unit
    Convert {
        /// Weight value
        value: f64,
        /// Unit of the value: lbs or kg
        #[arg(short, long, default_value = "lbs")]
        from: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show stored preferences
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a preference: weight_unit, api_url, user_id
    Set {
        key: String,
        value: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a stored preference
    Unset {
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Self::Chart { json, .. } | Self::Goals { json, .. } | Self::Verify { json, .. } => {
                *json
            }
            Self::Goal { command } => match command {
                GoalCommands::Show { json, .. }
                | GoalCommands::Add { json, .. }
                | GoalCommands::Edit { json, .. }
                | GoalCommands::Delete { json, .. } => *json,
            },
            Self::History { command, json, .. } => match command {
                Some(HistoryCommands::Delete { json, .. }) => *json,
                None => *json,
            },
            Self::Metric { command } => match command {
                MetricCommands::Edit { json, .. } => *json,
            },
            Self::Unit { command } => match command {
                UnitCommands::Show { json }
                | UnitCommands::Set { json, .. }
                | UnitCommands::Toggle { json }
                | UnitCommands::Convert { json, .. } => *json,
            },
            Self::Config { command } => match command {
                ConfigCommands::Show { json }
                | ConfigCommands::Set { json, .. }
                | ConfigCommands::Unset { json, .. } => *json,
            },
            Self::Serve { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.command.json();
    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    logging::init(default_level);

    if let Err(e) = run(cli).await {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

fn connect(
    service: &TrendService,
    api_url: Option<String>,
    user: Option<String>,
) -> Result<MetricsApiClient> {
    let endpoint = resolve_endpoint(service, api_url, user)?;
    tracing::debug!(base_url = %endpoint.base_url, user = %endpoint.user_id, "using metrics backend");
    MetricsApiClient::new(endpoint)
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = config
        .db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let service = TrendService::new(db_path)?;
    let zone = ViewerZone::from_arg(cli.tz.as_deref())?;

    match cli.command {
        Commands::Chart {
            metric,
            range,
            json,
        } => {
            let provider = connect(&service, cli.api_url, cli.user)?;
            cmd_chart(&service, &provider, zone, &metric, &range, json)
        }
        Commands::Goals { all, json } => {
            let provider = connect(&service, cli.api_url, cli.user)?;
            cmd_goals(&service, &provider, zone, all, json)
        }
        Commands::Goal { command } => {
            let provider = connect(&service, cli.api_url, cli.user)?;
            match command {
                GoalCommands::Show { id, json } => cmd_goal_show(&service, &provider, zone, id, json),
                GoalCommands::Add {
                    metric,
                    target,
                    by,
                    unit,
                    json,
                } => cmd_goal_add(
                    &service,
                    &provider,
                    &metric,
                    target,
                    unit.as_deref(),
                    &by,
                    json,
                ),
                GoalCommands::Edit {
                    id,
                    target,
                    by,
                    unit,
                    json,
                } => cmd_goal_edit(
                    &service,
                    &provider,
                    id,
                    target,
                    unit.as_deref(),
                    by.as_deref(),
                    json,
                ),
                GoalCommands::Delete { id, json } => cmd_goal_delete(&service, &provider, id, json),
            }
        }
        Commands::History {
            command,
            limit,
            json,
        } => {
            let provider = connect(&service, cli.api_url, cli.user)?;
            match command {
                Some(HistoryCommands::Delete { id, json }) => {
                    cmd_history_delete(&service, &provider, id, json)
                }
                None => cmd_history(&service, &provider, zone, limit, json),
            }
        }
        Commands::Metric { command } => {
            let provider = connect(&service, cli.api_url, cli.user)?;
            match command {
                MetricCommands::Edit {
                    id,
                    weight,
                    unit,
                    taken_at,
                    json,
                } => cmd_metric_edit(
                    &service,
                    &provider,
                    id,
                    weight,
                    unit.as_deref(),
                    taken_at.as_deref(),
                    json,
                ),
            }
        }
        Commands::Verify {
            fat,
            muscle,
            method,
            json,
        } => {
            let provider = connect(&service, cli.api_url, cli.user)?;
            cmd_verify(&service, &provider, fat, muscle, &method, json)
        }
        Commands::Unit { command } => match command {
            UnitCommands::Show { json } => cmd_unit_show(&service, json),
            UnitCommands::Set { unit, json } => cmd_unit_set(&service, &unit, json),
            UnitCommands::Toggle { json } => cmd_unit_toggle(&service, json),
            UnitCommands::Convert { value, from, json } => cmd_unit_convert(value, &from, json),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { json } => cmd_config_show(&service, &config, json),
            ConfigCommands::Set { key, value, json } => {
                cmd_config_set(&service, &key, &value, json)
            }
            ConfigCommands::Unset { key, json } => cmd_config_unset(&service, &key, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _new) = config.load_or_create_api_key()?;
                Some(key)
            };
            server::start_server(service, port, &bind, api_key).await
        }
    }
}
