//! Pointscope CLI
//!
//! Captures TVL/points snapshots and projects future points emission.
//!
//! Exit status: 0 success, 2 upstream unavailable, 3 upstream shape changed,
//! 4 persistence failed, 1 anything else.

mod app;
mod config;

use anyhow::Context;
use app::{build_orchestrator, expand_path, open_store, read_spill, rewrite_spill, spill_unsaved};
use clap::{Parser, Subcommand};
use config::{AppConfig, LogFormat, LoggingConfig};
use pointscope_core::display::{format_compact, format_count, format_percent, format_usd};
use pointscope_core::{
    estimate_position, forecast, window, Forecast, GrowthRate, PointsStatus, Snapshot,
    DEFAULT_HORIZONS,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "pointscope")]
#[command(version)]
#[command(about = "Pointscope - TVL snapshots and points emission projection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "pointscope.toml", env = "POINTSCOPE_CONFIG")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture one snapshot and append it to the store
    Capture {
        /// Write the snapshot here if the store rejects it
        #[arg(long)]
        spill: Option<PathBuf>,
    },

    /// Capture periodically until Ctrl-C
    Watch {
        /// Seconds between captures
        #[arg(short, long, default_value = "3600")]
        interval: u64,

        /// Write snapshots the store rejects here
        #[arg(long)]
        spill: Option<PathBuf>,
    },

    /// Append snapshots from a spill file to the store
    Resubmit {
        /// Spill file written by `capture --spill`
        file: PathBuf,
    },

    /// List stored snapshots, oldest first
    History {
        /// Show only the newest N
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Project cumulative points from stored history
    Project {
        /// Horizons in days (comma separated)
        #[arg(long = "horizon", value_delimiter = ',')]
        horizons: Vec<u32>,

        /// Restrict growth to the trailing N days
        #[arg(short, long)]
        window: Option<u32>,

        /// Use the newest snapshot's weighted TVL instead of a live pull
        #[arg(long)]
        offline: bool,

        #[arg(long)]
        json: bool,
    },

    /// Value the row table against live TVL
    Valuate {
        #[arg(long)]
        json: bool,
    },

    /// Estimate points for a deposit into one row
    Estimate {
        /// Row id (see `pointscope table`)
        row: String,

        /// Deposit in USD
        deposit: f64,

        /// Days held
        #[arg(long, default_value = "30")]
        horizon: u32,
    },

    /// Print the row table
    Table {
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match logging.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = expand_path(&cli.config);
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_logging(cli.verbose, &config.logging);
    if !config_path.exists() {
        tracing::info!(path = %config_path.display(), "Config not found, using defaults");
    }

    match cli.command {
        Commands::Capture { spill } => {
            let orchestrator = build_orchestrator(&config, open_store(&config)?)?;
            match orchestrator.capture_once().await {
                Ok(snapshot) => print_snapshot(&snapshot),
                Err(err) => {
                    spill_unsaved(&err, spill.as_deref());
                    eprintln!("Capture failed: {err}");
                    std::process::exit(err.exit_code());
                }
            }
        }

        Commands::Watch { interval, spill } => {
            let orchestrator = build_orchestrator(&config, open_store(&config)?)?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Cannot listen for Ctrl-C, stopping");
                }
            };
            let stats = orchestrator
                .run_periodic(Duration::from_secs(interval.max(1)), shutdown, |err| {
                    spill_unsaved(err, spill.as_deref())
                })
                .await;
            println!("Captured: {}  Failed: {}", stats.captured, stats.failed);
        }

        Commands::Resubmit { file } => {
            let store = open_store(&config)?;
            let pending = read_spill(&file)?;
            let mut remaining = Vec::new();
            for snapshot in pending {
                if let Err(e) = store.append(&snapshot).await {
                    tracing::error!(
                        captured_at_unix = snapshot.captured_at_unix,
                        error = %e,
                        "Resubmission rejected"
                    );
                    remaining.push(snapshot);
                }
            }
            rewrite_spill(&file, &remaining)?;
            if !remaining.is_empty() {
                eprintln!("{} snapshot(s) still unsaved in {}", remaining.len(), file.display());
                std::process::exit(4);
            }
            println!("All spilled snapshots stored");
        }

        Commands::History { limit, json } => {
            let store = open_store(&config)?;
            let mut history = store.read_all().await?;
            if let Some(limit) = limit {
                let skip = history.len().saturating_sub(limit);
                history.drain(..skip);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                print_history(&history);
            }
        }

        Commands::Project {
            horizons,
            window: window_days,
            offline,
            json,
        } => {
            let store = open_store(&config)?;
            let mut history = store.read_all().await?;
            if let Some(days) = window_days {
                history = window(&history, days);
            }
            let latest = history.last().context("No snapshots stored yet")?;

            let current_points = history
                .iter()
                .rev()
                .find(|s| s.summary.points_status != PointsStatus::Unavailable)
                .map(|s| s.summary.cumulative_points)
                .unwrap_or(0.0);

            let current_weighted_tvl = if offline {
                latest.summary.total_weighted_tvl
            } else {
                let orchestrator = build_orchestrator(&config, store.clone())?;
                match orchestrator.live_evaluation().await {
                    Ok(live) => {
                        if live.stale {
                            tracing::warn!("Live TVL pull failed, using stale cached figures");
                        }
                        live.evaluation.total_weighted
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Live TVL unavailable, using newest snapshot");
                        latest.summary.total_weighted_tvl
                    }
                }
            };

            let horizons = if horizons.is_empty() {
                DEFAULT_HORIZONS.to_vec()
            } else {
                horizons
            };
            let result = forecast(&history, current_points, current_weighted_tvl, &horizons)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_forecast(&result);
            }
        }

        Commands::Valuate { json } => {
            let orchestrator = build_orchestrator(&config, open_store(&config)?)?;
            let live = match orchestrator.live_evaluation().await {
                Ok(live) => live,
                Err(err) => {
                    eprintln!("Valuation failed: {err}");
                    std::process::exit(err.exit_code());
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&live.evaluation)?);
                return Ok(());
            }

            for category in &orchestrator.table().categories {
                println!("{}", category.name);
                for row in &category.rows {
                    let Some(value) = live.evaluation.get(&row.id) else {
                        continue;
                    };
                    println!(
                        "  {:<28} {:>12} x{:<6} {:>12} {:>8.2}%  {:?}",
                        row.display_name,
                        format_usd(value.raw_amount),
                        value.effective_multiplier,
                        format_compact(value.weighted_value),
                        value.share_of_total,
                        row.inclusion,
                    );
                }
            }
            println!();
            println!("Total TVL:          {}", format_usd(live.evaluation.total_raw));
            println!("Total weighted TVL: {}", format_compact(live.evaluation.total_weighted));
            if live.stale {
                println!("(stale: upstream fetch failed, cached figures shown)");
            }
            if !live.missing.is_empty() {
                println!("Rows without upstream data: {}", live.missing.join(", "));
            }
        }

        Commands::Estimate {
            row,
            deposit,
            horizon,
        } => {
            let orchestrator = build_orchestrator(&config, open_store(&config)?)?;
            let definition = orchestrator
                .table()
                .get(&row)
                .cloned()
                .with_context(|| format!("Unknown row '{row}'"))?;
            let live = match orchestrator.live_evaluation().await {
                Ok(live) => live,
                Err(err) => {
                    eprintln!("Valuation failed: {err}");
                    std::process::exit(err.exit_code());
                }
            };

            let estimate = estimate_position(&definition, deposit, &live.evaluation, horizon);
            println!("Row:            {}", definition.display_name);
            println!("Deposit:        {}", format_usd(estimate.deposit));
            println!("Multiplier:     x{}", estimate.effective_multiplier);
            println!("Weighted value: {}", format_compact(estimate.weighted_value));
            println!("Points per day: {}", format_compact(estimate.daily_points));
            println!(
                "Points in {} days: {}",
                horizon,
                format_compact(estimate.points_over_horizon)
            );
            println!("Share of weighted TVL: {:.4}%", estimate.share_of_total_percent);
        }

        Commands::Table { json } => {
            let table = app::load_table(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
                return Ok(());
            }
            for category in &table.categories {
                println!("{}", category.name);
                for row in &category.rows {
                    println!(
                        "  {:<22} {:<28} x{:<6} {:?}",
                        row.id,
                        row.display_name,
                        row.effective_multiplier(),
                        row.inclusion
                    );
                }
            }
            for mismatch in table.boost_mismatches() {
                println!(
                    "warning: {} boosts x{} but its parent {} boosts x{}",
                    mismatch.id, mismatch.child_boost, mismatch.parent, mismatch.parent_boost
                );
            }
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    let summary = &snapshot.summary;
    println!("Captured at:        {}", snapshot.captured_at.to_rfc3339());
    println!("Total TVL:          {}", summary.display.total_raw_tvl);
    println!("Total weighted TVL: {}", summary.display.total_weighted_tvl);
    println!(
        "Cumulative points:  {} ({:?})",
        summary.display.cumulative_points, summary.points_status
    );
    println!("Participants:       {}", summary.display.participant_count);
}

fn print_history(history: &[Snapshot]) {
    if history.is_empty() {
        println!("No snapshots stored yet");
        return;
    }
    println!(
        "{:<26} {:>12} {:>12} {:>12} {:>10}  status",
        "captured_at", "tvl", "weighted", "points", "users"
    );
    for s in history {
        println!(
            "{:<26} {:>12} {:>12} {:>12} {:>10}  {:?}",
            s.captured_at.format("%Y-%m-%d %H:%M:%S UTC"),
            format_usd(s.summary.total_raw_tvl),
            format_compact(s.summary.total_weighted_tvl),
            format_compact(s.summary.cumulative_points),
            format_count(s.summary.participant_count),
            s.summary.points_status,
        );
    }
}

fn print_growth(label: &str, rate: &GrowthRate) {
    println!(
        "{:<14} {} per day over {} day(s)",
        label,
        format_percent(rate.daily_rate_percent),
        rate.calendar_days
    );
}

fn print_forecast(result: &Forecast) {
    println!("Current points:       {}", format_compact(result.current_points));
    println!("Current weighted TVL: {}", format_compact(result.current_weighted_tvl));
    println!();
    print_growth("TVL", &result.tvl_growth);
    print_growth("Weighted TVL", &result.weighted_growth);
    match &result.points_growth {
        Some(rate) => print_growth("Points", rate),
        None => println!("{:<14} unavailable", "Points"),
    }
    println!();
    println!("{:>8} {:>16} {:>16}", "days", "direct", "tvl-scaled");
    for point in &result.points {
        println!(
            "{:>8} {:>16} {:>16}",
            point.horizon_days,
            point
                .direct_compound
                .map(format_compact)
                .unwrap_or_else(|| "n/a".to_string()),
            format_compact(point.tvl_scaled),
        );
    }
}
