//! Standings CLI
//!
//! Offline access to the same computation the server runs: build the
//! leaderboard from the configured snapshots and query it, or inspect an
//! exported SQLite artifact.
//!
//! Usage:
//!   cargo run --bin standings -- compute --export ./leaderboard.db
//!   cargo run --bin standings -- player 12345678
//!   cargo run --bin standings -- top --limit 20 --by deaths_change
//!   cargo run --bin standings -- period zone5 --id 12345678
//!   cargo run --bin standings -- inspect ./leaderboard.db

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kvk_tracker_backend::models::ReconciledRecord;
use kvk_tracker_backend::periods::PeriodError;
use kvk_tracker_backend::store::{
    read_exported, AggregateTotals, LeaderboardExporter, LeaderboardStore, RankMetric,
};
use kvk_tracker_backend::{init_tracing, TrackerConfig, TrackerService};

/// KvK standings from snapshot exports
#[derive(Parser, Debug)]
#[command(name = "standings")]
#[command(about = "Compute and query KvK leaderboards from snapshot files")]
struct Cli {
    /// TOML config file (defaults to KVK_CONFIG_PATH / kvk_tracker.toml)
    #[arg(short, long, env = "KVK_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(short, long, env = "KVK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline and print a summary
    Compute {
        /// Write the leaderboard to this SQLite file
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Show one participant
    Player {
        /// Participant (governor) id
        id: String,
    },

    /// Top participants
    Top {
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// composite_score, kills_change, deaths_change, power_change,
        /// tier4_kills_change or tier5_kills_change
        #[arg(short, long, default_value = "composite_score")]
        by: RankMetric,
    },

    /// Participants still short of their requirements
    Outstanding {
        /// Rows per page (defaults to the configured page size)
        #[arg(short, long)]
        page_size: Option<usize>,
    },

    /// Aggregate totals
    Totals,

    /// Period leaderboard, totals or one participant
    Period {
        key: String,

        #[arg(short, long)]
        id: Option<String>,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Read back an exported SQLite artifact
    Inspect {
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Inspect { db } = &cli.command {
        return inspect(db, cli.json);
    }

    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::from_env()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    let page_size = config.page_size;
    let service = TrackerService::new(config);

    if let Commands::Period { key, id, limit } = &cli.command {
        return period(&service, key, id.as_deref(), *limit, cli.json).await;
    }

    let board = service.recompute().await?;

    match cli.command {
        Commands::Compute { export } => {
            if let Some(path) = export {
                let rows = LeaderboardExporter::open(&path)
                    .and_then(|exporter| exporter.export(&board))
                    .with_context(|| format!("exporting to {}", path.display()))?;
                println!("Exported {} rows to {}", rows, path.display());
            }
            summary(&board, cli.json)?;
        }
        Commands::Player { id } => match board.get_by_id(&id) {
            Some(record) => player(record, cli.json)?,
            None => bail!("participant {} not found", id),
        },
        Commands::Top { limit, by } => {
            let entries = board.get_top_n(limit, by);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("=== Top {} by {} ===\n", limit, by);
                print_ranking(&entries, by);
            }
        }
        Commands::Outstanding { page_size: size } => {
            let size = size.unwrap_or(page_size);
            if cli.json {
                let pages: Vec<_> = board.get_outstanding(size).collect();
                println!("{}", serde_json::to_string_pretty(&pages)?);
            } else {
                let pages = board.outstanding_page_count(size);
                for (n, page) in board.get_outstanding(size).enumerate() {
                    println!("=== Outstanding requirements ({}/{}) ===\n", n + 1, pages);
                    println!("{:<14} {:<24} {:>14} {:>14}", "ID", "Name", "Kills needed", "Deaths needed");
                    println!("{}", "-".repeat(70));
                    for e in page {
                        println!(
                            "{:<14} {:<24} {:>14} {:>14}",
                            e.participant_id, e.display_name, e.kills_needed, e.deaths_needed
                        );
                    }
                    println!();
                }
                if pages == 0 {
                    println!("Every participant has met their requirements.");
                }
            }
        }
        Commands::Totals => print_totals(&board.get_aggregate_totals(), cli.json)?,
        Commands::Period { .. } | Commands::Inspect { .. } => {}
    }

    Ok(())
}

async fn period(
    service: &TrackerService,
    key: &str,
    id: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let table = match service.periods().get_period(key).await {
        Ok(table) => table,
        Err(e @ (PeriodError::Unavailable { .. } | PeriodError::Pending { .. })) => {
            println!("{}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match id {
        Some(id) => match table.store.get_by_id(id) {
            Some(record) => player(record, json),
            None => bail!("participant {} not found in period {}", id, table.key),
        },
        None => {
            if json {
                let top = table.store.get_top_n(limit, RankMetric::CompositeScore);
                println!("{}", serde_json::to_string_pretty(&top)?);
                return Ok(());
            }
            println!("=== {} ===\n", table.label);
            print_totals(&table.totals(), false)?;
            println!();
            let top = table.store.get_top_n(limit, RankMetric::CompositeScore);
            print_ranking(&top, RankMetric::CompositeScore);
            Ok(())
        }
    }
}

fn inspect(db: &Path, json: bool) -> Result<()> {
    if !db.exists() {
        bail!("no export at {}", db.display());
    }
    let (records, run) =
        read_exported(db).with_context(|| format!("reading export {}", db.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    println!("Database: {:?}", db);
    match run {
        Some(run) => println!(
            "Computed at {} (exported {}), {} rows\n",
            run.computed_at, run.exported_at, run.row_count
        ),
        None => println!("No export runs recorded\n"),
    }
    let refs: Vec<&ReconciledRecord> = records.iter().collect();
    print_ranking(&refs, RankMetric::CompositeScore);
    Ok(())
}

fn summary(board: &Arc<LeaderboardStore>, json: bool) -> Result<()> {
    let meta = board.meta();
    if json {
        println!("{}", serde_json::to_string_pretty(meta)?);
        return Ok(());
    }
    println!("=== Leaderboard ===\n");
    println!("Computed at:   {}", meta.computed_at);
    println!(
        "Sources:       roster {} / before {} / after {} / requirements {}",
        meta.sources.roster, meta.sources.before, meta.sources.after, meta.sources.requirements
    );
    println!("Participants:  {}", board.len());
    println!("Outstanding:   {}", board.outstanding_count());
    println!();
    print_ranking(&board.get_top_n(5, RankMetric::CompositeScore), RankMetric::CompositeScore);
    Ok(())
}

fn player(r: &ReconciledRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(r)?);
        return Ok(());
    }
    println!("=== {} ({}) ===\n", r.display_name, r.participant_id);
    println!("Rank:             {}", r.rank);
    println!("DKP:              {}", r.composite_score);
    println!("Power at start:   {}", r.power_at_start);
    println!("Matchmaking power: {}", r.matchmaking_power);
    println!("Power change:     {}", r.power_change);
    println!("Kill points:      {} -> {} ({:+})", r.kill_points_before, r.kill_points_after, r.kill_points_change);
    println!("Deaths:           {} -> {} ({:+})", r.deaths_before, r.deaths_after, r.deaths_change);
    println!("T4 kills:         {} -> {} ({:+})", r.tier4_kills_before, r.tier4_kills_after, r.tier4_kills_change);
    println!("T5 kills:         {} -> {} ({:+})", r.tier5_kills_before, r.tier5_kills_after, r.tier5_kills_change);
    println!(
        "Kills:            {} / {} ({:.1}%, {} needed)",
        r.total_kills_change, r.required_kills, r.kills_completion_pct, r.kills_needed()
    );
    println!(
        "Deaths:           {} / {} ({:.1}%, {} needed)",
        r.deaths_change, r.required_deaths, r.deaths_completion_pct, r.deaths_needed()
    );
    Ok(())
}

fn print_ranking(entries: &[&ReconciledRecord], by: RankMetric) {
    println!("{:>5} {:<14} {:<24} {:>16}", "Rank", "ID", "Name", by.as_str());
    println!("{}", "-".repeat(62));
    for r in entries {
        println!(
            "{:>5} {:<14} {:<24} {:>16}",
            r.rank,
            r.participant_id,
            r.display_name,
            by.value(r)
        );
    }
}

fn print_totals(t: &AggregateTotals, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(t)?);
        return Ok(());
    }
    println!("Participants:        {}", t.participants);
    println!("Kill points gained:  {}", t.total_kills_change);
    println!("Deaths:              {}", t.total_deaths_change);
    println!("T4 kills:            {}", t.total_tier4_kills_change);
    println!("T5 kills:            {}", t.total_tier5_kills_change);
    println!("Power change:        {}", t.total_power_change);
    println!("Current total power: {}", t.total_power_current);
    println!("Total DKP:           {}", t.total_composite_score);
    Ok(())
}
