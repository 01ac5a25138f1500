/// Main entry point for the family XP league
///
/// This file sets up logging, parses command line arguments and runs one
/// league command. Reports go to stdout; logs go to stderr.

use std::path::PathBuf;

use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;

use family_xp_league::{BackendKind, ConfigArgs, LeagueRunner};

/// Directory holding league data when none is configured
///
/// Prefers `./league_data`; falls back to the platform data directory when
/// the working directory is not writable.
fn get_default_data_dir() -> PathBuf {
    let potential_dirs = [
        std::env::current_dir().ok().map(|mut p| {
            p.push("league_data");
            p
        }),
        dirs::data_dir().map(|mut p| {
            p.push("family_xp_league");
            p
        }),
        dirs::home_dir().map(|mut p| {
            p.push(".family_xp_league");
            p
        }),
    ];

    for potential_dir in potential_dirs.iter().flatten() {
        if std::fs::create_dir_all(potential_dir).is_ok() {
            let test_file = potential_dir.join(".test_write");
            if std::fs::write(&test_file, "test").is_ok() {
                let _ = std::fs::remove_file(&test_file);
                return potential_dir.clone();
            }
        }
    }

    let temp_dir = std::env::temp_dir().join("family_xp_league");
    tracing::warn!("Using temporary directory for league data: {}", temp_dir.display());
    temp_dir
}

/// Command line arguments for the family XP league
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: ConfigArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and print today's standings without saving
    Check,
    /// Fetch, save today's snapshot and write the daily report
    Daily,
    /// Fetch, save today's snapshot and write the weekly report
    Weekly,
    /// Copy history from one storage backend to another
    Migrate {
        #[arg(long)]
        from: BackendKind,
        #[arg(long)]
        to: BackendKind,
    },
    /// Show SQLite database statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Set up logging based on command line flags
    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("family_xp_league={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting family XP league");

    let config = args.config.into_config(get_default_data_dir)?;
    let now = Local::now().naive_local();

    match args.command {
        Command::Check => {
            let outcome = LeagueRunner::new(config)?.check(now).await?;
            println!("{}", outcome.report);
        }
        Command::Daily => {
            let outcome = LeagueRunner::new(config)?.run_daily(now).await?;
            println!("{}", outcome.report);
            if let Some(path) = outcome.report_path {
                println!("\nDaily report saved to {}", path.display());
            }
        }
        Command::Weekly => {
            let outcome = LeagueRunner::new(config)?.run_weekly(now).await?;
            println!("{}", outcome.report);
            if let Some(path) = outcome.report_path {
                println!("\nWeekly report saved to {}", path.display());
            }
        }
        Command::Migrate { from, to } => {
            let (migration, validation) = LeagueRunner::migrate(&config.storage, from, to).await?;
            println!(
                "Migrated {}/{} entries from {} to {}",
                migration.migrated,
                migration.total,
                from.as_str(),
                to.as_str()
            );
            for (date, error) in &migration.failed {
                println!("  failed {}: {}", date, error);
            }

            if validation.passed() {
                println!("Validation passed ({} entries checked)", validation.entries_checked);
            } else {
                println!("Validation found {} mismatches:", validation.mismatches.len());
                for mismatch in &validation.mismatches {
                    println!("  {}", mismatch);
                }
                return Err("migration validation failed".into());
            }
        }
        Command::Stats => {
            let stats = LeagueRunner::stats(&config.storage)?;
            println!("Daily snapshots:      {}", stats.daily_snapshots);
            println!("Account rows:         {}", stats.user_progress_entries);
            println!("Category rows:        {}", stats.language_progress_entries);
            match (stats.first_date, stats.last_date) {
                (Some(first), Some(last)) => println!("Date range:           {} to {}", first, last),
                _ => println!("Date range:           (empty)"),
            }
            println!("Database size:        {} bytes", stats.database_size_bytes);
        }
    }

    info!("Family XP league run complete");
    Ok(())
}
