//! newslake CLI — news fetch and bronze/silver/gold pipeline commands.
//!
//! Commands:
//! - `fetch` — incremental trailing-window fetch into bronze
//! - `backfill` — chunked historical fetch into bronze
//! - `silver` — normalize bronze into partitioned silver Parquet
//! - `gold` — aggregate silver into the per-window feature table
//! - `status` — report what each layer currently holds

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use newslake_core::fetch::{GdeltClient, RateLimitedFetcher, RetryPolicy, ThreadSleeper};
use newslake_core::fetch::source::NewsSource;
use newslake_core::{
    aggregate, normalize, run_backfill, run_incremental, BronzeStore, GoldStore, PipelineConfig,
    SilverStore, StdoutProgress,
};
use newslake_core::driver::DriverReport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "newslake",
    about = "newslake CLI — rate-limited news ETL (bronze/silver/gold)"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data root directory holding the bronze/silver/gold trees.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Incremental fetch: the trailing window ending now.
    Fetch {
        /// Trailing window size in minutes. Overrides the config value.
        #[arg(long)]
        timespan_minutes: Option<i64>,

        /// Per-query record cap. Overrides the config value.
        #[arg(long)]
        max_records: Option<usize>,

        /// Also run the configured extra queries.
        #[arg(long, default_value_t = false)]
        include_extra_queries: bool,
    },
    /// Backfill a historical range in chunks.
    Backfill {
        /// Range start, `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM` (UTC).
        #[arg(long)]
        start: String,

        /// Range end (exclusive), same formats as --start.
        #[arg(long)]
        end: String,

        /// Chunk size in hours. Overrides the config value.
        #[arg(long)]
        batch_hours: Option<i64>,

        /// Per-query record cap. Overrides the config value.
        #[arg(long)]
        max_records: Option<usize>,

        /// Also run the configured extra queries.
        #[arg(long, default_value_t = false)]
        include_extra_queries: bool,
    },
    /// Rebuild silver partitions from the full bronze set.
    Silver,
    /// Recompute the gold feature table from silver.
    Gold {
        /// Aggregation window in minutes. Overrides the config value.
        #[arg(long)]
        window_minutes: Option<i64>,

        /// News-shock baseline length in windows. Overrides the config value.
        #[arg(long)]
        lookback: Option<usize>,
    },
    /// Report bronze batch counts, silver partitions, and gold parameters.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let source = GdeltClient::new();
    let source_name = source.name().to_string();

    match cli.command {
        Commands::Fetch {
            timespan_minutes,
            max_records,
            include_extra_queries,
        } => {
            let timespan = timespan_minutes.unwrap_or(config.fetch.timespan_minutes);
            let max_records = max_records.unwrap_or(config.fetch.max_records_per_query);
            let queries = config.effective_queries(include_extra_queries);

            let sleeper = ThreadSleeper;
            let fetcher = RateLimitedFetcher::new(
                &source,
                RetryPolicy::from_config(&config.fetch),
                config.fetch.between_query_wait(),
                &sleeper,
            );
            let bronze = BronzeStore::new(&cli.data_dir, &source_name);

            let report = run_incremental(
                &fetcher,
                &bronze,
                &queries,
                Utc::now(),
                timespan,
                max_records,
                &StdoutProgress,
            )?;
            print_report(&report);
        }
        Commands::Backfill {
            start,
            end,
            batch_hours,
            max_records,
            include_extra_queries,
        } => {
            let start = parse_datetime(&start).context("invalid --start")?;
            let end = parse_datetime(&end).context("invalid --end")?;
            let batch_hours = batch_hours.unwrap_or(config.backfill.batch_hours);
            let max_records = max_records.unwrap_or(config.fetch.max_records_per_query);
            let queries = config.effective_queries(include_extra_queries);

            let sleeper = ThreadSleeper;
            let fetcher = RateLimitedFetcher::new(
                &source,
                RetryPolicy::from_config(&config.fetch),
                config.fetch.between_query_wait(),
                &sleeper,
            );
            let bronze = BronzeStore::new(&cli.data_dir, &source_name);

            let report = run_backfill(
                &fetcher, &bronze, &queries, start, end, batch_hours, max_records,
                &StdoutProgress,
            )?;
            print_report(&report);

            if !report.is_complete() {
                bail!(
                    "{} of {} chunks failed; re-run backfill for the listed windows",
                    report.failed_windows.len(),
                    report.windows_planned
                );
            }
        }
        Commands::Silver => {
            let bronze = BronzeStore::new(&cli.data_dir, &source_name);
            let records = bronze.load_all()?;
            if records.is_empty() {
                bail!("no bronze data under {} — run `fetch` or `backfill` first", cli.data_dir.display());
            }

            let outcome = normalize(records);
            let silver = SilverStore::new(&cli.data_dir, &source_name);
            let report = silver.write(&outcome.records)?;

            println!(
                "Silver rebuilt: {} rows across {} partitions ({} malformed records dropped)",
                report.rows_written, report.partitions_written, outcome.rejected
            );
        }
        Commands::Gold {
            window_minutes,
            lookback,
        } => {
            let window_minutes = window_minutes.unwrap_or(config.gold.window_minutes);
            let lookback = lookback.unwrap_or(config.gold.lookback);

            let silver = SilverStore::new(&cli.data_dir, &source_name);
            let records = silver.load_all()?;
            if records.is_empty() {
                bail!("no silver data under {} — run `silver` first", cli.data_dir.display());
            }

            let rows = aggregate(&records, window_minutes, lookback)?;
            let gold = GoldStore::new(&cli.data_dir, &source_name);
            gold.write(&rows, window_minutes, lookback)?;

            let empty = rows.iter().filter(|r| r.is_empty_window()).count();
            println!(
                "Gold rebuilt: {} windows of {window_minutes}m ({empty} empty), lookback {lookback}",
                rows.len()
            );
        }
        Commands::Status => {
            let bronze = BronzeStore::new(&cli.data_dir, &source_name);
            let status = bronze.status()?;
            println!(
                "bronze: {} batches, {} records",
                status.batch_count, status.total_records
            );
            if let Some(latest) = status.latest {
                println!("  latest: {} ({} records)", latest.file, latest.record_count);
            }

            let silver = SilverStore::new(&cli.data_dir, &source_name);
            let partitions = silver.partitions()?;
            match (partitions.first(), partitions.last()) {
                (Some((d0, h0)), Some((d1, h1))) => println!(
                    "silver: {} partitions, {d0} {h0:02}:00 .. {d1} {h1:02}:00",
                    partitions.len()
                ),
                _ => println!("silver: empty"),
            }

            let gold = GoldStore::new(&cli.data_dir, &source_name);
            match gold.meta() {
                Some(meta) => println!(
                    "gold: {} rows, window {}m, lookback {}",
                    meta.row_count, meta.window_minutes, meta.lookback
                ),
                None => println!("gold: empty"),
            }
        }
    }

    Ok(())
}

fn print_report(report: &DriverReport) {
    println!(
        "\nFetch complete: {}/{} windows, {} fetched, {} unique ({} retries)",
        report.windows_planned - report.failed_windows.len(),
        report.windows_planned,
        report.total_fetched,
        report.unique_records,
        report.total_retries
    );
    println!(
        "  domains: {}, languages: {}, countries: {}",
        report.summary.unique_domains,
        report.summary.unique_languages,
        report.summary.unique_countries
    );
    if let Some(file) = &report.combined_file {
        println!("  combined: {file}");
    }
    for window in &report.failed_windows {
        println!("  FAILED: {window}");
    }
}

/// Accept `YYYY-MM-DD` (midnight UTC) or `YYYY-MM-DDTHH:MM`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .context("midnight construction failed")?;
        return Ok(midnight.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
        return Ok(dt.and_utc());
    }
    bail!("expected YYYY-MM-DD or YYYY-MM-DDTHH:MM, got '{s}'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_date_and_datetime_forms() {
        assert_eq!(
            parse_datetime("2024-11-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_datetime("2024-11-01T13:30").unwrap(),
            Utc.with_ymd_and_hms(2024, 11, 1, 13, 30, 0).unwrap()
        );
        assert!(parse_datetime("11/01/2024").is_err());
    }
}
