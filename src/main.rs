use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod airtable;
mod attendance;
mod cache;
mod error;
mod export;
mod models;
mod projection;
mod report;

use airtable::AirtableConfig;
use cache::SnapshotCache;
use models::{CaseRecord, MonthKey};

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser)]
#[command(name = "clinic-dashboards")]
#[command(about = "Clock-in projection and case score reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a clock-in sheet and project the arrival time needed for a monthly goal
    Attendance {
        /// Clock-in export (.xlsx with a Sheet1, or .csv with the same nine columns)
        #[arg(long)]
        file: PathBuf,
        /// Month-end average to reach, in minutes (positive is early)
        #[arg(
            long,
            default_value_t = 0,
            allow_negative_numbers = true,
            value_parser = clap::value_parser!(i64).range(-60..=60)
        )]
        desired_avg: i64,
        /// Print every parsed record
        #[arg(long)]
        show_records: bool,
        /// Also write the parsed records to this CSV file
        #[arg(long)]
        csv_out: Option<PathBuf>,
    },
    /// Case scores pulled from Airtable
    Cases {
        #[command(flatten)]
        source: SourceArgs,
        #[command(subcommand)]
        command: CaseCommands,
    },
}

#[derive(Args)]
struct SourceArgs {
    #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "AIRTABLE_BASE_ID")]
    base_id: Option<String>,
    #[arg(long, env = "AIRTABLE_BASE_URL", default_value = airtable::DEFAULT_BASE_URL)]
    base_url: String,
    #[arg(long, env = "AIRTABLE_TABLE", default_value = airtable::DEFAULT_TABLE)]
    table: String,
    /// Keep the fetched records in this JSON file and reuse them across runs
    /// for one hour. Without it the snapshot lives only for this run
    #[arg(long, env = "CLINIC_CACHE_FILE")]
    cache_file: Option<PathBuf>,
}

impl SourceArgs {
    fn config(&self) -> AirtableConfig {
        AirtableConfig {
            api_key: self.api_key.clone(),
            base_id: self.base_id.clone(),
            base_url: self.base_url.clone(),
            table: self.table.clone(),
        }
    }

    fn cache(&self) -> SnapshotCache<CaseRecord> {
        match &self.cache_file {
            Some(path) => SnapshotCache::with_file(path.clone(), cache::default_window()),
            None => SnapshotCache::in_memory(cache::default_window()),
        }
    }
}

#[derive(Subcommand)]
enum CaseCommands {
    /// List the months present in the data
    Months,
    /// Print monthly totals and the per-type breakdown
    Summary {
        /// Month to include (YYYY-MM), repeatable. Omitting the flag selects
        /// every month; an empty selection cannot be given here
        #[arg(long = "month")]
        months: Vec<MonthKey>,
    },
    /// Generate a markdown report
    Report {
        /// Month to include (YYYY-MM), repeatable. Omitting the flag selects
        /// every month; an empty selection cannot be given here
        #[arg(long = "month")]
        months: Vec<MonthKey>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export one month of cases to a spreadsheet
    Export {
        #[arg(long)]
        month: MonthKey,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Prefix for the exported file name
        #[arg(long, default_value = "")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Attendance {
            file,
            desired_avg,
            show_records,
            csv_out,
        } => run_attendance(&file, desired_avg as f64, show_records, csv_out.as_deref())?,
        Commands::Cases { source, command } => {
            let mut cache = source.cache();
            let records = airtable::load_cases(&source.config(), &mut cache, Utc::now()).await;
            if let Some(snapshot) = cache.snapshot() {
                info!(fetched_at = %snapshot.fetched_at, "using case snapshot");
            }

            if records.is_empty() {
                println!("No case records available. Check the Airtable configuration or make sure the table has data.");
                return Ok(());
            }

            run_cases(command, &records)?;
        }
    }

    Ok(())
}

fn run_attendance(
    file: &std::path::Path,
    desired_avg: f64,
    show_records: bool,
    csv_out: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let records = match attendance::load(file) {
        Ok(records) => records,
        Err(err) => {
            warn!(error = %err, "could not read attendance file");
            println!("Could not read {}: {err}", file.display());
            return Ok(());
        }
    };
    let records = attendance::exclude_weekday(records, attendance::EXCLUDED_WEEKDAY);
    println!(
        "Loaded {} clock-in records from {} (Sundays excluded).",
        records.len(),
        file.display()
    );

    if show_records {
        println!();
        print!("{}", report::render_attendance_records(&records));
    }

    if let Some(path) = csv_out {
        let out = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        attendance::write_csv(&records, out)?;
        println!("Parsed records written to {}.", path.display());
    }

    if !records.is_empty() {
        let total: i64 = records.iter().map(|r| r.deviation_minutes()).sum();
        println!(
            "Current average deviation: {:.2} minutes (relative to 08:00)",
            total as f64 / records.len() as f64
        );
    }

    println!();
    match projection::project(&records, desired_avg) {
        Ok(projection) => print!("{}", report::render_projection(&projection)),
        Err(err) => {
            warn!(error = %err, "projection skipped");
            println!("Warning: {err}");
        }
    }

    Ok(())
}

fn run_cases(command: CaseCommands, records: &[CaseRecord]) -> anyhow::Result<()> {
    match command {
        CaseCommands::Months => {
            for month in aggregate::available_months(records) {
                println!("{month}");
            }
        }
        CaseCommands::Summary { months } => {
            let selected = selection(records, months);
            let groups = aggregate::filter_months(&aggregate::by_month_and_type(records), &selected);
            let totals = aggregate::filter_months(&aggregate::by_month(records), &selected);
            print!("{}", report::render_month_tables(&groups, &totals));
        }
        CaseCommands::Report { months, out } => {
            let scope = (!months.is_empty()).then(|| {
                months
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            });
            let selected = selection(records, months);
            let scoped = aggregate::filter_months(records, &selected);
            let report = report::build_case_report(scope.as_deref(), &scoped);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        CaseCommands::Export {
            month,
            out_dir,
            owner,
        } => {
            let table = match export::build_export(records, month) {
                Ok(table) => table,
                Err(err) => {
                    warn!(error = %err, "export skipped");
                    println!("Nothing exported: {err}");
                    return Ok(());
                }
            };
            let path = export::write_to_dir(&table, &out_dir, &owner)?;
            info!(rows = table.rows.len(), total = table.total_score, "exported case sheet");
            println!("{}: {} ({})", table.download_label(), path.display(), export::XLSX_MIME);
        }
    }

    Ok(())
}

/// No `--month` flags means every month in the data.
fn selection(records: &[CaseRecord], months: Vec<MonthKey>) -> Vec<MonthKey> {
    if months.is_empty() {
        aggregate::available_months(records)
    } else {
        months
    }
}
