use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use wire_recon::{run_reconciliation, RunOptions};
use wire_recon::query::ExecQueryClient;

#[derive(Parser, Debug)]
#[command(about = "Reconcile unmatched wire receivables against VBAN reports")]
struct Args {
    /// Directory scanned for dated bank report files
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// Filename prefix of the bank report convention
    #[arg(long, default_value = "Missing VBANs Report")]
    report_prefix: String,

    /// Persisted reference-to-VBAN store
    #[arg(long, default_value = "main_data.csv")]
    store: PathBuf,

    /// Directory receiving the generated CSVs
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Ticket link for the synthetic-IBAT export (prompted when omitted)
    #[arg(long)]
    ticket: Option<String>,

    /// Command used to execute warehouse queries
    #[arg(long, default_value = "hubble-query")]
    query_cmd: String,

    /// Log directory (defaults to logs/)
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Create logs directory if it doesn't exist
    if !args.log_dir.exists() {
        fs::create_dir_all(&args.log_dir)?;
    }

    // Generate log filename with current datetime
    let datetime = Local::now().format("%Y%m%d_%H%M%S");
    let log_file = args.log_dir.join(format!("wire_recon_{}.log", datetime));

    // Initialize logging to a file
    let file_appender =
        tracing_appender::rolling::never(&args.log_dir, log_file.file_name().unwrap_or_default());
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Run the reconciliation pipeline and report the bucket counts
    let client = ExecQueryClient::new(args.query_cmd);
    let summary = run_reconciliation(
        &client,
        RunOptions {
            reports_dir: args.reports_dir,
            report_prefix: args.report_prefix,
            store_path: args.store,
            out_dir: args.out_dir,
            ticket: args.ticket,
        },
    )
    .await?;

    println!(
        "{} records reconciled: {} automated, {} manual, {} exceptions",
        summary.total, summary.automated, summary.manual, summary.exceptions
    );

    Ok(())
}
