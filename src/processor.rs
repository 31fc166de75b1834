use crate::classify::classify;
use crate::ingest;
use crate::project;
use crate::query::QueryClient;
use crate::resolver::AttributionResolver;
use crate::store::MapStore;
use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// Output file names under the output directory.
pub const MASTER_FILE: &str = "merged_data.csv";
pub const TICKET_UPLOAD_FILE: &str = "ticket_upload_data.csv";
pub const SYNTHETIC_IBAT_FILE: &str = "synthetic_ibat_data.csv";
pub const WIRE_DESCRIPTION_FILE: &str = "wire_description_update_data.csv";
pub const EXCEPTION_FILE: &str = "exception_cases_data.csv";

/// Run-level configuration for one reconciliation pass.
pub struct RunOptions {
    /// Directory scanned for dated bank report files.
    pub reports_dir: PathBuf,
    /// Filename prefix of the report convention.
    pub report_prefix: String,
    /// Location of the persisted reference-to-VBAN store.
    pub store_path: PathBuf,
    /// Directory receiving the five output CSVs.
    pub out_dir: PathBuf,
    /// Ticket reference for the synthetic-IBAT export; prompted on stdin
    /// when not supplied. Empty is valid and yields an empty field.
    pub ticket: Option<String>,
}

/// Counts reported after a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub map_rows: usize,
    pub total: usize,
    pub automated: usize,
    pub manual: usize,
    pub exceptions: usize,
}

/// Run the full reconciliation pipeline: ingest the latest bank report,
/// resolve attribution through the query collaborator, classify, and emit
/// the per-bucket CSVs.
///
/// Ingestion failures degrade to the previously persisted map; everything
/// after that is fail-fast.
pub async fn run_reconciliation(
    client: &dyn QueryClient,
    options: RunOptions,
) -> Result<RunSummary> {
    let start_time = Instant::now();

    // Fold the most recent bank report into the persisted map
    let store = MapStore::new(&options.store_path);
    let mut map = store.load()?;
    match ingest::ingest_latest_report(&options.reports_dir, &options.report_prefix, &mut map) {
        Ok(Some(outcome)) => {
            info!(
                "ingested {:?}: {} rows, {} new",
                outcome.file, outcome.rows_seen, outcome.rows_added
            );
            store.persist(&map)?;
        }
        Ok(None) => {
            warn!(
                "no report matching '{} <MMDDYYYY> to <MMDDYYYY>' in {:?}",
                options.report_prefix, options.reports_dir
            );
        }
        Err(e) => {
            error!("report ingestion failed, continuing with the persisted map: {}", e);
        }
    }

    // Resolve attribution and write the master table
    let resolver = AttributionResolver::new(client);
    let records = resolver.resolve(&map).await?;
    info!("resolved {} transaction records", records.len());

    std::fs::create_dir_all(&options.out_dir)?;
    project::write_master(&options.out_dir.join(MASTER_FILE), &records)?;

    // Partition into remediation buckets
    let classification = classify(records);
    project::write_needs_ticket(
        &options.out_dir.join(TICKET_UPLOAD_FILE),
        &classification,
    )?;
    project::write_exceptions(
        &options.out_dir.join(EXCEPTION_FILE),
        &classification.exceptions,
    )?;

    // The ticket is minted from the upload file written above, so the
    // prompt comes only now
    let ticket = match options.ticket {
        Some(ticket) => ticket,
        None => prompt_for_ticket()?,
    };
    project::write_synthetic_ibat(
        &options.out_dir.join(SYNTHETIC_IBAT_FILE),
        &classification.automated,
        &ticket,
    )?;
    project::write_wire_description_update(
        &options.out_dir.join(WIRE_DESCRIPTION_FILE),
        &classification.manual,
    )?;

    let summary = RunSummary {
        map_rows: map.len(),
        total: classification.total(),
        automated: classification.automated.len(),
        manual: classification.manual.len(),
        exceptions: classification.exceptions.len(),
    };
    info!(
        "run completed in {:.2?}: {} records ({} automated, {} manual, {} exceptions)",
        start_time.elapsed(),
        summary.total,
        summary.automated,
        summary.manual,
        summary.exceptions
    );

    Ok(summary)
}

fn prompt_for_ticket() -> std::io::Result<String> {
    print!("Please enter the ticket link: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
