use crate::error::IngestError;
use crate::models::{ReferenceVbanMap, VbanRow};
use chrono::NaiveDate;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Column holding the wire reference code in the bank report.
const REFERENCE_COLUMN: &str = "Msg Dr Sbk Ref Num";

/// Column holding the virtual account number in the bank report.
const VBAN_COLUMN: &str = "WPIC Account";

/// Junk rows before the header row in every report file.
const HEADER_OFFSET: usize = 3;

/// A report file whose name matched the dated convention.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFile {
    pub path: PathBuf,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Result of merging one report into the reference map.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub file: PathBuf,
    pub rows_seen: usize,
    pub rows_added: usize,
}

fn filename_pattern(prefix: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"{} (\d{{8}}) to (\d{{8}})", regex::escape(prefix)))
}

/// Find the report with the most recent END date among files in `dir`
/// matching `"<prefix> <MMDDYYYY> to <MMDDYYYY>"`. Ties are broken
/// arbitrarily. Filenames with eight digits that do not form a real date
/// are skipped.
pub fn find_latest_report(dir: &Path, prefix: &str) -> Result<Option<ReportFile>, IngestError> {
    let pattern = filename_pattern(prefix)?;

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(captures) = pattern.captures(&name) else {
            continue;
        };

        let start = NaiveDate::parse_from_str(&captures[1], "%m%d%Y");
        let end = NaiveDate::parse_from_str(&captures[2], "%m%d%Y");
        match (start, end) {
            (Ok(start), Ok(end)) => candidates.push(ReportFile {
                path: entry.path(),
                start,
                end,
            }),
            _ => {
                warn!("skipping report with unparseable dates: {}", name);
            }
        }
    }

    debug!("{} report files matched the filename pattern", candidates.len());
    Ok(candidates.into_iter().max_by_key(|report| report.end))
}

/// Parse a report file into (reference, vban) pairs.
///
/// Reports arrive in a legacy single-byte encoding, so bytes are decoded as
/// windows-1252 (the WHATWG mapping of the ISO-8859-1 label) before CSV
/// parsing. Rows without a reference value are skipped.
pub fn parse_report(path: &Path) -> Result<Vec<VbanRow>, IngestError> {
    let bytes = std::fs::read(path)?;
    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(&bytes);
    if had_errors {
        return Err(IngestError::Encoding {
            path: path.to_path_buf(),
        });
    }

    // Skip the junk preamble so the csv reader sees the real header row
    let mut body: &str = &text;
    for _ in 0..HEADER_OFFSET {
        match body.find('\n') {
            Some(index) => body = &body[index + 1..],
            None => return Err(IngestError::TruncatedPreamble),
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let reference_index = headers
        .iter()
        .position(|header| header.trim() == REFERENCE_COLUMN)
        .ok_or_else(|| IngestError::MissingColumn {
            column: REFERENCE_COLUMN.to_string(),
        })?;
    let vban_index = headers
        .iter()
        .position(|header| header.trim() == VBAN_COLUMN)
        .ok_or_else(|| IngestError::MissingColumn {
            column: VBAN_COLUMN.to_string(),
        })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let reference = record.get(reference_index).unwrap_or("").trim();
        let vban = record.get(vban_index).unwrap_or("").trim();
        if reference.is_empty() {
            continue;
        }
        rows.push(VbanRow {
            reference: reference.to_string(),
            vban: vban.to_string(),
        });
    }

    Ok(rows)
}

/// Locate the latest report under `dir` and fold its rows into `map`.
/// Returns `Ok(None)` when no filename matches; the caller decides how to
/// proceed without fresh report data.
pub fn ingest_latest_report(
    dir: &Path,
    prefix: &str,
    map: &mut ReferenceVbanMap,
) -> Result<Option<IngestOutcome>, IngestError> {
    let Some(report) = find_latest_report(dir, prefix)? else {
        return Ok(None);
    };

    info!(
        "ingesting report {:?} ({} to {})",
        report.path, report.start, report.end
    );

    let rows = parse_report(&report.path)?;
    let rows_seen = rows.len();
    let rows_added = map.extend(rows);

    Ok(Some(IngestOutcome {
        file: report.path,
        rows_seen,
        rows_added,
    }))
}
