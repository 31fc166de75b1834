use std::path::PathBuf;
use thiserror::Error;

/// Resolver pass that produced an error, carried for run-failure context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Transactions,
    Allocations,
    SourceObjects,
    Merchants,
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Pass::Transactions => "transaction",
            Pass::Allocations => "vban allocation",
            Pass::SourceObjects => "source object",
            Pass::Merchants => "merchant master",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while ingesting a bank report file.
///
/// These abort the ingestion step only: the run continues against the
/// previously persisted reference map.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("report {path} is not valid windows-1252 text")]
    Encoding { path: PathBuf },

    #[error("report is missing expected column '{column}'")]
    MissingColumn { column: String },

    #[error("failed to parse report: {0}")]
    Malformed(#[from] csv::Error),

    #[error("report has fewer rows than the header offset")]
    TruncatedPreamble,

    #[error("invalid report filename pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to read report: {0}")]
    FileReadError(#[from] std::io::Error),
}

/// Errors from the external query collaborator.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("failed to launch query command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("query command exited with {status}")]
    Failed { status: std::process::ExitStatus },

    #[error("query output was malformed: {0}")]
    Malformed(String),

    #[error("failed to parse query output: {0}")]
    CsvError(#[from] csv::Error),

    #[error("failed to read query output: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal run errors. The first of these halts the pipeline; partial output
/// files already written stay on disk.
#[derive(Error, Debug)]
pub enum ReconError {
    #[error("{pass} query failed: {source}")]
    Resolution {
        pass: Pass,
        #[source]
        source: QueryError,
    },

    #[error("{pass} query returned a malformed row: {detail}")]
    MalformedRow { pass: Pass, detail: String },

    #[error("reference store error: {0}")]
    Store(#[source] csv::Error),

    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_ingest_missing_column() {
        let error = IngestError::MissingColumn {
            column: "WPIC Account".to_string(),
        };

        assert!(error.to_string().contains("WPIC Account"));
        assert!(error.source().is_none());
    }

    #[test]
    fn test_ingest_file_read_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: IngestError = io_error.into();

        assert!(error.to_string().contains("failed to read report"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_resolution_error_names_pass() {
        let error = ReconError::Resolution {
            pass: Pass::Allocations,
            source: QueryError::Malformed("no stdout".to_string()),
        };

        assert!(error.to_string().contains("vban allocation"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_malformed_row_names_pass() {
        let error = ReconError::MalformedRow {
            pass: Pass::Transactions,
            detail: "missing column 'amount'".to_string(),
        };

        assert!(error.to_string().contains("transaction"));
        assert!(error.to_string().contains("amount"));
    }
}
