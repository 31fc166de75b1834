pub mod classify;
pub mod error;
pub mod ingest;
pub mod models;
pub mod project;
pub mod query;
pub mod resolver;
pub mod store;
mod processor;

// Re-export the pipeline entry point for convenience
pub use processor::{
    run_reconciliation, RunOptions, RunSummary, EXCEPTION_FILE, MASTER_FILE, SYNTHETIC_IBAT_FILE,
    TICKET_UPLOAD_FILE, WIRE_DESCRIPTION_FILE,
};
