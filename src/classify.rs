use crate::models::{AttributedRecord, STATUS_HORIZON};
use tracing::info;

/// Source statuses that route a record to manual remediation.
const STATUS_PENDING: &str = "pending";
const STATUS_CHARGEABLE: &str = "chargeable";

/// Merchant application state that disqualifies both remediation paths.
const MERCHANT_REJECTED: &str = "rejected";

/// Disjoint partition of attributed records. Rules apply in order and the
/// first match wins, so a record lands in exactly one bucket and the three
/// buckets together are the whole input set.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Classification {
    /// Eligible for synthetic-IBAT generation.
    pub automated: Vec<AttributedRecord>,
    /// Eligible for a manual wire-description update.
    pub manual: Vec<AttributedRecord>,
    /// Everything the rules could not place.
    pub exceptions: Vec<AttributedRecord>,
}

impl Classification {
    /// Records that need a tracking ticket: the automated bucket first,
    /// then the manual one.
    pub fn needs_ticket(&self) -> impl Iterator<Item = &AttributedRecord> {
        self.automated.iter().chain(self.manual.iter())
    }

    pub fn total(&self) -> usize {
        self.automated.len() + self.manual.len() + self.exceptions.len()
    }
}

/// Merchant lifecycle gate shared by both remediation rules: the merchant
/// must be known, not rejected (neither by application state nor flag) and
/// not deleted. A record with no lifecycle data never qualifies.
fn lifecycle_clear(record: &AttributedRecord) -> bool {
    match &record.lifecycle {
        Some(lifecycle) => {
            lifecycle.merchant_status.as_deref() != Some(MERCHANT_REJECTED)
                && lifecycle.is_deleted == Some(false)
                && lifecycle.is_rejected == Some(false)
        }
        None => false,
    }
}

/// Rule A: resolved through the primary path and lifecycle-clear.
pub fn eligible_for_automated(record: &AttributedRecord) -> bool {
    record.source_status.as_deref() == Some(STATUS_HORIZON) && lifecycle_clear(record)
}

/// Rule B: a pending or chargeable source and lifecycle-clear.
pub fn eligible_for_manual(record: &AttributedRecord) -> bool {
    matches!(
        record.source_status.as_deref(),
        Some(STATUS_PENDING) | Some(STATUS_CHARGEABLE)
    ) && lifecycle_clear(record)
}

/// Partition records into remediation buckets, first matching rule wins.
pub fn classify(records: Vec<AttributedRecord>) -> Classification {
    let mut classification = Classification::default();

    for record in records {
        if eligible_for_automated(&record) {
            classification.automated.push(record);
        } else if eligible_for_manual(&record) {
            classification.manual.push(record);
        } else {
            classification.exceptions.push(record);
        }
    }

    info!(
        "classified {} records: {} automated, {} manual, {} exceptions",
        classification.total(),
        classification.automated.len(),
        classification.manual.len(),
        classification.exceptions.len()
    );

    classification
}
