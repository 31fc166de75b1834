use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Placeholder written into records whose reference never appeared in a
/// bank report. Downstream filters rely on this exact string, so absence is
/// never represented by an empty value.
pub const VBAN_SENTINEL: &str = "VBAN Not provided by WF";

/// Source status assigned when a record resolved fully through the primary
/// allocation path.
pub const STATUS_HORIZON: &str = "Horizon";

/// Prefix carried by customer-object identifiers.
pub const CUSTOMER_PREFIX: &str = "cu_";

/// Banking partner emitted into the synthetic-IBAT export.
pub const PARTNER: &str = "wellsfargo";

/// A wire receivable awaiting attribution, as returned by the transaction
/// query. Immutable once fetched; enrichment widens it into an
/// [`AttributedRecord`] instead of mutating it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionRecord {
    pub date: String,
    /// Primary-ledger identifier.
    pub pbat: String,
    pub bank_account_transaction: String,
    pub amount: Decimal,
    pub pdescription: String,
    pub idescription: String,
    /// 16-digit wire token extracted from the transaction description.
    pub reference: String,
    /// Intraday counterpart identifier.
    pub ibat: String,
}

/// Merchant lifecycle fields from the merchant-master query. The flags
/// arrive as `"True"`/`"False"` literals and are parsed with
/// [`parse_flag`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MerchantLifecycle {
    pub merchant_status: Option<String>,
    pub is_rejected: Option<bool>,
    pub is_deleted: Option<bool>,
}

/// A [`TransactionRecord`] widened by the resolver passes.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedRecord {
    pub tx: TransactionRecord,
    /// Never empty: [`VBAN_SENTINEL`] stands in when no report row matched.
    pub vban: String,
    pub customer: Option<String>,
    pub merchant: Option<String>,
    pub source_status: Option<String>,
    pub lifecycle: Option<MerchantLifecycle>,
}

impl AttributedRecord {
    /// Start from a bare transaction with nothing resolved yet.
    pub fn new(tx: TransactionRecord, vban: Option<String>) -> Self {
        Self {
            tx,
            vban: vban.unwrap_or_else(|| VBAN_SENTINEL.to_string()),
            customer: None,
            merchant: None,
            source_status: None,
            lifecycle: None,
        }
    }

    /// Whether a real VBAN (not the sentinel) is attached.
    pub fn has_vban(&self) -> bool {
        self.vban != VBAN_SENTINEL
    }
}

/// One persisted (reference, vban) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VbanRow {
    pub reference: String,
    pub vban: String,
}

/// Accumulated reference-to-VBAN mapping, append-only across runs.
///
/// Only exact-duplicate pairs are dropped on append. The same reference can
/// map to two different vbans across reports; both rows are kept and
/// [`lookup`](Self::lookup) resolves to the first one recorded.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReferenceVbanMap {
    rows: Vec<VbanRow>,
}

impl ReferenceVbanMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single pair; returns false if the exact pair is already
    /// present.
    pub fn push(&mut self, row: VbanRow) -> bool {
        if self.rows.contains(&row) {
            return false;
        }
        self.rows.push(row);
        true
    }

    /// Append a batch of pairs, dropping exact duplicates. Returns how many
    /// rows were actually added.
    pub fn extend<I: IntoIterator<Item = VbanRow>>(&mut self, rows: I) -> usize {
        rows.into_iter().filter(|row| self.push(row.clone())).count()
    }

    /// First vban recorded for a reference, if any.
    pub fn lookup(&self, reference: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.reference == reference)
            .map(|row| row.vban.as_str())
    }

    pub fn rows(&self) -> &[VbanRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Null-coalescing merge used when two resolution passes offer the same
/// attribute: the secondary (later, more specific) value wins when present,
/// otherwise the primary value is kept. Never lets a null override a value.
pub fn coalesce(primary: Option<String>, secondary: Option<String>) -> Option<String> {
    secondary.or(primary)
}

/// Parse the collaborator's boolean literals. Anything other than
/// `True`/`False` (any case) is treated as unknown.
pub fn parse_flag(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(reference: &str, vban: &str) -> VbanRow {
        VbanRow {
            reference: reference.to_string(),
            vban: vban.to_string(),
        }
    }

    #[test]
    fn test_push_drops_exact_duplicates() {
        let mut map = ReferenceVbanMap::new();

        assert!(map.push(pair("REF1", "VBAN1")));
        assert!(!map.push(pair("REF1", "VBAN1")));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_same_reference_different_vban_keeps_both() {
        let mut map = ReferenceVbanMap::new();

        assert!(map.push(pair("REF1", "VBAN1")));
        assert!(map.push(pair("REF1", "VBAN2")));
        assert_eq!(map.len(), 2);

        // Lookups resolve to the first recorded mapping
        assert_eq!(map.lookup("REF1"), Some("VBAN1"));
    }

    #[test]
    fn test_extend_counts_added_rows() {
        let mut map = ReferenceVbanMap::new();
        map.push(pair("REF1", "VBAN1"));

        let added = map.extend(vec![
            pair("REF1", "VBAN1"), // duplicate
            pair("REF2", "VBAN2"),
            pair("REF2", "VBAN2"), // duplicate within the batch
        ]);

        assert_eq!(added, 1);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_lookup_miss() {
        let map = ReferenceVbanMap::new();
        assert_eq!(map.lookup("REF1"), None);
    }

    #[test]
    fn test_coalesce_secondary_wins() {
        assert_eq!(
            coalesce(None, Some("cu_123".to_string())),
            Some("cu_123".to_string())
        );
        assert_eq!(
            coalesce(Some("cu_999".to_string()), None),
            Some("cu_999".to_string())
        );
        assert_eq!(
            coalesce(Some("cu_999".to_string()), Some("cu_123".to_string())),
            Some("cu_123".to_string())
        );
        assert_eq!(coalesce(None, None), None);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag(""), None);
        assert_eq!(parse_flag("nan"), None);
    }

    #[test]
    fn test_attributed_record_sentinel() {
        let record = AttributedRecord::new(TransactionRecord::default(), None);

        assert_eq!(record.vban, VBAN_SENTINEL);
        assert!(!record.has_vban());

        let record = AttributedRecord::new(TransactionRecord::default(), Some("VBAN1".to_string()));
        assert_eq!(record.vban, "VBAN1");
        assert!(record.has_vban());
    }
}
