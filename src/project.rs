use crate::classify::Classification;
use crate::error::ReconError;
use crate::models::{AttributedRecord, PARTNER};
use std::path::Path;
use tracing::info;

/// Column order of the master table and of every export that reuses it.
const MASTER_HEADERS: [&str; 15] = [
    "date",
    "pbat",
    "bank_account_transaction",
    "amount",
    "pdescription",
    "idescription",
    "ref",
    "ibat",
    "vban",
    "cu_src_object",
    "merchant",
    "src_status",
    "merchant_status",
    "is_rejected",
    "is_deleted",
];

/// Column order of the synthetic-IBAT export.
const SYNTHETIC_IBAT_HEADERS: [&str; 6] = [
    "pbat_ids",
    "storytime",
    "prepend_wire_reference",
    "vban_account_number",
    "always_override_vban_account_number",
    "partner",
];

/// Column order of the wire-description-update export.
const WIRE_DESCRIPTION_HEADERS: [&str; 5] = [
    "pbat",
    "ibat",
    "source",
    "prepend_wire_reference",
    "append_bnf",
];

fn flag_text(flag: Option<bool>) -> String {
    match flag {
        Some(true) => "True".to_string(),
        Some(false) => "False".to_string(),
        None => String::new(),
    }
}

fn master_row(record: &AttributedRecord) -> Vec<String> {
    let lifecycle = record.lifecycle.as_ref();
    vec![
        record.tx.date.clone(),
        record.tx.pbat.clone(),
        record.tx.bank_account_transaction.clone(),
        record.tx.amount.to_string(),
        record.tx.pdescription.clone(),
        record.tx.idescription.clone(),
        record.tx.reference.clone(),
        record.tx.ibat.clone(),
        record.vban.clone(),
        record.customer.clone().unwrap_or_default(),
        record.merchant.clone().unwrap_or_default(),
        record.source_status.clone().unwrap_or_default(),
        lifecycle
            .and_then(|l| l.merchant_status.clone())
            .unwrap_or_default(),
        flag_text(lifecycle.and_then(|l| l.is_rejected)),
        flag_text(lifecycle.and_then(|l| l.is_deleted)),
    ]
}

fn write_rows(
    path: &Path,
    headers: &[&str],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<(), ReconError> {
    let output_error = |source: csv::Error| ReconError::Output {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(output_error)?;
    writer.write_record(headers).map_err(output_error)?;

    let mut count = 0;
    for row in rows {
        writer.write_record(&row).map_err(output_error)?;
        count += 1;
    }
    writer
        .flush()
        .map_err(|source| output_error(csv::Error::from(source)))?;

    info!("wrote {} rows to {:?}", count, path);
    Ok(())
}

/// Full merged master table, every attributed column.
pub fn write_master(path: &Path, records: &[AttributedRecord]) -> Result<(), ReconError> {
    write_rows(path, &MASTER_HEADERS, records.iter().map(master_row))
}

/// Combined needs-ticket export: automated bucket first, then manual,
/// master columns.
pub fn write_needs_ticket(path: &Path, classification: &Classification) -> Result<(), ReconError> {
    write_rows(
        path,
        &MASTER_HEADERS,
        classification.needs_ticket().map(master_row),
    )
}

/// Exception bucket, master columns.
pub fn write_exceptions(path: &Path, records: &[AttributedRecord]) -> Result<(), ReconError> {
    write_rows(path, &MASTER_HEADERS, records.iter().map(master_row))
}

/// Automated-remediation export for synthetic-IBAT generation. The ticket
/// reference lands in `storytime` and may be empty.
pub fn write_synthetic_ibat(
    path: &Path,
    records: &[AttributedRecord],
    ticket: &str,
) -> Result<(), ReconError> {
    write_rows(
        path,
        &SYNTHETIC_IBAT_HEADERS,
        records.iter().map(|record| {
            vec![
                record.tx.pbat.clone(),
                ticket.to_string(),
                "TRUE".to_string(),
                record.vban.clone(),
                "FALSE".to_string(),
                PARTNER.to_string(),
            ]
        }),
    )
}

/// Manual-remediation export for wire-description updates.
pub fn write_wire_description_update(
    path: &Path,
    records: &[AttributedRecord],
) -> Result<(), ReconError> {
    write_rows(
        path,
        &WIRE_DESCRIPTION_HEADERS,
        records.iter().map(|record| {
            vec![
                record.tx.pbat.clone(),
                record.tx.ibat.clone(),
                record.customer.clone().unwrap_or_default(),
                "FALSE".to_string(),
                "TRUE".to_string(),
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MerchantLifecycle, TransactionRecord};
    use rust_decimal_macros::dec;
    use std::fs;
    use tempfile::tempdir;

    fn sample_record() -> AttributedRecord {
        let tx = TransactionRecord {
            date: "2024-02-01".to_string(),
            pbat: "pbat_1".to_string(),
            bank_account_transaction: "bat_1".to_string(),
            amount: dec!(100.50),
            pdescription: "WT 1111000011112222 IN".to_string(),
            idescription: "BNF=STRIPE".to_string(),
            reference: "1111000011112222".to_string(),
            ibat: "ibat_1".to_string(),
        };
        let mut record = AttributedRecord::new(tx, Some("VBAN1".to_string()));
        record.customer = Some("cu_1".to_string());
        record.merchant = Some("m_1".to_string());
        record.source_status = Some("Horizon".to_string());
        record.lifecycle = Some(MerchantLifecycle {
            merchant_status: Some("approved".to_string()),
            is_rejected: Some(false),
            is_deleted: Some(false),
        });
        record
    }

    #[test]
    fn test_master_columns_and_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("merged_data.csv");

        write_master(&path, &[sample_record()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,pbat,bank_account_transaction,amount,pdescription,idescription,\
             ref,ibat,vban,cu_src_object,merchant,src_status,merchant_status,\
             is_rejected,is_deleted"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("pbat_1"));
        assert!(row.contains("100.50"));
        assert!(row.contains("VBAN1"));
        assert!(row.contains("Horizon"));
        assert!(row.ends_with("False,False"));
    }

    #[test]
    fn test_master_renders_unresolved_fields_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("merged_data.csv");

        let mut record = sample_record();
        record.customer = None;
        record.source_status = None;
        record.lifecycle = None;
        write_master(&path, &[record]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert!(row.ends_with("m_1,,,,"));
    }

    #[test]
    fn test_synthetic_ibat_projection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("synthetic_ibat_data.csv");

        write_synthetic_ibat(&path, &[sample_record()], "https://tickets/CLEAR-42").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "pbat_ids,storytime,prepend_wire_reference,vban_account_number,\
             always_override_vban_account_number,partner"
        );
        assert_eq!(
            lines.next().unwrap(),
            "pbat_1,https://tickets/CLEAR-42,TRUE,VBAN1,FALSE,wellsfargo"
        );
    }

    #[test]
    fn test_synthetic_ibat_empty_ticket() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("synthetic_ibat_data.csv");

        write_synthetic_ibat(&path, &[sample_record()], "").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().nth(1).unwrap(),
            "pbat_1,,TRUE,VBAN1,FALSE,wellsfargo"
        );
    }

    #[test]
    fn test_wire_description_projection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wire_description_update_data.csv");

        write_wire_description_update(&path, &[sample_record()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "pbat,ibat,source,prepend_wire_reference,append_bnf"
        );
        assert_eq!(lines.next().unwrap(), "pbat_1,ibat_1,cu_1,FALSE,TRUE");
    }

    #[test]
    fn test_needs_ticket_writes_automated_then_manual() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ticket_upload_data.csv");

        let mut automated = sample_record();
        automated.tx.pbat = "pbat_auto".to_string();
        let mut manual = sample_record();
        manual.tx.pbat = "pbat_manual".to_string();
        manual.source_status = Some("pending".to_string());

        let classification = Classification {
            automated: vec![automated],
            manual: vec![manual],
            exceptions: vec![],
        };
        write_needs_ticket(&path, &classification).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let pbats: Vec<&str> = content
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(pbats, vec!["pbat_auto", "pbat_manual"]);
    }

    #[test]
    fn test_empty_bucket_still_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exception_cases_data.csv");

        write_exceptions(&path, &[]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
