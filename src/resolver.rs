use crate::error::{Pass, ReconError};
use crate::models::{
    coalesce, parse_flag, AttributedRecord, MerchantLifecycle, ReferenceVbanMap,
    TransactionRecord, CUSTOMER_PREFIX, STATUS_HORIZON,
};
use crate::query::{
    field, QueryClient, Row, ALLOCATIONS_STATEMENT, MERCHANTS_STATEMENT,
    SOURCE_OBJECTS_STATEMENT, TRANSACTIONS_STATEMENT,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Progressive enrichment of wire receivables: vban, then owning
/// customer/merchant, then merchant lifecycle. Passes run strictly in
/// order because each builds its query parameters from the previous
/// pass's output. Any query failure aborts the run.
pub struct AttributionResolver<'a> {
    client: &'a dyn QueryClient,
}

impl<'a> AttributionResolver<'a> {
    pub fn new(client: &'a dyn QueryClient) -> Self {
        Self { client }
    }

    /// Run all three passes and return fully attributed records.
    pub async fn resolve(
        &self,
        map: &ReferenceVbanMap,
    ) -> Result<Vec<AttributedRecord>, ReconError> {
        let transactions = self.fetch_transactions().await?;
        let records = attach_vbans(transactions, map);
        let records = self.resolve_ownership(records).await?;
        let records = self.resolve_lifecycle(records).await?;
        Ok(records)
    }

    async fn execute(
        &self,
        pass: Pass,
        statement: &str,
        params: &[String],
    ) -> Result<Vec<Row>, ReconError> {
        let output = self
            .client
            .execute(statement, params)
            .await
            .map_err(|source| ReconError::Resolution { pass, source })?;

        info!(
            "{} query returned {} rows ({})",
            pass,
            output.rows.len(),
            output.permalink
        );
        Ok(output.rows)
    }

    /// Pass 1 fetch: unreconciled wire receivables from the ledger.
    async fn fetch_transactions(&self) -> Result<Vec<TransactionRecord>, ReconError> {
        let rows = self
            .execute(Pass::Transactions, TRANSACTIONS_STATEMENT, &[])
            .await?;
        rows.iter().map(parse_transaction).collect()
    }

    /// Pass 2: allocation join, then the source-object fallback for
    /// records the allocation pass left without customer AND merchant.
    async fn resolve_ownership(
        &self,
        mut records: Vec<AttributedRecord>,
    ) -> Result<Vec<AttributedRecord>, ReconError> {
        let vbans = distinct(
            records
                .iter()
                .filter(|record| record.has_vban())
                .map(|record| record.vban.as_str()),
        );

        if !vbans.is_empty() {
            let rows = self
                .execute(Pass::Allocations, ALLOCATIONS_STATEMENT, &vbans)
                .await?;
            let index = allocation_index(&rows);

            let mut hits = 0;
            for record in &mut records {
                if let Some((customer, merchant)) = index.get(&record.vban) {
                    record.customer = customer.clone();
                    record.merchant = merchant.clone();
                    hits += 1;
                }
            }
            debug!("allocation pass matched {} of {} records", hits, records.len());
        }

        let unresolved = distinct(
            records
                .iter()
                .filter(|record| {
                    record.customer.is_none() && record.merchant.is_none() && record.has_vban()
                })
                .map(|record| record.vban.as_str()),
        );

        if !unresolved.is_empty() {
            let rows = self
                .execute(Pass::SourceObjects, SOURCE_OBJECTS_STATEMENT, &unresolved)
                .await?;
            let index = source_index(&rows);

            let mut hits = 0;
            for record in &mut records {
                if let Some(source) = index.get(&record.vban) {
                    record.customer = coalesce(record.customer.take(), source.customer.clone());
                    record.merchant = coalesce(record.merchant.take(), source.merchant.clone());
                    record.source_status = source.status.clone();
                    hits += 1;
                }
            }
            debug!("source-object pass matched {} of {} records", hits, records.len());
        }

        for record in &mut records {
            apply_status_override(record);
        }

        Ok(records)
    }

    /// Pass 3: merchant lifecycle join for every record with a merchant.
    async fn resolve_lifecycle(
        &self,
        mut records: Vec<AttributedRecord>,
    ) -> Result<Vec<AttributedRecord>, ReconError> {
        let merchants = distinct(
            records
                .iter()
                .filter_map(|record| record.merchant.as_deref()),
        );
        if merchants.is_empty() {
            return Ok(records);
        }

        let rows = self
            .execute(Pass::Merchants, MERCHANTS_STATEMENT, &merchants)
            .await?;
        let index = lifecycle_index(&rows);

        for record in &mut records {
            if let Some(merchant) = &record.merchant {
                if let Some(lifecycle) = index.get(merchant) {
                    record.lifecycle = Some(lifecycle.clone());
                }
            }
        }

        Ok(records)
    }
}

/// Left-join fetched transactions against the reference map. A missing
/// mapping becomes the sentinel vban, never an empty value.
pub fn attach_vbans(
    transactions: Vec<TransactionRecord>,
    map: &ReferenceVbanMap,
) -> Vec<AttributedRecord> {
    transactions
        .into_iter()
        .map(|tx| {
            let vban = map.lookup(&tx.reference).map(str::to_string);
            AttributedRecord::new(tx, vban)
        })
        .collect()
}

/// A customer id with the customer-object prefix plus a real vban means
/// the record resolved through the primary path: force the status,
/// overriding whatever the source-object pass set.
pub fn apply_status_override(record: &mut AttributedRecord) {
    let is_customer_object = record
        .customer
        .as_deref()
        .map_or(false, |customer| customer.starts_with(CUSTOMER_PREFIX));
    if is_customer_object && record.has_vban() {
        record.source_status = Some(STATUS_HORIZON.to_string());
    }
}

fn parse_transaction(row: &Row) -> Result<TransactionRecord, ReconError> {
    let pbat = field(row, "pbat")
        .ok_or_else(|| malformed("missing column 'pbat'"))?
        .to_string();
    let amount_text = field(row, "amount").ok_or_else(|| malformed("missing column 'amount'"))?;
    let amount: Decimal = amount_text
        .parse()
        .map_err(|_| malformed(format!("unparseable amount '{}'", amount_text)))?;

    Ok(TransactionRecord {
        date: text(row, "date"),
        pbat,
        bank_account_transaction: text(row, "bank_account_transaction"),
        amount,
        pdescription: text(row, "pdescription"),
        idescription: text(row, "idescription"),
        reference: text(row, "ref"),
        ibat: text(row, "ibat"),
    })
}

fn malformed(detail: impl Into<String>) -> ReconError {
    ReconError::MalformedRow {
        pass: Pass::Transactions,
        detail: detail.into(),
    }
}

fn text(row: &Row, name: &str) -> String {
    field(row, name).unwrap_or("").to_string()
}

fn distinct<'r>(values: impl Iterator<Item = &'r str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|value| seen.insert(value.to_string()))
        .map(str::to_string)
        .collect()
}

type OwnerPair = (Option<String>, Option<String>);

fn allocation_index(rows: &[Row]) -> HashMap<String, OwnerPair> {
    rows.iter()
        .filter_map(|row| {
            let account = field(row, "account_number")?;
            Some((
                account.to_string(),
                (
                    field(row, "customer").map(str::to_string),
                    field(row, "merchant").map(str::to_string),
                ),
            ))
        })
        .collect()
}

struct SourceObject {
    customer: Option<String>,
    merchant: Option<String>,
    status: Option<String>,
}

fn source_index(rows: &[Row]) -> HashMap<String, SourceObject> {
    rows.iter()
        .filter_map(|row| {
            let vban = field(row, "vban")?;
            Some((
                vban.to_string(),
                SourceObject {
                    customer: field(row, "cu_src_object").map(str::to_string),
                    merchant: field(row, "merchant").map(str::to_string),
                    status: field(row, "src_status").map(str::to_string),
                },
            ))
        })
        .collect()
}

fn lifecycle_index(rows: &[Row]) -> HashMap<String, MerchantLifecycle> {
    rows.iter()
        .filter_map(|row| {
            let merchant = field(row, "merchant")?;
            Some((
                merchant.to_string(),
                MerchantLifecycle {
                    merchant_status: field(row, "merchant_status").map(str::to_string),
                    is_rejected: field(row, "is_rejected").and_then(parse_flag),
                    is_deleted: field(row, "is_deleted").and_then(parse_flag),
                },
            ))
        })
        .collect()
}
