use crate::error::QueryError;
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

/// One result row, keyed by column name. An absent key or an empty value
/// both read as null through [`field`].
pub type Row = HashMap<String, String>;

/// Result of one query round-trip: a shareable permalink for audit plus
/// the result rows.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub permalink: String,
    pub rows: Vec<Row>,
}

/// The external analytical query service. The pipeline depends only on
/// this signature; statements are crate constants and values travel as a
/// bound parameter list, never spliced into the statement text.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn execute(&self, statement: &str, params: &[String]) -> Result<QueryOutput, QueryError>;
}

/// Non-empty value of a column, if present.
pub fn field<'a>(row: &'a Row, name: &str) -> Option<&'a str> {
    row.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// Unreconciled wire receivables: 16-digit `WT` reference token, USD,
/// perfect-receivable label, joined to their intraday counterpart and
/// filtered to records without a tracking ticket. No parameters.
pub const TRANSACTIONS_STATEMENT: &str = r#"
with pbat_cte as (
  select
    p.date,
    p._id as pbat,
    p.bank_account_transaction,
    p.amount / 100.00 as amount,
    p.description as pdescription,
    i.description as idescription,
    cast(regexp_extract(p.description, 'WT ([0-9]+)', 1) as varchar) as ref,
    i.ibat
  from mongo.parsedbankaccounttransactions p
  join (
    select _id as ibat, date, amount, account, description
    from mongo.intradaybankaccounttransactions
    where description like '%BNF=STRIPE%'
  ) as i on i.description like concat('%', regexp_extract(p.description, 'WT ([0-9]+)', 1), '%')
  where reconciliation_key is null
    and length(regexp_extract(p.description, 'WT ([0-9]+)', 1)) = 16
    and label = 'wells_ach_perfect_receivable'
    and currency = 'usd'
  order by date desc
), ticket_cte as (
  select issue_link, description as tdescription
  from jiradb.denormalized_jiraissue
  where project_id = 42801
    and (labels like '%ach-perfectreceivable%'
      and labels like '%sdc-techops-bulk-clearing%'
      and labels like '%sdc-techops-projects%'
      and labels like '%sdc-ui-clearing%')
)
select date, pbat, bank_account_transaction, amount, pdescription, idescription, ref, ibat
from pbat_cte
left join ticket_cte on tdescription like concat('%', pbat, '%')
where issue_link is null
"#;

/// Allocated Wells Fargo USD vbans with their customer and merchant. The
/// runner expands the placeholder from the bound vban list.
pub const ALLOCATIONS_STATEMENT: &str = r#"
with base as (
  select
    vban.state as vban_state,
    vban.type,
    concat_ws(
      '::',
      vban.vban.ach.account_number,
      vban.vban.indonesia_ct.account_number,
      vban.vban.japan_bt.account_number,
      vban.vban.sepa.account_number,
      vban.vban.sepa.iban,
      vban.vban.spei.clabe,
      vban.vban.uk_ct.account_number
    ) as account_number,
    vamv.funding_flow.destination_customer_balance.customer,
    vamv.merchant
  from iceberg.vbandb.vban_record vban
    left join iceberg.h_merchant_banktransfersfpi.sharded_vban_network_model_records vnmv
      on vban.external_id = vnmv.id
    left join iceberg.h_merchant_banktransfersfpi.sharded_vban_allocation_model_records vamv
      on vnmv.vban_allocation_id = vamv.id
)
select account_number, customer, merchant
from base
where type = 'WELLS_FARGO_USD'
  and vban_state = 'ALLOCATED'
  and regexp_like(account_number, ?)
"#;

/// Payment-source records looked up by external account number, used as
/// the fallback when the allocation pass supplied neither customer nor
/// merchant. The runner expands the placeholder from the bound vban list.
pub const SOURCE_OBJECTS_STATEMENT: &str = r#"
select
  _id as cu_src_object,
  merchant,
  cast(json_extract(external_data, '$.account_number') as varchar) as vban,
  status as src_status
from mongo.sources
where cast(json_extract(external_data, '$.account_number') as varchar) in (?)
"#;

/// Merchant lifecycle fields by merchant id. The runner expands the
/// placeholder from the bound merchant list.
pub const MERCHANTS_STATEMENT: &str = r#"
select
  merchant_id as merchant,
  account_applications__latest__application_state as merchant_status,
  is_rejected,
  is_deleted
from cdm.merchants_core
where merchant_id in (?)
"#;

/// Query client backed by an external runner command.
///
/// The statement is written to the runner's stdin and the bound parameters
/// are passed as arguments. The runner prints the query permalink on its
/// first stdout line, followed by a headered CSV of the result rows.
pub struct ExecQueryClient {
    command: String,
}

impl ExecQueryClient {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl QueryClient for ExecQueryClient {
    async fn execute(&self, statement: &str, params: &[String]) -> Result<QueryOutput, QueryError> {
        debug!(
            "executing query via '{}' with {} bound values",
            self.command,
            params.len()
        );

        let mut child = Command::new(&self.command)
            .args(params)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| QueryError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| QueryError::Malformed("query command has no stdin".to_string()))?;
        stdin.write_all(statement.as_bytes()).await?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| QueryError::Malformed("query command has no stdout".to_string()))?;
        let mut lines = LinesStream::new(tokio::io::AsyncBufReadExt::lines(BufReader::new(stdout)));

        let permalink = match lines.next().await {
            Some(line) => line?,
            None => return Err(QueryError::Malformed("missing permalink line".to_string())),
        };

        let mut body = String::new();
        while let Some(line) = lines.next().await {
            body.push_str(&line?);
            body.push('\n');
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(QueryError::Failed { status });
        }

        Ok(QueryOutput {
            permalink,
            rows: parse_rows(&body)?,
        })
    }
}

/// Parse a headered CSV body into rows. An empty body is an empty result.
fn parse_rows(body: &str) -> Result<Vec<Row>, QueryError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.to_string(), value.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}
