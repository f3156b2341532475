//! Normalized transaction CSV import.
//!
//! Columns: `id,exchange,side,sideid,created,size,price,fee,total,asset,costunit`. Lines starting
//! with `#` are comments. `created` is RFC 3339 or `YYYY-MM-DD HH:MM:SS` in UTC.

use crate::model::{AssetPair, AssetType, SideError, Stats, Transaction};
use crate::util::fifo::FIFO;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV Error")]
    Csv(#[from] csv::Error),

    #[error("Row `{0}`: DateTime parsing error")]
    DateTime(String, #[source] chrono::ParseError),

    #[error("Row `{0}`: invalid side")]
    Side(String, #[source] SideError),

    #[error("Row `{0}`: invalid `{1}` amount")]
    Amount(String, &'static str, #[source] rust_decimal::Error),
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct TransactionCSVRow {
    pub(crate) id: String,
    pub(crate) exchange: String,
    pub(crate) side: String,
    pub(crate) sideid: String,
    pub(crate) created: String,
    pub(crate) size: String,
    pub(crate) price: String,
    pub(crate) fee: String,
    pub(crate) total: String,
    pub(crate) asset: String,
    pub(crate) costunit: String,
}

fn parse_time(id: &str, created: &str) -> Result<DateTime<Utc>, ImportError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(created) {
        return Ok(time.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(created, "%F %T")
        .map(|time| time.and_utc())
        .map_err(|err| ImportError::DateTime(id.to_string(), err))
}

fn parse_amount(id: &str, field: &'static str, value: &str) -> Result<Decimal, ImportError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Decimal::ZERO);
    }

    value
        .parse()
        .map_err(|err| ImportError::Amount(id.to_string(), field, err))
}

impl TryFrom<TransactionCSVRow> for Transaction {
    type Error = ImportError;

    fn try_from(row: TransactionCSVRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let side = row
            .side
            .parse()
            .map_err(|err| ImportError::Side(id.clone(), err))?;

        Ok(Self {
            side,
            side_id: row.sideid,
            time: parse_time(&id, &row.created)?,
            size: parse_amount(&id, "size", &row.size)?,
            price: parse_amount(&id, "price", &row.price)?,
            fee: parse_amount(&id, "fee", &row.fee)?,
            total: parse_amount(&id, "total", &row.total)?,
            translated_total: BTreeMap::new(),
            translated_fee: BTreeMap::new(),
            pair: AssetPair {
                asset: AssetType::new(&row.asset),
                cost_unit: AssetType::new(&row.costunit),
            },
            exchange: row.exchange,
            id,
        })
    }
}

/// Read every transaction row of a normalized CSV file, in file order.
pub fn read_transactions(
    s: &mut Stats,
    path: impl AsRef<Path>,
) -> Result<FIFO<Transaction>, ImportError> {
    let reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)?;

    read_from(s, reader)
}

fn read_from<R: std::io::Read>(
    s: &mut Stats,
    mut reader: csv::Reader<R>,
) -> Result<FIFO<Transaction>, ImportError> {
    let mut rows = FIFO::new();

    debug!("Parsing transaction rows");
    for result in reader.deserialize() {
        let record: TransactionCSVRow = result?;
        debug!("Deserialized: {record:?}");

        let tx = Transaction::try_from(record)?;
        rows.enqueue(tx);
        s.inc_transactions();
    }

    Ok(rows)
}
