use super::Processor;
use crate::model::{AccountLog, AssetType, Entry, EntryError, TransactionEntry, SCOPE_ALL};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Keeps a running ledger for one exchange, or for all of them.
#[derive(Debug)]
pub struct AccountingProcessor {
    exchange: String,
    logs: Vec<AccountLog>,
}

impl AccountingProcessor {
    /// An empty `exchange` follows every exchange, same as `all`.
    pub fn new(exchange: &str) -> Self {
        let exchange = if exchange.is_empty() {
            SCOPE_ALL
        } else {
            exchange
        };

        Self {
            exchange: exchange.to_string(),
            logs: Vec::new(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    fn accepts(&self, entry: &Entry) -> bool {
        self.exchange == SCOPE_ALL || entry.exchange() == self.exchange
    }
}

impl Processor for AccountingProcessor {
    type Input = Entry;
    type Output = Vec<AccountLog>;
    type Error = EntryError;

    fn process(&mut self, input: Entry) -> Result<(), EntryError> {
        if !self.accepts(&input) {
            return Ok(());
        }

        let log = AccountLog::next(self.logs.last(), input)?;
        trace!("{} ledger after {}: {:?}", self.exchange, log.id(), log.balances());
        self.logs.push(log);

        Ok(())
    }

    /// Every snapshot is zero-filled to the same set of assets.
    fn flush(&mut self) -> Vec<AccountLog> {
        let mut logs = std::mem::take(&mut self.logs);
        let assets: BTreeSet<AssetType> = logs
            .iter()
            .flat_map(|log| log.balances().assets().cloned())
            .collect();

        for log in &mut logs {
            log.ensure_accounts(&assets);
        }

        logs
    }

    fn reset(&mut self) {
        self.logs.clear();
    }
}

/// One ledger across all exchanges plus one per exchange.
#[derive(Debug, Default)]
pub struct MultiExchangeAccounting {
    ledgers: BTreeMap<String, AccountingProcessor>,
}

impl MultiExchangeAccounting {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for MultiExchangeAccounting {
    type Input = Entry;
    type Output = BTreeMap<String, Vec<AccountLog>>;
    type Error = EntryError;

    fn process(&mut self, input: Entry) -> Result<(), EntryError> {
        if input.exchange() != SCOPE_ALL {
            self.ledgers
                .entry(input.exchange().to_string())
                .or_insert_with_key(|exchange| AccountingProcessor::new(exchange))
                .process(input.clone())?;
        }

        self.ledgers
            .entry(SCOPE_ALL.to_string())
            .or_insert_with(|| AccountingProcessor::new(SCOPE_ALL))
            .process(input)
    }

    fn flush(&mut self) -> BTreeMap<String, Vec<AccountLog>> {
        let ledgers = std::mem::take(&mut self.ledgers);

        ledgers
            .into_iter()
            .map(|(exchange, mut ledger)| (exchange, ledger.flush()))
            .collect()
    }

    fn reset(&mut self) {
        self.ledgers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Side, Transaction};
    use rust_decimal::Decimal;
    use similar_asserts::assert_eq;
    use tracing_test::traced_test;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn history() -> Vec<Entry> {
        vec![
            Transaction::fixture(
                "1",
                Side::Buy,
                "2022-01-01 10:00:00+0000",
                "BTC-EUR",
                "1",
                "100",
            )
            .on("kraken")
            .into(),
            Transaction::fixture(
                "2",
                Side::Buy,
                "2022-01-01 11:00:00+0000",
                "ETH-SEK",
                "2",
                "50",
            )
            .on("cbx")
            .into(),
            Transaction::fixture(
                "3",
                Side::Sell,
                "2022-01-01 12:00:00+0000",
                "BTC-EUR",
                "0.5",
                "120",
            )
            .on("kraken")
            .into(),
        ]
    }

    #[test]
    #[traced_test]
    fn test_filters_exchange_and_fills_columns() {
        let mut ledger = AccountingProcessor::new("kraken");
        ledger.process_many(history()).unwrap();

        let logs = ledger.flush();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].balances().get(&"EUR".into()), dec("-40"));
        assert_eq!(logs[1].balances().get(&"BTC".into()), dec("0.5"));

        let mut everything = AccountingProcessor::new("");
        everything.process_many(history()).unwrap();

        let logs = everything.flush();
        assert_eq!(everything.exchange(), "all");
        assert_eq!(logs.len(), 3);
        for log in &logs {
            let assets: Vec<_> = log.balances().assets().map(AssetType::as_str).collect();
            assert_eq!(assets, vec!["BTC", "ETH", "EUR", "SEK"]);
        }
        assert_eq!(logs[0].balances().get(&"SEK".into()), Decimal::ZERO);
        assert_eq!(logs[2].balances().get(&"SEK".into()), dec("-100"));

        assert!(everything.flush().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_multi_exchange_ledgers() {
        let mut accounting = MultiExchangeAccounting::new();
        accounting.process_many(history()).unwrap();

        let ledgers = accounting.flush();
        let exchanges: Vec<_> = ledgers.keys().map(String::as_str).collect();
        assert_eq!(exchanges, vec!["all", "cbx", "kraken"]);
        assert_eq!(ledgers["all"].len(), 3);
        assert_eq!(ledgers["cbx"].len(), 1);
        assert_eq!(ledgers["kraken"].len(), 2);

        let cbx_assets: Vec<_> = ledgers["cbx"][0]
            .balances()
            .assets()
            .map(AssetType::as_str)
            .collect();
        assert_eq!(cbx_assets, vec!["ETH", "SEK"]);

        assert!(accounting.flush().is_empty());
    }
}
