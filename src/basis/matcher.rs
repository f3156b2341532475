use super::LotQueues;
use crate::model::{AssetType, BuySell, Entry, EntryError, Measure, Side, TransactionEntry};
use crate::processors::Processor;
use crate::util::{fifo::Drain, to_fixed, HasSplit};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Not enough {asset} lots to cover {requested}, missing {missing}")]
    FifoUnderflow {
        asset: AssetType,
        requested: Decimal,
        missing: Decimal,
    },

    #[error("Entry error")]
    Entry(#[from] EntryError),
}

/// Output of one matching run.
#[derive(Debug, Default)]
pub struct Matched {
    pub pairs: Vec<BuySell>,
    /// Lots never consumed by a sell, ordered by asset and then acquisition.
    pub unpaired: Vec<Entry>,
}

/// Pairs sells with the oldest lots that cover them.
///
/// Buys become lots of the asset bought. Sells paid in crypto become lots of that crypto,
/// measured in their total price, and a buy paid in crypto consumes lots of its cost unit.
#[derive(Debug, Default)]
pub struct TaxLotMatcher {
    queues: LotQueues,
    pairs: Vec<BuySell>,
}

impl TaxLotMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queues(&self) -> &LotQueues {
        &self.queues
    }

    fn process_buy(&mut self, buy: Entry) -> Result<(), MatchError> {
        let pair = buy.pair().clone();
        let id = buy.id().to_string();
        let paid = -buy.total()?;

        self.queues.enqueue(&pair.asset, buy);

        if pair.cost_unit.is_fiat() {
            return Ok(());
        }

        let lots = self.drain(&pair.cost_unit, paid)?;
        if lots.is_empty() {
            warn!("No {} lots to pay for buy {id}", pair.cost_unit);
        }

        Ok(())
    }

    fn process_sell(&mut self, sell: Entry) -> Result<(), MatchError> {
        let pair = sell.pair().clone();

        if !pair.cost_unit.is_fiat() {
            self.queues.enqueue(&pair.cost_unit, sell.clone());
        }

        let lots = self.drain(&pair.asset, sell.size())?;
        let matched = BuySell::new(sell, lots)?;
        debug!("Matched {} with {} lots", matched.id(), matched.buys().lots().len());
        self.pairs.push(matched);

        Ok(())
    }

    /// Consume `requested` worth of lots of `asset`, splitting the last one if it holds more.
    fn drain(&mut self, asset: &AssetType, requested: Decimal) -> Result<Vec<Entry>, MatchError> {
        let requested = to_fixed(requested);
        if requested <= Decimal::ZERO {
            warn!("Ignoring drain of {requested} {asset}");
            return Ok(Vec::new());
        }

        let mut remaining = requested;
        let mut failure = None;

        let (mut lots, drain) = self.queues.dequeue_until(asset, |lot| {
            match lot.measure(Measure::Lot) {
                Ok(amount) => {
                    remaining = to_fixed(remaining - amount);

                    match remaining.cmp(&Decimal::ZERO) {
                        Ordering::Greater => Drain::Continue,
                        Ordering::Equal => Drain::Done,
                        Ordering::Less => Drain::Overflow,
                    }
                }
                Err(err) => {
                    failure = Some(err);
                    Drain::Done
                }
            }
        });

        if let Some(err) = failure {
            self.queues.restore(asset, lots);
            return Err(err.into());
        }

        match drain {
            Drain::Underflow => Err(MatchError::FifoUnderflow {
                asset: asset.clone(),
                requested,
                missing: remaining,
            }),
            Drain::Overflow => {
                if let Some(last) = lots.pop() {
                    let keep = to_fixed(last.measure(Measure::Lot)? + remaining);
                    let HasSplit { take, leave } = last.split_measured(keep, Measure::Lot)?;
                    trace!("Split {} keeping {keep} {asset}", take.id());

                    self.queues.put_back(asset, leave);
                    lots.push(take);
                }

                Ok(lots)
            }
            Drain::Done | Drain::Continue => Ok(lots),
        }
    }
}

impl Processor for TaxLotMatcher {
    type Input = Entry;
    type Output = Matched;
    type Error = MatchError;

    /// Only buys and sells take part in matching.
    fn process(&mut self, input: Entry) -> Result<(), MatchError> {
        match input.side() {
            Side::Buy => self.process_buy(input),
            Side::Sell => self.process_sell(input),
            side => {
                trace!("Skipping {side} {}", input.id());
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> Matched {
        Matched {
            pairs: std::mem::take(&mut self.pairs),
            unpaired: self.queues.drain_all(),
        }
    }

    fn reset(&mut self) {
        self.queues.clear();
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Group, Transaction};
    use chrono::{DateTime, Utc};
    use similar_asserts::assert_eq;
    use tracing_test::traced_test;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn tx(id: &str, side: Side, time: &str, pair: &str, size: &str, price: &str) -> Entry {
        Transaction::fixture(id, side, time, pair, size, price).into()
    }

    #[test]
    #[traced_test]
    fn test_partial_sell_leaves_remainder_queued() {
        let mut matcher = TaxLotMatcher::new();
        matcher
            .process_many([
                tx("buy", Side::Buy, "2022-01-01 10:00:00+0000", "Z-EUR", "1.0", "100"),
                tx("sell", Side::Sell, "2022-01-02 10:00:00+0000", "Z-EUR", "0.4", "150"),
            ])
            .unwrap();

        let Matched { pairs, unpaired } = matcher.flush();

        assert_eq!(pairs.len(), 1);
        let buys = pairs[0].buys();
        assert_eq!(buys.lots().len(), 1);
        assert_eq!(buys.size(), dec("0.4"));
        assert_eq!(buys.total().unwrap(), dec("-40"));
        assert_eq!(pairs[0].id(), "buy-buysell");
        let first_lot: DateTime<Utc> = "2022-01-01 10:00:00+0000".parse().unwrap();
        assert_eq!(pairs[0].time(), first_lot);
        assert_eq!(pairs[0].total().unwrap(), dec("60"));

        assert_eq!(unpaired.len(), 1);
        assert_eq!(unpaired[0].size(), dec("0.6"));
        assert_eq!(unpaired[0].id(), "buy");
    }

    #[test]
    #[traced_test]
    fn test_sell_across_lots_exactly() {
        let mut matcher = TaxLotMatcher::new();
        matcher
            .process_many([
                tx("1", Side::Buy, "2022-01-01 10:00:00+0000", "BTC-EUR", "0.3", "100"),
                tx("2", Side::Buy, "2022-01-01 11:00:00+0000", "BTC-EUR", "0.2", "200"),
                tx("3", Side::Sell, "2022-01-02 10:00:00+0000", "BTC-EUR", "0.5", "300"),
            ])
            .unwrap();

        let Matched { pairs, unpaired } = matcher.flush();

        assert!(unpaired.is_empty());
        let lots: Vec<_> = pairs[0].buys().lots().iter().map(|lot| lot.id()).collect();
        assert_eq!(lots, vec!["1", "2"]);
        assert_eq!(pairs[0].buys().price().unwrap(), dec("140"));
    }

    #[test]
    #[traced_test]
    fn test_crypto_chain() {
        let mut matcher = TaxLotMatcher::new();
        matcher
            .process_many([
                tx("btc", Side::Buy, "2022-01-01 10:00:00+0000", "BTC-EUR", "1", "100"),
                tx("ltc", Side::Buy, "2022-01-02 10:00:00+0000", "LTC-BTC", "10", "0.05"),
                tx("swap", Side::Sell, "2022-01-03 10:00:00+0000", "LTC-BTC", "4", "0.06"),
                tx("cash", Side::Sell, "2022-01-04 10:00:00+0000", "BTC-EUR", "0.6", "200"),
            ])
            .unwrap();

        let Matched { pairs, unpaired } = matcher.flush();
        assert_eq!(pairs.len(), 2);

        // The LTC sell is covered by the LTC bought with BTC.
        let swap = pairs[0].buys();
        assert_eq!(swap.lots().len(), 1);
        assert_eq!(swap.lots()[0].id(), "ltc");
        assert_eq!(swap.size(), dec("4"));

        // The BTC sell consumes what is left of the BTC buy, then the BTC proceeds of the swap.
        let cash = pairs[1].buys();
        let lots: Vec<_> = cash.lots().iter().map(|lot| lot.id()).collect();
        assert_eq!(lots, vec!["btc", "swap"]);
        assert_eq!(cash.lots()[0].size(), dec("0.5"));
        assert_eq!(cash.lots()[1].total().unwrap(), dec("0.1"));
        assert_eq!(cash.size(), dec("0.6"));
        assert!(!cash.is_multi_asset());

        let left: Vec<_> = unpaired
            .iter()
            .map(|lot| (lot.id().to_string(), lot.measure(Measure::Lot).unwrap()))
            .collect();
        assert_eq!(
            left,
            vec![
                ("swap".to_string(), dec("0.14")),
                ("ltc".to_string(), dec("6")),
            ],
        );
    }

    #[test]
    #[traced_test]
    fn test_underflow() {
        let mut matcher = TaxLotMatcher::new();
        matcher
            .process(tx("1", Side::Buy, "2022-01-01 10:00:00+0000", "BTC-EUR", "0.3", "100"))
            .unwrap();

        let err = matcher
            .process(tx("2", Side::Sell, "2022-01-02 10:00:00+0000", "BTC-EUR", "0.5", "100"))
            .unwrap_err();

        assert_eq!(
            err,
            MatchError::FifoUnderflow {
                asset: "BTC".into(),
                requested: dec("0.5"),
                missing: dec("0.2"),
            },
        );
    }

    #[test]
    #[traced_test]
    fn test_sell_without_lots() {
        let mut matcher = TaxLotMatcher::new();

        let err = matcher
            .process(tx("s", Side::Sell, "2022-01-02 10:00:00+0000", "BTC-EUR", "0.5", "100"))
            .unwrap_err();

        assert_eq!(err, MatchError::Entry(EntryError::EmptyBuyGroup("s".to_string())));
    }

    #[test]
    #[traced_test]
    fn test_crypto_buy_without_cost_unit_lots() {
        let mut matcher = TaxLotMatcher::new();
        matcher
            .process(tx("ltc", Side::Buy, "2022-01-02 10:00:00+0000", "LTC-BTC", "10", "0.05"))
            .unwrap();

        assert!(logs_contain("No BTC lots to pay for buy ltc"));
        assert_eq!(matcher.queues().len(&"LTC".into()), 1);
    }

    #[test]
    #[traced_test]
    fn test_groups_and_other_sides() {
        let mut buys = Group::new(
            1,
            tx("a", Side::Buy, "2022-01-01 10:00:00+0000", "ETH-EUR", "1", "10"),
        );
        buys.push(tx("b", Side::Buy, "2022-01-01 10:01:00+0000", "ETH-EUR", "2", "13"));

        let mut matcher = TaxLotMatcher::new();
        matcher
            .process_many([
                buys.into(),
                tx("r", Side::Receive, "2022-01-01 11:00:00+0000", "ETH-ETH", "5", "1"),
                tx("s", Side::Sell, "2022-01-02 10:00:00+0000", "ETH-EUR", "2", "20"),
            ])
            .unwrap();

        let Matched { pairs, unpaired } = matcher.flush();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].buys().size(), dec("2"));
        assert_eq!(unpaired.len(), 1);
        assert_eq!(unpaired[0].size(), dec("1"));

        matcher
            .process(tx("x", Side::Buy, "2022-01-03 10:00:00+0000", "ETH-EUR", "1", "10"))
            .unwrap();
        matcher.reset();
        assert!(matcher.queues().is_empty());
    }
}
