use super::Processor;
use crate::model::{AssetType, PriceSource, Transaction, SCOPE_ALL};
use crate::resolver::{ResolveError, Resolver};
use crate::util::to_fixed;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::trace;

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Cannot translate `{id}` from {from} into {to}")]
    UnresolvedRate {
        id: String,
        from: AssetType,
        to: AssetType,
        source: ResolveError,
    },
}

/// Annotates transactions with their total and fee in every tracked asset.
#[derive(Debug)]
pub struct CostUnitTranslator<'a> {
    resolver: &'a Resolver,
    tracked: Vec<AssetType>,
    price_source: PriceSource,
    translated: Vec<Transaction>,
}

impl<'a> CostUnitTranslator<'a> {
    pub fn new(resolver: &'a Resolver, price_source: PriceSource) -> Self {
        Self {
            resolver,
            tracked: Vec::new(),
            price_source,
            translated: Vec::new(),
        }
    }

    pub fn track<I>(&mut self, assets: I)
    where
        I: IntoIterator<Item = AssetType>,
    {
        self.tracked.extend(assets);
    }

    /// Fill in the translated total and fee of `tx` for every tracked asset.
    pub fn translate(&self, tx: &mut Transaction) -> Result<(), TranslateError> {
        for target in &self.tracked {
            let (total, fee) = if tx.pair.cost_unit == *target {
                (tx.total, tx.fee)
            } else {
                let rate = self.rate(tx, target)?;
                (to_fixed(tx.total * rate), to_fixed(tx.fee * rate))
            };

            trace!("{} total {} is {total} {target}", tx.id, tx.total);
            tx.translated_total.insert(target.clone(), total);
            tx.translated_fee.insert(target.clone(), fee);
        }

        Ok(())
    }

    /// Product of the hop prices converting one cost unit of `tx` into `target`.
    fn rate(&self, tx: &Transaction, target: &AssetType) -> Result<Decimal, TranslateError> {
        let scopes = [tx.exchange.as_str(), SCOPE_ALL];
        let path = self
            .resolver
            .resolve_to_target(tx.time, &tx.pair.cost_unit, target, &scopes)
            .map_err(|source| TranslateError::UnresolvedRate {
                id: tx.id.clone(),
                from: tx.pair.cost_unit.clone(),
                to: target.clone(),
                source,
            })?;

        Ok(path
            .iter()
            .map(|hop| self.price_source.price(hop.candle))
            .product())
    }
}

impl Processor for CostUnitTranslator<'_> {
    type Input = Transaction;
    type Output = Vec<Transaction>;
    type Error = TranslateError;

    fn process(&mut self, mut input: Transaction) -> Result<(), TranslateError> {
        self.translate(&mut input)?;
        self.translated.push(input);

        Ok(())
    }

    fn flush(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.translated)
    }

    fn reset(&mut self) {
        self.translated.clear();
    }
}
