use crate::model::{AssetPair, AssetType, Entry, EntryError, Measure, Side, TransactionEntry};
use crate::util::{to_fixed, HasSplit};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{btree_map, BTreeMap};

/// Per-asset running amounts, ordered by asset for uniform report columns.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Balances(BTreeMap<AssetType, Decimal>);

impl Balances {
    /// Amount held of `asset`. Unknown assets hold nothing.
    pub fn get(&self, asset: &AssetType) -> Decimal {
        self.0.get(asset).copied().unwrap_or_default()
    }

    pub fn accumulate(&mut self, asset: &AssetType, amount: Decimal) {
        let balance = self.0.entry(asset.clone()).or_default();
        *balance = to_fixed(*balance + amount);
    }

    pub fn apply(&mut self, delta: &Balances) {
        for (asset, amount) in delta.iter() {
            self.accumulate(asset, *amount);
        }
    }

    pub fn revert(&mut self, delta: &Balances) {
        for (asset, amount) in delta.iter() {
            self.accumulate(asset, -*amount);
        }
    }

    /// Add every missing asset from `assets` with a zero amount.
    pub fn ensure_accounts<'a, I>(&mut self, assets: I)
    where
        I: IntoIterator<Item = &'a AssetType>,
    {
        for asset in assets {
            self.0.entry(asset.clone()).or_default();
        }
    }

    pub fn iter(&self) -> btree_map::Iter<'_, AssetType, Decimal> {
        self.0.iter()
    }

    pub fn assets(&self) -> btree_map::Keys<'_, AssetType, Decimal> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The balance change caused by one entry.
    ///
    /// The cost unit moves by the signed total. The asset moves by the size, unless both sides
    /// of the pair are the same asset or it trades at exactly one cost unit per asset. An entry
    /// of zero size never moves the asset, so its price is not consulted.
    pub fn delta_of<E: TransactionEntry>(entry: &E) -> Result<Self, EntryError> {
        let mut delta = Self::default();
        let pair = entry.pair();
        let size = entry.size();

        delta.accumulate(&pair.cost_unit, entry.total()?);

        if !pair.is_same_asset() && !size.is_zero() && entry.price()? != Decimal::ONE {
            let size = if entry.side().is_outflow() { -size } else { size };
            delta.accumulate(&pair.asset, size);
        }

        Ok(delta)
    }
}

impl<'a> IntoIterator for &'a Balances {
    type Item = (&'a AssetType, &'a Decimal);
    type IntoIter = btree_map::Iter<'a, AssetType, Decimal>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One link in the ledger chain: an entry and the balances right after it.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountLog {
    entry: Box<Entry>,
    balances: Balances,
    delta: Balances,
}

impl AccountLog {
    /// Chain `entry` onto `previous`, or onto empty balances for the first link.
    pub fn next(previous: Option<&AccountLog>, entry: Entry) -> Result<Self, EntryError> {
        let base = previous
            .map(|log| log.balances.clone())
            .unwrap_or_default();

        Self::chain(base, entry)
    }

    fn chain(mut balances: Balances, entry: Entry) -> Result<Self, EntryError> {
        let delta = Balances::delta_of(&entry)?;
        balances.apply(&delta);

        Ok(Self {
            entry: Box::new(entry),
            balances,
            delta,
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn into_entry(self) -> Entry {
        *self.entry
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    /// What this entry added to the previous balances.
    pub fn delta(&self) -> &Balances {
        &self.delta
    }

    pub fn previous_balances(&self) -> Balances {
        let mut previous = self.balances.clone();
        previous.revert(&self.delta);
        previous
    }

    pub fn ensure_accounts<'a, I>(&mut self, assets: I)
    where
        I: IntoIterator<Item = &'a AssetType>,
    {
        self.balances.ensure_accounts(assets);
    }
}

impl TransactionEntry for AccountLog {
    fn id(&self) -> &str {
        self.entry.id()
    }

    fn exchange(&self) -> &str {
        self.entry.exchange()
    }

    fn side(&self) -> Side {
        self.entry.side()
    }

    fn side_id(&self) -> &str {
        self.entry.side_id()
    }

    fn time(&self) -> DateTime<Utc> {
        self.entry.time()
    }

    fn pair(&self) -> &AssetPair {
        self.entry.pair()
    }

    fn size(&self) -> Decimal {
        self.entry.size()
    }

    fn price(&self) -> Result<Decimal, EntryError> {
        self.entry.price()
    }

    fn fee(&self) -> Result<Decimal, EntryError> {
        self.entry.fee()
    }

    fn total(&self) -> Result<Decimal, EntryError> {
        self.entry.total()
    }

    fn translated_total(&self, asset: &AssetType) -> Option<Decimal> {
        self.entry.translated_total(asset)
    }

    fn translated_fee(&self, asset: &AssetType) -> Option<Decimal> {
        self.entry.translated_fee(asset)
    }

    fn translated_assets(&self) -> Vec<AssetType> {
        self.entry.translated_assets()
    }

    /// The halves become two consecutive links replacing this one: the taken half first, then
    /// the rest. Their deltas add up to this link's delta.
    fn split_measured(&self, take: Decimal, by: Measure) -> Result<HasSplit<Self>, EntryError> {
        let halves = self.entry.split_measured(take, by)?;
        let take = Self::chain(self.previous_balances(), halves.take)?;
        let leave = Self::chain(take.balances.clone(), halves.leave)?;

        Ok(HasSplit { take, leave })
    }

    fn measure(&self, by: Measure) -> Result<Decimal, EntryError> {
        self.entry.measure(by)
    }
}
