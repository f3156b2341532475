use crate::model::{AccountLog, AssetPair, AssetType, BuyGroup, BuySell, Group};
use crate::util::{to_fixed, HasSplit};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Buy group `{0}` spans more than one asset and has no aggregate price, fee or total")]
    MultiAssetAggregate(String),

    #[error("Sell `{0}` cannot be paired without any buy lots")]
    EmptyBuyGroup(String),

    #[error("Lot `{id}` is a {side}, only buys and sells can be paired")]
    UnexpectedLotSide { id: String, side: Side },

    #[error("Cannot split {take} off `{id}` which measures {measure}")]
    SplitOutOfRange {
        id: String,
        take: Decimal,
        measure: Decimal,
    },

    #[error("Division by zero while aggregating `{0}`")]
    ZeroDenominator(String),
}

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum SideError {
    #[error("Unknown transaction side `{0}`")]
    Unknown(String),
}

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
    Receive,
    Transfer,
    /// A sell paired with the lots that covered it.
    BuySell,
}

impl Side {
    /// Sides that take the traded asset out of the account.
    pub fn is_outflow(self) -> bool {
        matches!(self, Self::Sell | Self::Transfer | Self::BuySell)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Receive => "RECEIVE",
            Self::Transfer => "TRANSFER",
            Self::BuySell => "BUYSELL",
        })
    }
}

impl FromStr for Side {
    type Err = SideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "RECEIVE" | "DEPOSIT" => Ok(Self::Receive),
            "TRANSFER" | "WITHDRAWAL" => Ok(Self::Transfer),
            "BUYSELL" => Ok(Self::BuySell),
            _ => Err(SideError::Unknown(s.to_string())),
        }
    }
}

/// Which quantity a split or a drain is expressed in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Measure {
    /// The traded asset size.
    Size,

    /// The quantity a tax lot holds. Buys hold their asset size. Sells that received crypto as
    /// proceeds hold their total price, denominated in that crypto.
    Lot,
}

/// The capability set shared by every kind of entry.
///
/// `price`, `fee` and `total` are fallible because aggregates over mixed lots have no meaningful
/// value for them.
pub trait TransactionEntry: Clone {
    fn id(&self) -> &str;
    fn exchange(&self) -> &str;
    fn side(&self) -> Side;
    fn side_id(&self) -> &str;
    fn time(&self) -> DateTime<Utc>;
    fn pair(&self) -> &AssetPair;
    fn size(&self) -> Decimal;
    fn price(&self) -> Result<Decimal, EntryError>;
    fn fee(&self) -> Result<Decimal, EntryError>;
    fn total(&self) -> Result<Decimal, EntryError>;

    /// Total price re-expressed in `asset`, if it has been translated.
    fn translated_total(&self, asset: &AssetType) -> Option<Decimal>;
    fn translated_fee(&self, asset: &AssetType) -> Option<Decimal>;
    fn translated_assets(&self) -> Vec<AssetType>;

    /// Split `take` off this entry, measured in `by`. Requires `0 < take < self.measure(by)`.
    fn split_measured(&self, take: Decimal, by: Measure) -> Result<HasSplit<Self>, EntryError>;

    fn split_size(&self, size: Decimal) -> Result<HasSplit<Self>, EntryError> {
        self.split_measured(size, Measure::Size)
    }

    fn measure(&self, by: Measure) -> Result<Decimal, EntryError> {
        match (by, self.side()) {
            (Measure::Lot, Side::Sell) => self.total(),
            _ => Ok(self.size()),
        }
    }
}

/// A single normalized transaction as delivered by an exchange import.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub exchange: String,
    pub side: Side,
    /// Exchange-specific order or side identifier.
    pub side_id: String,
    pub time: DateTime<Utc>,
    pub size: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    /// Negative when paying for a buy.
    pub total: Decimal,
    pub translated_total: BTreeMap<AssetType, Decimal>,
    pub translated_fee: BTreeMap<AssetType, Decimal>,
    pub pair: AssetPair,
}

/// Split `value` by `ratio`. The taken half is `anchor` when given, so the measured field comes
/// out exact.
fn split_value(value: Decimal, ratio: Decimal, anchor: Option<Decimal>) -> (Decimal, Decimal) {
    let take = to_fixed(anchor.unwrap_or(value * ratio));

    (take, to_fixed(value - take))
}

fn split_map(
    map: &BTreeMap<AssetType, Decimal>,
    ratio: Decimal,
) -> (BTreeMap<AssetType, Decimal>, BTreeMap<AssetType, Decimal>) {
    map.iter()
        .map(|(asset, value)| {
            let (take, leave) = split_value(*value, ratio, None);
            ((asset.clone(), take), (asset.clone(), leave))
        })
        .unzip()
}

impl TransactionEntry for Transaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn exchange(&self) -> &str {
        &self.exchange
    }

    fn side(&self) -> Side {
        self.side
    }

    fn side_id(&self) -> &str {
        &self.side_id
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn pair(&self) -> &AssetPair {
        &self.pair
    }

    fn size(&self) -> Decimal {
        self.size
    }

    fn price(&self) -> Result<Decimal, EntryError> {
        Ok(self.price)
    }

    fn fee(&self) -> Result<Decimal, EntryError> {
        Ok(self.fee)
    }

    fn total(&self) -> Result<Decimal, EntryError> {
        Ok(self.total)
    }

    fn translated_total(&self, asset: &AssetType) -> Option<Decimal> {
        self.translated_total.get(asset).copied()
    }

    fn translated_fee(&self, asset: &AssetType) -> Option<Decimal> {
        self.translated_fee.get(asset).copied()
    }

    fn translated_assets(&self) -> Vec<AssetType> {
        self.translated_total.keys().cloned().collect()
    }

    fn split_measured(&self, take: Decimal, by: Measure) -> Result<HasSplit<Self>, EntryError> {
        let measure = self.measure(by)?;
        if take <= Decimal::ZERO || take >= measure {
            return Err(EntryError::SplitOutOfRange {
                id: self.id.clone(),
                take,
                measure,
            });
        }

        let by_total = by == Measure::Lot && self.side == Side::Sell;
        let ratio = take / measure;

        let (size_take, size_leave) =
            split_value(self.size, ratio, (!by_total).then_some(take));
        let (total_take, total_leave) = split_value(self.total, ratio, by_total.then_some(take));
        let (fee_take, fee_leave) = split_value(self.fee, ratio, None);
        let (tt_take, tt_leave) = split_map(&self.translated_total, ratio);
        let (tf_take, tf_leave) = split_map(&self.translated_fee, ratio);

        Ok(HasSplit {
            take: Self {
                size: size_take,
                fee: fee_take,
                total: total_take,
                translated_total: tt_take,
                translated_fee: tf_take,
                ..self.clone()
            },
            leave: Self {
                size: size_leave,
                fee: fee_leave,
                total: total_leave,
                translated_total: tt_leave,
                translated_fee: tf_leave,
                ..self.clone()
            },
        })
    }
}

/// Every kind of entry that flows through the processors.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    Plain(Transaction),
    Group(Group),
    BuyGroup(BuyGroup),
    BuySell(BuySell),
    Ledger(AccountLog),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            Entry::Plain($inner) => $body,
            Entry::Group($inner) => $body,
            Entry::BuyGroup($inner) => $body,
            Entry::BuySell($inner) => $body,
            Entry::Ledger($inner) => $body,
        }
    };
}

macro_rules! impl_from_variant {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Entry {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_variant!(
    Plain(Transaction),
    Group(Group),
    BuyGroup(BuyGroup),
    BuySell(BuySell),
    Ledger(AccountLog),
);

impl TransactionEntry for Entry {
    fn id(&self) -> &str {
        dispatch!(self, e => e.id())
    }

    fn exchange(&self) -> &str {
        dispatch!(self, e => e.exchange())
    }

    fn side(&self) -> Side {
        dispatch!(self, e => e.side())
    }

    fn side_id(&self) -> &str {
        dispatch!(self, e => e.side_id())
    }

    fn time(&self) -> DateTime<Utc> {
        dispatch!(self, e => e.time())
    }

    fn pair(&self) -> &AssetPair {
        dispatch!(self, e => e.pair())
    }

    fn size(&self) -> Decimal {
        dispatch!(self, e => e.size())
    }

    fn price(&self) -> Result<Decimal, EntryError> {
        dispatch!(self, e => e.price())
    }

    fn fee(&self) -> Result<Decimal, EntryError> {
        dispatch!(self, e => e.fee())
    }

    fn total(&self) -> Result<Decimal, EntryError> {
        dispatch!(self, e => e.total())
    }

    fn translated_total(&self, asset: &AssetType) -> Option<Decimal> {
        dispatch!(self, e => e.translated_total(asset))
    }

    fn translated_fee(&self, asset: &AssetType) -> Option<Decimal> {
        dispatch!(self, e => e.translated_fee(asset))
    }

    fn translated_assets(&self) -> Vec<AssetType> {
        dispatch!(self, e => e.translated_assets())
    }

    fn split_measured(&self, take: Decimal, by: Measure) -> Result<HasSplit<Self>, EntryError> {
        dispatch!(self, e => Ok(e.split_measured(take, by)?.map(Entry::from)))
    }

    fn measure(&self, by: Measure) -> Result<Decimal, EntryError> {
        dispatch!(self, e => e.measure(by))
    }
}

#[cfg(test)]
use arbtest::arbitrary::{Result as ArbResult, Unstructured};

#[cfg(test)]
impl Transaction {
    /// A fee-less transaction on the `test` exchange. Buys pay a negative total.
    pub(crate) fn fixture(
        id: &str,
        side: Side,
        time: &str,
        pair: &str,
        size: &str,
        price: &str,
    ) -> Self {
        let size: Decimal = size.parse().unwrap();
        let price: Decimal = price.parse().unwrap();
        let total = match side {
            Side::Buy => -(size * price),
            _ => size * price,
        };

        Self {
            id: id.to_string(),
            exchange: "test".to_string(),
            side,
            side_id: format!("{id}-order"),
            time: time.parse().unwrap(),
            size,
            price,
            fee: Decimal::ZERO,
            total,
            translated_total: BTreeMap::new(),
            translated_fee: BTreeMap::new(),
            pair: pair.parse().unwrap(),
        }
    }

    /// Random amounts at satoshi precision, translated into `USD`.
    pub(crate) fn arbitrary(
        u: &mut Unstructured<'_>,
        id: &str,
        side: Side,
        pair: &str,
    ) -> ArbResult<Self> {
        let size = Decimal::new(u.int_in_range(1..=10_000_000_000_i64)?, 8);
        let price = Decimal::new(u.int_in_range(1..=10_000_000_i64)?, 2);
        let fee = Decimal::new(u.int_in_range(0..=100_000_i64)?, 4);
        let translated = Decimal::new(u.int_in_range(-10_000_000_i64..=10_000_000)?, 3);
        let total = to_fixed(size * price);

        let mut tx = Self::fixture(id, side, "2022-01-01 13:42:00+0000", pair, "1", "1");
        tx.size = size;
        tx.price = price;
        tx.fee = fee;
        tx.total = if side == Side::Buy { -total } else { total };
        tx.translated_total.insert("USD".into(), translated);
        tx.translated_fee.insert("USD".into(), fee);

        Ok(tx)
    }

    pub(crate) fn on(mut self, exchange: &str) -> Self {
        self.exchange = exchange.to_string();
        self
    }

    pub(crate) fn with_fee(mut self, fee: &str) -> Self {
        self.fee = fee.parse().unwrap();
        self
    }

    pub(crate) fn with_translation(mut self, asset: &str, total: &str, fee: &str) -> Self {
        self.translated_total
            .insert(asset.into(), total.parse().unwrap());
        self.translated_fee.insert(asset.into(), fee.parse().unwrap());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::arbitrary_split;
    use arbtest::arbtest;
    use tracing_test::traced_test;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    #[traced_test]
    fn test_parse_side() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!(" SELL ".parse::<Side>().unwrap(), Side::Sell);
        assert_eq!(
            "margin".parse::<Side>().unwrap_err(),
            SideError::Unknown("margin".to_string()),
        );
    }

    #[test]
    #[traced_test]
    fn test_split_plain_by_size() {
        let tx = Transaction::fixture(
            "1",
            Side::Buy,
            "2022-01-01 13:42:00+0000",
            "BTC-EUR",
            "1.0",
            "100",
        )
        .with_fee("0.3")
        .with_translation("SEK", "-1000", "3");

        let HasSplit { take, leave } = tx.split_size(dec("0.4")).unwrap();

        assert_eq!(take.size, dec("0.4"));
        assert_eq!(leave.size, dec("0.6"));
        assert_eq!(take.total, dec("-40"));
        assert_eq!(leave.total, dec("-60"));
        assert_eq!(take.fee, dec("0.12"));
        assert_eq!(leave.fee, dec("0.18"));
        assert_eq!(take.price, tx.price);
        assert_eq!(take.translated_total(&"SEK".into()), Some(dec("-400")));
        assert_eq!(leave.translated_fee(&"SEK".into()), Some(dec("1.8")));
        assert_eq!(take.id, leave.id);
    }

    #[test]
    #[traced_test]
    fn test_split_sell_lot_anchors_total() {
        let tx = Transaction::fixture(
            "1",
            Side::Sell,
            "2022-01-01 13:42:00+0000",
            "LTC-BTC",
            "3",
            "0.01",
        );

        let HasSplit { take, leave } = tx.split_measured(dec("0.01"), Measure::Lot).unwrap();

        assert_eq!(take.total, dec("0.01"));
        assert_eq!(leave.total, dec("0.02"));
        assert_eq!(take.size, dec("1"));
        assert_eq!(leave.size, dec("2"));
    }

    #[test]
    #[traced_test]
    fn test_split_out_of_range() {
        let tx = Transaction::fixture(
            "7",
            Side::Buy,
            "2022-01-01 13:42:00+0000",
            "BTC-EUR",
            "1.0",
            "100",
        );

        for take in ["0", "-1", "1.0", "2"] {
            assert_eq!(
                tx.split_size(dec(take)).unwrap_err(),
                EntryError::SplitOutOfRange {
                    id: "7".to_string(),
                    take: dec(take),
                    measure: dec("1.0"),
                },
            );
        }
    }

    #[test]
    #[traced_test]
    fn prop_test_split_preserves_sums() {
        arbtest(|u| {
            let (side, by) = *u.choose(&[
                (Side::Buy, Measure::Size),
                (Side::Buy, Measure::Lot),
                (Side::Sell, Measure::Size),
                (Side::Sell, Measure::Lot),
            ])?;
            let tx = Transaction::arbitrary(u, "p", side, "ETH-BTC")?;
            let Some(take) = arbitrary_split(u, tx.measure(by).unwrap())? else {
                return Ok(());
            };

            let HasSplit { take: sized, leave } = tx.split_measured(take, by).unwrap();
            let usd = AssetType::new("USD");

            assert_eq!(sized.measure(by).unwrap(), take);
            assert_eq!(sized.size + leave.size, tx.size);
            assert_eq!(sized.fee + leave.fee, tx.fee);
            assert_eq!(sized.total + leave.total, tx.total);
            assert_eq!(
                sized.translated_total(&usd).unwrap() + leave.translated_total(&usd).unwrap(),
                tx.translated_total(&usd).unwrap(),
            );
            assert_eq!(
                sized.translated_fee(&usd).unwrap() + leave.translated_fee(&usd).unwrap(),
                tx.fee,
            );

            Ok(())
        });
    }

    #[test]
    #[traced_test]
    fn test_entry_dispatch_wraps_split_halves() {
        let entry = Entry::from(Transaction::fixture(
            "1",
            Side::Buy,
            "2022-01-01 13:42:00+0000",
            "BTC-EUR",
            "1.0",
            "100",
        ));

        let HasSplit { take, leave } = entry.split_size(dec("0.25")).unwrap();

        assert!(matches!(take, Entry::Plain(_)));
        assert!(matches!(leave, Entry::Plain(_)));
        assert_eq!(take.size() + leave.size(), entry.size());
        assert_eq!(entry.measure(Measure::Lot).unwrap(), dec("1.0"));
    }
}
