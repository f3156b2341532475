use crate::model::{AssetPair, AssetType, Entry, EntryError, Measure, Side, TransactionEntry};
use crate::util::{to_fixed, HasSplit};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Several entries coalesced into one event.
///
/// Identity getters read the first member; amounts are sums, except the price which is weighted
/// by size. A group is never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    id: String,
    members: Vec<Entry>,
}

impl Group {
    pub fn new(id: impl ToString, first: Entry) -> Self {
        Self {
            id: id.to_string(),
            members: vec![first],
        }
    }

    pub fn push(&mut self, entry: Entry) {
        self.members.push(entry);
    }

    pub fn members(&self) -> &[Entry] {
        &self.members
    }

    pub fn into_members(self) -> Vec<Entry> {
        self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn head(&self) -> &Entry {
        &self.members[0]
    }

    /// The member with the largest size. The earliest wins ties.
    pub fn most_prominent(&self) -> &Entry {
        self.members.iter().fold(self.head(), |best, entry| {
            if entry.size() > best.size() {
                entry
            } else {
                best
            }
        })
    }
}

/// Weighted average of `(price, weight)` pairs.
fn weighted_price<I>(id: &str, total_weight: Decimal, parts: I) -> Result<Decimal, EntryError>
where
    I: IntoIterator<Item = Result<(Decimal, Decimal), EntryError>>,
{
    if total_weight.is_zero() {
        return Err(EntryError::ZeroDenominator(id.to_string()));
    }

    parts.into_iter().try_fold(Decimal::ZERO, |price, part| {
        let (unit_price, weight) = part?;
        Ok(to_fixed(price + unit_price * weight / total_weight))
    })
}

/// Split `take` off an ordered member list, measured in `by`.
///
/// Prefers a member measuring exactly `take`, then the smallest member larger than `take`, and
/// otherwise consumes members in order, splitting the one that crosses `take`.
fn split_members(
    members: &[Entry],
    take: Decimal,
    by: Measure,
) -> Result<HasSplit<Vec<Entry>>, EntryError> {
    let amounts = members
        .iter()
        .map(|member| member.measure(by))
        .collect::<Result<Vec<_>, _>>()?;

    let closest = amounts
        .iter()
        .enumerate()
        .filter(|(_, amount)| **amount >= take)
        .min_by_key(|(_, amount)| **amount)
        .map(|(index, _)| index);

    if let Some(index) = closest {
        let mut leave = members.to_vec();

        if amounts[index] == take {
            let found = leave.remove(index);
            return Ok(HasSplit {
                take: vec![found],
                leave,
            });
        }

        let halves = members[index].split_measured(take, by)?;
        leave[index] = halves.leave;

        return Ok(HasSplit {
            take: vec![halves.take],
            leave,
        });
    }

    let mut taken = Vec::new();
    let mut remaining = take;

    for (index, (member, amount)) in members.iter().zip(amounts).enumerate() {
        let rest = &members[index + 1..];

        if amount < remaining {
            taken.push(member.clone());
            remaining = to_fixed(remaining - amount);
        } else if amount == remaining {
            taken.push(member.clone());

            return Ok(HasSplit {
                take: taken,
                leave: rest.to_vec(),
            });
        } else {
            let halves = member.split_measured(remaining, by)?;
            taken.push(halves.take);

            let mut leave = vec![halves.leave];
            leave.extend_from_slice(rest);

            return Ok(HasSplit { take: taken, leave });
        }
    }

    Ok(HasSplit {
        take: taken,
        leave: Vec::new(),
    })
}

impl TransactionEntry for Group {
    fn id(&self) -> &str {
        &self.id
    }

    fn exchange(&self) -> &str {
        self.head().exchange()
    }

    fn side(&self) -> Side {
        self.head().side()
    }

    fn side_id(&self) -> &str {
        self.head().side_id()
    }

    fn time(&self) -> DateTime<Utc> {
        self.head().time()
    }

    fn pair(&self) -> &AssetPair {
        self.head().pair()
    }

    fn size(&self) -> Decimal {
        self.members.iter().map(Entry::size).sum()
    }

    fn price(&self) -> Result<Decimal, EntryError> {
        weighted_price(
            &self.id,
            self.size(),
            self.members
                .iter()
                .map(|member| Ok((member.price()?, member.size()))),
        )
    }

    fn fee(&self) -> Result<Decimal, EntryError> {
        self.members.iter().map(Entry::fee).sum()
    }

    fn total(&self) -> Result<Decimal, EntryError> {
        self.members.iter().map(Entry::total).sum()
    }

    fn translated_total(&self, asset: &AssetType) -> Option<Decimal> {
        self.members
            .iter()
            .map(|member| member.translated_total(asset))
            .sum()
    }

    fn translated_fee(&self, asset: &AssetType) -> Option<Decimal> {
        self.members
            .iter()
            .map(|member| member.translated_fee(asset))
            .sum()
    }

    fn translated_assets(&self) -> Vec<AssetType> {
        self.head().translated_assets()
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

        Ok(split_members(&self.members, take, by)?.map(|members| Self {
            id: self.id.clone(),
            members,
        }))
    }

    fn measure(&self, by: Measure) -> Result<Decimal, EntryError> {
        self.members.iter().map(|member| member.measure(by)).sum()
    }
}

/// The lots that covered one sell.
///
/// Sell lots in here are crypto proceeds that were later spent, so they act as buys of their
/// cost unit: they count with their total price as size.
#[derive(Clone, Debug, PartialEq)]
pub struct BuyGroup {
    id: String,
    lots: Vec<Entry>,
    amounts: Vec<Decimal>,
}

impl BuyGroup {
    /// `sell_id` names the sell being covered, for error reporting.
    pub(crate) fn new(sell_id: &str, lots: Vec<Entry>) -> Result<Self, EntryError> {
        let Some(first) = lots.first() else {
            return Err(EntryError::EmptyBuyGroup(sell_id.to_string()));
        };
        let id = format!("{}-buygroup", first.id());

        let amounts = lots
            .iter()
            .map(|lot| match lot.side() {
                Side::Buy | Side::Sell => lot.measure(Measure::Lot),
                side => Err(EntryError::UnexpectedLotSide {
                    id: lot.id().to_string(),
                    side,
                }),
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { id, lots, amounts })
    }

    pub fn lots(&self) -> &[Entry] {
        &self.lots
    }

    fn head(&self) -> &Entry {
        &self.lots[0]
    }

    fn lot_asset(lot: &Entry) -> &AssetType {
        match lot.side() {
            Side::Sell => &lot.pair().cost_unit,
            _ => &lot.pair().asset,
        }
    }

    /// The lots disagree on which asset they hold.
    pub fn is_multi_asset(&self) -> bool {
        let asset = Self::lot_asset(self.head());

        self.lots.iter().any(|lot| Self::lot_asset(lot) != asset)
    }

    fn ensure_single_asset(&self) -> Result<(), EntryError> {
        if self.is_multi_asset() {
            Err(EntryError::MultiAssetAggregate(self.id.clone()))
        } else {
            Ok(())
        }
    }

    /// The lot holding the most, by lot measure.
    pub fn most_prominent(&self) -> &Entry {
        self.lots
            .iter()
            .zip(&self.amounts)
            .fold((self.head(), Decimal::MIN), |(best, max), (lot, amount)| {
                if *amount > max {
                    (lot, *amount)
                } else {
                    (best, max)
                }
            })
            .0
    }

    fn lots_with_amounts(&self) -> impl Iterator<Item = (&Entry, Decimal)> {
        self.lots.iter().zip(self.amounts.iter().copied())
    }
}

impl TransactionEntry for BuyGroup {
    fn id(&self) -> &str {
        &self.id
    }

    fn exchange(&self) -> &str {
        self.head().exchange()
    }

    fn side(&self) -> Side {
        self.head().side()
    }

    fn side_id(&self) -> &str {
        self.head().side_id()
    }

    fn time(&self) -> DateTime<Utc> {
        self.head().time()
    }

    fn pair(&self) -> &AssetPair {
        self.head().pair()
    }

    fn size(&self) -> Decimal {
        self.amounts.iter().sum()
    }

    fn price(&self) -> Result<Decimal, EntryError> {
        self.ensure_single_asset()?;

        weighted_price(
            &self.id,
            self.size(),
            self.lots_with_amounts().map(|(lot, amount)| {
                let unit_price = match lot.side() {
                    Side::Sell => lot
                        .size()
                        .checked_div(lot.total()? - lot.fee()?)
                        .ok_or_else(|| EntryError::ZeroDenominator(lot.id().to_string()))?,
                    _ => lot.price()?,
                };

                Ok((unit_price, amount))
            }),
        )
    }

    fn fee(&self) -> Result<Decimal, EntryError> {
        self.ensure_single_asset()?;

        self.lots
            .iter()
            .map(|lot| match lot.side() {
                Side::Sell => lot
                    .fee()?
                    .checked_div(lot.price()?)
                    .ok_or_else(|| EntryError::ZeroDenominator(lot.id().to_string())),
                _ => lot.fee(),
            })
            .sum()
    }

    fn total(&self) -> Result<Decimal, EntryError> {
        self.ensure_single_asset()?;

        self.lots
            .iter()
            .map(|lot| match lot.side() {
                Side::Sell => Ok(lot.size()),
                _ => lot.total(),
            })
            .sum()
    }

    /// Sell lots count negatively: their proceeds were spent acquiring the asset sold.
    fn translated_total(&self, asset: &AssetType) -> Option<Decimal> {
        self.lots
            .iter()
            .map(|lot| {
                let value = lot.translated_total(asset)?;
                Some(if lot.side() == Side::Sell { -value } else { value })
            })
            .sum()
    }

    fn translated_fee(&self, asset: &AssetType) -> Option<Decimal> {
        self.lots.iter().map(|lot| lot.translated_fee(asset)).sum()
    }

    fn translated_assets(&self) -> Vec<AssetType> {
        self.head().translated_assets()
    }

    fn split_measured(&self, take: Decimal, _by: Measure) -> Result<HasSplit<Self>, EntryError> {
        let measure = self.size();
        if take <= Decimal::ZERO || take >= measure {
            return Err(EntryError::SplitOutOfRange {
                id: self.id.clone(),
                take,
                measure,
            });
        }

        let HasSplit { take, leave } = split_members(&self.lots, take, Measure::Lot)?;
        let rebuild = |lots| {
            Self::new(&self.id, lots).map(|group| Self {
                id: self.id.clone(),
                ..group
            })
        };

        Ok(HasSplit {
            take: rebuild(take)?,
            leave: rebuild(leave)?,
        })
    }

    /// Already expressed in lot measure.
    fn measure(&self, _by: Measure) -> Result<Decimal, EntryError> {
        Ok(self.size())
    }
}

/// A sell paired with the lots that covered it.
///
/// Amounts and translations mirror the sell. The timestamp is that of the first covering lot.
#[derive(Clone, Debug, PartialEq)]
pub struct BuySell {
    id: String,
    sell: Box<Entry>,
    buys: BuyGroup,
}

impl BuySell {
    pub fn new(sell: Entry, lots: Vec<Entry>) -> Result<Self, EntryError> {
        let buys = BuyGroup::new(sell.id(), lots)?;
        let id = format!("{}-buysell", buys.head().id());

        Ok(Self {
            id,
            sell: Box::new(sell),
            buys,
        })
    }

    pub fn sell(&self) -> &Entry {
        &self.sell
    }

    pub fn buys(&self) -> &BuyGroup {
        &self.buys
    }
}

impl TransactionEntry for BuySell {
    fn id(&self) -> &str {
        &self.id
    }

    fn exchange(&self) -> &str {
        self.sell.exchange()
    }

    fn side(&self) -> Side {
        Side::BuySell
    }

    fn side_id(&self) -> &str {
        self.sell.side_id()
    }

    fn time(&self) -> DateTime<Utc> {
        self.buys.time()
    }

    fn pair(&self) -> &AssetPair {
        self.sell.pair()
    }

    fn size(&self) -> Decimal {
        self.sell.size()
    }

    fn price(&self) -> Result<Decimal, EntryError> {
        self.sell.price()
    }

    fn fee(&self) -> Result<Decimal, EntryError> {
        self.sell.fee()
    }

    fn total(&self) -> Result<Decimal, EntryError> {
        self.sell.total()
    }

    fn translated_total(&self, asset: &AssetType) -> Option<Decimal> {
        self.sell.translated_total(asset)
    }

    fn translated_fee(&self, asset: &AssetType) -> Option<Decimal> {
        self.sell.translated_fee(asset)
    }

    fn translated_assets(&self) -> Vec<AssetType> {
        self.sell.translated_assets()
    }

    /// Splits the sell by size and the covering lots by the same ratio.
    fn split_measured(&self, take: Decimal, _by: Measure) -> Result<HasSplit<Self>, EntryError> {
        let sells = self.sell.split_size(take)?;
        let ratio = take / self.sell.size();
        let buys = self.buys.split_size(to_fixed(self.buys.size() * ratio))?;

        Ok(HasSplit {
            take: Self {
                id: self.id.clone(),
                sell: Box::new(sells.take),
                buys: buys.take,
            },
            leave: Self {
                id: self.id.clone(),
                sell: Box::new(sells.leave),
                buys: buys.leave,
            },
        })
    }
}
