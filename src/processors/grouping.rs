use super::{chronological, Processor};
use crate::model::{AssetPair, Entry, Group, Side, TransactionEntry, DEFAULT_GROUP_WINDOW_MINUTES};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::{debug, trace};

/// Entries sharing a key may coalesce into one group.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GroupKey {
    pub exchange: String,
    pub pair: AssetPair,
    pub side: Side,
}

impl GroupKey {
    pub fn of<E: TransactionEntry>(entry: &E) -> Self {
        Self {
            exchange: entry.exchange().to_string(),
            pair: entry.pair().clone(),
            side: entry.side(),
        }
    }
}

#[derive(Debug)]
struct OpenGroup {
    seq: u64,
    /// End of the window, exclusive.
    until: DateTime<Utc>,
    group: Group,
}

/// Coalesces bursts of same exchange, pair and side entries within a time window.
///
/// Input must arrive in chronological order. Closed groups are returned by
/// [`Processor::flush`] in chronological order.
#[derive(Debug)]
pub struct GroupingEngine {
    window: TimeDelta,
    open: HashMap<GroupKey, OpenGroup>,
    closed: Vec<Group>,
    next_seq: u64,
}

impl GroupingEngine {
    /// A window that is not positive falls back to the default.
    pub fn new(window: TimeDelta) -> Self {
        let window = if window > TimeDelta::zero() {
            window
        } else {
            TimeDelta::minutes(DEFAULT_GROUP_WINDOW_MINUTES)
        };

        Self {
            window,
            open: HashMap::new(),
            closed: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Number of groups still accepting entries.
    pub fn open_groups(&self) -> usize {
        self.open.len()
    }

    fn open_group(&mut self, key: GroupKey, entry: Entry) {
        self.next_seq += 1;
        let seq = self.next_seq;

        debug!("Open group {seq} for {} {} {}", key.exchange, key.pair, key.side);
        self.open.insert(
            key,
            OpenGroup {
                seq,
                until: entry.time() + self.window,
                group: Group::new(seq, entry),
            },
        );
    }

    /// Close the groups under `keys` in the order they were opened.
    fn close(&mut self, keys: Vec<GroupKey>) {
        let mut groups: Vec<_> = keys
            .into_iter()
            .filter_map(|key| self.open.remove(&key))
            .collect();
        groups.sort_by_key(|open| open.seq);

        for open in groups {
            debug!("Close group {} with {} entries", open.seq, open.group.len());
            self.closed.push(open.group);
        }
    }

    /// Open groups trading a crypto asset on either side of `pair`.
    fn collisions(&self, pair: &AssetPair) -> Vec<GroupKey> {
        self.open
            .keys()
            .filter(|key| {
                pair.crypto()
                    .any(|asset| key.pair.asset == *asset || key.pair.cost_unit == *asset)
            })
            .cloned()
            .collect()
    }

    /// Other open groups moving the same asset on the same exchange.
    fn same_asset(&self, key: &GroupKey) -> Vec<GroupKey> {
        self.open
            .keys()
            .filter(|other| {
                *other != key
                    && other.exchange == key.exchange
                    && other.pair.asset == key.pair.asset
            })
            .cloned()
            .collect()
    }
}

impl Processor for GroupingEngine {
    type Input = Entry;
    type Output = Vec<Group>;
    type Error = Infallible;

    fn process(&mut self, input: Entry) -> Result<(), Infallible> {
        let key = GroupKey::of(&input);
        trace!("Grouping {} at {}", input.id(), input.time());

        match self.open.get(&key).map(|open| input.time() < open.until) {
            Some(true) => {
                if let Some(open) = self.open.get_mut(&key) {
                    open.group.push(input);
                }
            }
            Some(false) => {
                self.close(vec![key.clone()]);
                self.open_group(key, input);
            }
            None => {
                let collisions = self.collisions(&key.pair);

                if !collisions.is_empty() {
                    self.close(collisions);
                    self.open_group(key, input);
                } else if matches!(key.side, Side::Receive | Side::Transfer) {
                    let others = self.same_asset(&key);
                    self.open_group(key, input);
                    self.close(others);
                } else {
                    self.open_group(key, input);
                }
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Vec<Group> {
        let keys = self.open.keys().cloned().collect();
        self.close(keys);

        let mut groups = std::mem::take(&mut self.closed);
        chronological(&mut groups, |_| true);

        groups
    }

    fn reset(&mut self) {
        self.open.clear();
        self.closed.clear();
        self.next_seq = 0;
    }
}
