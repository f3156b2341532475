use super::Processor;
use crate::model::{AssetPair, TransactionEntry};
use std::collections::HashMap;
use std::convert::Infallible;

/// The number an id ends in, e.g. `1042` for `T-1042`.
fn sequence(id: &str) -> Option<u64> {
    let prefix = id.trim_end_matches(|c: char| c.is_ascii_digit());

    id[prefix.len()..].parse().ok()
}

/// Sort `entries` by timestamp, keeping input order for ties.
///
/// Within a run of equal timestamps, entries of the same exchange and pair are ordered by the
/// number their id ends in when `is_numbered` accepts the exchange. Entries without such a
/// number keep their place.
pub fn chronological<E, F>(entries: &mut Vec<E>, is_numbered: F)
where
    E: TransactionEntry,
    F: Fn(&str) -> bool,
{
    entries.sort_by_key(|entry| entry.time());

    let mut order: Vec<usize> = (0..entries.len()).collect();
    let mut start = 0;

    while start < entries.len() {
        let time = entries[start].time();
        let end = start
            + entries[start..]
                .iter()
                .take_while(|entry| entry.time() == time)
                .count();

        let mut classes: HashMap<(&str, &AssetPair), Vec<usize>> = HashMap::new();
        for (index, entry) in entries.iter().enumerate().take(end).skip(start) {
            if is_numbered(entry.exchange()) && sequence(entry.id()).is_some() {
                classes
                    .entry((entry.exchange(), entry.pair()))
                    .or_default()
                    .push(index);
            }
        }

        for slots in classes.into_values().filter(|slots| slots.len() > 1) {
            let mut sorted = slots.clone();
            sorted.sort_by_key(|&index| sequence(entries[index].id()));

            for (slot, index) in slots.into_iter().zip(sorted) {
                order[slot] = index;
            }
        }

        start = end;
    }

    let mut slots: Vec<Option<E>> = entries.drain(..).map(Some).collect();
    entries.extend(order.into_iter().filter_map(|index| slots[index].take()));
}

/// Collects entries and hands them back in [`chronological`] order.
#[derive(Debug)]
pub struct Chronological<E> {
    numbered_exchanges: Vec<String>,
    entries: Vec<E>,
}

impl<E> Chronological<E> {
    pub fn new(numbered_exchanges: Vec<String>) -> Self {
        Self {
            numbered_exchanges,
            entries: Vec::new(),
        }
    }
}

impl<E: TransactionEntry> Processor for Chronological<E> {
    type Input = E;
    type Output = Vec<E>;
    type Error = Infallible;

    fn process(&mut self, input: E) -> Result<(), Infallible> {
        self.entries.push(input);

        Ok(())
    }

    fn flush(&mut self) -> Vec<E> {
        let mut entries = std::mem::take(&mut self.entries);
        let numbered = &self.numbered_exchanges;
        chronological(&mut entries, |exchange| {
            numbered.iter().any(|name| name == exchange)
        });

        entries
    }

    fn reset(&mut self) {
        self.entries.clear();
    }
}
