use crate::model::{AssetType, Entry, TransactionEntry};
use crate::util::fifo::{Drain, FIFO};
use std::collections::BTreeMap;
use tracing::debug;

/// One lot queue per asset.
///
/// Iteration and draining visit assets in ticker order so unpaired output is stable.
#[derive(Debug, Default)]
pub struct LotQueues {
    queues: BTreeMap<AssetType, FIFO<Entry>>,
}

impl LotQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lot to the back of the queue for `asset`.
    pub fn enqueue(&mut self, asset: &AssetType, lot: Entry) {
        debug!("Push {} onto {asset}", lot.id());
        self.queues.entry(asset.clone()).or_default().enqueue(lot);
    }

    /// Return a partially consumed lot to the front of the queue for `asset`.
    pub fn put_back(&mut self, asset: &AssetType, lot: Entry) {
        debug!("Put back {} onto {asset}", lot.id());
        self.queues.entry(asset.clone()).or_default().put_back(lot);
    }

    /// Return dequeued lots to the front of the queue for `asset`, keeping their order.
    pub fn restore(&mut self, asset: &AssetType, lots: Vec<Entry>) {
        for lot in lots.into_iter().rev() {
            self.put_back(asset, lot);
        }
    }

    pub fn dequeue(&mut self, asset: &AssetType) -> Option<Entry> {
        self.queues.get_mut(asset)?.dequeue()
    }

    /// See [`FIFO::dequeue_until`]. An unknown asset behaves like an empty queue.
    pub fn dequeue_until<F>(&mut self, asset: &AssetType, accept: F) -> (Vec<Entry>, Drain)
    where
        F: FnMut(&Entry) -> Drain,
    {
        match self.queues.get_mut(asset) {
            Some(queue) => queue.dequeue_until(accept),
            None => (Vec::new(), Drain::Done),
        }
    }

    pub fn len(&self, asset: &AssetType) -> usize {
        self.queues.get(asset).map_or(0, FIFO::len)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(FIFO::is_empty)
    }

    /// Remove every queued lot, ordered by asset and then queue position.
    pub fn drain_all(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.queues)
            .into_values()
            .flatten()
            .collect()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }
}
