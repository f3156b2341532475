//! Tax-lot matching: per-asset lot queues and the FIFO matcher that drains them.

pub use self::lookup::LotQueues;
pub use self::matcher::{MatchError, Matched, TaxLotMatcher};

mod lookup;
mod matcher;
