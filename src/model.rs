pub use self::{account::*, asset::*, config::*, entry::*, exchange_rate::*, group::*, pairs::*};
pub use self::stats::*;

mod account;
mod asset;
mod config;
mod entry;
pub(crate) mod exchange_rate;
mod group;
mod pairs;
mod stats;
