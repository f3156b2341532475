//! Every error type the crate can return.

pub use crate::basis::MatchError;
pub use crate::imports::ImportError;
pub use crate::model::{AssetPairError, CandleDbError, ConfigError, EntryError, SideError};
pub use crate::processors::TranslateError;
pub use crate::resolver::{ExpressionError, ResolveError, ResolverError};
