use crate::model::AssetType;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum AssetPairError {
    #[error("Malformed asset pair `{0}`, expected `Asset-CostUnit`")]
    Malformed(String),
}

/// What was traded for what: `asset` priced in `cost_unit`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct AssetPair {
    pub asset: AssetType,
    pub cost_unit: AssetType,
}

impl AssetPair {
    pub fn new(asset: impl Into<AssetType>, cost_unit: impl Into<AssetType>) -> Self {
        Self {
            asset: asset.into(),
            cost_unit: cost_unit.into(),
        }
    }

    /// Both sides name the same asset, e.g. a deposit recorded as `LTC-LTC`.
    pub fn is_same_asset(&self) -> bool {
        self.asset == self.cost_unit
    }

    /// The crypto assets on either side of the pair.
    pub fn crypto(&self) -> impl Iterator<Item = &AssetType> {
        [&self.asset, &self.cost_unit]
            .into_iter()
            .filter(|asset| !asset.is_fiat())
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.asset, self.cost_unit)
    }
}

impl FromStr for AssetPair {
    type Err = AssetPairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');

        match (parts.next(), parts.next(), parts.next()) {
            (Some(asset), Some(cost_unit), None)
                if !asset.trim().is_empty() && !cost_unit.trim().is_empty() =>
            {
                Ok(Self::new(asset, cost_unit))
            }
            _ => Err(AssetPairError::Malformed(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_parse_asset_pair() {
        let pair: AssetPair = "XXBT-ZEUR".parse().unwrap();

        assert_eq!(pair, AssetPair::new("BTC", "EUR"));
        assert_eq!(pair.to_string(), "BTC-EUR");
    }

    #[test]
    #[traced_test]
    fn test_parse_asset_pair_malformed() {
        for input in ["BTC", "BTC-EUR-USD", "-EUR", "BTC-", ""] {
            assert_eq!(
                input.parse::<AssetPair>().unwrap_err(),
                AssetPairError::Malformed(input.to_string()),
            );
        }
    }

    #[test]
    #[traced_test]
    fn test_crypto_sides() {
        let pair = AssetPair::new("LTC", "BTC");
        assert_eq!(pair.crypto().count(), 2);

        let pair = AssetPair::new("BTC", "EUR");
        assert_eq!(pair.crypto().collect::<Vec<_>>(), [&AssetType::new("BTC")]);
    }
}
