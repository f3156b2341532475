use serde::{Deserialize, Serialize};
use std::{convert::Infallible, fmt, str::FromStr};

/// Government-issued currencies. Everything else is treated as crypto.
const FIAT: [&str; 6] = ["EUR", "SEK", "USD", "CHF", "JPY", "GBP"];

/// A ticker symbol, normalized to its colloquial name (`BTC`, not `XXBT`).
///
/// The set of assets is open. Unknown tickers are kept verbatim (upper-cased) and classified as
/// crypto.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct AssetType(String);

impl AssetType {
    pub fn new(ticker: &str) -> Self {
        let ticker = ticker.trim().to_ascii_uppercase();
        let normalized = match ticker.as_str() {
            "XXBT" | "XBT" => "BTC",
            "XETH" => "ETH",
            "XLTC" => "LTC",
            "XXRP" => "XRP",
            "XXLM" => "XLM",
            "ZEUR" => "EUR",
            "ZUSD" => "USD",
            "ZSEK" => "SEK",
            "ZJPY" => "JPY",
            "ZGBP" => "GBP",
            _ => return Self(ticker),
        };

        Self(normalized.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_fiat(&self) -> bool {
        FIAT.contains(&self.as_str())
    }

    pub fn is_tether(&self) -> bool {
        self.0 == "USDT"
    }

    /// The exchange-specific (ISO-ish) ticker some venues use for this asset.
    pub fn to_iso(&self) -> &str {
        match self.as_str() {
            "BTC" => "XBT",
            "ETH" => "XETH",
            "LTC" => "XLTC",
            "XRP" => "XXRP",
            "XLM" => "XXLM",
            other => other,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AssetType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for AssetType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssetType {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<AssetType> for String {
    fn from(value: AssetType) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_exchange_aliases_normalize() {
        assert_eq!(AssetType::new("XXBT"), AssetType::new("BTC"));
        assert_eq!(AssetType::new("xbt"), AssetType::new("BTC"));
        assert_eq!(AssetType::new("ZEUR").as_str(), "EUR");
        assert_eq!(AssetType::new(" usdt ").as_str(), "USDT");
        assert_eq!(AssetType::new("SALT").as_str(), "SALT");
    }

    #[test]
    #[traced_test]
    fn test_classification() {
        assert!(AssetType::new("ZSEK").is_fiat());
        assert!(AssetType::new("USD").is_fiat());
        assert!(!AssetType::new("USDT").is_fiat());
        assert!(AssetType::new("USDT").is_tether());
        assert!(!AssetType::new("BTC").is_fiat());
    }

    #[test]
    #[traced_test]
    fn test_iso_round_trip() {
        for ticker in ["BTC", "ETH", "LTC", "XRP", "XLM", "EUR", "DASH"] {
            let asset = AssetType::new(ticker);
            assert_eq!(AssetType::new(asset.to_iso()), asset);
        }
    }
}
