use crate::model::{AssetType, PriceSource, SCOPE_ALL};
use crate::resolver::{parse_expressions, Expression, ExpressionError};
use chrono::TimeDelta;
use ron::de::SpannedError;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

/// Used when no positive grouping window is configured.
pub const DEFAULT_GROUP_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Unable to deserialize")]
    Deserialize(#[from] SpannedError),

    #[error("Invalid resolver expression")]
    Expression(#[from] ExpressionError),
}

/// Settings for one batch run, read from a RON file.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RunConfig {
    /// Assets every transaction is translated into.
    pub tracked_assets: Vec<AssetType>,

    /// Resolver expressions, one per line, e.g. `USDT = USD -> ofx:EUR`.
    #[serde(default)]
    pub resolvers: Vec<String>,

    #[serde(default = "default_group_window_minutes")]
    pub group_window_minutes: i64,

    #[serde(default)]
    pub price_source: PriceSource,

    /// Exchanges whose ids carry a sequence number for ordering same-time entries.
    #[serde(default)]
    pub numbered_exchanges: Vec<String>,

    /// Exchange the ledger follows, or `all`.
    #[serde(default = "default_ledger_exchange")]
    pub ledger_exchange: String,

    /// Extra scopes every loaded candle is visible to.
    #[serde(default = "default_candle_scopes")]
    pub candle_scopes: Vec<String>,
}

fn default_group_window_minutes() -> i64 {
    DEFAULT_GROUP_WINDOW_MINUTES
}

fn default_ledger_exchange() -> String {
    SCOPE_ALL.to_string()
}

fn default_candle_scopes() -> Vec<String> {
    vec![SCOPE_ALL.to_string()]
}

impl RunConfig {
    pub fn from_path<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let data = fs::read_to_string(path)?;

        Self::from_ron(&data)
    }

    pub fn from_ron(data: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(data)?)
    }

    /// The grouping window, falling back to the default when not positive.
    pub fn group_window(&self) -> TimeDelta {
        let minutes = if self.group_window_minutes > 0 {
            self.group_window_minutes
        } else {
            DEFAULT_GROUP_WINDOW_MINUTES
        };

        TimeDelta::minutes(minutes)
    }

    pub fn expressions(&self) -> Result<Vec<Expression>, ConfigError> {
        Ok(parse_expressions(&self.resolvers.join("\n"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_minimal_config_uses_defaults() {
        let config = RunConfig::from_ron(r#"(tracked_assets: ["SEK", "ZEUR"])"#).unwrap();

        assert_eq!(config.tracked_assets, [AssetType::new("SEK"), AssetType::new("EUR")]);
        assert_eq!(config.group_window(), TimeDelta::minutes(5));
        assert_eq!(config.price_source, PriceSource::Mid);
        assert_eq!(config.ledger_exchange, "all");
        assert_eq!(config.candle_scopes, ["all"]);
        assert!(config.expressions().unwrap().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_full_config() {
        let config = RunConfig::from_ron(
            r#"(
                tracked_assets: ["SEK"],
                resolvers: [
                    "USDT = btx,all:USD -> ofx,all:EUR",
                    "EUR = ofx:SEK",
                ],
                group_window_minutes: -1,
                price_source: Close,
                numbered_exchanges: ["cbx"],
                ledger_exchange: "cbx",
                candle_scopes: [],
            )"#,
        )
        .unwrap();

        assert_eq!(config.group_window(), TimeDelta::minutes(5));
        assert_eq!(config.price_source, PriceSource::Close);
        assert_eq!(config.expressions().unwrap().len(), 2);
        assert!(config.candle_scopes.is_empty());
    }

    #[test]
    #[traced_test]
    fn test_bad_expression() {
        let config =
            RunConfig::from_ron(r#"(tracked_assets: [], resolvers: ["USDT -> USD"])"#).unwrap();

        assert!(matches!(
            config.expressions().unwrap_err(),
            ConfigError::Expression(_),
        ));
    }
}
