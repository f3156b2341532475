use crate::model::{AssetPair, AssetType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{ffi::OsStr, fs, path::Path};
use thiserror::Error;
use tracing::{debug, warn};

/// The scope every exchange may fall back to.
pub const SCOPE_ALL: &str = "all";

#[derive(Debug, Error)]
pub enum CandleDbError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("CSV error in {0:?}")]
    Csv(String, #[source] csv::Error),
}

/// One open/high/low/close sample for an asset pair.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Candle {
    pub id: String,
    /// Bucket width in minutes.
    pub resolution: u32,
    pub exchange: String,
    pub time: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(rename = "asset volume", with = "rust_decimal::serde::str")]
    pub asset_volume: Decimal,
    #[serde(rename = "cost-unit volume", with = "rust_decimal::serde::str")]
    pub cost_unit_volume: Decimal,
    pub asset: AssetType,
    #[serde(rename = "costunit")]
    pub cost_unit: AssetType,
}

impl Candle {
    pub fn pair(&self) -> AssetPair {
        AssetPair {
            asset: self.asset.clone(),
            cost_unit: self.cost_unit.clone(),
        }
    }
}

/// Which candle value converts one unit of asset into its cost unit.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PriceSource {
    /// Midpoint of the low and high.
    #[default]
    Mid,
    Open,
    High,
    Low,
    Close,
}

impl PriceSource {
    pub fn price(self, candle: &Candle) -> Decimal {
        match self {
            Self::Mid => (candle.low + candle.high) / Decimal::TWO,
            Self::Open => candle.open,
            Self::High => candle.high,
            Self::Low => candle.low,
            Self::Close => candle.close,
        }
    }
}

/// Time-ascending candles per scope and asset pair.
#[derive(Debug, Default)]
pub struct CandleCache {
    scopes: HashMap<String, HashMap<AssetPair, Vec<Candle>>>,
}

impl CandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// File each candle under its own exchange and under every scope in `also_visible_to`.
    pub fn add<I>(&mut self, candles: I, also_visible_to: &[&str])
    where
        I: IntoIterator<Item = Candle>,
    {
        for candle in candles {
            let pair = candle.pair();
            let scopes = std::iter::once(candle.exchange.as_str())
                .chain(also_visible_to.iter().copied())
                .map(str::to_string)
                .collect::<Vec<_>>();

            for scope in scopes {
                let bucket = self
                    .scopes
                    .entry(scope)
                    .or_default()
                    .entry(pair.clone())
                    .or_default();
                let index = bucket.partition_point(|c| c.time <= candle.time);
                bucket.insert(index, candle.clone());
            }
        }
    }

    /// Find the latest candle at or before `at`, trying `scopes` in order.
    ///
    /// No scopes means [`SCOPE_ALL`]. Returns the candle and the scope it was found in.
    pub fn get<S>(
        &self,
        pair: &AssetPair,
        at: DateTime<Utc>,
        scopes: &[S],
    ) -> Option<(&Candle, &str)>
    where
        S: AsRef<str>,
    {
        let fallback: &[&str] = if scopes.is_empty() { &[SCOPE_ALL] } else { &[] };

        scopes
            .iter()
            .map(AsRef::as_ref)
            .chain(fallback.iter().copied())
            .find_map(|scope| {
                let (scope, pairs) = self.scopes.get_key_value(scope)?;
                let candle = Self::find(pairs.get(pair)?, at)?;

                Some((candle, scope.as_str()))
            })
    }

    fn find(bucket: &[Candle], at: DateTime<Utc>) -> Option<&Candle> {
        match bucket.partition_point(|candle| candle.time <= at) {
            0 => None,
            index => bucket.get(index - 1),
        }
    }

    /// Scopes known to the cache.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scopes
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
    }

    /// Load every `*.csv` candle file in a directory.
    ///
    /// Files are named `<exchange>_<Asset-CostUnit>_<start>_<end>.csv`, rows need not be sorted.
    pub fn load_dir<P>(&mut self, path: P, also_visible_to: &[&str]) -> Result<(), CandleDbError>
    where
        P: AsRef<Path>,
    {
        let mut files = 0;

        for entry in fs::read_dir(path.as_ref())? {
            let path = entry?.path();

            if !path.is_file() || path.extension() != Some(OsStr::new("csv")) {
                continue;
            }

            let name = path.display().to_string();
            let mut reader = csv::ReaderBuilder::new()
                .comment(Some(b'#'))
                .from_path(&path)
                .map_err(|err| CandleDbError::Csv(name.clone(), err))?;
            let candles = reader
                .deserialize()
                .collect::<Result<Vec<Candle>, _>>()
                .map_err(|err| CandleDbError::Csv(name.clone(), err))?;

            debug!("Loaded {} candles from {name}", candles.len());
            self.add(candles, also_visible_to);
            files += 1;
        }

        if files == 0 {
            warn!("No candle files found in {:?}", path.as_ref());
        }

        Ok(())
    }

    /// Write one CSV file per asset pair for each of `scopes`, or for every scope when empty.
    pub fn store_dir<P>(&self, path: P, scopes: &[&str]) -> Result<(), CandleDbError>
    where
        P: AsRef<Path>,
    {
        for (scope, pairs) in &self.scopes {
            if !scopes.is_empty() && !scopes.contains(&scope.as_str()) {
                continue;
            }

            for (pair, bucket) in pairs {
                let (Some(first), Some(last)) = (bucket.first(), bucket.last()) else {
                    continue;
                };
                let name = format!(
                    "{scope}_{pair}_{}_{}.csv",
                    first.time.format("%Y-%m-%d"),
                    last.time.format("%Y-%m-%d"),
                );

                let mut writer = csv::Writer::from_path(path.as_ref().join(&name))
                    .map_err(|err| CandleDbError::Csv(name.clone(), err))?;
                for candle in bucket {
                    writer
                        .serialize(candle)
                        .map_err(|err| CandleDbError::Csv(name.clone(), err))?;
                }
                writer.flush()?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn candle(exchange: &str, pair: &str, time: &str, low: &str, high: &str) -> Candle {
    let pair: AssetPair = pair.parse().unwrap();
    let low: Decimal = low.parse().unwrap();
    let high: Decimal = high.parse().unwrap();

    Candle {
        id: format!("{exchange}-{pair}-{time}"),
        resolution: 1440,
        exchange: exchange.to_string(),
        time: time.parse().unwrap(),
        open: low,
        high,
        low,
        close: high,
        asset_volume: Decimal::ONE,
        cost_unit_volume: Decimal::ONE,
        asset: pair.asset,
        cost_unit: pair.cost_unit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;
    use tracing_test::traced_test;

    fn cache() -> CandleCache {
        let mut cache = CandleCache::new();
        cache.add(
            [
                candle("kraken", "BTC-EUR", "2022-01-03 00:00:00+0000", "300", "310"),
                candle("kraken", "BTC-EUR", "2022-01-01 00:00:00+0000", "100", "110"),
                candle("kraken", "BTC-EUR", "2022-01-02 00:00:00+0000", "200", "210"),
            ],
            &[SCOPE_ALL],
        );
        cache
    }

    #[test]
    #[traced_test]
    fn test_lookup_latest_at_or_before() {
        let cache = cache();
        let pair = AssetPair::new("BTC", "EUR");

        let at = "2022-01-02 12:00:00+0000".parse().unwrap();
        let (found, scope) = cache.get(&pair, at, &["kraken"]).unwrap();
        assert_eq!(found.low, "200".parse().unwrap());
        assert_eq!(scope, "kraken");

        let exact = "2022-01-03 00:00:00+0000".parse().unwrap();
        assert_eq!(cache.get(&pair, exact, &["kraken"]).unwrap().0.low, "300".parse().unwrap());

        let after = "2022-02-01 00:00:00+0000".parse().unwrap();
        assert_eq!(cache.get(&pair, after, &["kraken"]).unwrap().0.low, "300".parse().unwrap());

        let before = "2021-12-31 00:00:00+0000".parse().unwrap();
        assert!(cache.get(&pair, before, &["kraken"]).is_none());
    }

    #[test]
    #[traced_test]
    fn test_lookup_scope_preference() {
        let cache = cache();
        let pair = AssetPair::new("BTC", "EUR");
        let at = "2022-01-02 12:00:00+0000".parse().unwrap();

        assert_eq!(cache.get(&pair, at, &["bitstamp", "all"]).unwrap().1, "all");
        assert_eq!(cache.get::<&str>(&pair, at, &[]).unwrap().1, "all");
        assert!(cache.get(&pair, at, &["bitstamp"]).is_none());
        assert!(cache
            .get(&AssetPair::new("ETH", "EUR"), at, &["kraken"])
            .is_none());
        assert_eq!(cache.len(), 6);
    }

    #[test]
    #[traced_test]
    fn test_price_sources() {
        let sample = candle("kraken", "BTC-EUR", "2022-01-01 00:00:00+0000", "100", "110");

        assert_eq!(PriceSource::Mid.price(&sample), "105".parse().unwrap());
        assert_eq!(PriceSource::Low.price(&sample), "100".parse().unwrap());
        assert_eq!(PriceSource::Close.price(&sample), "110".parse().unwrap());
    }

    #[test]
    #[traced_test]
    fn test_store_and_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache();
        cache.store_dir(dir.path(), &["kraken"]).unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["kraken_BTC-EUR_2022-01-01_2022-01-03.csv"]);

        let mut loaded = CandleCache::new();
        loaded.load_dir(dir.path(), &[]).unwrap();
        assert_eq!(loaded.len(), 3);

        let pair = AssetPair::new("BTC", "EUR");
        let at = "2022-01-02 00:00:00+0000".parse().unwrap();
        assert_eq!(
            loaded.get(&pair, at, &["kraken"]).unwrap().0,
            cache.get(&pair, at, &["kraken"]).unwrap().0,
        );
    }
}
