//! Multi-hop exchange rate resolution over a [`CandleCache`].
//!
//! Expressions are registered per scope and source asset. Resolving an asset walks the hops of
//! its expression, looking up one candle per hop, and when the hops run out before the caller
//! accepts the path, continues with the expression registered for the last hop's cost unit.

use crate::model::{AssetPair, AssetType, Candle, CandleCache};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, trace};

pub use self::expression::{parse_expressions, Expression, ExpressionError, Hop};

mod expression;

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("A translation for {asset} is already registered in scope `{scope}`")]
    DuplicateTranslation { scope: String, asset: AssetType },
}

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No translation registered for {asset} in scopes {scopes:?}")]
    NoTranslation { asset: AssetType, scopes: Vec<String> },

    #[error("No {pair} candle at or before {at} in scopes {scopes:?}")]
    MissingCandle {
        pair: AssetPair,
        at: DateTime<Utc>,
        scopes: Vec<String>,
    },

    #[error("Translation path for {0} was rejected")]
    Rejected(AssetType),

    #[error("Translation of {asset} loops back into scope `{scope}`")]
    Cycle { scope: String, asset: AssetType },
}

/// Verdict of an acceptance policy after each resolved hop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// Keep walking.
    Continue,
    /// The path so far is the answer.
    Accept,
    /// Give up without an answer.
    Fail,
}

/// One hop of a resolved path.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedHop<'a> {
    pub hop: &'a Hop,
    pub candle: &'a Candle,
    /// Scope the candle was found in.
    pub scope: &'a str,
}

impl ResolvedHop<'_> {
    pub fn pair(&self) -> &AssetPair {
        &self.hop.pair
    }
}

#[derive(Debug, Default)]
pub struct Resolver {
    expressions: HashMap<String, HashMap<AssetType, Expression>>,
    cache: CandleCache,
}

impl Resolver {
    pub fn new(cache: CandleCache) -> Self {
        Self {
            expressions: HashMap::new(),
            cache,
        }
    }

    pub fn cache(&self) -> &CandleCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CandleCache {
        &mut self.cache
    }

    /// Register every expression under each of its scopes.
    ///
    /// The batch is registered as a whole: on a duplicate nothing from it is kept.
    pub fn add_translations<I>(&mut self, expressions: I) -> Result<(), ResolverError>
    where
        I: IntoIterator<Item = Expression>,
    {
        let expressions: Vec<Expression> = expressions.into_iter().collect();
        let mut pending = HashSet::new();

        for expression in &expressions {
            for scope in &expression.scopes {
                let registered = self
                    .expressions
                    .get(scope)
                    .is_some_and(|assets| assets.contains_key(&expression.asset));

                if registered || !pending.insert((scope.as_str(), &expression.asset)) {
                    return Err(ResolverError::DuplicateTranslation {
                        scope: scope.clone(),
                        asset: expression.asset.clone(),
                    });
                }
            }
        }

        for expression in expressions {
            for scope in &expression.scopes {
                debug!("Registered {} translation in `{scope}`", expression.asset);
                self.expressions
                    .entry(scope.clone())
                    .or_default()
                    .insert(expression.asset.clone(), expression.clone());
            }
        }

        Ok(())
    }

    /// Forget all registered expressions. The candle cache is kept.
    pub fn reset(&mut self) {
        self.expressions.clear();
    }

    /// Resolve `asset` at `at`, trying the expression registered in the first of `scopes` that
    /// has one. `accept` is asked after every hop whether the path is complete.
    pub fn resolve<S, F>(
        &self,
        at: DateTime<Utc>,
        asset: &AssetType,
        scopes: &[S],
        mut accept: F,
    ) -> Result<Vec<ResolvedHop<'_>>, ResolveError>
    where
        S: AsRef<str>,
        F: FnMut(&ResolvedHop<'_>) -> Verdict,
    {
        let mut visited = HashSet::new();

        self.walk(at, asset, scopes, &mut accept, &mut visited)
    }

    /// Resolve until a hop ends in `target`.
    pub fn resolve_to_target<S>(
        &self,
        at: DateTime<Utc>,
        asset: &AssetType,
        target: &AssetType,
        scopes: &[S],
    ) -> Result<Vec<ResolvedHop<'_>>, ResolveError>
    where
        S: AsRef<str>,
    {
        self.resolve(at, asset, scopes, |hop| {
            if hop.pair().cost_unit == *target {
                Verdict::Accept
            } else {
                Verdict::Continue
            }
        })
    }

    /// Resolve until the `n`-th hop that ends in a fiat currency. `n` of zero counts as one.
    pub fn resolve_to_fiat<S>(
        &self,
        at: DateTime<Utc>,
        asset: &AssetType,
        n: usize,
        scopes: &[S],
    ) -> Result<Vec<ResolvedHop<'_>>, ResolveError>
    where
        S: AsRef<str>,
    {
        let mut remaining = n.max(1);

        self.resolve(at, asset, scopes, |hop| {
            if hop.pair().cost_unit.is_fiat() {
                remaining -= 1;
                if remaining == 0 {
                    return Verdict::Accept;
                }
            }

            Verdict::Continue
        })
    }

    fn walk<'a, S>(
        &'a self,
        at: DateTime<Utc>,
        asset: &AssetType,
        scopes: &[S],
        accept: &mut dyn FnMut(&ResolvedHop<'a>) -> Verdict,
        visited: &mut HashSet<(&'a str, &'a AssetType)>,
    ) -> Result<Vec<ResolvedHop<'a>>, ResolveError>
    where
        S: AsRef<str>,
    {
        let (scope, expression) = scopes
            .iter()
            .find_map(|scope| {
                let (scope, assets) = self.expressions.get_key_value(scope.as_ref())?;
                Some((scope.as_str(), assets.get(asset)?))
            })
            .ok_or_else(|| ResolveError::NoTranslation {
                asset: asset.clone(),
                scopes: scopes.iter().map(|s| s.as_ref().to_string()).collect(),
            })?;

        if !visited.insert((scope, &expression.asset)) {
            return Err(ResolveError::Cycle {
                scope: scope.to_string(),
                asset: asset.clone(),
            });
        }

        let mut path = Vec::with_capacity(expression.hops.len());

        for hop in &expression.hops {
            let (candle, found) = self.cache.get(&hop.pair, at, &hop.scopes).ok_or_else(|| {
                ResolveError::MissingCandle {
                    pair: hop.pair.clone(),
                    at,
                    scopes: hop.scopes.clone(),
                }
            })?;
            let resolved = ResolvedHop {
                hop,
                candle,
                scope: found,
            };
            trace!("Resolved {} via `{found}` candle {}", hop.pair, candle.id);

            let verdict = accept(&resolved);
            path.push(resolved);

            match verdict {
                Verdict::Continue => (),
                Verdict::Accept => return Ok(path),
                Verdict::Fail => return Err(ResolveError::Rejected(asset.clone())),
            }
        }

        let Some(last) = expression.hops.last() else {
            return Err(ResolveError::NoTranslation {
                asset: asset.clone(),
                scopes: vec![scope.to_string()],
            });
        };

        let rest = self.walk(at, &last.pair.cost_unit, &last.scopes, accept, visited)?;
        path.extend(rest);

        Ok(path)
    }
}
