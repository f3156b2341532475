use crate::model::{AssetPair, AssetType, SCOPE_ALL};
use std::str::FromStr;
use thiserror::Error;

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("Malformed resolver expression on line {line}: `{text}`")]
    MalformedExpression { line: usize, text: String },
}

/// One lookup step: a pair and the exchange scopes allowed to price it, in preference order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hop {
    pub pair: AssetPair,
    pub scopes: Vec<String>,
}

/// `scopes:ASSET = scopes:A -> scopes:B ...`, expanded into hops `ASSET-A`, `A-B`, ...
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Expression {
    pub asset: AssetType,
    /// Scopes the expression is registered under.
    pub scopes: Vec<String>,
    pub hops: Vec<Hop>,
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_line(s).ok_or_else(|| ExpressionError::MalformedExpression {
            line: 1,
            text: s.to_string(),
        })
    }
}

/// Parse one expression per line. Blank lines and `#` comments are skipped.
pub fn parse_expressions(text: &str) -> Result<Vec<Expression>, ExpressionError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            parse_line(line).ok_or_else(|| ExpressionError::MalformedExpression {
                line: index + 1,
                text: line.trim().to_string(),
            })
        })
        .collect()
}

fn parse_line(line: &str) -> Option<Expression> {
    let line: String = line.chars().filter(|c| !matches!(c, ' ' | '\t' | '\r')).collect();

    let (lhs, rhs) = line.split_once('=')?;
    if rhs.contains('=') {
        return None;
    }

    let (scopes, asset) = scoped(lhs)?;
    let asset = AssetType::new(asset);

    let mut from = asset.clone();
    let hops = rhs
        .split("->")
        .map(|part| {
            let (scopes, to) = scoped(part)?;
            let to = AssetType::new(to);
            let pair = AssetPair {
                asset: std::mem::replace(&mut from, to.clone()),
                cost_unit: to,
            };

            Some(Hop { pair, scopes })
        })
        .collect::<Option<Vec<_>>>()?;

    Some(Expression {
        asset,
        scopes,
        hops,
    })
}

/// Split `scope,scope:ASSET`. No prefix means [`SCOPE_ALL`].
fn scoped(part: &str) -> Option<(Vec<String>, &str)> {
    let (scopes, asset) = match part.split_once(':') {
        None => (vec![SCOPE_ALL.to_string()], part),
        Some((prefix, asset)) => {
            let scopes = prefix
                .split(',')
                .map(|scope| (!scope.is_empty()).then(|| scope.to_string()))
                .collect::<Option<Vec<_>>>()?;

            (scopes, asset)
        }
    };

    if asset.is_empty() || asset.contains(':') || asset.contains(',') {
        return None;
    }

    Some((scopes, asset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_multi_hop_expression() {
        let expression: Expression = "btx:USDT = btx,all:USD -> ofx,all:EUR".parse().unwrap();

        assert_eq!(expression.asset, AssetType::new("USDT"));
        assert_eq!(expression.scopes, vec!["btx".to_string()]);
        assert_eq!(
            expression.hops,
            vec![
                Hop {
                    pair: AssetPair::new("USDT", "USD"),
                    scopes: vec!["btx".to_string(), "all".to_string()],
                },
                Hop {
                    pair: AssetPair::new("USD", "EUR"),
                    scopes: vec!["ofx".to_string(), "all".to_string()],
                },
            ],
        );
    }

    #[test]
    #[traced_test]
    fn test_no_prefix_means_all() {
        let expression: Expression = "USDT\t= btx:USD -> EUR".parse().unwrap();

        assert_eq!(expression.scopes, vec!["all".to_string()]);
        assert_eq!(expression.hops[0].scopes, vec!["btx".to_string()]);
        assert_eq!(expression.hops[1].scopes, vec!["all".to_string()]);
        assert_eq!(expression.hops[1].pair.to_string(), "USD-EUR");
    }

    #[test]
    #[traced_test]
    fn test_program_skips_blank_and_comment_lines() {
        let program = "# stablecoins\r\nUSDT = USD -> EUR\r\n\r\nkraken:XXBT = ZEUR\n";
        let expressions = parse_expressions(program).unwrap();

        assert_eq!(expressions.len(), 2);
        assert_eq!(expressions[1].asset, AssetType::new("BTC"));
        assert_eq!(expressions[1].hops[0].pair, AssetPair::new("BTC", "EUR"));
    }

    #[test]
    #[traced_test]
    fn test_malformed_lines() {
        for (program, line) in [
            ("USDT -> USD", 1),
            ("USDT = USD = EUR", 1),
            ("USDT = USD\na:b:USDT = USD", 2),
            ("USDT = USD ->", 1),
            ("btx,:USDT = USD", 1),
            ("= USD", 1),
        ] {
            let err = parse_expressions(program).unwrap_err();
            let ExpressionError::MalformedExpression { line: found, .. } = err;
            assert_eq!(found, line, "{program}");
        }
    }
}
