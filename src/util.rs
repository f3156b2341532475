use rust_decimal::{Decimal, RoundingStrategy};

pub mod fifo;

/// Number of decimal digits kept by every intermediate sum. One satoshi.
pub const PRECISION: u32 = 8;

/// The two halves of a split-by-size.
#[derive(Clone, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct HasSplit<A: Sized> {
    /// The requested portion.
    pub take: A,
    pub leave: A, // non-maybe.  consequence of split.
}

impl<A> HasSplit<A> {
    pub fn map<B>(self, mut f: impl FnMut(A) -> B) -> HasSplit<B> {
        HasSplit {
            take: f(self.take),
            leave: f(self.leave),
        }
    }
}

/// Round to [`PRECISION`] digits, half away from zero.
pub fn to_fixed(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(PRECISION, RoundingStrategy::MidpointAwayFromZero)
}

/// A split point strictly inside `measure`, at [`PRECISION`] digits. `None` when there is no room.
#[cfg(test)]
pub(crate) fn arbitrary_split(
    u: &mut arbtest::arbitrary::Unstructured<'_>,
    measure: Decimal,
) -> arbtest::arbitrary::Result<Option<Decimal>> {
    let mut units = measure;
    units.rescale(PRECISION);
    let units = units.mantissa();
    if units < 2 {
        return Ok(None);
    }

    let take = u.int_in_range(1..=units - 1)?;

    Ok(Some(Decimal::from_i128_with_scale(take, PRECISION)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_to_fixed_rounds_half_away_from_zero() {
        let up: Decimal = "0.000000005".parse().unwrap();
        let down: Decimal = "-0.000000005".parse().unwrap();
        let keep: Decimal = "1.123456784".parse().unwrap();

        assert_eq!(to_fixed(up), "0.00000001".parse().unwrap());
        assert_eq!(to_fixed(down), "-0.00000001".parse().unwrap());
        assert_eq!(to_fixed(keep), "1.12345678".parse().unwrap());
    }
}
