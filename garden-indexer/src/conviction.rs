//! Conviction arithmetic shared with the strategy contracts.

use garden_store::Amount;

/// Fixed-point scale of the decay parameter.
pub const D: u64 = 10_000_000;

/// Conviction ceiling for `points` under `decay`: `points * D / (D - decay)`.
///
/// `None` when `decay >= D`, where the ceiling is unbounded.
pub fn max_conviction(points: &Amount, decay: &Amount) -> Option<Amount> {
    let scale = Amount::from(D);
    let denominator = scale.checked_sub(decay)?;
    points.mul_div(&scale, &denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_conviction() {
        let decay = Amount::from(9_999_799);
        assert_eq!(
            max_conviction(&Amount::from(1_000), &decay),
            Some(Amount::from(49_751_243))
        );
        assert_eq!(max_conviction(&Amount::zero(), &decay), Some(Amount::zero()));
        assert_eq!(max_conviction(&Amount::from(1), &Amount::from(D)), None);
        assert_eq!(max_conviction(&Amount::from(1), &Amount::from(D + 1)), None);
    }
}
