//! Pure aggregation over loaded records: member workload, budget roll-up and project progress.
//!
//! Nothing here touches storage. Services load rows and hand them in.

pub mod budget;
pub mod progress;
pub mod workload;

#[cfg(test)]
pub(crate) mod testing;

/// Round to two decimals for reporting.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole * 100`, or 0 when `whole` is zero.
pub fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(62.499_99), 62.5);
        assert_eq!(round2(33.333_333), 33.33);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_percent_of_zero() {
        assert_eq!(percent(5.0, 0.0), 0.0);
        assert_eq!(percent(400.0, 1000.0), 40.0);
    }
}
