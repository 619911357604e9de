//! Order and tracking references
//!
//! Human-facing references are a prefix, the UTC date, and a zero-padded
//! random suffix. Generation is optimistic: global uniqueness is enforced by
//! the store's unique constraint, and callers regenerate and retry when an
//! insert reports a conflict. A pre-check alone is never enough, since two
//! concurrent creations can both pass it before either commits.

use jiff::Timestamp;
use rand::Rng;
use uuid::Uuid;

/// Prefix of order numbers, e.g. `ORD202608270042`.
pub const ORDER_NUMBER_PREFIX: &str = "ORD";

/// Prefix of tracking numbers, e.g. `TRK2026082700042`.
pub const TRACKING_NUMBER_PREFIX: &str = "TRK";

fn date_stamp(now: Timestamp) -> String {
    now.strftime("%Y%m%d").to_string()
}

/// Generate an order number candidate: `ORD` + `YYYYMMDD` + four random
/// digits, zero-padded.
pub fn order_number(now: Timestamp, rng: &mut impl Rng) -> String {
    format!(
        "{ORDER_NUMBER_PREFIX}{}{:04}",
        date_stamp(now),
        rng.gen_range(0..10_000_u32)
    )
}

/// Generate a tracking number candidate: `TRK` + `YYYYMMDD` + five random
/// digits, zero-padded.
pub fn tracking_number(now: Timestamp, rng: &mut impl Rng) -> String {
    format!(
        "{TRACKING_NUMBER_PREFIX}{}{:05}",
        date_stamp(now),
        rng.gen_range(0..100_000_u32)
    )
}

/// Fallback transaction reference for completions where neither the caller
/// nor the processor supplied one.
#[must_use]
pub fn fallback_transaction_id() -> String {
    format!("TXN{}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn fixed_now() -> Timestamp {
        // 2026-08-27T00:00:00Z
        Timestamp::constant(1_787_788_800, 0)
    }

    #[test]
    fn order_number_format() {
        let mut rng = StdRng::seed_from_u64(7);

        let number = order_number(fixed_now(), &mut rng);

        assert_eq!(number.len(), 3 + 8 + 4, "ORD + date + 4 digits: {number}");
        assert!(number.starts_with("ORD20260827"), "got {number}");
        assert!(
            number.chars().skip(3).all(|c| c.is_ascii_digit()),
            "suffix must be digits: {number}"
        );
    }

    #[test]
    fn tracking_number_format() {
        let mut rng = StdRng::seed_from_u64(7);

        let number = tracking_number(fixed_now(), &mut rng);

        assert_eq!(number.len(), 3 + 8 + 5, "TRK + date + 5 digits: {number}");
        assert!(number.starts_with("TRK20260827"), "got {number}");
    }

    #[test]
    fn fallback_transaction_id_is_prefixed_and_unique() {
        let a = fallback_transaction_id();
        let b = fallback_transaction_id();

        assert!(a.starts_with("TXN"), "got {a}");
        assert_ne!(a, b);
    }
}
