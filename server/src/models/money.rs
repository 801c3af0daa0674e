//! Fixed-point money arithmetic.
//!
//! All amounts are `Decimal` with two fractional digits. Rounding is
//! half-up and happens exactly once per computed total: when a reservation
//! is priced and when a partial cancellation prorates it.

use rust_decimal::{Decimal, RoundingStrategy};

pub const MONEY_SCALE: u32 = 2;

/// Round half-up to cents. The result always carries exactly two
/// fractional digits so amounts serialise as `"54.00"`, not `"54"`.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// `unit_price × quantity × (1 − discount_percent / 100)`, rounded.
pub fn reservation_total(unit_price: Decimal, quantity: i32, discount_percent: i32) -> Decimal {
    let gross = unit_price * Decimal::from(quantity);
    let keep = Decimal::ONE_HUNDRED - Decimal::from(discount_percent);
    round_money(gross * keep / Decimal::ONE_HUNDRED)
}

/// Linear proration of `total` from `tickets` down to `remaining` tickets.
pub fn prorate(total: Decimal, tickets: i32, remaining: i32) -> Decimal {
    if tickets <= 0 {
        return Decimal::ZERO;
    }
    round_money(total * Decimal::from(remaining) / Decimal::from(tickets))
}

/// Whole minor units (cents) for payment providers.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;
    (round_money(amount) * Decimal::ONE_HUNDRED).to_i64()
}

pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, MONEY_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_discounted_total() {
        assert_eq!(reservation_total(dec("20.00"), 3, 10), dec("54.00"));
        assert_eq!(reservation_total(dec("20.00"), 3, 0), dec("60.00"));
        assert_eq!(reservation_total(dec("20.00"), 3, 100), Decimal::ZERO);
        assert_eq!(reservation_total(dec("20"), 3, 0).to_string(), "60.00");
        assert_eq!(prorate(dec("9"), 3, 1).to_string(), "3.00");
    }

    #[test]
    fn test_total_rounds_half_up() {
        // 0.15 * 0.5 = 0.075 -> 0.08
        assert_eq!(reservation_total(dec("0.15"), 1, 50), dec("0.08"));
        // 9.99 * 1 * 0.85 = 8.4915 -> 8.49
        assert_eq!(reservation_total(dec("9.99"), 1, 15), dec("8.49"));
    }

    #[test]
    fn test_prorate() {
        assert_eq!(prorate(dec("100.00"), 5, 3), dec("60.00"));
        assert_eq!(prorate(dec("10.00"), 3, 1), dec("3.33"));
        assert_eq!(prorate(dec("10.00"), 3, 2), dec("6.67"));
        assert_eq!(prorate(dec("10.00"), 0, 0), Decimal::ZERO);
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(dec("54.00")), Some(5400));
        assert_eq!(to_minor_units(dec("0.075")), Some(8));
        assert_eq!(from_minor_units(5400), dec("54.00"));
    }

    proptest! {
        #[test]
        fn prorated_total_never_exceeds_original(
            cents in 0i64..10_000_000,
            tickets in 1i32..50,
            cancel in 0i32..50,
        ) {
            let cancel = cancel.min(tickets);
            let total = from_minor_units(cents);
            let remaining = tickets - cancel;
            let prorated = prorate(total, tickets, remaining);

            prop_assert!(prorated <= total);
            prop_assert!(prorated >= Decimal::ZERO);
            prop_assert!(prorated.scale() <= MONEY_SCALE);
            if cancel == 0 {
                prop_assert_eq!(prorated, total);
            }
            if remaining == 0 {
                prop_assert_eq!(prorated, Decimal::ZERO);
            }
        }

        #[test]
        fn discount_never_increases_total(
            cents in 0i64..1_000_000,
            quantity in 1i32..20,
            discount in 0i32..=100,
        ) {
            let price = from_minor_units(cents);
            let full = reservation_total(price, quantity, 0);
            let discounted = reservation_total(price, quantity, discount);
            prop_assert!(discounted <= full);
            prop_assert!(discounted >= Decimal::ZERO);
        }
    }
}
