//! Rental price derivation. Everything here is pure so handlers can call it on
//! every cart read.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::CartItem;

/// Number of rental days for a trip, counting both the start and end date.
/// Never less than one, even when the dates are reversed.
pub fn trip_days(start: NaiveDate, end: NaiveDate) -> i64 {
    let days = (end - start).num_days() + 1;
    days.max(1)
}

/// Per-day rate that pricing actually uses: missing or negative rates count as zero.
pub fn effective_rate(item: &CartItem) -> Decimal {
    match item.price_per_day {
        Some(rate) if !rate.is_sign_negative() => rate,
        _ => Decimal::ZERO,
    }
}

/// `None` when the product does not fit in a `Decimal`.
pub fn line_total(item: &CartItem, days: i64) -> Option<Decimal> {
    effective_rate(item).checked_mul(Decimal::from(days))
}

/// `None` when any line, or the running sum, does not fit in a `Decimal`.
pub fn cart_total(items: &[CartItem], days: i64) -> Option<Decimal> {
    items.iter().try_fold(Decimal::ZERO, |total, item| {
        total.checked_add(line_total(item, days)?)
    })
}

/// Parses a catalog price. Blank, non-numeric and negative values yield `None`.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
        .filter(|price| !price.is_sign_negative())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(price: Option<i64>) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            name: "Silk scarf".to_string(),
            price_per_day: price.map(Decimal::from),
            lender_id: Uuid::new_v4(),
            lender_name: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn same_day_trip_is_one_day() {
        assert_eq!(trip_days(date(2024, 1, 1), date(2024, 1, 1)), 1);
    }

    #[test]
    fn week_long_trip_counts_both_ends() {
        assert_eq!(trip_days(date(2024, 1, 1), date(2024, 1, 7)), 7);
        assert_eq!(trip_days(date(2024, 1, 1), date(2024, 1, 3)), 3);
    }

    #[test]
    fn trip_days_crosses_month_and_leap_day() {
        assert_eq!(trip_days(date(2024, 2, 28), date(2024, 3, 1)), 3);
    }

    #[test]
    fn reversed_dates_floor_at_one() {
        assert_eq!(trip_days(date(2024, 1, 10), date(2024, 1, 1)), 1);
    }

    #[test]
    fn missing_price_prices_at_zero() {
        assert_eq!(line_total(&item(None), 5), Some(Decimal::ZERO));
        assert_eq!(line_total(&item(Some(12)), 5), Some(Decimal::from(60)));
    }

    #[test]
    fn cart_total_is_sum_of_lines_in_any_order() {
        let mut items = vec![item(Some(10)), item(Some(20)), item(None), item(Some(7))];
        let expected = Decimal::from((10 + 20 + 7) * 4);
        assert_eq!(cart_total(&items, 4), Some(expected));

        items.reverse();
        assert_eq!(cart_total(&items, 4), Some(expected));
        items.swap(0, 2);
        assert_eq!(cart_total(&items, 4), Some(expected));
    }

    #[test]
    fn empty_cart_totals_zero() {
        assert_eq!(cart_total(&[], 3), Some(Decimal::ZERO));
    }

    #[test]
    fn oversized_price_does_not_overflow() {
        let huge = parse_price("79228162514264337593543950335");
        assert_eq!(huge, Some(Decimal::MAX));

        let mut listing = item(None);
        listing.price_per_day = huge;
        assert_eq!(line_total(&listing, 1), Some(Decimal::MAX));
        assert_eq!(line_total(&listing, 3), None);
        assert_eq!(cart_total(&[listing.clone()], 3), None);

        // Each line fits, the sum does not.
        assert_eq!(cart_total(&[listing.clone(), listing], 1), None);
    }

    #[test]
    fn parse_price_rejects_garbage() {
        assert_eq!(parse_price("15.25"), Some(Decimal::new(1525, 2)));
        assert_eq!(parse_price(" 9 "), Some(Decimal::from(9)));
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("free"), None);
        assert_eq!(parse_price("-4"), None);
    }
}
