use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::services::pricing::parse_price;

/// A wardrobe listing staged for borrowing during the active trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_price")]
    pub price_per_day: Option<Decimal>,
    pub lender_id: Uuid,
    pub lender_name: Option<String>,
}

/// Catalog prices come from user-entered listings, so anything that is not a
/// usable amount deserializes to `None` instead of failing the whole item.
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => parse_price(&n.to_string()),
        Some(serde_json::Value::String(s)) => parse_price(&s),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub city: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateTripRequest {
    #[validate(length(min = 1, max = 255))]
    pub city: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCartItemRequest {
    pub item_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    /// `null` when the line is too large to price.
    pub line_total: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub trip: Trip,
    pub trip_days: Option<i64>,
    pub items: Vec<CartLine>,
    pub total_price: Option<Decimal>,
    pub checkout: crate::services::CheckoutState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn price_accepts_numbers_and_numeric_strings() {
        let item: CartItem = serde_json::from_value(serde_json::json!({
            "id": Uuid::nil(),
            "name": "Linen dress",
            "price_per_day": "12.50",
            "lender_id": Uuid::nil(),
            "lender_name": null
        }))
        .unwrap();
        assert_eq!(item.price_per_day, Some(Decimal::from_str("12.50").unwrap()));

        let item: CartItem = serde_json::from_value(serde_json::json!({
            "id": Uuid::nil(),
            "name": "Linen dress",
            "price_per_day": 8,
            "lender_id": Uuid::nil(),
            "lender_name": "mara"
        }))
        .unwrap();
        assert_eq!(item.price_per_day, Some(Decimal::from(8)));
    }

    #[test]
    fn malformed_price_degrades_to_none() {
        for raw in [
            serde_json::json!("ten dollars"),
            serde_json::json!(true),
            serde_json::json!(null),
            serde_json::json!(-3),
        ] {
            let item: CartItem = serde_json::from_value(serde_json::json!({
                "id": Uuid::nil(),
                "name": "Wool coat",
                "price_per_day": raw,
                "lender_id": Uuid::nil(),
                "lender_name": null
            }))
            .unwrap();
            assert_eq!(item.price_per_day, None);
        }

        let item: CartItem = serde_json::from_value(serde_json::json!({
            "id": Uuid::nil(),
            "name": "Wool coat",
            "lender_id": Uuid::nil(),
            "lender_name": null
        }))
        .unwrap();
        assert_eq!(item.price_per_day, None);
    }
}
