use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::CartItem;

#[derive(Debug, Clone, Serialize)]
pub struct WardrobeListing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_username: Option<String>,
    pub name: String,
    pub price_per_day: Option<Decimal>,
}

impl From<WardrobeListing> for CartItem {
    fn from(listing: WardrobeListing) -> Self {
        CartItem {
            id: listing.id,
            name: listing.name,
            price_per_day: listing.price_per_day,
            lender_id: listing.owner_id,
            lender_name: listing.owner_username,
        }
    }
}
