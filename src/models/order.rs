use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Rejected,
    Ready,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Ready => "ready",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// `pending -> accepted | rejected | cancelled`, `accepted -> ready | cancelled`.
    /// Rejected, cancelled and ready orders are final.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Accepted)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Accepted, OrderStatus::Ready)
                | (OrderStatus::Accepted, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "accepted" => Ok(OrderStatus::Accepted),
            "rejected" => Ok(OrderStatus::Rejected),
            "ready" => Ok(OrderStatus::Ready),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Meetup,
    HotelDropoff,
    Pickup,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Meetup => "meetup",
            DeliveryMethod::HotelDropoff => "hotel_dropoff",
            DeliveryMethod::Pickup => "pickup",
        }
    }
}

impl FromStr for DeliveryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meetup" => Ok(DeliveryMethod::Meetup),
            "hotel_dropoff" => Ok(DeliveryMethod::HotelDropoff),
            "pickup" => Ok(DeliveryMethod::Pickup),
            other => Err(format!("unknown delivery method: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOption {
    #[default]
    Now,
    Later,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub borrower_id: Uuid,
    pub trip_city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub delivery_method: DeliveryMethod,
    pub request_token: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub item_id: Uuid,
    pub item_name: Option<String>,
    pub lender_id: Uuid,
    pub price: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// What a lender sees in their inbox: one entry per order, with only their own items.
#[derive(Debug, Clone, Serialize)]
pub struct LenderRequest {
    pub order_id: Uuid,
    pub borrower_id: Uuid,
    pub borrower_username: Option<String>,
    pub trip_city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub delivery_method: DeliveryMethod,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub payment_option: PaymentOption,
    /// Client-generated key; resubmitting with the same token returns the original order.
    pub request_token: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    pub request_token: Uuid,
    pub total_price: Decimal,
    pub trip_days: i64,
    /// The order already existed for this request token; nothing new was written.
    pub replayed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LenderDecision {
    Accepted,
    Rejected,
}

impl From<LenderDecision> for OrderStatus {
    fn from(decision: LenderDecision) -> Self {
        match decision {
            LenderDecision::Accepted => OrderStatus::Accepted,
            LenderDecision::Rejected => OrderStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondRequest {
    pub status: LenderDecision,
}
