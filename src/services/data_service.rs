use async_trait::async_trait;
use chrono::NaiveDate;
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::DeliveryMethod;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("session expired")]
    SessionExpired,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid stored value: {0}")]
    Decode(String),
    #[error("unit of work already committed or rolled back")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub borrower_id: Uuid,
    pub trip_city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price: Decimal,
    pub delivery_method: DeliveryMethod,
    pub request_token: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub item_id: Uuid,
    pub lender_id: Uuid,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub order_id: Uuid,
    pub message: String,
}

/// An order that already exists for a request token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedOrder {
    pub id: Uuid,
    pub total_price: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// The backing store the checkout runs against.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataService: Send + Sync {
    async fn current_identity(&self, access_token: &str) -> Result<Identity, DataError>;

    /// Opens a unit of work. Nothing written through the returned writer is
    /// visible until [`OrderWriter::commit`].
    async fn begin(&self) -> Result<Box<dyn OrderWriter>, DataError>;
}

/// Writes made through one writer land together on [`OrderWriter::commit`].
/// After `commit` or `rollback` every call fails with [`DataError::Closed`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderWriter: Send {
    async fn find_order_by_token(
        &mut self,
        borrower_id: Uuid,
        request_token: Uuid,
    ) -> Result<Option<PlacedOrder>, DataError>;

    async fn create_order(&mut self, order: &NewOrder) -> Result<Uuid, DataError>;

    async fn create_order_items(
        &mut self,
        order_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<(), DataError>;

    async fn create_notifications(
        &mut self,
        notifications: &[NewNotification],
    ) -> Result<(), DataError>;

    async fn commit(&mut self) -> Result<(), DataError>;

    async fn rollback(&mut self) -> Result<(), DataError>;
}
