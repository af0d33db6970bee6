use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{CartItem, CheckoutReceipt, CheckoutRequest, PaymentOption};
use crate::services::cart_session::{CartSession, SubmissionSnapshot};
use crate::services::data_service::{
    DataService, Identity, NewNotification, NewOrder, NewOrderItem, OrderWriter, PlacedOrder,
};
use crate::services::payment::PaymentAuthorizer;
use crate::services::pricing;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Your cart is empty. Add items before submitting.")]
    EmptyCart,
    #[error("Trip start and end dates must both be set")]
    MissingTripDates,
    #[error("Trip ends ({end}) before it starts ({start})")]
    InvalidTripDates { start: NaiveDate, end: NaiveDate },
    #[error("Cart total is too large to price")]
    PriceOutOfRange,
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("A checkout is already in progress")]
    CheckoutInProgress,
    #[error("Payment failed: {0}")]
    Payment(String),
    #[error("Failed to create order: {0}")]
    OrderCreation(String),
    #[error("Failed to save order items: {0}")]
    OrderItemsWrite(String),
    #[error("Failed to notify lenders: {0}")]
    NotificationWrite(String),
    #[error("Failed to commit order: {0}")]
    Commit(String),
}

/// How lenders hear about a new request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPolicy {
    /// One notification per requested item, even when a lender owns several.
    #[default]
    PerItem,
    /// One notification per distinct lender.
    PerLender,
}

impl std::str::FromStr for NotificationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_item" => Ok(NotificationPolicy::PerItem),
            "per_lender" => Ok(NotificationPolicy::PerLender),
            other => Err(format!("unknown notification policy: {}", other)),
        }
    }
}

pub fn build_notifications(
    policy: NotificationPolicy,
    order_id: Uuid,
    items: &[CartItem],
) -> Vec<NewNotification> {
    match policy {
        NotificationPolicy::PerItem => items
            .iter()
            .map(|item| NewNotification {
                recipient_id: item.lender_id,
                order_id,
                message: format!("New borrow request for \"{}\"", item.name),
            })
            .collect(),
        NotificationPolicy::PerLender => {
            let mut lenders: Vec<(Uuid, Vec<&CartItem>)> = Vec::new();
            for item in items {
                match lenders.iter_mut().find(|(lender, _)| *lender == item.lender_id) {
                    Some((_, owned)) => owned.push(item),
                    None => lenders.push((item.lender_id, vec![item])),
                }
            }
            lenders
                .into_iter()
                .map(|(lender_id, owned)| NewNotification {
                    recipient_id: lender_id,
                    order_id,
                    message: match owned.as_slice() {
                        [only] => format!("New borrow request for \"{}\"", only.name),
                        many => format!("New borrow request for {} items", many.len()),
                    },
                })
                .collect()
        }
    }
}

/// Who is checking out: a raw access token still to be resolved, or an
/// identity the caller already resolved.
enum Borrower<'a> {
    AccessToken(&'a str),
    Resolved(Identity),
}

pub struct CheckoutService {
    data: Arc<dyn DataService>,
    payments: Arc<dyn PaymentAuthorizer>,
    notification_policy: NotificationPolicy,
}

impl CheckoutService {
    pub fn new(
        data: Arc<dyn DataService>,
        payments: Arc<dyn PaymentAuthorizer>,
        notification_policy: NotificationPolicy,
    ) -> Self {
        Self {
            data,
            payments,
            notification_policy,
        }
    }

    /// Turns the session's cart into a pending order. The cart is cleared only
    /// when a new order has been committed.
    pub async fn checkout(
        &self,
        session: &CartSession,
        access_token: &str,
        req: &CheckoutRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        self.run(session, Borrower::AccessToken(access_token), req)
            .await
    }

    /// Same as [`CheckoutService::checkout`] for a borrower whose identity is
    /// already known, so the backend is not asked again.
    pub async fn checkout_for(
        &self,
        session: &CartSession,
        identity: Identity,
        req: &CheckoutRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        self.run(session, Borrower::Resolved(identity), req).await
    }

    async fn run(
        &self,
        session: &CartSession,
        borrower: Borrower<'_>,
        req: &CheckoutRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let (submission, snapshot) = session.begin_submission()?;
        let result = self.submit(snapshot, borrower, req).await;

        match &result {
            Ok(receipt) => {
                submission.complete(receipt);
                info!(
                    "Checkout complete: order {} total {} ({} days){}",
                    receipt.order_id,
                    receipt.total_price,
                    receipt.trip_days,
                    if receipt.replayed { " [replayed]" } else { "" }
                );
            }
            Err(e) => {
                submission.fail(e);
                warn!("Checkout failed: {}", e);
            }
        }
        result
    }

    async fn identify(&self, borrower: Borrower<'_>) -> Result<Identity, CheckoutError> {
        match borrower {
            Borrower::Resolved(identity) => Ok(identity),
            Borrower::AccessToken(token) => self
                .data
                .current_identity(token)
                .await
                .map_err(|e| CheckoutError::Authentication(e.to_string())),
        }
    }

    async fn submit(
        &self,
        snapshot: SubmissionSnapshot,
        borrower: Borrower<'_>,
        req: &CheckoutRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let SubmissionSnapshot {
            items,
            trip,
            last_completed,
        } = snapshot;

        if let (Some(token), Some(done)) = (req.request_token, last_completed) {
            if done.request_token == token {
                debug!("Request {} already placed order {}", token, done.order_id);
                return Ok(CheckoutReceipt {
                    replayed: true,
                    ..done
                });
            }
        }

        if items.is_empty() {
            // A retry may arrive after the cart was cleared by the first attempt.
            let Some(token) = req.request_token else {
                return Err(CheckoutError::EmptyCart);
            };
            let identity = self.identify(borrower).await?;
            return match self.find_placed(identity.user_id, token).await? {
                Some(placed) => Ok(replayed_receipt(placed, token)),
                None => Err(CheckoutError::EmptyCart),
            };
        }

        let (start_date, end_date) = match (trip.start_date, trip.end_date) {
            (Some(start), Some(end)) => (start, end),
            _ => return Err(CheckoutError::MissingTripDates),
        };
        if end_date < start_date {
            return Err(CheckoutError::InvalidTripDates {
                start: start_date,
                end: end_date,
            });
        }

        let trip_days = pricing::trip_days(start_date, end_date);
        let total_price =
            pricing::cart_total(&items, trip_days).ok_or(CheckoutError::PriceOutOfRange)?;
        let order_items = items
            .iter()
            .map(|item| {
                Some(NewOrderItem {
                    item_id: item.id,
                    lender_id: item.lender_id,
                    price: pricing::line_total(item, trip_days)?,
                })
            })
            .collect::<Option<Vec<_>>>()
            .ok_or(CheckoutError::PriceOutOfRange)?;

        let identity = self.identify(borrower).await?;

        if let Some(token) = req.request_token {
            if let Some(placed) = self.find_placed(identity.user_id, token).await? {
                return Ok(replayed_receipt(placed, token));
            }
        }
        let request_token = req.request_token.unwrap_or_else(Uuid::new_v4);

        if req.payment_option == PaymentOption::Now {
            let authorization = self
                .payments
                .authorize(identity.user_id, total_price, request_token)
                .await
                .map_err(|e| CheckoutError::Payment(e.to_string()))?;
            debug!("Payment authorized: {}", authorization.reference);
        }

        let order = NewOrder {
            borrower_id: identity.user_id,
            trip_city: trip.city,
            start_date,
            end_date,
            total_price,
            delivery_method: req.delivery_method,
            request_token,
        };

        let mut writer = self
            .data
            .begin()
            .await
            .map_err(|e| CheckoutError::OrderCreation(e.to_string()))?;

        let order_id = match self
            .write_order(writer.as_mut(), &order, &order_items, &items)
            .await
        {
            Ok(order_id) => order_id,
            Err(e) => {
                if let Err(rollback_err) = writer.rollback().await {
                    warn!("Rollback after failed checkout also failed: {}", rollback_err);
                }
                return Err(e);
            }
        };

        writer
            .commit()
            .await
            .map_err(|e| CheckoutError::Commit(e.to_string()))?;

        Ok(CheckoutReceipt {
            order_id,
            request_token,
            total_price,
            trip_days,
            replayed: false,
        })
    }

    /// Looks for an order this borrower already placed under `request_token`.
    async fn find_placed(
        &self,
        borrower_id: Uuid,
        request_token: Uuid,
    ) -> Result<Option<PlacedOrder>, CheckoutError> {
        let mut reader = self
            .data
            .begin()
            .await
            .map_err(|e| CheckoutError::OrderCreation(e.to_string()))?;
        let found = reader.find_order_by_token(borrower_id, request_token).await;
        if let Err(e) = reader.rollback().await {
            warn!("Closing read-only checkout transaction failed: {}", e);
        }
        found.map_err(|e| CheckoutError::OrderCreation(e.to_string()))
    }

    async fn write_order(
        &self,
        writer: &mut dyn OrderWriter,
        order: &NewOrder,
        order_items: &[NewOrderItem],
        items: &[CartItem],
    ) -> Result<Uuid, CheckoutError> {
        let order_id = writer
            .create_order(order)
            .await
            .map_err(|e| CheckoutError::OrderCreation(e.to_string()))?;

        writer
            .create_order_items(order_id, order_items)
            .await
            .map_err(|e| CheckoutError::OrderItemsWrite(e.to_string()))?;

        let notifications = build_notifications(self.notification_policy, order_id, items);
        writer
            .create_notifications(&notifications)
            .await
            .map_err(|e| CheckoutError::NotificationWrite(e.to_string()))?;

        Ok(order_id)
    }
}

fn replayed_receipt(placed: PlacedOrder, request_token: Uuid) -> CheckoutReceipt {
    CheckoutReceipt {
        order_id: placed.id,
        request_token,
        total_price: placed.total_price,
        trip_days: pricing::trip_days(placed.start_date, placed.end_date),
        replayed: true,
    }
}
