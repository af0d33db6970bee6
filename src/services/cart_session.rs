use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{CartItem, CartLine, CartView, CheckoutReceipt, Trip};
use crate::services::checkout::CheckoutError;
use crate::services::pricing;
use crate::services::CartStore;

/// Single source of truth for whether a checkout may start and whether the
/// cart may be edited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    Idle,
    Submitting,
    Succeeded { order_id: Uuid },
    Failed { reason: String },
}

impl CheckoutState {
    pub fn is_submitting(&self) -> bool {
        matches!(self, CheckoutState::Submitting)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    cart: CartStore,
    trip: Trip,
    checkout: CheckoutState,
    last_completed: Option<CheckoutReceipt>,
}

/// Cart, trip and checkout progress for one signed-in user.
///
/// The lock is never held across an `.await`, so a plain mutex is enough and
/// [`Submission`] can release the session from `Drop`.
#[derive(Debug, Default)]
pub struct CartSession {
    state: Mutex<SessionState>,
}

/// What a checkout works from: the cart and trip as they were when submission began.
#[derive(Debug, Clone)]
pub struct SubmissionSnapshot {
    pub items: Vec<CartItem>,
    pub trip: Trip,
    /// The most recent order this session placed, if any.
    pub last_completed: Option<CheckoutReceipt>,
}

impl CartSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_item(&self, item: CartItem) -> Result<bool, CheckoutError> {
        let mut state = self.lock();
        if state.checkout.is_submitting() {
            return Err(CheckoutError::CheckoutInProgress);
        }
        Ok(state.cart.add_item(item))
    }

    pub fn remove_item(&self, item_id: Uuid) -> Result<bool, CheckoutError> {
        let mut state = self.lock();
        if state.checkout.is_submitting() {
            return Err(CheckoutError::CheckoutInProgress);
        }
        Ok(state.cart.remove_item(item_id))
    }

    pub fn clear(&self) -> Result<(), CheckoutError> {
        let mut state = self.lock();
        if state.checkout.is_submitting() {
            return Err(CheckoutError::CheckoutInProgress);
        }
        state.cart.clear();
        Ok(())
    }

    pub fn is_in_cart(&self, item_id: Uuid) -> bool {
        self.lock().cart.is_in_cart(item_id)
    }

    pub fn snapshot(&self) -> Vec<CartItem> {
        self.lock().cart.snapshot()
    }

    pub fn set_trip(&self, trip: Trip) -> Result<(), CheckoutError> {
        let mut state = self.lock();
        if state.checkout.is_submitting() {
            return Err(CheckoutError::CheckoutInProgress);
        }
        state.trip = trip;
        Ok(())
    }

    pub fn checkout_state(&self) -> CheckoutState {
        self.lock().checkout.clone()
    }

    /// Nothing worth keeping: empty cart, no trip, no checkout running.
    fn is_idle(&self) -> bool {
        let state = self.lock();
        state.cart.is_empty() && state.trip == Trip::default() && !state.checkout.is_submitting()
    }

    /// Priced view of the cart for display.
    pub fn view(&self) -> CartView {
        let state = self.lock();
        let trip_days = match (state.trip.start_date, state.trip.end_date) {
            (Some(start), Some(end)) => Some(pricing::trip_days(start, end)),
            _ => None,
        };
        let days = trip_days.unwrap_or(1);
        let items = state.cart.snapshot();
        let total_price = pricing::cart_total(&items, days);
        let items = items
            .into_iter()
            .map(|item| CartLine {
                line_total: pricing::line_total(&item, days),
                item,
            })
            .collect();

        CartView {
            trip: state.trip.clone(),
            trip_days,
            items,
            total_price,
            checkout: state.checkout.clone(),
        }
    }

    /// Moves to `Submitting` and hands back the cart to submit. Fails if a
    /// submission is already running.
    pub fn begin_submission(&self) -> Result<(Submission<'_>, SubmissionSnapshot), CheckoutError> {
        let mut state = self.lock();
        if state.checkout.is_submitting() {
            return Err(CheckoutError::CheckoutInProgress);
        }
        state.checkout = CheckoutState::Submitting;
        let snapshot = SubmissionSnapshot {
            items: state.cart.snapshot(),
            trip: state.trip.clone(),
            last_completed: state.last_completed.clone(),
        };
        Ok((
            Submission {
                session: self,
                finished: false,
            },
            snapshot,
        ))
    }
}

/// A checkout in flight. The session leaves `Submitting` when this is
/// completed, failed, or dropped; a drop without an outcome counts as failure.
#[must_use = "dropping a submission marks the checkout as failed"]
#[derive(Debug)]
pub struct Submission<'a> {
    session: &'a CartSession,
    finished: bool,
}

impl Submission<'_> {
    /// Records the order. The cart is only emptied for a newly written order;
    /// a replay leaves whatever is in the cart now alone.
    pub fn complete(mut self, receipt: &CheckoutReceipt) {
        self.finished = true;
        let mut state = self.session.lock();
        if !receipt.replayed {
            state.cart.clear();
        }
        state.checkout = CheckoutState::Succeeded {
            order_id: receipt.order_id,
        };
        state.last_completed = Some(CheckoutReceipt {
            replayed: false,
            ..receipt.clone()
        });
    }

    pub fn fail(mut self, error: &CheckoutError) {
        self.finished = true;
        self.session.lock().checkout = CheckoutState::Failed {
            reason: error.to_string(),
        };
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.lock().checkout = CheckoutState::Failed {
                reason: "checkout was interrupted".to_string(),
            };
        }
    }
}

/// In-memory registry of cart sessions keyed by user id. Nothing here
/// survives a restart.
#[derive(Debug, Default)]
pub struct CartSessions {
    sessions: RwLock<HashMap<String, Arc<CartSession>>>,
}

impl CartSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<CartSession>> {
        self.sessions.read().await.get(user_id).cloned()
    }

    pub async fn get_or_create(&self, user_id: &str) -> Arc<CartSession> {
        if let Some(session) = self.get(user_id).await {
            return session;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(CartSession::new()))
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops sessions that hold nothing and that no request is using.
    /// Returns how many were removed.
    pub async fn prune_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| Arc::strong_count(session) > 1 || !session.is_idle());
        before - sessions.len()
    }
}
