use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAuthorization {
    pub reference: Uuid,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Authorizes the "pay now" charge before anything is written.
#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    /// `idempotency_key` is stable across retries of the same checkout.
    async fn authorize(
        &self,
        borrower_id: Uuid,
        amount: Decimal,
        idempotency_key: Uuid,
    ) -> Result<PaymentAuthorization, PaymentError>;
}

/// Stand-in authorizer: waits a fixed delay and approves. No money moves.
#[derive(Debug, Clone)]
pub struct SimulatedPayment {
    delay: Duration,
}

impl SimulatedPayment {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl PaymentAuthorizer for SimulatedPayment {
    async fn authorize(
        &self,
        borrower_id: Uuid,
        amount: Decimal,
        idempotency_key: Uuid,
    ) -> Result<PaymentAuthorization, PaymentError> {
        if amount.is_sign_negative() {
            return Err(PaymentError::Declined(format!(
                "cannot charge a negative amount ({})",
                amount
            )));
        }
        tokio::time::sleep(self.delay).await;
        info!(
            "Simulated payment of {} for borrower {} approved ({})",
            amount, borrower_id, idempotency_key
        );
        Ok(PaymentAuthorization {
            reference: idempotency_key,
        })
    }
}
