use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::db::DatabasePool;
use crate::services::data_service::{
    DataError, DataService, Identity, NewNotification, NewOrder, NewOrderItem, OrderWriter,
    PlacedOrder,
};

/// [`DataService`] backed by the service's own database. Each checkout runs
/// in one database transaction.
pub struct SqlDataService {
    db: DatabasePool,
}

impl SqlDataService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }
}

fn check_expiry(expires_at: Option<DateTime<Utc>>) -> Result<(), DataError> {
    match expires_at {
        Some(at) if at <= Utc::now() => Err(DataError::SessionExpired),
        _ => Ok(()),
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, DataError> {
    Uuid::parse_str(raw).map_err(|e| DataError::Decode(e.to_string()))
}

fn open<'a, DB: sqlx::Database>(
    tx: &'a mut Option<Transaction<'static, DB>>,
) -> Result<&'a mut Transaction<'static, DB>, DataError> {
    tx.as_mut().ok_or(DataError::Closed)
}

#[async_trait]
impl DataService for SqlDataService {
    async fn current_identity(&self, access_token: &str) -> Result<Identity, DataError> {
        match &self.db {
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query(
                    r#"
                    SELECT p.id, p.email, s.expires_at
                    FROM auth_sessions s
                    INNER JOIN profiles p ON p.id = s.user_id
                    WHERE s.token = $1
                    "#,
                )
                .bind(access_token)
                .fetch_optional(pool)
                .await?
                .ok_or(DataError::Unauthenticated)?;

                check_expiry(row.try_get("expires_at")?)?;
                Ok(Identity {
                    user_id: row.try_get("id")?,
                    email: row.try_get("email")?,
                })
            }
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query(
                    r#"
                    SELECT p.id, p.email, s.expires_at
                    FROM auth_sessions s
                    INNER JOIN profiles p ON p.id = s.user_id
                    WHERE s.token = ?1
                    "#,
                )
                .bind(access_token)
                .fetch_optional(pool)
                .await?
                .ok_or(DataError::Unauthenticated)?;

                check_expiry(row.try_get("expires_at")?)?;
                let id: String = row.try_get("id")?;
                Ok(Identity {
                    user_id: parse_uuid(&id)?,
                    email: row.try_get("email")?,
                })
            }
        }
    }

    async fn begin(&self) -> Result<Box<dyn OrderWriter>, DataError> {
        match &self.db {
            DatabasePool::Postgres(pool) => Ok(Box::new(PgOrderWriter {
                tx: Some(pool.begin().await?),
            })),
            DatabasePool::Sqlite(pool) => Ok(Box::new(SqliteOrderWriter {
                tx: Some(pool.begin().await?),
            })),
        }
    }
}

struct PgOrderWriter {
    tx: Option<Transaction<'static, Postgres>>,
}

#[async_trait]
impl OrderWriter for PgOrderWriter {
    async fn find_order_by_token(
        &mut self,
        borrower_id: Uuid,
        request_token: Uuid,
    ) -> Result<Option<PlacedOrder>, DataError> {
        let tx = open(&mut self.tx)?;
        let row = sqlx::query(
            "SELECT id, total_price, start_date, end_date FROM orders \
             WHERE borrower_id = $1 AND request_token = $2",
        )
        .bind(borrower_id)
        .bind(request_token)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(|row| -> Result<PlacedOrder, DataError> {
            Ok(PlacedOrder {
                id: row.try_get("id")?,
                total_price: row.try_get("total_price")?,
                start_date: row.try_get("start_date")?,
                end_date: row.try_get("end_date")?,
            })
        })
        .transpose()
    }

    async fn create_order(&mut self, order: &NewOrder) -> Result<Uuid, DataError> {
        let tx = open(&mut self.tx)?;
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, borrower_id, trip_city, start_date, end_date, status,
                total_price, delivery_method, request_token, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9, $9)
            "#,
        )
        .bind(id)
        .bind(order.borrower_id)
        .bind(&order.trip_city)
        .bind(order.start_date)
        .bind(order.end_date)
        .bind(order.total_price)
        .bind(order.delivery_method.as_str())
        .bind(order.request_token)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        debug!("Inserted order {} inside transaction", id);
        Ok(id)
    }

    async fn create_order_items(
        &mut self,
        order_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<(), DataError> {
        let tx = open(&mut self.tx)?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, item_id, lender_id, price, status)
                VALUES ($1, $2, $3, $4, $5, 'pending')
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(item.item_id)
            .bind(item.lender_id)
            .bind(item.price)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn create_notifications(
        &mut self,
        notifications: &[NewNotification],
    ) -> Result<(), DataError> {
        let tx = open(&mut self.tx)?;
        let now = Utc::now();
        for notification in notifications {
            sqlx::query(
                r#"
                INSERT INTO notifications (id, recipient_id, order_id, message, is_read, created_at)
                VALUES ($1, $2, $3, $4, FALSE, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(notification.recipient_id)
            .bind(notification.order_id)
            .bind(&notification.message)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DataError> {
        self.tx.take().ok_or(DataError::Closed)?.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DataError> {
        self.tx.take().ok_or(DataError::Closed)?.rollback().await?;
        Ok(())
    }
}

struct SqliteOrderWriter {
    tx: Option<Transaction<'static, Sqlite>>,
}

#[async_trait]
impl OrderWriter for SqliteOrderWriter {
    async fn find_order_by_token(
        &mut self,
        borrower_id: Uuid,
        request_token: Uuid,
    ) -> Result<Option<PlacedOrder>, DataError> {
        let tx = open(&mut self.tx)?;
        let row = sqlx::query(
            "SELECT id, total_price, start_date, end_date FROM orders \
             WHERE borrower_id = ?1 AND request_token = ?2",
        )
        .bind(borrower_id.to_string())
        .bind(request_token.to_string())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(|row| -> Result<PlacedOrder, DataError> {
            let id: String = row.try_get("id")?;
            let total: String = row.try_get("total_price")?;
            Ok(PlacedOrder {
                id: parse_uuid(&id)?,
                total_price: Decimal::from_str(&total)
                    .map_err(|e| DataError::Decode(e.to_string()))?,
                start_date: row.try_get("start_date")?,
                end_date: row.try_get("end_date")?,
            })
        })
        .transpose()
    }

    async fn create_order(&mut self, order: &NewOrder) -> Result<Uuid, DataError> {
        let tx = open(&mut self.tx)?;
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, borrower_id, trip_city, start_date, end_date, status,
                total_price, delivery_method, request_token, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(id.to_string())
        .bind(order.borrower_id.to_string())
        .bind(&order.trip_city)
        .bind(order.start_date)
        .bind(order.end_date)
        .bind(order.total_price.to_string())
        .bind(order.delivery_method.as_str())
        .bind(order.request_token.to_string())
        .bind(now)
        .execute(&mut **tx)
        .await?;

        debug!("Inserted order {} inside transaction", id);
        Ok(id)
    }

    async fn create_order_items(
        &mut self,
        order_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<(), DataError> {
        let tx = open(&mut self.tx)?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, item_id, lender_id, price, status)
                VALUES (?1, ?2, ?3, ?4, ?5, 'pending')
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(order_id.to_string())
            .bind(item.item_id.to_string())
            .bind(item.lender_id.to_string())
            .bind(item.price.to_string())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn create_notifications(
        &mut self,
        notifications: &[NewNotification],
    ) -> Result<(), DataError> {
        let tx = open(&mut self.tx)?;
        let now = Utc::now();
        for notification in notifications {
            sqlx::query(
                r#"
                INSERT INTO notifications (id, recipient_id, order_id, message, is_read, created_at)
                VALUES (?1, ?2, ?3, ?4, 0, ?5)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(notification.recipient_id.to_string())
            .bind(notification.order_id.to_string())
            .bind(&notification.message)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DataError> {
        self.tx.take().ok_or(DataError::Closed)?.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DataError> {
        self.tx.take().ok_or(DataError::Closed)?.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::{CartItem, CheckoutRequest, DeliveryMethod, PaymentOption, Trip};
    use crate::services::{
        CartSession, CheckoutError, CheckoutService, NotificationPolicy, SimulatedPayment,
    };
    use chrono::NaiveDate;
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use std::time::Duration;

    async fn insert_profile(pool: &SqlitePool, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO profiles (id, email, username) VALUES (?1, ?2, ?3)")
            .bind(id.to_string())
            .bind(format!("{}@example.com", username))
            .bind(username)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn insert_listing(pool: &SqlitePool, owner: Uuid, name: &str, price: i64) -> CartItem {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO wardrobe_items (id, owner_id, name, price_per_day) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id.to_string())
        .bind(owner.to_string())
        .bind(name)
        .bind(price.to_string())
        .execute(pool)
        .await
        .unwrap();
        CartItem {
            id,
            name: name.to_string(),
            price_per_day: Some(Decimal::from(price)),
            lender_id: owner,
            lender_name: None,
        }
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap()
            .get("count")
    }

    async fn setup() -> (SqlitePool, CheckoutService, Uuid) {
        let db = test_pool().await;
        let DatabasePool::Sqlite(pool) = db.clone() else {
            unreachable!()
        };
        let borrower = insert_profile(&pool, "lea").await;
        sqlx::query("INSERT INTO auth_sessions (token, user_id) VALUES ('lea-token', ?1)")
            .bind(borrower.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let service = CheckoutService::new(
            Arc::new(SqlDataService::new(db)),
            Arc::new(SimulatedPayment::new(Duration::ZERO)),
            NotificationPolicy::PerItem,
        );
        (pool, service, borrower)
    }

    fn trip_session(items: Vec<CartItem>) -> CartSession {
        let session = CartSession::new();
        for item in items {
            session.add_item(item).unwrap();
        }
        session
            .set_trip(Trip {
                city: "Porto".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                end_date: NaiveDate::from_ymd_opt(2024, 1, 3),
            })
            .unwrap();
        session
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            delivery_method: DeliveryMethod::HotelDropoff,
            payment_option: PaymentOption::Now,
            request_token: None,
        }
    }

    #[tokio::test]
    async fn checkout_persists_order_items_and_notifications() {
        let (pool, service, borrower) = setup().await;
        let lender = insert_profile(&pool, "ines").await;
        let scarf = insert_listing(&pool, lender, "Silk scarf", 10).await;
        let parka = insert_listing(&pool, lender, "Parka", 20).await;
        let session = trip_session(vec![scarf, parka]);

        let receipt = service
            .checkout(&session, "lea-token", &request())
            .await
            .unwrap();

        assert_eq!(receipt.total_price, Decimal::from(90));
        assert_eq!(receipt.trip_days, 3);
        assert!(session.snapshot().is_empty());

        let row = sqlx::query("SELECT borrower_id, status, total_price FROM orders WHERE id = ?1")
            .bind(receipt.order_id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("borrower_id"), borrower.to_string());
        assert_eq!(row.get::<String, _>("status"), "pending");
        assert_eq!(row.get::<String, _>("total_price"), "90");

        let prices: Vec<String> =
            sqlx::query("SELECT price FROM order_items WHERE order_id = ?1 ORDER BY price")
                .bind(receipt.order_id.to_string())
                .fetch_all(&pool)
                .await
                .unwrap()
                .iter()
                .map(|row| row.get("price"))
                .collect();
        assert_eq!(prices, vec!["30", "60"]);
        assert_eq!(count(&pool, "notifications").await, 2);
    }

    #[tokio::test]
    async fn failed_item_write_leaves_no_order_behind() {
        let (pool, service, _) = setup().await;
        let lender = insert_profile(&pool, "ines").await;
        let scarf = insert_listing(&pool, lender, "Silk scarf", 10).await;
        // Lender that doesn't exist, so the order_items foreign key fails.
        let session = trip_session(vec![CartItem {
            lender_id: Uuid::new_v4(),
            ..scarf
        }]);

        let err = service
            .checkout(&session, "lea-token", &request())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::OrderItemsWrite(_)));
        assert_eq!(count(&pool, "orders").await, 0);
        assert_eq!(count(&pool, "order_items").await, 0);
        assert_eq!(session.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn retry_with_used_token_replays_stored_order() {
        let (pool, service, _) = setup().await;
        let lender = insert_profile(&pool, "ines").await;
        let scarf = insert_listing(&pool, lender, "Silk scarf", 10).await;
        let req = CheckoutRequest {
            request_token: Some(Uuid::new_v4()),
            ..request()
        };

        let first = service
            .checkout(&trip_session(vec![scarf]), "lea-token", &req)
            .await
            .unwrap();
        // A fresh session has no memory of the first attempt.
        let second = service
            .checkout(&CartSession::new(), "lea-token", &req)
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(second.order_id, first.order_id);
        assert_eq!(second.total_price, Decimal::from(30));
        assert_eq!(second.trip_days, 3);
        assert_eq!(count(&pool, "orders").await, 1);
        assert_eq!(count(&pool, "notifications").await, 1);
    }

    #[tokio::test]
    async fn closed_writer_refuses_further_work() {
        let (pool, _, borrower) = setup().await;
        let data = SqlDataService::new(DatabasePool::Sqlite(pool));
        let mut writer = data.begin().await.unwrap();
        writer.rollback().await.unwrap();

        assert!(matches!(
            writer.find_order_by_token(borrower, Uuid::new_v4()).await,
            Err(DataError::Closed)
        ));
        assert!(matches!(writer.commit().await, Err(DataError::Closed)));
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let (pool, service, borrower) = setup().await;
        sqlx::query("INSERT INTO auth_sessions (token, user_id, expires_at) VALUES ('old', ?1, ?2)")
            .bind(borrower.to_string())
            .bind(Utc::now() - chrono::Duration::hours(1))
            .execute(&pool)
            .await
            .unwrap();
        let lender = insert_profile(&pool, "ines").await;
        let scarf = insert_listing(&pool, lender, "Silk scarf", 10).await;
        let session = trip_session(vec![scarf]);

        let err = service
            .checkout(&session, "old", &request())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Authentication(_)));
        assert_eq!(count(&pool, "orders").await, 0);
    }
}
