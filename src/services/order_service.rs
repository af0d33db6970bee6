use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::db::{sqlite_decimal, sqlite_uuid, DatabasePool};
use crate::error::{AppError, AppResult};
use crate::models::{
    step_label, ChecklistStep, DeliveryMethod, LenderDecision, LenderRequest, Notification,
    NotificationsListResponse, Order, OrderItem, OrderStatus, OrderWithItems, CHECKLIST_STEPS,
};

const ORDER_COLUMNS: &str = "id, borrower_id, trip_city, start_date, end_date, status, \
     total_price, delivery_method, request_token, created_at, updated_at";

fn parse_status(raw: String) -> AppResult<OrderStatus> {
    raw.parse().map_err(AppError::InternalServerError)
}

fn parse_delivery(raw: String) -> AppResult<DeliveryMethod> {
    raw.parse().map_err(AppError::InternalServerError)
}

fn order_from_pg(row: &PgRow) -> AppResult<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        borrower_id: row.try_get("borrower_id")?,
        trip_city: row.try_get("trip_city")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status: parse_status(row.try_get("status")?)?,
        total_price: row.try_get("total_price")?,
        delivery_method: parse_delivery(row.try_get("delivery_method")?)?,
        request_token: row.try_get("request_token")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn order_from_sqlite(row: &SqliteRow) -> AppResult<Order> {
    Ok(Order {
        id: sqlite_uuid(row, "id")?,
        borrower_id: sqlite_uuid(row, "borrower_id")?,
        trip_city: row.try_get("trip_city")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status: parse_status(row.try_get("status")?)?,
        total_price: sqlite_decimal(row, "total_price")?,
        delivery_method: parse_delivery(row.try_get("delivery_method")?)?,
        request_token: sqlite_uuid(row, "request_token")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn item_from_pg(row: &PgRow) -> AppResult<OrderItem> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        item_id: row.try_get("item_id")?,
        item_name: row.try_get("item_name")?,
        lender_id: row.try_get("lender_id")?,
        price: row.try_get("price")?,
        status: parse_status(row.try_get("status")?)?,
    })
}

fn item_from_sqlite(row: &SqliteRow) -> AppResult<OrderItem> {
    Ok(OrderItem {
        id: sqlite_uuid(row, "id")?,
        order_id: sqlite_uuid(row, "order_id")?,
        item_id: sqlite_uuid(row, "item_id")?,
        item_name: row.try_get("item_name")?,
        lender_id: sqlite_uuid(row, "lender_id")?,
        price: sqlite_decimal(row, "price")?,
        status: parse_status(row.try_get("status")?)?,
    })
}

fn sort_checklist(steps: &mut [ChecklistStep]) {
    steps.sort_by_key(|step| {
        CHECKLIST_STEPS
            .iter()
            .position(|(key, _)| *key == step.step_key)
            .unwrap_or(usize::MAX)
    });
}

/// Order lifecycle after checkout: borrower history and cancellation, lender
/// responses, the hand-off checklist and lender notifications.
pub struct OrderService {
    db: DatabasePool,
}

impl OrderService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Order> {
        match &self.db {
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
                order_from_pg(&row)
            }
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS))
                    .bind(id.to_string())
                    .fetch_optional(pool)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
                order_from_sqlite(&row)
            }
        }
    }

    async fn find_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
        match &self.db {
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT oi.id, oi.order_id, oi.item_id, w.name AS item_name,
                           oi.lender_id, oi.price, oi.status
                    FROM order_items oi
                    LEFT JOIN wardrobe_items w ON w.id = oi.item_id
                    WHERE oi.order_id = $1
                    ORDER BY w.name
                    "#,
                )
                .bind(order_id)
                .fetch_all(pool)
                .await?;
                rows.iter().map(item_from_pg).collect()
            }
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT oi.id, oi.order_id, oi.item_id, w.name AS item_name,
                           oi.lender_id, oi.price, oi.status
                    FROM order_items oi
                    LEFT JOIN wardrobe_items w ON w.id = oi.item_id
                    WHERE oi.order_id = ?1
                    ORDER BY w.name
                    "#,
                )
                .bind(order_id.to_string())
                .fetch_all(pool)
                .await?;
                rows.iter().map(item_from_sqlite).collect()
            }
        }
    }

    /// Fails with `Forbidden` unless the lender owns at least one item in the order.
    async fn ensure_lender(&self, lender_id: Uuid, order_id: Uuid) -> AppResult<()> {
        let count: i64 = match &self.db {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    "SELECT COUNT(*) AS count FROM order_items WHERE order_id = $1 AND lender_id = $2",
                )
                .bind(order_id)
                .bind(lender_id)
                .fetch_one(pool)
                .await?
                .try_get("count")?
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    "SELECT COUNT(*) AS count FROM order_items WHERE order_id = ?1 AND lender_id = ?2",
                )
                .bind(order_id.to_string())
                .bind(lender_id.to_string())
                .fetch_one(pool)
                .await?
                .try_get("count")?
            }
        };
        if count == 0 {
            return Err(AppError::Forbidden(format!(
                "Order {} has no items from this lender",
                order_id
            )));
        }
        Ok(())
    }

    /// Moves `order` to `to`, failing if its stored status changed since it was read.
    async fn transition(&self, order: &Order, to: OrderStatus) -> AppResult<()> {
        if !order.status.can_transition_to(to) {
            return Err(AppError::BadRequest(format!(
                "Order is {} and cannot become {}",
                order.status, to
            )));
        }
        let now = Utc::now();
        let affected = match &self.db {
            DatabasePool::Postgres(pool) => sqlx::query(
                "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
            )
            .bind(to.as_str())
            .bind(now)
            .bind(order.id)
            .bind(order.status.as_str())
            .execute(pool)
            .await?
            .rows_affected(),
            DatabasePool::Sqlite(pool) => sqlx::query(
                "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            )
            .bind(to.as_str())
            .bind(now)
            .bind(order.id.to_string())
            .bind(order.status.as_str())
            .execute(pool)
            .await?
            .rows_affected(),
        };
        if affected == 0 {
            return Err(AppError::Conflict(format!(
                "Order {} changed while updating; reload and try again",
                order.id
            )));
        }
        info!("Order {} moved from {} to {}", order.id, order.status, to);
        Ok(())
    }

    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> AppResult<OrderWithItems> {
        let order = self.find_order(order_id).await?;
        let items = self.find_items(order_id).await?;
        let involved =
            order.borrower_id == user_id || items.iter().any(|item| item.lender_id == user_id);
        if !involved {
            return Err(AppError::NotFound(format!("Order {} not found", order_id)));
        }
        Ok(OrderWithItems { order, items })
    }

    /// The borrower's orders, newest first.
    pub async fn list_borrower_orders(&self, borrower_id: Uuid) -> AppResult<Vec<OrderWithItems>> {
        let orders = match &self.db {
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::query(&format!(
                    "SELECT {} FROM orders WHERE borrower_id = $1 ORDER BY created_at DESC",
                    ORDER_COLUMNS
                ))
                .bind(borrower_id)
                .fetch_all(pool)
                .await?;
                rows.iter().map(order_from_pg).collect::<AppResult<Vec<_>>>()?
            }
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::query(&format!(
                    "SELECT {} FROM orders WHERE borrower_id = ?1 ORDER BY created_at DESC",
                    ORDER_COLUMNS
                ))
                .bind(borrower_id.to_string())
                .fetch_all(pool)
                .await?;
                rows.iter().map(order_from_sqlite).collect::<AppResult<Vec<_>>>()?
            }
        };

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.find_items(order.id).await?;
            result.push(OrderWithItems { order, items });
        }
        Ok(result)
    }

    pub async fn cancel_order(&self, borrower_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        let order = self.find_order(order_id).await?;
        if order.borrower_id != borrower_id {
            return Err(AppError::NotFound(format!("Order {} not found", order_id)));
        }
        self.transition(&order, OrderStatus::Cancelled).await?;
        self.find_order(order_id).await
    }

    /// Incoming requests for a lender, one entry per order holding only the
    /// lender's own items, newest first.
    pub async fn lender_requests(&self, lender_id: Uuid) -> AppResult<Vec<LenderRequest>> {
        let mut requests: Vec<LenderRequest> = Vec::new();

        macro_rules! group_rows {
            ($rows:expr, $uuid:expr, $item:expr) => {
                for row in $rows.iter() {
                    let order_id = $uuid(row, "order_id")?;
                    let item = $item(row)?;
                    match requests.iter_mut().find(|r| r.order_id == order_id) {
                        Some(request) => request.items.push(item),
                        None => requests.push(LenderRequest {
                            order_id,
                            borrower_id: $uuid(row, "borrower_id")?,
                            borrower_username: row.try_get("borrower_username")?,
                            trip_city: row.try_get("trip_city")?,
                            start_date: row.try_get("start_date")?,
                            end_date: row.try_get("end_date")?,
                            delivery_method: parse_delivery(row.try_get("delivery_method")?)?,
                            status: parse_status(row.try_get("order_status")?)?,
                            items: vec![item],
                        }),
                    }
                }
            };
        }

        match &self.db {
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT oi.id, oi.order_id, oi.item_id, w.name AS item_name,
                           oi.lender_id, oi.price, oi.status,
                           o.borrower_id, p.username AS borrower_username, o.trip_city,
                           o.start_date, o.end_date, o.delivery_method, o.status AS order_status
                    FROM order_items oi
                    INNER JOIN orders o ON o.id = oi.order_id
                    INNER JOIN profiles p ON p.id = o.borrower_id
                    LEFT JOIN wardrobe_items w ON w.id = oi.item_id
                    WHERE oi.lender_id = $1
                    ORDER BY o.created_at DESC
                    "#,
                )
                .bind(lender_id)
                .fetch_all(pool)
                .await?;
                let pg_uuid = |row: &PgRow, column: &str| -> AppResult<Uuid> {
                    Ok(row.try_get(column)?)
                };
                group_rows!(rows, pg_uuid, item_from_pg);
            }
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT oi.id, oi.order_id, oi.item_id, w.name AS item_name,
                           oi.lender_id, oi.price, oi.status,
                           o.borrower_id, p.username AS borrower_username, o.trip_city,
                           o.start_date, o.end_date, o.delivery_method, o.status AS order_status
                    FROM order_items oi
                    INNER JOIN orders o ON o.id = oi.order_id
                    INNER JOIN profiles p ON p.id = o.borrower_id
                    LEFT JOIN wardrobe_items w ON w.id = oi.item_id
                    WHERE oi.lender_id = ?1
                    ORDER BY o.created_at DESC
                    "#,
                )
                .bind(lender_id.to_string())
                .fetch_all(pool)
                .await?;
                group_rows!(rows, sqlite_uuid, item_from_sqlite);
            }
        }

        Ok(requests)
    }

    /// Lender accepts or rejects. Their items, the order status and their
    /// notifications for the order are updated together.
    pub async fn respond(
        &self,
        lender_id: Uuid,
        order_id: Uuid,
        decision: LenderDecision,
    ) -> AppResult<Order> {
        self.ensure_lender(lender_id, order_id).await?;
        let order = self.find_order(order_id).await?;
        let next = OrderStatus::from(decision);
        if !order.status.can_transition_to(next) {
            return Err(AppError::BadRequest(format!(
                "Order is {} and cannot become {}",
                order.status, next
            )));
        }

        let now = Utc::now();
        let affected = match &self.db {
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let affected = sqlx::query(
                    "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
                )
                .bind(next.as_str())
                .bind(now)
                .bind(order_id)
                .bind(order.status.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
                sqlx::query(
                    "UPDATE order_items SET status = $1 WHERE order_id = $2 AND lender_id = $3",
                )
                .bind(next.as_str())
                .bind(order_id)
                .bind(lender_id)
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND order_id = $2",
                )
                .bind(lender_id)
                .bind(order_id)
                .execute(&mut *tx)
                .await?;
                if affected == 1 {
                    tx.commit().await?;
                }
                affected
            }
            DatabasePool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                let affected = sqlx::query(
                    "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                )
                .bind(next.as_str())
                .bind(now)
                .bind(order_id.to_string())
                .bind(order.status.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
                sqlx::query(
                    "UPDATE order_items SET status = ?1 WHERE order_id = ?2 AND lender_id = ?3",
                )
                .bind(next.as_str())
                .bind(order_id.to_string())
                .bind(lender_id.to_string())
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND order_id = ?2",
                )
                .bind(lender_id.to_string())
                .bind(order_id.to_string())
                .execute(&mut *tx)
                .await?;
                if affected == 1 {
                    tx.commit().await?;
                }
                affected
            }
        };

        if affected == 0 {
            return Err(AppError::Conflict(format!(
                "Order {} changed while responding; reload and try again",
                order_id
            )));
        }
        info!("Lender {} {} order {}", lender_id, next, order_id);
        self.find_order(order_id).await
    }

    /// Checklist for an order, creating the fixed steps the first time it is read.
    pub async fn checklist(&self, lender_id: Uuid, order_id: Uuid) -> AppResult<Vec<ChecklistStep>> {
        self.ensure_lender(lender_id, order_id).await?;
        let now = Utc::now();

        let mut steps = match &self.db {
            DatabasePool::Postgres(pool) => {
                for (step_key, _) in CHECKLIST_STEPS {
                    sqlx::query(
                        r#"
                        INSERT INTO order_checklist (id, order_id, step_key, completed, updated_at)
                        VALUES ($1, $2, $3, FALSE, $4)
                        ON CONFLICT (order_id, step_key) DO NOTHING
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(order_id)
                    .bind(step_key)
                    .bind(now)
                    .execute(pool)
                    .await?;
                }
                let rows = sqlx::query(
                    "SELECT id, order_id, step_key, completed, updated_at FROM order_checklist WHERE order_id = $1",
                )
                .bind(order_id)
                .fetch_all(pool)
                .await?;
                rows.iter()
                    .map(|row| -> AppResult<ChecklistStep> {
                        let step_key: String = row.try_get("step_key")?;
                        Ok(ChecklistStep {
                            id: row.try_get("id")?,
                            order_id: row.try_get("order_id")?,
                            label: step_label(&step_key),
                            step_key,
                            completed: row.try_get("completed")?,
                            updated_at: row.try_get("updated_at")?,
                        })
                    })
                    .collect::<AppResult<Vec<_>>>()?
            }
            DatabasePool::Sqlite(pool) => {
                for (step_key, _) in CHECKLIST_STEPS {
                    sqlx::query(
                        r#"
                        INSERT INTO order_checklist (id, order_id, step_key, completed, updated_at)
                        VALUES (?1, ?2, ?3, 0, ?4)
                        ON CONFLICT (order_id, step_key) DO NOTHING
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(order_id.to_string())
                    .bind(step_key)
                    .bind(now)
                    .execute(pool)
                    .await?;
                }
                let rows = sqlx::query(
                    "SELECT id, order_id, step_key, completed, updated_at FROM order_checklist WHERE order_id = ?1",
                )
                .bind(order_id.to_string())
                .fetch_all(pool)
                .await?;
                rows.iter()
                    .map(|row| -> AppResult<ChecklistStep> {
                        let step_key: String = row.try_get("step_key")?;
                        Ok(ChecklistStep {
                            id: sqlite_uuid(row, "id")?,
                            order_id: sqlite_uuid(row, "order_id")?,
                            label: step_label(&step_key),
                            step_key,
                            completed: row.try_get("completed")?,
                            updated_at: row.try_get("updated_at")?,
                        })
                    })
                    .collect::<AppResult<Vec<_>>>()?
            }
        };

        sort_checklist(&mut steps);
        Ok(steps)
    }

    pub async fn toggle_step(
        &self,
        lender_id: Uuid,
        order_id: Uuid,
        step_key: &str,
    ) -> AppResult<Vec<ChecklistStep>> {
        if step_label(step_key).is_none() {
            return Err(AppError::BadRequest(format!(
                "Unknown checklist step: {}",
                step_key
            )));
        }
        let order = self.find_order(order_id).await?;
        if order.status != OrderStatus::Accepted {
            return Err(AppError::BadRequest(format!(
                "Checklist can only change while the order is accepted (currently {})",
                order.status
            )));
        }
        // Seeds the steps on first use and checks the lender.
        self.checklist(lender_id, order_id).await?;

        let now = Utc::now();
        match &self.db {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE order_checklist SET completed = NOT completed, updated_at = $1 WHERE order_id = $2 AND step_key = $3",
                )
                .bind(now)
                .bind(order_id)
                .bind(step_key)
                .execute(pool)
                .await?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE order_checklist SET completed = NOT completed, updated_at = ?1 WHERE order_id = ?2 AND step_key = ?3",
                )
                .bind(now)
                .bind(order_id.to_string())
                .bind(step_key)
                .execute(pool)
                .await?;
            }
        }

        self.checklist(lender_id, order_id).await
    }

    /// Accepted orders become ready once every checklist step is done.
    pub async fn mark_ready(&self, lender_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        let steps = self.checklist(lender_id, order_id).await?;
        if !steps.iter().all(|step| step.completed) {
            return Err(AppError::BadRequest(
                "Please complete all checklist steps before marking as ready.".to_string(),
            ));
        }
        let order = self.find_order(order_id).await?;
        self.transition(&order, OrderStatus::Ready).await?;
        self.find_order(order_id).await
    }

    pub async fn list_notifications(&self, recipient_id: Uuid) -> AppResult<NotificationsListResponse> {
        let notifications = match &self.db {
            DatabasePool::Postgres(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT id, recipient_id, order_id, message, is_read, created_at
                    FROM notifications
                    WHERE recipient_id = $1
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(recipient_id)
                .fetch_all(pool)
                .await?;
                rows.iter()
                    .map(|row| -> AppResult<Notification> {
                        Ok(Notification {
                            id: row.try_get("id")?,
                            recipient_id: row.try_get("recipient_id")?,
                            order_id: row.try_get("order_id")?,
                            message: row.try_get("message")?,
                            is_read: row.try_get("is_read")?,
                            created_at: row.try_get("created_at")?,
                        })
                    })
                    .collect::<AppResult<Vec<_>>>()?
            }
            DatabasePool::Sqlite(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT id, recipient_id, order_id, message, is_read, created_at
                    FROM notifications
                    WHERE recipient_id = ?1
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(recipient_id.to_string())
                .fetch_all(pool)
                .await?;
                rows.iter()
                    .map(|row| -> AppResult<Notification> {
                        Ok(Notification {
                            id: sqlite_uuid(row, "id")?,
                            recipient_id: sqlite_uuid(row, "recipient_id")?,
                            order_id: sqlite_uuid(row, "order_id")?,
                            message: row.try_get("message")?,
                            is_read: row.try_get("is_read")?,
                            created_at: row.try_get("created_at")?,
                        })
                    })
                    .collect::<AppResult<Vec<_>>>()?
            }
        };

        let unread = notifications.iter().filter(|n| !n.is_read).count() as i64;
        Ok(NotificationsListResponse {
            notifications,
            unread,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::NaiveDate;
    use sqlx::SqlitePool;

    struct Fixture {
        service: OrderService,
        pool: SqlitePool,
        borrower: Uuid,
        lender_a: Uuid,
        lender_b: Uuid,
        order_id: Uuid,
    }

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

    async fn insert_item(pool: &SqlitePool, owner: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO wardrobe_items (id, owner_id, name, price_per_day) VALUES (?1, ?2, ?3, '10')",
        )
        .bind(id.to_string())
        .bind(owner.to_string())
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn insert_order(pool: &SqlitePool, borrower: Uuid, lines: &[(Uuid, Uuid)]) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO orders (id, borrower_id, trip_city, start_date, end_date, status,
                                total_price, delivery_method, request_token, created_at, updated_at)
            VALUES (?1, ?2, 'Lisbon', ?3, ?4, 'pending', '60', 'meetup', ?5, ?6, ?6)
            "#,
        )
        .bind(id.to_string())
        .bind(borrower.to_string())
        .bind(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        .bind(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap())
        .bind(Uuid::new_v4().to_string())
        .bind(now)
        .execute(pool)
        .await
        .unwrap();

        for (item_id, lender_id) in lines {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, item_id, lender_id, price, status) VALUES (?1, ?2, ?3, ?4, '30', 'pending')",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(id.to_string())
            .bind(item_id.to_string())
            .bind(lender_id.to_string())
            .execute(pool)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO notifications (id, recipient_id, order_id, message, is_read, created_at) VALUES (?1, ?2, ?3, 'New rental request', 0, ?4)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(lender_id.to_string())
            .bind(id.to_string())
            .bind(now)
            .execute(pool)
            .await
            .unwrap();
        }
        id
    }

    async fn fixture() -> Fixture {
        let db = test_pool().await;
        let DatabasePool::Sqlite(pool) = db.clone() else {
            unreachable!()
        };
        let borrower = insert_profile(&pool, "maya").await;
        let lender_a = insert_profile(&pool, "ines").await;
        let lender_b = insert_profile(&pool, "tomas").await;
        let coat = insert_item(&pool, lender_a, "Wool coat").await;
        let boots = insert_item(&pool, lender_b, "Hiking boots").await;
        let order_id = insert_order(&pool, borrower, &[(coat, lender_a), (boots, lender_b)]).await;

        Fixture {
            service: OrderService::new(db),
            pool,
            borrower,
            lender_a,
            lender_b,
            order_id,
        }
    }

    async fn item_statuses(pool: &SqlitePool, order_id: Uuid, lender_id: Uuid) -> Vec<String> {
        sqlx::query("SELECT status FROM order_items WHERE order_id = ?1 AND lender_id = ?2")
            .bind(order_id.to_string())
            .bind(lender_id.to_string())
            .fetch_all(pool)
            .await
            .unwrap()
            .iter()
            .map(|row| row.get::<String, _>("status"))
            .collect()
    }

    #[tokio::test]
    async fn borrower_sees_order_with_items() {
        let f = fixture().await;

        let orders = f.service.list_borrower_orders(f.borrower).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order.id, f.order_id);
        assert_eq!(orders[0].order.total_price, rust_decimal::Decimal::from(60));
        assert_eq!(orders[0].items.len(), 2);

        let detail = f.service.get_order(f.lender_a, f.order_id).await.unwrap();
        assert_eq!(detail.items.len(), 2);
    }

    #[tokio::test]
    async fn strangers_cannot_read_an_order() {
        let f = fixture().await;
        let err = f
            .service
            .get_order(Uuid::new_v4(), f.order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn lender_inbox_only_holds_their_items() {
        let f = fixture().await;

        let requests = f.service.lender_requests(f.lender_a).await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].order_id, f.order_id);
        assert_eq!(requests[0].borrower_username.as_deref(), Some("maya"));
        assert_eq!(requests[0].items.len(), 1);
        assert_eq!(requests[0].items[0].item_name.as_deref(), Some("Wool coat"));
    }

    #[tokio::test]
    async fn accepting_updates_items_order_and_notifications() {
        let f = fixture().await;

        let order = f
            .service
            .respond(f.lender_a, f.order_id, LenderDecision::Accepted)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(item_statuses(&f.pool, f.order_id, f.lender_a).await, vec!["accepted"]);
        assert_eq!(item_statuses(&f.pool, f.order_id, f.lender_b).await, vec!["pending"]);

        let inbox = f.service.list_notifications(f.lender_a).await.unwrap();
        assert_eq!(inbox.unread, 0);
        let other = f.service.list_notifications(f.lender_b).await.unwrap();
        assert_eq!(other.unread, 1);
    }

    #[tokio::test]
    async fn uninvolved_lender_cannot_respond() {
        let f = fixture().await;
        let outsider = insert_profile(&f.pool, "rui").await;

        let err = f
            .service
            .respond(outsider, f.order_id, LenderDecision::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rejected_order_cannot_be_accepted() {
        let f = fixture().await;
        f.service
            .respond(f.lender_a, f.order_id, LenderDecision::Rejected)
            .await
            .unwrap();

        let err = f
            .service
            .respond(f.lender_b, f.order_id, LenderDecision::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn borrower_cancels_pending_order() {
        let f = fixture().await;

        let err = f
            .service
            .cancel_order(f.lender_a, f.order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let order = f.service.cancel_order(f.borrower, f.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        let err = f
            .service
            .cancel_order(f.borrower, f.order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn checklist_is_seeded_in_order() {
        let f = fixture().await;

        let steps = f.service.checklist(f.lender_a, f.order_id).await.unwrap();
        let keys: Vec<&str> = steps.iter().map(|s| s.step_key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["clean_items", "pack_items", "confirm_location", "contact_borrower"]
        );
        assert!(steps.iter().all(|s| !s.completed));

        // Reading again does not duplicate.
        let again = f.service.checklist(f.lender_a, f.order_id).await.unwrap();
        assert_eq!(again.len(), 4);
    }

    #[tokio::test]
    async fn toggling_requires_an_accepted_order() {
        let f = fixture().await;
        let err = f
            .service
            .toggle_step(f.lender_a, f.order_id, "clean_items")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn ready_needs_every_step_complete() {
        let f = fixture().await;
        f.service
            .respond(f.lender_a, f.order_id, LenderDecision::Accepted)
            .await
            .unwrap();

        let err = f.service.mark_ready(f.lender_a, f.order_id).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        for (key, _) in CHECKLIST_STEPS {
            f.service
                .toggle_step(f.lender_a, f.order_id, key)
                .await
                .unwrap();
        }
        let steps = f
            .service
            .toggle_step(f.lender_a, f.order_id, "pack_items")
            .await
            .unwrap();
        assert!(!steps[1].completed);
        f.service
            .toggle_step(f.lender_a, f.order_id, "pack_items")
            .await
            .unwrap();

        let order = f.service.mark_ready(f.lender_a, f.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Ready);
    }

    #[tokio::test]
    async fn unknown_step_is_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .toggle_step(f.lender_a, f.order_id, "polish_shoes")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
