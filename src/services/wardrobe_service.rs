use sqlx::Row;
use uuid::Uuid;

use crate::db::{sqlite_uuid, DatabasePool};
use crate::error::{AppError, AppResult};
use crate::models::WardrobeListing;
use crate::services::pricing::parse_price;

pub struct WardrobeService {
    db: DatabasePool,
}

impl WardrobeService {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// Looks up a listing together with its owner's display name.
    pub async fn get_listing(&self, id: Uuid) -> AppResult<WardrobeListing> {
        match &self.db {
            DatabasePool::Postgres(pool) => {
                let row = sqlx::query(
                    r#"
                    SELECT w.id, w.owner_id, w.name, w.price_per_day::TEXT AS price_per_day,
                           p.username AS owner_username
                    FROM wardrobe_items w
                    INNER JOIN profiles p ON p.id = w.owner_id
                    WHERE w.id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Wardrobe item {} not found", id)))?;

                let price: Option<String> = row.try_get("price_per_day")?;
                Ok(WardrobeListing {
                    id: row.try_get("id")?,
                    owner_id: row.try_get("owner_id")?,
                    owner_username: row.try_get("owner_username")?,
                    name: row.try_get("name")?,
                    price_per_day: price.as_deref().and_then(parse_price),
                })
            }
            DatabasePool::Sqlite(pool) => {
                let row = sqlx::query(
                    r#"
                    SELECT w.id, w.owner_id, w.name, w.price_per_day,
                           p.username AS owner_username
                    FROM wardrobe_items w
                    INNER JOIN profiles p ON p.id = w.owner_id
                    WHERE w.id = ?1
                    "#,
                )
                .bind(id.to_string())
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Wardrobe item {} not found", id)))?;

                let price: Option<String> = row.try_get("price_per_day")?;
                Ok(WardrobeListing {
                    id: sqlite_uuid(&row, "id")?,
                    owner_id: sqlite_uuid(&row, "owner_id")?,
                    owner_username: row.try_get("owner_username")?,
                    name: row.try_get("name")?,
                    price_per_day: price.as_deref().and_then(parse_price),
                })
            }
        }
    }
}
