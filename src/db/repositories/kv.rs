use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::OnConflict,
};

use crate::entities::kv_entries;

/// Table-backed key/value rows with optional expiry (unix seconds).
pub struct KvRepository {
    conn: DatabaseConnection,
}

impl KvRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn live(now: i64) -> Condition {
        Condition::any()
            .add(kv_entries::Column::ExpiresAt.is_null())
            .add(kv_entries::Column::ExpiresAt.gt(now))
    }

    pub async fn get(&self, key: &str, now: i64) -> Result<Option<String>> {
        let row = kv_entries::Entity::find_by_id(key.to_string())
            .filter(Self::live(now))
            .one(&self.conn)
            .await
            .context("Failed to read kv entry")?;

        Ok(row.map(|r| r.value))
    }

    pub async fn set(&self, key: &str, value: &str, expires_at: Option<i64>) -> Result<()> {
        kv_entries::Entity::insert(kv_entries::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            expires_at: Set(expires_at),
        })
        .on_conflict(
            OnConflict::column(kv_entries::Column::Key)
                .update_columns([kv_entries::Column::Value, kv_entries::Column::ExpiresAt])
                .to_owned(),
        )
        .exec(&self.conn)
        .await
        .context("Failed to write kv entry")?;

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        kv_entries::Entity::delete_by_id(key.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete kv entry")?;
        Ok(())
    }

    pub async fn purge_expired(&self, now: i64) -> Result<u64> {
        let result = kv_entries::Entity::delete_many()
            .filter(kv_entries::Column::ExpiresAt.is_not_null())
            .filter(kv_entries::Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to purge expired kv entries")?;

        Ok(result.rows_affected)
    }
}
