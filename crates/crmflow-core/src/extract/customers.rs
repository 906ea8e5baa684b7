use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::CustomerRecord;

use super::{ChunkSource, TimeWindow};

/// Pulls active customers, incrementally filtered on `updated_at`.
pub struct CustomerExtractor {
    pool: DbPool,
}

impl CustomerExtractor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const WINDOWED_QUERY: &str = r#"
    SELECT
        id AS customer_id,
        name,
        phone,
        email,
        birth_date,
        gender,
        shop_id,
        created_at,
        updated_at
    FROM customers
    WHERE is_active
      AND updated_at >= $1
      AND updated_at < $2
    ORDER BY id
    LIMIT $3 OFFSET $4
"#;

const FULL_QUERY: &str = r#"
    SELECT
        id AS customer_id,
        name,
        phone,
        email,
        birth_date,
        gender,
        shop_id,
        created_at,
        updated_at
    FROM customers
    WHERE is_active
    ORDER BY id
    LIMIT $1 OFFSET $2
"#;

impl ChunkSource for CustomerExtractor {
    type Record = CustomerRecord;

    fn entity(&self) -> &'static str {
        "customer_analytics"
    }

    async fn fetch_chunk(
        &self,
        window: Option<&TimeWindow>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<CustomerRecord>> {
        let query = match window {
            Some(window) => sqlx::query_as::<_, CustomerRecord>(WINDOWED_QUERY)
                .bind(window.start)
                .bind(window.end)
                .bind(limit)
                .bind(offset),
            None => sqlx::query_as::<_, CustomerRecord>(FULL_QUERY)
                .bind(limit)
                .bind(offset),
        };

        query
            .fetch_all(&self.pool)
            .await
            .map_err(|err| EtlError::DataSource(format!("customer extract: {err}")))
    }

    async fn last_update_time(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(updated_at) FROM customers WHERE is_active",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|err| EtlError::DataSource(format!("customer watermark: {err}")))
    }
}
