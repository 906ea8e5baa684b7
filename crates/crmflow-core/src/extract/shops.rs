use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::ShopRecord;

use super::{ChunkSource, TimeWindow};

/// Shop reference data. Small and slowly changing, so the window is
/// ignored and the loader uses the full-replace shape.
pub struct ShopExtractor {
    pool: DbPool,
}

impl ShopExtractor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const QUERY: &str = r#"
    SELECT
        id AS shop_id,
        name,
        address,
        phone,
        updated_at
    FROM shops
    ORDER BY id
    LIMIT $1 OFFSET $2
"#;

impl ChunkSource for ShopExtractor {
    type Record = ShopRecord;

    fn entity(&self) -> &'static str {
        "shops"
    }

    async fn fetch_chunk(
        &self,
        _window: Option<&TimeWindow>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ShopRecord>> {
        sqlx::query_as::<_, ShopRecord>(QUERY)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| EtlError::DataSource(format!("shop extract: {err}")))
    }

    async fn last_update_time(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>("SELECT MAX(updated_at) FROM shops")
            .fetch_one(&self.pool)
            .await
            .map_err(|err| EtlError::DataSource(format!("shop watermark: {err}")))
    }
}
