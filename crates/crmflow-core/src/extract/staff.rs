use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::StaffRecord;

use super::{ChunkSource, TimeWindow};

/// Staff reference data; full-replace shape on load.
pub struct StaffExtractor {
    pool: DbPool,
}

impl StaffExtractor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const QUERY: &str = r#"
    SELECT
        id AS staff_id,
        name,
        shop_id,
        role,
        updated_at
    FROM staff
    ORDER BY id
    LIMIT $1 OFFSET $2
"#;

impl ChunkSource for StaffExtractor {
    type Record = StaffRecord;

    fn entity(&self) -> &'static str {
        "staff"
    }

    async fn fetch_chunk(
        &self,
        _window: Option<&TimeWindow>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<StaffRecord>> {
        sqlx::query_as::<_, StaffRecord>(QUERY)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| EtlError::DataSource(format!("staff extract: {err}")))
    }

    async fn last_update_time(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>("SELECT MAX(updated_at) FROM staff")
            .fetch_one(&self.pool)
            .await
            .map_err(|err| EtlError::DataSource(format!("staff watermark: {err}")))
    }
}
