use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::ServiceRecord;

use super::{ChunkSource, TimeWindow};

/// Service catalog reference data; full-replace shape on load.
pub struct ServiceExtractor {
    pool: DbPool,
}

impl ServiceExtractor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const QUERY: &str = r#"
    SELECT
        id AS service_id,
        name,
        category,
        price,
        duration_minutes,
        updated_at
    FROM services
    WHERE is_active
    ORDER BY id
    LIMIT $1 OFFSET $2
"#;

impl ChunkSource for ServiceExtractor {
    type Record = ServiceRecord;

    fn entity(&self) -> &'static str {
        "services"
    }

    async fn fetch_chunk(
        &self,
        _window: Option<&TimeWindow>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ServiceRecord>> {
        sqlx::query_as::<_, ServiceRecord>(QUERY)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| EtlError::DataSource(format!("service extract: {err}")))
    }

    async fn last_update_time(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(updated_at) FROM services WHERE is_active",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|err| EtlError::DataSource(format!("service watermark: {err}")))
    }
}
