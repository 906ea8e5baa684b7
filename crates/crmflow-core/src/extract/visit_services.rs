use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::VisitServiceRecord;

use super::{ChunkSource, TimeWindow};

/// Pulls visit-service line items with customer and service context.
///
/// Ordered by customer then service so one customer's rows stay contiguous
/// within a chunk, which the preference aggregation relies on.
pub struct VisitServiceExtractor {
    pool: DbPool,
}

impl VisitServiceExtractor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const WINDOWED_QUERY: &str = r#"
    SELECT
        vs.id AS visit_service_id,
        vs.visit_id,
        v.customer_id,
        vs.service_id,
        s.name AS service_name,
        s.category AS service_category,
        v.visit_date,
        vs.quantity,
        vs.final_price,
        vs.updated_at
    FROM visit_services vs
    INNER JOIN visits v ON v.id = vs.visit_id
    INNER JOIN services s ON s.id = vs.service_id
    WHERE v.status = 'completed'
      AND v.visit_date >= $1
      AND v.visit_date < $2
    ORDER BY v.customer_id, vs.service_id, vs.id
    LIMIT $3 OFFSET $4
"#;

const FULL_QUERY: &str = r#"
    SELECT
        vs.id AS visit_service_id,
        vs.visit_id,
        v.customer_id,
        vs.service_id,
        s.name AS service_name,
        s.category AS service_category,
        v.visit_date,
        vs.quantity,
        vs.final_price,
        vs.updated_at
    FROM visit_services vs
    INNER JOIN visits v ON v.id = vs.visit_id
    INNER JOIN services s ON s.id = vs.service_id
    WHERE v.status = 'completed'
    ORDER BY v.customer_id, vs.service_id, vs.id
    LIMIT $1 OFFSET $2
"#;

impl ChunkSource for VisitServiceExtractor {
    type Record = VisitServiceRecord;

    fn entity(&self) -> &'static str {
        "service_preferences"
    }

    async fn fetch_chunk(
        &self,
        window: Option<&TimeWindow>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<VisitServiceRecord>> {
        let query = match window {
            Some(window) => sqlx::query_as::<_, VisitServiceRecord>(WINDOWED_QUERY)
                .bind(window.start)
                .bind(window.end)
                .bind(limit)
                .bind(offset),
            None => sqlx::query_as::<_, VisitServiceRecord>(FULL_QUERY)
                .bind(limit)
                .bind(offset),
        };

        query
            .fetch_all(&self.pool)
            .await
            .map_err(|err| EtlError::DataSource(format!("visit-service extract: {err}")))
    }

    async fn last_update_time(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT MAX(vs.updated_at)
            FROM visit_services vs
            INNER JOIN visits v ON v.id = vs.visit_id
            WHERE v.status = 'completed'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|err| EtlError::DataSource(format!("visit-service watermark: {err}")))
    }
}
