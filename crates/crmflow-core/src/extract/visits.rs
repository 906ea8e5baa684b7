use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::VisitRecord;

use super::{ChunkSource, TimeWindow};

/// Pulls completed visits with their per-visit service aggregates
/// (count plus comma-joined category/name lists) joined in.
pub struct VisitExtractor {
    pool: DbPool,
}

impl VisitExtractor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const WINDOWED_QUERY: &str = r#"
    SELECT
        v.id AS visit_id,
        v.customer_id,
        v.staff_id,
        v.shop_id,
        v.visit_date,
        v.total_amount,
        v.discount_amount,
        v.final_amount,
        COUNT(vs.id) AS service_count,
        STRING_AGG(DISTINCT s.category, ',') AS service_categories,
        STRING_AGG(s.name, ',') AS service_names,
        v.updated_at
    FROM visits v
    LEFT JOIN visit_services vs ON vs.visit_id = v.id
    LEFT JOIN services s ON s.id = vs.service_id
    WHERE v.status = 'completed'
      AND v.visit_date >= $1
      AND v.visit_date < $2
    GROUP BY v.id
    ORDER BY v.visit_date, v.id
    LIMIT $3 OFFSET $4
"#;

const FULL_QUERY: &str = r#"
    SELECT
        v.id AS visit_id,
        v.customer_id,
        v.staff_id,
        v.shop_id,
        v.visit_date,
        v.total_amount,
        v.discount_amount,
        v.final_amount,
        COUNT(vs.id) AS service_count,
        STRING_AGG(DISTINCT s.category, ',') AS service_categories,
        STRING_AGG(s.name, ',') AS service_names,
        v.updated_at
    FROM visits v
    LEFT JOIN visit_services vs ON vs.visit_id = v.id
    LEFT JOIN services s ON s.id = vs.service_id
    WHERE v.status = 'completed'
    GROUP BY v.id
    ORDER BY v.visit_date, v.id
    LIMIT $1 OFFSET $2
"#;

impl ChunkSource for VisitExtractor {
    type Record = VisitRecord;

    fn entity(&self) -> &'static str {
        "visit_analytics"
    }

    async fn fetch_chunk(
        &self,
        window: Option<&TimeWindow>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<VisitRecord>> {
        let query = match window {
            Some(window) => sqlx::query_as::<_, VisitRecord>(WINDOWED_QUERY)
                .bind(window.start)
                .bind(window.end)
                .bind(limit)
                .bind(offset),
            None => sqlx::query_as::<_, VisitRecord>(FULL_QUERY)
                .bind(limit)
                .bind(offset),
        };

        query
            .fetch_all(&self.pool)
            .await
            .map_err(|err| EtlError::DataSource(format!("visit extract: {err}")))
    }

    async fn last_update_time(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT MAX(GREATEST(v.updated_at, COALESCE(vs.updated_at, v.updated_at)))
            FROM visits v
            LEFT JOIN visit_services vs ON vs.visit_id = v.id
            WHERE v.status = 'completed'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|err| EtlError::DataSource(format!("visit watermark: {err}")))
    }
}
