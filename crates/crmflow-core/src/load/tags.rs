use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::ServiceTagRow;

use super::{LoadOutcome, Loader};

/// UPSERT loader for the per-customer tag table.
pub struct ServiceTagsLoader {
    pool: DbPool,
}

impl ServiceTagsLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Loader for ServiceTagsLoader {
    type Record = ServiceTagRow;

    fn table(&self) -> &'static str {
        "customer_service_tags"
    }

    async fn load(&self, chunk: &[ServiceTagRow]) -> Result<LoadOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::Load(format!("begin tags tx: {e}")))?;

        let mut outcome = LoadOutcome::default();
        for row in chunk {
            let inserted: bool = sqlx::query_scalar(
                r#"
                INSERT INTO customer_service_tags (
                    customer_id, top_service_1, top_service_2, top_service_3,
                    preferred_categories, avg_service_price, preferred_price_range,
                    service_variety_score, loyalty_services, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (customer_id) DO UPDATE SET
                    top_service_1 = EXCLUDED.top_service_1,
                    top_service_2 = EXCLUDED.top_service_2,
                    top_service_3 = EXCLUDED.top_service_3,
                    preferred_categories = EXCLUDED.preferred_categories,
                    avg_service_price = EXCLUDED.avg_service_price,
                    preferred_price_range = EXCLUDED.preferred_price_range,
                    service_variety_score = EXCLUDED.service_variety_score,
                    loyalty_services = EXCLUDED.loyalty_services,
                    updated_at = EXCLUDED.updated_at
                RETURNING (xmax = 0) AS inserted
                "#,
            )
            .bind(row.customer_id)
            .bind(&row.top_service_1)
            .bind(&row.top_service_2)
            .bind(&row.top_service_3)
            .bind(&row.preferred_categories)
            .bind(row.avg_service_price)
            .bind(&row.preferred_price_range)
            .bind(row.service_variety_score)
            .bind(&row.loyalty_services)
            .bind(row.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| EtlError::Load(format!("upsert tags for {}: {e}", row.customer_id)))?;

            if inserted {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::Load(format!("commit tags tx: {e}")))?;

        Ok(outcome)
    }
}
