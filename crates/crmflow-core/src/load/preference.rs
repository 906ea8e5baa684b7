use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::ServicePreferenceRow;

use super::{LoadOutcome, Loader};

/// UPSERT loader for per (customer, service) preference aggregates.
pub struct ServicePreferenceLoader {
    pool: DbPool,
}

impl ServicePreferenceLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Loader for ServicePreferenceLoader {
    type Record = ServicePreferenceRow;

    fn table(&self) -> &'static str {
        "customer_service_preferences"
    }

    async fn load(&self, chunk: &[ServicePreferenceRow]) -> Result<LoadOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::Load(format!("begin preferences tx: {e}")))?;

        let mut outcome = LoadOutcome::default();
        for row in chunk {
            let inserted: bool = sqlx::query_scalar(
                r#"
                INSERT INTO customer_service_preferences (
                    customer_id, service_id, service_name, service_category,
                    total_visits, total_amount, avg_amount, first_service_date,
                    last_service_date, days_since_last_service, preference_rank,
                    visit_ratio, amount_ratio, recent_visits_3m, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (customer_id, service_id) DO UPDATE SET
                    service_name = EXCLUDED.service_name,
                    service_category = EXCLUDED.service_category,
                    total_visits = EXCLUDED.total_visits,
                    total_amount = EXCLUDED.total_amount,
                    avg_amount = EXCLUDED.avg_amount,
                    first_service_date = EXCLUDED.first_service_date,
                    last_service_date = EXCLUDED.last_service_date,
                    days_since_last_service = EXCLUDED.days_since_last_service,
                    preference_rank = EXCLUDED.preference_rank,
                    visit_ratio = EXCLUDED.visit_ratio,
                    amount_ratio = EXCLUDED.amount_ratio,
                    recent_visits_3m = EXCLUDED.recent_visits_3m,
                    updated_at = EXCLUDED.updated_at
                RETURNING (xmax = 0) AS inserted
                "#,
            )
            .bind(row.customer_id)
            .bind(row.service_id)
            .bind(&row.service_name)
            .bind(&row.service_category)
            .bind(row.total_visits)
            .bind(row.total_amount)
            .bind(row.avg_amount)
            .bind(row.first_service_date)
            .bind(row.last_service_date)
            .bind(row.days_since_last_service)
            .bind(row.preference_rank)
            .bind(row.visit_ratio)
            .bind(row.amount_ratio)
            .bind(row.recent_visits_3m)
            .bind(row.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                EtlError::Load(format!(
                    "upsert preference ({}, {}): {e}",
                    row.customer_id, row.service_id
                ))
            })?;

            if inserted {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::Load(format!("commit preferences tx: {e}")))?;

        Ok(outcome)
    }
}

/// Reads the preference table back out of the analytical store, ordered so
/// that one customer's rows are contiguous. Feeds the tag derivation step.
pub async fn fetch_preferences(pool: &DbPool) -> Result<Vec<ServicePreferenceRow>> {
    let rows = sqlx::query_as::<_, ServicePreferenceRow>(
        r#"
        SELECT * FROM customer_service_preferences
        ORDER BY customer_id, preference_rank, service_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
