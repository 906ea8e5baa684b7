use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::records::CustomerAnalyticsRow;

use super::{LoadOutcome, Loader};

/// UPSERT loader for the per-customer rollup. Rows are written whole; a
/// conflicting customer_id replaces every column. `(xmax = 0)` on the
/// returned tuple distinguishes a fresh insert from an overwrite.
pub struct CustomerAnalyticsLoader {
    pool: DbPool,
}

impl CustomerAnalyticsLoader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Loader for CustomerAnalyticsLoader {
    type Record = CustomerAnalyticsRow;

    fn table(&self) -> &'static str {
        "customer_analytics"
    }

    async fn load(&self, chunk: &[CustomerAnalyticsRow]) -> Result<LoadOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::Load(format!("begin customer_analytics tx: {e}")))?;

        let mut outcome = LoadOutcome::default();
        for row in chunk {
            let inserted: bool = sqlx::query_scalar(
                r#"
                INSERT INTO customer_analytics (
                    customer_id, name, phone, email, birth_date, gender, age,
                    first_visit_date, last_visit_date, total_visits, total_amount,
                    avg_visit_amount, lifecycle_days, days_since_last_visit,
                    visit_frequency, visits_3m, amount_3m, segment,
                    segment_updated_at, churn_risk_score, churn_risk_level, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                        $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
                ON CONFLICT (customer_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    phone = EXCLUDED.phone,
                    email = EXCLUDED.email,
                    birth_date = EXCLUDED.birth_date,
                    gender = EXCLUDED.gender,
                    age = EXCLUDED.age,
                    first_visit_date = EXCLUDED.first_visit_date,
                    last_visit_date = EXCLUDED.last_visit_date,
                    total_visits = EXCLUDED.total_visits,
                    total_amount = EXCLUDED.total_amount,
                    avg_visit_amount = EXCLUDED.avg_visit_amount,
                    lifecycle_days = EXCLUDED.lifecycle_days,
                    days_since_last_visit = EXCLUDED.days_since_last_visit,
                    visit_frequency = EXCLUDED.visit_frequency,
                    visits_3m = EXCLUDED.visits_3m,
                    amount_3m = EXCLUDED.amount_3m,
                    segment = EXCLUDED.segment,
                    segment_updated_at = EXCLUDED.segment_updated_at,
                    churn_risk_score = EXCLUDED.churn_risk_score,
                    churn_risk_level = EXCLUDED.churn_risk_level,
                    updated_at = EXCLUDED.updated_at
                RETURNING (xmax = 0) AS inserted
                "#,
            )
            .bind(row.customer_id)
            .bind(&row.name)
            .bind(&row.phone)
            .bind(&row.email)
            .bind(row.birth_date)
            .bind(&row.gender)
            .bind(row.age)
            .bind(row.first_visit_date)
            .bind(row.last_visit_date)
            .bind(row.total_visits)
            .bind(row.total_amount)
            .bind(row.avg_visit_amount)
            .bind(row.lifecycle_days)
            .bind(row.days_since_last_visit)
            .bind(row.visit_frequency)
            .bind(row.visits_3m)
            .bind(row.amount_3m)
            .bind(&row.segment)
            .bind(row.segment_updated_at)
            .bind(row.churn_risk_score)
            .bind(&row.churn_risk_level)
            .bind(row.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                EtlError::Load(format!("upsert customer {}: {e}", row.customer_id))
            })?;

            if inserted {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::Load(format!("commit customer_analytics tx: {e}")))?;

        Ok(outcome)
    }
}
