//! Post-load recompute pass over the analytical store.
//!
//! Customer profile rows are seeded with empty visit aggregates by the
//! transform stage; once the visit facts are loaded, this pass fills the
//! aggregates from `visit_analytics` in one set-based update and then
//! re-scores churn risk against the fresh numbers.

use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::scoring::{ChurnFeatures, ChurnScorer};

/// Refreshes the visit-derived columns of every customer that has at least
/// one visit fact. Returns the number of customers updated.
pub async fn recompute_customer_stats(pool: &DbPool) -> Result<u64> {
    let updated = sqlx::query(
        r#"
        WITH stats AS (
            SELECT
                customer_id,
                MIN(visit_date)::date AS first_visit_date,
                MAX(visit_date)::date AS last_visit_date,
                COUNT(*) AS total_visits,
                COALESCE(SUM(final_amount), 0) AS total_amount,
                COALESCE(AVG(final_amount), 0) AS avg_visit_amount,
                COUNT(*) FILTER (
                    WHERE visit_date >= NOW() - INTERVAL '90 days'
                ) AS visits_3m,
                COALESCE(SUM(final_amount) FILTER (
                    WHERE visit_date >= NOW() - INTERVAL '90 days'
                ), 0) AS amount_3m
            FROM visit_analytics
            GROUP BY customer_id
        )
        UPDATE customer_analytics ca SET
            first_visit_date = s.first_visit_date,
            last_visit_date = s.last_visit_date,
            total_visits = s.total_visits,
            total_amount = s.total_amount,
            avg_visit_amount = s.avg_visit_amount,
            lifecycle_days = s.last_visit_date - s.first_visit_date,
            days_since_last_visit = CURRENT_DATE - s.last_visit_date,
            visit_frequency = s.total_visits::double precision
                / GREATEST(1, s.last_visit_date - s.first_visit_date) * 30,
            visits_3m = s.visits_3m,
            amount_3m = s.amount_3m,
            updated_at = NOW()
        FROM stats s
        WHERE ca.customer_id = s.customer_id
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| EtlError::Load(format!("recompute customer stats: {e}")))?
    .rows_affected();

    Ok(updated)
}

/// Re-scores churn risk for every customer using the current aggregates.
/// Runs after [`recompute_customer_stats`] so the features are real, not
/// the seeded defaults.
pub async fn rescore_churn(pool: &DbPool, scorer: &dyn ChurnScorer) -> Result<u64> {
    let features = sqlx::query_as::<_, ChurnFeatures>(
        r#"
        SELECT customer_id, total_visits, days_since_last_visit,
               visit_frequency, avg_visit_amount, segment
        FROM customer_analytics
        ORDER BY customer_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    if features.is_empty() {
        return Ok(0);
    }

    let scores = scorer.score(&features);

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| EtlError::Load(format!("begin churn rescore tx: {e}")))?;

    for (feature, score) in features.iter().zip(&scores) {
        sqlx::query(
            r#"
            UPDATE customer_analytics
            SET churn_risk_score = $2, churn_risk_level = $3, updated_at = NOW()
            WHERE customer_id = $1
            "#,
        )
        .bind(feature.customer_id)
        .bind(score.risk_score)
        .bind(score.risk_level.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            EtlError::Load(format!("rescore customer {}: {e}", feature.customer_id))
        })?;
    }

    tx.commit()
        .await
        .map_err(|e| EtlError::Load(format!("commit churn rescore tx: {e}")))?;

    Ok(scores.len() as u64)
}
