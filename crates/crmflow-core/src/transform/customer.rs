use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::error::Result;
use crate::records::{CustomerAnalyticsRow, CustomerRecord};
use crate::scoring::{ChurnFeatures, ChurnScorer};

use super::Transform;

/// Shapes raw customers into the denormalized analytics row and enriches
/// each with a churn score from the injected scorer. Visit aggregates are
/// seeded with defaults and filled by the recompute pass after the visit
/// fact table loads.
pub struct CustomerAnalyticsTransformer {
    scorer: Arc<dyn ChurnScorer>,
}

impl CustomerAnalyticsTransformer {
    pub fn new(scorer: Arc<dyn ChurnScorer>) -> Self {
        Self { scorer }
    }
}

/// Completed years between `birth` and `today`.
pub(crate) fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    use chrono::Datelike;

    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

impl Transform for CustomerAnalyticsTransformer {
    type Input = CustomerRecord;
    type Output = CustomerAnalyticsRow;

    fn transform(&self, chunk: Vec<CustomerRecord>) -> Result<Vec<CustomerAnalyticsRow>> {
        let now = Utc::now();
        let today = now.date_naive();

        let features: Vec<ChurnFeatures> = chunk
            .iter()
            .map(|customer| ChurnFeatures {
                customer_id: customer.customer_id,
                total_visits: 0,
                days_since_last_visit: None,
                visit_frequency: 0.0,
                avg_visit_amount: 0.0,
                segment: "new".into(),
            })
            .collect();
        let scores = self.scorer.score(&features);

        let rows = chunk
            .into_iter()
            .zip(scores)
            .map(|(customer, score)| CustomerAnalyticsRow {
                customer_id: customer.customer_id,
                name: customer.name,
                phone: customer.phone,
                email: customer.email,
                birth_date: customer.birth_date,
                gender: customer.gender,
                age: customer.birth_date.map(|birth| age_on(birth, today)),
                first_visit_date: None,
                last_visit_date: None,
                total_visits: 0,
                total_amount: 0.0,
                avg_visit_amount: 0.0,
                lifecycle_days: 0,
                days_since_last_visit: None,
                visit_frequency: 0.0,
                visits_3m: 0,
                amount_3m: 0.0,
                segment: "new".into(),
                segment_updated_at: now,
                churn_risk_score: score.risk_score,
                churn_risk_level: score.risk_level.to_string(),
                updated_at: now,
            })
            .collect();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::HeuristicScorer;
    use chrono::TimeZone;

    fn customer(id: i64, birth: Option<NaiveDate>, phone: Option<&str>) -> CustomerRecord {
        CustomerRecord {
            customer_id: id,
            name: format!("customer-{id}"),
            phone: phone.map(Into::into),
            email: None,
            birth_date: birth,
            gender: Some("F".into()),
            shop_id: 1,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn age_counts_completed_years_only() {
        let birth = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2026, 6, 14).unwrap()), 35);
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()), 36);
    }

    #[test]
    fn transform_seeds_defaults_and_scores() {
        let transformer = CustomerAnalyticsTransformer::new(Arc::new(HeuristicScorer::default()));
        let birth = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        let rows = transformer
            .transform(vec![customer(1, Some(birth), Some("010-1234"))])
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.customer_id, 1);
        assert!(row.age.is_some());
        assert_eq!(row.total_visits, 0);
        assert_eq!(row.segment, "new");
        assert_eq!(row.churn_risk_score, 0.0);
        assert_eq!(row.churn_risk_level, "low");
    }

    #[test]
    fn missing_birth_date_leaves_age_null() {
        let transformer = CustomerAnalyticsTransformer::new(Arc::new(HeuristicScorer::default()));
        let rows = transformer
            .transform(vec![customer(2, None, Some("010-0000"))])
            .unwrap();
        assert!(rows[0].age.is_none());
    }
}
