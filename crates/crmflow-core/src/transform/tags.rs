use std::collections::BTreeMap;

use chrono::Utc;

use crate::error::Result;
use crate::records::{ServicePreferenceRow, ServiceTagRow};

use super::preference::safe_ratio;
use super::Transform;

const LOW_PRICE_BOUND: f64 = 50_000.0;
const HIGH_PRICE_BOUND: f64 = 100_000.0;
const VARIETY_NORMALIZER: f64 = 10.0;
const LOYALTY_MIN_VISITS: i64 = 3;
const TOP_CATEGORY_COUNT: usize = 3;

/// Condenses the preference table into one tag row per customer: top-3
/// services, preferred categories, price band, variety and loyalty.
pub struct ServiceTagsTransformer;

pub(crate) fn classify_price_range(price: f64) -> &'static str {
    if price < LOW_PRICE_BOUND {
        "low"
    } else if price > HIGH_PRICE_BOUND {
        "high"
    } else {
        "medium"
    }
}

impl Transform for ServiceTagsTransformer {
    type Input = ServicePreferenceRow;
    type Output = ServiceTagRow;

    fn transform(&self, chunk: Vec<ServicePreferenceRow>) -> Result<Vec<ServiceTagRow>> {
        let now = Utc::now();

        let mut per_customer: BTreeMap<i64, Vec<ServicePreferenceRow>> = BTreeMap::new();
        for row in chunk {
            per_customer.entry(row.customer_id).or_default().push(row);
        }

        let rows = per_customer
            .into_iter()
            .map(|(customer_id, mut preferences)| {
                // Rank order, then name for a stable pick among rank ties.
                preferences.sort_by(|a, b| {
                    a.preference_rank
                        .cmp(&b.preference_rank)
                        .then_with(|| a.service_name.cmp(&b.service_name))
                });

                let mut top = preferences
                    .iter()
                    .filter(|row| row.preference_rank <= 3)
                    .map(|row| row.service_name.clone());
                let top_service_1 = top.next();
                let top_service_2 = top.next();
                let top_service_3 = top.next();

                let mut category_visits: BTreeMap<&str, i64> = BTreeMap::new();
                for row in &preferences {
                    *category_visits.entry(row.service_category.as_str()).or_insert(0) +=
                        row.total_visits;
                }
                let mut categories: Vec<(&str, i64)> = category_visits.into_iter().collect();
                categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                let preferred_categories = categories
                    .into_iter()
                    .take(TOP_CATEGORY_COUNT)
                    .map(|(category, _)| category.to_owned())
                    .collect();

                let avg_service_price = safe_ratio(
                    preferences.iter().map(|row| row.avg_amount).sum(),
                    preferences.len() as f64,
                );

                let variety =
                    (preferences.len() as f64 / VARIETY_NORMALIZER).min(1.0);

                let loyalty_services = preferences
                    .iter()
                    .filter(|row| row.total_visits >= LOYALTY_MIN_VISITS)
                    .map(|row| row.service_name.clone())
                    .collect();

                ServiceTagRow {
                    customer_id,
                    top_service_1,
                    top_service_2,
                    top_service_3,
                    preferred_categories,
                    avg_service_price,
                    preferred_price_range: classify_price_range(avg_service_price).into(),
                    service_variety_score: variety,
                    loyalty_services,
                    updated_at: now,
                }
            })
            .collect();

        Ok(rows)
    }
}
