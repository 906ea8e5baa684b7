use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::records::{ServicePreferenceRow, VisitServiceRecord};

use super::Transform;

const RECENT_ACTIVITY_DAYS: i64 = 90;

/// Aggregates visit-service line items into per (customer, service)
/// preference rows: visit counts, monetary totals, dense preference ranks
/// and ratios against the customer's own totals.
pub struct ServicePreferenceTransformer;

/// Ratio with the fixed zero-denominator policy: customers with no
/// qualifying activity get 0, never null and never a skipped row.
pub(crate) fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Dense rank over visit counts, descending: ties share a rank and the
/// next distinct count advances by exactly one.
pub(crate) fn dense_ranks(visit_counts: &[i64]) -> Vec<i32> {
    let mut distinct: Vec<i64> = visit_counts.to_vec();
    distinct.sort_unstable_by(|a, b| b.cmp(a));
    distinct.dedup();

    visit_counts
        .iter()
        .map(|count| {
            distinct
                .iter()
                .position(|candidate| candidate == count)
                .map(|index| index as i32 + 1)
                .unwrap_or(1)
        })
        .collect()
}

#[derive(Debug)]
struct ServiceAccumulator {
    service_name: String,
    service_category: String,
    total_visits: i64,
    total_amount: f64,
    first_service_date: NaiveDate,
    last_service_date: NaiveDate,
    recent_visits_3m: i64,
}

impl Transform for ServicePreferenceTransformer {
    type Input = VisitServiceRecord;
    type Output = ServicePreferenceRow;

    fn transform(&self, chunk: Vec<VisitServiceRecord>) -> Result<Vec<ServicePreferenceRow>> {
        let now = Utc::now();
        let recent_cutoff = now - chrono::Duration::days(RECENT_ACTIVITY_DAYS);

        let aggregated = aggregate(chunk, recent_cutoff);

        // Per-customer totals for ratio denominators.
        let mut customer_visits: BTreeMap<i64, i64> = BTreeMap::new();
        let mut customer_amounts: BTreeMap<i64, f64> = BTreeMap::new();
        for ((customer_id, _), acc) in &aggregated {
            *customer_visits.entry(*customer_id).or_insert(0) += acc.total_visits;
            *customer_amounts.entry(*customer_id).or_insert(0.0) += acc.total_amount;
        }

        // Dense rank per customer by total visits descending.
        let mut ranks: BTreeMap<(i64, i64), i32> = BTreeMap::new();
        let mut per_customer: BTreeMap<i64, Vec<(i64, i64)>> = BTreeMap::new();
        for ((customer_id, service_id), acc) in &aggregated {
            per_customer
                .entry(*customer_id)
                .or_default()
                .push((*service_id, acc.total_visits));
        }
        for (customer_id, services) in &per_customer {
            let counts: Vec<i64> = services.iter().map(|(_, visits)| *visits).collect();
            for ((service_id, _), rank) in services.iter().zip(dense_ranks(&counts)) {
                ranks.insert((*customer_id, *service_id), rank);
            }
        }

        let today = now.date_naive();
        let rows = aggregated
            .into_iter()
            .map(|((customer_id, service_id), acc)| {
                let total_customer_visits = customer_visits[&customer_id];
                let total_customer_amount = customer_amounts[&customer_id];

                ServicePreferenceRow {
                    customer_id,
                    service_id,
                    service_name: acc.service_name,
                    service_category: acc.service_category,
                    total_visits: acc.total_visits,
                    total_amount: acc.total_amount,
                    avg_amount: safe_ratio(acc.total_amount, acc.total_visits as f64),
                    first_service_date: acc.first_service_date,
                    last_service_date: acc.last_service_date,
                    days_since_last_service: (today - acc.last_service_date).num_days(),
                    preference_rank: ranks[&(customer_id, service_id)],
                    visit_ratio: safe_ratio(
                        acc.total_visits as f64,
                        total_customer_visits as f64,
                    ),
                    amount_ratio: safe_ratio(acc.total_amount, total_customer_amount),
                    recent_visits_3m: acc.recent_visits_3m,
                    updated_at: now,
                }
            })
            .collect();

        Ok(rows)
    }
}

fn aggregate(
    chunk: Vec<VisitServiceRecord>,
    recent_cutoff: DateTime<Utc>,
) -> BTreeMap<(i64, i64), ServiceAccumulator> {
    let mut aggregated: BTreeMap<(i64, i64), ServiceAccumulator> = BTreeMap::new();

    for item in chunk {
        let service_date = item.visit_date.date_naive();
        let is_recent = item.visit_date >= recent_cutoff;
        let entry = aggregated
            .entry((item.customer_id, item.service_id))
            .or_insert_with(|| ServiceAccumulator {
                service_name: item.service_name.clone(),
                service_category: item.service_category.clone(),
                total_visits: 0,
                total_amount: 0.0,
                first_service_date: service_date,
                last_service_date: service_date,
                recent_visits_3m: 0,
            });

        entry.total_visits += 1;
        entry.total_amount += item.final_price;
        if service_date < entry.first_service_date {
            entry.first_service_date = service_date;
        }
        if service_date > entry.last_service_date {
            entry.last_service_date = service_date;
        }
        if is_recent {
            entry.recent_visits_3m += 1;
        }
    }

    aggregated
}
