use chrono::{Datelike, Timelike, Utc};

use crate::error::Result;
use crate::records::{VisitAnalyticsRow, VisitRecord};

use super::Transform;

/// Shapes completed visits into fact rows: splits the comma-joined service
/// lists and derives hour/weekday/month from the visit timestamp.
pub struct VisitAnalyticsTransformer;

/// Splits a comma-joined aggregate into trimmed, non-empty items.
pub(crate) fn parse_service_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|joined| {
        joined
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

impl Transform for VisitAnalyticsTransformer {
    type Input = VisitRecord;
    type Output = VisitAnalyticsRow;

    fn transform(&self, chunk: Vec<VisitRecord>) -> Result<Vec<VisitAnalyticsRow>> {
        let now = Utc::now();

        let rows = chunk
            .into_iter()
            .map(|visit| VisitAnalyticsRow {
                visit_id: visit.visit_id,
                customer_id: visit.customer_id,
                staff_id: visit.staff_id,
                shop_id: visit.shop_id,
                visit_date: visit.visit_date,
                total_amount: visit.total_amount,
                discount_amount: visit.discount_amount,
                final_amount: visit.final_amount,
                service_count: visit.service_count,
                service_categories: parse_service_list(visit.service_categories.as_deref()),
                service_names: parse_service_list(visit.service_names.as_deref()),
                visit_hour: visit.visit_date.hour() as i32,
                // Monday = 0, matching the weekday convention of the
                // reporting layer.
                visit_weekday: visit.visit_date.weekday().num_days_from_monday() as i32,
                visit_month: visit.visit_date.month() as i32,
                created_at: now,
            })
            .collect();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn visit(id: i64, categories: Option<&str>, names: Option<&str>) -> VisitRecord {
        VisitRecord {
            visit_id: id,
            customer_id: 10,
            staff_id: Some(3),
            shop_id: 1,
            // Wednesday, 14:30 UTC.
            visit_date: Utc.with_ymd_and_hms(2026, 8, 26, 14, 30, 0).unwrap(),
            total_amount: 80_000.0,
            discount_amount: 5_000.0,
            final_amount: 75_000.0,
            service_count: 2,
            service_categories: categories.map(Into::into),
            service_names: names.map(Into::into),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn service_lists_split_and_trim() {
        assert_eq!(
            parse_service_list(Some("Hair, Nail ,,Spa")),
            vec!["Hair", "Nail", "Spa"]
        );
        assert!(parse_service_list(None).is_empty());
        assert!(parse_service_list(Some("")).is_empty());
    }

    #[test]
    fn derives_time_breakdown_from_visit_date() {
        let transformer = VisitAnalyticsTransformer;
        let rows = transformer
            .transform(vec![visit(1, Some("Hair,Spa"), Some("Cut,Massage"))])
            .unwrap();

        let row = &rows[0];
        assert_eq!(row.visit_hour, 14);
        assert_eq!(row.visit_weekday, 2);
        assert_eq!(row.visit_month, 8);
        assert_eq!(row.service_categories, vec!["Hair", "Spa"]);
        assert_eq!(row.service_names, vec!["Cut", "Massage"]);
    }
}
