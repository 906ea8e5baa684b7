//! Typed row structs for source entities and analytical tables.
//!
//! Extractors validate shape at the boundary so nothing downstream handles
//! untyped maps. Every record reports its nullability and key through
//! [`RecordQuality`], which the transform-stage quality gate consumes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Primary-key-like identity used for duplicate-ratio checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityKey {
    Single(i64),
    Pair(i64, i64),
}

/// Shape metadata the quality gate needs from any record type.
pub trait RecordQuality {
    /// Number of logical columns in the record.
    fn field_count() -> usize;
    /// Number of columns currently null.
    fn null_count(&self) -> usize;
    /// Identity column(s), when the entity has one.
    fn key(&self) -> Option<QualityKey>;
}

fn nulls(flags: &[bool]) -> usize {
    flags.iter().filter(|is_null| **is_null).count()
}

// ---------------------------------------------------------------------------
// Source-side records (read-only from the operational CRM database)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct CustomerRecord {
    pub customer_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub shop_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for CustomerRecord {
    fn field_count() -> usize {
        9
    }

    fn null_count(&self) -> usize {
        nulls(&[
            self.phone.is_none(),
            self.email.is_none(),
            self.birth_date.is_none(),
            self.gender.is_none(),
        ])
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.customer_id))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ShopRecord {
    pub shop_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for ShopRecord {
    fn field_count() -> usize {
        5
    }

    fn null_count(&self) -> usize {
        nulls(&[self.address.is_none(), self.phone.is_none()])
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.shop_id))
    }
}

/// One completed visit (reservation) with its service aggregates joined in.
#[derive(Debug, Clone, FromRow)]
pub struct VisitRecord {
    pub visit_id: i64,
    pub customer_id: i64,
    pub staff_id: Option<i64>,
    pub shop_id: i64,
    pub visit_date: DateTime<Utc>,
    pub total_amount: f64,
    pub discount_amount: f64,
    pub final_amount: f64,
    pub service_count: i64,
    /// Comma-joined category list as produced by the source aggregation.
    pub service_categories: Option<String>,
    pub service_names: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for VisitRecord {
    fn field_count() -> usize {
        12
    }

    fn null_count(&self) -> usize {
        nulls(&[
            self.staff_id.is_none(),
            self.service_categories.is_none(),
            self.service_names.is_none(),
        ])
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.visit_id))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRecord {
    pub service_id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub duration_minutes: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for ServiceRecord {
    fn field_count() -> usize {
        6
    }

    fn null_count(&self) -> usize {
        nulls(&[self.duration_minutes.is_none()])
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.service_id))
    }
}

/// One service line item of one visit, with customer and service context.
#[derive(Debug, Clone, FromRow)]
pub struct VisitServiceRecord {
    pub visit_service_id: i64,
    pub visit_id: i64,
    pub customer_id: i64,
    pub service_id: i64,
    pub service_name: String,
    pub service_category: String,
    pub visit_date: DateTime<Utc>,
    pub quantity: i32,
    pub final_price: f64,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for VisitServiceRecord {
    fn field_count() -> usize {
        10
    }

    fn null_count(&self) -> usize {
        0
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.visit_service_id))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StaffRecord {
    pub staff_id: i64,
    pub name: String,
    pub shop_id: i64,
    pub role: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for StaffRecord {
    fn field_count() -> usize {
        5
    }

    fn null_count(&self) -> usize {
        nulls(&[self.role.is_none()])
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.staff_id))
    }
}

// ---------------------------------------------------------------------------
// Analytical rows (owned by the analytical store)
// ---------------------------------------------------------------------------

/// Denormalized per-customer rollup. Always written whole, never partially.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CustomerAnalyticsRow {
    pub customer_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub first_visit_date: Option<NaiveDate>,
    pub last_visit_date: Option<NaiveDate>,
    pub total_visits: i64,
    pub total_amount: f64,
    pub avg_visit_amount: f64,
    pub lifecycle_days: i64,
    pub days_since_last_visit: Option<i64>,
    pub visit_frequency: f64,
    pub visits_3m: i64,
    pub amount_3m: f64,
    pub segment: String,
    pub segment_updated_at: DateTime<Utc>,
    pub churn_risk_score: f64,
    pub churn_risk_level: String,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for CustomerAnalyticsRow {
    fn field_count() -> usize {
        22
    }

    fn null_count(&self) -> usize {
        // Visit aggregates (first/last visit, days since) start null and are
        // filled by the recompute pass; only source-carried columns count
        // against the null ratio.
        nulls(&[
            self.phone.is_none(),
            self.email.is_none(),
            self.birth_date.is_none(),
            self.gender.is_none(),
            self.age.is_none(),
        ])
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.customer_id))
    }
}

/// Visit fact row, time-partitioned by `visit_date`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VisitAnalyticsRow {
    pub visit_id: i64,
    pub customer_id: i64,
    pub staff_id: Option<i64>,
    pub shop_id: i64,
    pub visit_date: DateTime<Utc>,
    pub total_amount: f64,
    pub discount_amount: f64,
    pub final_amount: f64,
    pub service_count: i64,
    pub service_categories: Vec<String>,
    pub service_names: Vec<String>,
    pub visit_hour: i32,
    pub visit_weekday: i32,
    pub visit_month: i32,
    pub created_at: DateTime<Utc>,
}

impl RecordQuality for VisitAnalyticsRow {
    fn field_count() -> usize {
        15
    }

    fn null_count(&self) -> usize {
        nulls(&[self.staff_id.is_none()])
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.visit_id))
    }
}

/// Per (customer, service) preference aggregate.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServicePreferenceRow {
    pub customer_id: i64,
    pub service_id: i64,
    pub service_name: String,
    pub service_category: String,
    pub total_visits: i64,
    pub total_amount: f64,
    pub avg_amount: f64,
    pub first_service_date: NaiveDate,
    pub last_service_date: NaiveDate,
    pub days_since_last_service: i64,
    pub preference_rank: i32,
    pub visit_ratio: f64,
    pub amount_ratio: f64,
    pub recent_visits_3m: i64,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for ServicePreferenceRow {
    fn field_count() -> usize {
        15
    }

    fn null_count(&self) -> usize {
        0
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Pair(self.customer_id, self.service_id))
    }
}

/// Per-customer preference tags derived from the preference table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceTagRow {
    pub customer_id: i64,
    pub top_service_1: Option<String>,
    pub top_service_2: Option<String>,
    pub top_service_3: Option<String>,
    pub preferred_categories: Vec<String>,
    pub avg_service_price: f64,
    pub preferred_price_range: String,
    pub service_variety_score: f64,
    pub loyalty_services: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl RecordQuality for ServiceTagRow {
    fn field_count() -> usize {
        10
    }

    fn null_count(&self) -> usize {
        // A customer with fewer than three services legitimately leaves the
        // trailing top-service slots empty; that is not a quality defect.
        0
    }

    fn key(&self) -> Option<QualityKey> {
        Some(QualityKey::Single(self.customer_id))
    }
}

/// Bookkeeping row for one loaded table, used for auditability.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EtlMetadataRow {
    pub table_name: String,
    pub last_updated: DateTime<Utc>,
    pub records_processed: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub records_deleted: i64,
    pub processing_time_seconds: f64,
    pub status: String,
    pub error_message: Option<String>,
    /// Greatest source-side modification timestamp covered so far; seeds
    /// the next incremental window.
    pub watermark: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_record_counts_nullable_columns() {
        let record = CustomerRecord {
            customer_id: 1,
            name: "Kim".into(),
            phone: None,
            email: Some("kim@example.com".into()),
            birth_date: None,
            gender: Some("F".into()),
            shop_id: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(record.null_count(), 2);
        assert_eq!(record.key(), Some(QualityKey::Single(1)));
    }

    #[test]
    fn preference_key_is_the_customer_service_pair() {
        let row = ServicePreferenceRow {
            customer_id: 7,
            service_id: 3,
            service_name: "Cut".into(),
            service_category: "Hair".into(),
            total_visits: 2,
            total_amount: 100.0,
            avg_amount: 50.0,
            first_service_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            last_service_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            days_since_last_service: 10,
            preference_rank: 1,
            visit_ratio: 1.0,
            amount_ratio: 1.0,
            recent_visits_3m: 2,
            updated_at: Utc::now(),
        };
        assert_eq!(row.key(), Some(QualityKey::Pair(7, 3)));
    }
}
