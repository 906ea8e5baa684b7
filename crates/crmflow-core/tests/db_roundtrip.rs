//! Postgres-backed load tests. They self-skip unless
//! CRMFLOW_TEST_DATABASE_URL points at a disposable database.

use std::env;

use anyhow::Result;
use chrono::{Duration, Utc};
use crmflow_core::db;
use crmflow_core::extract::TimeWindow;
use crmflow_core::load::{
    ensure_schema, read_metadata, read_watermark, update_metadata, CustomerAnalyticsLoader,
    Loader, VisitAnalyticsLoader,
};
use crmflow_core::records::{CustomerAnalyticsRow, VisitAnalyticsRow};
use crmflow_core::result::EtlResult;
use tokio::runtime::Runtime;

fn test_database_url(test_name: &str) -> Option<String> {
    match env::var("CRMFLOW_TEST_DATABASE_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping {test_name} because CRMFLOW_TEST_DATABASE_URL is not set");
            None
        }
    }
}

async fn reset(pool: &sqlx::PgPool) -> Result<()> {
    ensure_schema(pool).await?;
    sqlx::query(
        "TRUNCATE TABLE customer_analytics, visit_analytics, customer_service_preferences, \
         customer_service_tags, shops, services, staff, etl_metadata",
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn customer_row(id: i64, segment: &str) -> CustomerAnalyticsRow {
    let now = Utc::now();
    CustomerAnalyticsRow {
        customer_id: id,
        name: format!("customer-{id}"),
        phone: Some("010-0000".into()),
        email: None,
        birth_date: None,
        gender: Some("F".into()),
        age: None,
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
        segment: segment.into(),
        segment_updated_at: now,
        churn_risk_score: 0.0,
        churn_risk_level: "low".into(),
        updated_at: now,
    }
}

fn visit_row(id: i64, days_ago: i64) -> VisitAnalyticsRow {
    let visit_date = Utc::now() - Duration::days(days_ago);
    VisitAnalyticsRow {
        visit_id: id,
        customer_id: 1,
        staff_id: Some(7),
        shop_id: 1,
        visit_date,
        total_amount: 50_000.0,
        discount_amount: 0.0,
        final_amount: 50_000.0,
        service_count: 1,
        service_categories: vec!["Hair".into()],
        service_names: vec!["Cut".into()],
        visit_hour: 12,
        visit_weekday: 0,
        visit_month: 1,
        created_at: Utc::now(),
    }
}

#[test]
fn upsert_counts_inserts_and_updates_separately() -> Result<()> {
    let Some(url) = test_database_url("upsert_counts_inserts_and_updates_separately") else {
        return Ok(());
    };

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let pool = db::connect(&url).await?;
        reset(&pool).await?;

        let loader = CustomerAnalyticsLoader::new(pool.clone());
        let first = loader
            .load(&[customer_row(1, "new"), customer_row(2, "new")])
            .await?;
        assert_eq!(first.inserted, 2);
        assert_eq!(first.updated, 0);

        let second = loader
            .load(&[customer_row(1, "vip"), customer_row(3, "new")])
            .await?;
        assert_eq!(second.inserted, 1);
        assert_eq!(second.updated, 1);

        let segment: String = sqlx::query_scalar(
            "SELECT segment FROM customer_analytics WHERE customer_id = 1",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(segment, "vip");

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_analytics")
            .fetch_one(&pool)
            .await?;
        assert_eq!(total, 3);
        Ok(())
    })
}

#[test]
fn windowed_visit_load_converges_on_rerun() -> Result<()> {
    let Some(url) = test_database_url("windowed_visit_load_converges_on_rerun") else {
        return Ok(());
    };

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let pool = db::connect(&url).await?;
        reset(&pool).await?;

        let loader = VisitAnalyticsLoader::new(pool.clone());
        let window = TimeWindow {
            start: Utc::now() - Duration::days(7),
            end: Utc::now() + Duration::days(1),
        };

        // A visit outside the window must survive the windowed delete.
        let deleted = loader.prepare(None).await?;
        assert_eq!(deleted, 0);
        loader.load(&[visit_row(100, 30)]).await?;

        loader.prepare(Some(&window)).await?;
        loader.load(&[visit_row(1, 2), visit_row(2, 3)]).await?;

        // Re-running the same window clears exactly its own rows.
        let deleted = loader.prepare(Some(&window)).await?;
        assert_eq!(deleted, 2);
        loader.load(&[visit_row(1, 2), visit_row(2, 3)]).await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visit_analytics")
            .fetch_one(&pool)
            .await?;
        assert_eq!(total, 3);
        Ok(())
    })
}

#[test]
fn metadata_upsert_preserves_one_row_per_table() -> Result<()> {
    let Some(url) = test_database_url("metadata_upsert_preserves_one_row_per_table") else {
        return Ok(());
    };

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let pool = db::connect(&url).await?;
        reset(&pool).await?;

        let watermark = Utc::now() - Duration::hours(1);
        let mut result = EtlResult::success();
        result.records_processed = 10;
        result.records_inserted = 10;
        update_metadata(&pool, "customer_analytics", &result, Some(watermark)).await?;

        let stored = read_watermark(&pool, "customer_analytics").await?;
        assert_eq!(stored.map(|ts| ts.timestamp()), Some(watermark.timestamp()));
        assert_eq!(read_watermark(&pool, "visit_analytics").await?, None);

        // A failed follow-up run overwrites the audit fields in place.
        let failed = EtlResult::failure("source unreachable");
        update_metadata(&pool, "customer_analytics", &failed, Some(watermark)).await?;

        let rows = read_metadata(&pool).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].table_name, "customer_analytics");
        assert_eq!(rows[0].status, "failed");
        assert_eq!(
            rows[0].error_message.as_deref(),
            Some("source unreachable")
        );
        Ok(())
    })
}

#[test]
fn ensure_schema_is_idempotent() -> Result<()> {
    let Some(url) = test_database_url("ensure_schema_is_idempotent") else {
        return Ok(());
    };

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let pool = db::connect(&url).await?;
        ensure_schema(&pool).await?;
        ensure_schema(&pool).await?;

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name IN \
             ('customer_analytics', 'visit_analytics', 'customer_service_preferences', \
              'customer_service_tags', 'shops', 'services', 'staff', 'etl_metadata')",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(tables, 8);
        Ok(())
    })
}
