//! Postgres-backed pipeline runs against a seeded source schema. They
//! self-skip unless CRMFLOW_TEST_DATABASE_URL points at a disposable
//! database.
//!
//! Source tables live in a dedicated `crm_source` schema so the reference
//! tables (shops, services, staff) do not collide with their analytical
//! counterparts in `public`; the source pool resolves unqualified names
//! through its search_path.

use std::env;
use std::str::FromStr;

use anyhow::Result;
use crmflow_core::config::EtlConfig;
use crmflow_core::db;
use crmflow_core::load::ensure_schema;
use crmflow_core::pipeline::EtlPipeline;
use crmflow_core::result::RunStatus;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
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

async fn source_pool(url: &str) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(url)?.options([("search_path", "crm_source")]);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

const SOURCE_TABLES: &[(&str, &str, &str)] = &[
    (
        "shops",
        r#"
        CREATE TABLE crm_source.shops (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT,
            phone TEXT,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        INSERT INTO crm_source.shops VALUES
            (1, 'Gangnam Main', 'Seoul', '02-555-0100', NOW())
        "#,
    ),
    (
        "services",
        r#"
        CREATE TABLE crm_source.services (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            price DOUBLE PRECISION NOT NULL,
            duration_minutes INTEGER,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        INSERT INTO crm_source.services VALUES
            (1, 'Cut', 'Hair', 50000, 30, TRUE, NOW()),
            (2, 'Color', 'Hair', 120000, 90, TRUE, NOW())
        "#,
    ),
    (
        "staff",
        r#"
        CREATE TABLE crm_source.staff (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            shop_id BIGINT NOT NULL,
            role TEXT,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        INSERT INTO crm_source.staff VALUES
            (1, 'Lee', 1, 'stylist', NOW())
        "#,
    ),
    (
        "customers",
        r#"
        CREATE TABLE crm_source.customers (
            id BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            birth_date DATE,
            gender TEXT,
            shop_id BIGINT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        INSERT INTO crm_source.customers VALUES
            (1, 'Kim', '010-1111-2222', 'kim@example.com', DATE '1990-05-01',
             'F', 1, TRUE, NOW() - INTERVAL '200 days', NOW()),
            (2, 'Park', '010-3333-4444', 'park@example.com', DATE '1985-11-20',
             'M', 1, TRUE, NOW() - INTERVAL '90 days', NOW())
        "#,
    ),
    (
        "visits",
        r#"
        CREATE TABLE crm_source.visits (
            id BIGINT PRIMARY KEY,
            customer_id BIGINT NOT NULL,
            staff_id BIGINT,
            shop_id BIGINT NOT NULL,
            visit_date TIMESTAMPTZ NOT NULL,
            status TEXT NOT NULL,
            total_amount DOUBLE PRECISION NOT NULL,
            discount_amount DOUBLE PRECISION NOT NULL,
            final_amount DOUBLE PRECISION NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        INSERT INTO crm_source.visits VALUES
            (1, 1, 1, 1, NOW() - INTERVAL '3 days', 'completed', 50000, 0, 50000, NOW()),
            (2, 2, 1, 1, NOW() - INTERVAL '5 days', 'completed', 120000, 10000, 110000, NOW())
        "#,
    ),
    (
        "visit_services",
        r#"
        CREATE TABLE crm_source.visit_services (
            id BIGINT PRIMARY KEY,
            visit_id BIGINT NOT NULL,
            service_id BIGINT NOT NULL,
            quantity INTEGER NOT NULL,
            final_price DOUBLE PRECISION NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        INSERT INTO crm_source.visit_services VALUES
            (1, 1, 1, 1, 50000, NOW()),
            (2, 2, 2, 1, 110000, NOW())
        "#,
    ),
];

/// Rebuilds the source schema, leaving out `omit` so that entity's
/// extraction fails mid-run.
async fn reset_source(pool: &PgPool, omit: Option<&str>) -> Result<()> {
    sqlx::query("DROP SCHEMA IF EXISTS crm_source CASCADE")
        .execute(pool)
        .await?;
    sqlx::query("CREATE SCHEMA crm_source").execute(pool).await?;
    for (table, ddl, seed) in SOURCE_TABLES {
        if Some(*table) == omit {
            continue;
        }
        sqlx::query(ddl).execute(pool).await?;
        sqlx::query(seed).execute(pool).await?;
    }
    Ok(())
}

async fn reset_analytics(pool: &PgPool) -> Result<()> {
    ensure_schema(pool).await?;
    sqlx::query(
        "TRUNCATE TABLE customer_analytics, visit_analytics, customer_service_preferences, \
         customer_service_tags, shops, services, staff, etl_metadata",
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn full_run_config() -> EtlConfig {
    EtlConfig {
        incremental: false,
        max_retries: 0,
        retry_delay_seconds: 0,
        ..EtlConfig::default()
    }
}

#[test]
fn failed_entity_does_not_block_independent_entities() -> Result<()> {
    let Some(url) = test_database_url("failed_entity_does_not_block_independent_entities") else {
        return Ok(());
    };

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let analytics = db::connect(&url).await?;
        reset_analytics(&analytics).await?;
        reset_source(&analytics, Some("staff")).await?;

        let source = source_pool(&url).await?;
        let pipeline = EtlPipeline::new(full_run_config(), source, analytics.clone());
        let report = pipeline.run(false).await?;

        assert_eq!(report.status, RunStatus::CompletedWithErrors);
        assert_eq!(report.failed_entities(), vec!["staff"]);
        assert!(report.results["shops"].success);
        assert!(report.results["customer_analytics"].success);
        assert!(report.results["visit_analytics"].success);
        assert!(report.results["service_preferences"].success);

        // The independent entities' rows are committed despite the failure.
        let shops: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shops")
            .fetch_one(&analytics)
            .await?;
        assert_eq!(shops, 1);
        let customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_analytics")
            .fetch_one(&analytics)
            .await?;
        assert_eq!(customers, 2);
        Ok(())
    })
}

#[test]
fn foundational_failure_skips_derived_steps_but_not_visits() -> Result<()> {
    let Some(url) = test_database_url("foundational_failure_skips_derived_steps_but_not_visits")
    else {
        return Ok(());
    };

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let analytics = db::connect(&url).await?;
        reset_analytics(&analytics).await?;
        reset_source(&analytics, Some("customers")).await?;

        let source = source_pool(&url).await?;
        let pipeline = EtlPipeline::new(full_run_config(), source, analytics.clone());
        let report = pipeline.run(false).await?;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(!report.results["customer_analytics"].success);

        // Visits extract straight from the source, so they keep loading.
        assert!(report.results["visit_analytics"].success);
        let visits: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visit_analytics")
            .fetch_one(&analytics)
            .await?;
        assert_eq!(visits, 2);

        let preferences = &report.results["service_preferences"];
        assert!(!preferences.success);
        let message = preferences.error_message.as_deref().unwrap_or_default();
        assert!(message.contains("skipped"));
        assert!(message.contains("customer_analytics"));

        let tags = &report.results["service_tags"];
        assert!(!tags.success);
        assert!(tags
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("service_preferences"));

        // Skipped steps still leave an audit row.
        let status: String = sqlx::query_scalar(
            "SELECT status FROM etl_metadata WHERE table_name = 'customer_service_preferences'",
        )
        .fetch_one(&analytics)
        .await?;
        assert_eq!(status, "failed");
        Ok(())
    })
}
