use crate::db::DbPool;
use crate::error::Result;

/// Creates every analytical table if it is missing. Safe to run before
/// every pipeline run; existing tables and their data are untouched.
pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS customer_analytics (
        customer_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        phone TEXT,
        email TEXT,
        birth_date DATE,
        gender TEXT,
        age INT,
        first_visit_date DATE,
        last_visit_date DATE,
        total_visits BIGINT NOT NULL DEFAULT 0,
        total_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
        avg_visit_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
        lifecycle_days BIGINT NOT NULL DEFAULT 0,
        days_since_last_visit BIGINT,
        visit_frequency DOUBLE PRECISION NOT NULL DEFAULT 0,
        visits_3m BIGINT NOT NULL DEFAULT 0,
        amount_3m DOUBLE PRECISION NOT NULL DEFAULT 0,
        segment TEXT NOT NULL DEFAULT 'new',
        segment_updated_at TIMESTAMPTZ NOT NULL,
        churn_risk_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        churn_risk_level TEXT NOT NULL DEFAULT 'low',
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS visit_analytics (
        visit_id BIGINT PRIMARY KEY,
        customer_id BIGINT NOT NULL,
        staff_id BIGINT,
        shop_id BIGINT NOT NULL,
        visit_date TIMESTAMPTZ NOT NULL,
        total_amount DOUBLE PRECISION NOT NULL,
        discount_amount DOUBLE PRECISION NOT NULL,
        final_amount DOUBLE PRECISION NOT NULL,
        service_count BIGINT NOT NULL,
        service_categories TEXT[] NOT NULL DEFAULT '{}',
        service_names TEXT[] NOT NULL DEFAULT '{}',
        visit_hour INT NOT NULL,
        visit_weekday INT NOT NULL,
        visit_month INT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_visit_analytics_customer ON visit_analytics (customer_id)",
    "CREATE INDEX IF NOT EXISTS idx_visit_analytics_date ON visit_analytics (visit_date)",
    r#"
    CREATE TABLE IF NOT EXISTS customer_service_preferences (
        customer_id BIGINT NOT NULL,
        service_id BIGINT NOT NULL,
        service_name TEXT NOT NULL,
        service_category TEXT NOT NULL,
        total_visits BIGINT NOT NULL,
        total_amount DOUBLE PRECISION NOT NULL,
        avg_amount DOUBLE PRECISION NOT NULL,
        first_service_date DATE NOT NULL,
        last_service_date DATE NOT NULL,
        days_since_last_service BIGINT NOT NULL,
        preference_rank INT NOT NULL,
        visit_ratio DOUBLE PRECISION NOT NULL,
        amount_ratio DOUBLE PRECISION NOT NULL,
        recent_visits_3m BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (customer_id, service_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS customer_service_tags (
        customer_id BIGINT PRIMARY KEY,
        top_service_1 TEXT,
        top_service_2 TEXT,
        top_service_3 TEXT,
        preferred_categories TEXT[] NOT NULL DEFAULT '{}',
        avg_service_price DOUBLE PRECISION NOT NULL,
        preferred_price_range TEXT NOT NULL,
        service_variety_score DOUBLE PRECISION NOT NULL,
        loyalty_services TEXT[] NOT NULL DEFAULT '{}',
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS shops (
        shop_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        address TEXT,
        phone TEXT,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS services (
        service_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        duration_minutes INT,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS staff (
        staff_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        shop_id BIGINT NOT NULL,
        role TEXT,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS etl_metadata (
        table_name TEXT PRIMARY KEY,
        last_updated TIMESTAMPTZ NOT NULL,
        records_processed BIGINT NOT NULL DEFAULT 0,
        records_inserted BIGINT NOT NULL DEFAULT 0,
        records_updated BIGINT NOT NULL DEFAULT 0,
        records_deleted BIGINT NOT NULL DEFAULT 0,
        processing_time_seconds DOUBLE PRECISION NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        error_message TEXT,
        watermark TIMESTAMPTZ
    )
    "#,
];
