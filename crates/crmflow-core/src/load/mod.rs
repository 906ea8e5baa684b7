//! Idempotent loading into the analytical store.
//!
//! Three load shapes exist, fixed per entity and never mixed on one
//! entity's path:
//!
//! - UPSERT by primary key (customer analytics, preferences, tags), with
//!   inserts and updates counted separately via `RETURNING (xmax = 0)`.
//! - Windowed delete-then-insert (visit facts): the processing window is
//!   cleared once in `prepare`, then fresh chunks are bulk-inserted.
//! - Full replace (shop/service/staff reference tables).
//!
//! Every write failure maps to [`crate::error::EtlError::Load`]; metadata
//! bookkeeping is written even for failed steps so the next run can reason
//! about this one.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::db::DbPool;
use crate::error::Result;
use crate::extract::TimeWindow;
use crate::records::EtlMetadataRow;
use crate::result::EtlResult;

mod customer_analytics;
mod preference;
mod reference;
mod schema;
mod tags;
mod visit_analytics;

pub use customer_analytics::CustomerAnalyticsLoader;
pub use preference::{fetch_preferences, ServicePreferenceLoader};
pub use reference::{ServiceLoader, ShopLoader, StaffLoader};
pub use schema::ensure_schema;
pub use tags::ServiceTagsLoader;
pub use visit_analytics::VisitAnalyticsLoader;

/// Row counts from one load call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl LoadOutcome {
    pub fn absorb(&mut self, other: LoadOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

/// Sink for transformed chunks of one entity.
pub trait Loader {
    type Record;

    /// Logical table the loader writes, used for metadata bookkeeping.
    fn table(&self) -> &'static str;

    /// Called once before the first chunk. Windowed and full-replace
    /// loaders clear stale rows here; upsert loaders do nothing.
    fn prepare(
        &self,
        window: Option<&TimeWindow>,
    ) -> impl Future<Output = Result<u64>> + Send {
        let _ = window;
        async { Ok(0) }
    }

    fn load(
        &self,
        chunk: &[Self::Record],
    ) -> impl Future<Output = Result<LoadOutcome>> + Send;
}

/// Writes (or overwrites) the ETL metadata record for `table` covering the
/// current run. Called for failed steps too, so a failure here must never
/// mask the step's own outcome; callers log and move on.
pub async fn update_metadata(
    pool: &DbPool,
    table: &str,
    result: &EtlResult,
    watermark: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO etl_metadata (
            table_name, last_updated, records_processed, records_inserted,
            records_updated, records_deleted, processing_time_seconds,
            status, error_message, watermark
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (table_name) DO UPDATE SET
            last_updated = EXCLUDED.last_updated,
            records_processed = EXCLUDED.records_processed,
            records_inserted = EXCLUDED.records_inserted,
            records_updated = EXCLUDED.records_updated,
            records_deleted = EXCLUDED.records_deleted,
            processing_time_seconds = EXCLUDED.processing_time_seconds,
            status = EXCLUDED.status,
            error_message = EXCLUDED.error_message,
            watermark = EXCLUDED.watermark
        "#,
    )
    .bind(table)
    .bind(Utc::now())
    .bind(result.records_processed as i64)
    .bind(result.records_inserted as i64)
    .bind(result.records_updated as i64)
    .bind(result.records_deleted as i64)
    .bind(result.processing_time_seconds)
    .bind(result.status_label())
    .bind(&result.error_message)
    .bind(watermark)
    .execute(pool)
    .await?;

    Ok(())
}

/// Watermark recorded for `table` by the last run, if any.
pub async fn read_watermark(pool: &DbPool, table: &str) -> Result<Option<DateTime<Utc>>> {
    let watermark: Option<Option<DateTime<Utc>>> =
        sqlx::query_scalar("SELECT watermark FROM etl_metadata WHERE table_name = $1")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    Ok(watermark.flatten())
}

/// All metadata rows, most recently updated first. Backs the `status` CLI.
pub async fn read_metadata(pool: &DbPool) -> Result<Vec<EtlMetadataRow>> {
    let rows = sqlx::query_as::<_, EtlMetadataRow>(
        "SELECT * FROM etl_metadata ORDER BY last_updated DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
