//! Chunked extraction from the source CRM database.
//!
//! Extractors stream fixed-size chunks through LIMIT/OFFSET pages over a
//! stable ORDER BY, so memory stays bounded regardless of source table
//! size. A fresh call re-issues the query; streams are not restartable
//! mid-flight. Query failures map to [`crate::error::EtlError::DataSource`]
//! and are never retried here; retry is the orchestrator's job.

use chrono::{DateTime, Utc};

use crate::config::EtlConfig;
use crate::error::Result;

mod customers;
mod services;
mod shops;
mod staff;
mod visit_services;
mod visits;

pub use customers::CustomerExtractor;
pub use services::ServiceExtractor;
pub use shops::ShopExtractor;
pub use staff::StaffExtractor;
pub use visit_services::VisitServiceExtractor;
pub use visits::VisitExtractor;

/// Half-open extraction window `[start, end)` on the source-side
/// modification timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Incremental window anchored `lookback_days` behind the watermark
    /// (or a bounded full-history window when no watermark exists).
    pub fn incremental(config: &EtlConfig, last_run: Option<DateTime<Utc>>) -> Self {
        Self {
            start: config.incremental_start(last_run),
            end: Utc::now(),
        }
    }
}

/// A source entity that can be pulled in bounded, ordered chunks.
pub trait ChunkSource {
    type Record;

    /// Entity name used in logs and result maps.
    fn entity(&self) -> &'static str;

    /// Fetches one page of at most `limit` rows starting at `offset`,
    /// optionally restricted to a modification-time window. Pages are
    /// ordered by primary key; an empty page terminates the stream.
    fn fetch_chunk(
        &self,
        window: Option<&TimeWindow>,
        offset: i64,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Self::Record>>> + Send;

    /// Watermark: the greatest source-side modification timestamp, used to
    /// seed the next incremental window.
    fn last_update_time(&self)
        -> impl std::future::Future<Output = Result<Option<DateTime<Utc>>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_window_starts_behind_watermark() {
        let config = EtlConfig::default();
        let watermark = Utc::now() - chrono::Duration::hours(2);
        let window = TimeWindow::incremental(&config, Some(watermark));
        assert_eq!(
            watermark - window.start,
            chrono::Duration::days(config.lookback_days)
        );
        assert!(window.end >= watermark);
    }
}
