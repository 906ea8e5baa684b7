//! Chunk transformation with a data-quality gate on both sides.
//!
//! `transform_batch` validates the raw chunk, transforms it, then validates
//! the output; any threshold breach raises [`EtlError::DataQuality`] and
//! the chunk never reaches a loader.

use std::collections::HashSet;

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::records::RecordQuality;

mod customer;
mod preference;
mod reference;
mod tags;
mod visit;

pub use customer::CustomerAnalyticsTransformer;
pub use preference::ServicePreferenceTransformer;
pub use reference::PassthroughTransformer;
pub use tags::ServiceTagsTransformer;
pub use visit::VisitAnalyticsTransformer;

pub trait Transform {
    type Input: RecordQuality;
    type Output: RecordQuality;

    fn transform(&self, chunk: Vec<Self::Input>) -> Result<Vec<Self::Output>>;

    fn transform_batch(
        &self,
        config: &EtlConfig,
        chunk: Vec<Self::Input>,
    ) -> Result<Vec<Self::Output>> {
        validate_chunk(config, &chunk)?;
        let transformed = self.transform(chunk)?;
        validate_chunk(config, &transformed)?;
        Ok(transformed)
    }
}

/// Checks one chunk against the configured quality thresholds:
/// non-empty, null ratio across all columns, duplicate ratio on the
/// primary-key-like column when the record has one.
pub fn validate_chunk<R: RecordQuality>(config: &EtlConfig, records: &[R]) -> Result<()> {
    if !config.data_quality_checks {
        return Ok(());
    }

    if records.is_empty() {
        return Err(EtlError::DataQuality("empty chunk".into()));
    }

    let total_fields = records.len() * R::field_count();
    let total_nulls: usize = records.iter().map(RecordQuality::null_count).sum();
    let null_ratio = total_nulls as f64 / total_fields as f64;
    if null_ratio > config.null_threshold {
        return Err(EtlError::DataQuality(format!(
            "null ratio {null_ratio:.4} exceeds threshold {:.4}",
            config.null_threshold
        )));
    }

    let mut seen = HashSet::with_capacity(records.len());
    let mut duplicates = 0usize;
    let mut keyed = 0usize;
    for record in records {
        if let Some(key) = record.key() {
            keyed += 1;
            if !seen.insert(key) {
                duplicates += 1;
            }
        }
    }
    if keyed > 0 {
        let duplicate_ratio = duplicates as f64 / records.len() as f64;
        if duplicate_ratio > config.duplicate_threshold {
            return Err(EtlError::DataQuality(format!(
                "duplicate ratio {duplicate_ratio:.4} exceeds threshold {:.4}",
                config.duplicate_threshold
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::QualityKey;

    struct Row {
        id: i64,
        value: Option<i32>,
    }

    impl RecordQuality for Row {
        fn field_count() -> usize {
            2
        }

        fn null_count(&self) -> usize {
            usize::from(self.value.is_none())
        }

        fn key(&self) -> Option<QualityKey> {
            Some(QualityKey::Single(self.id))
        }
    }

    #[test]
    fn empty_chunk_is_rejected() {
        let config = EtlConfig::default();
        let err = validate_chunk::<Row>(&config, &[]).unwrap_err();
        assert!(matches!(err, EtlError::DataQuality(_)));
    }

    #[test]
    fn zero_null_threshold_rejects_any_null() {
        let config = EtlConfig {
            null_threshold: 0.0,
            ..EtlConfig::default()
        };
        let rows = vec![
            Row { id: 1, value: Some(1) },
            Row { id: 2, value: None },
            Row { id: 3, value: Some(3) },
        ];
        let err = validate_chunk(&config, &rows).unwrap_err();
        assert!(matches!(err, EtlError::DataQuality(_)));
    }

    #[test]
    fn null_ratio_under_threshold_passes() {
        let config = EtlConfig {
            null_threshold: 0.3,
            ..EtlConfig::default()
        };
        // 1 null out of 6 fields = 0.1667.
        let rows = vec![
            Row { id: 1, value: Some(1) },
            Row { id: 2, value: None },
            Row { id: 3, value: Some(3) },
        ];
        assert!(validate_chunk(&config, &rows).is_ok());
    }

    #[test]
    fn duplicate_keys_beyond_threshold_are_rejected() {
        let config = EtlConfig {
            duplicate_threshold: 0.0,
            ..EtlConfig::default()
        };
        let rows = vec![
            Row { id: 1, value: Some(1) },
            Row { id: 1, value: Some(2) },
        ];
        let err = validate_chunk(&config, &rows).unwrap_err();
        assert!(matches!(err, EtlError::DataQuality(_)));
    }

    #[test]
    fn disabled_checks_accept_anything() {
        let config = EtlConfig {
            data_quality_checks: false,
            ..EtlConfig::default()
        };
        assert!(validate_chunk::<Row>(&config, &[]).is_ok());
    }
}
