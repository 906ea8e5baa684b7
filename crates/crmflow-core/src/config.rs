use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{EtlError, Result};

/// Largest window a non-incremental (or first) extraction may cover.
const FULL_EXTRACT_LOOKBACK_DAYS: i64 = 365;

/// Tuning knobs for one pipeline run. Built once at pipeline construction
/// and read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub batch_size: usize,
    pub chunk_size: usize,
    pub max_workers: usize,

    pub incremental: bool,
    /// Safety margin re-read behind the watermark so late-arriving source
    /// updates are not missed.
    pub lookback_days: i64,

    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub query_timeout_seconds: u64,

    pub data_quality_checks: bool,
    pub null_threshold: f64,
    pub duplicate_threshold: f64,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            chunk_size: 1_000,
            max_workers: 4,
            incremental: true,
            lookback_days: 7,
            max_retries: 3,
            retry_delay_seconds: 60,
            query_timeout_seconds: 300,
            data_quality_checks: true,
            null_threshold: 0.1,
            duplicate_threshold: 0.05,
        }
    }
}

impl EtlConfig {
    pub fn production() -> Self {
        Self {
            batch_size: 50_000,
            chunk_size: 5_000,
            max_workers: 8,
            max_retries: 5,
            query_timeout_seconds: 600,
            ..Self::default()
        }
    }

    pub fn development() -> Self {
        Self {
            batch_size: 1_000,
            chunk_size: 100,
            max_workers: 2,
            lookback_days: 1,
            query_timeout_seconds: 60,
            ..Self::default()
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: EtlConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EtlError::Config("chunk_size must be positive".into()));
        }
        if self.batch_size < self.chunk_size {
            return Err(EtlError::Config(format!(
                "batch_size {} smaller than chunk_size {}",
                self.batch_size, self.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.null_threshold) {
            return Err(EtlError::Config(format!(
                "null_threshold {} outside [0, 1]",
                self.null_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.duplicate_threshold) {
            return Err(EtlError::Config(format!(
                "duplicate_threshold {} outside [0, 1]",
                self.duplicate_threshold
            )));
        }
        if self.lookback_days < 0 {
            return Err(EtlError::Config("lookback_days must be >= 0".into()));
        }
        Ok(())
    }

    /// Start of the extraction window for an incremental run.
    ///
    /// `watermark - lookback_days` when a prior watermark exists; otherwise
    /// the full-history bound so a first run never issues an unbounded scan.
    pub fn incremental_start(&self, last_run: Option<DateTime<Utc>>) -> DateTime<Utc> {
        match last_run {
            Some(watermark) if self.incremental => {
                watermark - chrono::Duration::days(self.lookback_days)
            }
            _ => Utc::now() - chrono::Duration::days(FULL_EXTRACT_LOOKBACK_DAYS),
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_start_applies_lookback_margin() {
        let config = EtlConfig::default();
        let watermark = Utc::now();
        let start = config.incremental_start(Some(watermark));
        assert_eq!(watermark - start, chrono::Duration::days(7));
    }

    #[test]
    fn first_run_is_bounded_to_one_year() {
        let config = EtlConfig::default();
        let start = config.incremental_start(None);
        let age = Utc::now() - start;
        assert!(age >= chrono::Duration::days(364));
        assert!(age <= chrono::Duration::days(366));
    }

    #[test]
    fn non_incremental_config_ignores_watermark() {
        let config = EtlConfig {
            incremental: false,
            ..EtlConfig::default()
        };
        let start = config.incremental_start(Some(Utc::now()));
        assert!(Utc::now() - start >= chrono::Duration::days(364));
    }

    #[test]
    fn validate_rejects_bad_thresholds() {
        let config = EtlConfig {
            null_threshold: 1.5,
            ..EtlConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EtlConfig {
            chunk_size: 0,
            ..EtlConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn presets_differ_in_scale() {
        let prod = EtlConfig::production();
        let dev = EtlConfig::development();
        assert!(prod.chunk_size > dev.chunk_size);
        assert!(prod.max_retries > dev.max_retries);
        assert_eq!(dev.lookback_days, 1);
    }
}
