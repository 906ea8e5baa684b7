use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Outcome of one ETL step. Created fresh per step, immutable once
/// returned; the orchestrator aggregates these across steps.
#[derive(Debug, Clone, Serialize)]
pub struct EtlResult {
    pub success: bool,
    pub records_processed: u64,
    pub records_inserted: u64,
    pub records_updated: u64,
    pub records_deleted: u64,
    pub processing_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl EtlResult {
    pub fn success() -> Self {
        Self {
            success: true,
            records_processed: 0,
            records_inserted: 0,
            records_updated: 0,
            records_deleted: 0,
            processing_time_seconds: 0.0,
            error_message: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            ..Self::success()
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.success {
            "completed"
        } else {
            "failed"
        }
    }
}

/// Overall disposition of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Per-run receipt: one result per entity plus the combined rollup.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub dry_run: bool,
    pub results: BTreeMap<String, EtlResult>,
    pub combined: EtlResult,
}

impl RunReport {
    /// Builds the report from per-entity results. `foundational` names the
    /// entity whose failure invalidates the whole run.
    pub fn from_results(
        run_id: Uuid,
        dry_run: bool,
        results: BTreeMap<String, EtlResult>,
        foundational: &str,
    ) -> Self {
        let combined = aggregate_results(&results);
        let status = run_status(&results, foundational);
        Self {
            run_id,
            status,
            dry_run,
            results,
            combined,
        }
    }

    pub fn failed_entities(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, result)| !result.success)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Sums counts across steps, ANDs success, and joins error messages.
pub fn aggregate_results(results: &BTreeMap<String, EtlResult>) -> EtlResult {
    let mut combined = EtlResult::success();
    let mut errors: Vec<String> = Vec::new();

    for (name, result) in results {
        combined.records_processed += result.records_processed;
        combined.records_inserted += result.records_inserted;
        combined.records_updated += result.records_updated;
        combined.records_deleted += result.records_deleted;
        combined.processing_time_seconds += result.processing_time_seconds;

        if !result.success {
            combined.success = false;
            if let Some(message) = &result.error_message {
                errors.push(format!("{name}: {message}"));
            }
        }
    }

    if !errors.is_empty() {
        combined.error_message = Some(errors.join("; "));
    }
    combined
}

fn run_status(results: &BTreeMap<String, EtlResult>, foundational: &str) -> RunStatus {
    let foundational_failed = results
        .get(foundational)
        .map(|result| !result.success)
        .unwrap_or(false);

    if foundational_failed {
        return RunStatus::Failed;
    }
    if results.values().any(|result| !result.success) {
        RunStatus::CompletedWithErrors
    } else {
        RunStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(processed: u64, inserted: u64, updated: u64) -> EtlResult {
        EtlResult {
            records_processed: processed,
            records_inserted: inserted,
            records_updated: updated,
            ..EtlResult::success()
        }
    }

    #[test]
    fn aggregate_sums_counts_and_joins_errors() {
        let mut results = BTreeMap::new();
        results.insert("customers".to_string(), counted(10, 6, 4));
        results.insert("visits".to_string(), counted(20, 20, 0));
        results.insert(
            "tags".to_string(),
            EtlResult::failure("tag load exploded"),
        );

        let combined = aggregate_results(&results);
        assert!(!combined.success);
        assert_eq!(combined.records_processed, 30);
        assert_eq!(combined.records_inserted, 26);
        assert_eq!(combined.records_updated, 4);
        assert_eq!(
            combined.error_message.as_deref(),
            Some("tags: tag load exploded")
        );
    }

    #[test]
    fn foundational_failure_marks_run_failed() {
        let mut results = BTreeMap::new();
        results.insert(
            "customer_analytics".to_string(),
            EtlResult::failure("source down"),
        );
        results.insert("shops".to_string(), counted(3, 3, 0));

        let report =
            RunReport::from_results(Uuid::new_v4(), false, results, "customer_analytics");
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.failed_entities(), vec!["customer_analytics"]);
    }

    #[test]
    fn non_foundational_failure_completes_with_errors() {
        let mut results = BTreeMap::new();
        results.insert("customer_analytics".to_string(), counted(5, 5, 0));
        results.insert("service_tags".to_string(), EtlResult::failure("boom"));

        let report =
            RunReport::from_results(Uuid::new_v4(), false, results, "customer_analytics");
        assert_eq!(report.status, RunStatus::CompletedWithErrors);
    }

    #[test]
    fn clean_run_is_completed() {
        let mut results = BTreeMap::new();
        results.insert("customer_analytics".to_string(), counted(5, 5, 0));

        let report =
            RunReport::from_results(Uuid::new_v4(), false, results, "customer_analytics");
        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.failed_entities().is_empty());
    }
}
