//! Pipeline orchestration: entity order, chunk loop, retry, dependency
//! skips and the per-run receipt.
//!
//! A run never aborts mid-flight because one entity failed. Reference
//! tables load first, then the foundational customer rollup; everything
//! downstream of a failed dependency is recorded as a
//! [`EtlError::DependencyFailure`] rather than silently dropped. The
//! per-entity receipts roll up into a [`RunReport`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::aggregates::{recompute_customer_stats, rescore_churn};
use crate::config::EtlConfig;
use crate::db::DbPool;
use crate::error::{EtlError, Result};
use crate::extract::{
    ChunkSource, CustomerExtractor, ServiceExtractor, ShopExtractor, StaffExtractor,
    TimeWindow, VisitExtractor, VisitServiceExtractor,
};
use crate::load::{
    ensure_schema, fetch_preferences, read_watermark, update_metadata,
    CustomerAnalyticsLoader, LoadOutcome, Loader, ServiceLoader, ServicePreferenceLoader,
    ServiceTagsLoader, ShopLoader, StaffLoader, VisitAnalyticsLoader,
};
use crate::result::{EtlResult, RunReport};
use crate::scoring::{ChurnScorer, HeuristicScorer};
use crate::transform::{
    CustomerAnalyticsTransformer, PassthroughTransformer, ServicePreferenceTransformer,
    ServiceTagsTransformer, Transform, VisitAnalyticsTransformer,
};

/// Entity whose failure invalidates the whole run.
pub const FOUNDATIONAL_ENTITY: &str = "customer_analytics";

/// Result recorded for a step that never ran because `dependency` failed.
pub fn dependency_skip(dependency: &str) -> EtlResult {
    EtlResult::failure(
        EtlError::DependencyFailure(format!("skipped: {dependency} did not complete")).to_string(),
    )
}

/// Runs one extract-transform-load step to completion: clears the loader's
/// window once, then streams ordered chunks through the quality gate until
/// the source is drained. Retryable failures restart the whole step (the
/// prepare step is idempotent); a quality breach fails it immediately.
pub async fn run_entity_step<S, T, L>(
    config: &EtlConfig,
    extractor: &S,
    transformer: &T,
    loader: &L,
    window: Option<&TimeWindow>,
) -> EtlResult
where
    S: ChunkSource,
    T: Transform<Input = S::Record>,
    L: Loader<Record = T::Output>,
{
    let entity = extractor.entity();
    let started = Instant::now();
    let mut attempt: u32 = 0;

    let outcome = loop {
        match run_attempt(config, extractor, transformer, loader, window).await {
            Ok(counts) => break Ok(counts),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                warn!(entity, attempt, error = %err, "step failed, retrying");
                tokio::time::sleep(config.retry_delay()).await;
            }
            Err(err) => break Err(err),
        }
    };

    finish_step(entity, started, outcome)
}

async fn run_attempt<S, T, L>(
    config: &EtlConfig,
    extractor: &S,
    transformer: &T,
    loader: &L,
    window: Option<&TimeWindow>,
) -> Result<(u64, LoadOutcome)>
where
    S: ChunkSource,
    T: Transform<Input = S::Record>,
    L: Loader<Record = T::Output>,
{
    let deleted = loader.prepare(window).await?;
    let mut outcome = LoadOutcome {
        deleted,
        ..LoadOutcome::default()
    };

    let limit = config.chunk_size as i64;
    let mut offset = 0i64;
    let mut processed = 0u64;

    loop {
        let chunk = timeout(
            config.query_timeout(),
            extractor.fetch_chunk(window, offset, limit),
        )
        .await
        .map_err(|_| {
            EtlError::DataSource(format!("{}: chunk fetch timed out", extractor.entity()))
        })??;

        if chunk.is_empty() {
            break;
        }
        let fetched = chunk.len();
        processed += fetched as u64;

        let rows = transformer.transform_batch(config, chunk)?;

        let loaded = timeout(config.query_timeout(), loader.load(&rows))
            .await
            .map_err(|_| EtlError::Load(format!("{}: load timed out", loader.table())))??;
        outcome.absorb(loaded);

        // A short page means the source is drained.
        if fetched < limit as usize {
            break;
        }
        offset += limit;
    }

    Ok((processed, outcome))
}

fn finish_step(
    entity: &str,
    started: Instant,
    outcome: Result<(u64, LoadOutcome)>,
) -> EtlResult {
    let elapsed = started.elapsed().as_secs_f64();
    match outcome {
        Ok((processed, counts)) => {
            info!(
                entity,
                processed,
                inserted = counts.inserted,
                updated = counts.updated,
                deleted = counts.deleted,
                elapsed_seconds = elapsed,
                "step completed"
            );
            EtlResult {
                records_processed: processed,
                records_inserted: counts.inserted,
                records_updated: counts.updated,
                records_deleted: counts.deleted,
                processing_time_seconds: elapsed,
                ..EtlResult::success()
            }
        }
        Err(err) => {
            error!(entity, error = %err, elapsed_seconds = elapsed, "step failed");
            EtlResult {
                processing_time_seconds: elapsed,
                ..EtlResult::failure(err.to_string())
            }
        }
    }
}

/// End-to-end CRM analytics pipeline over a source and an analytical
/// Postgres database.
pub struct EtlPipeline {
    config: EtlConfig,
    source: DbPool,
    analytics: DbPool,
    scorer: Arc<dyn ChurnScorer>,
}

impl EtlPipeline {
    pub fn new(config: EtlConfig, source: DbPool, analytics: DbPool) -> Self {
        Self::with_scorer(config, source, analytics, Arc::new(HeuristicScorer::default()))
    }

    pub fn with_scorer(
        config: EtlConfig,
        source: DbPool,
        analytics: DbPool,
        scorer: Arc<dyn ChurnScorer>,
    ) -> Self {
        Self {
            config,
            source,
            analytics,
            scorer,
        }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Runs every entity in dependency order and returns the run receipt.
    /// Only setup failures (schema bootstrap) abort the run; entity
    /// failures are captured in the receipt.
    ///
    /// A dry run validates the configuration and probes both databases,
    /// then returns without any extraction or load I/O.
    pub async fn run(&self, dry_run: bool) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            dry_run,
            incremental = self.config.incremental,
            "starting pipeline run"
        );

        self.config.validate()?;

        if dry_run {
            sqlx::query("SELECT 1").execute(&self.source).await?;
            sqlx::query("SELECT 1").execute(&self.analytics).await?;
            info!(%run_id, "dry run: configuration and connectivity verified");
            return Ok(RunReport::from_results(
                run_id,
                true,
                BTreeMap::new(),
                FOUNDATIONAL_ENTITY,
            ));
        }

        ensure_schema(&self.analytics).await?;

        let mut results: BTreeMap<String, EtlResult> = BTreeMap::new();

        // Reference tables first; they have no dependencies and the fact
        // tables join against them.
        let shops = self
            .run_source_entity(
                &ShopExtractor::new(self.source.clone()),
                &PassthroughTransformer::new(),
                &ShopLoader::new(self.analytics.clone()),
                false,
            )
            .await;
        results.insert("shops".into(), shops);

        let services = self
            .run_source_entity(
                &ServiceExtractor::new(self.source.clone()),
                &PassthroughTransformer::new(),
                &ServiceLoader::new(self.analytics.clone()),
                false,
            )
            .await;
        results.insert("services".into(), services);

        let staff = self
            .run_source_entity(
                &StaffExtractor::new(self.source.clone()),
                &PassthroughTransformer::new(),
                &StaffLoader::new(self.analytics.clone()),
                false,
            )
            .await;
        results.insert("staff".into(), staff);

        let customers = self
            .run_source_entity(
                &CustomerExtractor::new(self.source.clone()),
                &CustomerAnalyticsTransformer::new(self.scorer.clone()),
                &CustomerAnalyticsLoader::new(self.analytics.clone()),
                true,
            )
            .await;
        let customers_ok = customers.success;
        results.insert(FOUNDATIONAL_ENTITY.into(), customers);

        // Visits are a source entity in their own right, so a customers
        // failure does not block them; only the derived steps below skip.
        let visits = self
            .run_source_entity(
                &VisitExtractor::new(self.source.clone()),
                &VisitAnalyticsTransformer,
                &VisitAnalyticsLoader::new(self.analytics.clone()),
                true,
            )
            .await;
        let visits_ok = visits.success;
        results.insert("visit_analytics".into(), visits);

        let preferences = if customers_ok {
            self.run_source_entity(
                &VisitServiceExtractor::new(self.source.clone()),
                &ServicePreferenceTransformer,
                &ServicePreferenceLoader::new(self.analytics.clone()),
                true,
            )
            .await
        } else {
            let skipped = dependency_skip(FOUNDATIONAL_ENTITY);
            self.record_skip("customer_service_preferences", &skipped)
                .await;
            skipped
        };
        let preferences_ok = preferences.success;
        results.insert("service_preferences".into(), preferences);

        let tags = if preferences_ok {
            self.run_tags_step().await
        } else {
            dependency_skip("service_preferences")
        };
        self.record_metadata("customer_service_tags", &tags, None)
            .await;
        results.insert("service_tags".into(), tags);

        let stats = if customers_ok && visits_ok {
            self.run_stats_step().await
        } else if customers_ok {
            dependency_skip("visit_analytics")
        } else {
            dependency_skip(FOUNDATIONAL_ENTITY)
        };
        self.record_metadata("customer_stats", &stats, None)
            .await;
        results.insert("customer_stats".into(), stats);

        let report = RunReport::from_results(run_id, false, results, FOUNDATIONAL_ENTITY);
        info!(
            %run_id,
            status = ?report.status,
            processed = report.combined.records_processed,
            inserted = report.combined.records_inserted,
            updated = report.combined.records_updated,
            deleted = report.combined.records_deleted,
            "pipeline run finished"
        );
        Ok(report)
    }

    /// One DB-backed entity: resolves the incremental window from the
    /// stored watermark, runs the step and records metadata. The watermark
    /// only advances on success.
    async fn run_source_entity<S, T, L>(
        &self,
        extractor: &S,
        transformer: &T,
        loader: &L,
        windowed: bool,
    ) -> EtlResult
    where
        S: ChunkSource,
        T: Transform<Input = S::Record>,
        L: Loader<Record = T::Output>,
    {
        let prior_watermark = if windowed && self.config.incremental {
            match read_watermark(&self.analytics, loader.table()).await {
                Ok(watermark) => watermark,
                Err(err) => {
                    warn!(table = loader.table(), error = %err, "watermark read failed");
                    None
                }
            }
        } else {
            None
        };

        let window = (windowed && self.config.incremental)
            .then(|| TimeWindow::incremental(&self.config, prior_watermark));

        // Captured before extraction so rows modified mid-run fall inside
        // the next window's lookback margin.
        let next_watermark = match extractor.last_update_time().await {
            Ok(watermark) => watermark,
            Err(err) => {
                warn!(entity = extractor.entity(), error = %err, "watermark query failed");
                None
            }
        };

        let result = run_entity_step(
            &self.config,
            extractor,
            transformer,
            loader,
            window.as_ref(),
        )
        .await;

        let watermark = if result.success {
            next_watermark.or(prior_watermark)
        } else {
            prior_watermark
        };
        self.record_metadata(loader.table(), &result, watermark).await;

        result
    }

    /// Tag derivation reads the freshly loaded preference table back out of
    /// the analytical store rather than re-extracting from the source.
    async fn run_tags_step(&self) -> EtlResult {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        let outcome = loop {
            match self.tags_attempt().await {
                Ok(counts) => break Ok(counts),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(entity = "service_tags", attempt, error = %err, "step failed, retrying");
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(err) => break Err(err),
            }
        };

        finish_step("service_tags", started, outcome)
    }

    async fn tags_attempt(&self) -> Result<(u64, LoadOutcome)> {
        let preferences = fetch_preferences(&self.analytics).await?;
        if preferences.is_empty() {
            return Ok((0, LoadOutcome::default()));
        }
        let processed = preferences.len() as u64;

        let rows = ServiceTagsTransformer.transform_batch(&self.config, preferences)?;

        let loader = ServiceTagsLoader::new(self.analytics.clone());
        let outcome = loader.load(&rows).await?;
        Ok((processed, outcome))
    }

    /// Set-based refresh of the customer visit aggregates, then a churn
    /// re-score against the real numbers.
    async fn run_stats_step(&self) -> EtlResult {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        let outcome = loop {
            let attempt_result = async {
                let refreshed = recompute_customer_stats(&self.analytics).await?;
                let rescored = rescore_churn(&self.analytics, self.scorer.as_ref()).await?;
                Ok::<_, EtlError>((refreshed, rescored))
            }
            .await;

            match attempt_result {
                Ok(counts) => break Ok(counts),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(entity = "customer_stats", attempt, error = %err, "step failed, retrying");
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(err) => break Err(err),
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok((refreshed, rescored)) => {
                info!(refreshed, rescored, "customer stats recomputed");
                let mut result = EtlResult {
                    records_processed: rescored,
                    records_updated: refreshed,
                    processing_time_seconds: elapsed,
                    ..EtlResult::success()
                };
                result
                    .metadata
                    .insert("customers_rescored".into(), rescored.into());
                result
            }
            Err(err) => {
                error!(entity = "customer_stats", error = %err, "step failed");
                EtlResult {
                    processing_time_seconds: elapsed,
                    ..EtlResult::failure(err.to_string())
                }
            }
        }
    }

    /// A skipped step still leaves an audit row, with the stored watermark
    /// carried forward untouched.
    async fn record_skip(&self, table: &str, result: &EtlResult) {
        let watermark = match read_watermark(&self.analytics, table).await {
            Ok(watermark) => watermark,
            Err(err) => {
                warn!(table, error = %err, "watermark read failed");
                None
            }
        };
        self.record_metadata(table, result, watermark).await;
    }

    /// Metadata bookkeeping must never mask a step's own outcome.
    async fn record_metadata(
        &self,
        table: &str,
        result: &EtlResult,
        watermark: Option<DateTime<Utc>>,
    ) {
        if let Err(err) = update_metadata(&self.analytics, table, result, watermark).await {
            warn!(table, error = %err, "metadata write failed");
        }
    }
}
