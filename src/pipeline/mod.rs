//! Run orchestration
//!
//! A run prepares the scratch area once, then walks the catalog in order.
//! Each entity goes through
//!
//! ```text
//! Extracting -> EmptyDetected                  -> Reported(skipped)
//!            -> Staging -> Loading             -> Reported(loaded)
//!            (any error on the way)            -> Reported(failed)
//! ```
//!
//! Failures are isolated per entity: the loop always advances to the next
//! catalog entry. Only scratch preparation can abort a run.

mod integrity;

pub use integrity::{KeyRegistry, OrphanedKeys};

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::catalog::{EntityKind, QueryCatalog, TransformContext, TransformationDefinition};
use crate::error::{EtlError, EtlResult};
use crate::models::ResultSet;
use crate::source::Extractor;
use crate::staging::{CsvStager, ScratchArea, StagedTable};
use crate::warehouse::{Destination, LoadReport, Loader};

/// Process exit status when every entity was loaded or skipped
pub const EXIT_SUCCESS: i32 = 0;

/// Process exit status of a fatal setup or configuration error
pub const EXIT_FATAL: i32 = 1;

/// Process exit status when at least one entity failed
pub const EXIT_PARTIAL_FAILURE: i32 = 2;

/// Orchestrator state, as reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    ScratchPrepared,
    Extracting,
    EmptyDetected,
    Staging,
    Loading,
    Reported,
}

/// Terminal outcome of one entity
#[derive(Debug, Clone)]
pub enum EntityOutcome {
    /// Published with the row count reported by the warehouse
    Loaded { rows: u64 },
    /// Extraction returned no rows; nothing was loaded
    Skipped,
    /// Extraction, staging or loading failed
    Failed(EtlError),
}

impl EntityOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, EntityOutcome::Failed(_))
    }
}

impl std::fmt::Display for EntityOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityOutcome::Loaded { rows } => write!(f, "loaded ({} rows)", rows),
            EntityOutcome::Skipped => write!(f, "skipped (no rows)"),
            EntityOutcome::Failed(e) => write!(f, "failed [{}]: {}", e.kind(), e),
        }
    }
}

/// Report of one catalog entity
#[derive(Debug, Clone)]
pub struct EntityReport {
    pub entity: String,
    pub kind: EntityKind,
    pub outcome: EntityOutcome,
    /// Wall time spent on the entity in milliseconds
    pub duration_ms: u64,
    /// Staged file, when staging was reached
    pub staged: Option<StagedTable>,
    /// Warehouse job, when loading succeeded
    pub load: Option<LoadReport>,
    /// Foreign keys without a matching dimension row
    pub orphans: Vec<OrphanedKeys>,
}

impl EntityReport {
    /// Total fact rows pointing at a missing dimension row
    pub fn orphaned_rows(&self) -> usize {
        self.orphans.iter().map(|o| o.rows).sum()
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Per-entity reports, in catalog order
    pub reports: Vec<EntityReport>,
    /// Duration of the run in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn loaded(&self) -> usize {
        self.count(|o| matches!(o, EntityOutcome::Loaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, EntityOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(EntityOutcome::is_failed)
    }

    fn count(&self, predicate: impl Fn(&EntityOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Report of an entity
    pub fn report(&self, entity: &str) -> Option<&EntityReport> {
        self.reports.iter().find(|r| r.entity == entity)
    }

    /// Process exit status for this run
    ///
    /// Partial failure only changes the status when `fail_on_partial` is set.
    pub fn exit_code(&self, fail_on_partial: bool) -> i32 {
        if fail_on_partial && self.has_failures() {
            EXIT_PARTIAL_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }
}

/// What a successful pass over one entity produced
enum Processed {
    Skipped,
    Loaded {
        rows: ResultSet,
        staged: StagedTable,
        report: LoadReport,
    },
}

/// Drives extract, stage and load for every catalog entity
pub struct Orchestrator {
    catalog: QueryCatalog,
    extractor: Box<dyn Extractor>,
    loader: Loader,
    scratch_dir: PathBuf,
    ctx: TransformContext,
}

impl Orchestrator {
    /// Create an orchestrator
    ///
    /// # Arguments
    /// * `catalog` - Entities to process, in order
    /// * `extractor` - Produces the rows of an entity
    /// * `loader` - Publishes staged files
    /// * `scratch_dir` - Directory wiped and recreated at the start of a run
    /// * `ctx` - Per-run transform values (load time, locale)
    pub fn new(
        catalog: QueryCatalog,
        extractor: Box<dyn Extractor>,
        loader: Loader,
        scratch_dir: impl Into<PathBuf>,
        ctx: TransformContext,
    ) -> Self {
        Self {
            catalog,
            extractor,
            loader,
            scratch_dir: scratch_dir.into(),
            ctx,
        }
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn context(&self) -> &TransformContext {
        &self.ctx
    }

    /// Execute one full run
    ///
    /// Returns `Err` only when the scratch area cannot be prepared; every
    /// per-entity failure is captured in the summary instead.
    pub async fn run(&self) -> EtlResult<RunSummary> {
        let start = Instant::now();
        let scratch = ScratchArea::prepare(&self.scratch_dir)?;
        tracing::info!(
            state = ?RunState::ScratchPrepared,
            entities = self.catalog.len(),
            backend = self.loader.backend_type(),
            loaded_at = %self.ctx.loaded_at,
            "Starting run"
        );

        let stager = CsvStager::new(scratch);
        let mut registry = KeyRegistry::new();
        let mut summary = RunSummary::default();

        for definition in self.catalog.iter() {
            let report = self.run_entity(definition, &stager, &mut registry).await;
            summary.reports.push(report);
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            state = ?RunState::Idle,
            loaded = summary.loaded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            duration_ms = summary.duration_ms,
            "Run complete"
        );
        Ok(summary)
    }

    async fn run_entity(
        &self,
        definition: &TransformationDefinition,
        stager: &CsvStager,
        registry: &mut KeyRegistry,
    ) -> EntityReport {
        let start = Instant::now();
        let entity = definition.name();
        let mut report = EntityReport {
            entity: entity.to_string(),
            kind: definition.kind(),
            outcome: EntityOutcome::Skipped,
            duration_ms: 0,
            staged: None,
            load: None,
            orphans: Vec::new(),
        };

        match self.process(definition, stager).await {
            Ok(Processed::Skipped) => {
                tracing::warn!(
                    entity,
                    state = ?RunState::EmptyDetected,
                    "No rows extracted, load skipped"
                );
            }
            Ok(Processed::Loaded {
                rows,
                staged,
                report: load,
            }) => {
                match definition.kind() {
                    EntityKind::Dimension => registry.record(definition, &rows),
                    EntityKind::Fact => {
                        report.orphans = registry.check(definition, &rows);
                        for orphan in &report.orphans {
                            tracing::warn!(
                                entity,
                                column = %orphan.column,
                                dimension = %orphan.dimension,
                                rows = orphan.rows,
                                values = ?orphan.values,
                                "Foreign keys without a dimension row"
                            );
                        }
                    }
                }
                tracing::info!(
                    entity,
                    state = ?RunState::Reported,
                    rows = load.rows_loaded,
                    "Loaded"
                );
                report.outcome = EntityOutcome::Loaded {
                    rows: load.rows_loaded,
                };
                report.staged = Some(staged);
                report.load = Some(load);
            }
            Err(e) => {
                tracing::error!(
                    entity,
                    state = ?RunState::Reported,
                    kind = e.kind(),
                    error = %e,
                    "Entity failed"
                );
                report.outcome = EntityOutcome::Failed(e);
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    async fn process(
        &self,
        definition: &TransformationDefinition,
        stager: &CsvStager,
    ) -> EtlResult<Processed> {
        let entity = definition.name();

        tracing::info!(entity, state = ?RunState::Extracting, "Extracting");
        let rows = self.extractor.extract(definition, &self.ctx).await?;
        if rows.is_empty() {
            return Ok(Processed::Skipped);
        }

        tracing::debug!(entity, state = ?RunState::Staging, rows = rows.row_count(), "Staging");
        let staged = stager.stage(&rows, entity).await?;

        tracing::debug!(
            entity,
            state = ?RunState::Loading,
            path = %staged.path.display(),
            "Loading"
        );
        let destination = Destination::new(entity, definition.output_columns().to_vec());
        let report = self.loader.load(&staged, &destination).await?;

        Ok(Processed::Loaded {
            rows,
            staged,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(entity: &str, outcome: EntityOutcome) -> EntityReport {
        EntityReport {
            entity: entity.to_string(),
            kind: EntityKind::Dimension,
            outcome,
            duration_ms: 0,
            staged: None,
            load: None,
            orphans: Vec::new(),
        }
    }

    #[test]
    fn test_summary_counts_and_exit_code() {
        let summary = RunSummary {
            reports: vec![
                report("A", EntityOutcome::Loaded { rows: 3 }),
                report("B", EntityOutcome::Skipped),
                report("C", EntityOutcome::Failed(EtlError::QueryError("bad".into()))),
            ],
            duration_ms: 0,
        };
        assert_eq!(summary.loaded(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(summary.has_failures());
        assert_eq!(summary.exit_code(true), EXIT_PARTIAL_FAILURE);
        assert_eq!(summary.exit_code(false), EXIT_SUCCESS);
    }

    #[test]
    fn test_clean_run_exits_zero() {
        let summary = RunSummary {
            reports: vec![
                report("A", EntityOutcome::Loaded { rows: 3 }),
                report("B", EntityOutcome::Skipped),
            ],
            duration_ms: 0,
        };
        assert!(!summary.has_failures());
        assert_eq!(summary.exit_code(true), EXIT_SUCCESS);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(EntityOutcome::Loaded { rows: 2 }.to_string(), "loaded (2 rows)");
        assert_eq!(EntityOutcome::Skipped.to_string(), "skipped (no rows)");
        let failed = EntityOutcome::Failed(EtlError::SourceUnavailable("timeout".into()));
        assert!(failed.to_string().starts_with("failed [source_unavailable]"));
    }
}
