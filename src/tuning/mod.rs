pub mod choice;
pub mod evaluator;
pub mod selector;
pub mod walker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::cache::QueryPlanCache;
use crate::catalog::Catalog;
use crate::config::TunerConfig;

use self::choice::TuningOperation;
use self::evaluator::{build_choices, IndexEvaluator, SavedWorkEvaluator};
use self::selector::GreedySelector;
use self::walker::PlanWalker;

/*
    The tuning control loop. One execute() call is one pass:

        walk cache -> aggregate -> evaluate -> select -> apply

    The read phase only takes shared locks (a cache snapshot and statistics
    reads); the apply phase goes through the catalog mutators. Everything
    about workload shape and statistics is best effort -- only handing the
    tuner an MVCC plan pipeline is a contract violation and fails the pass.
*/

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum TuningError {
    /// The caller passed a scan tree containing MVCC validation. Tuning
    /// pipelines must be planned without MVCC.
    #[error("table scan over an mvcc validate input; run the tuning pipeline without mvcc")]
    PreconditionViolated,
}

/// Everything a pass reads its inputs from. Threaded through the walker
/// and evaluator explicitly; the tuner keeps no process wide state.
pub struct TuningContext<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a TunerConfig,
}

/// Outcome of one operation of the apply phase.
#[derive(Debug, Clone)]
pub struct AppliedOperation {
    pub operation: TuningOperation,
    pub predicted_saved_work: f32,
    pub succeeded: bool,
}

/// Structured per-pass summary, also emitted to the log.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub access_records: usize,
    pub candidates: usize,
    pub memory_before_mib: f32,
    pub memory_after_mib: f32,
    pub creates: usize,
    pub drops: usize,
    pub operations: Vec<AppliedOperation>,
    pub truncated_walk: bool,
    pub cancelled: bool,
}

pub struct Tuner<C: QueryPlanCache> {
    cache: Arc<C>,
    catalog: Catalog,
    config: TunerConfig,
    evaluator: Box<dyn IndexEvaluator>,
    selector: GreedySelector,
    cancel: Arc<AtomicBool>,
}

impl<C: QueryPlanCache> Tuner<C> {
    pub fn new(cache: Arc<C>, catalog: Catalog, config: TunerConfig) -> Tuner<C> {
        let selector = GreedySelector::from_config(&config);
        Tuner {
            cache,
            catalog,
            config,
            evaluator: Box::new(SavedWorkEvaluator::new()),
            selector,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the default evaluator, e.g. with one carrying a different
    /// cost model.
    pub fn with_evaluator(mut self, evaluator: Box<dyn IndexEvaluator>) -> Tuner<C> {
        self.evaluator = evaluator;
        self
    }

    /// Flag to stop an in-flight pass. A pass only stops at operation
    /// boundaries; the catalog is left in a consistent, partially applied
    /// state and the next pass reconverges.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn execute(&mut self) -> Result<PassReport, TuningError> {
        let mut report = PassReport::default();

        let entries = match self.cache.priority_ordered_entries() {
            Some(entries) => entries,
            None => {
                warn!("query plan cache is opaque, skipping tuning pass");
                return Ok(report);
            }
        };
        if entries.is_empty() {
            warn!("no workload in the query plan cache, skipping tuning pass");
            return Ok(report);
        }

        // Read phase: walk the cached plans, most valuable entries first,
        // within the soft time budget.
        let mut walker = PlanWalker::new();
        let walk_start = Instant::now();
        for entry in &entries {
            if let Some(budget) = self.config.cache_walk_budget {
                if walk_start.elapsed() > budget {
                    warn!("cache walk exceeded its time budget, continuing with partial workload");
                    report.truncated_walk = true;
                    break;
                }
            }
            debug!(
                "walking cached plan '{}' (frequency: {}, priority: {})",
                entry.query, entry.frequency, entry.priority
            );
            walker.walk_plan(&entry.plan, entry.frequency)?;
        }
        let records = walker.into_records();
        report.access_records = records.len();

        let ctx = TuningContext { catalog: &self.catalog, config: &self.config };
        let choices = build_choices(&records, &ctx, self.evaluator.as_mut());
        report.candidates = choices.len();

        let operations = self.selector.select(&choices, self.config.memory_budget_mib);

        // Apply phase: mutate the catalog, cancellable between operations.
        // A failed operation is logged and the rest of the batch still runs.
        report.memory_before_mib =
            (self.catalog.total_index_memory() as f64 / BYTES_PER_MIB) as f32;
        let mut any_succeeded = false;
        for operation in operations {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("tuning pass cancelled, catalog left partially tuned");
                report.cancelled = true;
                break;
            }
            let predicted_saved_work = choices
                .iter()
                .find(|c| {
                    c.column_ref == operation.column_ref && c.index_type == operation.index_type
                })
                .map(|c| c.saved_work)
                .unwrap_or(0.0);
            let result = if operation.create {
                self.catalog.create_index(
                    &operation.column_ref.table_name,
                    &operation.column_ref.column_ids,
                    operation.index_type,
                )
            } else {
                self.catalog.drop_index(
                    &operation.column_ref.table_name,
                    &operation.column_ref.column_ids,
                    operation.index_type,
                )
            };
            let succeeded = match result {
                Ok(()) => {
                    debug!("applied {} (predicted saved work: {})", operation, predicted_saved_work);
                    if operation.create {
                        report.creates += 1;
                    } else {
                        report.drops += 1;
                    }
                    any_succeeded = true;
                    true
                }
                Err(e) => {
                    error!("tuning operation '{}' failed: {}", operation, e);
                    false
                }
            };
            report.operations.push(AppliedOperation {
                operation,
                predicted_saved_work,
                succeeded,
            });
        }
        report.memory_after_mib =
            (self.catalog.total_index_memory() as f64 / BYTES_PER_MIB) as f32;

        // Cached plans may no longer match the physical design
        if any_succeeded {
            self.cache.clear();
        }

        info!(
            "tuning pass: {} access records, {} candidates, memory {:.3} -> {:.3} MiB, {} creates, {} drops",
            report.access_records,
            report.candidates,
            report.memory_before_mib,
            report.memory_after_mib,
            report.creates,
            report.drops
        );
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::mock::OpaquePlanCache;
    use crate::cache::{CachedPlan, GdfsPlanCache};
    use crate::catalog::test_util::populated_table;
    use crate::execution::plan::test_util::scan_plan;
    use crate::storage::index::IndexType;
    use crate::tuning::choice::ColumnRef;
    use crate::types::{PredicateOp, TupleValue};

    fn cache_with_query(query: &str, plan: CachedPlan, frequency: u64) -> Arc<GdfsPlanCache> {
        let cache = Arc::new(GdfsPlanCache::new(64));
        for _ in 0..frequency {
            cache.put(query, plan.clone());
        }
        cache
    }

    fn equals_plan(table: &str, column_id: u32, value: i32) -> CachedPlan {
        CachedPlan::Physical(Arc::new(scan_plan(
            table, column_id, PredicateOp::Equals, TupleValue::Int(value))))
    }

    #[test]
    fn empty_workload_produces_no_operations() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 100, 10, 1);
        let cache = Arc::new(GdfsPlanCache::new(16));
        let mut tuner = Tuner::new(cache, catalog.clone(), TunerConfig::default());

        let report = tuner.execute().unwrap();
        assert!(report.operations.is_empty());
        assert_eq!(report.access_records, 0);
        assert!(catalog.table("t").unwrap().indexes().is_empty());
    }

    #[test]
    fn opaque_cache_produces_no_operations() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 100, 10, 1);
        let mut tuner = Tuner::new(Arc::new(OpaquePlanCache), catalog, TunerConfig::default());
        let report = tuner.execute().unwrap();
        assert!(report.operations.is_empty());
    }

    #[test]
    fn single_beneficial_index_is_created() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 10_000, 100, 4);
        let cache = cache_with_query("select * from t where val = 4", equals_plan("t", 1, 4), 10);
        let mut tuner = Tuner::new(cache.clone(), catalog.clone(), TunerConfig::default());

        let report = tuner.execute().unwrap();
        assert_eq!(report.creates, 1);
        assert_eq!(report.drops, 0);
        assert_eq!(report.operations.len(), 1);
        let applied = &report.operations[0];
        assert!(applied.succeeded);
        assert_eq!(applied.operation.column_ref, ColumnRef::single("t", 1));
        assert_eq!(applied.operation.index_type, IndexType::GroupKey);
        // roughly rows * (1 - 1/distinct) * frequency
        assert!(applied.predicted_saved_work > 90_000.0);
        assert!(catalog.table("t").unwrap().indexes().len() == 1);
        // structural change invalidates the plan cache
        assert!(cache.is_empty());

        // A second pass over the post-apply state is a no-op
        cache.put("select * from t where val = 4", equals_plan("t", 1, 4));
        let report = tuner.execute().unwrap();
        assert!(report.operations.is_empty());
        assert_eq!(report.candidates, 1);
    }

    #[test]
    fn budget_pressure_forces_a_swap() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 20_000, 100, 2);
        // A cold index on the high-cardinality id column
        catalog.create_index("t", &[0], IndexType::GroupKey).unwrap();
        let cold_mib =
            (catalog.total_index_memory() as f64 / (1024.0 * 1024.0)) as f32;

        let cache = cache_with_query("select * from t where val = 4", equals_plan("t", 1, 4), 10);
        let config = TunerConfig { memory_budget_mib: cold_mib, ..TunerConfig::default() };
        let mut tuner = Tuner::new(cache, catalog.clone(), config);

        let report = tuner.execute().unwrap();
        let ops: Vec<(ColumnRef, bool)> = report
            .operations
            .iter()
            .map(|a| (a.operation.column_ref.clone(), a.operation.create))
            .collect();
        assert_eq!(ops, vec![
            (ColumnRef::single("t", 0), false),
            (ColumnRef::single("t", 1), true),
        ]);
        assert!(report.operations.iter().all(|a| a.succeeded));
        assert!(report.memory_after_mib <= cold_mib);

        let live = catalog.table("t").unwrap().indexes();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].column_ids, vec![1]);
    }

    #[test]
    fn valuable_existing_index_survives_budget_pressure() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 20_000, 100, 2);
        catalog.create_index("t", &[0], IndexType::GroupKey).unwrap();
        let existing_mib =
            (catalog.total_index_memory() as f64 / (1024.0 * 1024.0)) as f32;

        // The existing index is backed by a far hotter workload than the
        // candidate on the val column
        let cache = Arc::new(GdfsPlanCache::new(64));
        for _ in 0..1000 {
            cache.put("select * from t where id = 7", equals_plan("t", 0, 7));
        }
        cache.put("select * from t where val = 4", equals_plan("t", 1, 4));

        let config = TunerConfig { memory_budget_mib: existing_mib, ..TunerConfig::default() };
        let mut tuner = Tuner::new(cache, catalog.clone(), config);

        let report = tuner.execute().unwrap();
        assert!(report.operations.is_empty());
        let live = catalog.table("t").unwrap().indexes();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].column_ids, vec![0]);
    }

    #[test]
    fn cancellation_stops_between_operations() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 10_000, 100, 2);
        let cache = cache_with_query("select * from t where val = 4", equals_plan("t", 1, 4), 10);
        let mut tuner = Tuner::new(cache, catalog.clone(), TunerConfig::default());
        tuner.cancel_flag().store(true, Ordering::Relaxed);

        let report = tuner.execute().unwrap();
        assert!(report.cancelled);
        assert!(report.operations.is_empty());
        assert!(catalog.table("t").unwrap().indexes().is_empty());
    }

    #[test]
    fn mvcc_plan_fails_the_pass() {
        use crate::execution::plan::{PhysicalOperatorKind, PhysicalPlan, ScanParameter};

        let catalog = Catalog::new();
        populated_table(&catalog, "t", 100, 10, 1);

        let mut plan = PhysicalPlan::new();
        let get_table = plan.add_operator(
            PhysicalOperatorKind::GetTable { table_name: "t".to_string() }, None, None);
        let validate = plan.add_operator(PhysicalOperatorKind::Validate, Some(get_table), None);
        let scan = plan.add_operator(
            PhysicalOperatorKind::TableScan {
                left_column_id: 1,
                predicate_op: PredicateOp::Equals,
                right_parameter: ScanParameter::Literal(TupleValue::Int(4)),
            },
            Some(validate),
            None,
        );
        plan.set_root(scan);

        let cache = cache_with_query(
            "select * from t where val = 4", CachedPlan::Physical(Arc::new(plan)), 1);
        let mut tuner = Tuner::new(cache, catalog, TunerConfig::default());
        assert!(matches!(tuner.execute(), Err(TuningError::PreconditionViolated)));
    }

    #[test]
    fn exhausted_walk_budget_truncates_the_pass() {
        let catalog = Catalog::new();
        populated_table(&catalog, "t", 1_000, 10, 1);
        let cache = cache_with_query("select * from t where val = 4", equals_plan("t", 1, 4), 10);
        let config = TunerConfig {
            cache_walk_budget: Some(std::time::Duration::ZERO),
            ..TunerConfig::default()
        };
        let mut tuner = Tuner::new(cache, catalog, config);

        let report = tuner.execute().unwrap();
        assert!(report.truncated_walk);
        assert_eq!(report.access_records, 0);
        assert!(report.operations.is_empty());
    }

    #[test]
    fn failed_operation_does_not_stop_the_batch() {
        // Scores everything the same so both candidates get created
        struct ConstantEvaluator;
        impl IndexEvaluator for ConstantEvaluator {
            fn predict_memory_cost(&self, _: &choice::IndexChoice, _: &TuningContext) -> f32 {
                1.0
            }
            fn saved_work_of(&self, _: &choice::IndexChoice, _: &TuningContext) -> f32 {
                100.0
            }
        }

        let catalog = Catalog::new();
        populated_table(&catalog, "t", 100, 10, 1);
        let cache = Arc::new(GdfsPlanCache::new(16));
        // One query hits a table that was dropped concurrently
        cache.put("select * from zz_dropped where x = 1", equals_plan("zz_dropped", 0, 1));
        cache.put("select * from t where val = 4", equals_plan("t", 1, 4));

        let mut tuner = Tuner::new(cache, catalog.clone(), TunerConfig::default())
            .with_evaluator(Box::new(ConstantEvaluator));
        let report = tuner.execute().unwrap();

        assert_eq!(report.operations.len(), 2);
        assert!(!report.operations[0].succeeded);
        assert!(report.operations[1].succeeded);
        assert_eq!(report.creates, 1);
        assert_eq!(catalog.table("t").unwrap().indexes().len(), 1);
    }

    #[test]
    fn logical_plans_drive_the_same_loop() {
        use crate::planner::{ColumnReference, LogicalNodeKind, LogicalPlan, PredicateValue};

        let catalog = Catalog::new();
        populated_table(&catalog, "t", 10_000, 100, 4);

        let mut plan = LogicalPlan::new();
        let table = plan.add_node(
            LogicalNodeKind::StoredTable { table_name: "t".to_string() }, None, None);
        let predicate = plan.add_node(
            LogicalNodeKind::Predicate {
                column: ColumnReference::Resolved { origin: table, column_id: 1 },
                op: PredicateOp::Equals,
                value: PredicateValue::Literal(TupleValue::Int(4)),
            },
            Some(table),
            None,
        );
        plan.set_root(predicate);

        let cache = cache_with_query(
            "select * from t where val = 4", CachedPlan::Logical(Arc::new(plan)), 10);
        let mut tuner = Tuner::new(cache, catalog.clone(), TunerConfig::default());
        let report = tuner.execute().unwrap();
        assert_eq!(report.creates, 1);
        assert_eq!(catalog.table("t").unwrap().indexes().len(), 1);
    }
}
