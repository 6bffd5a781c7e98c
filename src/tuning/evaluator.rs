use std::collections::{BTreeMap, BTreeSet};

use crate::storage::index::{predict_memory_consumption, IndexType};

use super::choice::{ColumnRef, IndexChoice};
use super::walker::AccessRecord;
use super::TuningContext;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Capability set of an index evaluator. The default implementation
/// (`SavedWorkEvaluator`) scores by unscanned rows; specialized evaluators
/// override individual capabilities and plug into the same pass pipeline.
pub trait IndexEvaluator {
    /// Called once at the beginning of a pass, before any record is processed.
    fn setup(&mut self) {}

    /// Called for every access record in arrival order during aggregation.
    fn process_access_record(&mut self, record: &AccessRecord, ctx: &TuningContext) {
        let _ = (record, ctx);
    }

    /// Index type to propose for a candidate that does not exist yet.
    fn propose_index_type(&self, choice: &IndexChoice, ctx: &TuningContext) -> IndexType {
        let _ = choice;
        ctx.config.default_index_type
    }

    /// Predicted memory footprint in MiB for a candidate that does not
    /// exist yet. Existing indexes are measured, not predicted.
    fn predict_memory_cost(&self, choice: &IndexChoice, ctx: &TuningContext) -> f32;

    /// Final signed desirability of a choice. Called after the memory cost
    /// has been filled in.
    fn saved_work_of(&self, choice: &IndexChoice, ctx: &TuningContext) -> f32;

    /// How certain this evaluator is about its estimates.
    fn confidence(&self) -> f32 {
        1.0
    }
}

/// Reduces the record buffer to the distinct column refs seen (the
/// candidate set for new indexes) while feeding every record to the
/// evaluator's aggregation hook in arrival order.
pub fn aggregate_access_records(
    records: &[AccessRecord],
    evaluator: &mut dyn IndexEvaluator,
    ctx: &TuningContext,
) -> BTreeSet<ColumnRef> {
    let mut candidates = BTreeSet::new();
    for record in records {
        candidates.insert(record.column_ref.clone());
        evaluator.process_access_record(record, ctx);
    }
    candidates
}

/// Builds the scored choice vector for one pass: one choice per live index
/// (measured) plus one per remaining workload candidate (predicted).
/// The set of choices is fixed once this returns; the selector only reads
/// their scalar fields.
pub fn build_choices(
    records: &[AccessRecord],
    ctx: &TuningContext,
    evaluator: &mut dyn IndexEvaluator,
) -> Vec<IndexChoice> {
    evaluator.setup();
    let mut candidates = aggregate_access_records(records, evaluator, ctx);

    let mut choices = Vec::new();
    for table_name in ctx.catalog.list_tables() {
        let table = match ctx.catalog.table(&table_name) {
            Some(table) => table,
            None => continue,
        };
        for info in table.indexes() {
            let column_ref = ColumnRef::new(&table_name, info.column_ids.clone());
            candidates.remove(&column_ref);
            choices.push(IndexChoice::existing(
                column_ref,
                info.index_type,
                (info.memory_consumption as f64 / BYTES_PER_MIB) as f32,
            ));
        }
    }
    for column_ref in candidates {
        choices.push(IndexChoice::proposed(column_ref, ctx.config.default_index_type));
    }

    for choice in &mut choices {
        if !choice.exists {
            choice.index_type = evaluator.propose_index_type(choice, ctx);
            choice.memory_cost = evaluator.predict_memory_cost(choice, ctx);
        }
        choice.saved_work = evaluator.saved_work_of(choice, ctx);
        choice.confidence = evaluator.confidence();
    }

    // Competing index types on the same column set are mutually exclusive
    for i in 0..choices.len() {
        for j in 0..choices.len() {
            if i != j
                && choices[i].column_ref == choices[j].column_ref
                && choices[i].index_type != choices[j].index_type
            {
                choices[i].invalidates.insert(j);
            }
        }
    }
    choices
}

/// The default evaluator: desirability is the number of rows an index
/// would keep scans from reading, summed over the workload and weighted
/// by query frequency. An optional maintenance penalty per MiB lets cold
/// indexes go net negative so the selector sheds them without budget
/// pressure.
pub struct SavedWorkEvaluator {
    saved_work: BTreeMap<ColumnRef, f32>,
}

impl SavedWorkEvaluator {
    pub fn new() -> SavedWorkEvaluator {
        SavedWorkEvaluator { saved_work: BTreeMap::new() }
    }
}

impl IndexEvaluator for SavedWorkEvaluator {
    fn setup(&mut self) {
        self.saved_work.clear();
    }

    fn process_access_record(&mut self, record: &AccessRecord, ctx: &TuningContext) {
        // Only single column keys are scored for now
        let column_id = match record.column_ref.column_ids[..] {
            [column_id] => column_id,
            _ => return,
        };
        let table = match ctx.catalog.table(&record.column_ref.table_name) {
            Some(table) => table,
            None => return,
        };
        let row_count = table.row_count();
        // A column without a stored summary yields selectivity 1, i.e. no
        // estimated benefit.
        let selectivity = table
            .selectivity(column_id, record.op, record.compare_value.as_ref())
            .unwrap_or(1.0);
        let unscanned_rows = row_count as f64 * (1.0 - selectivity as f64);
        let saved_work = (unscanned_rows * record.query_frequency as f64) as f32;
        *self.saved_work.entry(record.column_ref.clone()).or_insert(0.0) += saved_work;
    }

    fn predict_memory_cost(&self, choice: &IndexChoice, ctx: &TuningContext) -> f32 {
        let table = match ctx.catalog.table(&choice.column_ref.table_name) {
            Some(table) => table,
            None => return 0.0,
        };
        let chunk_count = table.chunk_count().max(1);
        let row_count = table.row_count();
        let value_bytes: u64 = choice
            .column_ref
            .column_ids
            .iter()
            .map(|id| table.column_byte_width(*id).unwrap_or(0))
            .sum();
        let distinct_count = match choice.column_ref.column_ids[..] {
            [column_id] => table.distinct_count(column_id).unwrap_or(0),
            _ => 0,
        };
        let chunk_rows = ((row_count as f64 / chunk_count as f64).round()) as u64;
        let chunk_distinct =
            (((distinct_count as f64 / chunk_count as f64).round()) as u64).max(1);
        let per_chunk = predict_memory_consumption(
            choice.index_type, chunk_rows, chunk_distinct, value_bytes);
        ((per_chunk * chunk_count) as f64 / BYTES_PER_MIB) as f32
    }

    fn saved_work_of(&self, choice: &IndexChoice, ctx: &TuningContext) -> f32 {
        let benefit = self.saved_work.get(&choice.column_ref).copied().unwrap_or(0.0);
        benefit - ctx.config.maintenance_weight * choice.memory_cost
    }
}
