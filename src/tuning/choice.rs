use std::collections::BTreeSet;
use std::fmt::Display;

use crate::storage::index::{ColumnId, IndexType};

/// Stable identity of an indexable key: a table plus an ordered list of
/// column ids. Used as a map key throughout the tuning subsystem; only
/// single element keys are scored for now but the type is multi column
/// from the start.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnRef {
    pub table_name: String,
    pub column_ids: Vec<ColumnId>,
}

impl ColumnRef {
    pub fn single(table_name: &str, column_id: ColumnId) -> ColumnRef {
        ColumnRef { table_name: table_name.to_string(), column_ids: vec![column_id] }
    }

    pub fn new(table_name: &str, column_ids: Vec<ColumnId>) -> ColumnRef {
        ColumnRef { table_name: table_name.to_string(), column_ids }
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:?}", self.table_name, self.column_ids)
    }
}

/// Index into the pass's choice vector; invalidation edges between
/// choices are expressed with these ids.
pub type ChoiceId = usize;

/// One scored candidate of a tuning pass: an index that either exists
/// (measured) or could be created (predicted).
#[derive(Debug, Clone)]
pub struct IndexChoice {
    pub column_ref: ColumnRef,
    /// Whether a matching index was live in the catalog when the pass started.
    pub exists: bool,
    /// Measured type if `exists`, proposed type otherwise.
    pub index_type: IndexType,
    /// Memory footprint in MiB; measured if `exists`, predicted otherwise.
    pub memory_cost: f32,
    /// Signed workload-weighted estimate of the scan rows this index saves.
    /// Negative values mark an index that is a net drag on the system.
    pub saved_work: f32,
    /// Confidence of the producing evaluator, used only to break ties.
    pub confidence: f32,
    /// Choices that must not be accepted once this one is.
    pub invalidates: BTreeSet<ChoiceId>,
}

impl IndexChoice {
    pub fn existing(column_ref: ColumnRef, index_type: IndexType, memory_cost: f32) -> IndexChoice {
        IndexChoice {
            column_ref,
            exists: true,
            index_type,
            memory_cost,
            saved_work: 0.0,
            confidence: 1.0,
            invalidates: BTreeSet::new(),
        }
    }

    pub fn proposed(column_ref: ColumnRef, index_type: IndexType) -> IndexChoice {
        IndexChoice {
            column_ref,
            exists: false,
            index_type,
            memory_cost: 0.0,
            saved_work: 0.0,
            confidence: 1.0,
            invalidates: BTreeSet::new(),
        }
    }

    /// Performance gained by accepting this choice; zero if it is already
    /// in place.
    pub fn accept_desirability(&self) -> f32 {
        if self.exists { 0.0 } else { self.saved_work }
    }

    /// Performance gained by rejecting this choice; zero if it is not
    /// present anyway.
    pub fn reject_desirability(&self) -> f32 {
        if self.exists { -self.saved_work } else { 0.0 }
    }

    /// The operation installing this index, None when it already exists.
    pub fn accept(&self) -> Option<TuningOperation> {
        if self.exists {
            None
        } else {
            Some(TuningOperation {
                column_ref: self.column_ref.clone(),
                index_type: self.index_type,
                create: true,
            })
        }
    }

    /// The operation removing this index, None when it does not exist.
    pub fn reject(&self) -> Option<TuningOperation> {
        if self.exists {
            Some(TuningOperation {
                column_ref: self.column_ref.clone(),
                index_type: self.index_type,
                create: false,
            })
        } else {
            None
        }
    }
}

impl Display for IndexChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IndexChoice{{on: {}, type: {}, exists: {}, saved_work: {} row scans, memory_cost: {} MiB}}",
            self.column_ref, self.index_type, self.exists, self.saved_work, self.memory_cost
        )
    }
}

/// A create or drop the tuner asks the catalog to perform. Operations are
/// meaningful only in the order the selector emitted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningOperation {
    pub column_ref: ColumnRef,
    pub index_type: IndexType,
    pub create: bool,
}

impl Display for TuningOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} index on {}",
            if self.create { "create" } else { "drop" },
            self.index_type,
            self.column_ref
        )
    }
}
