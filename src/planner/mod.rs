use crate::storage::index::ColumnId;
use crate::types::{PredicateOp, TupleValue};

/*
    Logical query plans as produced by the optimizer and consumed by the
    index tuner's plan walker. Plans are arenas of nodes addressed by
    integer ids; a node stores the ids of its inputs, so DAG shaped plans
    (shared subtrees) need no shared ownership or parent pointers. Column
    provenance is tracked by ColumnReference, which points back at the
    producing node.
*/

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct LogicalPlan {
    nodes: Vec<LogicalNode>,
    root: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct LogicalNode {
    pub kind: LogicalNodeKind,
    pub left_input: Option<NodeId>,
    pub right_input: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub enum LogicalNodeKind {
    StoredTable {
        table_name: String,
    },
    Predicate {
        column: ColumnReference,
        op: PredicateOp,
        value: PredicateValue,
    },
    Projection {
        columns: Vec<ColumnReference>,
    },
    Join,
    Aggregate,
    Sort {
        column: ColumnReference,
    },
}

/// Provenance of a column consumed by a plan node.
#[derive(Debug, Clone)]
pub enum ColumnReference {
    /// Output column of the producing node.
    Resolved { origin: NodeId, column_id: ColumnId },
    /// Result of an expression; cannot be traced to a base table column.
    Synthesized,
}

/// Right hand side of a predicate.
#[derive(Debug, Clone)]
pub enum PredicateValue {
    Literal(TupleValue),
    Column(ColumnReference),
    /// Operators like IS NULL compare against nothing.
    None,
}

impl LogicalPlan {
    pub fn new() -> LogicalPlan {
        LogicalPlan { nodes: Vec::new(), root: None }
    }

    pub fn add_node(
        &mut self,
        kind: LogicalNodeKind,
        left_input: Option<NodeId>,
        right_input: Option<NodeId>,
    ) -> NodeId {
        self.nodes.push(LogicalNode { kind, left_input, right_input });
        self.nodes.len() - 1
    }

    pub fn set_root(&mut self, root: NodeId) {
        assert!(root < self.nodes.len());
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &LogicalNode {
        &self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Follows a column reference to its producing node. Returns the
    /// (table name, column id) pair if that node is a stored table,
    /// None for synthesized columns and intermediate producers.
    pub fn resolve_column(&self, reference: &ColumnReference) -> Option<(&str, ColumnId)> {
        match reference {
            ColumnReference::Resolved { origin, column_id } => match &self.nodes[*origin].kind {
                LogicalNodeKind::StoredTable { table_name } => Some((table_name, *column_id)),
                _ => None,
            },
            ColumnReference::Synthesized => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_through_stored_table() {
        let mut plan = LogicalPlan::new();
        let table = plan.add_node(
            LogicalNodeKind::StoredTable { table_name: "t".to_string() }, None, None);
        let reference = ColumnReference::Resolved { origin: table, column_id: 2 };
        let predicate = plan.add_node(
            LogicalNodeKind::Predicate {
                column: reference.clone(),
                op: PredicateOp::Equals,
                value: PredicateValue::Literal(TupleValue::Int(4)),
            },
            Some(table),
            None,
        );
        plan.set_root(predicate);

        assert_eq!(plan.resolve_column(&reference), Some(("t", 2)));
        assert_eq!(plan.resolve_column(&ColumnReference::Synthesized), None);
    }

    #[test]
    fn resolve_stops_at_non_table_producers() {
        let mut plan = LogicalPlan::new();
        let aggregate = plan.add_node(LogicalNodeKind::Aggregate, None, None);
        let reference = ColumnReference::Resolved { origin: aggregate, column_id: 0 };
        assert_eq!(plan.resolve_column(&reference), None);
    }
}
