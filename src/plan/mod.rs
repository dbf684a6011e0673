//! The plan node graph: a DAG of operator nodes built purely forward by the
//! data-frame façade (spec.md §4.2). Each constructor wraps the current sink
//! in a new, immutable node and recomputes its visible/source/forward
//! metadata from its parent(s) — following the tagged-sum design spec.md §9
//! recommends over one subclass per operator.

mod predicate;

pub use predicate::{AggMethod, AggSpec, FilterOp, FilterValue, Predicate};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::PlanError;
use crate::expr::ColumnExpr;
use crate::table::{DataType, Value};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The operator a node performs, with its own child reference(s). Shared
/// metadata common to every operator lives on [`PlanNode`] itself.
pub enum NodeKind {
    TableSource { name: String },
    DatasetSource { name: String, partition_keys: Vec<String> },
    Filter { parent: Arc<PlanNode>, predicates: Vec<Predicate> },
    Join { left: Arc<PlanNode>, right: Arc<PlanNode>, on: Vec<String> },
    Aggregate { parent: Arc<PlanNode>, by: Vec<String>, methods: BTreeMap<String, AggSpec> },
    Order { parent: Arc<PlanNode>, key: String, ascending: bool },
    Select { parent: Arc<PlanNode>, columns: Vec<String>, aliases: BTreeMap<String, String> },
    Drop { parent: Arc<PlanNode>, columns: Vec<String> },
    FillNull { parent: Arc<PlanNode>, columns: Vec<String>, value: Value },
    Cast { parent: Arc<PlanNode>, dtypes: BTreeMap<String, DataType> },
    Calculation { parent: Arc<PlanNode>, key: String, expr: ColumnExpr },
    BooleanMask { parent: Arc<PlanNode>, mask: ColumnExpr },
}

impl NodeKind {
    /// The stable tag folded into the node's fingerprint identity and used
    /// in `Plan::plot` output — matches `self.__class__.__name__` in the
    /// source this crate's algorithms are grounded on.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::TableSource { .. } => "TableSource",
            NodeKind::DatasetSource { .. } => "DatasetSource",
            NodeKind::Filter { .. } => "Filter",
            NodeKind::Join { .. } => "Join",
            NodeKind::Aggregate { .. } => "Aggregate",
            NodeKind::Order { .. } => "Order",
            NodeKind::Select { .. } => "Select",
            NodeKind::Drop { .. } => "Drop",
            NodeKind::FillNull { .. } => "FillNull",
            NodeKind::Cast { .. } => "Cast",
            NodeKind::Calculation { .. } => "Calculation",
            NodeKind::BooleanMask { .. } => "BooleanMask",
        }
    }
}

/// A node in the plan graph. Immutable once built; the optimiser's backward
/// pass never mutates a node, it annotates it (see [`crate::optimizer`]).
pub struct PlanNode {
    pub id: u64,
    pub kind: NodeKind,
    pub columns_visible: Vec<String>,
    pub columns_source: Vec<String>,
    pub columns_forward: Vec<String>,
    pub filters_forward: Vec<Predicate>,
}

fn union_sorted(a: &[String], b: &[String]) -> Vec<String> {
    let mut set: std::collections::BTreeSet<String> = a.iter().cloned().collect();
    set.extend(b.iter().cloned());
    set.into_iter().collect()
}

fn intersect_with(names: &[String], source: &[String]) -> Vec<String> {
    names.iter().filter(|n| source.contains(n)).cloned().collect()
}

fn require_visible(visible: &[String], needed: &[String]) -> Result<(), PlanError> {
    for name in needed {
        if !visible.contains(name) {
            return Err(PlanError::ColumnMissing(name.clone()));
        }
    }
    Ok(())
}

/// Columns containing a `.` also expose their struct root, mirroring
/// `Table::columns` (spec.md §3's `TableSource`/`DatasetSource` rule).
fn with_struct_roots(names: &[String]) -> Vec<String> {
    let mut out = names.to_vec();
    let roots: Vec<String> = names
        .iter()
        .filter(|n| n.contains('.'))
        .map(|n| n.split('.').next().unwrap().to_string())
        .collect();
    for r in roots {
        if !out.contains(&r) {
            out.push(r);
        }
    }
    out
}

impl PlanNode {
    pub fn table_source(name: impl Into<String>, columns: Vec<String>) -> Arc<PlanNode> {
        let columns = with_struct_roots(&columns);
        Arc::new(PlanNode {
            id: next_id(),
            columns_visible: columns.clone(),
            columns_source: columns,
            columns_forward: Vec::new(),
            filters_forward: Vec::new(),
            kind: NodeKind::TableSource { name: name.into() },
        })
    }

    pub fn dataset_source(
        name: impl Into<String>,
        partition_keys: Vec<String>,
        schema_columns: Vec<String>,
    ) -> Arc<PlanNode> {
        let mut columns = partition_keys.clone();
        for c in schema_columns {
            if !columns.contains(&c) {
                columns.push(c);
            }
        }
        let columns = with_struct_roots(&columns);
        Arc::new(PlanNode {
            id: next_id(),
            columns_visible: columns.clone(),
            columns_source: columns,
            columns_forward: Vec::new(),
            filters_forward: Vec::new(),
            kind: NodeKind::DatasetSource { name: name.into(), partition_keys },
        })
    }

    pub fn filter(parent: Arc<PlanNode>, predicates: Vec<Predicate>) -> Result<Arc<PlanNode>, PlanError> {
        let needed: Vec<String> = predicates.iter().map(|p| p.column.clone()).collect();
        require_visible(&parent.columns_visible, &needed)?;
        let columns_forward =
            union_sorted(&parent.columns_forward, &intersect_with(&needed, &parent.columns_source));
        let mut filters_forward = parent.filters_forward.clone();
        filters_forward.extend(predicates.iter().cloned());
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible: parent.columns_visible.clone(),
            columns_source: parent.columns_source.clone(),
            columns_forward,
            filters_forward,
            kind: NodeKind::Filter { parent, predicates },
        }))
    }

    pub fn join(left: Arc<PlanNode>, right: Arc<PlanNode>, on: Vec<String>) -> Result<Arc<PlanNode>, PlanError> {
        require_visible(&left.columns_visible, &on)?;
        require_visible(&right.columns_visible, &on)?;
        let columns_visible = union_sorted(&left.columns_visible, &right.columns_visible);
        let columns_source = union_sorted(&left.columns_source, &right.columns_source);
        let columns_forward = union_sorted(&union_sorted(&left.columns_forward, &right.columns_forward), &on);
        let mut filters_forward = left.filters_forward.clone();
        filters_forward.extend(right.filters_forward.iter().cloned());
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible,
            columns_source,
            columns_forward,
            filters_forward,
            kind: NodeKind::Join { left, right, on },
        }))
    }

    pub fn aggregate(
        parent: Arc<PlanNode>,
        by: Vec<String>,
        methods: BTreeMap<String, AggSpec>,
    ) -> Result<Arc<PlanNode>, PlanError> {
        let refs: Vec<String> = methods.values().map(|s| s.input.clone()).collect();
        let mut needed = by.clone();
        needed.extend(refs.iter().cloned());
        require_visible(&parent.columns_visible, &needed)?;
        let mut columns_visible = by.clone();
        for k in methods.keys() {
            if !columns_visible.contains(k) {
                columns_visible.push(k.clone());
            }
        }
        let columns_forward = union_sorted(&parent.columns_forward, &intersect_with(&needed, &parent.columns_source));
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible,
            columns_source: parent.columns_source.clone(),
            columns_forward,
            filters_forward: parent.filters_forward.clone(),
            kind: NodeKind::Aggregate { parent, by, methods },
        }))
    }

    pub fn order(parent: Arc<PlanNode>, key: impl Into<String>, ascending: bool) -> Result<Arc<PlanNode>, PlanError> {
        let key = key.into();
        require_visible(&parent.columns_visible, std::slice::from_ref(&key))?;
        let columns_forward =
            union_sorted(&parent.columns_forward, &intersect_with(std::slice::from_ref(&key), &parent.columns_source));
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible: parent.columns_visible.clone(),
            columns_source: parent.columns_source.clone(),
            columns_forward,
            filters_forward: parent.filters_forward.clone(),
            kind: NodeKind::Order { parent, key, ascending },
        }))
    }

    pub fn select(
        parent: Arc<PlanNode>,
        columns: Vec<String>,
        aliases: BTreeMap<String, String>,
    ) -> Result<Arc<PlanNode>, PlanError> {
        let columns = if columns.is_empty() {
            parent.columns_visible.iter().filter(|c| !c.contains('.')).cloned().collect()
        } else {
            columns
        };
        require_visible(&parent.columns_visible, &columns)?;
        let columns_visible = if aliases.is_empty() {
            columns.clone()
        } else {
            parent
                .columns_visible
                .iter()
                .map(|c| aliases.get(c).cloned().unwrap_or_else(|| c.clone()))
                .collect()
        };
        let columns_forward = union_sorted(&parent.columns_forward, &intersect_with(&columns, &parent.columns_source));
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible,
            columns_source: parent.columns_source.clone(),
            columns_forward,
            filters_forward: parent.filters_forward.clone(),
            kind: NodeKind::Select { parent, columns, aliases },
        }))
    }

    pub fn drop(parent: Arc<PlanNode>, columns: Vec<String>) -> Result<Arc<PlanNode>, PlanError> {
        require_visible(&parent.columns_visible, &columns)?;
        let columns_visible: Vec<String> =
            parent.columns_visible.iter().filter(|c| !columns.contains(c)).cloned().collect();
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible,
            columns_source: parent.columns_source.clone(),
            columns_forward: parent.columns_forward.clone(),
            filters_forward: parent.filters_forward.clone(),
            kind: NodeKind::Drop { parent, columns },
        }))
    }

    pub fn fill_null(parent: Arc<PlanNode>, columns: Vec<String>, value: Value) -> Result<Arc<PlanNode>, PlanError> {
        require_visible(&parent.columns_visible, &columns)?;
        let columns_forward = union_sorted(&parent.columns_forward, &intersect_with(&columns, &parent.columns_source));
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible: parent.columns_visible.clone(),
            columns_source: parent.columns_source.clone(),
            columns_forward,
            filters_forward: parent.filters_forward.clone(),
            kind: NodeKind::FillNull { parent, columns, value },
        }))
    }

    pub fn cast(parent: Arc<PlanNode>, dtypes: BTreeMap<String, DataType>) -> Result<Arc<PlanNode>, PlanError> {
        let needed: Vec<String> = dtypes.keys().cloned().collect();
        require_visible(&parent.columns_visible, &needed)?;
        let columns_forward = union_sorted(&parent.columns_forward, &intersect_with(&needed, &parent.columns_source));
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible: parent.columns_visible.clone(),
            columns_source: parent.columns_source.clone(),
            columns_forward,
            filters_forward: parent.filters_forward.clone(),
            kind: NodeKind::Cast { parent, dtypes },
        }))
    }

    pub fn calculation(parent: Arc<PlanNode>, key: impl Into<String>, expr: ColumnExpr) -> Result<Arc<PlanNode>, PlanError> {
        let key = key.into();
        let required: Vec<String> = expr.required().into_iter().collect();
        require_visible(&parent.columns_visible, &required)?;
        let mut columns_visible = parent.columns_visible.clone();
        if !columns_visible.contains(&key) {
            columns_visible.push(key.clone());
        }
        let columns_forward =
            union_sorted(&parent.columns_forward, &intersect_with(&required, &parent.columns_source));
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible,
            columns_source: parent.columns_source.clone(),
            columns_forward,
            filters_forward: parent.filters_forward.clone(),
            kind: NodeKind::Calculation { parent, key, expr },
        }))
    }

    /// Unlike the source this is grounded on, `mask.required()` is folded
    /// into `columns_forward` here — otherwise a mask referencing a column
    /// nothing else downstream asks for would be pruned before it can be
    /// evaluated, breaking the `Plan[mask].collect()` equivalence spec.md
    /// §8 property 7 requires.
    pub fn boolean_mask(parent: Arc<PlanNode>, mask: ColumnExpr) -> Result<Arc<PlanNode>, PlanError> {
        if !mask.is_boolean() {
            return Err(PlanError::TypeMismatch {
                column: mask.key(),
                reason: "expression is not a boolean mask".to_string(),
            });
        }
        let required: Vec<String> = mask.required().into_iter().collect();
        require_visible(&parent.columns_visible, &required)?;
        let columns_forward =
            union_sorted(&parent.columns_forward, &intersect_with(&required, &parent.columns_source));
        Ok(Arc::new(PlanNode {
            id: next_id(),
            columns_visible: parent.columns_visible.clone(),
            columns_source: parent.columns_source.clone(),
            columns_forward,
            filters_forward: parent.filters_forward.clone(),
            kind: NodeKind::BooleanMask { parent, mask },
        }))
    }

    /// Immediate parent(s), for graph walks (`Plan::plot`, the executor).
    pub fn children(&self) -> Vec<&Arc<PlanNode>> {
        match &self.kind {
            NodeKind::TableSource { .. } | NodeKind::DatasetSource { .. } => vec![],
            NodeKind::Join { left, right, .. } => vec![left, right],
            NodeKind::Filter { parent, .. }
            | NodeKind::Aggregate { parent, .. }
            | NodeKind::Order { parent, .. }
            | NodeKind::Select { parent, .. }
            | NodeKind::Drop { parent, .. }
            | NodeKind::FillNull { parent, .. }
            | NodeKind::Cast { parent, .. }
            | NodeKind::Calculation { parent, .. }
            | NodeKind::BooleanMask { parent, .. } => vec![parent],
        }
    }

    /// Graphviz DOT text for the subtree rooted here (spec.md §6 `Plan::plot`).
    pub fn plot(&self, name: &str) -> String {
        let mut out = format!("digraph {name} {{\n");
        let mut seen = std::collections::HashSet::new();
        self.plot_node(&mut out, &mut seen);
        out.push_str("}\n");
        out
    }

    fn plot_node(&self, out: &mut String, seen: &mut std::collections::HashSet<u64>) {
        if !seen.insert(self.id) {
            return;
        }
        out.push_str(&format!("  n{} [label=\"{}\", shape=box];\n", self.id, self.kind.tag()));
        for child in self.children() {
            child.plot_node(out, seen);
            out.push_str(&format!("  n{} -> n{};\n", child.id, self.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn table_source_exposes_struct_roots() {
        let node = PlanNode::table_source("t", cols(&["addr.city", "id"]));
        assert!(node.columns_visible.contains(&"addr".to_string()));
    }

    #[test]
    fn filter_rejects_unknown_column() {
        let node = PlanNode::table_source("t", cols(&["id"]));
        let err = PlanNode::filter(node, vec![Predicate::eq("missing", 1i64)]).unwrap_err();
        assert!(matches!(err, PlanError::ColumnMissing(_)));
    }

    #[test]
    fn filter_threads_forward_state() {
        let node = PlanNode::table_source("t", cols(&["id", "v"]));
        let filtered = PlanNode::filter(node, vec![Predicate::eq("id", 1i64)]).unwrap();
        assert_eq!(filtered.columns_forward, vec!["id".to_string()]);
        assert_eq!(filtered.filters_forward.len(), 1);
    }

    #[test]
    fn join_requires_key_on_both_sides() {
        let left = PlanNode::table_source("a", cols(&["k", "v"]));
        let right = PlanNode::table_source("b", cols(&["w"]));
        let err = PlanNode::join(left, right, cols(&["k"])).unwrap_err();
        assert!(matches!(err, PlanError::ColumnMissing(_)));
    }

    #[test]
    fn calculation_adds_key_to_visible_columns() {
        let node = PlanNode::table_source("t", cols(&["x"]));
        let calc = PlanNode::calculation(node, "x2", ColumnExpr::col("x") * 2i64).unwrap();
        assert!(calc.columns_visible.contains(&"x2".to_string()));
    }
}
