//! The single backward optimisation pass (spec.md §4.3).
//!
//! One recursive call per node, seeded at the sink with
//! `columns_backward = sink.columns_forward` and `filters_backward =
//! sink.filters_forward` (the latter already holds every predicate declared
//! anywhere in the plan, since only `Filter` nodes append to it and every
//! other node threads it through unchanged during construction — see
//! `plan::PlanNode`). Fingerprints are threaded as a live `Sha256` state
//! rather than recomputed from scratch per node, mirroring the streaming
//! hash object passed up through `BaseNode.backward` in the source this is
//! grounded on (`original_source/wombat_db/engine/nodes.py`).

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::PlanError;
use crate::plan::{NodeKind, PlanNode, Predicate};

/// 256-bit content hash of a node's optimised identity and its ancestors'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; 32]) -> Fingerprint {
        Fingerprint(bytes)
    }

    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// What the optimiser decided a node must materialise and apply locally.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub columns_backward: Vec<String>,
    pub filters: Vec<Predicate>,
    pub fingerprint: Fingerprint,
}

/// The result of a single `optimize()` call: per-node annotations keyed by
/// [`PlanNode::id`].
#[derive(Debug, Default)]
pub struct OptimizedPlan {
    annotations: HashMap<u64, Annotation>,
}

impl OptimizedPlan {
    pub fn get(&self, node: &PlanNode) -> &Annotation {
        self.annotations
            .get(&node.id)
            .expect("every reachable node is annotated by optimize()")
    }
}

pub fn optimize(sink: &Arc<PlanNode>) -> Result<OptimizedPlan, PlanError> {
    let mut annotations = HashMap::new();
    let columns_backward_request = sink.columns_forward.clone();
    let filters_backward_request = sink.filters_forward.clone();
    optimize_node(sink, &columns_backward_request, &filters_backward_request, &mut annotations)?;
    Ok(OptimizedPlan { annotations })
}

fn columns_bw(node: &PlanNode, columns_backward_request: &[String]) -> Vec<String> {
    let mut set: std::collections::BTreeSet<String> = node.columns_forward.iter().cloned().collect();
    set.extend(columns_backward_request.iter().cloned());
    set.into_iter().filter(|c| node.columns_source.contains(c)).collect()
}

fn partition_by_source<'a>(
    items: &'a [Predicate],
    source: &[String],
) -> Vec<&'a Predicate> {
    items.iter().filter(|p| source.contains(&p.column)).collect()
}

fn identity_fragment(node: &PlanNode, columns_backward: &[String], filters: &[Predicate]) -> String {
    let mut parts = vec![format!("name={}", node.kind.tag())];
    let mut sorted_filters: Vec<String> = filters.iter().map(Predicate::canonical).collect();
    sorted_filters.sort();
    parts.push(format!("filters=[{}]", sorted_filters.join(";")));
    let mut sorted_cols = columns_backward.to_vec();
    sorted_cols.sort();
    parts.push(format!("columns_backward=[{}]", sorted_cols.join(",")));

    match &node.kind {
        NodeKind::TableSource { name } | NodeKind::DatasetSource { name, .. } => {
            parts.push(format!("source={name}"));
        }
        NodeKind::Join { on, .. } => {
            let mut on_sorted = on.clone();
            on_sorted.sort();
            parts.push(format!("on=[{}]", on_sorted.join(",")));
        }
        NodeKind::Aggregate { by, methods, .. } => {
            let mut by_sorted = by.clone();
            by_sorted.sort();
            parts.push(format!("by=[{}]", by_sorted.join(",")));
            let mut methods_sorted: Vec<String> =
                methods.iter().map(|(k, v)| format!("{k}:{}:{}", v.input, v.method)).collect();
            methods_sorted.sort();
            parts.push(format!("methods=[{}]", methods_sorted.join(";")));
        }
        NodeKind::Order { key, ascending, .. } => {
            parts.push(format!("key={key}"));
            parts.push(format!("ascending={ascending}"));
        }
        NodeKind::Calculation { key, expr, .. } => {
            parts.push(format!("key={key}"));
            parts.push(format!("calculation={}", expr.key()));
        }
        NodeKind::Select { .. }
        | NodeKind::Drop { .. }
        | NodeKind::FillNull { .. }
        | NodeKind::Cast { .. }
        | NodeKind::BooleanMask { .. }
        | NodeKind::Filter { .. } => {}
    }
    parts.join(";")
}

fn hash_identity(prior: Option<Sha256>, node: &PlanNode, columns_backward: &[String], filters: &[Predicate]) -> Sha256 {
    let mut hasher = prior.unwrap_or_else(Sha256::new);
    hasher.update(identity_fragment(node, columns_backward, filters).as_bytes());
    hasher
}

fn fingerprint_of(hasher: &Sha256) -> Fingerprint {
    let digest = hasher.clone().finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Fingerprint(bytes)
}

fn optimize_node(
    node: &Arc<PlanNode>,
    columns_backward_request: &[String],
    filters_backward_request: &[Predicate],
    out: &mut HashMap<u64, Annotation>,
) -> Result<Sha256, PlanError> {
    let columns_backward = columns_bw(node, columns_backward_request);
    debug!(node = node.kind.tag(), columns_backward = ?columns_backward, "optimizing node");

    match &node.kind {
        NodeKind::TableSource { .. } | NodeKind::DatasetSource { .. } => {
            let filters = filters_backward_request.to_vec();
            let hasher = hash_identity(None, node, &columns_backward, &filters);
            out.insert(node.id, Annotation { columns_backward, filters, fingerprint: fingerprint_of(&hasher) });
            Ok(hasher)
        }

        NodeKind::Filter { parent, .. } => {
            let hasher = optimize_node(parent, &columns_backward, filters_backward_request, out)?;
            let fp = fingerprint_of(&hasher);
            out.insert(node.id, Annotation { columns_backward, filters: Vec::new(), fingerprint: fp });
            Ok(hasher)
        }

        NodeKind::Join { left, right, .. } => {
            let filters_l: Vec<Predicate> =
                partition_by_source(filters_backward_request, &left.columns_source).into_iter().cloned().collect();
            let filters_r: Vec<Predicate> =
                partition_by_source(filters_backward_request, &right.columns_source).into_iter().cloned().collect();
            let columns_l: Vec<String> =
                columns_backward.iter().filter(|c| left.columns_source.contains(*c)).cloned().collect();
            let columns_r: Vec<String> =
                columns_backward.iter().filter(|c| right.columns_source.contains(*c)).cloned().collect();

            let mut hl = optimize_node(left, &columns_l, &filters_l, out)?;
            let hr = optimize_node(right, &columns_r, &filters_r, out)?;
            hl.update(fingerprint_of(&hr).to_hex().as_bytes());

            let filters = filters_backward_request.to_vec();
            let hasher = hash_identity(Some(hl), node, &columns_backward, &filters);
            out.insert(node.id, Annotation { columns_backward, filters, fingerprint: fingerprint_of(&hasher) });
            Ok(hasher)
        }

        NodeKind::Aggregate { parent, methods, .. } => {
            let (own, rest): (Vec<Predicate>, Vec<Predicate>) = filters_backward_request
                .iter()
                .cloned()
                .partition(|f| methods.contains_key(&f.column));
            let hp = optimize_node(parent, &columns_backward, &rest, out)?;
            let hasher = hash_identity(Some(hp), node, &columns_backward, &own);
            out.insert(node.id, Annotation { columns_backward, filters: own, fingerprint: fingerprint_of(&hasher) });
            Ok(hasher)
        }

        NodeKind::Calculation { parent, key, .. } => {
            let (own, rest): (Vec<Predicate>, Vec<Predicate>) =
                filters_backward_request.iter().cloned().partition(|f| &f.column == key);
            let hp = optimize_node(parent, &columns_backward, &rest, out)?;
            let hasher = hash_identity(Some(hp), node, &columns_backward, &own);
            out.insert(node.id, Annotation { columns_backward, filters: own, fingerprint: fingerprint_of(&hasher) });
            Ok(hasher)
        }

        NodeKind::Order { parent, .. }
        | NodeKind::Select { parent, .. }
        | NodeKind::Drop { parent, .. }
        | NodeKind::FillNull { parent, .. }
        | NodeKind::Cast { parent, .. }
        | NodeKind::BooleanMask { parent, .. } => {
            let hp = optimize_node(parent, &columns_backward, filters_backward_request, out)?;
            let hasher = hash_identity(Some(hp), node, &columns_backward, &[]);
            out.insert(node.id, Annotation { columns_backward, filters: Vec::new(), fingerprint: fingerprint_of(&hasher) });
            Ok(hasher)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{FilterOp, FilterValue};

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn columns_backward_is_subset_of_source() {
        let table = PlanNode::table_source("t", cols(&["a", "b", "c"]));
        let filtered = PlanNode::filter(table, vec![Predicate::eq("a", 1i64)]).unwrap();
        let optimized = optimize(&filtered).unwrap();
        let ann = optimized.get(&filtered);
        assert!(ann.columns_backward.iter().all(|c| filtered.columns_source.contains(c)));
    }

    #[test]
    fn filter_fingerprint_equals_parent() {
        let table = PlanNode::table_source("t", cols(&["a"]));
        let filtered = PlanNode::filter(table.clone(), vec![Predicate::eq("a", 1i64)]).unwrap();
        let optimized = optimize(&filtered).unwrap();
        let filter_ann = optimized.get(&filtered);
        let table_ann = optimized.get(&table);
        assert_eq!(filter_ann.fingerprint, table_ann.fingerprint);
    }

    #[test]
    fn having_filter_is_intercepted_at_aggregate() {
        use crate::plan::AggSpec;
        use std::collections::BTreeMap;

        let table = PlanNode::table_source("t", cols(&["k", "v"]));
        let mut methods = BTreeMap::new();
        methods.insert("s".to_string(), AggSpec { input: "v".to_string(), method: crate::plan::AggMethod::Sum });
        let agg = PlanNode::aggregate(table.clone(), cols(&["k"]), methods).unwrap();
        let having = Predicate::new("s", FilterOp::Gt, FilterValue::Scalar(crate::table::Value::Int64(100)));
        let filtered = PlanNode::filter(agg.clone(), vec![having]).unwrap();

        let optimized = optimize(&filtered).unwrap();
        let agg_ann = optimized.get(&agg);
        assert_eq!(agg_ann.filters.len(), 1);
        let table_ann = optimized.get(&table);
        assert!(table_ann.filters.is_empty());
    }
}
