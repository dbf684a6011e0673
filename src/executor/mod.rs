//! Bottom-up, demand-driven execution (spec.md §4.4).
//!
//! One call per node: check the cache by fingerprint, otherwise recurse
//! into parent(s), apply the node's kernel, record wall-clock build time,
//! and insert into the cache under that time as the importance weight —
//! following `BaseNode.get`/`fetch` in
//! `original_source/wombat_db/engine/nodes.py`.

mod filters;
mod groupby;
mod join;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::ArrayRef;
use tracing::{debug, info_span};

use crate::cache::WeightedCache;
use crate::dataset::{partition_matches, Dataset};
use crate::error::ExecError;
use crate::expr::UdfRegistry;
use crate::optimizer::OptimizedPlan;
use crate::plan::{NodeKind, PlanNode};
use crate::table::Table;

/// Everything the executor needs that isn't carried on the plan itself:
/// registered tables/datasets/UDFs and the shared cache.
pub struct ExecContext<'a> {
    pub tables: &'a HashMap<String, Arc<Table>>,
    pub datasets: &'a HashMap<String, Arc<dyn Dataset>>,
    pub udfs: &'a UdfRegistry,
    pub cache: Option<&'a WeightedCache>,
    pub verbose: bool,
}

pub fn execute(sink: &Arc<PlanNode>, optimized: &OptimizedPlan, ctx: &ExecContext) -> Result<Arc<Table>, ExecError> {
    let _span = info_span!("collect").entered();
    execute_node(sink, optimized, ctx)
}

fn execute_node(node: &Arc<PlanNode>, optimized: &OptimizedPlan, ctx: &ExecContext) -> Result<Arc<Table>, ExecError> {
    let ann = optimized.get(node);

    if let Some(cache) = ctx.cache {
        if let Some(hit) = cache.get(ann.fingerprint) {
            if ctx.verbose {
                println!("Node: {:<16} Rows: {:<9} (cached)", node.kind.tag(), hit.num_rows());
            }
            return Ok(hit);
        }
    }

    let start = Instant::now();
    let table = build(node, optimized, ctx)?;
    let elapsed = start.elapsed();

    debug!(node = node.kind.tag(), rows = table.num_rows(), elapsed_ms = elapsed.as_millis() as u64, "materialized node");
    if ctx.verbose {
        println!(
            "Node: {:<16} Rows: {:<9} Cumulative Time: {:.6}",
            node.kind.tag(),
            table.num_rows(),
            elapsed.as_secs_f64()
        );
    }

    let table = Arc::new(table);
    if let Some(cache) = ctx.cache {
        cache.put(ann.fingerprint, table.clone(), elapsed.as_secs_f64());
    }
    Ok(table)
}

fn build(node: &Arc<PlanNode>, optimized: &OptimizedPlan, ctx: &ExecContext) -> Result<Table, ExecError> {
    let ann = optimized.get(node);

    match &node.kind {
        NodeKind::TableSource { name } => {
            let table = ctx
                .tables
                .get(name)
                .ok_or_else(|| ExecError::Plan(crate::error::PlanError::ColumnMissing(name.clone())))?;
            let projected = table.select(&ann.columns_backward)?;
            Ok(filters::apply(&projected, &ann.filters)?)
        }

        NodeKind::DatasetSource { name, partition_keys } => {
            let dataset = ctx
                .datasets
                .get(name)
                .ok_or_else(|| ExecError::Plan(crate::error::PlanError::ColumnMissing(name.clone())))?;
            let (partition_filters, value_filters): (Vec<_>, Vec<_>) =
                ann.filters.iter().cloned().partition(|f| partition_keys.contains(&f.column));

            let read_columns: Vec<String> =
                ann.columns_backward.iter().filter(|c| !partition_keys.contains(*c)).cloned().collect();
            let requested_partition_keys: Vec<String> =
                partition_keys.iter().filter(|k| ann.columns_backward.contains(*k)).cloned().collect();

            let mut pieces_read = Vec::new();
            for piece in dataset.pieces() {
                if partition_matches(piece.as_ref(), &partition_filters)? {
                    let mut table = piece.read(&read_columns)?;
                    for key in &requested_partition_keys {
                        let raw = piece.partition_values().get(key).ok_or_else(|| {
                            ExecError::Plan(crate::error::PlanError::ColumnMissing(key.clone()))
                        })?;
                        let column: ArrayRef =
                            Arc::new(arrow::array::StringArray::from(vec![raw.clone(); table.num_rows()]));
                        table = table.append_column(key, column)?;
                    }
                    pieces_read.push(table);
                }
            }
            if pieces_read.is_empty() {
                return Err(ExecError::Kernel(format!("dataset '{name}' matched no partitions")));
            }
            let concatenated = Table::concat(&pieces_read)?;
            Ok(filters::apply(&concatenated, &value_filters)?)
        }

        NodeKind::Filter { parent, .. } => execute_node(parent, optimized, ctx).map(|t| (*t).clone()),

        NodeKind::Join { left, right, on } => {
            let l = execute_node(left, optimized, ctx)?;
            let r = execute_node(right, optimized, ctx)?;
            join::equi_join(&l, &r, on)
        }

        NodeKind::Aggregate { parent, by, methods } => {
            let p = execute_node(parent, optimized, ctx)?;
            let aggregated = groupby::group_by_aggregate(&p, by, methods)?;
            Ok(filters::apply(&aggregated, &ann.filters)?)
        }

        NodeKind::Order { parent, key, ascending } => {
            let p = execute_node(parent, optimized, ctx)?;
            order_by(&p, key, *ascending)
        }

        NodeKind::Select { parent, columns, aliases } => {
            let p = execute_node(parent, optimized, ctx)?;
            if aliases.is_empty() {
                Ok(p.select(columns)?)
            } else {
                let mapping: HashMap<String, String> = aliases.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                Ok(p.rename_columns(&mapping))
            }
        }

        NodeKind::Drop { parent, columns } => {
            let p = execute_node(parent, optimized, ctx)?;
            Ok(p.drop_columns(columns)?)
        }

        NodeKind::FillNull { parent, columns, value } => {
            let mut p = execute_node(parent, optimized, ctx)?.as_ref().clone();
            for column in columns {
                let expr = crate::expr::ColumnExpr::col(column.clone()).fillna(value.clone());
                let filled = expr.evaluate(&p, ctx.udfs)?;
                p = p.replace_column(column, filled)?;
            }
            Ok(p)
        }

        NodeKind::Cast { parent, dtypes } => {
            let mut p = execute_node(parent, optimized, ctx)?.as_ref().clone();
            for (column, dtype) in dtypes {
                let expr = crate::expr::ColumnExpr::col(column.clone()).astype(*dtype);
                let cast = expr.evaluate(&p, ctx.udfs)?;
                p = p.replace_column(column, cast)?;
            }
            Ok(p)
        }

        NodeKind::Calculation { parent, key, expr } => {
            let p = execute_node(parent, optimized, ctx)?;
            let computed = expr.evaluate(&p, ctx.udfs)?;
            let with_column = p.append_column(key, computed)?;
            Ok(filters::apply(&with_column, &ann.filters)?)
        }

        NodeKind::BooleanMask { parent, mask } => {
            let p = execute_node(parent, optimized, ctx)?;
            let mask_array = mask.evaluate(&p, ctx.udfs)?;
            let boolean = mask_array
                .as_any()
                .downcast_ref::<arrow::array::BooleanArray>()
                .ok_or_else(|| ExecError::Kernel("mask expression did not evaluate to a boolean array".to_string()))?;
            Ok(p.filter_mask(boolean)?)
        }
    }
}

fn order_by(table: &Table, key: &str, ascending: bool) -> Result<Table, ExecError> {
    let column = table.column(key)?;
    let options = arrow::compute::SortOptions { descending: !ascending, nulls_first: false };
    let indices = arrow::compute::sort_to_indices(column, Some(options), None)
        .map_err(|e| ExecError::Kernel(e.to_string()))?;
    Ok(table.take(&indices)?)
}
