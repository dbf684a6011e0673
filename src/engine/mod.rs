//! The engine façade (spec.md §4.6): registers tables, datasets, and UDFs,
//! and hands out `Plan`s that build the node graph described in
//! [`crate::plan`].
//!
//! State is held behind a `parking_lot::RwLock` so `register_*` calls can
//! take `&self` — registration is rare and collect() is the hot path,
//! matching the teacher's preference for `parking_lot` over `std::sync`
//! on shared mutable state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::WeightedCache;
use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::error::{ExecError, PlanError};
use crate::executor::{self, ExecContext};
use crate::expr::{ColumnExpr, UdfFn, UdfRegistry};
use crate::optimizer;
use crate::plan::{AggSpec, PlanNode, Predicate};
use crate::table::{DataType, Table, Value};

struct EngineState {
    tables: HashMap<String, Arc<Table>>,
    datasets: HashMap<String, Arc<dyn Dataset>>,
    udfs: UdfRegistry,
    cache: Option<WeightedCache>,
    config: EngineConfig,
}

/// An engine instance: a registry of tables, datasets, and UDFs, plus an
/// optional shared cache. Cheap to clone — clones share the same
/// underlying state (spec.md §5: "two `collect()` calls on the same
/// engine from distinct threads share only the cache").
#[derive(Clone)]
pub struct Engine {
    state: Arc<RwLock<EngineState>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        let cache = Some(WeightedCache::new(config.cache.max_memory_bytes));
        Engine {
            state: Arc::new(RwLock::new(EngineState {
                tables: HashMap::new(),
                datasets: HashMap::new(),
                udfs: UdfRegistry::new(),
                cache,
                config,
            })),
        }
    }

    pub fn with_config(config: EngineConfig) -> Engine {
        Engine::new(config)
    }

    pub fn register_table(&self, name: impl Into<String>, table: Table) {
        self.state.write().tables.insert(name.into(), Arc::new(table));
    }

    pub fn register_dataset(&self, name: impl Into<String>, dataset: Arc<dyn Dataset>) {
        self.state.write().datasets.insert(name.into(), dataset);
    }

    pub fn register_udf(&self, name: impl Into<String>, arity: usize, f: UdfFn) {
        self.state.write().udfs.register(name, arity, f);
    }

    /// `select(name) -> Plan` (spec.md §4.6). Looks up a registered table
    /// first, then a registered dataset.
    pub fn select(&self, name: impl AsRef<str>) -> Result<Plan, PlanError> {
        let name = name.as_ref();
        let state = self.state.read();

        if let Some(table) = state.tables.get(name) {
            let node = PlanNode::table_source(name, table.columns());
            return Ok(Plan { engine: self.clone(), node });
        }

        if let Some(dataset) = state.datasets.get(name) {
            let node = PlanNode::dataset_source(
                name,
                dataset.partition_keys().to_vec(),
                dataset.schema_columns().to_vec(),
            );
            return Ok(Plan { engine: self.clone(), node });
        }

        Err(PlanError::ColumnMissing(name.to_string()))
    }

    /// `sql(text) -> Plan` (spec.md §4.6/§4.7).
    pub fn sql(&self, text: &str) -> Result<Plan, PlanError> {
        crate::sql::translate(self, text)
    }
}

/// A plan under construction: a fluent wrapper around an `Arc<PlanNode>`
/// that threads the originating `Engine` through so `collect()` can reach
/// the table/dataset/UDF registries and the shared cache (spec.md §4.6).
#[derive(Clone)]
pub struct Plan {
    engine: Engine,
    node: Arc<PlanNode>,
}

impl Plan {
    fn wrap(&self, node: Arc<PlanNode>) -> Plan {
        Plan { engine: self.engine.clone(), node }
    }

    pub fn node(&self) -> &Arc<PlanNode> {
        &self.node
    }

    /// `Plan[name] -> ColumnExpr` (spec.md §6).
    pub fn col(&self, name: impl Into<String>) -> ColumnExpr {
        ColumnExpr::col(name)
    }

    pub fn filter(&self, predicates: Vec<Predicate>) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::filter(self.node.clone(), predicates)?))
    }

    pub fn join(&self, other: &Plan, on: Vec<String>) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::join(self.node.clone(), other.node.clone(), on)?))
    }

    pub fn aggregate(&self, by: Vec<String>, methods: BTreeMap<String, AggSpec>) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::aggregate(self.node.clone(), by, methods)?))
    }

    pub fn orderby(&self, key: impl Into<String>, ascending: bool) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::order(self.node.clone(), key, ascending)?))
    }

    pub fn select(&self, columns: Vec<String>) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::select(self.node.clone(), columns, BTreeMap::new())?))
    }

    pub fn rename(&self, mapping: BTreeMap<String, String>) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::select(self.node.clone(), Vec::new(), mapping)?))
    }

    pub fn drop(&self, columns: Vec<String>) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::drop(self.node.clone(), columns)?))
    }

    pub fn fillna(&self, columns: Vec<String>, value: Value) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::fill_null(self.node.clone(), columns, value)?))
    }

    pub fn cast(&self, dtypes: BTreeMap<String, DataType>) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::cast(self.node.clone(), dtypes)?))
    }

    /// `Plan[name] = expr` (spec.md §6).
    pub fn with_column(&self, name: impl Into<String>, expr: ColumnExpr) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::calculation(self.node.clone(), name, expr)?))
    }

    /// `Plan[mask_expr] -> Plan` (spec.md §6).
    pub fn filter_mask(&self, mask: ColumnExpr) -> Result<Plan, PlanError> {
        Ok(self.wrap(PlanNode::boolean_mask(self.node.clone(), mask)?))
    }

    pub fn udf(&self, name: impl Into<String>, args: Vec<ColumnExpr>) -> ColumnExpr {
        ColumnExpr::udf(name, args)
    }

    /// `Plan.plot(name)` (spec.md §6) — Graphviz DOT text, not part of the
    /// correctness contract.
    pub fn plot(&self, name: &str) -> String {
        self.node.plot(name)
    }

    /// `Plan.collect(verbose)` (spec.md §4.6): runs the optimiser's single
    /// backward pass, then the bottom-up executor, against this plan's
    /// originating engine's registries and cache.
    pub fn collect(&self, verbose: bool) -> Result<Arc<Table>, ExecError> {
        let optimized = optimizer::optimize(&self.node)?;
        let state = self.engine.state.read();
        let ctx = ExecContext {
            tables: &state.tables,
            datasets: &state.datasets,
            udfs: &state.udfs,
            cache: state.cache.as_ref(),
            verbose: verbose || state.config.verbose,
        };
        executor::execute(&self.node, &optimized, &ctx)
    }
}

