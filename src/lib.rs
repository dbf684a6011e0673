//! `crateql` — an embeddable analytic query engine core: a plan node
//! graph with forward/backward metadata propagation, a single backward
//! optimisation pass, a demand-driven bottom-up executor, and a weighted
//! content-addressed cache of intermediate tables.
//!
//! The column expression tree ([`expr`]), plan graph ([`plan`]), optimiser
//! ([`optimizer`]), executor ([`executor`]), cache ([`cache`]), and engine
//! façade ([`engine`]) are the core; [`table`] and [`dataset`] are the
//! concrete in-memory collaborators the core is built against.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod executor;
pub mod expr;
pub mod optimizer;
pub mod plan;
pub mod sql;
pub mod table;

pub use engine::{Engine, Plan};
pub use error::{CacheError, ConfigError, ExecError, ExprError, PlanError, TableError};
pub use table::{DataType, Table, Value};
