//! Error taxonomy for the engine.
//!
//! One `thiserror` enum per concern, following the shape of
//! `storage::error::StorageError` in the teacher this crate grew out of:
//! flat variants, `#[error("...")]` messages, `#[from]` conversions where a
//! lower layer's error is wrapped rather than re-described.

use thiserror::Error;

/// Errors raised by the `Table` data model.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("column '{0}' not found")]
    ColumnMissing(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("tables have mismatched schemas and cannot be concatenated")]
    SchemaMismatch,
}

/// Errors raised during plan construction and the optimiser's backward pass.
///
/// Mirrors the taxonomy in spec.md §7: `ColumnMissing` and `TypeMismatch`
/// are raised at construction time, never during execution; `InvalidPlan`
/// is the optimiser's internal-consistency check failing.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("column '{0}' is not visible at this point in the plan")]
    ColumnMissing(String),

    #[error("filter value for column '{column}' is incompatible with its type: {reason}")]
    TypeMismatch { column: String, reason: String },

    #[error("unsupported filter operator '{0}'")]
    UnsupportedOp(String),

    #[error("cannot cast partition value '{value}' to the type of the filter literal: {reason}")]
    PartitionCastError { value: String, reason: String },

    #[error("internal error: optimiser produced an invalid plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// Errors raised while constructing or evaluating a column expression.
#[derive(Error, Debug)]
pub enum ExprError {
    #[error("expression type mismatch: {0}")]
    TypeMismatch(String),

    #[error("user-defined function '{name}' expected {expected} arguments, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("internal error: expression required column '{0}' was not materialised")]
    RefMissing(String),
}

/// Errors raised by the executor. Every `collect()` either returns a
/// complete `Table` or one of these — no partial tables are ever built.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error("kernel error: {0}")]
    Kernel(String),
}

/// Errors raised by the weighted cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("a single entry of {0} bytes exceeds the cache's total budget of {1} bytes")]
    EntryExceedsBudget(usize, usize),
}

/// Errors raised loading `EngineConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),
}
