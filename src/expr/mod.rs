//! The column expression tree: the value language behind computed columns
//! (`plan.with_column(name, expr)`) and boolean masks (`plan.filter_mask(expr)`).
//!
//! Nodes are immutable and side-effect free (spec.md §4.1). Rather than the
//! closure-capturing `ColumnNode` of the Python original this spec was
//! distilled from, this is an explicit variant tree — the "expression tree
//! as data" redesign spec.md §9 calls for — so `key()`/`required()` are
//! plain recursive functions over the shape instead of state threaded
//! through constructors, and there is nothing captured by reference to go
//! stale.

mod kernels;
mod udf;

pub use udf::{UdfFn, UdfRegistry};

use std::collections::BTreeSet;
use std::ops;
use std::sync::Arc;

use arrow::array::ArrayRef;

use crate::error::ExprError;
use crate::table::{DataType, Table, Value};

/// Arithmetic binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Comparison operators. Every comparison node is a mask (`boolean = true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
        }
    }
}

/// Logical combinators over two masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

impl LogicOp {
    fn symbol(self) -> &'static str {
        match self {
            LogicOp::And => "&",
            LogicOp::Or => "|",
            LogicOp::Xor => "^",
        }
    }
}

/// A node in the column expression tree.
#[derive(Debug, Clone)]
pub enum ColumnExpr {
    /// Reference to a source column by name, or a dotted struct path.
    Column(String),
    /// A literal scalar.
    Literal(Value),
    /// `x[field]` — struct field access; transforms every required path
    /// `r` of `x` into `r.field` so dotted paths stay tracked (spec.md §4.1).
    StructField { base: Box<ColumnExpr>, field: String },
    Arith { op: ArithOp, left: Box<ColumnExpr>, right: Box<ColumnExpr> },
    Cmp { op: CmpOp, left: Box<ColumnExpr>, right: Box<ColumnExpr> },
    Logic { op: LogicOp, left: Box<ColumnExpr>, right: Box<ColumnExpr> },
    Not(Box<ColumnExpr>),
    Greatest { left: Box<ColumnExpr>, right: Box<ColumnExpr> },
    Least { left: Box<ColumnExpr>, right: Box<ColumnExpr> },
    Clip { input: Box<ColumnExpr>, min: Option<Value>, max: Option<Value> },
    Round { input: Box<ColumnExpr>, decimals: i32 },
    Ceil(Box<ColumnExpr>),
    Floor(Box<ColumnExpr>),
    /// `coalesce(scalar)` and `fillna(scalar)` are the same operation
    /// (replace nulls with `value`); kept as one variant since that's what
    /// they compile to (spec.md §4.1, §9 open question about the source's
    /// unbound `other` bug — not replicated here).
    FillNull { input: Box<ColumnExpr>, value: Value },
    /// `coalesce(other_expr)` — element-wise "choose left if non-null,
    /// else right".
    CoalesceExpr { left: Box<ColumnExpr>, right: Box<ColumnExpr> },
    Cast { input: Box<ColumnExpr>, dtype: DataType },
    Udf { name: String, args: Vec<ColumnExpr> },
}

impl ColumnExpr {
    pub fn col(name: impl Into<String>) -> ColumnExpr {
        ColumnExpr::Column(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> ColumnExpr {
        ColumnExpr::Literal(value.into())
    }

    pub fn field(self, field: impl Into<String>) -> ColumnExpr {
        ColumnExpr::StructField { base: Box::new(self), field: field.into() }
    }

    pub fn lt(self, other: impl Into<ColumnExpr>) -> ColumnExpr {
        cmp(CmpOp::Lt, self, other.into())
    }
    pub fn le(self, other: impl Into<ColumnExpr>) -> ColumnExpr {
        cmp(CmpOp::Le, self, other.into())
    }
    pub fn gt(self, other: impl Into<ColumnExpr>) -> ColumnExpr {
        cmp(CmpOp::Gt, self, other.into())
    }
    pub fn ge(self, other: impl Into<ColumnExpr>) -> ColumnExpr {
        cmp(CmpOp::Ge, self, other.into())
    }
    pub fn eq_(self, other: impl Into<ColumnExpr>) -> ColumnExpr {
        cmp(CmpOp::Eq, self, other.into())
    }
    pub fn ne_(self, other: impl Into<ColumnExpr>) -> ColumnExpr {
        cmp(CmpOp::Ne, self, other.into())
    }

    pub fn and(self, other: ColumnExpr) -> ColumnExpr {
        ColumnExpr::Logic { op: LogicOp::And, left: Box::new(self), right: Box::new(other) }
    }
    pub fn or(self, other: ColumnExpr) -> ColumnExpr {
        ColumnExpr::Logic { op: LogicOp::Or, left: Box::new(self), right: Box::new(other) }
    }
    pub fn xor(self, other: ColumnExpr) -> ColumnExpr {
        ColumnExpr::Logic { op: LogicOp::Xor, left: Box::new(self), right: Box::new(other) }
    }
    pub fn not(self) -> ColumnExpr {
        ColumnExpr::Not(Box::new(self))
    }

    pub fn greatest(self, other: impl Into<ColumnExpr>) -> ColumnExpr {
        ColumnExpr::Greatest { left: Box::new(self), right: Box::new(other.into()) }
    }
    pub fn least(self, other: impl Into<ColumnExpr>) -> ColumnExpr {
        ColumnExpr::Least { left: Box::new(self), right: Box::new(other.into()) }
    }
    pub fn clip(self, a_min: Option<Value>, a_max: Option<Value>) -> ColumnExpr {
        ColumnExpr::Clip { input: Box::new(self), min: a_min, max: a_max }
    }
    pub fn round(self, decimals: i32) -> ColumnExpr {
        ColumnExpr::Round { input: Box::new(self), decimals }
    }
    pub fn ceil(self) -> ColumnExpr {
        ColumnExpr::Ceil(Box::new(self))
    }
    pub fn floor(self) -> ColumnExpr {
        ColumnExpr::Floor(Box::new(self))
    }
    pub fn fillna(self, value: impl Into<Value>) -> ColumnExpr {
        ColumnExpr::FillNull { input: Box::new(self), value: value.into() }
    }
    pub fn coalesce(self, other: ColumnExpr) -> ColumnExpr {
        ColumnExpr::CoalesceExpr { left: Box::new(self), right: Box::new(other) }
    }
    pub fn astype(self, dtype: DataType) -> ColumnExpr {
        ColumnExpr::Cast { input: Box::new(self), dtype }
    }

    pub fn udf(name: impl Into<String>, args: Vec<ColumnExpr>) -> ColumnExpr {
        ColumnExpr::Udf { name: name.into(), args }
    }

    /// Canonical, parenthesised textual form. Used as a stable identity
    /// component of plan fingerprints (spec.md §4.3).
    pub fn key(&self) -> String {
        match self {
            ColumnExpr::Column(name) => name.clone(),
            ColumnExpr::Literal(v) => v.to_string(),
            ColumnExpr::StructField { base, field } => format!("{}[{}]", base.key(), field),
            ColumnExpr::Arith { op, left, right } => {
                format!("({}{}{})", left.key(), op.symbol(), right.key())
            }
            ColumnExpr::Cmp { op, left, right } => {
                format!("({}{}{})", left.key(), op.symbol(), right.key())
            }
            ColumnExpr::Logic { op, left, right } => {
                format!("({}{}{})", left.key(), op.symbol(), right.key())
            }
            ColumnExpr::Not(inner) => format!("~{}", inner.key()),
            ColumnExpr::Greatest { left, right } => format!("greatest({}, {})", left.key(), right.key()),
            ColumnExpr::Least { left, right } => format!("least({}, {})", left.key(), right.key()),
            ColumnExpr::Clip { input, min, max } => format!(
                "{}.clip({}, {})",
                input.key(),
                min.as_ref().map(ToString::to_string).unwrap_or_default(),
                max.as_ref().map(ToString::to_string).unwrap_or_default()
            ),
            ColumnExpr::Round { input, decimals } => format!("round({}, {})", input.key(), decimals),
            ColumnExpr::Ceil(inner) => format!("ceil({})", inner.key()),
            ColumnExpr::Floor(inner) => format!("floor({})", inner.key()),
            ColumnExpr::FillNull { input, value } => format!("{}.fillna({})", input.key(), value),
            ColumnExpr::CoalesceExpr { left, right } => format!("coalesce({}, {})", left.key(), right.key()),
            ColumnExpr::Cast { input, dtype } => format!("cast({} as {})", input.key(), dtype),
            ColumnExpr::Udf { name, args } => {
                let arg_keys: Vec<String> = args.iter().map(ColumnExpr::key).collect();
                format!("{}({})", name, arg_keys.join(", "))
            }
        }
    }

    /// Union of required source columns / dotted struct paths.
    pub fn required(&self) -> BTreeSet<String> {
        match self {
            ColumnExpr::Column(name) => [name.clone()].into_iter().collect(),
            ColumnExpr::Literal(_) => BTreeSet::new(),
            ColumnExpr::StructField { base, field } => base
                .required()
                .into_iter()
                .map(|r| format!("{r}.{field}"))
                .collect(),
            ColumnExpr::Arith { left, right, .. }
            | ColumnExpr::Cmp { left, right, .. }
            | ColumnExpr::Logic { left, right, .. }
            | ColumnExpr::Greatest { left, right }
            | ColumnExpr::Least { left, right }
            | ColumnExpr::CoalesceExpr { left, right } => {
                left.required().into_iter().chain(right.required()).collect()
            }
            ColumnExpr::Not(inner)
            | ColumnExpr::Clip { input: inner, .. }
            | ColumnExpr::Round { input: inner, .. }
            | ColumnExpr::Ceil(inner)
            | ColumnExpr::Floor(inner)
            | ColumnExpr::FillNull { input: inner, .. }
            | ColumnExpr::Cast { input: inner, .. } => inner.required(),
            ColumnExpr::Udf { args, .. } => args.iter().flat_map(ColumnExpr::required).collect(),
        }
    }

    /// True when this expression evaluates to a boolean mask. Comparisons,
    /// logical combinators, and negation are always masks; the flag
    /// propagates as an OR across logical combinators since both operands
    /// of an `And`/`Or`/`Xor` must already be masks.
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            ColumnExpr::Cmp { .. } | ColumnExpr::Logic { .. } | ColumnExpr::Not(_)
        )
    }

    /// Composition depth: max child depth + 1. Used only for evaluation
    /// ordering diagnostics; evaluation itself is a plain recursive walk.
    pub fn depth(&self) -> usize {
        match self {
            ColumnExpr::Column(_) | ColumnExpr::Literal(_) => 0,
            ColumnExpr::StructField { base, .. } => base.depth() + 1,
            ColumnExpr::Arith { left, right, .. }
            | ColumnExpr::Cmp { left, right, .. }
            | ColumnExpr::Logic { left, right, .. }
            | ColumnExpr::Greatest { left, right }
            | ColumnExpr::Least { left, right }
            | ColumnExpr::CoalesceExpr { left, right } => left.depth().max(right.depth()) + 1,
            ColumnExpr::Not(inner)
            | ColumnExpr::Clip { input: inner, .. }
            | ColumnExpr::Round { input: inner, .. }
            | ColumnExpr::Ceil(inner)
            | ColumnExpr::Floor(inner)
            | ColumnExpr::FillNull { input: inner, .. }
            | ColumnExpr::Cast { input: inner, .. } => inner.depth() + 1,
            ColumnExpr::Udf { args, .. } => args.iter().map(ColumnExpr::depth).max().unwrap_or(0) + 1,
        }
    }

    /// Strict, recursive evaluation against a materialised table.
    pub fn evaluate(&self, table: &Table, udfs: &UdfRegistry) -> Result<ArrayRef, ExprError> {
        match self {
            ColumnExpr::Column(name) => kernels::column_ref(table, name),
            ColumnExpr::Literal(value) => kernels::literal_array(value, table.num_rows()),
            ColumnExpr::StructField { base, field } => {
                let arr = base.evaluate(table, udfs)?;
                kernels::struct_field(&arr, field)
            }
            ColumnExpr::Arith { op, left, right } => {
                let l = left.evaluate(table, udfs)?;
                let r = right.evaluate(table, udfs)?;
                kernels::arith(*op, &l, &r)
            }
            ColumnExpr::Cmp { op, left, right } => {
                let l = left.evaluate(table, udfs)?;
                let r = right.evaluate(table, udfs)?;
                kernels::compare(*op, &l, &r)
            }
            ColumnExpr::Logic { op, left, right } => {
                let l = left.evaluate(table, udfs)?;
                let r = right.evaluate(table, udfs)?;
                kernels::logic(*op, &l, &r)
            }
            ColumnExpr::Not(inner) => kernels::not(&inner.evaluate(table, udfs)?),
            ColumnExpr::Greatest { left, right } => {
                kernels::greatest(&left.evaluate(table, udfs)?, &right.evaluate(table, udfs)?)
            }
            ColumnExpr::Least { left, right } => {
                kernels::least(&left.evaluate(table, udfs)?, &right.evaluate(table, udfs)?)
            }
            ColumnExpr::Clip { input, min, max } => {
                kernels::clip(&input.evaluate(table, udfs)?, min.as_ref(), max.as_ref())
            }
            ColumnExpr::Round { input, decimals } => {
                kernels::round(&input.evaluate(table, udfs)?, *decimals)
            }
            ColumnExpr::Ceil(inner) => kernels::ceil(&inner.evaluate(table, udfs)?),
            ColumnExpr::Floor(inner) => kernels::floor(&inner.evaluate(table, udfs)?),
            ColumnExpr::FillNull { input, value } => {
                kernels::fill_null(&input.evaluate(table, udfs)?, value)
            }
            ColumnExpr::CoalesceExpr { left, right } => {
                kernels::coalesce(&left.evaluate(table, udfs)?, &right.evaluate(table, udfs)?)
            }
            ColumnExpr::Cast { input, dtype } => kernels::cast(&input.evaluate(table, udfs)?, *dtype),
            ColumnExpr::Udf { name, args } => {
                let expected = udfs
                    .arity(name)
                    .ok_or_else(|| ExprError::TypeMismatch(format!("unregistered udf '{name}'")))?;
                if args.len() != expected {
                    return Err(ExprError::ArityMismatch {
                        name: name.clone(),
                        expected,
                        actual: args.len(),
                    });
                }
                let arrays: Vec<ArrayRef> = args
                    .iter()
                    .map(|a| a.evaluate(table, udfs))
                    .collect::<Result<_, _>>()?;
                let f = udfs.get(name).expect("arity lookup above confirms registration");
                f(&arrays)
            }
        }
    }
}

fn cmp(op: CmpOp, left: ColumnExpr, right: ColumnExpr) -> ColumnExpr {
    ColumnExpr::Cmp { op, left: Box::new(left), right: Box::new(right) }
}

impl From<i64> for ColumnExpr {
    fn from(v: i64) -> Self {
        ColumnExpr::Literal(Value::Int64(v))
    }
}
impl From<f64> for ColumnExpr {
    fn from(v: f64) -> Self {
        ColumnExpr::Literal(Value::Float64(v))
    }
}
impl From<&str> for ColumnExpr {
    fn from(v: &str) -> Self {
        ColumnExpr::Literal(Value::Utf8(v.to_string()))
    }
}
impl From<bool> for ColumnExpr {
    fn from(v: bool) -> Self {
        ColumnExpr::Literal(Value::Bool(v))
    }
}

macro_rules! impl_arith_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait<ColumnExpr> for ColumnExpr {
            type Output = ColumnExpr;
            fn $method(self, rhs: ColumnExpr) -> ColumnExpr {
                ColumnExpr::Arith { op: $op, left: Box::new(self), right: Box::new(rhs) }
            }
        }
        impl ops::$trait<i64> for ColumnExpr {
            type Output = ColumnExpr;
            fn $method(self, rhs: i64) -> ColumnExpr {
                ColumnExpr::Arith { op: $op, left: Box::new(self), right: Box::new(rhs.into()) }
            }
        }
        impl ops::$trait<f64> for ColumnExpr {
            type Output = ColumnExpr;
            fn $method(self, rhs: f64) -> ColumnExpr {
                ColumnExpr::Arith { op: $op, left: Box::new(self), right: Box::new(rhs.into()) }
            }
        }
    };
}

impl_arith_op!(Add, add, ArithOp::Add);
impl_arith_op!(Sub, sub, ArithOp::Sub);
impl_arith_op!(Mul, mul, ArithOp::Mul);
impl_arith_op!(Div, div, ArithOp::Div);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_canonical_and_parenthesised() {
        let expr = ColumnExpr::col("a") + ColumnExpr::col("b");
        assert_eq!(expr.key(), "(a+b)");
    }

    #[test]
    fn required_unions_children() {
        let expr = (ColumnExpr::col("a") + ColumnExpr::col("b")).gt(0i64);
        let required: Vec<String> = expr.required().into_iter().collect();
        assert_eq!(required, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn struct_field_access_dots_required_paths() {
        let expr = ColumnExpr::col("addr").field("city");
        assert_eq!(expr.required(), ["addr.city".to_string()].into_iter().collect());
    }

    #[test]
    fn comparisons_and_logic_are_boolean() {
        let cmp = ColumnExpr::col("a").gt(0i64);
        assert!(cmp.is_boolean());
        let combined = cmp.clone().and(ColumnExpr::col("b").lt(10i64));
        assert!(combined.is_boolean());
        assert!(!ColumnExpr::col("a").is_boolean());
    }

    #[test]
    fn depth_tracks_composition() {
        let leaf = ColumnExpr::col("a");
        assert_eq!(leaf.depth(), 0);
        let one = leaf.clone() + 1i64;
        assert_eq!(one.depth(), 1);
        let two = one.gt(0i64);
        assert_eq!(two.depth(), 2);
    }

    #[test]
    fn clip_with_one_bound_leaves_other_side_unchanged_in_key() {
        let expr = ColumnExpr::col("a").clip(Some(Value::Int64(0)), None);
        assert_eq!(expr.key(), "a.clip(0, )");
    }

    #[test]
    fn udf_call_with_wrong_arity_fails_before_invoking_closure() {
        use arrow::array::{ArrayRef, Int64Array};
        use arrow::record_batch::RecordBatch;
        use std::sync::Arc;

        let array: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let batch = RecordBatch::try_from_iter(vec![("a", array)]).unwrap();
        let table = Table::from_batch(batch);

        let mut udfs = UdfRegistry::new();
        udfs.register(
            "double",
            1,
            Arc::new(|args: &[ArrayRef]| {
                let ints = args[0].as_any().downcast_ref::<Int64Array>().unwrap();
                let doubled: Int64Array = ints.iter().map(|v| v.map(|v| v * 2)).collect();
                Ok(Arc::new(doubled) as ArrayRef)
            }),
        );

        let call = ColumnExpr::udf("double", vec![ColumnExpr::col("a"), ColumnExpr::col("a")]);
        let err = call.evaluate(&table, &udfs).unwrap_err();
        assert!(matches!(err, ExprError::ArityMismatch { expected: 1, actual: 2, .. }));
    }
}
