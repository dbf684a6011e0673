//! Filter predicates and aggregate method vocabulary (spec.md §3, §6, §9).

use std::fmt;

use crate::table::Value;

/// `=`/`==` canonicalise to the same variant at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl FilterOp {
    pub fn parse(raw: &str) -> Option<FilterOp> {
        match raw {
            "=" | "==" => Some(FilterOp::Eq),
            "!=" => Some(FilterOp::Ne),
            "<" => Some(FilterOp::Lt),
            ">" => Some(FilterOp::Gt),
            "<=" => Some(FilterOp::Le),
            ">=" => Some(FilterOp::Ge),
            "in" => Some(FilterOp::In),
            "not in" => Some(FilterOp::NotIn),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::In => "in",
            FilterOp::NotIn => "not in",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// The right-hand side of a predicate: a single scalar for ordering
/// comparisons, a finite set for `in`/`not in`.
#[derive(Debug, Clone)]
pub enum FilterValue {
    Scalar(Value),
    Set(Vec<Value>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Scalar(v) => write!(f, "{v}"),
            FilterValue::Set(values) => {
                let mut rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                rendered.sort();
                write!(f, "[{}]", rendered.join(","))
            }
        }
    }
}

/// `(column, op, value)` — predicates are ANDed; OR is rejected at the SQL
/// front end (spec.md §3).
#[derive(Debug, Clone)]
pub struct Predicate {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: FilterOp, value: FilterValue) -> Predicate {
        Predicate { column: column.into(), op, value }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::new(column, FilterOp::Eq, FilterValue::Scalar(value.into()))
    }

    pub fn canonical(&self) -> String {
        format!("{} {} {}", self.column, self.op, self.value)
    }
}

/// Aggregate methods (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggMethod {
    Sum,
    Max,
    Min,
    Mean,
    Median,
    Count,
    DistinctCount,
    Prod,
    Std,
    Var,
}

impl AggMethod {
    pub fn parse(raw: &str) -> Option<AggMethod> {
        match raw {
            "sum" => Some(AggMethod::Sum),
            "max" => Some(AggMethod::Max),
            "min" => Some(AggMethod::Min),
            "mean" => Some(AggMethod::Mean),
            "median" => Some(AggMethod::Median),
            "count" => Some(AggMethod::Count),
            "distinct_count" => Some(AggMethod::DistinctCount),
            "prod" => Some(AggMethod::Prod),
            "std" => Some(AggMethod::Std),
            "var" => Some(AggMethod::Var),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggMethod::Sum => "sum",
            AggMethod::Max => "max",
            AggMethod::Min => "min",
            AggMethod::Mean => "mean",
            AggMethod::Median => "median",
            AggMethod::Count => "count",
            AggMethod::DistinctCount => "distinct_count",
            AggMethod::Prod => "prod",
            AggMethod::Std => "std",
            AggMethod::Var => "var",
        }
    }
}

impl fmt::Display for AggMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One entry of an `aggregate()` `methods` map: `output -> (input, method)`.
#[derive(Debug, Clone)]
pub struct AggSpec {
    pub input: String,
    pub method: AggMethod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_and_double_eq_canonicalise_the_same() {
        assert_eq!(FilterOp::parse("="), FilterOp::parse("=="));
    }

    #[test]
    fn set_rendering_is_sorted() {
        let v = FilterValue::Set(vec![Value::Int64(3), Value::Int64(1), Value::Int64(2)]);
        assert_eq!(v.to_string(), "[1,2,3]");
    }
}
