//! Arrow-backed leaf operations for [`super::ColumnExpr::evaluate`].
//!
//! Kept separate from the tree walk itself so the recursive structure in
//! `mod.rs` reads as pure dispatch, and the actual column math lives next to
//! the Arrow types it touches.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, PrimitiveArray, StringArray, StructArray,
};
use arrow::compute;
use arrow::compute::kernels::{boolean, cmp, numeric, zip};
use arrow::datatypes::DataType as ArrowType;

use super::{ArithOp, CmpOp, LogicOp};
use crate::error::ExprError;
use crate::table::{DataType, Table, Value};

fn kernel_err(e: arrow::error::ArrowError) -> ExprError {
    ExprError::TypeMismatch(e.to_string())
}

pub(super) fn column_ref(table: &Table, name: &str) -> Result<ArrayRef, ExprError> {
    table
        .column(name)
        .cloned()
        .map_err(|_| ExprError::RefMissing(name.to_string()))
}

pub(super) fn literal_array(value: &Value, len: usize) -> Result<ArrayRef, ExprError> {
    let array: ArrayRef = match value {
        Value::Int64(v) => Arc::new(Int64Array::from(vec![*v; len])),
        Value::Float64(v) => Arc::new(Float64Array::from(vec![*v; len])),
        Value::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str(); len])),
        Value::Bool(v) => Arc::new(BooleanArray::from(vec![*v; len])),
        Value::Null => Arc::new(BooleanArray::from(vec![None; len])),
    };
    Ok(array)
}

pub(super) fn struct_field(array: &ArrayRef, field: &str) -> Result<ArrayRef, ExprError> {
    let structs = array
        .as_any()
        .downcast_ref::<StructArray>()
        .ok_or_else(|| ExprError::TypeMismatch(format!("'{field}' access on a non-struct column")))?;
    structs
        .column_by_name(field)
        .cloned()
        .ok_or_else(|| ExprError::RefMissing(field.to_string()))
}

pub(super) fn arith(op: ArithOp, left: &ArrayRef, right: &ArrayRef) -> Result<ArrayRef, ExprError> {
    let result = match op {
        ArithOp::Add => numeric::add(left, right),
        ArithOp::Sub => numeric::sub(left, right),
        ArithOp::Mul => numeric::mul(left, right),
        ArithOp::Div => numeric::div(left, right),
    };
    result.map_err(kernel_err)
}

pub(super) fn compare(op: CmpOp, left: &ArrayRef, right: &ArrayRef) -> Result<ArrayRef, ExprError> {
    let mask = match op {
        CmpOp::Lt => cmp::lt(left, right),
        CmpOp::Le => cmp::lt_eq(left, right),
        CmpOp::Gt => cmp::gt(left, right),
        CmpOp::Ge => cmp::gt_eq(left, right),
        CmpOp::Eq => cmp::eq(left, right),
        CmpOp::Ne => cmp::neq(left, right),
    }
    .map_err(kernel_err)?;
    Ok(Arc::new(mask))
}

fn as_bool(array: &ArrayRef) -> Result<&BooleanArray, ExprError> {
    array
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| ExprError::TypeMismatch("expected a boolean mask".to_string()))
}

pub(super) fn logic(op: LogicOp, left: &ArrayRef, right: &ArrayRef) -> Result<ArrayRef, ExprError> {
    let l = as_bool(left)?;
    let r = as_bool(right)?;
    let result = match op {
        LogicOp::And => boolean::and(l, r),
        LogicOp::Or => boolean::or(l, r),
        LogicOp::Xor => {
            let and = boolean::and(l, r).map_err(kernel_err)?;
            let or = boolean::or(l, r).map_err(kernel_err)?;
            let not_and = boolean::not(&and).map_err(kernel_err)?;
            return boolean::and(&or, &not_and).map(|a| Arc::new(a) as ArrayRef).map_err(kernel_err);
        }
    };
    result.map(|a| Arc::new(a) as ArrayRef).map_err(kernel_err)
}

pub(super) fn not(array: &ArrayRef) -> Result<ArrayRef, ExprError> {
    let b = as_bool(array)?;
    boolean::not(b).map(|a| Arc::new(a) as ArrayRef).map_err(kernel_err)
}

/// `zip(predicate, truthy, falsy)`: element `i` comes from `truthy` when
/// `predicate[i]` is true, from `falsy` otherwise.
fn zip_by(predicate: &BooleanArray, truthy: &ArrayRef, falsy: &ArrayRef) -> Result<ArrayRef, ExprError> {
    zip::zip(predicate, truthy, falsy).map_err(kernel_err)
}

pub(super) fn greatest(left: &ArrayRef, right: &ArrayRef) -> Result<ArrayRef, ExprError> {
    let mask = cmp::gt_eq(left, right).map_err(kernel_err)?;
    zip_by(&mask, left, right)
}

pub(super) fn least(left: &ArrayRef, right: &ArrayRef) -> Result<ArrayRef, ExprError> {
    let mask = cmp::lt_eq(left, right).map_err(kernel_err)?;
    zip_by(&mask, left, right)
}

pub(super) fn clip(
    array: &ArrayRef,
    min: Option<&Value>,
    max: Option<&Value>,
) -> Result<ArrayRef, ExprError> {
    let mut out = array.clone();
    if let Some(min) = min {
        let min_arr = literal_array(min, array.len())?;
        out = greatest(&out, &min_arr)?;
    }
    if let Some(max) = max {
        let max_arr = literal_array(max, array.len())?;
        out = least(&out, &max_arr)?;
    }
    Ok(out)
}

fn map_float<F: Fn(f64) -> f64>(array: &ArrayRef, f: F) -> Result<ArrayRef, ExprError> {
    let floats = array
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| ExprError::TypeMismatch("expected a float64 column".to_string()))?;
    let mapped: PrimitiveArray<arrow::datatypes::Float64Type> =
        floats.iter().map(|opt| opt.map(&f)).collect();
    Ok(Arc::new(mapped))
}

pub(super) fn round(array: &ArrayRef, decimals: i32) -> Result<ArrayRef, ExprError> {
    let factor = 10f64.powi(decimals);
    map_float(array, move |v| (v * factor).round() / factor)
}

pub(super) fn ceil(array: &ArrayRef) -> Result<ArrayRef, ExprError> {
    map_float(array, f64::ceil)
}

pub(super) fn floor(array: &ArrayRef) -> Result<ArrayRef, ExprError> {
    map_float(array, f64::floor)
}

pub(super) fn fill_null(array: &ArrayRef, value: &Value) -> Result<ArrayRef, ExprError> {
    let fill = literal_array(value, array.len())?;
    let is_null = compute::is_null(array).map_err(kernel_err)?;
    zip_by(&is_null, &fill, array)
}

pub(super) fn coalesce(left: &ArrayRef, right: &ArrayRef) -> Result<ArrayRef, ExprError> {
    let is_null = compute::is_null(left).map_err(kernel_err)?;
    zip_by(&is_null, right, left)
}

pub(super) fn cast(array: &ArrayRef, dtype: DataType) -> Result<ArrayRef, ExprError> {
    let target: ArrowType = match dtype {
        DataType::Int64 => ArrowType::Int64,
        DataType::Float64 => ArrowType::Float64,
        DataType::Utf8 => ArrowType::Utf8,
        DataType::Bool => ArrowType::Boolean,
        DataType::Null => ArrowType::Null,
    };
    compute::cast(array, &target).map_err(kernel_err)
}
