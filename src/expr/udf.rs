//! User-defined function registry: positional `ArrayRef* -> ArrayRef`
//! callbacks registered on the engine and invoked from a `Udf` expression
//! node (spec.md §6).

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::ArrayRef;

use crate::error::ExprError;

pub type UdfFn = Arc<dyn Fn(&[ArrayRef]) -> Result<ArrayRef, ExprError> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    f: UdfFn,
    arity: usize,
}

/// The set of UDFs visible to expression evaluation. Cheap to clone —
/// shares the underlying function pointers.
#[derive(Clone, Default)]
pub struct UdfRegistry {
    functions: HashMap<String, Entry>,
}

impl UdfRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `arity` is the exact number of positional arguments the function
    /// accepts; a `Udf` call with a different argument count fails at
    /// evaluation with `ExprError::ArityMismatch` rather than indexing past
    /// the end of `args` inside the closure.
    pub fn register(&mut self, name: impl Into<String>, arity: usize, f: UdfFn) {
        self.functions.insert(name.into(), Entry { f, arity });
    }

    pub fn get(&self, name: &str) -> Option<&UdfFn> {
        self.functions.get(name).map(|e| &e.f)
    }

    pub fn arity(&self, name: &str) -> Option<usize> {
        self.functions.get(name).map(|e| e.arity)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;

    #[test]
    fn register_and_resolve() {
        let mut registry = UdfRegistry::new();
        registry.register(
            "double",
            1,
            Arc::new(|args: &[ArrayRef]| {
                let ints = args[0].as_any().downcast_ref::<Int64Array>().unwrap();
                let doubled: Int64Array = ints.iter().map(|v| v.map(|v| v * 2)).collect();
                Ok(Arc::new(doubled) as ArrayRef)
            }),
        );
        assert!(registry.contains("double"));
        assert_eq!(registry.arity("double"), Some(1));
        assert!(registry.get("missing").is_none());
    }
}
