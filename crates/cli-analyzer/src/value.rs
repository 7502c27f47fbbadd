//! The dynamic value captured into a [`crate::mix::Mix`]. Stands in for
//! Python's untyped `dict[str, Any]` assignment map — a closed enum instead
//! of `Any`, with an escape hatch (`Opaque`) for capture strategies that
//! produce a genuinely typed result (`ObjectCapture<T>`, `RegexCapture`).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub enum Value {
    Str(String),
    Count(u64),
    List(Vec<Value>),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            Value::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Opaque(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Count(n) => write!(f, "Count({n})"),
            Value::List(items) => write!(f, "List({items:?})"),
            Value::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}
