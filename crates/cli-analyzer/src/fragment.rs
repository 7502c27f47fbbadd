//! One positional slot in a command or option's fragment list. Grounded on
//! `core/model/fragment.py`.

use std::sync::Arc;

use crate::capture::{Capture, PlainCapture};
use crate::receiver::{DefaultRx, Rx};
use crate::value::Value;

/// Fragments sharing a `FragmentGroup` reject each other: once one has been
/// captured, the others listed in `rejects` can no longer be.
#[derive(Clone)]
pub struct FragmentGroup {
    ident: Arc<str>,
    /// Idents of sibling groups that become unavailable once this group has
    /// successfully captured a fragment.
    pub rejects: Vec<String>,
}

impl FragmentGroup {
    pub fn new(ident: impl Into<Arc<str>>) -> Self {
        Self { ident: ident.into(), rejects: Vec::new() }
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }
}

impl PartialEq for FragmentGroup {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ident, &other.ident)
    }
}

#[derive(Clone)]
pub struct Fragment {
    pub name: String,
    pub variadic: bool,
    pub group: Option<FragmentGroup>,
    pub default: Option<Value>,
    pub default_factory: Option<Arc<dyn Fn() -> Value + Send + Sync>>,

    pub separators: Option<String>,
    pub hybrid_separators: bool,

    pub capture: Arc<dyn Capture>,
    pub receiver: Arc<dyn Rx>,
    pub validator: Option<Arc<dyn Fn(&Value) -> bool + Send + Sync>>,
    pub transformer: Option<Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>>,
}

impl Fragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variadic: false,
            group: None,
            default: None,
            default_factory: None,
            separators: None,
            hybrid_separators: true,
            capture: Arc::new(PlainCapture),
            receiver: Arc::new(DefaultRx),
            validator: None,
            transformer: None,
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn default_factory(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default_factory = Some(Arc::new(f));
        self
    }

    pub fn separators(mut self, separators: impl Into<String>) -> Self {
        self.separators = Some(separators.into());
        self
    }

    pub fn capture(mut self, capture: impl Capture + 'static) -> Self {
        self.capture = Arc::new(capture);
        self
    }

    pub fn receiver(mut self, receiver: impl Rx + 'static) -> Self {
        self.receiver = Arc::new(receiver);
        self
    }

    pub fn validator(mut self, validator: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn transformer(mut self, transformer: impl Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }
}

/// Validates the ordering invariant from §3: required fragments all precede
/// any defaulted fragment, and a variadic fragment (if present) is last and
/// carries no default of its own.
pub fn assert_fragments_order(fragments: &[Fragment]) {
    let mut default_exists = false;
    let mut variadic_exists = false;

    for frag in fragments {
        assert!(!variadic_exists, "found a fragment after a variadic fragment, which is not allowed");

        if frag.default.is_some() {
            default_exists = true;
        } else if default_exists && !frag.variadic {
            panic!("found a required fragment after an optional fragment, which is not allowed");
        }

        if frag.variadic {
            assert!(frag.default.is_none(), "a variadic fragment cannot have a default value");
            variadic_exists = true;
        }
    }
}
