//! Named statement parameters.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::value::Value;

/// Sigils accepted in front of a parameter name in command text.
pub const SIGILS: [char; 2] = [':', '@'];

/// A named, mutable value cell bound to at most one [`Statement`](crate::Statement).
///
/// `Parameter` is a handle: clones share the same cell, so the caller keeps a
/// clone, passes another to the statement, and updates the value between
/// executions.
///
/// ```
/// use zero_pgstmt::{Parameter, Value};
///
/// let id = Parameter::new(":id", 1);
/// let handle = id.clone();
/// handle.set_value(2);
/// assert_eq!(id.value(), Value::Int4(2));
/// ```
#[derive(Clone)]
pub struct Parameter {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    custom_type_name: Option<String>,
    value: Mutex<Value>,
    owner: Mutex<Owner>,
}

/// Ownership moves `Free -> Claimed -> Statement` and never back past
/// `Statement`. A claim is released when statement construction fails.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Owner {
    Free,
    Claimed,
    Statement(String),
}

impl Parameter {
    /// Create a parameter without an explicit type cast.
    ///
    /// `name` is the identity used both for lookup and for matching in command
    /// text, e.g. `":id"`. Either sigil matches in the text regardless of the
    /// one used here.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::build(name.into(), None, value.into())
    }

    /// Create a parameter whose placeholder is rendered with a cast, as in `$1::int4`.
    ///
    /// An empty type name behaves like [`Parameter::new`].
    pub fn with_type(
        name: impl Into<String>,
        custom_type_name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let custom_type_name = Some(custom_type_name.into()).filter(|t| !t.is_empty());
        Self::build(name.into(), custom_type_name, value.into())
    }

    fn build(name: String, custom_type_name: Option<String>, value: Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                custom_type_name,
                value: Mutex::new(value),
                owner: Mutex::new(Owner::Free),
            }),
        }
    }

    /// The name as given at construction.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The name without its leading sigil.
    pub fn bare_name(&self) -> &str {
        let name = self.name();
        name.strip_prefix(SIGILS).unwrap_or(name)
    }

    /// Cast type appended to the positional placeholder, if any.
    pub fn custom_type_name(&self) -> Option<&str> {
        self.inner.custom_type_name.as_deref()
    }

    /// A copy of the current value.
    pub fn value(&self) -> Value {
        self.lock().clone()
    }

    /// Replace the value used by the next execution.
    pub fn set_value(&self, value: impl Into<Value>) {
        *self.lock() = value.into();
    }

    /// Returns true once the parameter belongs to a statement, or is being
    /// claimed by one under construction.
    pub fn is_bound(&self) -> bool {
        *self.owner() != Owner::Free
    }

    /// Prepared-statement name of the owning statement.
    pub fn statement_name(&self) -> Option<String> {
        match &*self.owner() {
            Owner::Statement(name) => Some(name.clone()),
            Owner::Free | Owner::Claimed => None,
        }
    }

    /// Returns true if both handles refer to the same parameter.
    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Positional placeholder for this parameter at 1-based `position`.
    pub fn positional_token(&self, position: usize) -> String {
        match self.custom_type_name() {
            Some(cast) => format!("${}::{}", position, cast),
            None => format!("${}", position),
        }
    }

    /// Reserve the parameter for a statement under construction.
    ///
    /// Fails if it is already claimed or owned; the existing owner is kept.
    pub(crate) fn claim(&self) -> Result<()> {
        let mut owner = self.owner();
        if *owner != Owner::Free {
            return Err(Error::ParameterAlreadyBound {
                name: self.name().to_string(),
            });
        }
        *owner = Owner::Claimed;
        Ok(())
    }

    /// Give back a claim taken by [`claim`](Self::claim).
    pub(crate) fn release(&self) {
        let mut owner = self.owner();
        if *owner == Owner::Claimed {
            *owner = Owner::Free;
        }
    }

    /// Turn a claim into ownership by `statement`.
    pub(crate) fn bind(&self, statement: &str) {
        let mut owner = self.owner();
        if *owner == Owner::Claimed {
            *owner = Owner::Statement(statement.to_string());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.inner.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owner(&self) -> MutexGuard<'_, Owner> {
        self.inner.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.inner.name)
            .field("custom_type_name", &self.inner.custom_type_name)
            .field("value", &*self.lock())
            .field("owner", &*self.owner())
            .finish()
    }
}
