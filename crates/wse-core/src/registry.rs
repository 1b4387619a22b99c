//! Operation registry
//!
//! Operations declare their argument style when they are registered, so a
//! worker never inspects a callable to decide how to pass arguments:
//! - [`Operation::NoArgs`] accepts `null` or `{}` only
//! - [`Operation::Keyword`] receives a JSON object as named arguments
//! - [`Operation::Positional`] receives the payload as one value, whatever it is

use crate::error::OperationError;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by an operation invocation
pub type OperationFuture = BoxFuture<'static, Result<Value, OperationError>>;

type NoArgsFn = dyn Fn() -> OperationFuture + Send + Sync;
type KeywordFn = dyn Fn(Map<String, Value>) -> OperationFuture + Send + Sync;
type PositionalFn = dyn Fn(Value) -> OperationFuture + Send + Sync;

/// A callable operation with its argument style
#[derive(Clone)]
pub enum Operation {
    NoArgs(Arc<NoArgsFn>),
    Keyword(Arc<KeywordFn>),
    Positional(Arc<PositionalFn>),
}

impl Operation {
    /// Operation taking no arguments
    pub fn no_args<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, OperationError>> + Send + 'static,
    {
        Self::NoArgs(Arc::new(move || f().boxed()))
    }

    /// Operation taking named arguments as a JSON object
    pub fn keyword<F, Fut>(f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, OperationError>> + Send + 'static,
    {
        Self::Keyword(Arc::new(move |kwargs| f(kwargs).boxed()))
    }

    /// Operation taking the whole payload as a single value
    pub fn positional<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, OperationError>> + Send + 'static,
    {
        Self::Positional(Arc::new(move |value| f(value).boxed()))
    }

    /// Keyword operation with typed arguments and result
    ///
    /// Arguments that do not deserialize into `A` (missing required fields,
    /// unknown fields when `A` denies them, wrong types) fail the job with
    /// [`OperationError::InvalidArguments`].
    pub fn typed<A, R, F, Fut>(f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, OperationError>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::keyword(move |kwargs| {
            let f = Arc::clone(&f);
            async move {
                let args: A = serde_json::from_value(Value::Object(kwargs))?;
                let result = f.as_ref()(args).await?;
                serde_json::to_value(result)
                    .map_err(|e| OperationError::failed(format!("unserializable result: {e}")))
            }
        })
    }

    /// Argument style name
    #[must_use]
    pub fn style(&self) -> &'static str {
        match self {
            Self::NoArgs(_) => "no-args",
            Self::Keyword(_) => "keyword",
            Self::Positional(_) => "positional",
        }
    }

    /// Invoke with a submitted payload
    pub fn invoke(&self, args: Value) -> OperationFuture {
        match (self, args) {
            (Self::NoArgs(f), Value::Null) => f(),
            (Self::NoArgs(f), Value::Object(map)) if map.is_empty() => f(),
            (Self::NoArgs(_), other) => reject(format!(
                "operation takes no arguments, got {}",
                value_kind(&other)
            )),
            (Self::Keyword(f), Value::Null) => f(Map::new()),
            (Self::Keyword(f), Value::Object(map)) => f(map),
            (Self::Keyword(_), other) => reject(format!(
                "operation expects named arguments (an object), got {}",
                value_kind(&other)
            )),
            (Self::Positional(f), value) => f(value),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Operation").field(&self.style()).finish()
    }
}

fn reject(message: String) -> OperationFuture {
    future::ready(Err(OperationError::InvalidArguments(message))).boxed()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Name -> operation mapping, extensible after construction
#[derive(Debug, Default)]
pub struct OperationRegistry {
    ops: RwLock<BTreeMap<String, Operation>>,
}

impl OperationRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `op` under `name`, returning the operation it replaced
    pub fn register(&self, name: impl Into<String>, op: Operation) -> Option<Operation> {
        self.ops.write().insert(name.into(), op)
    }

    /// Look up an operation
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Operation> {
        self.ops.read().get(name).cloned()
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.ops.read().contains_key(name)
    }

    /// Registered names in sorted order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.ops.read().keys().cloned().collect()
    }

    /// Number of registered operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.read().len()
    }

    /// Whether no operation is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.read().is_empty()
    }
}
