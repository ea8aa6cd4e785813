//! Dynamic value types
//!
//! Promises settle with opaque values. The core only ever asks two questions
//! of a value: is it callable, and does it expose a callable `then`.

use crate::error::Result;
use crate::promise::Promise;
use crate::Error;
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity counter shared by objects and promises
static OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh identity for a reference value
pub(crate) fn next_object_id() -> u64 {
    OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Type alias for native function implementations
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// A value that can be carried by a promise
#[derive(Clone, Default)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Ordered sequence of values
    List(Rc<Vec<Value>>),
    /// Property bag, possibly exposing a `then` member
    Object(Object),
    /// Callable
    Function(Function),
    /// Promise instance
    Promise(Promise),
    /// Error synthesized by the core
    Error(Rc<Error>),
}

impl Value {
    /// Create a list value
    pub fn list(elements: Vec<Value>) -> Value {
        Value::List(Rc::new(elements))
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Check if value is a core-synthesized ResolutionCycleError
    pub fn is_resolution_cycle(&self) -> bool {
        self.as_error().is_some_and(Error::is_resolution_cycle)
    }

    /// Strict equality: primitives by value, reference kinds by identity
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.id() == b.id(),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(elements) => f.debug_list().entries(elements.iter()).finish(),
            Value::Object(obj) => write!(f, "[Object #{}]", obj.id()),
            Value::Function(func) => write!(f, "[Function: {}]", func.name()),
            Value::Promise(promise) => write!(f, "{:?}", promise),
            Value::Error(err) => write!(f, "{}", err),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.is_nan() {
                    write!(f, "NaN")
                } else if n.is_infinite() {
                    write!(f, "{}Infinity", if *n > 0.0 { "" } else { "-" })
                } else if *n == 0.0 {
                    write!(f, "0")
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::List(elements) => {
                let parts: Vec<String> = elements.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Function(func) => write!(f, "[Function: {}]", func.name()),
            Value::Promise(_) => write!(f, "[object Promise]"),
            Value::Error(err) => write!(f, "{}", err),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Value::list(elements)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Value::Promise(promise)
    }
}

/// A mutable property bag with identity
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectData>,
}

struct ObjectData {
    id: u64,
    properties: RefCell<HashMap<String, Value>>,
}

impl Object {
    /// Create an empty object
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectData {
                id: next_object_id(),
                properties: RefCell::new(HashMap::default()),
            }),
        }
    }

    /// Create an object exposing the given function as its `then` member
    pub fn thenable(then: Function) -> Self {
        let obj = Self::new();
        obj.set_property("then", Value::Function(then));
        obj
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn get_property(&self, key: &str) -> Option<Value> {
        self.inner.properties.borrow().get(key).cloned()
    }

    pub fn set_property(&self, key: &str, value: Value) {
        self.inner
            .properties
            .borrow_mut()
            .insert(key.to_string(), value);
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

/// A native callable
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    func: NativeFn,
}

impl Function {
    /// Create a new function from a closure
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name.into()),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

/// First argument of a native call, or undefined
pub fn first_arg(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or_default()
}
