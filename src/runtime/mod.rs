//! Runtime values
//!
//! This module provides the value types promises carry: primitives,
//! property bags that may act as thenables, and native callables.

mod value;

pub use value::{first_arg, Function, NativeFn, Object, Value};
pub(crate) use value::next_object_id;
