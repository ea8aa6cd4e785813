//! quickpromise: a promise core with explicit scheduling
//!
//! A promise is a container for a value that becomes available later. This
//! crate implements the state machine behind it: deferred production, raw and
//! unwrapping continuations, interop with foreign thenables, the `all` and
//! `one` combinators, and a species hook that lets derived promise types
//! decorate construction and chaining without duplicating the core.
//!
//! # Quick Start
//!
//! ```
//! use quickpromise::{Constructor, EventLoop, Function, Value};
//! use std::rc::Rc;
//!
//! let event_loop = Rc::new(EventLoop::new());
//! let promise = Constructor::new(event_loop.clone());
//!
//! let nested = promise.resolved(Value::Promise(promise.resolved(Value::from(5))));
//! let doubled = nested.then(
//!     Some(Function::new("double", |args| {
//!         let n = args[0].as_number().unwrap_or(0.0);
//!         Ok(Value::from(n * 2.0))
//!     })),
//!     None,
//! );
//!
//! event_loop.run_until_idle();
//! assert_eq!(doubled.result(), Some(Value::from(10)));
//! ```
//!
//! # Module Overview
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`event_loop`] | [`Scheduler`] trait and the FIFO [`EventLoop`] |
//! | [`promise`] | [`Promise`], [`Deferred`], [`Constructor`], [`Species`], combinators |
//! | [`runtime`] | [`Value`], [`Object`], [`Function`] |

pub mod event_loop;
pub mod prelude;
pub mod promise;
pub mod runtime;

mod error;

pub use error::{ConfigError, Error, Result};
pub use event_loop::{EventLoop, EventLoopConfig, EventLoopStats, RunResult, Scheduler};
pub use promise::{BaseSpecies, Constructor, Deferred, Handler, Promise, PromiseState, Species};
pub use runtime::{Function, Object, Value};

/// quickpromise version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
