//! Prelude module for convenient imports
//!
//! ```
//! use quickpromise::prelude::*;
//! use std::rc::Rc;
//!
//! let event_loop = Rc::new(EventLoop::new());
//! let promise = Constructor::new(event_loop.clone());
//! let joined = promise.all(vec![Value::from(1), Value::from(2)]);
//! event_loop.run_until_idle();
//! assert_eq!(joined.state(), PromiseState::Fulfilled);
//! ```

// Values
pub use crate::runtime::{first_arg, Function, Object, Value};

// Promise core
pub use crate::promise::{BaseSpecies, Constructor, Deferred, Handler, Promise, PromiseState, Species};

// Scheduling
pub use crate::event_loop::{EventLoop, EventLoopConfig, Scheduler};

// Error handling
pub use crate::error::{ConfigError, Error, Result};
