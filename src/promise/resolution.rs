//! The resolution procedure
//!
//! Given a value headed for a promise, follow it while it is a thenable and
//! deliver the first inert value (or the first rejection reason) instead.
//! Promises are followed through the chain primitive of their own species,
//! foreign thenables through their `then` member.
//!
//! Every promise and thenable followed while unwrapping one value is recorded
//! in a visited set. Reaching one of them again would never terminate, so the
//! procedure rejects with `ResolutionCycleError` instead.

use super::{Deferred, Handler, Promise};
use crate::error::Error;
use crate::event_loop::Scheduler;
use crate::runtime::{first_arg, Function, Object, Value};
use rustc_hash::FxHashSet;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A value that exposes a callable `then`
pub enum Thenable {
    /// A promise of any species
    Native(Promise),
    /// Any other object whose `then` property is a function
    Foreign { object: Object, then: Function },
}

impl Thenable {
    /// Capability check: does `value` expose an invocable `then`?
    pub fn probe(value: &Value) -> Option<Thenable> {
        match value {
            Value::Promise(promise) => Some(Thenable::Native(promise.clone())),
            Value::Object(object) => match object.get_property("then") {
                Some(Value::Function(then)) => Some(Thenable::Foreign {
                    object: object.clone(),
                    then,
                }),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Thenable::Native(promise) => promise.id(),
            Thenable::Foreign { object, .. } => object.id(),
        }
    }
}

/// Check if a value would be followed by the resolution procedure
pub fn is_thenable(value: &Value) -> bool {
    Thenable::probe(value).is_some()
}

type Visited = Rc<RefCell<FxHashSet<u64>>>;

fn visited_from(seed: u64) -> Visited {
    let mut set = FxHashSet::default();
    set.insert(seed);
    Rc::new(RefCell::new(set))
}

/// Where an unwrapped outcome goes. Each side is invoked at most once per
/// resolution.
#[derive(Clone)]
struct Sink {
    fulfill: Rc<dyn Fn(Value)>,
    reject: Rc<dyn Fn(Value)>,
}

impl Sink {
    fn new(fulfill: impl Fn(Value) + 'static, reject: impl Fn(Value) + 'static) -> Self {
        Self {
            fulfill: Rc::new(fulfill),
            reject: Rc::new(reject),
        }
    }
}

/// Follow `value` until it is inert, then hand it to `sink`.
///
/// Every step runs as its own job: native promises are followed through their
/// chain hook and a foreign thenable's `then` is invoked from a job queued on
/// `scheduler`, so the native stack stays flat however long the chain is.
///
/// The visited set is per resolution and keyed by object identity, so any
/// revisit is treated as a cycle. A stateful foreign thenable that resolves
/// through the same object twice before terminating is rejected with
/// `ResolutionCycleError` even though it would eventually settle.
fn adopt(value: Value, visited: &Visited, scheduler: &Rc<dyn Scheduler>, sink: Sink) {
    let Some(thenable) = Thenable::probe(&value) else {
        (sink.fulfill)(value);
        return;
    };

    let object_id = thenable.id();
    if !visited.borrow_mut().insert(object_id) {
        tracing::debug!(object_id, "resolution cycle detected");
        (sink.reject)(Error::ResolutionCycle { object_id }.into_reason());
        return;
    }

    // One-shot: whichever of next/fail fires first wins.
    let fired = Rc::new(Cell::new(false));
    let next = {
        let (fired, visited, scheduler, sink) =
            (fired.clone(), visited.clone(), scheduler.clone(), sink.clone());
        Function::new("next", move |args| {
            if !fired.replace(true) {
                adopt(first_arg(args), &visited, &scheduler, sink.clone());
            }
            Ok(Value::Undefined)
        })
    };
    let fail = {
        let (fired, sink) = (fired.clone(), sink.clone());
        Function::new("fail", move |args| {
            if !fired.replace(true) {
                (sink.reject)(first_arg(args));
            }
            Ok(Value::Undefined)
        })
    };

    match thenable {
        Thenable::Native(promise) => {
            tracing::trace!(promise = promise.id(), "following promise");
            promise.chain(Some(next), Some(fail));
        }
        Thenable::Foreign { object, then } => {
            scheduler.enqueue(Box::new(move || {
                tracing::trace!(object = object.id(), "following foreign thenable");
                let outcome = then.call(&[Value::Function(next), Value::Function(fail)]);
                if let Err(err) = outcome {
                    if !fired.replace(true) {
                        (sink.reject)(err.into_reason());
                    }
                }
            }));
        }
    }
}

/// Settle `derived` with the fully unwrapped form of `value`
pub(crate) fn resolve_derived(derived: &Deferred, value: Value) {
    let visited = visited_from(derived.promise().id());
    let scheduler = derived.promise().constructor().scheduler().clone();
    let (on_value, on_reason) = (derived.clone(), derived.clone());
    adopt(
        value,
        &visited,
        &scheduler,
        Sink::new(
            move |value| on_value.resolve(value),
            move |reason| on_reason.reject(reason),
        ),
    );
}

/// Run a user handler (if any) and settle `derived` through the procedure
fn react(handler: Option<Function>, derived: Deferred, rejected: bool) -> impl Fn(Value) {
    move |value| match &handler {
        None if rejected => derived.reject(value),
        None => derived.resolve(value),
        Some(handler) => match handler.call(&[value]) {
            Ok(result) => resolve_derived(&derived, result),
            Err(err) => derived.reject(err.into_reason()),
        },
    }
}

/// The unwrapping continuation, built on the receiver's chain hook
pub(crate) fn then(
    promise: &Promise,
    on_fulfilled: Option<Function>,
    on_rejected: Option<Function>,
) -> Promise {
    let receiver = promise.id();
    let scheduler = promise.constructor().scheduler().clone();
    let fulfilled = {
        let on_rejected = on_rejected.clone();
        Handler::continuation(move |value, derived| {
            let sink = Sink::new(
                react(on_fulfilled.clone(), derived.clone(), false),
                react(on_rejected.clone(), derived.clone(), true),
            );
            adopt(value, &visited_from(receiver), &scheduler, sink);
        })
    };
    let rejected = Handler::continuation(move |reason, derived| {
        react(on_rejected.clone(), derived.clone(), true)(reason)
    });
    promise.chain_with(Some(fulfilled), Some(rejected))
}
