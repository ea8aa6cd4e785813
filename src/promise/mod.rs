//! Promise Implementation
//!
//! A promise is a container for a value that becomes available later. This
//! module owns the state machine: a promise starts `Pending`, is settled
//! exactly once, and hands its settled value to every registered reaction as
//! a separately scheduled job.
//!
//! Two continuation primitives are provided:
//!
//! - [`Promise::chain`] delivers the raw settled value and raw-fulfills the
//!   derived promise with whatever the handler returns.
//! - [`Promise::then`] unwraps nested promises and thenables on both sides of
//!   the handler via the resolution procedure in [`resolution`].

mod combinators;
mod deferred;
pub(crate) mod resolution;
mod species;

pub use deferred::Deferred;
pub use species::{BaseSpecies, Constructor, Species};

use crate::error::Error;
use crate::runtime::{next_object_id, Function, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Promise state
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PromiseState {
    /// Promise is pending - not yet settled
    Pending,
    /// Promise is fulfilled with a value
    Fulfilled,
    /// Promise is rejected with a reason
    Rejected,
}

/// A reaction handler registered through the chain primitive
#[derive(Clone)]
pub enum Handler {
    /// User callback. Its return value raw-fulfills the derived promise and an
    /// error it raises rejects it.
    Callback(Function),
    /// Core continuation that settles the derived promise itself.
    Continuation(Rc<dyn Fn(Value, &Deferred)>),
}

impl Handler {
    pub fn continuation(f: impl Fn(Value, &Deferred) + 'static) -> Self {
        Handler::Continuation(Rc::new(f))
    }
}

impl From<Function> for Handler {
    fn from(func: Function) -> Self {
        Handler::Callback(func)
    }
}

/// A reaction waiting for a promise to settle
#[derive(Clone)]
pub struct PromiseReaction {
    pub on_fulfilled: Option<Handler>,
    pub on_rejected: Option<Handler>,
    /// Capabilities of the promise returned by the `chain` call
    pub derived: Deferred,
}

impl PromiseReaction {
    fn run(self, state: PromiseState, value: Value) {
        let handler = match state {
            PromiseState::Rejected => self.on_rejected,
            _ => self.on_fulfilled,
        };

        match handler {
            None if state == PromiseState::Rejected => self.derived.reject(value),
            None => self.derived.resolve(value),
            Some(Handler::Callback(callback)) => match callback.call(&[value]) {
                Ok(Value::Promise(returned)) if returned.ptr_eq(self.derived.promise()) => {
                    tracing::debug!(promise = returned.id(), "handler returned its own derived promise");
                    self.derived.reject(
                        Error::ResolutionCycle {
                            object_id: returned.id(),
                        }
                        .into_reason(),
                    );
                }
                Ok(result) => self.derived.resolve(result),
                Err(err) => self.derived.reject(err.into_reason()),
            },
            Some(Handler::Continuation(continuation)) => continuation(value, &self.derived),
        }
    }
}

/// Internal mutable state of a promise
pub struct PromiseInternal {
    /// Current state of the promise
    pub state: PromiseState,
    /// The settled value (fulfillment value or rejection reason)
    pub result: Option<Value>,
    /// Settled with this very promise. The value is not stored in `result`,
    /// which would keep the cell alive through itself.
    pub settled_with_self: bool,
    /// Reactions waiting for this promise to settle
    pub reactions: Vec<PromiseReaction>,
}

struct PromiseCell {
    id: u64,
    constructor: Constructor,
    internal: RefCell<PromiseInternal>,
}

/// A shared handle to a promise
#[derive(Clone)]
pub struct Promise {
    cell: Rc<PromiseCell>,
}

impl Promise {
    /// Construct a promise by running `executor(resolve, reject)` synchronously.
    ///
    /// Fails with `TypeMismatch` if the executor is not callable. Shorthand for
    /// [`Constructor::construct`].
    pub fn new(constructor: &Constructor, executor: Value) -> crate::Result<Promise> {
        constructor.construct(executor)
    }

    /// Allocate a pending promise with no capabilities attached
    pub(crate) fn pending(constructor: Constructor) -> Promise {
        let promise = Promise {
            cell: Rc::new(PromiseCell {
                id: next_object_id(),
                constructor,
                internal: RefCell::new(PromiseInternal {
                    state: PromiseState::Pending,
                    result: None,
                    settled_with_self: false,
                    reactions: Vec::new(),
                }),
            }),
        };
        tracing::trace!(promise = promise.id(), species = promise.constructor().name(), "promise created");
        promise
    }

    pub fn id(&self) -> u64 {
        self.cell.id
    }

    /// The constructor that produced this promise
    pub fn constructor(&self) -> &Constructor {
        &self.cell.constructor
    }

    pub fn state(&self) -> PromiseState {
        self.cell.internal.borrow().state
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The settled value or reason, if settled
    pub fn result(&self) -> Option<Value> {
        let internal = self.cell.internal.borrow();
        if internal.settled_with_self {
            return Some(Value::Promise(self.clone()));
        }
        internal.result.clone()
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Raw-fulfill. Returns false if the promise was already settled.
    pub(crate) fn fulfill(&self, value: Value) -> bool {
        self.settle(PromiseState::Fulfilled, value)
    }

    /// Raw-reject. Returns false if the promise was already settled.
    pub(crate) fn reject(&self, reason: Value) -> bool {
        self.settle(PromiseState::Rejected, reason)
    }

    fn settle(&self, state: PromiseState, value: Value) -> bool {
        let reactions = {
            let mut internal = self.cell.internal.borrow_mut();
            if internal.state != PromiseState::Pending {
                return false;
            }
            internal.state = state;
            match &value {
                Value::Promise(own) if own.ptr_eq(self) => internal.settled_with_self = true,
                _ => internal.result = Some(value.clone()),
            }
            std::mem::take(&mut internal.reactions)
        };

        tracing::trace!(promise = self.id(), ?state, reactions = reactions.len(), "promise settled");
        for reaction in reactions {
            self.schedule_reaction(reaction, state, value.clone());
        }
        true
    }

    fn schedule_reaction(&self, reaction: PromiseReaction, state: PromiseState, value: Value) {
        let promise = self.id();
        self.constructor().scheduler().enqueue(Box::new(move || {
            tracing::trace!(promise, derived = reaction.derived.promise().id(), "running reaction");
            reaction.run(state, value);
        }));
    }

    /// Capability functions that raw-settle this promise
    pub(crate) fn capabilities(&self) -> (Function, Function) {
        let target = self.clone();
        let resolve = Function::new("resolve", move |args| {
            target.fulfill(crate::runtime::first_arg(args));
            Ok(Value::Undefined)
        });
        let target = self.clone();
        let reject = Function::new("reject", move |args| {
            target.reject(crate::runtime::first_arg(args));
            Ok(Value::Undefined)
        });
        (resolve, reject)
    }

    /// Register a reaction; if already settled it is scheduled right away.
    fn add_reaction(&self, reaction: PromiseReaction) {
        let state = {
            let mut internal = self.cell.internal.borrow_mut();
            if internal.state == PromiseState::Pending {
                internal.reactions.push(reaction);
                return;
            }
            internal.state
        };
        let value = self.result().unwrap_or_default();
        self.schedule_reaction(reaction, state, value);
    }

    /// Low-level continuation: handlers receive the raw settled value and the
    /// derived promise is raw-settled with their outcome.
    ///
    /// Dispatches through the species hook of this promise's constructor.
    pub fn chain(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) -> Promise {
        self.chain_with(
            on_fulfilled.map(Handler::Callback),
            on_rejected.map(Handler::Callback),
        )
    }

    /// Like [`Promise::chain`], taking core handlers
    pub fn chain_with(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        let species = self.constructor().species();
        species.chain(self, on_fulfilled, on_rejected)
    }

    /// The chain algorithm itself, for species overrides to delegate to
    pub fn chain_base(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        let derived = self.constructor().deferred_base();
        let promise = derived.promise().clone();
        self.add_reaction(PromiseReaction {
            on_fulfilled,
            on_rejected,
            derived,
        });
        promise
    }

    /// High-level continuation: the settled value is fully unwrapped before
    /// `on_fulfilled` sees it, and the handler's result is unwrapped before it
    /// settles the returned promise.
    pub fn then(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) -> Promise {
        resolution::then(self, on_fulfilled, on_rejected)
    }

    /// Shorthand for `then(None, Some(on_rejected))`
    pub fn catch(&self, on_rejected: Function) -> Promise {
        self.then(None, Some(on_rejected))
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} #{} {:?}]",
            self.constructor().name(),
            self.id(),
            self.state()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::runtime::first_arg;

    fn setup() -> (Rc<EventLoop>, Constructor) {
        let el = Rc::new(EventLoop::new());
        let ctor = Constructor::new(el.clone());
        (el, ctor)
    }

    fn capture(slot: &Rc<RefCell<Option<Value>>>) -> Function {
        let slot = slot.clone();
        Function::new("capture", move |args| {
            *slot.borrow_mut() = Some(first_arg(args));
            Ok(Value::Undefined)
        })
    }

    #[test]
    fn test_promise_lifecycle() {
        let (_el, ctor) = setup();
        let promise = Promise::pending(ctor);
        assert_eq!(promise.state(), PromiseState::Pending);
        assert!(promise.result().is_none());

        assert!(promise.fulfill(Value::from(42)));
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::from(42)));

        assert!(!promise.reject(Value::from(1)));
        assert!(!promise.fulfill(Value::from(2)));
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::from(42)));
    }

    #[test]
    fn test_settling_with_itself_keeps_no_self_reference() {
        let (el, ctor) = setup();
        let promise = Promise::pending(ctor);
        assert!(promise.fulfill(Value::Promise(promise.clone())));

        assert_eq!(Rc::strong_count(&promise.cell), 1);
        assert_eq!(promise.result(), Some(Value::Promise(promise.clone())));

        let seen = Rc::new(RefCell::new(None));
        promise.chain(Some(capture(&seen)), None);
        el.run_until_idle();
        let delivered = seen.borrow_mut().take();
        assert_eq!(delivered, Some(Value::Promise(promise.clone())));
        drop(delivered);
        assert_eq!(Rc::strong_count(&promise.cell), 1);
    }

    #[test]
    fn test_reaction_never_runs_inline() {
        let (el, ctor) = setup();
        let seen = Rc::new(RefCell::new(None));
        let promise = ctor.resolved(Value::from(5));

        promise.chain(Some(capture(&seen)), None);
        assert!(seen.borrow().is_none());
        assert_eq!(el.pending_microtasks(), 1);

        el.run_until_idle();
        assert_eq!(*seen.borrow(), Some(Value::from(5)));
    }

    #[test]
    fn test_reactions_fire_in_registration_order() {
        let (el, ctor) = setup();
        let deferred = ctor.deferred();
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            deferred.promise().chain(
                Some(Function::new("record", move |_| {
                    order.borrow_mut().push(i);
                    Ok(Value::Undefined)
                })),
                None,
            );
        }
        deferred.resolve(Value::Undefined);
        assert_eq!(el.pending_microtasks(), 3);

        el.run_until_idle();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_chain_propagates_without_handler() {
        let (el, ctor) = setup();
        let fulfilled = ctor.resolved(Value::from(5)).chain(None, None);
        let rejected = ctor.rejected(Value::from(6)).chain(None, None);
        el.run_until_idle();

        assert_eq!(fulfilled.state(), PromiseState::Fulfilled);
        assert_eq!(fulfilled.result(), Some(Value::from(5)));
        assert_eq!(rejected.state(), PromiseState::Rejected);
        assert_eq!(rejected.result(), Some(Value::from(6)));
    }

    #[test]
    fn test_chain_handler_error_rejects_derived() {
        let (el, ctor) = setup();
        let derived = ctor
            .resolved(Value::from(5))
            .chain(Some(Function::new("throw", |_| Err(Error::thrown(6)))), None);
        el.run_until_idle();

        assert_eq!(derived.state(), PromiseState::Rejected);
        assert_eq!(derived.result(), Some(Value::from(6)));
    }

    #[test]
    fn test_chain_does_not_unwrap_returned_promise() {
        let (el, ctor) = setup();
        let inner = ctor.resolved(Value::from(1));
        let returned = inner.clone();
        let derived = ctor.resolved(Value::Undefined).chain(
            Some(Function::new("return promise", move |_| {
                Ok(Value::Promise(returned.clone()))
            })),
            None,
        );
        el.run_until_idle();

        assert_eq!(derived.result(), Some(Value::Promise(inner)));
    }

    #[test]
    fn test_catch_handles_rejection() {
        let (el, ctor) = setup();
        let seen = Rc::new(RefCell::new(None));
        let derived = ctor.rejected(Value::from("bad")).catch(capture(&seen));
        el.run_until_idle();

        assert_eq!(*seen.borrow(), Some(Value::from("bad")));
        assert_eq!(derived.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn test_debug_format() {
        let (_el, ctor) = setup();
        let promise = ctor.resolved(Value::Undefined);
        let text = format!("{:?}", promise);
        assert!(text.starts_with("[Promise #"));
        assert!(text.ends_with("Fulfilled]"));
    }
}
