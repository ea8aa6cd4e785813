//! Constructors and the species hook
//!
//! Every place the core manufactures a promise goes through the
//! [`Constructor`] of the receiver (or of the invoked constructor), and every
//! chain the core registers goes through that constructor's [`Species`]. A
//! derived promise type is a `Species` implementation that decorates the
//! hooks it cares about and delegates to the `*_base` algorithms.

use super::{Deferred, Handler, Promise};
use crate::error::{Error, Result};
use crate::event_loop::Scheduler;
use crate::runtime::{first_arg, Function, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Overridable construction and chaining behaviour of a promise type
pub trait Species {
    /// Name of the promise type, for diagnostics
    fn name(&self) -> &str {
        "Promise"
    }

    /// Create a new instance and run `executor(resolve, reject)` against it
    fn construct(&self, constructor: &Constructor, executor: Function) -> Promise {
        constructor.construct_base(executor)
    }

    /// Create a `{promise, resolve, reject}` triple
    fn deferred(&self, constructor: &Constructor) -> Deferred {
        constructor.deferred_base()
    }

    /// Register a reaction against `promise`
    fn chain(
        &self,
        promise: &Promise,
        on_fulfilled: Option<Handler>,
        on_rejected: Option<Handler>,
    ) -> Promise {
        promise.chain_base(on_fulfilled, on_rejected)
    }
}

/// The plain promise type
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseSpecies;

impl Species for BaseSpecies {}

struct ConstructorInner {
    species: Rc<dyn Species>,
    scheduler: Rc<dyn Scheduler>,
}

/// A promise type bound to the scheduler its reactions run on
#[derive(Clone)]
pub struct Constructor {
    inner: Rc<ConstructorInner>,
}

impl Constructor {
    /// The plain promise type
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_species(scheduler, BaseSpecies)
    }

    /// A derived promise type
    pub fn with_species(scheduler: Rc<dyn Scheduler>, species: impl Species + 'static) -> Self {
        Self {
            inner: Rc::new(ConstructorInner {
                species: Rc::new(species),
                scheduler,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.species.name()
    }

    pub fn species(&self) -> Rc<dyn Species> {
        self.inner.species.clone()
    }

    pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.inner.scheduler
    }

    pub fn ptr_eq(&self, other: &Constructor) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// `new Promise(executor)`.
    ///
    /// The executor runs synchronously. If it raises while the promise is still
    /// pending, the promise is rejected with the raised value.
    pub fn construct(&self, executor: Value) -> Result<Promise> {
        let executor = match executor {
            Value::Function(executor) => executor,
            other => {
                return Err(Error::type_mismatch(format!(
                    "{} resolver {} is not a function",
                    self.name(),
                    other
                )))
            }
        };
        Ok(self.species().construct(self, executor))
    }

    /// The construction algorithm itself, for species overrides to delegate to
    pub fn construct_base(&self, executor: Function) -> Promise {
        let promise = Promise::pending(self.clone());
        let (resolve, reject) = promise.capabilities();

        if let Err(err) = executor.call(&[Value::Function(resolve), Value::Function(reject)]) {
            let reason = err.into_reason();
            if !promise.reject(reason) {
                tracing::debug!(promise = promise.id(), "executor error after settlement discarded");
            }
        }
        promise
    }

    /// `Promise.deferred()`, routed through the species hook
    pub fn deferred(&self) -> Deferred {
        self.species().deferred(self)
    }

    /// Construct through the species hook and capture the capabilities the
    /// executor is handed.
    pub fn deferred_base(&self) -> Deferred {
        let slot: Rc<RefCell<Option<(Value, Value)>>> = Rc::new(RefCell::new(None));
        let capture = slot.clone();
        let executor = Function::new("deferred executor", move |args| {
            let resolve = first_arg(args);
            let reject = args.get(1).cloned().unwrap_or_default();
            *capture.borrow_mut() = Some((resolve, reject));
            Ok(Value::Undefined)
        });

        let promise = self.species().construct(self, executor);
        let captured = slot.borrow_mut().take();
        let (resolve, reject) = match captured {
            Some((Value::Function(resolve), Value::Function(reject))) => (resolve, reject),
            _ => {
                tracing::debug!(
                    promise = promise.id(),
                    species = self.name(),
                    "executor capabilities unavailable, settling directly"
                );
                promise.capabilities()
            }
        };
        Deferred::new(promise, resolve, reject)
    }

    /// `Promise.resolved(value)`: a new instance raw-fulfilled with `value`
    pub fn resolved(&self, value: Value) -> Promise {
        let executor = Function::new("resolved executor", move |args| {
            match args.first() {
                Some(Value::Function(resolve)) => resolve.call(&[value.clone()]),
                _ => Err(Error::type_mismatch("resolve capability is not a function")),
            }
        });
        self.species().construct(self, executor)
    }

    /// `Promise.rejected(reason)`: a new instance raw-rejected with `reason`
    pub fn rejected(&self, reason: Value) -> Promise {
        let executor = Function::new("rejected executor", move |args| {
            match args.get(1) {
                Some(Value::Function(reject)) => reject.call(&[reason.clone()]),
                _ => Err(Error::type_mismatch("reject capability is not a function")),
            }
        });
        self.species().construct(self, executor)
    }

    /// A promise is returned unchanged; anything else becomes `resolved(value)`
    pub fn cast(&self, value: Value) -> Promise {
        match value {
            Value::Promise(promise) => promise,
            other => self.resolved(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::promise::PromiseState;

    struct Named;

    impl Species for Named {
        fn name(&self) -> &str {
            "Named"
        }
    }

    fn event_loop() -> Rc<EventLoop> {
        Rc::new(EventLoop::new())
    }

    #[test]
    fn test_construct_rejects_non_callable_executor() {
        let ctor = Constructor::new(event_loop());
        let err = ctor.construct(Value::from(5)).unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn test_executor_error_rejects_pending_promise() {
        let ctor = Constructor::new(event_loop());
        let promise = ctor
            .construct(Value::Function(Function::new("throw", |_| Err(Error::thrown(5)))))
            .unwrap();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::from(5)));
    }

    #[test]
    fn test_executor_error_after_settlement_is_discarded() {
        let ctor = Constructor::new(event_loop());
        let executor = Function::new("resolve then throw", |args| {
            if let Some(Value::Function(resolve)) = args.first() {
                resolve.call(&[Value::from(1)])?;
            }
            Err(Error::thrown(2))
        });
        let promise = ctor.construct(Value::Function(executor)).unwrap();
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::from(1)));
    }

    #[test]
    fn test_resolved_and_rejected_are_raw() {
        let ctor = Constructor::new(event_loop());
        let inner = ctor.resolved(Value::from(5));

        let outer = ctor.resolved(Value::Promise(inner.clone()));
        assert_eq!(outer.state(), PromiseState::Fulfilled);
        assert_eq!(outer.result(), Some(Value::Promise(inner.clone())));

        let rejected = ctor.rejected(Value::Promise(inner.clone()));
        assert_eq!(rejected.state(), PromiseState::Rejected);
        assert_eq!(rejected.result(), Some(Value::Promise(inner)));
    }

    #[test]
    fn test_instances_carry_their_constructor() {
        let el = event_loop();
        let base = Constructor::new(el.clone());
        let named = Constructor::with_species(el, Named);

        let promise = named.resolved(Value::Undefined);
        assert!(promise.constructor().ptr_eq(&named));
        assert!(!promise.constructor().ptr_eq(&base));
        assert_eq!(promise.constructor().name(), "Named");

        let derived = promise.chain(None, None);
        assert!(derived.constructor().ptr_eq(&named));
        assert!(named.deferred().promise().constructor().ptr_eq(&named));
    }

    #[test]
    fn test_cast() {
        let ctor = Constructor::new(event_loop());
        let promise = ctor.resolved(Value::from(1));
        assert!(ctor.cast(Value::Promise(promise.clone())).ptr_eq(&promise));

        let wrapped = ctor.cast(Value::from(2));
        assert_eq!(wrapped.result(), Some(Value::from(2)));
    }
}
