//! Shared test helpers for integration tests

use quickpromise::{Constructor, EventLoop, Function, Promise, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// A fresh event loop and the plain promise constructor bound to it
pub fn setup() -> (Rc<EventLoop>, Constructor) {
    let event_loop = Rc::new(EventLoop::new());
    let ctor = Constructor::new(event_loop.clone());
    (event_loop, ctor)
}

/// Values handed to recording handlers, in call order
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Rc<RefCell<Vec<(String, Value)>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that records its argument under `label` and returns it
    pub fn handler(&self, label: &str) -> Function {
        let calls = self.calls.clone();
        let label = label.to_string();
        Function::new(label.clone(), move |args| {
            let value = args.first().cloned().unwrap_or_default();
            calls.borrow_mut().push((label.clone(), value.clone()));
            Ok(value)
        })
    }

    /// A handler that must never run; if it does, it is recorded as "unreachable"
    pub fn unreachable(&self) -> Function {
        self.handler("unreachable")
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.borrow().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(l, _)| l.clone()).collect()
    }

    /// The single value recorded under `label`
    pub fn only(&self, label: &str) -> Value {
        let matching: Vec<Value> = self
            .calls
            .borrow()
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(matching.len(), 1, "expected exactly one call to {label}, got {:?}", self.labels());
        matching[0].clone()
    }
}

/// `resolved(resolved(resolved(value)))`, returning (p1, p2, p3)
#[allow(dead_code)]
pub fn nested(ctor: &Constructor, value: Value) -> (Promise, Promise, Promise) {
    let p1 = ctor.resolved(value);
    let p2 = ctor.resolved(Value::Promise(p1.clone()));
    let p3 = ctor.resolved(Value::Promise(p2.clone()));
    (p1, p2, p3)
}

/// An object whose `then` immediately calls `onResolve(value)`
#[allow(dead_code)]
pub fn thenable_resolving_with(value: Value) -> quickpromise::Object {
    quickpromise::Object::thenable(Function::new("then", move |args| match args.first() {
        Some(Value::Function(on_resolve)) => on_resolve.call(&[value.clone()]),
        _ => Ok(Value::Undefined),
    }))
}
