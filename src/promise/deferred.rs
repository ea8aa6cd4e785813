//! Deferred: a promise together with the capabilities that settle it

use super::Promise;
use crate::runtime::{Function, Value};

/// A pending promise plus its `resolve`/`reject` capabilities.
///
/// The first capability invoked wins; later calls to either are no-ops.
/// `resolve` is a raw settlement: the value is stored without being inspected,
/// even if it is itself a promise.
///
/// Resolving a promise with itself keeps no self-reference, so it is freed once
/// unreferenced. Two promises resolved with each other do form an `Rc` cycle
/// and are never freed.
#[derive(Clone)]
pub struct Deferred {
    promise: Promise,
    resolve: Function,
    reject: Function,
}

impl Deferred {
    pub(crate) fn new(promise: Promise, resolve: Function, reject: Function) -> Self {
        Self {
            promise,
            resolve,
            reject,
        }
    }

    pub fn promise(&self) -> &Promise {
        &self.promise
    }

    pub fn into_promise(self) -> Promise {
        self.promise
    }

    pub fn resolve(&self, value: Value) {
        if let Err(err) = self.resolve.call(&[value]) {
            tracing::debug!(promise = self.promise.id(), %err, "resolve capability failed");
        }
    }

    pub fn reject(&self, reason: Value) {
        if let Err(err) = self.reject.call(&[reason]) {
            tracing::debug!(promise = self.promise.id(), %err, "reject capability failed");
        }
    }
}
