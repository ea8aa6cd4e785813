//! Join and race combinators
//!
//! Both accept arbitrary values. Each item that is not already a promise is
//! cast to one by the invoked constructor, and every item is observed through
//! `then`, so nested promises and thenables are unwrapped.

use super::resolution::is_thenable;
use super::{Constructor, Promise};
use crate::runtime::{first_arg, Function, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

impl Constructor {
    /// `Promise.all(items)`.
    ///
    /// Fulfills with the unwrapped values in input order once every item has
    /// fulfilled; rejects with the reason of the first item to reject.
    pub fn all(&self, items: Vec<Value>) -> Promise {
        let deferred = self.deferred();
        if items.is_empty() {
            deferred.resolve(Value::list(Vec::new()));
            return deferred.into_promise();
        }

        let remaining = Rc::new(Cell::new(items.len()));
        let results = Rc::new(RefCell::new(vec![Value::Undefined; items.len()]));

        for (index, item) in items.into_iter().enumerate() {
            let on_fulfilled = {
                let (deferred, remaining, results) =
                    (deferred.clone(), remaining.clone(), results.clone());
                Function::new("all element", move |args| {
                    results.borrow_mut()[index] = first_arg(args);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let values = std::mem::take(&mut *results.borrow_mut());
                        deferred.resolve(Value::list(values));
                    }
                    Ok(Value::Undefined)
                })
            };
            let on_rejected = {
                let deferred = deferred.clone();
                Function::new("all reject", move |args| {
                    deferred.reject(first_arg(args));
                    Ok(Value::Undefined)
                })
            };
            self.cast(item).then(Some(on_fulfilled), Some(on_rejected));
        }

        deferred.into_promise()
    }

    /// `Promise.one(items)`.
    ///
    /// Settles like whichever item settles first. Every item is cast and
    /// observed like in [`Constructor::all`]; an item that is not a thenable
    /// additionally settles the result right away, so the first such item wins
    /// over any promise in the collection. An empty collection never settles.
    pub fn one(&self, items: Vec<Value>) -> Promise {
        let deferred = self.deferred();

        for item in items {
            let inert = (!is_thenable(&item)).then(|| item.clone());

            let on_fulfilled = {
                let deferred = deferred.clone();
                Function::new("one resolve", move |args| {
                    deferred.resolve(first_arg(args));
                    Ok(Value::Undefined)
                })
            };
            let on_rejected = {
                let deferred = deferred.clone();
                Function::new("one reject", move |args| {
                    deferred.reject(first_arg(args));
                    Ok(Value::Undefined)
                })
            };
            self.cast(item).then(Some(on_fulfilled), Some(on_rejected));

            if let Some(value) = inert {
                deferred.resolve(value);
            }
        }

        deferred.into_promise()
    }
}
