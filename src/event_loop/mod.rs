//! Event Loop Implementation
//!
//! A FIFO microtask queue that promise reactions are enqueued into. Work
//! submitted through [`Scheduler::enqueue`] never runs inside the call that
//! submitted it; it runs when the host drains the loop, in submission order.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

/// A unit of work queued by the promise core
pub type Job = Box<dyn FnOnce()>;

/// Deferred callback facility consumed by the promise core.
///
/// Implementations must run every job later than the `enqueue` call and in
/// the order the jobs were enqueued.
pub trait Scheduler {
    /// Queue a job for later execution
    fn enqueue(&self, job: Job);
}

/// Event loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Maximum microtasks run by a single `run_until_idle` call (starvation protection)
    pub microtask_budget: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            microtask_budget: 10_000,
        }
    }
}

impl EventLoopConfig {
    /// Parse a configuration from JSON text; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Set the microtask budget
    pub fn with_microtask_budget(mut self, limit: usize) -> Self {
        self.microtask_budget = limit;
        self
    }
}

/// Result of draining the event loop via `run_until_idle()`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Number of microtasks that were dequeued and run
    pub microtasks_processed: usize,
    /// Whether draining stopped because the budget ran out
    pub budget_exhausted: bool,
}

/// Runtime statistics for the event loop
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLoopStats {
    /// Total microtasks enqueued
    pub total_enqueued: u64,
    /// Total microtasks run
    pub total_microtasks: u64,
    /// Total number of `run_until_idle` drains
    pub total_drains: u64,
    /// Maximum microtasks run in a single drain
    pub max_microtasks_per_drain: u64,
    /// Deepest the queue has been
    pub max_queue_depth: u64,
    /// Longest drain duration in microseconds (wall-clock)
    pub longest_drain_us: u64,
}

/// The event loop owns the microtask queue and runs it to completion
pub struct EventLoop {
    /// Microtask queue
    microtask_queue: RefCell<VecDeque<Job>>,
    config: EventLoopConfig,
    stats: RefCell<EventLoopStats>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Create a new event loop with default configuration
    pub fn new() -> Self {
        Self::with_config(EventLoopConfig::default())
    }

    /// Create a new event loop
    pub fn with_config(config: EventLoopConfig) -> Self {
        Self {
            microtask_queue: RefCell::new(VecDeque::new()),
            config,
            stats: RefCell::new(EventLoopStats::default()),
        }
    }

    pub fn config(&self) -> &EventLoopConfig {
        &self.config
    }

    /// Check if there are pending microtasks
    pub fn has_pending_microtasks(&self) -> bool {
        !self.microtask_queue.borrow().is_empty()
    }

    /// Number of queued microtasks
    pub fn pending_microtasks(&self) -> usize {
        self.microtask_queue.borrow().len()
    }

    /// Run the oldest queued microtask. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        // The borrow must end before the job runs: jobs enqueue more jobs.
        let job = self.microtask_queue.borrow_mut().pop_front();
        match job {
            Some(job) => {
                job();
                self.stats.borrow_mut().total_microtasks += 1;
                true
            }
            None => false,
        }
    }

    /// Drain microtasks, including ones queued while draining, until the
    /// queue is empty or the budget is spent.
    pub fn run_until_idle(&self) -> RunResult {
        let started = Instant::now();
        let mut result = RunResult::default();

        while self.has_pending_microtasks() {
            if result.microtasks_processed >= self.config.microtask_budget {
                tracing::warn!(
                    budget = self.config.microtask_budget,
                    pending = self.pending_microtasks(),
                    "microtask budget exhausted"
                );
                result.budget_exhausted = true;
                break;
            }
            self.run_next();
            result.microtasks_processed += 1;
        }

        let mut stats = self.stats.borrow_mut();
        stats.total_drains += 1;
        stats.max_microtasks_per_drain = stats
            .max_microtasks_per_drain
            .max(result.microtasks_processed as u64);
        stats.longest_drain_us = stats
            .longest_drain_us
            .max(started.elapsed().as_micros() as u64);
        tracing::trace!(processed = result.microtasks_processed, "event loop idle");
        result
    }

    /// Get a snapshot of the current event loop statistics
    pub fn stats(&self) -> EventLoopStats {
        self.stats.borrow().clone()
    }

    /// Reset all event loop statistics to zero
    pub fn reset_stats(&self) {
        *self.stats.borrow_mut() = EventLoopStats::default();
    }

    /// Drop every queued microtask without running it
    pub fn clear(&self) {
        self.microtask_queue.borrow_mut().clear();
    }
}

impl Scheduler for EventLoop {
    fn enqueue(&self, job: Job) {
        let depth = {
            let mut queue = self.microtask_queue.borrow_mut();
            queue.push_back(job);
            queue.len() as u64
        };
        let mut stats = self.stats.borrow_mut();
        stats.total_enqueued += 1;
        stats.max_queue_depth = stats.max_queue_depth.max(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn push_log(log: &Rc<RefCell<Vec<u32>>>, n: u32) -> Job {
        let log = log.clone();
        Box::new(move || log.borrow_mut().push(n))
    }

    #[test]
    fn test_event_loop_creation() {
        let el = EventLoop::new();
        assert!(!el.has_pending_microtasks());
        assert_eq!(el.config().microtask_budget, 10_000);
    }

    #[test]
    fn test_enqueue_is_deferred_and_fifo() {
        let el = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        el.enqueue(push_log(&log, 1));
        el.enqueue(push_log(&log, 2));
        el.enqueue(push_log(&log, 3));
        assert!(log.borrow().is_empty());
        assert_eq!(el.pending_microtasks(), 3);

        let result = el.run_until_idle();
        assert_eq!(result.microtasks_processed, 3);
        assert!(!result.budget_exhausted);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_jobs_enqueued_while_draining_run_after_existing_ones() {
        let el = Rc::new(EventLoop::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_el = el.clone();
        let inner_log = log.clone();
        el.enqueue(Box::new(move || {
            inner_log.borrow_mut().push(1);
            inner_el.enqueue(push_log(&inner_log, 3));
        }));
        el.enqueue(push_log(&log, 2));

        el.run_until_idle();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_microtask_budget() {
        let el = Rc::new(EventLoop::with_config(
            EventLoopConfig::default().with_microtask_budget(5),
        ));

        fn requeue(el: Rc<EventLoop>) {
            let next = el.clone();
            el.enqueue(Box::new(move || requeue(next)));
        }
        requeue(el.clone());

        let result = el.run_until_idle();
        assert_eq!(result.microtasks_processed, 5);
        assert!(result.budget_exhausted);
        assert!(el.has_pending_microtasks());
        el.clear();
        assert!(!el.has_pending_microtasks());
    }

    #[test]
    fn test_stats() {
        let el = EventLoop::new();
        el.enqueue(Box::new(|| {}));
        el.enqueue(Box::new(|| {}));
        el.run_until_idle();

        let stats = el.stats();
        assert_eq!(stats.total_enqueued, 2);
        assert_eq!(stats.total_microtasks, 2);
        assert_eq!(stats.total_drains, 1);
        assert_eq!(stats.max_queue_depth, 2);

        el.reset_stats();
        assert_eq!(el.stats().total_enqueued, 0);
    }

    #[test]
    fn test_config_from_json() {
        let config = EventLoopConfig::from_json(r#"{"microtask_budget": 64}"#).unwrap();
        assert_eq!(config.microtask_budget, 64);

        let config = EventLoopConfig::from_json("{}").unwrap();
        assert_eq!(config, EventLoopConfig::default());

        assert!(EventLoopConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_config_load_missing_file() {
        let err = EventLoopConfig::load(Path::new("/nonexistent/quickpromise.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
