//! # Task System Core Trait
//!
//! This module defines the unit of work executed by a [`WorkerPool`](super::WorkerPool).
//!
//! ## Task Lifecycle
//! 1. A `Task` is created and submitted to a pool's queue
//! 2. A worker thread pops it and calls `process()`
//! 3. The task publishes its outcome itself (e.g. into a concurrent map), so
//!    nothing flows back through the pool
//!
//! ## Thread Safety
//! - `Task` must be `Send` to be transferred between threads
//! - All shared state reached from a task must be properly synchronized

/// A trait representing a unit of work that can be executed asynchronously.
///
/// Tasks should own all the data they need, typically a position plus `Arc`s of
/// the shared state they publish into.
pub trait Task: Send {
    /// Short description used when logging a failure of this task.
    fn description(&self) -> String;

    /// Performs the work on a worker thread.
    ///
    /// # Implementation Notes
    /// - Errors must be handled inside the task; there is no caller to return them to
    /// - A panic is caught at the worker boundary and logged, and the worker carries on
    fn process(self: Box<Self>);
}

/// Boxed task as carried by the pool's queue.
pub type BoxedTask = Box<dyn Task>;
