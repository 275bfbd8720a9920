//! # Task Management System
//!
//! This module provides fixed-size pools of background worker threads that pull
//! [`Task`]s from a shared queue.
//!
//! ## Architecture Overview
//! - [`WorkerPool`]: Owns the worker threads and the sending side of the queue
//! - [`Task`]: A unit of work that publishes its own outcome
//!
//! ## Worker Loop
//! Each worker blocks on the queue with a short timeout ([`POLL_INTERVAL`]) so it
//! notices a shutdown promptly. Every task runs under `catch_unwind`: a failing
//! task is logged and the worker moves on to the next one.
//!
//! ## Shutdown
//! [`WorkerPool::shutdown`] clears the running flag, waits until a deadline for
//! workers to report that they exited, joins those, and detaches the rest with a
//! warning. A worker stuck inside a task is never forcibly killed.

pub mod task;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use web_time::{Duration, Instant};

pub use task::{BoxedTask, Task};

/// How long an idle worker waits for a task before re-checking the running flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A named pool of worker threads sharing one unbounded task queue.
pub struct WorkerPool {
    name: String,
    sender: Sender<BoxedTask>,
    receiver: Receiver<BoxedTask>,
    running: Arc<AtomicBool>,
    workers: Vec<Option<JoinHandle<()>>>,
    finished: Receiver<usize>,
}

impl WorkerPool {
    /// Spawns `num_workers` threads named `{name}-{index}`.
    ///
    /// # Errors
    /// Returns the I/O error of the first thread that could not be spawned; any
    /// workers already started are stopped before returning.
    pub fn new(name: &str, num_workers: usize) -> io::Result<Self> {
        let (sender, receiver) = unbounded::<BoxedTask>();
        let (finished_sender, finished) = unbounded::<usize>();
        let running = Arc::new(AtomicBool::new(true));

        let mut pool = WorkerPool {
            name: name.to_string(),
            sender,
            receiver: receiver.clone(),
            running: running.clone(),
            workers: Vec::with_capacity(num_workers),
            finished,
        };

        for index in 0..num_workers {
            let receiver = receiver.clone();
            let running = running.clone();
            let finished_sender = finished_sender.clone();
            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    worker_loop(&receiver, &running);
                    let _ = finished_sender.send(index);
                });

            match spawned {
                Ok(handle) => pool.workers.push(Some(handle)),
                Err(e) => {
                    pool.shutdown(Duration::from_secs(1));
                    return Err(e);
                }
            }
        }

        info!("Started {} worker pool with {} threads", name, num_workers);
        Ok(pool)
    }

    /// A handle for submitting tasks from other threads.
    pub fn sender(&self) -> Sender<BoxedTask> {
        self.sender.clone()
    }

    /// Queues a task.
    ///
    /// # Returns
    /// `false` if the pool has been shut down and the task was dropped.
    pub fn submit(&self, task: BoxedTask) -> bool {
        self.is_running() && self.sender.send(task).is_ok()
    }

    /// Number of tasks waiting for a worker.
    pub fn queued_len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether the pool still accepts tasks.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of worker threads not yet joined or detached.
    pub fn worker_count(&self) -> usize {
        self.workers.iter().filter(|worker| worker.is_some()).count()
    }

    /// Stops the workers, waiting at most `timeout` for them to exit.
    ///
    /// Tasks still queued are dropped without running. Idempotent.
    pub fn shutdown(&mut self, timeout: Duration) {
        self.running.store(false, Ordering::Release);
        if self.worker_count() == 0 {
            self.drain_queue();
            return;
        }

        let deadline = Instant::now() + timeout;
        while self.worker_count() > 0 {
            match self.finished.recv_deadline(deadline) {
                Ok(index) => {
                    if let Some(handle) = self.workers.get_mut(index).and_then(Option::take) {
                        if handle.join().is_err() {
                            error!("{} worker {} terminated abnormally", self.name, index);
                        }
                    }
                }
                Err(_) => break,
            }
        }

        let stuck = self.worker_count();
        if stuck > 0 {
            warn!(
                "Detaching {} {} worker(s) that did not stop within {:?}",
                stuck, self.name, timeout
            );
            self.workers.clear();
        }

        self.drain_queue();
        info!("Stopped {} worker pool", self.name);
    }

    fn drain_queue(&self) {
        let dropped = self.receiver.try_iter().count();
        if dropped > 0 {
            debug!("Dropped {} queued {} task(s)", dropped, self.name);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.worker_count() > 0 {
            self.shutdown(Duration::from_secs(1));
        }
    }
}

fn worker_loop(receiver: &Receiver<BoxedTask>, running: &AtomicBool) {
    while running.load(Ordering::Acquire) {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(task) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                let description = task.description();
                if panic::catch_unwind(AssertUnwindSafe(move || task.process())).is_err() {
                    error!("Task panicked: {}", description);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
