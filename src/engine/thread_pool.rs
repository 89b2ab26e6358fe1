//! Fixed-size worker pool with a FIFO task queue

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::debug;

use crate::error::{InferenceErrorKind, InferirError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    queue: Mutex<PoolQueue>,
    condvar: Condvar,
}

struct PoolQueue {
    tasks: VecDeque<Job>,
    stop: bool,
}

/// Receives the result of a task submitted to a [`ThreadPool`]
///
/// The Rust rendition of a future: `wait` blocks until the worker finishes
/// the task and sends its result back over a one-shot channel.
pub struct TaskHandle<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task completes and return its result
    ///
    /// # Errors
    ///
    /// Returns `Inference(InternalError)` if the executing worker panicked
    /// before delivering a result.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| {
            InferirError::inference(
                InferenceErrorKind::InternalError,
                "task was dropped before completion",
            )
        })
    }
}

/// Fixed-size thread pool with cooperative FIFO dispatch
///
/// Workers share one queue guarded by a mutex and a condition variable.
/// Dropping the pool sets the stop flag, wakes every worker, and joins
/// them; queued tasks are drained before the workers exit.
pub struct ThreadPool {
    state: Arc<PoolState>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Create a pool with `num_threads` workers
    ///
    /// Zero selects the reported hardware concurrency (minimum 1).
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        let num_threads = if num_threads == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            num_threads
        };

        let state = Arc::new(PoolState {
            queue: Mutex::new(PoolQueue {
                tasks: VecDeque::new(),
                stop: false,
            }),
            condvar: Condvar::new(),
        });

        let workers = (0..num_threads)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || worker_loop(&state))
            })
            .collect();

        debug!("thread pool started with {num_threads} workers");
        Self { state, workers }
    }

    /// Number of worker threads
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a task; returns a handle for its result
    ///
    /// # Errors
    ///
    /// Returns `Inference(InternalError)` if the pool has been stopped.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        {
            let mut queue = self.state.queue.lock().expect("pool mutex poisoned");
            if queue.stop {
                return Err(InferirError::inference(
                    InferenceErrorKind::InternalError,
                    "submit on stopped thread pool",
                ));
            }
            queue.tasks.push_back(Box::new(move || {
                // A send failure means the caller dropped the handle; the
                // result is simply discarded.
                let _ = sender.send(task());
            }));
        }
        self.state.condvar.notify_one();
        Ok(TaskHandle { receiver })
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut queue = self.state.queue.lock().expect("pool mutex poisoned");
            queue.stop = true;
        }
        self.state.condvar.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(state: &PoolState) {
    loop {
        let job = {
            let mut queue = state.queue.lock().expect("pool mutex poisoned");
            loop {
                if let Some(job) = queue.tasks.pop_front() {
                    break job;
                }
                if queue.stop {
                    return;
                }
                queue = state
                    .condvar
                    .wait(queue)
                    .expect("pool mutex poisoned");
            }
        };
        job();
    }
}
