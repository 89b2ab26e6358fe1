//! Dynamic request batcher
//!
//! Coalesces concurrent single-sample predict requests into stacked batch
//! tensors. A single consumer thread owns the model: it drains up to
//! `max_batch_size` requests, waits up to `max_wait_ms` for stragglers,
//! stacks the inputs into one `[N, …input_shape]` tensor, runs one forward,
//! and splits the result back out through per-request channels. FIFO order
//! is preserved within a batch.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceErrorKind, InferirError, Result};
use crate::layers::Sequential;
use crate::tensor::Tensor;

/// Batching configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// Largest batch the consumer will form
    pub max_batch_size: usize,
    /// Longest time a request waits for the batch to fill, in milliseconds
    pub max_wait_ms: u64,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            max_wait_ms: 10,
        }
    }
}

struct Request {
    input: Tensor,
    sender: mpsc::Sender<Result<Tensor>>,
}

struct BatcherState {
    queue: Mutex<BatcherQueue>,
    condvar: Condvar,
}

struct BatcherQueue {
    requests: VecDeque<Request>,
    stop: bool,
}

/// Receives the result of a request submitted to a [`DynamicBatcher`]
pub struct PredictionHandle {
    receiver: mpsc::Receiver<Result<Tensor>>,
}

impl PredictionHandle {
    /// Block until the batcher delivers this request's output
    ///
    /// # Errors
    ///
    /// Returns the forward error if the batch failed, or
    /// `Inference(InternalError)` if the batcher died before responding.
    pub fn wait(self) -> Result<Tensor> {
        self.receiver.recv().map_err(|_| {
            InferirError::inference(
                InferenceErrorKind::InternalError,
                "batcher dropped the request before completion",
            )
        })?
    }
}

/// Coalesces concurrent requests into stacked batches
///
/// Owns the model; only the consumer thread calls into it. Safe to share
/// for submission from many threads. Dropping the batcher stops the
/// consumer, which first drains and processes every pending request — no
/// promise is abandoned.
pub struct DynamicBatcher {
    state: Arc<BatcherState>,
    consumer: Option<JoinHandle<()>>,
}

impl DynamicBatcher {
    /// Start a batcher over `model` for single-sample inputs of
    /// `input_shape`
    ///
    /// All submitted inputs must have exactly `input_shape`; the batcher
    /// stacks them by contiguous copy without re-validating.
    #[must_use]
    pub fn new(model: Sequential, input_shape: Vec<usize>, config: BatcherConfig) -> Self {
        let state = Arc::new(BatcherState {
            queue: Mutex::new(BatcherQueue {
                requests: VecDeque::new(),
                stop: false,
            }),
            condvar: Condvar::new(),
        });

        let consumer_state = Arc::clone(&state);
        let consumer = std::thread::spawn(move || {
            consumer_loop(&consumer_state, model, &input_shape, config);
        });

        Self {
            state,
            consumer: Some(consumer),
        }
    }

    /// Submit one input; returns a handle that resolves to its output
    ///
    /// Submission after stop resolves the handle to an error immediately.
    #[must_use]
    pub fn submit(&self, input: Tensor) -> PredictionHandle {
        let (sender, receiver) = mpsc::channel();
        {
            let mut queue = self.state.queue.lock().expect("batcher mutex poisoned");
            if queue.stop {
                let _ = sender.send(Err(InferirError::inference(
                    InferenceErrorKind::InternalError,
                    "submit on stopped batcher",
                )));
                return PredictionHandle { receiver };
            }
            queue.requests.push_back(Request { input, sender });
        }
        self.state.condvar.notify_one();
        PredictionHandle { receiver }
    }
}

impl Drop for DynamicBatcher {
    fn drop(&mut self) {
        {
            let mut queue = self.state.queue.lock().expect("batcher mutex poisoned");
            queue.stop = true;
        }
        self.state.condvar.notify_one();
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
    }
}

fn consumer_loop(
    state: &BatcherState,
    mut model: Sequential,
    input_shape: &[usize],
    config: BatcherConfig,
) {
    let max_batch = config.max_batch_size.max(1);

    loop {
        let mut batch: Vec<Request> = Vec::new();

        {
            let mut queue = state.queue.lock().expect("batcher mutex poisoned");

            // Wait for at least one request or the stop signal.
            while !queue.stop && queue.requests.is_empty() {
                queue = state
                    .condvar
                    .wait(queue)
                    .expect("batcher mutex poisoned");
            }
            if queue.stop && queue.requests.is_empty() {
                return;
            }

            // Collect up to max_batch, waiting out the deadline for more.
            let deadline = Instant::now() + Duration::from_millis(config.max_wait_ms);
            while batch.len() < max_batch {
                if let Some(request) = queue.requests.pop_front() {
                    batch.push(request);
                } else {
                    let now = Instant::now();
                    if now >= deadline || queue.stop {
                        break;
                    }
                    let (guard, timeout) = state
                        .condvar
                        .wait_timeout(queue, deadline - now)
                        .expect("batcher mutex poisoned");
                    queue = guard;
                    if timeout.timed_out() {
                        // Flush whatever has been collected.
                        while batch.len() < max_batch {
                            match queue.requests.pop_front() {
                                Some(request) => batch.push(request),
                                None => break,
                            }
                        }
                        break;
                    }
                }
            }
        }

        if batch.is_empty() {
            continue;
        }

        debug!("batcher: flushing batch of {}", batch.len());
        process_batch(&mut model, input_shape, batch);
    }
}

fn process_batch(model: &mut Sequential, input_shape: &[usize], batch: Vec<Request>) {
    if batch.len() == 1 {
        // Single request: skip the stacking round-trip.
        let request = batch.into_iter().next().expect("len checked");
        let result = model.forward(&request.input);
        let _ = request.sender.send(result);
        return;
    }

    match forward_stacked(model, input_shape, &batch) {
        Ok(outputs) => {
            for (request, output) in batch.into_iter().zip(outputs) {
                let _ = request.sender.send(Ok(output));
            }
        }
        Err(err) => {
            // Broadcast the failure to every request in the batch.
            for request in batch {
                let _ = request.sender.send(Err(err.clone()));
            }
        }
    }
}

/// Stack inputs into `[N, …input_shape]`, forward once, split along dim 0
fn forward_stacked(
    model: &mut Sequential,
    input_shape: &[usize],
    batch: &[Request],
) -> Result<Vec<Tensor>> {
    let n = batch.len();
    let sample_size: usize = input_shape.iter().product();

    let mut batch_shape = Vec::with_capacity(input_shape.len() + 1);
    batch_shape.push(n);
    batch_shape.extend_from_slice(input_shape);

    let mut stacked = Tensor::new(&batch_shape)?;
    for (i, request) in batch.iter().enumerate() {
        stacked.data_mut()[i * sample_size..(i + 1) * sample_size]
            .copy_from_slice(request.input.data());
    }

    let batched_output = model.forward(&stacked)?;

    let out_sample_size = batched_output.size() / n;
    let single_shape: Vec<usize> = batched_output.shape()[1..].to_vec();

    let mut outputs = Vec::with_capacity(n);
    for i in 0..n {
        let mut single = Tensor::new(&single_shape)?;
        single.data_mut().copy_from_slice(
            &batched_output.data()[i * out_sample_size..(i + 1) * out_sample_size],
        );
        outputs.push(single);
    }
    Ok(outputs)
}
