//! Order-preserving async map with a concurrency ceiling
//!
//! Workers share one cursor over the inputs and each claims the next unclaimed
//! item as soon as it finishes the previous one. The first failure is returned
//! straight away; mappers that are already running are left to finish in the
//! background and their results are discarded.

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Cursor<I> = Arc<Mutex<std::iter::Enumerate<std::vec::IntoIter<I>>>>;

/// Runs a mapper over a batch of inputs with at most `max_concurrency` in flight
#[derive(Debug, Clone, Copy)]
pub struct BoundedConcurrencyRunner {
    max_concurrency: usize,
}

impl BoundedConcurrencyRunner {
    /// A ceiling of zero is treated as one
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Map every input, returning outputs in input order.
    ///
    /// A panicking mapper is re-raised on the caller.
    pub async fn run<I, T, F, Fut>(&self, inputs: Vec<I>, mapper: F) -> Result<Vec<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let total = inputs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let cursor: Cursor<I> = Arc::new(Mutex::new(inputs.into_iter().enumerate()));
        let rejected = Arc::new(AtomicBool::new(false));
        let mapper = Arc::new(mapper);
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Result<T>)>();

        let workers: Vec<JoinHandle<()>> = (0..self.max_concurrency.min(total))
            .map(|_| {
                let cursor = Arc::clone(&cursor);
                let rejected = Arc::clone(&rejected);
                let mapper = Arc::clone(&mapper);
                let tx = tx.clone();
                tokio::spawn(async move {
                    loop {
                        if rejected.load(Ordering::Acquire) {
                            break;
                        }
                        // Lock only for the claim, never across the mapper
                        let next = cursor.lock().next();
                        let Some((index, input)) = next else {
                            break;
                        };
                        let result = mapper(input).await;
                        if result.is_err() {
                            rejected.store(true, Ordering::Release);
                        }
                        if tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(tx);

        let mut outputs: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut received = 0;
        while let Some((index, result)) = rx.recv().await {
            match result {
                Ok(value) => {
                    outputs[index] = Some(value);
                    received += 1;
                    if received == total {
                        break;
                    }
                }
                Err(e) => {
                    rejected.store(true, Ordering::Release);
                    return Err(e);
                }
            }
        }

        if received < total {
            for worker in workers {
                if let Err(join_error) = worker.await
                    && join_error.is_panic()
                {
                    std::panic::resume_unwind(join_error.into_panic());
                }
            }
            return Err(anyhow!("workers stopped after {received} of {total} inputs"));
        }

        outputs
            .into_iter()
            .map(|value| value.ok_or_else(|| anyhow!("missing output")))
            .collect()
    }
}

/// Shorthand for [`BoundedConcurrencyRunner::run`]
pub async fn throttled_map<I, T, F, Fut>(inputs: Vec<I>, max_concurrency: usize, mapper: F) -> Result<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    BoundedConcurrencyRunner::new(max_concurrency)
        .run(inputs, mapper)
        .await
}
