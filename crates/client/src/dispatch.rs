//! Worker pool and home-queue delivery for dispatched calls.
//!
//! Dispatched calls run as tokio tasks, at most `max_in_flight` at a time.
//! Their results do not reach callbacks from the worker: each one is posted
//! to a single-consumer `HomeQueue`, and callbacks run wherever the owner of
//! that queue drains it.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use stashline_core::AppConfig;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};

type Delivery = Box<dyn FnOnce() + Send>;

/// Dispatcher sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound on dispatched calls running at once (default: 8)
    pub max_in_flight: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DispatchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { max_in_flight: config.max_in_flight.max(1) }
    }
}

/// Submits work to the runtime and posts results to the home queue.
#[derive(Clone)]
pub struct Dispatcher {
    handle: Handle,
    permits: Arc<Semaphore>,
    home: mpsc::UnboundedSender<Delivery>,
}

impl Dispatcher {
    /// Create a dispatcher on `handle` together with its home queue.
    pub fn new(handle: Handle, config: DispatchConfig) -> (Self, HomeQueue) {
        let (home, deliveries) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        (Self { handle, permits, home }, HomeQueue { deliveries })
    }

    /// Run `task` on a worker once a slot is free.
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::error!("dispatcher semaphore closed; dropping task");
                return;
            };
            task.await;
        });
    }

    /// Queue `callback(result)` for delivery on the home queue.
    ///
    /// If the home queue is gone the result is dropped and logged.
    pub fn post_result<R, F>(&self, callback: F, result: R)
    where
        R: Send + 'static,
        F: FnOnce(R) + Send + 'static,
    {
        let delivery: Delivery = Box::new(move || callback(result));
        if self.home.send(delivery).is_err() {
            tracing::error!("home queue closed; dropping call result");
        }
    }

    /// Free worker slots right now.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("available_slots", &self.available_slots()).finish_non_exhaustive()
    }
}

/// Single-consumer queue that runs callbacks for dispatched calls.
#[derive(Debug)]
pub struct HomeQueue {
    deliveries: mpsc::UnboundedReceiver<Delivery>,
}

impl HomeQueue {
    /// Wait for the next result and run its callback.
    ///
    /// Returns `false` once every `Dispatcher` handle is dropped and the
    /// queue is empty.
    pub async fn next_delivery(&mut self) -> bool {
        match self.deliveries.recv().await {
            Some(delivery) => {
                deliver(delivery);
                true
            }
            None => false,
        }
    }

    /// Run callbacks for every result already queued. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(delivery) = self.deliveries.try_recv() {
            deliver(delivery);
            ran += 1;
        }
        ran
    }

    /// Deliver results until every `Dispatcher` handle is dropped.
    pub async fn run(mut self) {
        while self.next_delivery().await {}
    }
}

fn deliver(delivery: Delivery) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(delivery)) {
        tracing::error!(panic = panic_message(panic.as_ref()), "call callback panicked");
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
