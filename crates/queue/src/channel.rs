//! In-process task queue.

use async_trait::async_trait;
use engine_core::{Error, IngestTask, Result, TaskId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use telemetry::metrics;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::consumer::{Delivery, TaskConsumer};
use crate::producer::TaskProducer;

/// Fetched tasks not yet committed, and tasks handed back by a reset.
#[derive(Default)]
struct Inflight {
    /// Fetch order is kept so a reset redelivers oldest first
    pending: Vec<IngestTask>,
    redelivery: VecDeque<IngestTask>,
}

/// Bounded channel shared by the ingestion route and the worker pool.
///
/// Workers take turns on the receiver; each fetch yields at most one task.
/// A fetched task stays pending until committed. `reset` moves every
/// pending task to the redelivery queue, which `fetch` drains before the
/// channel.
pub struct ChannelQueue {
    sender: mpsc::Sender<IngestTask>,
    receiver: Mutex<mpsc::Receiver<IngestTask>>,
    inflight: parking_lot::Mutex<Inflight>,
    poll_timeout: Duration,
    closed: AtomicBool,
}

impl ChannelQueue {
    pub fn new(capacity: usize, poll_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
            inflight: parking_lot::Mutex::new(Inflight::default()),
            poll_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Tasks waiting to be fetched, including ones awaiting redelivery.
    pub fn depth(&self) -> usize {
        let queued = self.sender.max_capacity() - self.sender.capacity();
        queued + self.inflight.lock().redelivery.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record_depth(&self) {
        metrics().queue_depth.set(self.depth() as u64);
    }
}

#[async_trait]
impl TaskProducer for ChannelQueue {
    async fn enqueue(&self, task: IngestTask) -> Result<TaskId> {
        if self.is_closed() {
            metrics().enqueue_errors.inc();
            return Err(Error::QueueClosed);
        }

        let start = Instant::now();
        let task_id = task.task_id;
        self.sender.send(task).await.map_err(|_| {
            metrics().enqueue_errors.inc();
            Error::QueueClosed
        })?;

        metrics().tasks_enqueued.inc();
        metrics()
            .enqueue_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        self.record_depth();
        debug!(task_id = %task_id, depth = self.depth(), "Enqueued task");
        Ok(task_id)
    }

    async fn is_healthy(&self) -> bool {
        !self.is_closed()
    }
}

#[async_trait]
impl TaskConsumer for ChannelQueue {
    async fn fetch(&self) -> Result<Vec<Delivery>> {
        let redelivered = {
            let mut inflight = self.inflight.lock();
            let task = inflight.redelivery.pop_front();
            if let Some(task) = &task {
                inflight.pending.push(task.clone());
            }
            task
        };
        if let Some(task) = redelivered {
            self.record_depth();
            debug!(task_id = %task.task_id, "Redelivering task");
            return Ok(vec![Delivery::new(task)]);
        }

        let mut receiver = self.receiver.lock().await;

        let next = if self.is_closed() {
            receiver.try_recv().ok()
        } else {
            match tokio::time::timeout(self.poll_timeout, receiver.recv()).await {
                Ok(task) => task,
                Err(_) => return Ok(Vec::new()),
            }
        };
        drop(receiver);

        match next {
            Some(task) => {
                self.inflight.lock().pending.push(task.clone());
                self.record_depth();
                Ok(vec![Delivery::new(task)])
            }
            None if self.is_closed() => Err(Error::QueueClosed),
            None => Ok(Vec::new()),
        }
    }

    async fn commit(&self, delivery: &Delivery) -> Result<()> {
        let mut inflight = self.inflight.lock();
        let task_id = delivery.task.task_id;
        if let Some(pos) = inflight.pending.iter().position(|t| t.task_id == task_id) {
            inflight.pending.remove(pos);
        }
        Ok(())
    }

    async fn reset(&self) {
        let requeued = {
            let mut inflight = self.inflight.lock();
            let pending = std::mem::take(&mut inflight.pending);
            let requeued = pending.len();
            for task in pending.into_iter().rev() {
                inflight.redelivery.push_front(task);
            }
            requeued
        };
        if requeued > 0 {
            self.record_depth();
            warn!(tasks = requeued, "Requeued uncommitted tasks");
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
