//! Mock implementations for testing.

use async_trait::async_trait;
use engine_core::{IngestTask, Result, TaskId};
use parking_lot::Mutex;
use std::sync::Arc;
use task_queue::TaskProducer;

/// Mock producer that captures tasks in memory.
///
/// Implements the same `TaskProducer` trait as the real queues, so the
/// ingestion route runs unchanged while tests inspect what it dispatched.
#[derive(Clone)]
pub struct MockProducer {
    tasks: Arc<Mutex<Vec<IngestTask>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockProducer {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Get all captured tasks.
    pub fn captured_tasks(&self) -> Vec<IngestTask> {
        self.tasks.lock().clone()
    }

    /// Total events across captured tasks.
    pub fn event_count(&self) -> usize {
        self.tasks.lock().iter().map(IngestTask::len).sum()
    }

    pub fn clear(&self) {
        self.tasks.lock().clear();
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

impl Default for MockProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskProducer for MockProducer {
    async fn enqueue(&self, task: IngestTask) -> Result<TaskId> {
        if *self.should_fail.lock() {
            return Err(engine_core::Error::queue("mock producer failure"));
        }

        let task_id = task.task_id;
        self.tasks.lock().push(task);
        Ok(task_id)
    }

    async fn is_healthy(&self) -> bool {
        !*self.should_fail.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_producer_captures_tasks() {
        let producer = MockProducer::new();
        producer.enqueue(IngestTask::new(Vec::new())).await.unwrap();
        assert_eq!(producer.captured_tasks().len(), 1);

        producer.set_should_fail(true);
        assert!(producer.enqueue(IngestTask::new(Vec::new())).await.is_err());
        assert!(!producer.is_healthy().await);
    }
}
