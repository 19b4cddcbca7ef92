//! A single logical FIFO queue, sharded by agent id so a backed-up agent
//! never blocks dispatch for every other agent. Per-agent order is
//! preserved even across contention re-queues; no ordering is promised
//! across agents.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::models::Task;

#[derive(Clone)]
pub struct TaskQueue {
    shards: Arc<Mutex<HashMap<String, VecDeque<Task>>>>,
    /// Woken on every enqueue so dispatch workers can block instead of
    /// polling when the queue is empty.
    notify: Arc<Notify>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            shards: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    pub async fn enqueue(&self, task: Task) {
        let mut shards = self.shards.lock().await;
        shards.entry(task.agent_id.clone()).or_default().push_back(task);
        drop(shards);
        self.notify.notify_one();
    }

    /// Re-enqueues at the head of the task's agent shard, for contention
    /// or retryable dispatch failures. Does not touch `retry_count`.
    /// Pushing to the head rather than the tail is what keeps a
    /// re-queued task from being dispatched after a task enqueued later
    /// for the same agent — it restores exactly the position it was
    /// dequeued from.
    pub async fn requeue(&self, task: Task) {
        let mut shards = self.shards.lock().await;
        shards.entry(task.agent_id.clone()).or_default().push_front(task);
        drop(shards);
        self.notify.notify_one();
    }

    /// Scans every shard for the first task whose `earliest_dispatch` has
    /// arrived and removes it. Returns `None` if the queue is empty or
    /// every head task is still scheduled for later.
    pub async fn try_dequeue_due(&self, now: chrono::DateTime<chrono::Utc>) -> Option<Task> {
        let mut shards = self.shards.lock().await;
        for shard in shards.values_mut() {
            if let Some(front) = shard.front() {
                if front.is_due(now) {
                    return shard.pop_front();
                }
            }
        }
        None
    }

    /// Blocks until an enqueue happens. Callers should re-check
    /// `try_dequeue_due` afterward — a wakeup is a hint, not a guarantee
    /// that a due task exists.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub async fn total_len(&self) -> usize {
        self.shards.lock().await.values().map(VecDeque::len).sum()
    }

    #[cfg(test)]
    pub async fn clear(&self) {
        self.shards.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskDescriptor;
    use std::collections::HashMap as Map;

    fn task(agent_id: &str, task_name: &str) -> Task {
        let descriptor = TaskDescriptor {
            task_name: task_name.to_string(),
            parameters: Map::new(),
            overrides: Map::new(),
        };
        Task::new("s1", agent_id, "w1", &descriptor, 3)
    }

    #[tokio::test]
    async fn fifo_order_is_preserved_per_agent() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a1", "first")).await;
        queue.enqueue(task("a1", "second")).await;

        let now = chrono::Utc::now();
        let first = queue.try_dequeue_due(now).await.unwrap();
        assert_eq!(first.task_name, "first");
        let second = queue.try_dequeue_due(now).await.unwrap();
        assert_eq!(second.task_name, "second");
        assert!(queue.try_dequeue_due(now).await.is_none());
    }

    #[tokio::test]
    async fn separate_agents_do_not_block_each_other() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a1", "busy-agent-task")).await;
        queue.enqueue(task("a2", "free-agent-task")).await;

        let now = chrono::Utc::now();
        let mut names: Vec<String> = Vec::new();
        while let Some(t) = queue.try_dequeue_due(now).await {
            names.push(t.task_name);
        }
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"busy-agent-task".to_string()));
        assert!(names.contains(&"free-agent-task".to_string()));
    }

    #[tokio::test]
    async fn requeue_does_not_reorder_behind_a_later_queued_task() {
        let queue = TaskQueue::new();
        queue.enqueue(task("a1", "first")).await;
        queue.enqueue(task("a1", "second")).await;

        let now = chrono::Utc::now();
        let first = queue.try_dequeue_due(now).await.unwrap();
        assert_eq!(first.task_name, "first");

        // Simulate contention or a retryable dispatch failure on "first".
        queue.requeue(first).await;

        let redequeued = queue.try_dequeue_due(now).await.unwrap();
        assert_eq!(redequeued.task_name, "first");
        let second = queue.try_dequeue_due(now).await.unwrap();
        assert_eq!(second.task_name, "second");
    }

    #[tokio::test]
    async fn future_scheduled_task_is_skipped_until_due() {
        let queue = TaskQueue::new();
        let mut scheduled = task("a1", "later");
        scheduled.earliest_dispatch = chrono::Utc::now() + chrono::Duration::hours(1);
        queue.enqueue(scheduled).await;

        assert!(queue.try_dequeue_due(chrono::Utc::now()).await.is_none());

        let future_now = chrono::Utc::now() + chrono::Duration::hours(2);
        assert!(queue.try_dequeue_due(future_now).await.is_some());
    }
}
