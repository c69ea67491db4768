//! Task queue with dependency gating
//!
//! A min-heap ordered by `(priority, seq)`. `seq` is a strictly increasing
//! creation counter, so equal-priority tasks are served first-in-first-out.
//!
//! A popped task whose dependency has not completed is not discarded: its
//! priority is bumped by one and it goes back into the heap while the scan
//! moves on. Each `dequeue` examines every queued entry at most once, so a
//! queue holding only blocked tasks answers `None` instead of spinning.
//!
//! A task that stays blocked for `max_dependency_polls` polls is moved to the
//! completion ledger with [`TaskOutcome::Blocked`].

use crate::stage::TaskType;
use crate::types::{CompletedTask, Task, TaskId, TaskOutcome, TaskPayload};
use chrono::Utc;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// Default re-poll bound before a blocked task is terminated
pub const DEFAULT_MAX_DEPENDENCY_POLLS: u32 = 50;

/// Heap entry; `BinaryHeap` is a max-heap so the key is reversed
#[derive(Debug)]
struct Queued(Task);

impl Queued {
    fn key(&self) -> Reverse<(u32, u64)> {
        Reverse((self.0.priority, self.0.seq))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority queue with dependency tracking
#[derive(Debug)]
pub struct TaskQueue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
    in_progress: HashMap<TaskId, Task>,
    completed: HashMap<TaskId, CompletedTask>,
    max_dependency_polls: u32,
}

impl TaskQueue {
    /// Create an empty queue with the default re-poll bound
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_dependency_polls(DEFAULT_MAX_DEPENDENCY_POLLS)
    }

    /// Create an empty queue; `0` disables the blocked terminal
    #[inline]
    #[must_use]
    pub fn with_max_dependency_polls(max_dependency_polls: u32) -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            in_progress: HashMap::new(),
            completed: HashMap::new(),
            max_dependency_polls,
        }
    }

    /// Add a task and return its identifier
    pub fn enqueue(
        &mut self,
        task_type: TaskType,
        payload: TaskPayload,
        priority: u32,
        depends_on: Option<TaskId>,
    ) -> TaskId {
        let id = TaskId::new();
        let seq = self.next_seq;
        self.next_seq += 1;

        tracing::debug!(
            task_id = %id,
            task_type = %task_type,
            priority,
            depends_on = ?depends_on,
            "enqueue"
        );

        self.heap.push(Queued(Task {
            id,
            task_type,
            priority,
            seq,
            created_at: Utc::now(),
            payload,
            depends_on,
            polls: 0,
        }));
        id
    }

    /// Return the next runnable task, skipping tasks whose dependency is pending
    pub fn dequeue(&mut self) -> Option<Task> {
        let budget = self.heap.len();
        let mut deferred = Vec::new();
        let mut runnable = None;

        for _ in 0..budget {
            let Some(Queued(mut task)) = self.heap.pop() else {
                break;
            };

            let waiting_on = task
                .depends_on
                .filter(|dep| !self.completed.contains_key(dep));

            let Some(dep) = waiting_on else {
                runnable = Some(task);
                break;
            };

            task.polls += 1;
            if self.max_dependency_polls > 0 && task.polls >= self.max_dependency_polls {
                tracing::warn!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    waiting_on = %dep,
                    polls = task.polls,
                    "dependency never completed, giving up"
                );
                let polls = task.polls;
                self.record(task, TaskOutcome::Blocked { waiting_on: dep, polls });
            } else {
                task.priority = task.priority.saturating_add(1);
                tracing::debug!(
                    task_id = %task.id,
                    waiting_on = %dep,
                    priority = task.priority,
                    "dependency pending, requeue"
                );
                deferred.push(task);
            }
        }

        for task in deferred {
            self.heap.push(Queued(task));
        }

        if let Some(task) = &runnable {
            self.in_progress.insert(task.id, task.clone());
        }
        runnable
    }

    /// Record completion and remove the task from the in-progress registry
    ///
    /// Returns `false` when the task was not in progress; the call is then a no-op.
    pub fn mark_complete(&mut self, task_id: TaskId, outcome: TaskOutcome) -> bool {
        match self.in_progress.remove(&task_id) {
            Some(task) => {
                self.record(task, outcome);
                true
            }
            None => {
                tracing::debug!(task_id = %task_id, "mark_complete for task not in progress");
                false
            }
        }
    }

    fn record(&mut self, task: Task, outcome: TaskOutcome) {
        self.completed.insert(
            task.id,
            CompletedTask {
                task_type: task.task_type,
                payload: task.payload,
                priority: task.priority,
                completed_at: Utc::now(),
                outcome,
            },
        );
    }

    /// Number of queued (not yet dequeued) tasks
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is queued or in progress
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty() && self.in_progress.is_empty()
    }

    /// Tasks dequeued but not yet completed
    #[must_use]
    pub fn in_progress(&self) -> Vec<&Task> {
        self.in_progress.values().collect()
    }

    /// Permanent completion ledger
    #[inline]
    #[must_use]
    pub fn completed(&self) -> &HashMap<TaskId, CompletedTask> {
        &self.completed
    }

    /// Whether `task_id` has completed (with any outcome)
    #[inline]
    #[must_use]
    pub fn is_completed(&self, task_id: TaskId) -> bool {
        self.completed.contains_key(&task_id)
    }

    /// Outcome of a completed task
    #[must_use]
    pub fn outcome(&self, task_id: TaskId) -> Option<&TaskOutcome> {
        self.completed.get(&task_id).map(|c| &c.outcome)
    }

    /// Configured re-poll bound
    #[inline]
    #[must_use]
    pub fn max_dependency_polls(&self) -> u32 {
        self.max_dependency_polls
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
