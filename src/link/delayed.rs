//! Bounded delayed-execution queue
//!
//! One-shot callbacks keyed by a due time, polled from the supervisor tick.
//! The queue never grows past the capacity it was built with: a full queue
//! rejects new work instead of allocating. Callbacks receive a context value
//! (`&mut C`) so a task can act on whatever owns the queue.
//!
//! Removal shifts the tail left so the occupied slots stay dense and
//! first-registered tasks are checked first. Nothing fires before its due
//! time; tasks with different due times carry no ordering promise beyond that.

use crate::error::{LinkError, LinkResult};

/// Callback run once when a task falls due
pub type DelayedCallback<C> = Box<dyn FnOnce(&mut C)>;

/// A pending one-shot callback
pub struct DelayedTask<C> {
    due_at: u64,
    sequence: u64,
    callback: DelayedCallback<C>,
}

impl<C> DelayedTask<C> {
    pub fn due_at(&self) -> u64 {
        self.due_at
    }

    /// Consume the task and run its callback
    pub fn run(self, context: &mut C) {
        (self.callback)(context)
    }
}

impl<C> std::fmt::Debug for DelayedTask<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedTask")
            .field("due_at", &self.due_at)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Fixed-capacity queue of delayed tasks
pub struct DelayedQueue<C> {
    tasks: Vec<DelayedTask<C>>,
    capacity: usize,
    next_sequence: u64,
}

impl<C> DelayedQueue<C> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Vec::with_capacity(capacity),
            capacity,
            next_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tasks.len() >= self.capacity
    }

    /// Earliest due time among pending tasks
    pub fn next_due_at(&self) -> Option<u64> {
        self.tasks.iter().map(DelayedTask::due_at).min()
    }

    /// Sequence number the next scheduled task will receive
    ///
    /// Passing this as the cutoff to [`take_due`](Self::take_due) restricts a
    /// drain pass to tasks that existed when the pass started.
    pub fn sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Queue `callback` to run once `now + delay_ms` has been reached
    pub fn schedule<F>(&mut self, now: u64, delay_ms: u64, callback: F) -> LinkResult<()>
    where
        F: FnOnce(&mut C) + 'static,
    {
        if self.is_full() {
            return Err(LinkError::capacity_exceeded("delayed queue", self.capacity));
        }

        self.tasks.push(DelayedTask {
            due_at: now.saturating_add(delay_ms),
            sequence: self.next_sequence,
            callback: Box::new(callback),
        });
        self.next_sequence += 1;
        Ok(())
    }

    /// Remove and return the next due task at or after `*cursor`
    ///
    /// Only tasks with a sequence below `cutoff` are eligible. After a removal
    /// the cursor is left on the same slot, which now holds the next entry, so
    /// repeated calls visit every live entry exactly once.
    pub fn take_due(&mut self, cursor: &mut usize, now: u64, cutoff: u64) -> Option<DelayedTask<C>> {
        while *cursor < self.tasks.len() {
            let task = &self.tasks[*cursor];
            if task.sequence < cutoff && task.due_at <= now {
                return Some(self.tasks.remove(*cursor));
            }
            *cursor += 1;
        }
        None
    }

    /// Run every task due at `now`, returning how many ran
    ///
    /// The queue lives inside `context`; `queue` locates it there so each
    /// callback receives the whole owner. Tasks scheduled by a callback during
    /// this pass wait for the next one, which keeps a single drain bounded by
    /// the queue capacity.
    pub fn drain_due<F>(context: &mut C, now: u64, queue: F) -> usize
    where
        F: Fn(&mut C) -> &mut DelayedQueue<C>,
    {
        let cutoff = queue(context).sequence();
        let mut cursor = 0;
        let mut ran = 0;

        while let Some(task) = queue(context).take_due(&mut cursor, now, cutoff) {
            task.run(context);
            ran += 1;
        }
        ran
    }
}

impl<C> std::fmt::Debug for DelayedQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedQueue")
            .field("tasks", &self.tasks)
            .field("capacity", &self.capacity)
            .finish()
    }
}
