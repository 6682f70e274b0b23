//! Per-sink group of background writer threads.
//!
//! Every asynchronous write runs on its own thread. The group records the
//! join handle under its lock so that [`TaskGroup::close_and_join`] observes
//! every task spawned before it and rejects any spawned after. Finished
//! handles are reaped whenever a new task is added.

use std::{
    io, mem,
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;

/// Reasons a task could not be dispatched.
#[derive(Debug)]
pub(crate) enum DispatchError {
    /// The group is draining or drained; no new tasks are accepted.
    Closed,
    /// The operating system refused to start a thread.
    Spawn(io::Error),
}

#[derive(Default)]
struct TaskSet {
    handles: Vec<JoinHandle<()>>,
    panicked: usize,
    closed: bool,
}

impl TaskSet {
    fn reap_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = mem::take(&mut self.handles)
            .into_iter()
            .partition(|handle| handle.is_finished());
        self.handles = running;
        for handle in finished {
            if handle.join().is_err() {
                self.panicked += 1;
            }
        }
    }
}

/// Outstanding asynchronous writers for one sink.
#[derive(Default)]
pub(crate) struct TaskGroup {
    inner: Mutex<TaskSet>,
}

impl TaskGroup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start `task` on a new named thread and track it.
    pub(crate) fn spawn<F>(&self, name: String, task: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut set = self.inner.lock();
        if set.closed {
            return Err(DispatchError::Closed);
        }
        set.reap_finished();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(task)
            .map_err(DispatchError::Spawn)?;
        set.handles.push(handle);
        Ok(())
    }

    /// Number of tracked tasks that have not finished yet.
    pub(crate) fn pending(&self) -> usize {
        self.inner
            .lock()
            .handles
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Refuse new tasks, then wait for every tracked task to finish.
    ///
    /// Returns the number of tasks that panicked over the group's lifetime.
    /// The lock is released before joining so running tasks are never
    /// blocked by the drain. When called from one of the group's own tasks,
    /// every other task is joined and the caller is left running.
    pub(crate) fn close_and_join(&self) -> usize {
        let (handles, mut panicked) = {
            let mut set = self.inner.lock();
            set.closed = true;
            (mem::take(&mut set.handles), mem::take(&mut set.panicked))
        };
        let current = thread::current().id();
        for handle in handles {
            // A task closing its own group cannot join itself; it finishes
            // once this call returns.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        panicked
    }
}
