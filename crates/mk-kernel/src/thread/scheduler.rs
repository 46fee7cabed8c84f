//! Round-robin preemptive scheduler (C6). Holds no TCB state of its own
//! beyond the runnable queue's head/tail pointers — the links live inside
//! each [`ThreadControlBlock`](crate::thread::tcb::ThreadControlBlock), so
//! this type is cheap to keep alongside the thread table rather than
//! behind a trait object.

use crate::thread::lists::{ListTag, ThreadArena, ThreadList};
use crate::types::ThreadHandle;

pub struct Scheduler {
    runnable: ThreadList,
    idle: Option<ThreadHandle>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            runnable: ThreadList::new(),
            idle: None,
        }
    }

    /// Registers the idle thread. Called once at boot; the idle thread is
    /// never placed in the runnable queue, it is the fallback `pick_next`
    /// returns when the queue is empty.
    pub fn set_idle(&mut self, idle: ThreadHandle) {
        self.idle = Some(idle);
    }

    pub fn idle(&self) -> Option<ThreadHandle> {
        self.idle
    }

    /// Appends `handle` to the tail of the runnable queue. The caller is
    /// responsible for having set its state to `Ready` first.
    pub fn add_thread(&mut self, arena: &mut ThreadArena, handle: ThreadHandle) {
        self.runnable
            .insert(arena, handle, ListTag::Scheduler, |t| &mut t.sched_links);
    }

    /// Removes `handle` from the runnable queue, e.g. because it blocked
    /// or exited. A no-op if it was not queued (already running, or the
    /// idle thread).
    pub fn stop(&mut self, arena: &mut ThreadArena, handle: ThreadHandle) {
        self.runnable.remove(arena, handle, |t| &mut t.sched_links);
    }

    /// Pops the next runnable thread, falling back to idle when the queue
    /// is empty.
    pub fn pick_next(&mut self, arena: &mut ThreadArena) -> ThreadHandle {
        self.runnable
            .pop_front(arena, |t| &mut t.sched_links)
            .or(self.idle)
            .expect("scheduler has no idle thread to fall back to")
    }
}
