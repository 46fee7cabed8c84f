//! Thread control block (C5): everything the core tracks about one thread
//! of execution, plus the two intrusive-list link fields every TCB carries
//! (one for the scheduler's runnable queue, one for whichever rendezvous
//! wait-list it is currently a member of — see [`crate::thread::lists`]).

use crate::message::{Message, MessageQueue};
use crate::thread::lists::{ListLinks, ThreadList};
use crate::types::{AddrSpaceHandle, ThreadHandle};
use mk_arch::{Pfn, PrivilegeMode, Registers, VirtAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    /// Blocked in `send`, waiting for `peer` to call a matching `recv`.
    BlockedSend(ThreadHandle),
    /// Blocked in `recv`. `None` matches the first waiting sender (the
    /// `from == 0` wildcard); `Some(peer)` matches only that sender.
    BlockedRecv(Option<ThreadHandle>),
    /// Descheduled but not yet reaped; its kernel stack is still live.
    Stopped,
    /// Exited; its kernel stack and address-space reference have been
    /// released. The slab entry is kept around so its exit code remains
    /// inspectable. Reusing a `Dead` handle as if it were live is a bug.
    Dead,
}

/// The parameters needed to seed a freshly created thread's register file.
pub struct SavedContextInit {
    pub entry: VirtAddr,
    pub sp: u32,
    pub mode: PrivilegeMode,
}

pub struct ThreadControlBlock {
    pub handle: ThreadHandle,
    pub registers: Registers,
    pub addr_space: AddrSpaceHandle,
    pub kernel_stack: Option<Pfn>,
    pub state: ThreadState,
    /// Exit code recorded by `exit`, read back by a future `wait`-style
    /// syscall. Unused until the thread reaches [`ThreadState::Dead`].
    pub exit_code: i32,

    pub sched_links: ListLinks,
    pub wait_links: ListLinks,

    /// Senders currently in `BlockedSend(self)`, oldest first — this
    /// thread's own rendezvous inbox.
    pub waiting_senders: ThreadList,
    /// The message a blocked sender leaves for its receiver to pick up
    /// once the rendezvous completes.
    pub pending_message: Option<Message>,
    pub async_queue: MessageQueue,
}

impl ThreadControlBlock {
    pub fn new(
        handle: ThreadHandle,
        addr_space: AddrSpaceHandle,
        ctx: SavedContextInit,
        kernel_stack: Option<Pfn>,
        async_capacity: usize,
    ) -> Self {
        Self {
            handle,
            registers: Registers::new(ctx.entry, ctx.sp, ctx.mode),
            addr_space,
            kernel_stack,
            state: ThreadState::Ready,
            exit_code: 0,
            sched_links: ListLinks::default(),
            wait_links: ListLinks::default(),
            waiting_senders: ThreadList::new(),
            pending_message: None,
            async_queue: MessageQueue::new(async_capacity),
        }
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.state, ThreadState::Running | ThreadState::Ready)
    }
}
