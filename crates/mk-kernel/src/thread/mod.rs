//! Thread management: the TCB slab (C5), the round-robin scheduler (C6)
//! built on top of it, and rendezvous/async IPC (C7), all owned together
//! because every one of those operations needs mutable access to the same
//! thread arena.

pub mod ipc;
pub mod lists;
pub mod scheduler;
pub mod tcb;

use crate::error::KernelError;
use crate::memory::{AddressSpaceTable, FrameAllocator};
use crate::thread::lists::{ThreadArena, ThreadList};
use crate::thread::scheduler::Scheduler;
use crate::thread::tcb::{SavedContextInit, ThreadControlBlock, ThreadState};
use crate::types::{AddrSpaceHandle, CreateThreadTarget, ThreadHandle};
use mk_arch::{Memory, Pfn, PrivilegeMode, VirtAddr};

pub use tcb::ThreadState as PublicThreadState;
pub use tcb::ThreadControlBlock as PublicThreadControlBlock;

pub struct ThreadManager {
    threads: ThreadArena,
    scheduler: Scheduler,
    current: Option<ThreadHandle>,
    next_handle: u32,
    async_capacity: usize,
    /// Kernel stack frames queued for release by `destroy`, drained at the
    /// start of the `switch` that follows so a thread never frees the
    /// stack it is still executing on.
    zombie_stacks: Vec<Pfn>,
}

impl ThreadManager {
    pub fn new(async_capacity: usize) -> Self {
        Self {
            threads: ThreadArena::new(),
            scheduler: Scheduler::new(),
            current: None,
            next_handle: 1,
            async_capacity,
            zombie_stacks: Vec::new(),
        }
    }

    /// Creates the idle thread and makes it current. Called exactly once
    /// at boot, before any other thread exists.
    pub fn init(&mut self, frames: &mut FrameAllocator, kernel_space: AddrSpaceHandle) -> Result<ThreadHandle, KernelError> {
        let idle = self.spawn(frames, kernel_space, VirtAddr::new(0), 0, PrivilegeMode::Supervisor)?;
        self.scheduler.stop(&mut self.threads, idle);
        self.scheduler.set_idle(idle);
        if let Some(tcb) = self.threads.get_mut(&idle) {
            tcb.state = ThreadState::Running;
        }
        self.current = Some(idle);
        Ok(idle)
    }

    fn spawn(
        &mut self,
        frames: &mut FrameAllocator,
        addr_space: AddrSpaceHandle,
        entry: VirtAddr,
        sp: u32,
        mode: PrivilegeMode,
    ) -> Result<ThreadHandle, KernelError> {
        let handle = ThreadHandle::new(self.next_handle).expect("handle counter stays non-zero");
        self.next_handle += 1;
        let kernel_stack = frames.alloc_page().ok_or(KernelError::FrameExhausted)?;
        let mut tcb = ThreadControlBlock::new(
            handle,
            addr_space,
            SavedContextInit { entry, sp, mode },
            Some(kernel_stack),
            self.async_capacity,
        );
        tcb.state = ThreadState::Ready;
        self.threads.insert(handle, tcb);
        self.scheduler.add_thread(&mut self.threads, handle);
        Ok(handle)
    }

    /// Creates a kernel-mode thread sharing `kernel_space`. Used for the
    /// idle thread and other kernel-internal workers.
    pub fn create_kthread(
        &mut self,
        frames: &mut FrameAllocator,
        spaces: &mut AddressSpaceTable,
        entry: VirtAddr,
        sp: u32,
    ) -> Result<ThreadHandle, KernelError> {
        let kernel_space = spaces.kernel();
        spaces.reference(kernel_space);
        self.spawn(frames, kernel_space, entry, sp, PrivilegeMode::Supervisor)
    }

    /// Creates a user-mode thread per the `CREATE_THREAD` syscall contract:
    /// `target` selects whether it joins the caller's own task, starts a
    /// new task cloned from the caller, or a new task cloned fresh off the
    /// kernel address space (see [`CreateThreadTarget`]).
    pub fn create_thread(
        &mut self,
        frames: &mut FrameAllocator,
        spaces: &mut AddressSpaceTable,
        memory: &mut dyn Memory,
        parent: ThreadHandle,
        entry: VirtAddr,
        sp: u32,
        target: CreateThreadTarget,
    ) -> Result<ThreadHandle, KernelError> {
        let parent_space = self
            .threads
            .get(&parent)
            .ok_or_else(|| KernelError::InvariantViolation("create_thread: parent not found".into()))?
            .addr_space;

        let addr_space = match target {
            CreateThreadTarget::Current => {
                spaces.reference(parent_space);
                parent_space
            }
            CreateThreadTarget::CloneCurrent => spaces.clone_space(memory, frames, parent_space)?,
            CreateThreadTarget::CloneKernel => {
                let kernel_space = spaces.kernel();
                spaces.clone_space(memory, frames, kernel_space)?
            }
        };

        self.spawn(frames, addr_space, entry, sp, PrivilegeMode::User)
    }

    /// Creates a user-mode thread bound directly to an already-constructed
    /// address space, bumping its refcount. Used by the boot handoff to
    /// start the root task's thread in the space it just populated, where
    /// there is no "parent" thread to derive the target from.
    pub fn create_thread_in(
        &mut self,
        frames: &mut FrameAllocator,
        spaces: &mut AddressSpaceTable,
        addr_space: AddrSpaceHandle,
        entry: VirtAddr,
        sp: u32,
    ) -> Result<ThreadHandle, KernelError> {
        spaces.reference(addr_space);
        self.spawn(frames, addr_space, entry, sp, PrivilegeMode::User)
    }

    pub fn get(&self, handle: ThreadHandle) -> Option<&ThreadControlBlock> {
        self.threads.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ThreadHandle) -> Option<&mut ThreadControlBlock> {
        self.threads.get_mut(&handle)
    }

    pub fn current(&self) -> Option<ThreadHandle> {
        self.current
    }

    /// Runs `f` with a thread's `ThreadList` temporarily removed from its
    /// TCB, so the closure can hand the whole arena to the list's methods
    /// without aliasing the owning TCB. Every IPC wait-list mutation goes
    /// through this.
    fn with_waiting_list<R>(
        &mut self,
        owner: ThreadHandle,
        f: impl FnOnce(&mut ThreadList, &mut ThreadArena) -> R,
    ) -> Option<R> {
        let mut list = std::mem::take(&mut self.threads.get_mut(&owner)?.waiting_senders);
        let result = f(&mut list, &mut self.threads);
        self.threads.get_mut(&owner)?.waiting_senders = list;
        Some(result)
    }

    /// Moves the current thread back onto the runnable queue (if it is
    /// still `Running`, i.e. voluntarily yielding rather than having just
    /// blocked) and switches to the next thread the scheduler picks.
    /// Releases any zombie kernel stack left by a prior `exit` first.
    pub fn switch(&mut self, frames: &mut FrameAllocator) -> ThreadHandle {
        for stack in self.zombie_stacks.drain(..) {
            let _ = frames.free_page(stack);
        }
        if let Some(current) = self.current {
            if let Some(tcb) = self.threads.get_mut(&current) {
                if tcb.state == ThreadState::Running && self.scheduler.idle() != Some(current) {
                    tcb.state = ThreadState::Ready;
                    self.scheduler.add_thread(&mut self.threads, current);
                }
            }
        }
        let next = self.scheduler.pick_next(&mut self.threads);
        if let Some(tcb) = self.threads.get_mut(&next) {
            tcb.state = ThreadState::Running;
        }
        self.current = Some(next);
        next
    }

    /// Voluntary yield: equivalent to `switch` but only valid when the
    /// current thread is still runnable (never called on a thread that
    /// has just blocked or exited — those paths call `switch` directly).
    pub fn yield_now(&mut self, frames: &mut FrameAllocator) -> ThreadHandle {
        self.switch(frames)
    }

    /// Tears down `handle`: unlinks it from whichever list currently holds
    /// it (the scheduler's runnable queue, or a peer's rendezvous
    /// wait-list), releases its address-space reference, and defers its
    /// kernel stack to be freed by the next `switch` (it may be the very
    /// stack the caller is still executing on).
    pub fn destroy(
        &mut self,
        handle: ThreadHandle,
        frames: &mut FrameAllocator,
        spaces: &mut AddressSpaceTable,
    ) {
        self.scheduler.stop(&mut self.threads, handle);

        let (state, addr_space, kernel_stack) = match self.threads.get(&handle) {
            Some(tcb) => (tcb.state, tcb.addr_space, tcb.kernel_stack),
            None => return,
        };

        if let ThreadState::BlockedSend(peer) = state {
            self.with_waiting_list(peer, |list, arena| {
                list.remove(arena, handle, |t| &mut t.wait_links);
            });
        }

        if let Some(tcb) = self.threads.get_mut(&handle) {
            tcb.state = ThreadState::Dead;
        }
        if let Some(stack) = kernel_stack {
            self.zombie_stacks.push(stack);
        }
        spaces.free(addr_space, frames);
    }

    /// Exits the current thread with `code` and switches to its successor.
    pub fn exit_current(&mut self, code: i32, frames: &mut FrameAllocator, spaces: &mut AddressSpaceTable) -> ThreadHandle {
        let current = self.current.expect("exit_current called with no current thread");
        if let Some(tcb) = self.threads.get_mut(&current) {
            tcb.exit_code = code;
        }
        self.destroy(current, frames, spaces);
        self.switch(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AddressSpaceTable;
    use mk_arch::SimpleMemory;

    fn setup() -> (SimpleMemory, FrameAllocator, AddressSpaceTable, ThreadManager) {
        let mut mem = SimpleMemory::new(4 * 1024 * 1024);
        let mut frames = FrameAllocator::new(1024);
        let spaces = AddressSpaceTable::new(&mut mem, &mut frames).unwrap();
        let tm = ThreadManager::new(4);
        (mem, frames, spaces, tm)
    }

    #[test]
    fn init_makes_idle_current_and_not_queued() {
        let (mut mem, mut frames, mut spaces, mut tm) = setup();
        let idle = tm.init(&mut frames, spaces.kernel()).unwrap();
        assert_eq!(tm.current(), Some(idle));
        assert_eq!(tm.switch(&mut frames), idle);
    }

    #[test]
    fn single_ready_thread_never_cedes_to_idle() {
        let (mut mem, mut frames, mut spaces, mut tm) = setup();
        let idle = tm.init(&mut frames, spaces.kernel()).unwrap();
        let a = tm
            .create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x1000), 0, CreateThreadTarget::Current)
            .unwrap();

        // `a` is the only `Ready` thread; it must keep being picked over
        // idle on every switch, not alternate with it.
        for _ in 0..4 {
            assert_eq!(tm.switch(&mut frames), a);
        }
    }

    #[test]
    fn idle_runs_once_the_only_other_thread_is_gone() {
        let (mut mem, mut frames, mut spaces, mut tm) = setup();
        let idle = tm.init(&mut frames, spaces.kernel()).unwrap();
        let a = tm
            .create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x1000), 0, CreateThreadTarget::Current)
            .unwrap();
        tm.switch(&mut frames); // idle -> a

        tm.destroy(a, &mut frames, &mut spaces);
        assert_eq!(tm.switch(&mut frames), idle);
    }

    #[test]
    fn exit_frees_stack_on_next_switch() {
        let (mut mem, mut frames, mut spaces, mut tm) = setup();
        let idle = tm.init(&mut frames, spaces.kernel()).unwrap();
        let a = tm
            .create_thread(&mut frames, &mut spaces, &mut mem, idle, VirtAddr::new(0x1000), 0, CreateThreadTarget::Current)
            .unwrap();
        tm.switch(&mut frames); // idle -> a

        let free_before = frames.free_count();
        tm.exit_current(0, &mut frames, &mut spaces); // a exits, switches to idle
        assert_eq!(tm.get(a).unwrap().state, ThreadState::Dead);
        assert_eq!(frames.free_count(), free_before + 1);
    }
}
