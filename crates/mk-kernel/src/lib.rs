pub mod error;
pub mod memory;
pub mod message;
pub mod syscall;
pub mod thread;
pub mod types;

use crate::error::{KernelError, SyscallError};
use crate::memory::{paging, AddressSpaceTable, FrameAllocator};
use crate::message::Message;
use crate::syscall::Syscall;
use crate::thread::ipc::{RecvOutcome, SendOutcome};
use crate::thread::ThreadManager;
use crate::types::ThreadHandle;
use log::debug;
use mk_arch::{Memory, Registers, TrapCause, TrapError, TrapHandler, VirtAddr};

/// Boot-time parameters: how much physical memory this kernel instance
/// manages and how it's carved up before any thread runs.
pub struct KernelConfig {
    pub phys_frame_count: u32,
    /// Capacity of every thread's bounded async-message queue.
    pub async_queue_capacity: usize,
    /// PFN ranges (half-open) to mark in-use before any allocation runs —
    /// the kernel image and pre-placed boot modules live here.
    pub reserved_ranges: Vec<(u32, u32)>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            phys_frame_count: 4096,
            async_queue_capacity: 8,
            reserved_ranges: Vec::new(),
        }
    }
}

/// The microkernel core: physical frames (C1), address spaces (C2-C4),
/// threads (C5), the scheduler (C6), and IPC (C7), composed behind the
/// syscall dispatch table (C8) and the [`TrapHandler`] impl below (C9).
pub struct Kernel {
    pub frames: FrameAllocator,
    pub spaces: AddressSpaceTable,
    pub threads: ThreadManager,
}

impl Kernel {
    pub fn new(config: KernelConfig, memory: &mut dyn Memory) -> Result<Self, KernelError> {
        let mut frames = FrameAllocator::new(config.phys_frame_count);
        for (start, end) in &config.reserved_ranges {
            frames.reserve_range(*start, *end);
        }
        let mut spaces = AddressSpaceTable::new(memory, &mut frames)?;
        let mut threads = ThreadManager::new(config.async_queue_capacity);
        threads.init(&mut frames, spaces.kernel())?;
        Ok(Self {
            frames,
            spaces,
            threads,
        })
    }

    fn save_registers(&mut self, handle: ThreadHandle, regs: Registers) {
        if let Some(tcb) = self.threads.get_mut(handle) {
            tcb.registers = regs;
        }
    }

    fn load_registers(&mut self, handle: ThreadHandle, regs: &mut Registers) {
        if let Some(tcb) = self.threads.get(handle) {
            *regs = tcb.registers;
        }
    }

    fn finish_syscall(
        &mut self,
        current: ThreadHandle,
        regs: &mut Registers,
        result: Result<u32, SyscallError>,
    ) {
        if let Err(e) = result {
            debug!("syscall from {:?} failed: {}", current, e);
        }
        syscall::encode_result(regs, result);
        self.save_registers(current, *regs);
    }

    fn thread_dir(&self, handle: ThreadHandle) -> Option<memory::PageDirectory> {
        let addr_space = self.threads.get(handle)?.addr_space;
        self.spaces.get(addr_space).map(|s| s.dir)
    }

    fn read_message(
        &self,
        memory: &mut dyn Memory,
        owner: ThreadHandle,
        ptr: VirtAddr,
    ) -> Result<Message, SyscallError> {
        let dir = self.thread_dir(owner).ok_or(SyscallError::InvalidArgument)?;
        let mut bytes = [0u8; core::mem::size_of::<Message>()];
        for (i, slot) in bytes.iter_mut().enumerate() {
            let vaddr = VirtAddr::new(ptr.val() + i as u32);
            let paddr = paging::translate(memory, dir, vaddr).ok_or(SyscallError::InvalidArgument)?;
            *slot = memory.read_byte(paddr).map_err(|_| SyscallError::InvalidArgument)?;
        }
        Ok(*bytemuck::from_bytes(&bytes))
    }

    fn write_message(
        &self,
        memory: &mut dyn Memory,
        owner: ThreadHandle,
        ptr: VirtAddr,
        msg: &Message,
    ) -> Result<(), SyscallError> {
        let dir = self.thread_dir(owner).ok_or(SyscallError::InvalidArgument)?;
        for (i, byte) in bytemuck::bytes_of(msg).iter().enumerate() {
            let vaddr = VirtAddr::new(ptr.val() + i as u32);
            let paddr = paging::translate(memory, dir, vaddr).ok_or(SyscallError::InvalidArgument)?;
            memory
                .write_byte(paddr, *byte)
                .map_err(|_| SyscallError::InvalidArgument)?;
        }
        Ok(())
    }

    fn handle_syscall(
        &mut self,
        regs: &mut Registers,
        memory: &mut dyn Memory,
    ) -> Result<VirtAddr, TrapError> {
        let current = self
            .threads
            .current()
            .ok_or_else(|| TrapError::HandlerPanic("syscall trap with no current thread".into()))?;
        self.save_registers(current, *regs);

        let syscall = match Syscall::decode(regs) {
            Ok(s) => s,
            Err(e) => {
                self.finish_syscall(current, regs, Err(e));
                return Ok(regs.pc);
            }
        };
        debug!("syscall from {:?}: {:?}", current, syscall);

        match syscall {
            Syscall::Exit { code } => {
                let next = self.threads.exit_current(code, &mut self.frames, &mut self.spaces);
                self.load_registers(next, regs);
            }
            Syscall::CreateThread { entry, sp, target } => {
                let result = self
                    .threads
                    .create_thread(&mut self.frames, &mut self.spaces, memory, current, entry, sp, target)
                    .map(|h| h.val())
                    .map_err(kernel_to_syscall_error);
                self.finish_syscall(current, regs, result);
            }
            Syscall::Send { to, msg_ptr } => match self.read_message(memory, current, msg_ptr) {
                Ok(msg) => match self.threads.send(current, to, msg) {
                    Ok(SendOutcome::Delivered) => self.finish_syscall(current, regs, Ok(0)),
                    Ok(SendOutcome::Blocked) => {
                        let next = self.threads.switch(&mut self.frames);
                        self.load_registers(next, regs);
                    }
                    Err(e) => self.finish_syscall(current, regs, Err(e)),
                },
                Err(e) => self.finish_syscall(current, regs, Err(e)),
            },
            Syscall::Recv { from, buf_ptr } => match self.threads.recv(current, from) {
                RecvOutcome::Delivered(msg) => {
                    let result = self
                        .write_message(memory, current, buf_ptr, &msg)
                        .map(|_| 0);
                    self.finish_syscall(current, regs, result);
                }
                RecvOutcome::Blocked => {
                    let next = self.threads.switch(&mut self.frames);
                    self.load_registers(next, regs);
                }
            },
            Syscall::SendAsync { to, msg_ptr } => {
                let result = self
                    .read_message(memory, current, msg_ptr)
                    .and_then(|msg| self.threads.send_async(current, to, msg))
                    .map(|_| 0);
                self.finish_syscall(current, regs, result);
            }
            Syscall::RecvAsync { buf_ptr } => {
                let result = self
                    .threads
                    .recv_async(current)
                    .and_then(|msg| self.write_message(memory, current, buf_ptr, &msg).map(|_| 0));
                self.finish_syscall(current, regs, result);
            }
            Syscall::IoPort { port, value } => {
                debug!("ioport passthrough: port={:#x} value={:#x}", port, value);
                self.finish_syscall(current, regs, Ok(value));
            }
        }

        Ok(regs.pc)
    }
}

fn kernel_to_syscall_error(e: KernelError) -> SyscallError {
    match e {
        KernelError::FrameExhausted => SyscallError::FrameExhausted,
        KernelError::RegionMapFull => SyscallError::RegionMapFull,
        KernelError::Init(_) | KernelError::InvariantViolation(_) => SyscallError::InvalidArgument,
    }
}

impl TrapHandler for Kernel {
    fn handle_trap(
        &mut self,
        cause: TrapCause,
        regs: &mut Registers,
        memory: &mut dyn Memory,
    ) -> Result<VirtAddr, TrapError> {
        match cause {
            TrapCause::Syscall => self.handle_syscall(regs, memory),
            TrapCause::TimerInterrupt => {
                if let Some(current) = self.threads.current() {
                    self.save_registers(current, *regs);
                }
                let next = self.threads.switch(&mut self.frames);
                self.load_registers(next, regs);
                Ok(regs.pc)
            }
            TrapCause::PageFault {
                addr,
                present,
                user,
                write,
            } => Err(TrapError::HandlerPanic(format!(
                "page fault at {:#x} (present={}, user={}, write={})",
                addr.val(),
                present,
                user,
                write
            ))),
        }
    }
}
