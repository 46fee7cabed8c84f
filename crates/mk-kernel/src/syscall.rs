//! Syscall dispatch table (C8): the numbered ABI user threads trap into,
//! decoded from [`Registers`] and encoded back the same way.

use crate::error::SyscallError;
use crate::types::{CreateThreadTarget, ThreadHandle};
use mk_arch::{Registers, VirtAddr, ARG0, ARG1, ARG2, ARG3};

pub const SYS_EXIT: u32 = 0;
pub const SYS_CREATE_THREAD: u32 = 1;
pub const SYS_SEND: u32 = 2;
pub const SYS_RECV: u32 = 3;
pub const SYS_SEND_ASYNC: u32 = 4;
pub const SYS_RECV_ASYNC: u32 = 5;
pub const SYS_IOPORT: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Exit {
        code: i32,
    },
    CreateThread {
        entry: VirtAddr,
        sp: u32,
        target: CreateThreadTarget,
    },
    /// `msg_ptr` points at a `Message` in the caller's address space.
    Send {
        to: ThreadHandle,
        msg_ptr: VirtAddr,
    },
    /// `buf_ptr` is where the received `Message` is written back.
    Recv {
        from: Option<ThreadHandle>,
        buf_ptr: VirtAddr,
    },
    SendAsync {
        to: ThreadHandle,
        msg_ptr: VirtAddr,
    },
    RecvAsync {
        buf_ptr: VirtAddr,
    },
    /// Raw port I/O, the one syscall this core forwards without
    /// interpreting — arbitrary device access is architecture-layer scope.
    IoPort {
        port: u32,
        value: u32,
    },
}

impl Syscall {
    pub fn decode(regs: &Registers) -> Result<Self, SyscallError> {
        let num = regs.arg(mk_arch::SYSCALL_NUM);
        let a0 = regs.arg(ARG0);
        let a1 = regs.arg(ARG1);
        let a2 = regs.arg(ARG2);
        let _a3 = regs.arg(ARG3);

        match num {
            SYS_EXIT => Ok(Syscall::Exit { code: a0 as i32 }),
            SYS_CREATE_THREAD => Ok(Syscall::CreateThread {
                entry: VirtAddr::new(a0),
                sp: a1,
                target: CreateThreadTarget::from_bits(a2).ok_or(SyscallError::InvalidArgument)?,
            }),
            SYS_SEND => Ok(Syscall::Send {
                to: thread_handle(a0)?,
                msg_ptr: VirtAddr::new(a1),
            }),
            SYS_RECV => Ok(Syscall::Recv {
                from: if a0 == 0 { None } else { Some(thread_handle(a0)?) },
                buf_ptr: VirtAddr::new(a1),
            }),
            SYS_SEND_ASYNC => Ok(Syscall::SendAsync {
                to: thread_handle(a0)?,
                msg_ptr: VirtAddr::new(a1),
            }),
            SYS_RECV_ASYNC => Ok(Syscall::RecvAsync {
                buf_ptr: VirtAddr::new(a0),
            }),
            SYS_IOPORT => Ok(Syscall::IoPort { port: a0, value: a1 }),
            other => Err(SyscallError::InvalidSyscallNumber(other)),
        }
    }
}

fn thread_handle(raw: u32) -> Result<ThreadHandle, SyscallError> {
    ThreadHandle::new(raw).ok_or(SyscallError::InvalidArgument)
}

/// Encodes a syscall's result into the return-value slot. Errors are
/// reported as `-1` to user space per the ABI; the caller logs the
/// original [`SyscallError`] before calling this.
pub fn encode_result(regs: &mut Registers, result: Result<u32, SyscallError>) {
    match result {
        Ok(val) => regs.set_return(val),
        Err(_) => regs.set_return(u32::MAX),
    }
}
