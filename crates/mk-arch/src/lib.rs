#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod error;
pub mod memory;
pub mod registers;
pub mod trap;

pub use error::{MemoryError, TrapError};
pub use memory::{Memory, PhysAddr, Pfn, SimpleMemory, VirtAddr, PAGE_SHIFT, PAGE_SIZE};
pub use registers::{
    PrivilegeMode, Registers, ARG0, ARG1, ARG2, ARG3, GPR_COUNT, RESULT, SYSCALL_NUM,
};
pub use trap::{TrapCause, TrapHandler};
