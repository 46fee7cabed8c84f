use alloc::string::String;
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    OutOfBounds(u32),
    Misaligned { addr: u32, alignment: u32 },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfBounds(addr) => write!(f, "physical access out of bounds: {:#x}", addr),
            MemoryError::Misaligned { addr, alignment } => {
                write!(
                    f,
                    "misaligned access: addr={:#x}, align={}",
                    addr, alignment
                )
            }
        }
    }
}

impl core::error::Error for MemoryError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapError {
    /// Returned by a trap handler that wants the host to stop driving the machine.
    Halt,
    /// A trap the handler recognized but could not service (resource exhaustion,
    /// a fatal kernel invariant violation already logged by the handler, ...).
    HandlerPanic(String),
    /// A trap cause the handler has no case for at all.
    Unhandled(crate::trap::TrapCause),
}

impl fmt::Display for TrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapError::Halt => write!(f, "machine halted"),
            TrapError::HandlerPanic(msg) => write!(f, "trap handler panic: {}", msg),
            TrapError::Unhandled(cause) => write!(f, "unhandled trap: {:?}", cause),
        }
    }
}

impl core::error::Error for TrapError {}
