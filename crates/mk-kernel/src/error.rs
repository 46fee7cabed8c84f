use thiserror::Error;

/// Errors a kernel singleton can hit during boot-time construction or while
/// servicing a request whose only recourse is the fatal path (see
/// [`SyscallError`] for the syscall-returnable kinds).
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("initialization error: {0}")]
    Init(String),

    #[error("no free physical frame")]
    FrameExhausted,

    #[error("address region map is full")]
    RegionMapFull,

    /// Double-free, corrupted list linkage, an unexpected page fault — the
    /// kernel logs this and halts. Never handed back to user space.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Maps 1:1 onto the small-negative syscall ABI (see `syscall::dispatch`).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("invalid syscall number: {0}")]
    InvalidSyscallNumber(u32),

    #[error("would block")]
    WouldBlock,

    #[error("no free physical frame")]
    FrameExhausted,

    #[error("address region map is full")]
    RegionMapFull,
}
