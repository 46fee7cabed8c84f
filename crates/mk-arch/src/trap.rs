use crate::error::TrapError;
use crate::memory::{Memory, VirtAddr};
use crate::registers::Registers;

/// The only trap causes this core demuxes. Everything about *how* a trap
/// reaches here — vector numbers, trap-frame layout, privilege transitions —
/// is architecture-layer plumbing out of scope for the core; this enum is
/// the entire narrow interface the core needs from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// The timer fired; the core should consider preempting the current thread.
    TimerInterrupt,
    /// A user thread executed the syscall trap instruction.
    Syscall,
    /// A hardware page-table walk failed to produce a mapping.
    PageFault {
        addr: VirtAddr,
        present: bool,
        user: bool,
        write: bool,
    },
}

/// Implemented by [`crate::registers`]-speaking kernels. The architecture
/// layer drives this trait from whatever its real trap-entry glue is; tests
/// and the boot runtime drive it directly.
pub trait TrapHandler: Send {
    /// Handle a trap, returning the address execution should resume at.
    fn handle_trap(
        &mut self,
        cause: TrapCause,
        regs: &mut Registers,
        memory: &mut dyn Memory,
    ) -> Result<VirtAddr, TrapError>;
}
