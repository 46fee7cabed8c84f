use crate::memory::VirtAddr;

/// Index into [`Registers::gpr`] for a syscall argument or the syscall number.
/// The mapping (args in 0..=3, number in slot 4, result written back to slot 0)
/// is the ABI described in the syscall dispatch contract; it has nothing to do
/// with any particular architecture's calling convention.
pub const ARG0: usize = 0;
pub const ARG1: usize = 1;
pub const ARG2: usize = 2;
pub const ARG3: usize = 3;
pub const SYSCALL_NUM: usize = 4;
pub const RESULT: usize = ARG0;

pub const GPR_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeMode {
    User,
    Supervisor,
}

/// The saved machine context a thread resumes into: a program counter, a
/// small general-purpose word array (syscall args/return value plus stack
/// pointer), and the mode it runs in. This is deliberately the entire saved
/// context the core needs — no flags register, no floating point, no raw
/// trap frame — everything else is architecture-layer detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub pc: VirtAddr,
    pub gpr: [u32; GPR_COUNT],
    pub sp: u32,
    pub mode: PrivilegeMode,
}

impl Registers {
    pub fn new(entry: VirtAddr, sp: u32, mode: PrivilegeMode) -> Self {
        Self {
            pc: entry,
            gpr: [0; GPR_COUNT],
            sp,
            mode,
        }
    }

    pub fn arg(&self, slot: usize) -> u32 {
        self.gpr[slot]
    }

    pub fn set_return(&mut self, val: u32) {
        self.gpr[RESULT] = val;
    }
}
