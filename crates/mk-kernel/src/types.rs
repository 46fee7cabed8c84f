use core::num::NonZeroU32;

/// Thread identifier. Monotonically assigned, never reused.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ThreadHandle(NonZeroU32);

impl ThreadHandle {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn val(&self) -> u32 {
        self.0.get()
    }
}

/// Address-space identifier, used by the kernel's address-space slab.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AddrSpaceHandle(NonZeroU32);

impl AddrSpaceHandle {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn val(&self) -> u32 {
        self.0.get()
    }
}

/// Which address space a `CREATE_THREAD` syscall binds the new thread to,
/// decoded from the syscall's `flags` argument (see §4.8 of the design:
/// "consults `flags` to select: current address space, clone of current,
/// or clone of kernel").
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CreateThreadTarget {
    /// A new thread of execution in the caller's own task.
    Current,
    /// A new task, its address space cloned from the caller's.
    CloneCurrent,
    /// A new task spawned fresh off the kernel address space.
    CloneKernel,
}

impl CreateThreadTarget {
    pub const CURRENT: u32 = 0;
    pub const CLONE_CURRENT: u32 = 1;
    pub const CLONE_KERNEL: u32 = 2;

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            Self::CURRENT => Some(Self::Current),
            Self::CLONE_CURRENT => Some(Self::CloneCurrent),
            Self::CLONE_KERNEL => Some(Self::CloneKernel),
            _ => None,
        }
    }
}
