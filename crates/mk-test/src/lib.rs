//! Harness shared by the scenario and property tests in `tests/`: a small
//! in-memory machine (simulated physical memory plus a freshly booted
//! [`Kernel`]) sized the same way across every test so behavior doesn't
//! depend on how big a test happened to make its machine.

use mk_arch::SimpleMemory;
use mk_kernel::{Kernel, KernelConfig};

/// Physical memory given to every harness machine, in bytes.
pub const MACHINE_MEMORY_BYTES: usize = 4 * 1024 * 1024;

/// Frames reserved below the allocator's watermark, standing in for the
/// kernel image and boot modules a real boot loader would have placed.
pub const RESERVED_FRAMES: (u32, u32) = (0, 16);

/// Boots a fresh kernel over a fresh simulated machine with the harness's
/// standard sizing. Every scenario test starts from this rather than
/// constructing its own `KernelConfig`, so a change to the default
/// reservation only has to be made here.
pub fn boot_machine() -> (SimpleMemory, Kernel) {
    let mut memory = SimpleMemory::new(MACHINE_MEMORY_BYTES);
    let config = KernelConfig {
        phys_frame_count: (MACHINE_MEMORY_BYTES as u32) / mk_arch::PAGE_SIZE,
        async_queue_capacity: 4,
        reserved_ranges: vec![RESERVED_FRAMES],
    };
    let kernel = Kernel::new(config, &mut memory).expect("fresh harness machine always boots");
    (memory, kernel)
}
