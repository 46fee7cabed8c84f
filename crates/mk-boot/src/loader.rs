//! Root-task loader: turns a [`crate::BootInfo`]'s first module into a
//! running user thread, per the boot-handoff contract — clone the kernel
//! address space, map a code region and a data+stack region backed by
//! freshly allocated physical frames, copy the module's bytes into the
//! code region, and hand a `Ready` thread to the scheduler.

use crate::BootInfo;
use log::info;
use mk_arch::{Memory, PhysAddr, VirtAddr, PAGE_SIZE};
use mk_kernel::error::KernelError;
use mk_kernel::memory::{FrameAllocator, Permissions, RegionDescriptor};
use mk_kernel::types::ThreadHandle;
use mk_kernel::Kernel;
use thiserror::Error;

/// Fixed virtual base the root task's code is mapped at (see §6 of the
/// core's design: "a fixed high virtual address").
pub const ROOT_TASK_CODE_VBASE: VirtAddr = VirtAddr::new(0xC000_0000);
/// Fixed virtual base for the root task's combined data+stack region.
pub const ROOT_TASK_DATA_VBASE: VirtAddr = VirtAddr::new(0xD000_0000);
/// Size of the data+stack region, in pages. Generous enough for a small
/// root task's globals and call stack without demand paging.
pub const ROOT_TASK_DATA_PAGES: u32 = 16;

#[derive(Debug, Error)]
pub enum BootError {
    #[error("boot info carries no modules; there is no root task to load")]
    NoRootTaskModule,
    #[error("root task module is empty")]
    EmptyModule,
    #[error("not enough contiguous physical frames to back the root task's {0} region")]
    NotContiguous(&'static str),
    #[error("kernel rejected root task setup: {0}")]
    Kernel(#[from] KernelError),
    #[error("physical memory access failed while loading the root task")]
    MemoryAccess,
}

/// Allocates `count` frames, erroring unless they land on consecutive
/// PFNs. True at boot, before any other allocation has run long enough to
/// fragment the bitmap; the caller (this loader) is the first consumer of
/// fresh physical memory after `Kernel::new`.
fn alloc_contiguous(
    frames: &mut FrameAllocator,
    count: u32,
    what: &'static str,
) -> Result<PhysAddr, BootError> {
    let mut pfns = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let pfn = frames.alloc_page().ok_or(KernelError::FrameExhausted)?;
        pfns.push(pfn);
    }
    for pair in pfns.windows(2) {
        if pair[1].val() != pair[0].val() + 1 {
            for pfn in pfns {
                let _ = frames.free_page(pfn);
            }
            return Err(BootError::NotContiguous(what));
        }
    }
    Ok(pfns[0].to_phys())
}

/// Loads `info`'s first module as the root task: a fresh address space
/// cloned from the kernel's, a code region and a data+stack region mapped
/// into it, the module's bytes copied into the code region, and a `Ready`
/// user thread entering the module's load address with its stack near
/// the top of the data region.
pub fn load_root_task(
    kernel: &mut Kernel,
    memory: &mut dyn Memory,
    info: &BootInfo,
) -> Result<ThreadHandle, BootError> {
    let module = info.modules.first().ok_or(BootError::NoRootTaskModule)?;
    if module.is_empty() {
        return Err(BootError::EmptyModule);
    }
    let code_pages = module.len().div_ceil(PAGE_SIZE);

    let kernel_space = kernel.spaces.kernel();
    let task_space = kernel
        .spaces
        .clone_space(memory, &mut kernel.frames, kernel_space)?;

    let code_pbase = alloc_contiguous(&mut kernel.frames, code_pages, "code")?;
    let mut module_bytes = Vec::with_capacity(module.len() as usize);
    for offset in 0..module.len() {
        let byte = memory
            .read_byte(module.phys_start + offset)
            .map_err(|_| BootError::MemoryAccess)?;
        module_bytes.push(byte);
    }
    memory
        .copy_to(code_pbase, &module_bytes)
        .map_err(|_| BootError::MemoryAccess)?;

    let code_region = RegionDescriptor::new(
        ROOT_TASK_CODE_VBASE,
        code_pbase,
        code_pages,
        Permissions::READ | Permissions::EXECUTE,
    );
    kernel
        .spaces
        .get_mut(task_space)
        .expect("just-cloned address space is present")
        .insert_map(memory, &mut kernel.frames, code_region)?;

    let data_pbase = alloc_contiguous(&mut kernel.frames, ROOT_TASK_DATA_PAGES, "data+stack")?;
    let data_region = RegionDescriptor::new(
        ROOT_TASK_DATA_VBASE,
        data_pbase,
        ROOT_TASK_DATA_PAGES,
        Permissions::READ | Permissions::WRITE,
    );
    kernel
        .spaces
        .get_mut(task_space)
        .expect("just-cloned address space is present")
        .insert_map(memory, &mut kernel.frames, data_region)?;

    let stack_top = ROOT_TASK_DATA_VBASE.val() + ROOT_TASK_DATA_PAGES * PAGE_SIZE - 8;

    let thread = kernel.threads.create_thread_in(
        &mut kernel.frames,
        &mut kernel.spaces,
        task_space,
        ROOT_TASK_CODE_VBASE,
        stack_top,
    )?;

    info!(
        "root task loaded: {} code pages at {:#x}, thread {:?}",
        code_pages,
        ROOT_TASK_CODE_VBASE.val(),
        thread
    );

    Ok(thread)
}
