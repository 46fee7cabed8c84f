//! Address-space object (C4): composes the page directory (C2) and region
//! map (C3) behind a reference count, and is the only component that
//! mutates C2/C3 once a task is running.

use crate::error::KernelError;
use crate::memory::frame::FrameAllocator;
use crate::memory::paging::{self, PageDirectory};
use crate::memory::region::{AddressRegionMap, RegionDescriptor};
use crate::types::AddrSpaceHandle;
use mk_arch::{Memory, Pfn, PAGE_SIZE};
use std::collections::BTreeMap;

pub struct AddressSpace {
    pub dir: PageDirectory,
    pub map: AddressRegionMap,
    refcount: u32,
}

impl AddressSpace {
    fn new(dir: PageDirectory) -> Self {
        Self {
            dir,
            map: AddressRegionMap::new(),
            refcount: 1,
        }
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Inserts `entry` into the region map, reserves its physical range
    /// with the frame allocator, and maps every page into the directory.
    /// Atomic at the address-space granularity: on any failure the
    /// directory and map are rolled back to their pre-call state.
    pub fn insert_map(
        &mut self,
        memory: &mut dyn Memory,
        frames: &mut FrameAllocator,
        entry: RegionDescriptor,
    ) -> Result<(), KernelError> {
        frames.reserve_range(entry.pbase.pfn().val(), entry.pbase.pfn().val() + entry.size);

        for i in 0..entry.size {
            let vaddr = entry.vbase + i * PAGE_SIZE;
            let paddr = entry.pbase + i * PAGE_SIZE;
            if paging::map(memory, frames, self.dir, vaddr, paddr, entry.perms).is_none() {
                for j in 0..i {
                    paging::unmap(memory, frames, self.dir, entry.vbase + j * PAGE_SIZE);
                }
                return Err(KernelError::FrameExhausted);
            }
        }

        if self.map.insert(entry).is_err() {
            for i in 0..entry.size {
                paging::unmap(memory, frames, self.dir, entry.vbase + i * PAGE_SIZE);
            }
            return Err(KernelError::RegionMapFull);
        }

        Ok(())
    }

    /// Unmaps each page of `entry` and removes it from the region map;
    /// the freed physical frames go back to the allocator. This is the
    /// only path that frees user-range physical frames (see DESIGN.md).
    pub fn remove_map(
        &mut self,
        memory: &mut dyn Memory,
        frames: &mut FrameAllocator,
        entry: RegionDescriptor,
    ) -> Result<(), KernelError> {
        for i in 0..entry.size {
            let vaddr = entry.vbase + i * PAGE_SIZE;
            if let Some(pfn) = paging::unmap(memory, frames, self.dir, vaddr) {
                let _ = frames.free_page(pfn);
            }
        }
        self.map
            .remove(entry)
            .map_err(|_| KernelError::InvariantViolation("remove_map: entry not in map".into()))
    }
}

/// Owns every live address space behind a handle, mirroring the kernel's
/// other slab-like singletons (the thread table, the frame bitmap). The
/// kernel address space is entry `kernel()` and is never freed.
pub struct AddressSpaceTable {
    spaces: BTreeMap<AddrSpaceHandle, AddressSpace>,
    next_handle: u32,
    kernel: AddrSpaceHandle,
}

impl AddressSpaceTable {
    /// Constructs the table and its kernel singleton. Called exactly once
    /// at boot; a second call is a logic error in the caller.
    pub fn new(memory: &mut dyn Memory, frames: &mut FrameAllocator) -> Result<Self, KernelError> {
        let dir = paging::create(memory, frames).ok_or(KernelError::FrameExhausted)?;
        let kernel = AddrSpaceHandle::new(1).expect("handle 1 is always non-zero");
        let mut spaces = BTreeMap::new();
        spaces.insert(kernel, AddressSpace::new(dir));
        Ok(Self {
            spaces,
            next_handle: 2,
            kernel,
        })
    }

    pub fn kernel(&self) -> AddrSpaceHandle {
        self.kernel
    }

    pub fn get(&self, handle: AddrSpaceHandle) -> Option<&AddressSpace> {
        self.spaces.get(&handle)
    }

    pub fn get_mut(&mut self, handle: AddrSpaceHandle) -> Option<&mut AddressSpace> {
        self.spaces.get_mut(&handle)
    }

    /// Clones the directory, creates a fresh region map, and copies the
    /// entries byte-for-byte so both spaces see the same mappings
    /// initially — matching the semantics of cloning a running task.
    pub fn clone_space(
        &mut self,
        memory: &mut dyn Memory,
        frames: &mut FrameAllocator,
        src: AddrSpaceHandle,
    ) -> Result<AddrSpaceHandle, KernelError> {
        let src_space = self
            .spaces
            .get(&src)
            .ok_or_else(|| KernelError::InvariantViolation("clone: source space not found".into()))?;
        let new_dir = paging::clone_dir(memory, frames, src_space.dir)
            .ok_or(KernelError::FrameExhausted)?;
        let new_map = src_space.map.clone();
        let handle = AddrSpaceHandle::new(self.next_handle).expect("handle counter stays non-zero");
        self.next_handle += 1;
        self.spaces.insert(
            handle,
            AddressSpace {
                dir: new_dir,
                map: new_map,
                refcount: 1,
            },
        );
        Ok(handle)
    }

    pub fn reference(&mut self, handle: AddrSpaceHandle) {
        if let Some(space) = self.spaces.get_mut(&handle) {
            space.refcount += 1;
        }
    }

    /// Decrements `handle`'s refcount; at zero, frees the directory root
    /// page and drops the slab slot. The kernel singleton is immune.
    pub fn free(&mut self, handle: AddrSpaceHandle, frames: &mut FrameAllocator) {
        if handle == self.kernel {
            return;
        }
        let Some(space) = self.spaces.get_mut(&handle) else {
            return;
        };
        space.refcount -= 1;
        if space.refcount == 0 {
            if let Some(space) = self.spaces.remove(&handle) {
                let _ = frames.free_page(space.dir.root);
            }
        }
    }

    pub fn activate(&self, handle: AddrSpaceHandle) -> Option<Pfn> {
        self.spaces.get(&handle).map(|space| paging::activate(space.dir))
    }
}
