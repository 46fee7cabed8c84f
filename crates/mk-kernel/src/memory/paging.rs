//! Virtual paging primitives (C2). Opaque to the rest of the core beyond
//! the operations below: create, clone, map, unmap, translate, activate.
//! Every live directory carries a self-referential entry at its last slot
//! so in-place table edits never need a separate temporary mapping; that
//! invariant is established here and never leaked to callers.

use crate::memory::frame::FrameAllocator;
use crate::memory::region::Permissions;
use mk_arch::{Memory, MemoryError, PhysAddr, Pfn, VirtAddr, PAGE_SIZE};

pub const ENTRIES_PER_TABLE: u32 = 1024;
pub const SELF_MAP_SLOT: u32 = ENTRIES_PER_TABLE - 1;
/// Directory slots below this index are user-range and deep-copied by
/// [`clone_dir`]; slots at or above it are the shared kernel upper half.
pub const KERNEL_SPLIT_SLOT: u32 = 768;

const PTE_VALID: u32 = 1 << 0;
const PTE_WRITE: u32 = 1 << 1;
const PTE_EXEC: u32 = 1 << 2;
const PTE_USER: u32 = 1 << 3;

fn pte_flags(perms: Permissions) -> u32 {
    let mut flags = PTE_VALID;
    if perms.contains(Permissions::WRITE) {
        flags |= PTE_WRITE;
    }
    if perms.contains(Permissions::EXECUTE) {
        flags |= PTE_EXEC;
    }
    if !perms.contains(Permissions::SUPERVISOR) {
        flags |= PTE_USER;
    }
    flags
}

/// A page directory, opaque to every component but this one. Carries only
/// the PFN of its root table; everything else lives in [`Memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDirectory {
    pub root: Pfn,
}

fn pte_addr(table_pfn: Pfn, index: u32) -> PhysAddr {
    table_pfn.to_phys() + index * 4
}

fn read_pte(memory: &mut dyn Memory, table_pfn: Pfn, index: u32) -> Result<u32, MemoryError> {
    memory.read_word(pte_addr(table_pfn, index))
}

fn write_pte(
    memory: &mut dyn Memory,
    table_pfn: Pfn,
    index: u32,
    value: u32,
) -> Result<(), MemoryError> {
    memory.write_word(pte_addr(table_pfn, index), value)
}

fn zero_table(memory: &mut dyn Memory, pfn: Pfn) -> Result<(), MemoryError> {
    for i in 0..ENTRIES_PER_TABLE {
        write_pte(memory, pfn, i, 0)?;
    }
    Ok(())
}

fn vpn1(vaddr: VirtAddr) -> u32 {
    (vaddr.val() >> 22) & 0x3FF
}

fn vpn0(vaddr: VirtAddr) -> u32 {
    (vaddr.val() >> 12) & 0x3FF
}

/// Creates an empty directory with the self-map invariant established.
/// Callers (normally [`crate::memory::address_space`]) install the shared
/// kernel upper half afterward.
pub fn create(memory: &mut dyn Memory, frames: &mut FrameAllocator) -> Option<PageDirectory> {
    let root = frames.alloc_page()?;
    zero_table(memory, root).ok()?;
    let self_entry = (root.val() << 10) | PTE_VALID | PTE_WRITE;
    write_pte(memory, root, SELF_MAP_SLOT, self_entry).ok()?;
    Some(PageDirectory { root })
}

/// Produces a new directory sharing the kernel upper half with `src` and
/// fresh copies of leaf tables in the user lower half. The leaf *entries*
/// still name the same physical frames as `src` — only the L0 table pages
/// themselves are duplicated, so each space can map/unmap independently
/// without yet diverging on data (matches the address-space clone's
/// "copy the region map byte-for-byte" semantics one level down).
pub fn clone_dir(
    memory: &mut dyn Memory,
    frames: &mut FrameAllocator,
    src: PageDirectory,
) -> Option<PageDirectory> {
    let dst = create(memory, frames)?;

    for slot in KERNEL_SPLIT_SLOT..SELF_MAP_SLOT {
        let entry = read_pte(memory, src.root, slot).ok()?;
        write_pte(memory, dst.root, slot, entry).ok()?;
    }

    for slot in 0..KERNEL_SPLIT_SLOT {
        let l1 = read_pte(memory, src.root, slot).ok()?;
        if l1 & PTE_VALID == 0 {
            continue;
        }
        let src_l0_pfn = Pfn::new(l1 >> 10);
        let dst_l0_pfn = frames.alloc_page()?;
        for i in 0..ENTRIES_PER_TABLE {
            let leaf = read_pte(memory, src_l0_pfn, i).ok()?;
            write_pte(memory, dst_l0_pfn, i, leaf).ok()?;
        }
        let new_l1 = (dst_l0_pfn.val() << 10) | (l1 & 0x3FF);
        write_pte(memory, dst.root, slot, new_l1).ok()?;
    }

    Some(dst)
}

/// Ensures a leaf table exists for `vaddr`'s upper index, allocating one if
/// missing, then writes the leaf entry. Overwrites without freeing the
/// previous mapping's frame — callers that care (e.g. `remove_map`) read it
/// back via [`translate`] first.
pub fn map(
    memory: &mut dyn Memory,
    frames: &mut FrameAllocator,
    dir: PageDirectory,
    vaddr: VirtAddr,
    paddr: PhysAddr,
    perms: Permissions,
) -> Option<()> {
    let l1_index = vpn1(vaddr);
    let mut l1 = read_pte(memory, dir.root, l1_index).ok()?;
    if l1 & PTE_VALID == 0 {
        let table_pfn = frames.alloc_page()?;
        zero_table(memory, table_pfn).ok()?;
        l1 = (table_pfn.val() << 10) | PTE_VALID | PTE_WRITE | PTE_USER;
        write_pte(memory, dir.root, l1_index, l1).ok()?;
    }
    let l0_pfn = Pfn::new(l1 >> 10);
    let leaf = (paddr.pfn().val() << 10) | pte_flags(perms);
    write_pte(memory, l0_pfn, vpn0(vaddr), leaf).ok()?;
    Some(())
}

/// Clears the leaf entry for `vaddr` if present, returning the PFN that was
/// mapped there so the caller can free it. If clearing the leaf leaves the
/// L0 table with no valid entries left, the table's own frame is freed and
/// the L1 entry pointing at it is zeroed — otherwise a directory that has
/// had every page of a slot unmapped would still hold a table frame no
/// `map`/`translate` call can ever reach again, and would not be
/// byte-equivalent to a directory that never touched that slot.
pub fn unmap(
    memory: &mut dyn Memory,
    frames: &mut FrameAllocator,
    dir: PageDirectory,
    vaddr: VirtAddr,
) -> Option<Pfn> {
    let l1_index = vpn1(vaddr);
    let l1 = read_pte(memory, dir.root, l1_index).ok()?;
    if l1 & PTE_VALID == 0 {
        return None;
    }
    let l0_pfn = Pfn::new(l1 >> 10);
    let leaf = read_pte(memory, l0_pfn, vpn0(vaddr)).ok()?;
    if leaf & PTE_VALID == 0 {
        return None;
    }
    write_pte(memory, l0_pfn, vpn0(vaddr), 0).ok()?;

    let table_now_empty = (0..ENTRIES_PER_TABLE).all(|i| {
        read_pte(memory, l0_pfn, i)
            .map(|entry| entry & PTE_VALID == 0)
            .unwrap_or(true)
    });
    if table_now_empty {
        write_pte(memory, dir.root, l1_index, 0).ok()?;
        let _ = frames.free_page(l0_pfn);
    }

    Some(Pfn::new(leaf >> 10))
}

/// Walks the directory, returning the physical address `vaddr` maps to.
pub fn translate(memory: &mut dyn Memory, dir: PageDirectory, vaddr: VirtAddr) -> Option<PhysAddr> {
    let l1 = read_pte(memory, dir.root, vpn1(vaddr)).ok()?;
    if l1 & PTE_VALID == 0 {
        return None;
    }
    let l0_pfn = Pfn::new(l1 >> 10);
    let leaf = read_pte(memory, l0_pfn, vpn0(vaddr)).ok()?;
    if leaf & PTE_VALID == 0 {
        return None;
    }
    let page_pfn = Pfn::new(leaf >> 10);
    Some(page_pfn.to_phys() + vaddr.page_offset())
}

/// Installs `dir` as the current MMU root. On the host-simulated substrate
/// this core runs against there is no real TLB to reprogram; this returns
/// the root PFN so the caller (the address space) can record it as "the
/// active directory" for its own bookkeeping and assertions.
pub fn activate(dir: PageDirectory) -> Pfn {
    dir.root
}
