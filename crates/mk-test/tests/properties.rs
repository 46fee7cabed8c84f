//! Property-based tests over the region map (C3) and physical frame
//! allocator (C1) — these two are pure enough in-memory models that
//! `proptest` can drive them directly with random operation sequences,
//! instead of needing a synthetic model to compare against.

use mk_arch::{PhysAddr, VirtAddr, PAGE_SIZE};
use mk_kernel::memory::{AddressRegionMap, FrameAllocator, Permissions, RegionDescriptor};
use proptest::prelude::*;

fn arb_region(vbase_page: u32, pbase_page: u32, size: u32) -> RegionDescriptor {
    RegionDescriptor::new(
        VirtAddr::new(vbase_page * PAGE_SIZE),
        PhysAddr::new(pbase_page * PAGE_SIZE),
        size.max(1),
        Permissions::READ | Permissions::WRITE,
    )
}

proptest! {
    /// Invariant 1: inserting a sequence of non-overlapping-by-construction
    /// regions (disjoint vbase "slots") always leaves the map sorted and
    /// non-overlapping.
    #[test]
    fn insert_sequence_keeps_map_well_formed(
        sizes in prop::collection::vec(1u32..8, 1..12),
    ) {
        let mut map = AddressRegionMap::new();
        let mut vpage = 0u32;
        for (i, size) in sizes.iter().enumerate() {
            let region = arb_region(vpage, i as u32 * 64, *size);
            if map.insert(region).is_ok() {
                prop_assert!(map.is_well_formed());
            }
            vpage += size + 1; // always leave a gap so this batch never overlaps
        }
    }

    /// Invariant 3: insert then remove of the same entry restores the map
    /// to having no entries — "byte-equivalent to its pre-state" for an
    /// otherwise-empty map.
    #[test]
    fn insert_then_remove_is_a_no_op(
        vpage in 0u32..1000,
        ppage in 0u32..1000,
        size in 1u32..8,
    ) {
        let mut map = AddressRegionMap::new();
        let region = arb_region(vpage, ppage, size);
        map.insert(region).unwrap();
        map.remove(region).unwrap();
        prop_assert_eq!(map.used(), 0);
        prop_assert!(map.is_well_formed());
    }

    /// Carving a sub-range out of a single covering region never changes
    /// total page coverage and always leaves the map well formed (S5
    /// generalized to arbitrary offsets/sizes within the covering region).
    #[test]
    fn carve_preserves_total_coverage(
        region_size in 4u32..32,
        offset in 0u32..4,
        carve_size in 1u32..4,
    ) {
        prop_assume!(offset + carve_size < region_size);
        let mut map = AddressRegionMap::new();
        let whole = arb_region(0, 0, region_size);
        map.insert(whole).unwrap();

        let requested = RegionDescriptor::new(
            VirtAddr::new(offset * PAGE_SIZE),
            PhysAddr::new(0),
            carve_size,
            Permissions::READ | Permissions::WRITE,
        );
        let carved = map.carve(requested).unwrap();

        prop_assert_eq!(carved.size, carve_size);
        prop_assert!(map.is_well_formed());
        let total: u32 = map.iter().map(|e| e.size).sum();
        prop_assert_eq!(total, region_size);
    }

    /// Invariant 7: every PFN the allocator hands out is unique and goes
    /// back to "free" exactly once on a matching free_page — alloc/free
    /// sequences never lose or duplicate a frame.
    #[test]
    fn alloc_then_free_round_trips_frame_count(
        frame_count in 8u32..256,
        alloc_count in 1usize..8,
    ) {
        prop_assume!((alloc_count as u32) <= frame_count);
        let mut frames = FrameAllocator::new(frame_count);
        let before = frames.free_count();

        let mut pfns = Vec::new();
        for _ in 0..alloc_count {
            pfns.push(frames.alloc_page().expect("enough frames were requested"));
        }
        prop_assert_eq!(frames.free_count(), before - alloc_count as u32);

        let mut unique = pfns.clone();
        unique.sort_by_key(|p| p.val());
        unique.dedup_by_key(|p| p.val());
        prop_assert_eq!(unique.len(), pfns.len(), "allocator handed out a duplicate PFN");

        for pfn in pfns {
            frames.free_page(pfn).unwrap();
        }
        prop_assert_eq!(frames.free_count(), before);
    }
}
