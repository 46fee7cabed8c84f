use bitflags::bitflags;
use mk_arch::{PhysAddr, VirtAddr, PAGE_SIZE};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        const SUPERVISOR = 1 << 3;
    }
}

/// One entry of an [`AddressRegionMap`]: a contiguous run of pages mapped
/// virt→phys linearly with a single set of permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    pub vbase: VirtAddr,
    pub pbase: PhysAddr,
    pub size: u32,
    pub perms: Permissions,
}

impl RegionDescriptor {
    pub fn new(vbase: VirtAddr, pbase: PhysAddr, size: u32, perms: Permissions) -> Self {
        debug_assert!(size >= 1);
        debug_assert!(vbase.is_page_aligned());
        Self {
            vbase,
            pbase,
            size,
            perms,
        }
    }

    fn vend(&self) -> u32 {
        self.vbase.val() + self.size * PAGE_SIZE
    }

    fn contains(&self, vaddr: VirtAddr) -> bool {
        vaddr.val() >= self.vbase.val() && vaddr.val() < self.vend()
    }

    fn overlaps(&self, other: &RegionDescriptor) -> bool {
        self.vbase.val() < other.vend() && other.vbase.val() < self.vend()
    }
}

/// The capacity of one [`AddressRegionMap`]: however many region
/// descriptors fit in a single page of backing memory.
pub const ADDR_MAP_ENTRIES_PER_PAGE: usize =
    (PAGE_SIZE as usize) / core::mem::size_of::<RegionDescriptor>();

/// Fixed-capacity sorted array of region descriptors for one address
/// space. Every mutator preserves the sort-by-`vbase`, no-overlap
/// invariant or fails leaving the map untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRegionMap {
    entries: Vec<RegionDescriptor>,
}

impl AddressRegionMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(ADDR_MAP_ENTRIES_PER_PAGE),
        }
    }

    pub fn used(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        ADDR_MAP_ENTRIES_PER_PAGE
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionDescriptor> {
        self.entries.iter()
    }

    /// Inserts `entry` keeping the array sorted by `vbase`. Fails, without
    /// mutating the map, if it is full or `entry` overlaps an existing one.
    pub fn insert(&mut self, entry: RegionDescriptor) -> Result<(), InsertError> {
        if self.entries.len() == ADDR_MAP_ENTRIES_PER_PAGE {
            return Err(InsertError::Full);
        }
        let pos = self
            .entries
            .iter()
            .position(|e| e.vbase.val() > entry.vbase.val())
            .unwrap_or(self.entries.len());
        if self.entries.iter().any(|e| e.overlaps(&entry)) {
            return Err(InsertError::Overlap);
        }
        self.entries.insert(pos, entry);
        Ok(())
    }

    /// Returns the unique entry containing `vaddr`, if any.
    pub fn lookup(&self, vaddr: VirtAddr) -> Option<&RegionDescriptor> {
        self.entries.iter().find(|e| e.contains(vaddr))
    }

    fn index_of(&self, entry: &RegionDescriptor) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.vbase == entry.vbase && e.size == entry.size)
    }

    /// Reduces `entry` to `offset_pages` pages and inserts a sibling
    /// covering the remainder; both inherit `entry`'s permissions. Returns
    /// the newly created sibling.
    pub fn split(
        &mut self,
        entry: RegionDescriptor,
        offset_pages: u32,
    ) -> Result<RegionDescriptor, SplitError> {
        if offset_pages == 0 || offset_pages >= entry.size {
            return Err(SplitError::BadOffset);
        }
        let idx = self.index_of(&entry).ok_or(SplitError::NotFound)?;
        let remainder = RegionDescriptor::new(
            entry.vbase + offset_pages * PAGE_SIZE,
            entry.pbase + offset_pages * PAGE_SIZE,
            entry.size - offset_pages,
            entry.perms,
        );
        self.entries[idx].size = offset_pages;
        let insert_at = idx + 1;
        self.entries.insert(insert_at, remainder);
        Ok(remainder)
    }

    /// Materializes `requested`'s virtual range as its own entry, splitting
    /// the covering entry on one or both sides as needed. Fails if no
    /// single entry fully contains `requested`'s range.
    pub fn carve(&mut self, requested: RegionDescriptor) -> Result<RegionDescriptor, CarveError> {
        let req_start = requested.vbase.val();
        let req_end = requested.vend();

        let covering = self
            .entries
            .iter()
            .find(|e| req_start >= e.vbase.val() && req_end <= e.vend())
            .copied()
            .ok_or(CarveError::NoCovering)?;

        let mut current = covering;

        if req_start > current.vbase.val() {
            let offset = (req_start - current.vbase.val()) / PAGE_SIZE;
            current = self
                .split(current, offset)
                .map_err(|_| CarveError::NoCovering)?;
        }

        if current.vend() > req_end {
            let offset = (req_end - current.vbase.val()) / PAGE_SIZE;
            let _tail = self
                .split(current, offset)
                .map_err(|_| CarveError::NoCovering)?;
            current.size = offset;
        }

        Ok(current)
    }

    /// Removes `entry`, shifting the tail down. O(n).
    pub fn remove(&mut self, entry: RegionDescriptor) -> Result<(), RemoveError> {
        let idx = self.index_of(&entry).ok_or(RemoveError::NotFound)?;
        self.entries.remove(idx);
        Ok(())
    }

    /// True iff entries are strictly sorted by `vbase` and no two overlap —
    /// the invariant every mutator must preserve.
    pub fn is_well_formed(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| w[0].vend() <= w[1].vbase.val())
    }
}

impl Default for AddressRegionMap {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    Full,
    Overlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitError {
    BadOffset,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarveError {
    NoCovering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveError {
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(vbase: u32, pbase: u32, size: u32) -> RegionDescriptor {
        RegionDescriptor::new(
            VirtAddr::new(vbase),
            PhysAddr::new(pbase),
            size,
            Permissions::READ | Permissions::WRITE,
        )
    }

    #[test]
    fn insert_rejects_overlap() {
        let mut map = AddressRegionMap::new();
        map.insert(region(0x1000, 0, 4)).unwrap();
        assert_eq!(
            map.insert(region(0x2000, 0x4000, 4)),
            Err(InsertError::Overlap)
        );
    }

    #[test]
    fn carve_splits_on_both_sides() {
        let mut map = AddressRegionMap::new();
        map.insert(region(0x1000_0000, 0x20_0000, 16)).unwrap();
        let carved = map
            .carve(region(0x1000_4000, 0, 4))
            .expect("carve should succeed");
        assert_eq!(carved.vbase.val(), 0x1000_4000);
        assert_eq!(carved.size, 4);
        assert_eq!(map.used(), 3);
        assert!(map.is_well_formed());

        let total: u32 = map.iter().map(|e| e.size).sum();
        assert_eq!(total, 16);
    }

    #[test]
    fn remove_then_reinsert_restores_map() {
        let mut map = AddressRegionMap::new();
        let e = region(0x1000, 0, 4);
        map.insert(e).unwrap();
        map.remove(e).unwrap();
        assert_eq!(map.used(), 0);
    }

    use proptest::prelude::*;

    proptest! {
        /// Non-overlapping inserts in arbitrary order always leave the map
        /// sorted by vbase with no overlap, whatever order they land in.
        #[test]
        fn disjoint_inserts_in_any_order_stay_well_formed(
            mut order in prop::collection::vec(0usize..6, 6),
        ) {
            order.sort();
            order.dedup();
            let mut map = AddressRegionMap::new();
            for slot in &order {
                map.insert(region((*slot as u32) * 0x10_000, (*slot as u32) * 0x1000, 4)).unwrap();
            }
            prop_assert!(map.is_well_formed());
            prop_assert_eq!(map.used(), order.len());
        }
    }
}
