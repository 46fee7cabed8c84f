pub mod address_space;
pub mod frame;
pub mod paging;
pub mod region;

pub use address_space::{AddressSpace, AddressSpaceTable};
pub use frame::FrameAllocator;
pub use paging::PageDirectory;
pub use region::{AddressRegionMap, Permissions, RegionDescriptor, ADDR_MAP_ENTRIES_PER_PAGE};
