//! Virtual memory spaces.
//!
//! The process model consumes address spaces as an opaque capability: map,
//! unmap, share, clone, destroy. [`MemorySpace`] keeps an ordered list of
//! mapped regions plus the break and stack pointers; actual paging is an
//! architecture collaborator outside this crate.

extern crate alloc;

use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

use crate::error::{KernelError, Result};

bitflags! {
    /// Protection bits of a mapped region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapProt: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

/// One mapped region of an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRegion {
    pub size: usize,
    pub phys_start: usize,
    pub virt_start: usize,
    pub prot: MapProt,
}

impl MappedRegion {
    pub fn contains(&self, vaddr: usize) -> bool {
        vaddr >= self.virt_start && vaddr < self.virt_start + self.size
    }

    pub fn overlaps(&self, other: &MappedRegion) -> bool {
        self.virt_start < other.virt_start + other.size
            && other.virt_start < self.virt_start + self.size
    }
}

/// Address space capability consumed by the process model.
pub trait AddressSpace: Send + Sync {
    fn map(&self, region: MappedRegion) -> Result<()>;
    fn unmap(&self, virt_start: usize) -> Result<MappedRegion>;
    /// Map one of this space's regions into `target` as well. Used to plant
    /// the signal trampoline into another process's view.
    fn share(&self, target: &dyn AddressSpace, virt_start: usize) -> Result<()>;
    fn destroy(&self);
    fn region_for(&self, vaddr: usize) -> Option<MappedRegion>;
}

pub struct MemorySpace {
    /// Regions ordered by virtual start address.
    regions: Mutex<Vec<MappedRegion>>,
    brk_base: AtomicUsize,
    brk: AtomicUsize,
    stack_pointer: AtomicUsize,
}

impl MemorySpace {
    pub fn new() -> Self {
        Self {
            regions: Mutex::new(Vec::new()),
            brk_base: AtomicUsize::new(0),
            brk: AtomicUsize::new(0),
            stack_pointer: AtomicUsize::new(0),
        }
    }

    /// Fork-time copy: duplicate the region list and break state.
    pub fn clone_space(&self) -> Self {
        Self {
            regions: Mutex::new(self.regions.lock().clone()),
            brk_base: AtomicUsize::new(self.brk_base.load(Ordering::Acquire)),
            brk: AtomicUsize::new(self.brk.load(Ordering::Acquire)),
            stack_pointer: AtomicUsize::new(self.stack_pointer.load(Ordering::Acquire)),
        }
    }

    pub fn set_brk_base(&self, base: usize) {
        self.brk_base.store(base, Ordering::Release);
        self.brk.store(base, Ordering::Release);
    }

    pub fn brk(&self) -> usize {
        self.brk.load(Ordering::Acquire)
    }

    pub fn set_brk(&self, brk: usize) -> Result<usize> {
        if brk < self.brk_base.load(Ordering::Acquire) {
            return Err(KernelError::InvalidArgument);
        }
        self.brk.store(brk, Ordering::Release);
        Ok(brk)
    }

    pub fn set_stack_pointer(&self, sp: usize) {
        self.stack_pointer.store(sp, Ordering::Release);
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer.load(Ordering::Acquire)
    }

    pub fn region_count(&self) -> usize {
        self.regions.lock().len()
    }

    /// Snapshot of the mapped regions, in virtual-address order.
    pub fn regions(&self) -> Vec<MappedRegion> {
        self.regions.lock().clone()
    }
}

impl Default for MemorySpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for MemorySpace {
    fn map(&self, region: MappedRegion) -> Result<()> {
        let mut regions = self.regions.lock();
        if regions.iter().any(|r| r.overlaps(&region)) {
            return Err(KernelError::AlreadyExists);
        }
        let pos = regions
            .iter()
            .position(|r| r.virt_start > region.virt_start)
            .unwrap_or(regions.len());
        regions.insert(pos, region);
        Ok(())
    }

    fn unmap(&self, virt_start: usize) -> Result<MappedRegion> {
        let mut regions = self.regions.lock();
        let pos = regions
            .iter()
            .position(|r| r.virt_start == virt_start)
            .ok_or(KernelError::NoSuchEntry)?;
        Ok(regions.remove(pos))
    }

    fn share(&self, target: &dyn AddressSpace, virt_start: usize) -> Result<()> {
        let region = self
            .region_for(virt_start)
            .ok_or(KernelError::NoSuchEntry)?;
        target.map(region)
    }

    fn destroy(&self) {
        self.regions.lock().clear();
        self.brk.store(0, Ordering::Release);
        self.brk_base.store(0, Ordering::Release);
        self.stack_pointer.store(0, Ordering::Release);
    }

    fn region_for(&self, vaddr: usize) -> Option<MappedRegion> {
        self.regions.lock().iter().find(|r| r.contains(vaddr)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(virt: usize, size: usize) -> MappedRegion {
        MappedRegion {
            size,
            phys_start: 0x8000_0000 + virt,
            virt_start: virt,
            prot: MapProt::READ | MapProt::WRITE,
        }
    }

    #[test]
    fn map_keeps_regions_ordered_and_disjoint() {
        let space = MemorySpace::new();
        space.map(region(0x2000, 0x1000)).unwrap();
        space.map(region(0x1000, 0x1000)).unwrap();
        assert_eq!(
            space.map(region(0x1800, 0x1000)),
            Err(KernelError::AlreadyExists)
        );
        assert_eq!(space.region_count(), 2);
        assert!(space.region_for(0x1234).is_some());
        assert!(space.region_for(0x3000).is_none());
    }

    #[test]
    fn share_maps_into_target_space() {
        let a = MemorySpace::new();
        let b = MemorySpace::new();
        a.map(region(0x7000, 0x1000)).unwrap();
        a.share(&b, 0x7000).unwrap();
        assert_eq!(b.region_for(0x7000), a.region_for(0x7000));
    }

    #[test]
    fn clone_space_copies_regions() {
        let a = MemorySpace::new();
        a.map(region(0x4000, 0x1000)).unwrap();
        a.set_brk_base(0x10000);
        let b = a.clone_space();
        assert_eq!(b.region_count(), 1);
        assert_eq!(b.brk(), 0x10000);
        // Mutating the clone leaves the original alone.
        b.unmap(0x4000).unwrap();
        assert_eq!(a.region_count(), 1);
    }
}
