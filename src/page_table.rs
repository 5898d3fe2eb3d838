use std::sync::{Arc, Mutex};

/// Where a virtual page currently lives. Exactly one of: bound to a physical
/// frame, parked in a swap slot, or not backed by anything yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Resident(u32),
    Swapped(u32),
    Unbacked,
}

#[derive(Debug, Clone)]
pub struct PageTableEntry {
    pub vpn: u32,
    pub residency: Residency,
    pub dirty: bool,
    pub used: bool,
    pub read_only: bool,
}

impl PageTableEntry {
    fn new(vpn: u32) -> Self {
        PageTableEntry {
            vpn,
            residency: Residency::Unbacked,
            dirty: false,
            used: false,
            read_only: false,
        }
    }
}

/// One process's page table: a fixed-length sequence of entries indexed by
/// virtual page number. The length is set once, when the process is built.
pub struct AddressSpace {
    entries: Vec<PageTableEntry>,
}

/// Handle under which an address space is shared between its owning process
/// and the global frame table.
pub type SharedAddressSpace = Arc<Mutex<AddressSpace>>;

impl AddressSpace {
    pub fn new(num_pages: usize) -> Self {
        let entries = (0..num_pages as u32).map(PageTableEntry::new).collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, vpn: u32) -> Option<&PageTableEntry> {
        self.entries.get(vpn as usize)
    }

    pub fn entry_mut(&mut self, vpn: u32) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(vpn as usize)
    }

    pub fn frame_of(&self, vpn: u32) -> Option<u32> {
        match self.entry(vpn)?.residency {
            Residency::Resident(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn resident_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.residency, Residency::Resident(_)))
            .count()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_space_is_unbacked() {
        let space = AddressSpace::new(12);
        assert_eq!(space.len(), 12);
        assert_eq!(space.resident_count(), 0);
        for entry in space.entries() {
            assert_eq!(entry.residency, Residency::Unbacked);
            assert!(!entry.dirty);
            assert!(!entry.used);
            assert!(!entry.read_only);
        }
    }

    #[test]
    fn residency_transitions() {
        let mut space = AddressSpace::new(4);
        assert_eq!(space.frame_of(2), None);

        let entry = space.entry_mut(2).unwrap();
        entry.residency = Residency::Resident(7);
        entry.dirty = true;
        assert_eq!(space.frame_of(2), Some(7));
        assert_eq!(space.resident_count(), 1);

        let entry = space.entry_mut(2).unwrap();
        entry.residency = Residency::Swapped(3);
        assert_eq!(space.frame_of(2), None);
        assert_eq!(space.resident_count(), 0);
    }

    #[test]
    fn out_of_range_vpn() {
        let mut space = AddressSpace::new(4);
        assert!(space.entry(4).is_none());
        assert!(space.entry_mut(4).is_none());
        assert!(space.entry(3).is_some());
    }
}
