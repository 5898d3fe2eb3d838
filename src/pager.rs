use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use memory::PhysicalMemory;
use swap::SwapSpace;

use crate::frame_table::{FrameManager, Occupant};
use crate::loader::Executable;
use crate::page_table::{Residency, SharedAddressSpace};

#[derive(Debug, PartialEq, Eq)]
pub enum FaultError {
    /// The faulting virtual page is outside the process's address space.
    BadVpn,
}

/// The kernel's physical-memory manager: the one value that owns the
/// physical buffer, the frame table, and the swap space, shared by reference
/// with every process's fault handler. Out-of-physical-memory is resolved
/// here by eviction and never surfaces to callers.
#[derive(Clone)]
pub struct Pager<const PAGE_SIZE: usize, const FRAME_COUNT: usize> {
    memory: PhysicalMemory<PAGE_SIZE, FRAME_COUNT>,
    frames: FrameManager<FRAME_COUNT>,
    swap: SwapSpace<PAGE_SIZE>,
    evictions: Arc<AtomicU64>,
}

impl<const PAGE_SIZE: usize, const FRAME_COUNT: usize> Pager<PAGE_SIZE, FRAME_COUNT> {
    pub fn new(swap_name: &str) -> Result<Self, std::io::Error> {
        Ok(Self {
            memory: PhysicalMemory::new(),
            frames: FrameManager::new(),
            swap: SwapSpace::create(swap_name)?,
            evictions: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn memory(&self) -> &PhysicalMemory<PAGE_SIZE, FRAME_COUNT> {
        &self.memory
    }

    pub fn frames(&self) -> &FrameManager<FRAME_COUNT> {
        &self.frames
    }

    pub fn swap(&self) -> &SwapSpace<PAGE_SIZE> {
        &self.swap
    }

    /// Total evictions performed since the pager was built.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Resolves a translation miss on `vpn`. A no-op when the entry is
    /// already resident. Allocates a frame (evicting when the pool is empty),
    /// fills it from the page's origin (swap slot, executable section, or
    /// zero-fill for the stack/argument region), and binds it.
    pub fn resolve_fault(
        &self,
        table: &SharedAddressSpace,
        exe: &Executable<PAGE_SIZE>,
        vpn: u32,
    ) -> Result<(), FaultError> {
        {
            let space = table.lock().unwrap();
            let entry = space.entry(vpn).ok_or(FaultError::BadVpn)?;
            if matches!(entry.residency, Residency::Resident(_)) {
                return Ok(());
            }
        }

        // One successful eviction frees exactly one frame, so this loop
        // always terminates. The table lock is never held here: eviction may
        // need to lock this very table to take one of our other pages.
        let frame = loop {
            match self.frames.allocate() {
                Some(frame) => break frame,
                None => self.evict_one(),
            }
        };

        // The frame is reserved: off the free list, bound to nobody. Safe to
        // fill without pinning.
        let mut space = table.lock().unwrap();
        let entry = space.entry_mut(vpn).ok_or(FaultError::BadVpn)?;
        match entry.residency {
            Residency::Resident(_) => {
                // Nothing to do after all; somebody resolved it while we were
                // allocating. Give the frame back.
                drop(space);
                self.frames.release(frame);
                return Ok(());
            }
            Residency::Swapped(slot) => {
                let mut block = vec![0; PAGE_SIZE];
                self.swap
                    .read_slot(slot, &mut block)
                    .expect("swap slot vanished under a page table entry");
                self.memory
                    .write_frame(frame, &block)
                    .expect("allocated frame out of bounds");
                self.swap.free_slot(slot);
                debug!("vpn {} swapped in from slot {} to frame {}", vpn, slot, frame);
            }
            Residency::Unbacked => {
                if let Some(section) = exe.section_of(vpn) {
                    let block = section.load_page(vpn - section.first_vpn());
                    self.memory
                        .write_frame(frame, &*block)
                        .expect("allocated frame out of bounds");
                    entry.read_only = section.is_read_only();
                    debug!("vpn {} loaded from the executable into frame {}", vpn, frame);
                } else {
                    // Stack or argument page: first touch is a zero-fill,
                    // never a load.
                    self.memory
                        .zero_frame(frame)
                        .expect("allocated frame out of bounds");
                    debug!("vpn {} zero-filled in frame {}", vpn, frame);
                }
            }
        }
        entry.residency = Residency::Resident(frame);
        entry.used = true;
        // Writable until proven otherwise: anything not read-only must be
        // swapped rather than discarded once evicted.
        if !entry.read_only {
            entry.dirty = true;
        }
        self.frames.bind(
            frame,
            Occupant {
                table: Arc::clone(table),
                vpn,
            },
        );
        Ok(())
    }

    /// Reclaims exactly one frame into the free pool. The victim comes out
    /// of `select_victim` already reserved, so the copy-out below can never
    /// race a sweep, a pin, or a nested fault re-selecting it.
    pub fn evict_one(&self) {
        let (frame, occupant) = self.frames.select_victim();
        let mut space = occupant.table.lock().unwrap();
        match space.entry_mut(occupant.vpn) {
            Some(entry) if entry.residency == Residency::Resident(frame) => {
                if entry.dirty {
                    let slot = self.swap.allocate_slot();
                    let block = self
                        .memory
                        .read_frame(frame)
                        .expect("victim frame out of bounds");
                    self.swap
                        .write_slot(slot, &*block)
                        .expect("allocated swap slot out of bounds");
                    entry.residency = Residency::Swapped(slot);
                    info!(
                        "evicted dirty vpn {} from frame {} to swap slot {}",
                        occupant.vpn, frame, slot
                    );
                } else {
                    // Clean pages are reconstructible (executable bytes or
                    // zero fill); no slot is consumed.
                    entry.residency = Residency::Unbacked;
                    info!("discarded clean vpn {} from frame {}", occupant.vpn, frame);
                }
                entry.dirty = false;
                entry.used = false;
            }
            _ => {
                // The owner unloaded (or re-faulted the page elsewhere) while
                // the frame sat reserved. The page is gone; there is nothing
                // to copy out, only a frame to reclaim.
                info!(
                    "victim vpn {} released before copy-out, reclaiming frame {}",
                    occupant.vpn, frame
                );
            }
        }
        drop(space);
        self.frames.release(frame);
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }
}
