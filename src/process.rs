use log::info;

use crate::loader::Executable;
use crate::page_table::{Residency, SharedAddressSpace};
use crate::pager::{FaultError, Pager};

/// A demand-paged user process: its executable image, its address space, and
/// a handle on the shared pager. Nothing is resident at creation; every page
/// arrives through a fault.
pub struct Process<const PAGE_SIZE: usize, const FRAME_COUNT: usize> {
    pid: u32,
    exe: Executable<PAGE_SIZE>,
    table: SharedAddressSpace,
    pager: Pager<PAGE_SIZE, FRAME_COUNT>,
}

impl<const PAGE_SIZE: usize, const FRAME_COUNT: usize> Process<PAGE_SIZE, FRAME_COUNT> {
    pub(crate) fn new(
        pid: u32,
        exe: Executable<PAGE_SIZE>,
        table: SharedAddressSpace,
        pager: Pager<PAGE_SIZE, FRAME_COUNT>,
    ) -> Self {
        Self {
            pid,
            exe,
            table,
            pager,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn num_pages(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    pub fn resident_pages(&self) -> usize {
        self.table.lock().unwrap().resident_count()
    }

    /// The page-fault entry point: resolves a translation miss on `vpn`, or
    /// reports the fatal condition of a vpn outside the address space.
    pub fn handle_fault(&self, vpn: u32) -> Result<(), FaultError> {
        self.pager.resolve_fault(&self.table, &self.exe, vpn)
    }

    /// Reads virtual memory into `buf`. Stops early and reports a partial
    /// transfer on the first out-of-range address; never raises a fault for
    /// one.
    pub fn read(&self, vaddr: u64, buf: &mut [u8]) -> usize {
        let length = buf.len();
        let mut amount = 0;
        while amount < length {
            let addr = vaddr as usize + amount;
            let Some((frame, offset, rest)) =
                self.pin_for_copy(addr, length - amount, false)
            else {
                break;
            };
            let paddr = frame as u64 * PAGE_SIZE as u64 + offset as u64;
            self.pager
                .memory()
                .read(paddr, &mut buf[amount..amount + rest])
                .expect("pinned frame out of bounds");
            self.pager.frames().unpin(frame);
            amount += rest;
        }
        amount
    }

    /// Writes `data` into virtual memory. Same partial-transfer contract as
    /// `read`.
    pub fn write(&self, vaddr: u64, data: &[u8]) -> usize {
        let length = data.len();
        let mut amount = 0;
        while amount < length {
            let addr = vaddr as usize + amount;
            let Some((frame, offset, rest)) =
                self.pin_for_copy(addr, length - amount, true)
            else {
                break;
            };
            let paddr = frame as u64 * PAGE_SIZE as u64 + offset as u64;
            self.pager
                .memory()
                .write(paddr, &data[amount..amount + rest])
                .expect("pinned frame out of bounds");
            self.pager.frames().unpin(frame);
            amount += rest;
        }
        amount
    }

    /// Resolves and pins the page under `addr` for one raw copy. Returns the
    /// frame, the offset into it, and how many bytes fit before the page
    /// boundary; `None` when `addr` is out of range. The pin is held for
    /// exactly the copy that follows, never across a blocking call.
    fn pin_for_copy(&self, addr: usize, remaining: usize, for_write: bool) -> Option<(u32, usize, usize)> {
        if addr >= self.num_pages() * PAGE_SIZE {
            return None;
        }
        let vpn = (addr / PAGE_SIZE) as u32;
        let offset = addr % PAGE_SIZE;
        let rest = usize::min(PAGE_SIZE - offset, remaining);
        loop {
            // Bounds were checked above, so the fault cannot fail.
            self.handle_fault(vpn).ok()?;
            let mut space = self.table.lock().unwrap();
            let entry = space.entry_mut(vpn)?;
            if let Residency::Resident(frame) = entry.residency {
                if self.pager.frames().try_pin(frame, &self.table, vpn) {
                    entry.used = true;
                    if for_write {
                        entry.dirty = true;
                    }
                    return Some((frame, offset, rest));
                }
            }
            // An eviction reserved the frame between fault resolution and
            // the pin; drop the table lock and fault again.
        }
    }

    /// Releases everything the address space holds: resident frames back to
    /// the free pool, swap slots back to the swap free list.
    pub fn unload(&self) {
        let mut space = self.table.lock().unwrap();
        for entry in space.entries_mut() {
            match entry.residency {
                Residency::Resident(frame) => {
                    // A concurrent eviction may have reserved the frame; it
                    // will be freed when that eviction completes.
                    self.pager.frames().release_owned(frame, &self.table, entry.vpn);
                }
                Residency::Swapped(slot) => self.pager.swap().free_slot(slot),
                Residency::Unbacked => {}
            }
            entry.residency = Residency::Unbacked;
            entry.dirty = false;
            entry.used = false;
        }
        info!("process {} unloaded", self.pid);
    }
}

impl<const PAGE_SIZE: usize, const FRAME_COUNT: usize> Drop for Process<PAGE_SIZE, FRAME_COUNT> {
    fn drop(&mut self) {
        self.unload();
    }
}
