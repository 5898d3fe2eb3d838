use std::{
    collections::VecDeque,
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    sync::{Arc, Mutex},
};

use log::info;

/// Number of free slots the backing store starts with.
pub const INITIAL_SLOTS: usize = 16;
/// Number of slots added whenever the free list runs dry.
pub const GROWTH_SLOTS: usize = 16;

#[derive(Debug, PartialEq)]
pub enum SwapError {
    IncorrectSlotSize,
    OverCapacity,
}

struct SlotPool {
    free: VecDeque<u32>,
    total: u32,
}

/// The swap backing store: a file organized into fixed-size slots, each
/// holding one evicted page image, plus a growable free-slot list. Slot `i`
/// occupies bytes `[i * SLOT_SIZE, (i + 1) * SLOT_SIZE)`. The pool never
/// shrinks; exhaustion grows the file by `GROWTH_SLOTS` slots.
#[derive(Clone)]
pub struct SwapSpace<const SLOT_SIZE: usize> {
    file_name: String,
    file: Arc<Mutex<File>>,
    pool: Arc<Mutex<SlotPool>>,
}

pub fn make_name(name: &str) -> String {
    let name = name.replace("-", "_");
    let mut swap_name = String::from("SWAP_FILE_");
    swap_name.push_str(&name);
    swap_name
}

impl<const SLOT_SIZE: usize> SwapSpace<SLOT_SIZE> {
    /// Opens a fresh backing store. Any previous content under the same name
    /// is discarded; the swap layout never survives a kernel restart.
    pub fn create(name: &str) -> Result<Self, std::io::Error> {
        let file = File::options()
            .truncate(true)
            .write(true)
            .read(true)
            .create(true)
            .open(make_name(name))?;
        file.set_len((INITIAL_SLOTS * SLOT_SIZE) as u64)?;
        let pool = SlotPool {
            free: (0..INITIAL_SLOTS as u32).collect(),
            total: INITIAL_SLOTS as u32,
        };
        Ok(Self {
            file_name: String::from(name),
            file: Arc::new(Mutex::new(file)),
            pool: Arc::new(Mutex::new(pool)),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Pops a free slot, growing the store first if none is left. Growth
    /// cannot fail short of the disk itself failing, which is fatal.
    pub fn allocate_slot(&self) -> u32 {
        let mut pool = self.pool.lock().unwrap();
        if pool.free.is_empty() {
            let new_total = pool.total + GROWTH_SLOTS as u32;
            info!(
                "Swap space exhausted, growing from {} to {} slots",
                pool.total, new_total
            );
            let file = self.file.lock().unwrap();
            file.set_len(new_total as u64 * SLOT_SIZE as u64)
                .expect("failed to grow the swap file");
            for slot in pool.total..new_total {
                pool.free.push_back(slot);
            }
            pool.total = new_total;
        }
        pool.free.pop_front().unwrap()
    }

    pub fn free_slot(&self, slot: u32) {
        let mut pool = self.pool.lock().unwrap();
        assert!(slot < pool.total, "freed slot {} was never allocated", slot);
        debug_assert!(
            !pool.free.contains(&slot),
            "slot {} freed while already free",
            slot
        );
        pool.free.push_back(slot);
    }

    pub fn read_slot(&self, slot: u32, buf: &mut [u8]) -> Result<(), SwapError> {
        let total = self.slot_count();
        let mut file = self.file.lock().unwrap();
        info!("Start reading slot[{}]", slot);
        if buf.len() != SLOT_SIZE {
            return Err(SwapError::IncorrectSlotSize);
        } else if slot >= total {
            return Err(SwapError::OverCapacity);
        }
        file.seek(SeekFrom::Start(slot as u64 * SLOT_SIZE as u64))
            .unwrap();
        file.read_exact(buf).unwrap();
        info!("Done reading slot[{}]", slot);
        Ok(())
    }

    pub fn write_slot(&self, slot: u32, block: &[u8]) -> Result<(), SwapError> {
        let total = self.slot_count();
        let mut file = self.file.lock().unwrap();
        info!("Start writing slot[{}]", slot);
        if block.len() != SLOT_SIZE {
            return Err(SwapError::IncorrectSlotSize);
        } else if slot >= total {
            return Err(SwapError::OverCapacity);
        }
        file.seek(SeekFrom::Start(slot as u64 * SLOT_SIZE as u64))
            .unwrap();
        file.write_all(block).unwrap();
        info!("Done writing slot[{}]", slot);
        Ok(())
    }

    pub fn slot_count(&self) -> u32 {
        self.pool.lock().unwrap().total
    }

    pub fn free_count(&self) -> usize {
        self.pool.lock().unwrap().free.len()
    }
}
