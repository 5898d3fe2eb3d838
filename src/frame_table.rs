use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use log::debug;

use crate::page_table::SharedAddressSpace;

/// Back-reference from a physical frame to the page currently resident in it.
#[derive(Clone)]
pub struct Occupant {
    pub table: SharedAddressSpace,
    pub vpn: u32,
}

#[derive(Default)]
struct FrameTableEntry {
    occupant: Option<Occupant>,
    pinned: bool,
    used: bool,
}

struct FrameState {
    entries: Vec<FrameTableEntry>,
    free: VecDeque<u32>,
    hand: usize,
}

/// The global frame table: one entry per physical frame (the inverted page
/// table), the free frame pool, and the clock hand, all under one lock. The
/// pin count lives under a second lock paired with the condition variable
/// that eviction sleeps on when every frame is pinned.
///
/// A frame is in exactly one of three states: on the free list, bound to an
/// occupant, or reserved (neither) while a fault or eviction is moving its
/// bytes. The clock sweep only ever considers bound, unpinned frames.
#[derive(Clone)]
pub struct FrameManager<const FRAME_COUNT: usize> {
    state: Arc<Mutex<FrameState>>,
    pins: Arc<(Mutex<usize>, Condvar)>,
}

impl<const FRAME_COUNT: usize> FrameManager<FRAME_COUNT> {
    pub fn new() -> Self {
        let mut entries = Vec::with_capacity(FRAME_COUNT);
        for _ in 0..FRAME_COUNT {
            entries.push(FrameTableEntry::default());
        }
        let state = FrameState {
            entries,
            free: (0..FRAME_COUNT as u32).collect(),
            hand: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            pins: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    /// Takes a frame off the free pool. `None` is not an error: it tells the
    /// caller to evict. The returned frame is reserved for the caller until
    /// it is either bound or released.
    pub fn allocate(&self) -> Option<u32> {
        let mut state = self.state.lock().unwrap();
        let frame = state.free.pop_front();
        if frame.is_none() {
            debug!("No free frames");
        }
        frame
    }

    /// Returns a frame to the free pool and clears its table entry.
    pub fn release(&self, frame: u32) {
        let mut state = self.state.lock().unwrap();
        let entry = &mut state.entries[frame as usize];
        assert!(!entry.pinned, "released frame {} is pinned", frame);
        entry.occupant = None;
        entry.used = false;
        debug_assert!(
            !state.free.contains(&frame),
            "frame {} released while already free",
            frame
        );
        state.free.push_back(frame);
    }

    /// Records residency of a page in a frame the caller allocated earlier.
    pub fn bind(&self, frame: u32, occupant: Occupant) {
        let mut state = self.state.lock().unwrap();
        let entry = &mut state.entries[frame as usize];
        assert!(entry.occupant.is_none(), "frame {} is already bound", frame);
        entry.occupant = Some(occupant);
        entry.pinned = false;
        entry.used = true;
    }

    /// Pins a frame against eviction, but only if it still holds the given
    /// page. Fails when an eviction reserved the frame in the meantime; the
    /// caller then resolves the fault again.
    pub fn try_pin(&self, frame: u32, table: &SharedAddressSpace, vpn: u32) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            let entry = &mut state.entries[frame as usize];
            match &entry.occupant {
                Some(occupant) if Arc::ptr_eq(&occupant.table, table) && occupant.vpn == vpn => {
                    assert!(!entry.pinned, "frame {} pinned twice", frame);
                    entry.pinned = true;
                    entry.used = true;
                }
                _ => return false,
            }
        }
        let (lock, _) = &*self.pins;
        let mut pinned = lock.lock().unwrap();
        *pinned += 1;
        assert!(*pinned <= FRAME_COUNT, "pin count exceeds frame count");
        true
    }

    /// Clears the pin and wakes any eviction sweep waiting for a candidate.
    pub fn unpin(&self, frame: u32) {
        {
            let mut state = self.state.lock().unwrap();
            let entry = &mut state.entries[frame as usize];
            assert!(entry.pinned, "frame {} is not pinned", frame);
            entry.pinned = false;
        }
        let (lock, cv) = &*self.pins;
        let mut pinned = lock.lock().unwrap();
        *pinned -= 1;
        cv.notify_all();
    }

    /// Clock / second-chance sweep. Advances the global hand; a bound,
    /// unpinned frame with `used` set gets a second chance (`used` cleared);
    /// the first bound, unpinned frame found with `used` already clear is the
    /// victim. The victim's occupant is taken out under the lock before this
    /// returns, so the frame is reserved and no concurrent sweep or pin can
    /// touch it while its bytes are copied out.
    ///
    /// Blocks on the unpinned condition variable whenever every frame is
    /// pinned, resuming the sweep after each wake-up.
    pub fn select_victim(&self) -> (u32, Occupant) {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                // Two full laps are enough: the first clears `used` on every
                // candidate, the second must find one clear, unless every
                // occupied frame is pinned or reserved.
                for _ in 0..2 * FRAME_COUNT {
                    let position = state.hand;
                    state.hand = (state.hand + 1) % FRAME_COUNT;
                    let entry = &mut state.entries[position];
                    if entry.occupant.is_none() || entry.pinned {
                        continue;
                    }
                    if entry.used {
                        entry.used = false;
                        continue;
                    }
                    let occupant = entry.occupant.take().unwrap();
                    debug!("clock hand selected frame {} (vpn {})", position, occupant.vpn);
                    return (position as u32, occupant);
                }
            }
            let (lock, cv) = &*self.pins;
            let mut pinned = lock.lock().unwrap();
            if *pinned == FRAME_COUNT {
                while *pinned == FRAME_COUNT {
                    debug!("all {} frames pinned, eviction waiting", FRAME_COUNT);
                    pinned = cv.wait(pinned).unwrap();
                }
            } else {
                // No candidate, yet not everything is pinned: the remaining
                // frames are reserved by concurrent evictions or faults.
                // Those resolve without touching the pin count, so nap with
                // a timeout instead of spinning until the next sweep.
                let _ = cv
                    .wait_timeout(pinned, std::time::Duration::from_millis(1))
                    .unwrap();
            }
        }
    }

    /// Frees a frame only if it still binds the given page; used at process
    /// unload, where a concurrent eviction may have reserved the frame first.
    pub fn release_owned(&self, frame: u32, table: &SharedAddressSpace, vpn: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        let entry = &mut state.entries[frame as usize];
        match &entry.occupant {
            Some(occupant) if Arc::ptr_eq(&occupant.table, table) && occupant.vpn == vpn => {
                assert!(!entry.pinned, "unloaded frame {} is pinned", frame);
                entry.occupant = None;
                entry.used = false;
                state.free.push_back(frame);
                true
            }
            _ => false,
        }
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().unwrap().free.len()
    }

    pub fn pinned_count(&self) -> usize {
        *self.pins.0.lock().unwrap()
    }

    pub fn occupant_vpn(&self, frame: u32) -> Option<u32> {
        let state = self.state.lock().unwrap();
        state.entries[frame as usize]
            .occupant
            .as_ref()
            .map(|o| o.vpn)
    }
}

impl<const FRAME_COUNT: usize> Default for FrameManager<FRAME_COUNT> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::AddressSpace;

    fn space(pages: usize) -> SharedAddressSpace {
        Arc::new(Mutex::new(AddressSpace::new(pages)))
    }

    #[test]
    fn allocate_until_empty() {
        let frames = FrameManager::<3>::new();
        assert_eq!(frames.allocate(), Some(0));
        assert_eq!(frames.allocate(), Some(1));
        assert_eq!(frames.allocate(), Some(2));
        assert_eq!(frames.allocate(), None);
        frames.release(1);
        assert_eq!(frames.allocate(), Some(1));
    }

    #[test]
    fn bind_and_release() {
        let frames = FrameManager::<2>::new();
        let table = space(4);
        let frame = frames.allocate().unwrap();
        frames.bind(
            frame,
            Occupant {
                table: Arc::clone(&table),
                vpn: 2,
            },
        );
        assert_eq!(frames.occupant_vpn(frame), Some(2));
        frames.release(frame);
        assert_eq!(frames.occupant_vpn(frame), None);
        assert_eq!(frames.free_count(), 2);
    }

    #[test]
    fn pin_requires_matching_occupant() {
        let frames = FrameManager::<2>::new();
        let table = space(4);
        let other = space(4);
        let frame = frames.allocate().unwrap();
        frames.bind(
            frame,
            Occupant {
                table: Arc::clone(&table),
                vpn: 1,
            },
        );
        assert!(!frames.try_pin(frame, &other, 1));
        assert!(!frames.try_pin(frame, &table, 3));
        assert!(frames.try_pin(frame, &table, 1));
        assert_eq!(frames.pinned_count(), 1);
        frames.unpin(frame);
        assert_eq!(frames.pinned_count(), 0);
    }

    #[test]
    fn second_chance_clears_used_before_selecting() {
        let frames = FrameManager::<3>::new();
        let table = space(8);
        for vpn in 0..3 {
            let frame = frames.allocate().unwrap();
            frames.bind(
                frame,
                Occupant {
                    table: Arc::clone(&table),
                    vpn,
                },
            );
        }
        // All frames start with `used` set; the first sweep clears them in
        // hand order and selects frame 0 on the second lap.
        let (frame, occupant) = frames.select_victim();
        assert_eq!(frame, 0);
        assert_eq!(occupant.vpn, 0);
        // Frame 0 is now reserved; the next sweep must pick frame 1.
        let (frame, occupant) = frames.select_victim();
        assert_eq!(frame, 1);
        assert_eq!(occupant.vpn, 1);
    }

    #[test]
    fn sweep_skips_pinned_frames() {
        let frames = FrameManager::<3>::new();
        let table = space(8);
        for vpn in 0..3 {
            let frame = frames.allocate().unwrap();
            frames.bind(
                frame,
                Occupant {
                    table: Arc::clone(&table),
                    vpn,
                },
            );
        }
        assert!(frames.try_pin(0, &table, 0));
        assert!(frames.try_pin(1, &table, 1));
        let (frame, occupant) = frames.select_victim();
        assert_eq!(frame, 2);
        assert_eq!(occupant.vpn, 2);
        frames.unpin(0);
        frames.unpin(1);
    }

    #[test]
    fn reserved_frame_is_never_reselected() {
        let frames = FrameManager::<2>::new();
        let table = space(8);
        for vpn in 0..2 {
            let frame = frames.allocate().unwrap();
            frames.bind(
                frame,
                Occupant {
                    table: Arc::clone(&table),
                    vpn,
                },
            );
        }
        let (first, _) = frames.select_victim();
        let (second, _) = frames.select_victim();
        assert_ne!(first, second);
    }

    #[test]
    fn sweep_finds_the_single_unpinned_frame_anywhere() {
        for unpinned in 0..4u32 {
            let frames = FrameManager::<4>::new();
            let table = space(8);
            for vpn in 0..4 {
                let frame = frames.allocate().unwrap();
                frames.bind(
                    frame,
                    Occupant {
                        table: Arc::clone(&table),
                        vpn,
                    },
                );
            }
            for frame in 0..4u32 {
                if frame != unpinned {
                    assert!(frames.try_pin(frame, &table, frame));
                }
            }
            let (victim, occupant) = frames.select_victim();
            assert_eq!(victim, unpinned);
            assert_eq!(occupant.vpn, unpinned);
        }
    }

    #[test]
    fn eviction_blocks_while_every_frame_is_pinned() {
        use std::thread;
        use std::time::Duration;

        let frames = FrameManager::<2>::new();
        let table = space(4);
        for vpn in 0..2 {
            let frame = frames.allocate().unwrap();
            frames.bind(
                frame,
                Occupant {
                    table: Arc::clone(&table),
                    vpn,
                },
            );
        }
        assert!(frames.try_pin(0, &table, 0));
        assert!(frames.try_pin(1, &table, 1));

        let sweeper = {
            let frames = frames.clone();
            thread::spawn(move || frames.select_victim().0)
        };
        // The sweep must be asleep on the condition variable, not spinning
        // to a selection.
        thread::sleep(Duration::from_millis(50));
        assert!(!sweeper.is_finished());

        frames.unpin(1);
        let victim = sweeper.join().unwrap();
        assert_eq!(victim, 1);
        frames.unpin(0);
    }

    #[test]
    fn sweep_waits_out_fully_reserved_frames() {
        use std::thread;
        use std::time::Duration;

        let frames = FrameManager::<2>::new();
        let table = space(4);
        for vpn in 0..2 {
            let frame = frames.allocate().unwrap();
            frames.bind(
                frame,
                Occupant {
                    table: Arc::clone(&table),
                    vpn,
                },
            );
        }
        // Reserve both frames; nothing is pinned, nothing is a candidate.
        let (first, first_occupant) = frames.select_victim();
        let _ = frames.select_victim();

        let sweeper = {
            let frames = frames.clone();
            thread::spawn(move || frames.select_victim())
        };
        thread::sleep(Duration::from_millis(30));
        assert!(!sweeper.is_finished());

        // Re-binding one reserved frame gives the sweep its candidate.
        frames.bind(first, first_occupant);
        let (victim, occupant) = sweeper.join().unwrap();
        assert_eq!(victim, first);
        assert_eq!(occupant.vpn, 0);
    }

    #[test]
    fn pin_fails_after_reservation() {
        let frames = FrameManager::<1>::new();
        let table = space(4);
        let frame = frames.allocate().unwrap();
        frames.bind(
            frame,
            Occupant {
                table: Arc::clone(&table),
                vpn: 0,
            },
        );
        let (victim, _) = frames.select_victim();
        assert_eq!(victim, frame);
        assert!(!frames.try_pin(frame, &table, 0));
    }
}
