use std::sync::{Arc, Mutex};

#[derive(Debug, PartialEq)]
pub enum MemoryError {
    OverCapacity,
    IncorrectFrameSize,
}

/// The simulated physical memory: one contiguous byte buffer holding
/// `FRAME_COUNT` frames of `FRAME_SIZE` bytes each. Frame `f`, offset `o`
/// lives at byte `f * FRAME_SIZE + o`.
#[derive(Clone)]
pub struct PhysicalMemory<const FRAME_SIZE: usize, const FRAME_COUNT: usize> {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<const FRAME_SIZE: usize, const FRAME_COUNT: usize> PhysicalMemory<FRAME_SIZE, FRAME_COUNT> {
    pub const fn capacity() -> usize {
        FRAME_SIZE * FRAME_COUNT
    }

    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(vec![0; Self::capacity()])),
        }
    }

    pub fn check_address(&self, address: u64, len: usize) -> Result<(), MemoryError> {
        if address as usize + len > Self::capacity() {
            return Err(MemoryError::OverCapacity);
        }
        Ok(())
    }

    pub fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.check_address(address, buf.len())?;
        let buffer = self.buffer.lock().unwrap();
        let start = address as usize;
        buf.copy_from_slice(&buffer[start..start + buf.len()]);
        Ok(())
    }

    pub fn write(&self, address: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        self.check_address(address, bytes.len())?;
        let mut buffer = self.buffer.lock().unwrap();
        let start = address as usize;
        buffer[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_frame(&self, frame: u32) -> Result<Box<[u8; FRAME_SIZE]>, MemoryError> {
        if frame as usize >= FRAME_COUNT {
            return Err(MemoryError::OverCapacity);
        }
        let buffer = self.buffer.lock().unwrap();
        let start = frame as usize * FRAME_SIZE;
        let mut block = Box::new([0; FRAME_SIZE]);
        block.copy_from_slice(&buffer[start..start + FRAME_SIZE]);
        Ok(block)
    }

    pub fn write_frame(&self, frame: u32, block: &[u8]) -> Result<(), MemoryError> {
        if block.len() != FRAME_SIZE {
            return Err(MemoryError::IncorrectFrameSize);
        } else if frame as usize >= FRAME_COUNT {
            return Err(MemoryError::OverCapacity);
        }
        let mut buffer = self.buffer.lock().unwrap();
        let start = frame as usize * FRAME_SIZE;
        buffer[start..start + FRAME_SIZE].copy_from_slice(block);
        Ok(())
    }

    pub fn zero_frame(&self, frame: u32) -> Result<(), MemoryError> {
        if frame as usize >= FRAME_COUNT {
            return Err(MemoryError::OverCapacity);
        }
        let mut buffer = self.buffer.lock().unwrap();
        let start = frame as usize * FRAME_SIZE;
        buffer[start..start + FRAME_SIZE].fill(0);
        Ok(())
    }
}

impl<const FRAME_SIZE: usize, const FRAME_COUNT: usize> Default
    for PhysicalMemory<FRAME_SIZE, FRAME_COUNT>
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create() {
        let mem = PhysicalMemory::<512, 4>::new();
        assert_eq!(PhysicalMemory::<512, 4>::capacity(), 2048);
        let mut buf = [0xff; 16];
        mem.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
    }

    #[test]
    fn test_read_write() {
        let mem = PhysicalMemory::<512, 4>::new();
        mem.write(0, &[0x12]).unwrap();
        let mut buf = [0; 1];
        mem.read(0, &mut buf).unwrap();
        assert_eq!(buf[0], 0x12);
    }

    #[test]
    fn test_write_a_lot_of_data() {
        let mem = PhysicalMemory::<256, 4>::new();
        for i in 0..1024u64 {
            mem.write(i, &[i as u8]).unwrap();
        }
        for i in 0..1024u64 {
            let mut buf = [0; 1];
            mem.read(i, &mut buf).unwrap();
            assert_eq!(buf[0], i as u8);
        }
    }

    #[test]
    fn test_write_invalid_address() {
        let mem = PhysicalMemory::<512, 2>::new();
        assert_eq!(mem.write(1024, &[0x12]), Err(MemoryError::OverCapacity));
        assert_eq!(mem.write(1023, &[0x12, 0x34]), Err(MemoryError::OverCapacity));
        let mut buf = [0; 2];
        assert_eq!(mem.read(1023, &mut buf), Err(MemoryError::OverCapacity));
    }

    #[test]
    fn test_frame_round_trip() {
        let mem = PhysicalMemory::<512, 4>::new();
        let block = [0xab; 512];
        mem.write_frame(3, &block).unwrap();
        let read = mem.read_frame(3).unwrap();
        assert_eq!(*read, block);
        mem.zero_frame(3).unwrap();
        let read = mem.read_frame(3).unwrap();
        assert_eq!(*read, [0; 512]);
    }

    #[test]
    fn test_frame_errors() {
        let mem = PhysicalMemory::<512, 4>::new();
        assert_eq!(
            mem.write_frame(0, &[0; 256]),
            Err(MemoryError::IncorrectFrameSize)
        );
        assert_eq!(
            mem.write_frame(4, &[0; 512]),
            Err(MemoryError::OverCapacity)
        );
        assert_eq!(mem.read_frame(4), Err(MemoryError::OverCapacity));
    }
}
