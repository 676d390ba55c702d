//! Physical memory of the simulated machine.
//!
//! Memory is byte addressable and reads as zero until written. Frames are
//! materialised on first write, so a machine with a large physical address
//! range only pays for the frames the kernel actually touches.

use crate::addressing::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE, Pa};
use std::collections::BTreeMap;

/// An access hit a physical address beyond the installed memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusError {
    /// The first address that could not be reached.
    pub pa: Pa,
}

/// The installed physical memory.
pub struct PhysicalMemory {
    size: usize,
    frames: BTreeMap<u32, Box<[u8; PAGE_SIZE]>>,
}

impl PhysicalMemory {
    /// Installs `size` bytes of zeroed memory, starting at physical address 0.
    ///
    /// The size is rounded down to a whole number of frames.
    pub fn new(size: usize) -> Self {
        Self {
            size: size & !PAGE_MASK,
            frames: BTreeMap::new(),
        }
    }

    /// The amount of installed memory, in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of frames that hold data.
    pub fn resident_frames(&self) -> usize {
        self.frames.len()
    }

    fn check(&self, pa: Pa, len: usize) -> Result<(), BusError> {
        match pa.into_usize().checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(BusError {
                pa: Pa::new(self.size.max(pa.into_usize()) as u32),
            }),
        }
    }

    /// Copies `buf.len()` bytes starting at `pa` into `buf`.
    pub fn read(&self, pa: Pa, buf: &mut [u8]) -> Result<(), BusError> {
        self.check(pa, buf.len())?;
        let mut addr = pa.into_usize();
        let mut done = 0;
        while done < buf.len() {
            let ofs = addr & PAGE_MASK;
            let len = (PAGE_SIZE - ofs).min(buf.len() - done);
            match self.frames.get(&((addr >> PAGE_SHIFT) as u32)) {
                Some(frame) => buf[done..done + len].copy_from_slice(&frame[ofs..ofs + len]),
                None => buf[done..done + len].fill(0),
            }
            addr += len;
            done += len;
        }
        Ok(())
    }

    /// Copies `data` into memory starting at `pa`.
    pub fn write(&mut self, pa: Pa, data: &[u8]) -> Result<(), BusError> {
        self.check(pa, data.len())?;
        let mut addr = pa.into_usize();
        let mut done = 0;
        while done < data.len() {
            let ofs = addr & PAGE_MASK;
            let len = (PAGE_SIZE - ofs).min(data.len() - done);
            self.frames
                .entry((addr >> PAGE_SHIFT) as u32)
                .or_insert_with(|| Box::new([0; PAGE_SIZE]))[ofs..ofs + len]
                .copy_from_slice(&data[done..done + len]);
            addr += len;
            done += len;
        }
        Ok(())
    }

    /// Sets `len` bytes starting at `pa` to `byte`.
    pub fn fill(&mut self, pa: Pa, len: usize, byte: u8) -> Result<(), BusError> {
        self.check(pa, len)?;
        let mut addr = pa.into_usize();
        let end = addr + len;
        while addr < end {
            let ofs = addr & PAGE_MASK;
            let chunk = (PAGE_SIZE - ofs).min(end - addr);
            let frame = (addr >> PAGE_SHIFT) as u32;
            if byte == 0 && chunk == PAGE_SIZE {
                self.frames.remove(&frame);
            } else {
                self.frames
                    .entry(frame)
                    .or_insert_with(|| Box::new([0; PAGE_SIZE]))[ofs..ofs + chunk]
                    .fill(byte);
            }
            addr += chunk;
        }
        Ok(())
    }

    /// Reads a little-endian 32-bit word.
    pub fn read_u32(&self, pa: Pa) -> Result<u32, BusError> {
        let mut word = [0; 4];
        self.read(pa, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Writes a little-endian 32-bit word.
    pub fn write_u32(&mut self, pa: Pa, value: u32) -> Result<(), BusError> {
        self.write(pa, &value.to_le_bytes())
    }
}
