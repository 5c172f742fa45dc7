//! Simulated device address space.
//!
//! The reference device exposes a flat 32-bit address space. Every allocation
//! is a region backed by host memory; kernels and the runtime only ever see
//! [`DevicePointer`]s and go through [`DeviceMemory`] to touch the bytes.
//!
//! Address `0` is reserved as the null sentinel and is never handed out.
//! Regions are placed first-fit in the gaps between live regions, so released
//! address ranges are reused.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use snafu::ensure;

use crate::error::{AddressSpaceExhaustedSnafu, AllocationFailedSnafu, InvalidAccessSnafu, Result};

/// First address handed out by [`DeviceMemory`].
const BASE_ADDRESS: u32 = 0x1000;

/// One past the last addressable byte.
const ADDRESS_LIMIT: u64 = 1 << 32;

/// Region alignment in bytes.
const ALIGNMENT: u64 = 16;

/// Fill byte for regions allocated without zero-initialization.
pub const UNINIT_FILL: u8 = 0xCD;

/// Device-side address of a byte in device memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePointer(u32);

impl DevicePointer {
    pub const NULL: DevicePointer = DevicePointer(0);

    pub const fn new(address: u32) -> Self {
        Self(address)
    }

    pub const fn address(self) -> u32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Pointer `bytes` past this one.
    pub fn offset(self, bytes: usize) -> Self {
        Self(self.0.wrapping_add(bytes as u32))
    }
}

impl fmt::Display for DevicePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() { write!(f, "null") } else { write!(f, "0x{:08x}", self.0) }
    }
}

type Region = Arc<Mutex<Box<[u8]>>>;

/// Address span a region of `size` bytes occupies; zero-sized regions still take one slot.
fn span(size: usize) -> u64 {
    (size.max(1) as u64).next_multiple_of(ALIGNMENT)
}

#[derive(Debug)]
struct Layout {
    regions: BTreeMap<u32, Region>,
    used: usize,
}

impl Layout {
    /// Lowest address with `needed` free bytes before the next live region.
    fn find_gap(&self, needed: u64) -> Option<u32> {
        let mut cursor = u64::from(BASE_ADDRESS);
        for (&base, region) in &self.regions {
            if u64::from(base) - cursor >= needed {
                break;
            }
            cursor = u64::from(base) + span(region.lock().len());
        }
        (ADDRESS_LIMIT.saturating_sub(cursor) >= needed).then(|| u32::try_from(cursor).ok()).flatten()
    }
}

/// Flat device address space with a fixed byte capacity.
#[derive(Debug)]
pub struct DeviceMemory {
    layout: RwLock<Layout>,
    capacity: usize,
}

impl Default for DeviceMemory {
    fn default() -> Self {
        Self::with_capacity(256 * 1024 * 1024)
    }
}

impl DeviceMemory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { layout: RwLock::new(Layout { regions: BTreeMap::new(), used: 0 }), capacity }
    }

    /// Total bytes this memory can hold at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently held by live regions.
    pub fn used(&self) -> usize {
        self.layout.read().used
    }

    /// Number of live regions.
    pub fn live_regions(&self) -> usize {
        self.layout.read().regions.len()
    }

    /// Reserve a new region of `size` bytes.
    ///
    /// Zero-sized reservations still get a distinct, non-null address.
    pub fn reserve(&self, size: usize, zero_init: bool) -> Result<DevicePointer> {
        let mut layout = self.layout.write();

        let available = self.capacity - layout.used;
        ensure!(size <= available, AllocationFailedSnafu { size, available });

        let Some(address) = layout.find_gap(span(size)) else {
            return AddressSpaceExhaustedSnafu { size }.fail();
        };

        let fill = if zero_init { 0 } else { UNINIT_FILL };
        layout.regions.insert(address, Arc::new(Mutex::new(vec![fill; size].into_boxed_slice())));
        layout.used += size;

        Ok(DevicePointer(address))
    }

    /// Release the region starting at `pointer`. Unknown pointers are ignored.
    pub fn release(&self, pointer: DevicePointer) {
        let mut layout = self.layout.write();
        if let Some(region) = layout.regions.remove(&pointer.0) {
            layout.used -= region.lock().len();
        }
    }

    /// Size of the region starting exactly at `pointer`.
    pub fn region_size(&self, pointer: DevicePointer) -> Option<usize> {
        self.layout.read().regions.get(&pointer.0).map(|region| region.lock().len())
    }

    /// Locate the region containing `[pointer, pointer + len)`.
    fn locate(&self, pointer: DevicePointer, len: usize) -> Result<(Region, usize)> {
        let layout = self.layout.read();
        let found = layout.regions.range(..=pointer.0).next_back().and_then(|(&base, region)| {
            let offset = (pointer.0 - base) as usize;
            let fits = offset.checked_add(len).is_some_and(|end| end <= region.lock().len());
            fits.then(|| (Arc::clone(region), offset))
        });
        match found {
            Some(found) if !pointer.is_null() => Ok(found),
            _ => InvalidAccessSnafu { pointer, len }.fail(),
        }
    }

    pub fn read(&self, pointer: DevicePointer, dst: &mut [u8]) -> Result<()> {
        let (region, offset) = self.locate(pointer, dst.len())?;
        dst.copy_from_slice(&region.lock()[offset..offset + dst.len()]);
        Ok(())
    }

    pub fn write(&self, pointer: DevicePointer, src: &[u8]) -> Result<()> {
        let (region, offset) = self.locate(pointer, src.len())?;
        region.lock()[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn read_u32(&self, pointer: DevicePointer) -> Result<u32> {
        let mut word = [0u8; 4];
        self.read(pointer, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    pub fn write_u32(&self, pointer: DevicePointer, value: u32) -> Result<()> {
        self.write(pointer, &value.to_le_bytes())
    }

    pub fn read_i32(&self, pointer: DevicePointer) -> Result<i32> {
        self.read_u32(pointer).map(|word| word as i32)
    }

    pub fn write_i32(&self, pointer: DevicePointer, value: i32) -> Result<()> {
        self.write_u32(pointer, value as u32)
    }

    pub fn read_f32(&self, pointer: DevicePointer) -> Result<f32> {
        self.read_u32(pointer).map(f32::from_bits)
    }

    pub fn write_f32(&self, pointer: DevicePointer, value: f32) -> Result<()> {
        self.write_u32(pointer, value.to_bits())
    }
}
