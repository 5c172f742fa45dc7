use crate::memory::UNINIT_FILL;
use crate::{DeviceMemory, DevicePointer, Error};

#[test]
fn test_reserve_returns_distinct_non_null_addresses() {
    let memory = DeviceMemory::default();
    let a = memory.reserve(10, true).unwrap();
    let b = memory.reserve(0, true).unwrap();
    let c = memory.reserve(3, true).unwrap();

    assert!(!a.is_null() && !b.is_null() && !c.is_null());
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_eq!(a.address() % 16, 0);
    assert_eq!(memory.live_regions(), 3);
    assert_eq!(memory.used(), 13);
}

#[test]
fn test_release_returns_capacity() {
    let memory = DeviceMemory::with_capacity(64);
    let pointer = memory.reserve(64, false).unwrap();
    assert!(matches!(memory.reserve(1, false), Err(Error::AllocationFailed { size: 1, available: 0 })));

    memory.release(pointer);
    assert_eq!(memory.used(), 0);
    assert!(memory.reserve(64, false).is_ok());
}

#[test]
fn test_uninitialized_fill() {
    let memory = DeviceMemory::default();
    let dirty = memory.reserve(4, false).unwrap();
    let clean = memory.reserve(4, true).unwrap();

    let mut bytes = [0u8; 4];
    memory.read(dirty, &mut bytes).unwrap();
    assert_eq!(bytes, [UNINIT_FILL; 4]);
    memory.read(clean, &mut bytes).unwrap();
    assert_eq!(bytes, [0; 4]);
}

#[test]
fn test_interior_access() {
    let memory = DeviceMemory::default();
    let base = memory.reserve(16, true).unwrap();

    memory.write_f32(base.offset(8), 2.5).unwrap();
    memory.write_i32(base.offset(12), -7).unwrap();

    assert_eq!(memory.read_f32(base.offset(8)).unwrap(), 2.5);
    assert_eq!(memory.read_i32(base.offset(12)).unwrap(), -7);
}

#[test]
fn test_out_of_bounds_access() {
    let memory = DeviceMemory::default();
    let base = memory.reserve(8, true).unwrap();

    assert!(matches!(memory.read_u32(base.offset(6)), Err(Error::InvalidAccess { .. })));
    assert!(matches!(memory.read_u32(DevicePointer::NULL), Err(Error::InvalidAccess { .. })));
    memory.release(base);
    assert!(matches!(memory.read_u32(base), Err(Error::InvalidAccess { .. })));
}

#[test]
fn test_pointer_display() {
    assert_eq!(DevicePointer::NULL.to_string(), "null");
    assert_eq!(DevicePointer::new(0x1000).to_string(), "0x00001000");
}

#[test]
fn test_released_addresses_are_reused() {
    let memory = DeviceMemory::with_capacity(1 << 28);

    // 20 rounds of 256 MiB cycle 5 GiB through a 32-bit address space.
    for round in 0..20 {
        let pointer = memory.reserve(1 << 28, true).unwrap_or_else(|e| panic!("round {round}: {e}"));
        memory.release(pointer);
    }
    assert_eq!(memory.used(), 0);
    assert_eq!(memory.live_regions(), 0);
}

#[test]
fn test_reserve_fills_first_gap() {
    let memory = DeviceMemory::default();
    let a = memory.reserve(64, true).unwrap();
    let b = memory.reserve(64, true).unwrap();
    let c = memory.reserve(64, true).unwrap();

    memory.release(b);
    assert_eq!(memory.reserve(32, true).unwrap(), b);
    let d = memory.reserve(64, true).unwrap();
    assert!(d > c);

    memory.release(a);
    assert_eq!(memory.reserve(0, true).unwrap(), a);
}

#[test]
fn test_oversized_reservation_exhausts_address_space() {
    let memory = DeviceMemory::with_capacity(usize::MAX);
    assert!(matches!(memory.reserve(1 << 33, true), Err(Error::AddressSpaceExhausted { .. })));
}
