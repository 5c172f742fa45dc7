use std::sync::Arc;

use snafu::ensure;

use crate::allocator::{Allocator, BufferOptions, DeviceBuffer};
use crate::error::{Result, SizeMismatchSnafu};
use crate::memory::DevicePointer;

/// Caller-owned memory object.
///
/// Cloning a `Buffer` shares the underlying allocation; the device memory is
/// released when the last clone is dropped. Pointer parameters of a kernel are
/// bound to buffers and see their [`device_pointer`](Buffer::device_pointer).
#[derive(Debug, Clone)]
pub struct Buffer {
    data: Arc<DeviceBuffer>,
}

impl Buffer {
    pub fn new(allocator: &Arc<dyn Allocator>, size: usize, options: BufferOptions) -> Result<Self> {
        Ok(Self { data: Arc::new(DeviceBuffer::allocate(allocator, size, &options)?) })
    }

    /// Create a zero-initialized buffer holding a copy of `src`.
    pub fn from_bytes(allocator: &Arc<dyn Allocator>, src: &[u8]) -> Result<Self> {
        let mut buffer = Self::new(allocator, src.len(), BufferOptions { zero_init: true })?;
        buffer.copyin(src)?;
        Ok(buffer)
    }

    pub fn size(&self) -> usize {
        self.data.size()
    }

    pub fn device_pointer(&self) -> DevicePointer {
        self.data.pointer()
    }

    /// Copy data from host memory into this buffer.
    pub fn copyin(&mut self, src: &[u8]) -> Result<()> {
        let expected = self.size();
        let actual = src.len();
        ensure!(expected == actual, SizeMismatchSnafu { expected, actual });
        self.data.write(src)
    }

    /// Copy data from this buffer to host memory.
    pub fn copyout(&self, dst: &mut [u8]) -> Result<()> {
        let expected = self.size();
        let actual = dst.len();
        ensure!(expected == actual, SizeMismatchSnafu { expected, actual });
        self.data.read(dst)
    }

    /// Read the whole buffer into a fresh vector.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0; self.size()];
        self.copyout(&mut out)?;
        Ok(out)
    }
}
