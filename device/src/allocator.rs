use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::memory::{DeviceMemory, DevicePointer};

/// Options for buffer allocation.
#[derive(Debug, Clone, Default)]
pub struct BufferOptions {
    /// Whether to zero-initialize the buffer.
    pub zero_init: bool,
}

/// Device-memory allocator.
///
/// `alloc` and `free` are individually atomic and report failure synchronously.
pub trait Allocator: Send + Sync + std::fmt::Debug {
    fn alloc(&self, size: usize, options: &BufferOptions) -> Result<DevicePointer>;
    fn free(&self, pointer: DevicePointer);
    /// Address space the returned pointers live in.
    fn memory(&self) -> &Arc<DeviceMemory>;
    fn name(&self) -> &str;
}

/// Allocator carving regions out of a [`DeviceMemory`].
#[derive(Debug, Clone)]
pub struct CpuAllocator {
    memory: Arc<DeviceMemory>,
}

impl CpuAllocator {
    pub fn new(memory: Arc<DeviceMemory>) -> Self {
        Self { memory }
    }
}

impl Default for CpuAllocator {
    fn default() -> Self {
        Self::new(Arc::new(DeviceMemory::default()))
    }
}

impl Allocator for CpuAllocator {
    fn alloc(&self, size: usize, options: &BufferOptions) -> Result<DevicePointer> {
        let pointer = self.memory.reserve(size, options.zero_init)?;
        trace!(%pointer, size, "device memory allocated");
        Ok(pointer)
    }

    fn free(&self, pointer: DevicePointer) {
        trace!(%pointer, "device memory released");
        self.memory.release(pointer);
    }

    fn memory(&self) -> &Arc<DeviceMemory> {
        &self.memory
    }

    fn name(&self) -> &str {
        "CPU"
    }
}

/// Scoped device allocation, released when dropped.
#[derive(Debug)]
pub struct DeviceBuffer {
    allocator: Arc<dyn Allocator>,
    pointer: DevicePointer,
    size: usize,
}

impl DeviceBuffer {
    pub fn allocate(allocator: &Arc<dyn Allocator>, size: usize, options: &BufferOptions) -> Result<Self> {
        let pointer = allocator.alloc(size, options)?;
        Ok(Self { allocator: Arc::clone(allocator), pointer, size })
    }

    pub fn pointer(&self) -> DevicePointer {
        self.pointer
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy `src` to the start of the buffer.
    pub fn write(&self, src: &[u8]) -> Result<()> {
        self.allocator.memory().write(self.pointer, src)
    }

    /// Copy the start of the buffer into `dst`.
    pub fn read(&self, dst: &mut [u8]) -> Result<()> {
        self.allocator.memory().read(self.pointer, dst)
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.allocator.free(self.pointer);
    }
}
