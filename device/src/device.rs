//! Device description: limits, memory allocator and dispatcher.
//!
//! A [`Device`] is the unit the runtime targets. It owns:
//! - **Limits**: work-group and local-memory bounds used for validation
//! - **Allocator**: device memory for buffers and per-dispatch scratch space
//! - **Dispatcher**: runs a resolved launch to completion

use std::sync::Arc;

use bon::bon;
use once_cell::sync::Lazy;

use crate::allocator::{Allocator, CpuAllocator};
use crate::dispatch::{Dispatcher, HostDispatcher};
use crate::memory::DeviceMemory;

/// Hardware limits reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum number of work-items in one work-group.
    pub max_work_group_size: usize,
    /// Maximum work-group extent per dimension.
    pub max_work_item_sizes: [usize; 3],
    /// Work-group sizes should be a multiple of this for best throughput.
    pub preferred_work_group_size_multiple: usize,
    /// Local memory available to one work-group, in bytes.
    pub local_mem_size: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_work_group_size: 256,
            max_work_item_sizes: [256, 256, 256],
            preferred_work_group_size_multiple: 16,
            local_mem_size: 32 * 1024,
        }
    }
}

static ENV_LIMITS: Lazy<DeviceLimits> = Lazy::new(DeviceLimits::from_env);

#[bon]
impl DeviceLimits {
    #[builder]
    pub fn new(
        #[builder(default = 256)] max_work_group_size: usize,
        max_work_item_sizes: Option<[usize; 3]>,
        #[builder(default = 16)] preferred_work_group_size_multiple: usize,
        #[builder(default = 32 * 1024)] local_mem_size: u64,
    ) -> Self {
        Self {
            max_work_group_size,
            max_work_item_sizes: max_work_item_sizes.unwrap_or([max_work_group_size; 3]),
            preferred_work_group_size_multiple,
            local_mem_size,
        }
    }

    /// Create limits from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `NDLAUNCH_MAX_WORK_GROUP_SIZE` - Max work-items per group (default: 256)
    /// * `NDLAUNCH_PREFERRED_WORK_GROUP_MULTIPLE` - Preferred group size multiple (default: 16)
    /// * `NDLAUNCH_LOCAL_MEM_SIZE` - Local memory per group in bytes (default: 32768)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_work_group_size = std::env::var("NDLAUNCH_MAX_WORK_GROUP_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&size: &usize| size > 0)
            .unwrap_or(defaults.max_work_group_size);
        let preferred_work_group_size_multiple = std::env::var("NDLAUNCH_PREFERRED_WORK_GROUP_MULTIPLE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.preferred_work_group_size_multiple);
        let local_mem_size = std::env::var("NDLAUNCH_LOCAL_MEM_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.local_mem_size);

        Self::builder()
            .max_work_group_size(max_work_group_size)
            .preferred_work_group_size_multiple(preferred_work_group_size_multiple)
            .local_mem_size(local_mem_size)
            .build()
    }

    /// Process-wide limits read once from the environment.
    pub fn global() -> &'static DeviceLimits {
        &ENV_LIMITS
    }
}

/// A compute device.
#[derive(Debug)]
pub struct Device {
    pub name: String,
    pub limits: DeviceLimits,
    pub allocator: Arc<dyn Allocator>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        limits: DeviceLimits,
        allocator: Arc<dyn Allocator>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self { name: name.into(), limits, allocator, dispatcher })
    }

    /// Host-emulated device sharing one address space between its allocator
    /// and the host dispatcher that runs registered kernels.
    pub fn host(limits: DeviceLimits, memory: Arc<DeviceMemory>) -> (Arc<Self>, Arc<HostDispatcher>) {
        let dispatcher = Arc::new(HostDispatcher::new(Arc::clone(&memory)));
        let allocator = Arc::new(CpuAllocator::new(memory));
        let device = Self::new("host", limits, allocator, dispatcher.clone());
        (device, dispatcher)
    }

    pub fn memory(&self) -> &Arc<DeviceMemory> {
        self.allocator.memory()
    }
}
