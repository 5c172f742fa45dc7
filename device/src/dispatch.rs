//! Kernel dispatch: resolved launches and the dispatcher contract.
//!
//! The runtime resolves every bound argument into a [`LaunchArg`] (raw words or
//! a device address), fixes the NDRange and hands a [`Launch`] to the device's
//! [`Dispatcher`]. Dispatch is synchronous: `dispatch` returns once every
//! work-group has finished or one of them failed.
//!
//! [`HostDispatcher`] is the reference dispatcher. It runs registered host
//! functions once per work-item, with work-groups spread over rayon's pool.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{InvalidAccessSnafu, KernelFaultSnafu, Result, UnknownEntryPointSnafu};
use crate::memory::{DeviceMemory, DevicePointer};

/// Maximum NDRange dimensionality understood by dispatchers.
pub const MAX_DIMENSIONS: usize = 3;

/// Argument value as the kernel sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchArg {
    /// Raw 32-bit words of a scalar or vector parameter.
    Words(SmallVec<[u32; 4]>),
    /// Device address of a buffer (null allowed for global/constant pointers).
    Pointer(DevicePointer),
}

impl fmt::Display for LaunchArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchArg::Words(words) => write!(f, "{words:08x?}"),
            LaunchArg::Pointer(pointer) => write!(f, "{pointer}"),
        }
    }
}

/// A fully resolved dispatch.
#[derive(Debug, Clone)]
pub struct Launch<'a> {
    pub entry_point: &'a str,
    pub args: &'a [LaunchArg],
    pub work_dim: usize,
    pub global_offset: [usize; MAX_DIMENSIONS],
    pub global_size: [usize; MAX_DIMENSIONS],
    pub local_size: [usize; MAX_DIMENSIONS],
}

impl Launch<'_> {
    /// Number of work-groups per dimension.
    pub fn num_groups(&self) -> [usize; MAX_DIMENSIONS] {
        std::array::from_fn(|dim| self.global_size[dim] / self.local_size[dim].max(1))
    }

    /// Ids of every work-group, dimension 0 varying fastest.
    pub fn work_groups(&self) -> impl Iterator<Item = [usize; MAX_DIMENSIONS]> + use<> {
        let [nx, ny, nz] = self.num_groups();
        (0..nz).flat_map(move |z| (0..ny).flat_map(move |y| (0..nx).map(move |x| [x, y, z])))
    }

    pub fn work_group_size(&self) -> usize {
        self.local_size.iter().product()
    }
}

/// Runs launches on a device.
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Run `launch` to completion.
    fn dispatch(&self, launch: &Launch<'_>) -> Result<()>;

    fn name(&self) -> &str;
}

/// Execution context of one work-item in the host dispatcher.
pub struct WorkItem<'a> {
    launch: &'a Launch<'a>,
    memory: &'a DeviceMemory,
    group_id: [usize; MAX_DIMENSIONS],
    local_id: [usize; MAX_DIMENSIONS],
}

impl WorkItem<'_> {
    pub fn work_dim(&self) -> usize {
        self.launch.work_dim
    }

    pub fn global_id(&self, dim: usize) -> usize {
        self.launch.global_offset[dim] + self.group_id[dim] * self.launch.local_size[dim] + self.local_id[dim]
    }

    pub fn local_id(&self, dim: usize) -> usize {
        self.local_id[dim]
    }

    pub fn group_id(&self, dim: usize) -> usize {
        self.group_id[dim]
    }

    pub fn global_size(&self, dim: usize) -> usize {
        self.launch.global_size[dim]
    }

    pub fn local_size(&self, dim: usize) -> usize {
        self.launch.local_size[dim]
    }

    pub fn global_offset(&self, dim: usize) -> usize {
        self.launch.global_offset[dim]
    }

    pub fn memory(&self) -> &DeviceMemory {
        self.memory
    }

    fn arg(&self, index: usize) -> Option<&LaunchArg> {
        self.launch.args.get(index)
    }

    /// Words of a scalar argument, empty for pointers and unknown indices.
    pub fn words(&self, index: usize) -> &[u32] {
        match self.arg(index) {
            Some(LaunchArg::Words(words)) => words,
            _ => &[],
        }
    }

    pub fn arg_u32(&self, index: usize) -> u32 {
        self.words(index).first().copied().unwrap_or_default()
    }

    pub fn arg_i32(&self, index: usize) -> i32 {
        self.arg_u32(index) as i32
    }

    pub fn arg_f32(&self, index: usize) -> f32 {
        f32::from_bits(self.arg_u32(index))
    }

    /// Device address bound to a pointer argument.
    pub fn arg_pointer(&self, index: usize) -> Result<DevicePointer> {
        match self.arg(index) {
            Some(LaunchArg::Pointer(pointer)) => Ok(*pointer),
            _ => InvalidAccessSnafu { pointer: DevicePointer::NULL, len: 0usize }.fail(),
        }
    }

    /// Fail this work-item with a message.
    pub fn fault<T>(&self, message: impl Into<String>) -> Result<T> {
        KernelFaultSnafu {
            name: self.launch.entry_point,
            global_id: std::array::from_fn(|dim| self.global_id(dim)),
            message: message.into(),
        }
        .fail()
    }
}

/// Host implementation of a kernel entry point, called once per work-item.
pub type HostKernelFn = Arc<dyn Fn(&WorkItem<'_>) -> Result<()> + Send + Sync>;

/// Dispatcher running host functions registered per entry point.
pub struct HostDispatcher {
    memory: Arc<DeviceMemory>,
    kernels: RwLock<HashMap<String, HostKernelFn>>,
}

impl fmt::Debug for HostDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDispatcher").field("kernels", &self.kernels.read().keys().collect::<Vec<_>>()).finish()
    }
}

impl HostDispatcher {
    pub fn new(memory: Arc<DeviceMemory>) -> Self {
        Self { memory, kernels: RwLock::new(HashMap::new()) }
    }

    /// Register (or replace) the host code of an entry point.
    pub fn register<F>(&self, entry_point: impl Into<String>, kernel: F)
    where
        F: Fn(&WorkItem<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.kernels.write().insert(entry_point.into(), Arc::new(kernel));
    }

    pub fn memory(&self) -> &Arc<DeviceMemory> {
        &self.memory
    }

    fn run_group(&self, kernel: &HostKernelFn, launch: &Launch<'_>, group_id: [usize; MAX_DIMENSIONS]) -> Result<()> {
        let [lx, ly, lz] = launch.local_size;
        for z in 0..lz {
            for y in 0..ly {
                for x in 0..lx {
                    let item = WorkItem { launch, memory: &self.memory, group_id, local_id: [x, y, z] };
                    kernel(&item)?;
                }
            }
        }
        Ok(())
    }
}

impl Dispatcher for HostDispatcher {
    fn dispatch(&self, launch: &Launch<'_>) -> Result<()> {
        let kernel = self
            .kernels
            .read()
            .get(launch.entry_point)
            .cloned()
            .ok_or_else(|| UnknownEntryPointSnafu { name: launch.entry_point }.build())?;

        let groups: Vec<_> = launch.work_groups().collect();
        debug!(
            kernel.name = launch.entry_point,
            groups = groups.len(),
            group_size = launch.work_group_size(),
            "host dispatch"
        );

        // Single group - sequential path (no rayon overhead)
        if let [group] = groups.as_slice() {
            return self.run_group(&kernel, launch, *group);
        }
        groups.into_par_iter().try_for_each(|group| self.run_group(&kernel, launch, group))
    }

    fn name(&self) -> &str {
        "host"
    }
}
