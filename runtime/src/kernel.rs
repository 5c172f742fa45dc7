//! Kernel objects: argument binding and NDRange enqueue.
//!
//! A [`Kernel`] pairs one entry point of a [`Program`] with its argument
//! table. Arguments are bound one at a time with [`Kernel::set_arg`] and may be
//! rebound at any point; every [`Kernel::enqueue_nd_range`] validates the
//! range, checks that every parameter is bound and then queues a
//! [`KernelExecution`] holding a snapshot of the current bindings.
//!
//! # Example
//!
//! ```ignore
//! let mut kernel = Kernel::new(&program, "scale")?;
//! kernel.set_arg_buffer(0, Some(&data))?;
//! kernel.set_arg_value(1, &2.5f32)?;
//! let event = kernel.enqueue_nd_range(&queue, 1, None, &[256], Some(&[32]), None)?;
//! event.wait()?;
//! ```

use std::sync::Arc;

use ndlaunch_device::{Buffer, CommandQueue, DeviceLimits, Event, KernelInfo, MEM_HANDLE_SIZE, Program};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::debug;

use crate::argument::{ArgValue, ArgumentTable};
use crate::config::{DispatchConfig, MAX_PARAMETER_COUNT, NUM_DIMENSIONS};
use crate::error::{
    DeviceSnafu, InvalidArgIndexSnafu, InvalidEventWaitListSnafu, InvalidGlobalOffsetSnafu, InvalidGlobalWorkSizeSnafu,
    InvalidKernelArgsSnafu, InvalidKernelDefinitionSnafu, InvalidKernelNameSnafu, InvalidValueSnafu,
    InvalidWorkDimensionSnafu, InvalidWorkGroupSizeSnafu, InvalidWorkItemSizeSnafu, OutOfResourcesSnafu, Result,
};
use crate::execution::{ExecutionRequest, KernelExecution};

/// An entry point of a program together with its bound arguments.
///
/// Cloning a kernel copies its current bindings.
#[derive(Debug, Clone)]
pub struct Kernel {
    program: Arc<Program>,
    info: Arc<KernelInfo>,
    args: ArgumentTable,
    config: DispatchConfig,
}

impl Kernel {
    /// Instantiate the entry point `name` of `program`.
    pub fn new(program: &Arc<Program>, name: &str) -> Result<Self> {
        let info = program.kernel(name).context(InvalidKernelNameSnafu { name })?;
        Self::from_info(program, Arc::clone(info))
    }

    /// Instantiate every entry point of `program`.
    pub fn create_all(program: &Arc<Program>) -> Result<Vec<Self>> {
        program.kernels().iter().map(|info| Self::from_info(program, Arc::clone(info))).collect()
    }

    fn from_info(program: &Arc<Program>, info: Arc<KernelInfo>) -> Result<Self> {
        let count = info.param_count();
        ensure!(
            count <= MAX_PARAMETER_COUNT,
            InvalidKernelDefinitionSnafu { name: info.name.as_str(), count, max: MAX_PARAMETER_COUNT }
        );

        debug!(kernel.name = %info.name, program = program.id(), params = count, "kernel created");
        Ok(Self {
            program: Arc::clone(program),
            args: ArgumentTable::new(count),
            config: DispatchConfig::global().clone(),
            info,
        })
    }

    /// Replace the dispatch configuration used by future enqueues.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &Arc<KernelInfo> {
        &self.info
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    pub fn args(&self) -> &ArgumentTable {
        &self.args
    }

    pub(crate) fn limits(&self) -> &DeviceLimits {
        self.program.limits()
    }

    /// Bind parameter `index`.
    ///
    /// `size` is checked against the declared parameter: the element size
    /// times the vector width for scalars, [`MEM_HANDLE_SIZE`] for global and
    /// constant pointers, the struct size for by-value parameters and any
    /// non-zero size for local pointers. Pointer parameters accept `None` as
    /// "no buffer"; local pointers require `None`.
    pub fn set_arg(&mut self, index: usize, size: usize, value: Option<ArgValue<'_>>) -> Result<()> {
        let count = self.args.len();
        let param = self.info.params.get(index).context(InvalidArgIndexSnafu { index, count })?;
        self.args.bind(index, param, size, value)?;
        debug!(kernel.name = %self.info.name, index, size, "argument set");
        Ok(())
    }

    /// Bind a plain-old-data value, sized by its type.
    pub fn set_arg_value<T: bytemuck::NoUninit>(&mut self, index: usize, value: &T) -> Result<()> {
        let bytes = bytemuck::bytes_of(value);
        self.set_arg(index, bytes.len(), Some(ArgValue::Bytes(bytes)))
    }

    /// Bind a buffer, or null, to a global or constant pointer parameter.
    pub fn set_arg_buffer(&mut self, index: usize, buffer: Option<&Buffer>) -> Result<()> {
        self.set_arg(index, MEM_HANDLE_SIZE, buffer.map(ArgValue::Buffer))
    }

    /// Request `size` bytes of local memory for a local pointer parameter.
    pub fn set_arg_local(&mut self, index: usize, size: usize) -> Result<()> {
        self.set_arg(index, size, None)
    }

    /// Queue a dispatch over an NDRange.
    ///
    /// Slices must hold at least `work_dim` entries; only the first `work_dim`
    /// are read. Without `local_size` the kernel's required work-group size is
    /// used if it declares one, otherwise [`default_local_size`] picks one.
    /// Bound local arguments must fit the device's local memory.
    /// The returned event completes once the dispatch has finished.
    pub fn enqueue_nd_range(
        &self,
        queue: &CommandQueue,
        work_dim: u32,
        global_offset: Option<&[usize]>,
        global_size: &[usize],
        local_size: Option<&[usize]>,
        wait_list: Option<&[Arc<Event>]>,
    ) -> Result<Arc<Event>> {
        ensure!(
            (1..=NUM_DIMENSIONS as u32).contains(&work_dim),
            InvalidWorkDimensionSnafu { work_dim, max: NUM_DIMENSIONS }
        );
        let dims = work_dim as usize;
        let global_size = leading(global_size, dims, "global work size")?;
        let global_offset = global_offset.map(|offset| leading(offset, dims, "global work offset")).transpose()?;
        let local_size = local_size.map(|local| leading(local, dims, "local work size")).transpose()?;

        if let Some(dim) = global_size.iter().position(|&size| size == 0) {
            return InvalidGlobalWorkSizeSnafu { dim }.fail();
        }
        let global_offset = match global_offset {
            Some(offset) => {
                for (dim, (&start, &size)) in offset.iter().zip(global_size).enumerate() {
                    ensure!(start.checked_add(size).is_some(), InvalidGlobalOffsetSnafu { dim, offset: start, size });
                }
                offset.to_vec()
            }
            None => vec![0; dims],
        };

        let local_size = match (local_size, self.info.compile_group_size) {
            (Some(local), _) => {
                self.check_local_size(global_size, local)?;
                local.to_vec()
            }
            (None, Some(required)) => {
                self.check_local_size(global_size, &required[..dims])?;
                required[..dims].to_vec()
            }
            (None, None) => default_local_size(global_size, self.limits())[..dims].to_vec(),
        };

        ensure!(
            self.args.is_complete(),
            InvalidKernelArgsSnafu { kernel: self.info.name.as_str(), missing: self.args.missing() }
        );
        let (required, available) = (self.args.local_mem_size(), self.limits().local_mem_size);
        ensure!(required <= available, OutOfResourcesSnafu { kernel: self.info.name.as_str(), required, available });
        if let Some(events) = wait_list {
            ensure!(!events.is_empty(), InvalidEventWaitListSnafu { reason: "wait list given with zero events" });
        }

        let request = ExecutionRequest::new(
            Arc::clone(queue.device()),
            Arc::clone(&self.info),
            dims,
            &global_offset,
            global_size,
            &local_size,
            self.args.clone(),
            self.config.clone(),
        );
        debug!(
            kernel.name = %self.info.name,
            work_dim,
            global_size = ?request.global_size(),
            local_size = ?request.local_size(),
            deps = wait_list.map_or(0, <[_]>::len),
            "enqueue kernel"
        );

        queue.enqueue(Box::new(KernelExecution::new(request)), wait_list.unwrap_or_default()).context(DeviceSnafu)
    }

    /// Queue a single work-item dispatch.
    pub fn enqueue_task(&self, queue: &CommandQueue, wait_list: Option<&[Arc<Event>]>) -> Result<Arc<Event>> {
        self.enqueue_nd_range(queue, 1, None, &[1], Some(&[1]), wait_list)
    }

    fn check_local_size(&self, global_size: &[usize], local_size: &[usize]) -> Result<()> {
        let limits = self.limits();
        for (dim, (&global, &local)) in global_size.iter().zip(local_size).enumerate() {
            ensure!(local > 0, InvalidWorkGroupSizeSnafu { reason: format!("local size is zero in dimension {dim}") });
            ensure!(
                global % local == 0,
                InvalidWorkGroupSizeSnafu {
                    reason: format!("global size {global} not divisible by local size {local} in dimension {dim}")
                }
            );
            let max = limits.max_work_item_sizes[dim];
            ensure!(local <= max, InvalidWorkItemSizeSnafu { dim, local, max });
        }

        let total = local_size.iter().try_fold(1usize, |acc, &local| acc.checked_mul(local));
        let max = limits.max_work_group_size;
        ensure!(
            total.is_some_and(|total| total <= max),
            InvalidWorkGroupSizeSnafu { reason: format!("{local_size:?} exceeds the maximum of {max} work-items") }
        );

        if let Some(required) = self.info.compile_group_size {
            let dims = local_size.len();
            let matches = local_size == &required[..dims] && required[dims..].iter().all(|&size| size == 1);
            ensure!(
                matches,
                InvalidWorkGroupSizeSnafu {
                    reason: format!("{local_size:?} differs from the required work-group size {required:?}")
                }
            );
        }
        Ok(())
    }
}

/// The first `dims` entries of a range slice.
fn leading<'a>(values: &'a [usize], dims: usize, what: &str) -> Result<&'a [usize]> {
    ensure!(
        values.len() >= dims,
        InvalidValueSnafu { reason: format!("{what} has {} entries, {dims} required", values.len()) }
    );
    Ok(&values[..dims])
}

/// Work-group size used when the caller passes none.
///
/// Dimensions are visited in order; each takes the largest divisor of its
/// global size that fits both the per-dimension maximum and the work-items
/// left over from the dimensions before it. Unused dimensions are 1.
pub fn default_local_size(global_size: &[usize], limits: &DeviceLimits) -> [usize; NUM_DIMENSIONS] {
    let mut local = [1; NUM_DIMENSIONS];
    let mut budget = limits.max_work_group_size.max(1);
    for (dim, &global) in global_size.iter().enumerate().take(NUM_DIMENSIONS) {
        let cap = budget.min(limits.max_work_item_sizes[dim]).min(global);
        let size = (1..=cap).rev().find(|&candidate| global % candidate == 0).unwrap_or(1);
        local[dim] = size;
        budget /= size;
    }
    local
}
