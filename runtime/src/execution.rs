//! Execution requests and the queued action that dispatches them.
//!
//! An [`ExecutionRequest`] is frozen when a kernel is enqueued: it owns a copy
//! of the argument table, so later binds on the kernel never reach it. The
//! [`KernelExecution`] action wrapping it runs once on the queue worker:
//!
//! ```text
//! local args    ──► allocate scratch buffer  ──┐
//! by-value args ──► allocate + copy payload  ──┼──► Launch ──► Dispatcher ──► free scratch
//! plain args    ──► words / device address   ──┘
//! ```
//!
//! Scratch buffers are owned by [`DeviceBuffer`]s and freed when the action
//! returns, whether allocation, copy or dispatch failed part-way.

use std::fmt;
use std::sync::Arc;

use ndlaunch_device::error::ActionFailedSnafu;
use ndlaunch_device::{BufferOptions, Device, DeviceBuffer, EventAction, KernelInfo, Launch, LaunchArg, ParamKind};
use smallvec::SmallVec;
use snafu::ResultExt;
use tracing::{debug, trace};

use crate::argument::{ArgumentClass, ArgumentTable};
use crate::config::{DispatchConfig, NUM_DIMENSIONS};
use crate::error::{AllocationFailureSnafu, DeviceDispatchFailureSnafu, DeviceSnafu, Result};

/// Immutable snapshot of one NDRange dispatch.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    device: Arc<Device>,
    info: Arc<KernelInfo>,
    num_dimensions: usize,
    global_offset: [usize; NUM_DIMENSIONS],
    global_size: [usize; NUM_DIMENSIONS],
    local_size: [usize; NUM_DIMENSIONS],
    args: ArgumentTable,
    config: DispatchConfig,
}

impl ExecutionRequest {
    /// Freeze a validated range; dimensions past `num_dimensions` become size 1, offset 0.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: Arc<Device>,
        info: Arc<KernelInfo>,
        num_dimensions: usize,
        global_offset: &[usize],
        global_size: &[usize],
        local_size: &[usize],
        args: ArgumentTable,
        config: DispatchConfig,
    ) -> Self {
        let pad = |values: &[usize], fill: usize| -> [usize; NUM_DIMENSIONS] {
            std::array::from_fn(|dim| if dim < num_dimensions { values[dim] } else { fill })
        };
        Self {
            num_dimensions,
            global_offset: pad(global_offset, 0),
            global_size: pad(global_size, 1),
            local_size: pad(local_size, 1),
            device,
            info,
            args,
            config,
        }
    }

    pub fn kernel_name(&self) -> &str {
        &self.info.name
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    pub fn global_offset(&self) -> [usize; NUM_DIMENSIONS] {
        self.global_offset
    }

    pub fn global_size(&self) -> [usize; NUM_DIMENSIONS] {
        self.global_size
    }

    pub fn local_size(&self) -> [usize; NUM_DIMENSIONS] {
        self.local_size
    }

    pub fn args(&self) -> &ArgumentTable {
        &self.args
    }

    pub fn num_groups(&self) -> [usize; NUM_DIMENSIONS] {
        std::array::from_fn(|dim| self.global_size[dim] / self.local_size[dim])
    }
}

/// Queued action that materializes arguments and dispatches one request.
pub struct KernelExecution {
    request: ExecutionRequest,
}

impl fmt::Debug for KernelExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelExecution")
            .field("kernel", &self.request.info.name)
            .field("global_size", &self.request.global_size)
            .field("local_size", &self.request.local_size)
            .finish()
    }
}

impl KernelExecution {
    pub fn new(request: ExecutionRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &ExecutionRequest {
        &self.request
    }

    /// Allocate scratch memory, dispatch and release the scratch memory again.
    pub fn run(&self) -> Result<()> {
        let request = &self.request;
        let allocator = &request.device.allocator;
        let mut scratch: SmallVec<[DeviceBuffer; 4]> = SmallVec::new();
        let mut launch_args = Vec::with_capacity(request.args.len());

        for (index, (argument, param)) in request.args.args().iter().zip(&request.info.params).enumerate() {
            let launch_arg = match argument.class() {
                ArgumentClass::Local => {
                    let size = argument.size_to_allocate;
                    let options = BufferOptions { zero_init: request.config.zero_local_memory };
                    let buffer = DeviceBuffer::allocate(allocator, size, &options)
                        .context(AllocationFailureSnafu { index, size })?;
                    let pointer = buffer.pointer();
                    scratch.push(buffer);
                    LaunchArg::Pointer(pointer)
                }
                ArgumentClass::ByValue => {
                    let size = argument.size_to_allocate;
                    let buffer = DeviceBuffer::allocate(allocator, size, &BufferOptions::default())
                        .context(AllocationFailureSnafu { index, size })?;
                    buffer.write(&argument.direct_data()).context(DeviceSnafu)?;
                    let pointer = buffer.pointer();
                    scratch.push(buffer);
                    LaunchArg::Pointer(pointer)
                }
                ArgumentClass::Plain if param.kind() == ParamKind::Scalar => LaunchArg::Words(argument.words()),
                ArgumentClass::Plain => LaunchArg::Pointer(argument.device_pointer()),
            };
            trace!(index, param = %param.name, class = %argument.class(), value = %launch_arg, "argument materialized");
            launch_args.push(launch_arg);
        }

        let launch = Launch {
            entry_point: &request.info.name,
            args: &launch_args,
            work_dim: request.num_dimensions,
            global_offset: request.global_offset,
            global_size: request.global_size,
            local_size: request.local_size,
        };
        debug!(
            kernel.name = %request.info.name,
            dispatcher = request.device.dispatcher.name(),
            global_size = ?request.global_size,
            local_size = ?request.local_size,
            scratch = scratch.len(),
            "dispatching kernel"
        );

        let result = request
            .device
            .dispatcher
            .dispatch(&launch)
            .context(DeviceDispatchFailureSnafu { kernel: &request.info.name });
        drop(scratch);
        result
    }
}

impl EventAction for KernelExecution {
    fn execute(self: Box<Self>) -> ndlaunch_device::Result<()> {
        self.run().map_err(|e| {
            ActionFailedSnafu { name: self.request.info.name.as_str(), code: e.code(), message: e.to_string() }.build()
        })
    }

    fn name(&self) -> &str {
        &self.request.info.name
    }
}
