//! Error types for argument binding and kernel dispatch.
//!
//! Validation errors are returned synchronously from the call that caused
//! them. Errors raised while an execution action runs never reach the
//! enqueueing caller; they terminate the action's event with [`Error::code`].

use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while binding arguments or dispatching kernels.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Argument index is not below the kernel's parameter count.
    #[snafu(display("argument index {index} out of range for kernel with {count} parameters"))]
    InvalidArgIndex { index: usize, count: usize },

    /// Argument size does not match the declared parameter.
    #[snafu(display("argument {index} ({name}): size {size} invalid, expected {expected}"))]
    InvalidArgSize { index: usize, name: String, size: usize, expected: String },

    /// Argument value is missing, present where forbidden, or of the wrong shape.
    #[snafu(display("argument {index} ({name}): {reason}"))]
    InvalidArgValue { index: usize, name: String, reason: String },

    /// Not every declared parameter has been bound.
    #[snafu(display("kernel '{kernel}' has unbound arguments {missing:?}"))]
    InvalidKernelArgs { kernel: String, missing: Vec<usize> },

    #[snafu(display("work dimension {work_dim} outside [1, {max}]"))]
    InvalidWorkDimension { work_dim: u32, max: usize },

    #[snafu(display("global work size is zero in dimension {dim}"))]
    InvalidGlobalWorkSize { dim: usize },

    #[snafu(display("global offset {offset} + size {size} overflows in dimension {dim}"))]
    InvalidGlobalOffset { dim: usize, offset: usize, size: usize },

    #[snafu(display("invalid work-group size: {reason}"))]
    InvalidWorkGroupSize { reason: String },

    #[snafu(display("local size {local} exceeds device maximum {max} in dimension {dim}"))]
    InvalidWorkItemSize { dim: usize, local: usize, max: usize },

    /// Bound local arguments need more local memory than the device provides.
    #[snafu(display("kernel '{kernel}' needs {required} bytes of local memory, device provides {available}"))]
    OutOfResources { kernel: String, required: u64, available: u64 },

    #[snafu(display("invalid event wait list: {reason}"))]
    InvalidEventWaitList { reason: String },

    /// Malformed query or range arguments.
    #[snafu(display("invalid value: {reason}"))]
    InvalidValue { reason: String },

    #[snafu(display("no kernel named '{name}' in program"))]
    InvalidKernelName { name: String },

    #[snafu(display("kernel '{name}' declares {count} parameters, at most {max} are supported"))]
    InvalidKernelDefinition { name: String, count: usize, max: usize },

    /// Device memory for a local or by-value argument could not be allocated.
    #[snafu(display("allocating {size} bytes for argument {index} failed: {source}"))]
    AllocationFailure { index: usize, size: usize, source: ndlaunch_device::Error },

    /// The device reported a failed dispatch.
    #[snafu(display("dispatch of kernel '{kernel}' failed: {source}"))]
    DeviceDispatchFailure { kernel: String, source: ndlaunch_device::Error },

    /// Any other collaborator failure.
    #[snafu(display("device error: {source}"))]
    Device { source: ndlaunch_device::Error },
}

impl Error {
    /// Status code of this error, using the OpenCL numbering.
    pub fn code(&self) -> i32 {
        match self {
            Error::AllocationFailure { .. } => -4,
            Error::DeviceDispatchFailure { .. } | Error::OutOfResources { .. } => -5,
            Error::InvalidValue { .. } => -30,
            Error::InvalidKernelName { .. } => -46,
            Error::InvalidKernelDefinition { .. } => -47,
            Error::InvalidArgIndex { .. } => -49,
            Error::InvalidArgValue { .. } => -50,
            Error::InvalidArgSize { .. } => -51,
            Error::InvalidKernelArgs { .. } => -52,
            Error::InvalidWorkDimension { .. } => -53,
            Error::InvalidWorkGroupSize { .. } => -54,
            Error::InvalidWorkItemSize { .. } => -55,
            Error::InvalidGlobalOffset { .. } => -56,
            Error::InvalidEventWaitList { .. } => -57,
            Error::InvalidGlobalWorkSize { .. } => -63,
            Error::Device { source } => source.status_code(),
        }
    }
}
