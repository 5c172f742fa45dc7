use snafu::Snafu;

use crate::memory::DevicePointer;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Status codes stored in failed events.
///
/// Numbering follows the OpenCL error codes so that callers bridging to a C API
/// can forward them unchanged.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
    pub const OUT_OF_RESOURCES: i32 = -5;
    pub const EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST: i32 = -14;
    pub const INVALID_OPERATION: i32 = -59;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Device memory could not satisfy an allocation.
    #[snafu(display("allocation of {size} bytes failed: {available} bytes available"))]
    AllocationFailed { size: usize, available: usize },

    /// The device address space has no room left for another region.
    #[snafu(display("device address space exhausted while allocating {size} bytes"))]
    AddressSpaceExhausted { size: usize },

    /// Access outside of every live allocation.
    #[snafu(display("invalid device access: {len} bytes at {pointer}"))]
    InvalidAccess { pointer: DevicePointer, len: usize },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// The dispatcher has no code for the requested entry point.
    #[snafu(display("unknown entry point '{name}'"))]
    UnknownEntryPoint { name: String },

    /// A work-item reported a failure.
    #[snafu(display("kernel '{name}' failed at global id {global_id:?}: {message}"))]
    KernelFault { name: String, global_id: [usize; 3], message: String },

    /// A queued action finished with a non-zero status.
    #[snafu(display("action '{name}' failed with status {code}: {message}"))]
    ActionFailed { name: String, code: i32, message: String },

    /// An event finished in an error state.
    #[snafu(display("event {id} failed with status {code}"))]
    EventFailed { id: u64, code: i32 },

    #[snafu(display("command queue is closed"))]
    QueueClosed,

    #[snafu(display("runtime error: {message}"))]
    Runtime { message: String },
}

impl Error {
    /// Status code an event takes when this error terminates its action.
    pub fn status_code(&self) -> i32 {
        match self {
            Error::AllocationFailed { .. } | Error::AddressSpaceExhausted { .. } => {
                status::MEM_OBJECT_ALLOCATION_FAILURE
            }
            Error::ActionFailed { code, .. } => *code,
            Error::EventFailed { .. } => status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST,
            Error::QueueClosed => status::INVALID_OPERATION,
            Error::InvalidAccess { .. }
            | Error::SizeMismatch { .. }
            | Error::UnknownEntryPoint { .. }
            | Error::KernelFault { .. }
            | Error::Runtime { .. } => status::OUT_OF_RESOURCES,
        }
    }
}
