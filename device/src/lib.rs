//! Device-side collaborators of the ndlaunch kernel-dispatch core.
//!
//! The kernel-dispatch runtime only talks to devices through the contracts in
//! this crate:
//!
//! - [`Program`] / [`KernelInfo`] / [`ParamInfo`]: immutable entry-point metadata
//! - [`Allocator`]: device memory allocate/free
//! - [`Dispatcher`]: synchronous execution of a resolved [`Launch`]
//! - [`CommandQueue`] / [`Event`]: in-order execution of [`EventAction`]s
//!
//! Reference implementations backed by host memory ([`DeviceMemory`],
//! [`CpuAllocator`], [`HostDispatcher`]) make the whole stack runnable
//! without hardware.

pub mod allocator;
pub mod buffer;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod program;
pub mod queue;
pub mod sync;


pub use allocator::{Allocator, BufferOptions, CpuAllocator, DeviceBuffer};
pub use buffer::Buffer;
pub use device::{Device, DeviceLimits};
pub use dispatch::{Dispatcher, HostDispatcher, HostKernelFn, Launch, LaunchArg, MAX_DIMENSIONS, WorkItem};
pub use error::{Error, Result, status};
pub use memory::{DeviceMemory, DevicePointer};
pub use program::{
    AccessQualifier, AddressSpace, KernelInfo, MEM_HANDLE_SIZE, ParamInfo, ParamKind, Program, ScalarKind,
    TypeQualifier,
};
pub use queue::{CommandQueue, EventAction};
pub use sync::{Event, EventStatus};
