//! Kernel argument binding and NDRange dispatch.
//!
//! The runtime sits between a compute API surface and the device crate:
//!
//! - [`argument`]: per-parameter bound values and the argument table
//! - [`kernel`]: kernel objects, `set_arg`, enqueue validation
//! - [`execution`]: frozen execution requests and the queued action that
//!   allocates scratch memory and dispatches them
//! - [`info`]: kernel, work-group and argument info queries
//!
//! Everything device-specific (memory, dispatch, queues, events) comes from
//! [`ndlaunch_device`].

pub mod argument;
pub mod config;
pub mod error;
pub mod execution;
pub mod info;
pub mod kernel;


pub use argument::{ArgMask, ArgValue, ArgumentClass, ArgumentTable, KernelArgument, ScalarValue};
pub use config::{DispatchConfig, MAX_PARAMETER_COUNT, NUM_DIMENSIONS};
pub use error::*;
pub use execution::{ExecutionRequest, KernelExecution};
pub use info::{ArgInfoParam, InfoValue, KernelInfoParam, WorkGroupInfoParam};
pub use kernel::{Kernel, default_local_size};
