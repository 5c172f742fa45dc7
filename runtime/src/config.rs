//! Compile-time limits and dispatch configuration.

use bon::bon;
use once_cell::sync::Lazy;

/// Maximum number of parameters a kernel may declare.
pub const MAX_PARAMETER_COUNT: usize = 64;

/// Maximum NDRange dimensionality.
pub const NUM_DIMENSIONS: usize = ndlaunch_device::MAX_DIMENSIONS;

/// Options applied when an execution action materializes its arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Zero-initialize `__local` scratch buffers before every dispatch.
    pub zero_local_memory: bool,
}

static ENV_CONFIG: Lazy<DispatchConfig> = Lazy::new(DispatchConfig::from_env);

#[bon]
impl DispatchConfig {
    #[builder]
    pub fn new(#[builder(default = false)] zero_local_memory: bool) -> Self {
        Self { zero_local_memory }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `NDLAUNCH_ZERO_LOCAL_MEMORY` - Zero local scratch buffers if set to anything but `0`
    pub fn from_env() -> Self {
        let zero_local_memory = std::env::var("NDLAUNCH_ZERO_LOCAL_MEMORY").is_ok_and(|value| value != "0");
        Self { zero_local_memory }
    }

    /// Process-wide configuration read once from the environment.
    pub fn global() -> &'static DispatchConfig {
        &ENV_CONFIG
    }
}
