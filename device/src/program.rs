//! Compiled program metadata.
//!
//! A [`Program`] is produced by the compiler/loader (not part of this crate)
//! and describes every entry point it contains: parameter count, per-parameter
//! kind, size and qualifiers. Everything here is immutable after construction
//! and shared through `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use enumset::{EnumSet, EnumSetType};

use crate::device::{Device, DeviceLimits};

/// Width in bytes of a memory-object handle passed when binding pointer parameters.
pub const MEM_HANDLE_SIZE: usize = std::mem::size_of::<u64>();

/// Address space a parameter lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::FromRepr)]
#[repr(u32)]
pub enum AddressSpace {
    #[strum(serialize = "__global")]
    Global = 0x119B,
    #[strum(serialize = "__local")]
    Local = 0x119C,
    #[strum(serialize = "__constant")]
    Constant = 0x119D,
    #[strum(serialize = "__private")]
    Private = 0x119E,
}

/// Image/pointer access qualifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[repr(u32)]
pub enum AccessQualifier {
    ReadOnly = 0x11A0,
    WriteOnly = 0x11A1,
    ReadWrite = 0x11A2,
    #[default]
    None = 0x11A3,
}

/// Type qualifiers; the bitfield value of each is `1 << discriminant`.
#[derive(Debug, Hash, EnumSetType)]
#[enumset(repr = "u32")]
pub enum TypeQualifier {
    Const,
    Restrict,
    Volatile,
    Pipe,
}

/// Element type of a scalar or vector parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ScalarKind {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Half,
    Float,
}

impl ScalarKind {
    pub const fn bytes(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort | Self::Half => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Long | Self::ULong => 8,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Char | Self::Short | Self::Int | Self::Long)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::Half | Self::Float)
    }
}

/// How a parameter receives its value, derived from its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ParamKind {
    /// Scalar or vector of scalars, passed directly.
    Scalar,
    /// Pointer into global memory; may be bound to null.
    GlobalPointer,
    /// Pointer into constant memory; may be bound to null.
    ConstantPointer,
    /// Pointer to per-dispatch scratch memory sized by the caller.
    LocalPointer,
    /// Aggregate passed by value through a runtime-managed buffer.
    ByValue,
}

impl ParamKind {
    /// Whether the kernel sees a device address for this parameter.
    pub const fn is_pointer(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

/// Metadata of one formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub type_name: String,
    /// Declared size in bytes (for pointers, the size of the pointee type if known).
    pub size: usize,
    /// Number of vector elements, 1 for scalars.
    pub elements: u8,
    /// Element type for scalar parameters.
    pub scalar: Option<ScalarKind>,
    pub address_space: AddressSpace,
    pub is_pointer: bool,
    pub by_value: bool,
    pub access: AccessQualifier,
    pub qualifiers: EnumSet<TypeQualifier>,
}

impl ParamInfo {
    /// Scalar (`elements == 1`) or vector parameter.
    pub fn scalar(name: impl Into<String>, scalar: ScalarKind, elements: u8) -> Self {
        let stored = if elements == 3 { 4 } else { elements.max(1) };
        let type_name = if elements > 1 { format!("{scalar}{elements}") } else { scalar.to_string() };
        Self {
            name: name.into(),
            type_name,
            size: scalar.bytes() * stored as usize,
            elements: elements.max(1),
            scalar: Some(scalar),
            address_space: AddressSpace::Private,
            is_pointer: false,
            by_value: false,
            access: AccessQualifier::None,
            qualifiers: EnumSet::empty(),
        }
    }

    pub fn pointer(name: impl Into<String>, type_name: impl Into<String>, address_space: AddressSpace) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            size: MEM_HANDLE_SIZE,
            elements: 1,
            scalar: None,
            address_space,
            is_pointer: true,
            by_value: false,
            access: AccessQualifier::None,
            qualifiers: EnumSet::empty(),
        }
    }

    pub fn global_pointer(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::pointer(name, type_name, AddressSpace::Global)
    }

    pub fn constant_pointer(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::pointer(name, type_name, AddressSpace::Constant).with_qualifiers(TypeQualifier::Const.into())
    }

    pub fn local_pointer(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::pointer(name, type_name, AddressSpace::Local)
    }

    /// Aggregate of `size` bytes passed by value.
    pub fn by_value(name: impl Into<String>, type_name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            size,
            elements: 1,
            scalar: None,
            address_space: AddressSpace::Private,
            is_pointer: true,
            by_value: true,
            access: AccessQualifier::None,
            qualifiers: EnumSet::empty(),
        }
    }

    pub fn with_access(mut self, access: AccessQualifier) -> Self {
        self.access = access;
        self
    }

    pub fn with_qualifiers(mut self, qualifiers: EnumSet<TypeQualifier>) -> Self {
        self.qualifiers |= qualifiers;
        self
    }

    pub fn kind(&self) -> ParamKind {
        if self.by_value {
            return ParamKind::ByValue;
        }
        if !self.is_pointer {
            return ParamKind::Scalar;
        }
        match self.address_space {
            AddressSpace::Local => ParamKind::LocalPointer,
            AddressSpace::Constant => ParamKind::ConstantPointer,
            AddressSpace::Global | AddressSpace::Private => ParamKind::GlobalPointer,
        }
    }

    /// Size in bytes of one vector element (scalar parameters only).
    pub fn element_size(&self) -> usize {
        self.scalar.map_or(self.size, ScalarKind::bytes)
    }
}

/// Metadata of one kernel entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    /// Work-group size fixed by `reqd_work_group_size`, if declared.
    pub compile_group_size: Option<[usize; 3]>,
    /// Per-work-item private memory footprint in bytes.
    pub private_mem_size: u64,
}

impl KernelInfo {
    pub fn new(name: impl Into<String>, params: Vec<ParamInfo>) -> Self {
        Self { name: name.into(), params, compile_group_size: None, private_mem_size: 0 }
    }

    pub fn with_compile_group_size(mut self, size: [usize; 3]) -> Self {
        self.compile_group_size = Some(size);
        self
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Source-level attribute string, empty when none are declared.
    pub fn attributes(&self) -> String {
        match self.compile_group_size {
            Some([x, y, z]) => format!("reqd_work_group_size({x},{y},{z})"),
            None => String::new(),
        }
    }
}

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// A built program: the device it targets plus its entry points.
#[derive(Debug)]
pub struct Program {
    id: u64,
    device: Arc<Device>,
    kernels: Vec<Arc<KernelInfo>>,
}

impl Program {
    pub fn new(device: Arc<Device>, kernels: Vec<KernelInfo>) -> Arc<Self> {
        let id = NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed);
        Arc::new(Self { id, device, kernels: kernels.into_iter().map(Arc::new).collect() })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.device.limits
    }

    pub fn kernels(&self) -> &[Arc<KernelInfo>] {
        &self.kernels
    }

    pub fn kernel(&self, name: &str) -> Option<&Arc<KernelInfo>> {
        self.kernels.iter().find(|info| info.name == name)
    }
}
