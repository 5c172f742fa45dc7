//! Kernel, work-group and argument info queries.
//!
//! Each query family has a typed entry point returning an [`InfoValue`] and a
//! raw entry point taking the numeric query id and an optional output buffer.
//! The raw form follows the usual two-step convention: call with `None` to
//! learn the size, then with a buffer at least that large.

use snafu::{OptionExt, ensure};

use crate::error::{InvalidArgIndexSnafu, InvalidValueSnafu, Result};
use crate::kernel::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::FromRepr)]
#[repr(u32)]
pub enum KernelInfoParam {
    FunctionName = 0x1190,
    NumArgs = 0x1191,
    ReferenceCount = 0x1192,
    Context = 0x1193,
    Program = 0x1194,
    Attributes = 0x1195,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::FromRepr)]
#[repr(u32)]
pub enum WorkGroupInfoParam {
    WorkGroupSize = 0x11B0,
    CompileWorkGroupSize = 0x11B1,
    LocalMemSize = 0x11B2,
    PreferredWorkGroupSizeMultiple = 0x11B3,
    PrivateMemSize = 0x11B4,
    GlobalWorkSize = 0x11B5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::FromRepr)]
#[repr(u32)]
pub enum ArgInfoParam {
    AddressQualifier = 0x1196,
    AccessQualifier = 0x1197,
    TypeName = 0x1198,
    TypeQualifier = 0x1199,
    Name = 0x119A,
}

/// Result of an info query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    /// Written NUL-terminated.
    Str(String),
    U32(u32),
    U64(u64),
    /// Host `usize`.
    Size(usize),
    /// One `usize` per dimension.
    Sizes([usize; 3]),
}

impl InfoValue {
    /// Little-endian encoding of the value.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            InfoValue::Str(s) => s.bytes().chain(std::iter::once(0)).collect(),
            InfoValue::U32(v) => v.to_le_bytes().to_vec(),
            InfoValue::U64(v) => v.to_le_bytes().to_vec(),
            InfoValue::Size(v) => v.to_le_bytes().to_vec(),
            InfoValue::Sizes(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            InfoValue::Str(s) => s.len() + 1,
            InfoValue::U32(_) => size_of::<u32>(),
            InfoValue::U64(_) => size_of::<u64>(),
            InfoValue::Size(_) => size_of::<usize>(),
            InfoValue::Sizes(values) => size_of_val(values),
        }
    }

    /// Copy the value into `out` if given and return its size in bytes.
    pub fn write(&self, out: Option<&mut [u8]>) -> Result<usize> {
        let size = self.size();
        if let Some(out) = out {
            ensure!(
                out.len() >= size,
                InvalidValueSnafu { reason: format!("output buffer of {} bytes, {size} required", out.len()) }
            );
            out[..size].copy_from_slice(&self.to_bytes());
        }
        Ok(size)
    }
}

impl Kernel {
    pub fn kernel_info(&self, param: KernelInfoParam) -> Result<InfoValue> {
        let info = self.info();
        Ok(match param {
            KernelInfoParam::FunctionName => InfoValue::Str(info.name.clone()),
            KernelInfoParam::NumArgs => InfoValue::U32(self.num_args() as u32),
            KernelInfoParam::Program => InfoValue::U64(self.program().id()),
            KernelInfoParam::Attributes => InfoValue::Str(info.attributes()),
            KernelInfoParam::ReferenceCount | KernelInfoParam::Context => {
                return InvalidValueSnafu { reason: format!("{param} is answered by the object layer") }.fail();
            }
        })
    }

    pub fn work_group_info(&self, param: WorkGroupInfoParam) -> Result<InfoValue> {
        let limits = self.limits();
        Ok(match param {
            WorkGroupInfoParam::WorkGroupSize => InfoValue::Size(limits.max_work_group_size),
            WorkGroupInfoParam::CompileWorkGroupSize => {
                InfoValue::Sizes(self.info().compile_group_size.unwrap_or([0; 3]))
            }
            WorkGroupInfoParam::LocalMemSize => InfoValue::U64(self.args().local_mem_size()),
            WorkGroupInfoParam::PreferredWorkGroupSizeMultiple => {
                InfoValue::Size(limits.preferred_work_group_size_multiple)
            }
            WorkGroupInfoParam::PrivateMemSize => InfoValue::U64(self.info().private_mem_size),
            WorkGroupInfoParam::GlobalWorkSize => {
                return InvalidValueSnafu { reason: "global work size is only defined for built-in kernels" }.fail();
            }
        })
    }

    pub fn arg_info(&self, index: usize, param: ArgInfoParam) -> Result<InfoValue> {
        let count = self.num_args();
        let arg = self.info().params.get(index).context(InvalidArgIndexSnafu { index, count })?;
        Ok(match param {
            ArgInfoParam::AddressQualifier => InfoValue::U32(arg.address_space as u32),
            ArgInfoParam::AccessQualifier => InfoValue::U32(arg.access as u32),
            ArgInfoParam::TypeName => InfoValue::Str(arg.type_name.clone()),
            ArgInfoParam::TypeQualifier => InfoValue::U64(u64::from(arg.qualifiers.as_u32())),
            ArgInfoParam::Name => InfoValue::Str(arg.name.clone()),
        })
    }

    /// Raw kernel info query; returns the size of the value.
    pub fn get_info(&self, param: u32, out: Option<&mut [u8]>) -> Result<usize> {
        let param = KernelInfoParam::from_repr(param).context(InvalidValueSnafu { reason: unknown(param) })?;
        self.kernel_info(param)?.write(out)
    }

    /// Raw work-group info query; returns the size of the value.
    pub fn get_work_group_info(&self, param: u32, out: Option<&mut [u8]>) -> Result<usize> {
        let param = WorkGroupInfoParam::from_repr(param).context(InvalidValueSnafu { reason: unknown(param) })?;
        self.work_group_info(param)?.write(out)
    }

    /// Raw argument info query; returns the size of the value.
    pub fn get_arg_info(&self, index: usize, param: u32, out: Option<&mut [u8]>) -> Result<usize> {
        let param = ArgInfoParam::from_repr(param).context(InvalidValueSnafu { reason: unknown(param) })?;
        self.arg_info(index, param)?.write(out)
    }
}

fn unknown(param: u32) -> String {
    format!("unsupported query 0x{param:04x}")
}
