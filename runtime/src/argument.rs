//! Kernel argument model.
//!
//! Every formal parameter of a kernel owns one [`KernelArgument`]: a list of
//! raw 32-bit words plus an optional byte count the runtime allocates on the
//! caller's behalf before each dispatch. The classification of an argument is
//! derived from those two fields:
//!
//! | `size_to_allocate` | `scalar_values` | class                           |
//! |--------------------|-----------------|---------------------------------|
//! | `> 0`              | empty           | [`ArgumentClass::Local`]        |
//! | `> 0`              | non-empty       | [`ArgumentClass::ByValue`]      |
//! | `0`                | any             | [`ArgumentClass::Plain`]        |
//!
//! Words follow the device ABI: each vector element takes its own word, 1- and
//! 2-byte elements are widened (sign-extended when signed) and 8-byte elements
//! take two words, low word first.

use std::fmt;

use ndlaunch_device::{Buffer, DevicePointer, MEM_HANDLE_SIZE, ParamInfo, ParamKind, ScalarKind};
use smallvec::SmallVec;
use snafu::ensure;
use tracing::trace;

use crate::config::MAX_PARAMETER_COUNT;
use crate::error::{InvalidArgIndexSnafu, InvalidArgSizeSnafu, InvalidArgValueSnafu, Result};

/// One 32-bit argument word with float, unsigned and signed views over the same bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ScalarValue(u32);

impl ScalarValue {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn from_f32(value: f32) -> Self {
        Self(value.to_bits())
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    pub const fn from_i32(value: i32) -> Self {
        Self(value as u32)
    }

    pub fn float(self) -> f32 {
        f32::from_bits(self.0)
    }

    pub const fn unsigned(self) -> u32 {
        self.0
    }

    pub const fn signed(self) -> i32 {
        self.0 as i32
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Classification of a bound argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ArgumentClass {
    /// Per-dispatch scratch memory of `size_to_allocate` bytes.
    Local,
    /// Raw bytes copied into a fresh buffer before each dispatch.
    ByValue,
    /// Scalar words or a device address, passed as stored.
    Plain,
}

/// Bound value of a single kernel parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelArgument {
    pub scalar_values: SmallVec<[ScalarValue; 4]>,
    /// Bytes the runtime allocates before dispatch and frees afterwards; zero for none.
    pub size_to_allocate: usize,
}

impl KernelArgument {
    /// Local scratch argument of `size` bytes.
    pub fn local(size: usize) -> Self {
        Self { scalar_values: SmallVec::new(), size_to_allocate: size }
    }

    /// By-value argument holding a copy of `data`.
    pub fn by_value(data: &[u8]) -> Self {
        let mut argument = Self::default();
        argument.set_direct_data(data);
        argument
    }

    /// Pointer argument holding the device address of a buffer, or null.
    pub fn pointer(pointer: DevicePointer) -> Self {
        let mut argument = Self::default();
        argument.add_pointer(pointer);
        argument
    }

    pub fn add_scalar(&mut self, value: ScalarValue) {
        self.scalar_values.push(value);
    }

    pub fn add_scalar_f32(&mut self, value: f32) {
        self.add_scalar(ScalarValue::from_f32(value));
    }

    pub fn add_scalar_u32(&mut self, value: u32) {
        self.add_scalar(ScalarValue::from_u32(value));
    }

    pub fn add_scalar_i32(&mut self, value: i32) {
        self.add_scalar(ScalarValue::from_i32(value));
    }

    pub fn add_pointer(&mut self, pointer: DevicePointer) {
        self.add_scalar_u32(pointer.address());
    }

    /// Store `data` packed little-endian into words and mark it by-value.
    pub fn set_direct_data(&mut self, data: &[u8]) {
        self.scalar_values.clear();
        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.add_scalar_u32(u32::from_le_bytes(word));
        }
        self.size_to_allocate = data.len();
    }

    /// The by-value payload, exactly `size_to_allocate` bytes long.
    pub fn direct_data(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.scalar_values.iter().flat_map(|value| value.bits().to_le_bytes()).collect();
        bytes.truncate(self.size_to_allocate);
        bytes
    }

    pub fn words(&self) -> SmallVec<[u32; 4]> {
        self.scalar_values.iter().map(|value| value.bits()).collect()
    }

    /// Device address stored by a pointer bind.
    pub fn device_pointer(&self) -> DevicePointer {
        self.scalar_values.first().map_or(DevicePointer::NULL, |value| DevicePointer::new(value.bits()))
    }

    pub fn is_local_parameter(&self) -> bool {
        self.size_to_allocate > 0 && self.scalar_values.is_empty()
    }

    pub fn is_by_value_parameter(&self) -> bool {
        self.size_to_allocate > 0 && !self.scalar_values.is_empty()
    }

    pub fn class(&self) -> ArgumentClass {
        if self.is_local_parameter() {
            ArgumentClass::Local
        } else if self.is_by_value_parameter() {
            ArgumentClass::ByValue
        } else {
            ArgumentClass::Plain
        }
    }
}

impl fmt::Display for KernelArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class() {
            ArgumentClass::Local => write!(f, "local({} bytes)", self.size_to_allocate),
            ArgumentClass::ByValue => write!(f, "byval({} bytes: {:?})", self.size_to_allocate, self.scalar_values),
            ArgumentClass::Plain => write!(f, "{:?}", self.scalar_values),
        }
    }
}

const MASK_WORDS: usize = MAX_PARAMETER_COUNT.div_ceil(64);

/// Fixed-capacity set of parameter indices.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ArgMask([u64; MASK_WORDS]);

impl ArgMask {
    /// Mask holding every index in `[0, count)`; `count` is clamped to the capacity.
    pub fn prefix(count: usize) -> Self {
        let count = count.min(MAX_PARAMETER_COUNT);
        let mut mask = Self::default();
        for (word, bits) in mask.0.iter_mut().enumerate() {
            let start = word * 64;
            *bits = match count.saturating_sub(start) {
                0 => 0,
                n if n >= 64 => u64::MAX,
                n => (1u64 << n) - 1,
            };
        }
        mask
    }

    pub fn insert(&mut self, index: usize) {
        debug_assert!(index < MAX_PARAMETER_COUNT);
        self.0[index / 64] |= 1 << (index % 64);
    }

    pub fn contains(&self, index: usize) -> bool {
        index < MAX_PARAMETER_COUNT && self.0[index / 64] & (1 << (index % 64)) != 0
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|bits| bits.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&bits| bits == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_PARAMETER_COUNT).filter(|&index| self.contains(index))
    }
}

impl fmt::Debug for ArgMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Caller-supplied value of a bind.
#[derive(Debug, Clone, Copy)]
pub enum ArgValue<'a> {
    /// Raw bytes: scalar and by-value data, or a zeroed handle meaning "no buffer".
    Bytes(&'a [u8]),
    /// A memory object for pointer parameters.
    Buffer(&'a Buffer),
}

/// Bound values of every parameter of one kernel, plus which ones were bound.
///
/// Cloning produces an independent snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentTable {
    args: Vec<KernelArgument>,
    set_mask: ArgMask,
    required: ArgMask,
}

impl ArgumentTable {
    /// Empty table for `count` parameters; `count` must not exceed [`MAX_PARAMETER_COUNT`].
    pub fn new(count: usize) -> Self {
        debug_assert!(count <= MAX_PARAMETER_COUNT);
        Self {
            args: vec![KernelArgument::default(); count],
            set_mask: ArgMask::default(),
            required: ArgMask::prefix(count),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&KernelArgument> {
        self.args.get(index)
    }

    pub fn args(&self) -> &[KernelArgument] {
        &self.args
    }

    pub fn set_mask(&self) -> ArgMask {
        self.set_mask
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.set_mask.contains(index)
    }

    /// Whether every declared parameter has been bound.
    pub fn is_complete(&self) -> bool {
        self.set_mask == self.required
    }

    /// Indices that have never been bound.
    pub fn missing(&self) -> Vec<usize> {
        self.required.iter().filter(|&index| !self.set_mask.contains(index)).collect()
    }

    /// Total bytes of local scratch memory currently bound.
    pub fn local_mem_size(&self) -> u64 {
        self.args.iter().filter(|arg| arg.is_local_parameter()).map(|arg| arg.size_to_allocate as u64).sum()
    }

    /// Bind `value` to parameter `index` described by `param`, replacing any previous binding.
    pub fn bind(&mut self, index: usize, param: &ParamInfo, size: usize, value: Option<ArgValue<'_>>) -> Result<()> {
        let count = self.args.len();
        ensure!(index < count, InvalidArgIndexSnafu { index, count });

        let argument = match param.kind() {
            ParamKind::Scalar => scalar_argument(index, param, size, value)?,
            ParamKind::GlobalPointer | ParamKind::ConstantPointer => pointer_argument(index, param, size, value)?,
            ParamKind::LocalPointer => local_argument(index, param, size, value)?,
            ParamKind::ByValue => by_value_argument(index, param, size, value)?,
        };
        trace!(index, param = %param.name, kind = %param.kind(), argument = %argument, "argument bound");

        self.args[index] = argument;
        self.set_mask.insert(index);
        Ok(())
    }
}

/// The first `size` bytes of a raw value.
fn value_bytes<'a>(index: usize, param: &ParamInfo, size: usize, value: Option<ArgValue<'a>>) -> Result<&'a [u8]> {
    let name = param.name.as_str();
    match value {
        None => InvalidArgValueSnafu { index, name, reason: "value is required" }.fail(),
        Some(ArgValue::Buffer(_)) => {
            InvalidArgValueSnafu { index, name, reason: "memory object given for a non-pointer parameter" }.fail()
        }
        Some(ArgValue::Bytes(bytes)) => {
            ensure!(
                bytes.len() >= size,
                InvalidArgValueSnafu { index, name, reason: format!("value holds {} of {size} bytes", bytes.len()) }
            );
            Ok(&bytes[..size])
        }
    }
}

fn scalar_argument(
    index: usize,
    param: &ParamInfo,
    size: usize,
    value: Option<ArgValue<'_>>,
) -> Result<KernelArgument> {
    let element = param.element_size();
    let elements = usize::from(param.elements);
    let accepted = size == param.size || (elements == 3 && size == element * 3);
    ensure!(
        accepted,
        InvalidArgSizeSnafu {
            index,
            name: param.name.as_str(),
            size,
            expected: if elements == 3 {
                format!("{} or {} bytes", element * 3, param.size)
            } else {
                format!("{} bytes", param.size)
            },
        }
    );

    let bytes = value_bytes(index, param, size, value)?;
    let signed = param.scalar.is_some_and(ScalarKind::is_signed);
    let float = param.scalar.is_some_and(ScalarKind::is_float);
    let mut argument = KernelArgument::default();
    for chunk in bytes.chunks_exact(element.max(1)).take(elements) {
        match *chunk {
            [byte] if signed => argument.add_scalar_i32(i32::from(byte as i8)),
            [byte] => argument.add_scalar_u32(u32::from(byte)),
            [lo, hi] if signed => argument.add_scalar_i32(i32::from(i16::from_le_bytes([lo, hi]))),
            [lo, hi] => argument.add_scalar_u32(u32::from(u16::from_le_bytes([lo, hi]))),
            [a, b, c, d] if float => argument.add_scalar_f32(f32::from_le_bytes([a, b, c, d])),
            [a, b, c, d] => argument.add_scalar_u32(u32::from_le_bytes([a, b, c, d])),
            [a, b, c, d, e, f, g, h] => {
                argument.add_scalar_u32(u32::from_le_bytes([a, b, c, d]));
                argument.add_scalar_u32(u32::from_le_bytes([e, f, g, h]));
            }
            _ => argument.scalar_values.extend(KernelArgument::by_value(chunk).scalar_values),
        }
    }
    Ok(argument)
}

fn pointer_argument(
    index: usize,
    param: &ParamInfo,
    size: usize,
    value: Option<ArgValue<'_>>,
) -> Result<KernelArgument> {
    let name = param.name.as_str();
    ensure!(
        size == MEM_HANDLE_SIZE,
        InvalidArgSizeSnafu { index, name, size, expected: format!("{MEM_HANDLE_SIZE} bytes") }
    );

    let pointer = match value {
        None => DevicePointer::NULL,
        Some(ArgValue::Buffer(buffer)) => buffer.device_pointer(),
        Some(ArgValue::Bytes(bytes)) if bytes.len() >= size && bytes[..size].iter().all(|&b| b == 0) => {
            DevicePointer::NULL
        }
        Some(ArgValue::Bytes(_)) => {
            return InvalidArgValueSnafu { index, name, reason: "expected a memory object or a null handle" }.fail();
        }
    };
    Ok(KernelArgument::pointer(pointer))
}

fn local_argument(index: usize, param: &ParamInfo, size: usize, value: Option<ArgValue<'_>>) -> Result<KernelArgument> {
    let name = param.name.as_str();
    ensure!(size > 0, InvalidArgSizeSnafu { index, name, size, expected: "a non-zero size" });
    ensure!(value.is_none(), InvalidArgValueSnafu { index, name, reason: "local memory arguments take no value" });
    Ok(KernelArgument::local(size))
}

fn by_value_argument(
    index: usize,
    param: &ParamInfo,
    size: usize,
    value: Option<ArgValue<'_>>,
) -> Result<KernelArgument> {
    ensure!(
        size > 0 && size == param.size,
        InvalidArgSizeSnafu { index, name: param.name.as_str(), size, expected: format!("{} bytes", param.size) }
    );
    let bytes = value_bytes(index, param, size, value)?;
    Ok(KernelArgument::by_value(bytes))
}
