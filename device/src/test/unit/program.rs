use std::sync::Arc;

use enumset::EnumSet;
use test_case::test_case;

use crate::{
    AccessQualifier, AddressSpace, Device, DeviceLimits, DeviceMemory, KernelInfo, MEM_HANDLE_SIZE, ParamInfo,
    ParamKind, Program, ScalarKind, TypeQualifier,
};

#[test_case(ParamInfo::scalar("a", ScalarKind::Int, 1), ParamKind::Scalar; "scalar")]
#[test_case(ParamInfo::scalar("v", ScalarKind::Float, 4), ParamKind::Scalar; "vector")]
#[test_case(ParamInfo::global_pointer("g", "float*"), ParamKind::GlobalPointer; "global")]
#[test_case(ParamInfo::constant_pointer("c", "int*"), ParamKind::ConstantPointer; "constant")]
#[test_case(ParamInfo::local_pointer("l", "char*"), ParamKind::LocalPointer; "local")]
#[test_case(ParamInfo::by_value("s", "struct pair", 8), ParamKind::ByValue; "by_value")]
fn test_param_kind(param: ParamInfo, kind: ParamKind) {
    assert_eq!(param.kind(), kind);
    assert_eq!(param.kind().is_pointer(), kind != ParamKind::Scalar);
}

#[test_case(ScalarKind::Char, 1, 1)]
#[test_case(ScalarKind::Short, 2, 4)]
#[test_case(ScalarKind::Int, 3, 16)]
#[test_case(ScalarKind::Float, 4, 16)]
#[test_case(ScalarKind::Long, 2, 16)]
fn test_scalar_param_size(scalar: ScalarKind, elements: u8, size: usize) {
    let param = ParamInfo::scalar("p", scalar, elements);
    assert_eq!(param.size, size);
    assert_eq!(param.element_size(), scalar.bytes());
}

#[test_case(ScalarKind::Char, true, false)]
#[test_case(ScalarKind::UInt, false, false)]
#[test_case(ScalarKind::Half, false, true)]
#[test_case(ScalarKind::Float, false, true)]
fn test_scalar_kind_flags(scalar: ScalarKind, signed: bool, float: bool) {
    assert_eq!(scalar.is_signed(), signed);
    assert_eq!(scalar.is_float(), float);
}

#[test]
fn test_param_type_names() {
    assert_eq!(ParamInfo::scalar("a", ScalarKind::UInt, 1).type_name, "uint");
    assert_eq!(ParamInfo::scalar("a", ScalarKind::Float, 4).type_name, "float4");
    assert_eq!(AddressSpace::Local.to_string(), "__local");
}

#[test]
fn test_param_qualifiers() {
    let param = ParamInfo::constant_pointer("c", "int*")
        .with_access(AccessQualifier::ReadOnly)
        .with_qualifiers(TypeQualifier::Restrict | TypeQualifier::Volatile);

    assert_eq!(param.size, MEM_HANDLE_SIZE);
    assert_eq!(param.access, AccessQualifier::ReadOnly);
    assert_eq!(param.qualifiers.as_repr(), 0b111);
    assert_eq!(ParamInfo::global_pointer("g", "int*").qualifiers, EnumSet::empty());
}

#[test]
fn test_program_lookup() {
    let (device, _) = Device::host(DeviceLimits::default(), Arc::new(DeviceMemory::default()));
    let program = Program::new(
        device,
        vec![
            KernelInfo::new("first", vec![]),
            KernelInfo::new("second", vec![]).with_compile_group_size([4, 1, 1]),
        ],
    );

    assert_eq!(program.kernels().len(), 2);
    assert!(program.kernel("missing").is_none());
    let second = program.kernel("second").unwrap();
    assert_eq!(second.attributes(), "reqd_work_group_size(4,1,1)");
    assert_eq!(program.kernel("first").unwrap().attributes(), "");
}

#[test]
fn test_limits_builder() {
    let limits = DeviceLimits::builder().max_work_group_size(64).build();
    assert_eq!(limits.max_work_item_sizes, [64; 3]);
    assert_eq!(limits.preferred_work_group_size_multiple, 16);

    let limits = DeviceLimits::builder().max_work_item_sizes([8, 4, 2]).local_mem_size(1024).build();
    assert_eq!(limits.max_work_group_size, 256);
    assert_eq!(limits.max_work_item_sizes, [8, 4, 2]);
    assert_eq!(limits.local_mem_size, 1024);
}
