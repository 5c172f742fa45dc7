use std::sync::Arc;

use ndlaunch_device::memory::UNINIT_FILL;
use ndlaunch_device::{
    Buffer, CommandQueue, Device, DeviceLimits, DeviceMemory, DevicePointer, Event, EventAction, EventStatus,
    KernelInfo, ParamInfo, Program,
};
use test_case::test_case;

use crate::test::helpers::{AllocEvent, Fixture, mixed_kernel, scale_kernel};
use crate::{ArgValue, ArgumentTable, DispatchConfig, Error, ExecutionRequest, Kernel, KernelExecution};

fn local_kernel() -> KernelInfo {
    KernelInfo::new("scratch", vec![ParamInfo::local_pointer("tmp", "float*")])
}

#[test]
fn test_mixed_arguments_end_to_end() {
    let fixture = Fixture::new(vec![mixed_kernel()]);
    let mut kernel = Kernel::new(&fixture.program, "mixed").unwrap();
    let payload = [3, 0, 0, 0, 4, 0, 0, 0];
    kernel.set_arg_value(0, &5i32).unwrap();
    kernel.set_arg_value(1, &2.5f32).unwrap();
    kernel.set_arg_local(2, 128).unwrap();
    kernel.set_arg(3, 8, Some(ArgValue::Bytes(&payload))).unwrap();

    let event = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[256], Some(&[32]), None).unwrap();
    event.wait().unwrap();
    assert_eq!(event.status(), EventStatus::Complete);

    let launches = fixture.dispatcher.launches();
    assert_eq!(launches.len(), 1);
    let launch = &launches[0];
    assert_eq!(launch.entry_point, "mixed");
    assert_eq!((launch.global_size, launch.local_size), ([256, 1, 1], [32, 1, 1]));
    assert_eq!(launch.words(0), &[5]);
    assert_eq!(launch.words(1), &[2.5f32.to_bits()]);
    assert_eq!(launch.regions[2].as_ref().map(Vec::len), Some(128));
    assert_eq!(launch.regions[3].as_deref(), Some(&payload[..]));

    assert_eq!(fixture.allocator.allocs(), vec![128, 8]);
    assert_eq!(fixture.allocator.frees(), vec![128, 8]);
    assert_eq!(fixture.device.memory().live_regions(), 0);
}

#[test]
fn test_snapshot_isolation() {
    let fixture = Fixture::new(vec![mixed_kernel()]);
    let mut kernel = Kernel::new(&fixture.program, "mixed").unwrap();
    kernel.set_arg_value(0, &1i32).unwrap();
    kernel.set_arg_value(1, &0.5f32).unwrap();
    kernel.set_arg_local(2, 16).unwrap();
    kernel.set_arg_value(3, &[7u32, 8u32]).unwrap();
    let gate = Event::new();

    let first = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[8], None, Some(&[Arc::clone(&gate)])).unwrap();
    kernel.set_arg_value(0, &2i32).unwrap();
    kernel.set_arg_local(2, 32).unwrap();
    let second = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[8], None, None).unwrap();

    gate.complete();
    first.wait().unwrap();
    second.wait().unwrap();

    let launches = fixture.dispatcher.launches();
    assert_eq!(launches[0].words(0), &[1]);
    assert_eq!(launches[1].words(0), &[2]);
    assert_eq!(fixture.allocator.allocs(), vec![16, 8, 32, 8]);
}

#[test]
fn test_local_buffer_released_after_failed_dispatch() {
    let fixture = Fixture::new(vec![local_kernel()]);
    let mut kernel = Kernel::new(&fixture.program, "scratch").unwrap();
    kernel.set_arg_local(0, 256).unwrap();
    fixture.dispatcher.fail();

    let event = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[64], Some(&[16]), None).unwrap();
    assert!(event.wait().is_err());

    assert_eq!(event.status(), EventStatus::Failed(-5));
    assert_eq!(fixture.allocator.allocs(), vec![256]);
    assert_eq!(fixture.allocator.frees(), vec![256]);
    assert_eq!(fixture.device.memory().live_regions(), 0);
}

#[test]
fn test_allocation_failure_unwinds() {
    let fixture = Fixture::new(vec![mixed_kernel()]);
    let mut kernel = Kernel::new(&fixture.program, "mixed").unwrap();
    kernel.set_arg_value(0, &5i32).unwrap();
    kernel.set_arg_value(1, &2.5f32).unwrap();
    kernel.set_arg_local(2, 128).unwrap();
    kernel.set_arg_value(3, &[1u32, 2u32]).unwrap();
    fixture.allocator.fail_after(1);

    let event = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[32], None, None).unwrap();
    assert!(event.wait().is_err());

    assert_eq!(event.status(), EventStatus::Failed(-4));
    assert_eq!(fixture.allocator.allocs(), vec![128]);
    assert_eq!(fixture.allocator.frees(), vec![128]);
    assert!(fixture.dispatcher.launches().is_empty());
}

/// `staged(__local a, struct pair p, __local b)` with the by-value payload between two locals.
fn staged_kernel(by_value_last: bool) -> KernelInfo {
    let pair = ParamInfo::by_value("p", "struct pair", 8);
    let mut params = vec![ParamInfo::local_pointer("a", "float*"), ParamInfo::local_pointer("b", "float*")];
    params.insert(if by_value_last { 2 } else { 1 }, pair);
    KernelInfo::new("staged", params)
}

fn bind_staged(kernel: &mut Kernel, by_value_last: bool) {
    let (locals, pair) = if by_value_last { ([0, 1], 2) } else { ([0, 2], 1) };
    kernel.set_arg_local(locals[0], 32).unwrap();
    kernel.set_arg_local(locals[1], 64).unwrap();
    kernel.set_arg_value(pair, &[9u32, 10u32]).unwrap();
}

fn assert_every_alloc_freed(fixture: &Fixture) {
    let log = fixture.allocator.log();
    let allocated: Vec<_> = log
        .iter()
        .filter_map(|event| match *event {
            AllocEvent::Alloc { pointer, .. } => Some(pointer),
            AllocEvent::Free { .. } => None,
        })
        .collect();
    let mut freed: Vec<_> = log
        .iter()
        .filter_map(|event| match *event {
            AllocEvent::Free { pointer, .. } => Some(pointer),
            AllocEvent::Alloc { .. } => None,
        })
        .collect();
    freed.sort();
    let mut expected = allocated.clone();
    expected.sort();
    assert_eq!(freed, expected);
    assert_eq!(fixture.device.memory().live_regions(), 0);
}

#[test_case(false, 1, vec![32] ; "by-value fails between locals")]
#[test_case(true, 2, vec![32, 64] ; "by-value fails after both locals")]
fn test_by_value_allocation_failure_unwinds(by_value_last: bool, granted: usize, allocs: Vec<usize>) {
    let fixture = Fixture::new(vec![staged_kernel(by_value_last)]);
    let mut kernel = Kernel::new(&fixture.program, "staged").unwrap();
    bind_staged(&mut kernel, by_value_last);
    fixture.allocator.fail_after(granted);

    let event = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[16], None, None).unwrap();
    assert!(event.wait().is_err());

    assert_eq!(event.status(), EventStatus::Failed(-4));
    assert_eq!(fixture.allocator.allocs(), allocs);
    assert_eq!(fixture.allocator.frees().len(), allocs.len());
    assert_every_alloc_freed(&fixture);
    assert!(fixture.dispatcher.launches().is_empty());
}

#[test]
fn test_by_value_write_failure_unwinds() {
    let fixture = Fixture::new(vec![staged_kernel(false)]);
    let mut kernel = Kernel::new(&fixture.program, "staged").unwrap();
    bind_staged(&mut kernel, false);
    fixture.allocator.dangle_after(1);

    let event = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[16], None, None).unwrap();
    assert!(event.wait().is_err());

    // The local allocation succeeds; writing the payload into its scratch region faults.
    assert_eq!(event.status(), EventStatus::Failed(-5));
    assert_eq!(fixture.allocator.allocs(), vec![32, 8]);
    assert_eq!(fixture.allocator.frees(), vec![8, 32]);
    assert_every_alloc_freed(&fixture);
    assert!(fixture.dispatcher.launches().is_empty());
}

#[test]
fn test_later_actions_run_after_failure() {
    let fixture = Fixture::new(vec![local_kernel()]);
    let mut kernel = Kernel::new(&fixture.program, "scratch").unwrap();
    kernel.set_arg_local(0, 64).unwrap();
    fixture.allocator.fail_after(0);

    let failed = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[4], None, None).unwrap();
    assert!(failed.wait().is_err());

    fixture.allocator.fail_after(usize::MAX);
    let ok = kernel.enqueue_nd_range(&fixture.queue, 1, None, &[4], None, None).unwrap();
    ok.wait().unwrap();
    assert_eq!(fixture.dispatcher.launches().len(), 1);
}

#[test]
fn test_pointer_arguments_pass_device_address() {
    let fixture = Fixture::new(vec![scale_kernel()]);
    let buffer = Buffer::new(&fixture.device_allocator(), 64, Default::default()).unwrap();
    let mut kernel = Kernel::new(&fixture.program, "scale").unwrap();
    kernel.set_arg_buffer(0, Some(&buffer)).unwrap();
    kernel.set_arg_value(1, &1.0f32).unwrap();

    kernel.enqueue_nd_range(&fixture.queue, 1, None, &[16], None, None).unwrap().wait().unwrap();
    kernel.set_arg_buffer(0, None).unwrap();
    kernel.enqueue_nd_range(&fixture.queue, 1, None, &[16], None, None).unwrap().wait().unwrap();

    let launches = fixture.dispatcher.launches();
    assert_eq!(launches[0].pointer(0), Some(buffer.device_pointer()));
    assert_eq!(launches[1].pointer(0), Some(DevicePointer::NULL));
    assert_eq!(fixture.allocator.allocs(), vec![64]);
}

#[test]
fn test_zero_local_memory_config() {
    let fixture = Fixture::new(vec![local_kernel()]);
    let mut kernel = Kernel::new(&fixture.program, "scratch").unwrap().with_config(DispatchConfig::default());
    kernel.set_arg_local(0, 32).unwrap();
    kernel.enqueue_task(&fixture.queue, None).unwrap().wait().unwrap();

    let mut kernel = kernel.with_config(DispatchConfig::builder().zero_local_memory(true).build());
    kernel.set_arg_local(0, 32).unwrap();
    kernel.enqueue_task(&fixture.queue, None).unwrap().wait().unwrap();

    let launches = fixture.dispatcher.launches();
    assert!(launches[0].regions[0].as_ref().unwrap().iter().all(|&b| b == UNINIT_FILL));
    assert!(launches[1].regions[0].as_ref().unwrap().iter().all(|&b| b == 0));
}

#[test]
fn test_run_reports_dispatch_failure() {
    let fixture = Fixture::new(vec![local_kernel()]);
    fixture.dispatcher.fail();
    let request = ExecutionRequest::new(
        Arc::clone(&fixture.device),
        Arc::clone(&fixture.program.kernels()[0]),
        2,
        &[0, 0],
        &[8, 8],
        &[4, 4],
        {
            let mut args = ArgumentTable::new(1);
            args.bind(0, &fixture.program.kernels()[0].params[0], 64, None).unwrap();
            args
        },
        DispatchConfig::default(),
    );
    assert_eq!(request.num_groups(), [2, 2, 1]);
    assert_eq!(request.kernel_name(), "scratch");

    let execution = KernelExecution::new(request);
    let err = execution.run().unwrap_err();
    assert!(matches!(err, Error::DeviceDispatchFailure { .. }));
    assert_eq!(err.code(), -5);

    let err = Box::new(execution).execute().unwrap_err();
    assert_eq!(err.status_code(), -5);
    assert_eq!(fixture.allocator.frees(), vec![64, 64]);
}

#[test]
fn test_host_device_runs_kernel() {
    let memory = Arc::new(DeviceMemory::default());
    let (device, host) = Device::host(DeviceLimits::default(), memory);
    host.register("scale", |item| {
        let data = item.arg_pointer(0)?.offset(item.global_id(0) * 4);
        let value = item.memory().read_f32(data)?;
        item.memory().write_f32(data, value * item.arg_f32(1))
    });
    let program = Program::new(Arc::clone(&device), vec![scale_kernel()]);
    let queue = CommandQueue::new(Arc::clone(&device));

    let input: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let buffer = Buffer::from_bytes(&device.allocator, bytemuck::cast_slice(&input)).unwrap();
    let mut kernel = Kernel::new(&program, "scale").unwrap();
    kernel.set_arg_buffer(0, Some(&buffer)).unwrap();
    kernel.set_arg_value(1, &3.0f32).unwrap();

    kernel.enqueue_nd_range(&queue, 1, None, &[16], Some(&[4]), None).unwrap().wait().unwrap();

    let bytes = buffer.to_vec().unwrap();
    let output: Vec<f32> = bytes.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect();
    assert_eq!(output, input.iter().map(|v| v * 3.0).collect::<Vec<_>>());
}

#[test]
fn test_host_device_kernel_fault() {
    let memory = Arc::new(DeviceMemory::default());
    let (device, host) = Device::host(DeviceLimits::default(), memory);
    host.register("scale", |item| if item.global_id(0) == 5 { item.fault("boom") } else { Ok(()) });
    let program = Program::new(Arc::clone(&device), vec![scale_kernel()]);
    let queue = CommandQueue::new(Arc::clone(&device));
    let mut kernel = Kernel::new(&program, "scale").unwrap();
    kernel.set_arg_buffer(0, None).unwrap();
    kernel.set_arg_value(1, &1.0f32).unwrap();

    let event = kernel.enqueue_nd_range(&queue, 1, None, &[8], None, None).unwrap();
    assert!(event.wait().is_err());
    assert_eq!(event.status(), EventStatus::Failed(-5));
}
