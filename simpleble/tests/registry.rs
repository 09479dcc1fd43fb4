use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use simpleble::{
    Bluetooth, Config, DeliveryPolicy, ErrorKind, HandleId, HandleSource, Ownership,
};
use simpleble_testkit::{FakePeripheral, FakeStack, TestHost, init_tracing};

fn two_adapter_stack() -> Arc<FakeStack> {
    let stack = Arc::new(FakeStack::new());
    stack.add_adapter("hci0", "00:11:22:33:44:55");
    stack.add_adapter("hci1", "66:77:88:99:aa:bb");
    stack
}

#[test]
fn release_is_idempotent() {
    init_tracing();
    let host = TestHost::with_adapter();
    let adapter = host.first_adapter().unwrap();
    let id = adapter.handle().id();

    assert!(host.bluetooth.registry().validate(id.get()));
    assert!(adapter.release());
    assert!(!adapter.release());
    assert!(!host.bluetooth.registry().release(id));

    assert_eq!(host.stack.release_count(), 1);
    assert_eq!(host.stack.double_releases(), 0);
    assert!(!host.bluetooth.registry().validate(id.get()));
    assert_eq!(adapter.identifier().unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(host.stack.stale_calls(), 0);
}

#[test]
fn zero_and_unknown_handles_are_invalid() {
    let host = TestHost::with_adapter();
    let registry = host.bluetooth.registry();

    assert!(!registry.validate(0));
    assert!(!registry.validate(u64::MAX));

    let unknown = HandleId::from_u64(4096).unwrap();
    assert_eq!(registry.resource(unknown).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert!(!registry.release(unknown));
}

#[test]
fn handle_ids_are_never_reused() {
    let host = TestHost::with_adapter();
    let registry = host.bluetooth.registry();

    let first = registry.acquire(HandleSource::Adapters, 0).unwrap();
    assert!(registry.release(first));
    let second = registry.acquire(HandleSource::Adapters, 0).unwrap();

    assert_ne!(first, second);
    assert!(!registry.validate(first.get()));
    assert!(registry.validate(second.get()));
}

#[test]
fn out_of_range_index_is_not_found() {
    let host = TestHost::with_adapter();
    let registry = host.bluetooth.registry();

    let error = registry.acquire(HandleSource::Adapters, 1).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(host.stack.live_handles(), 0);
    assert!(registry.is_empty());
}

#[test]
fn released_resource_reports_ownership() {
    let host = TestHost::with_adapter();
    let adapter = host.first_adapter().unwrap();
    let resource = host.bluetooth.registry().resource(adapter.handle()).unwrap();

    assert_eq!(resource.ownership(), Ownership::Live);
    adapter.release();
    assert_eq!(resource.ownership(), Ownership::Released);
    assert!(!resource.release());
    assert_eq!(host.stack.release_count(), 1);
}

#[test]
fn dropping_the_context_releases_every_handle() {
    let stack = two_adapter_stack();
    let peripheral = stack.add_peripheral(FakePeripheral::new("sensor", "aa:aa:aa:aa:aa:01"));
    stack.add_paired(0, peripheral);

    let host = TestHost::new(stack.clone());
    let adapters = host.bluetooth.list_adapters().unwrap();
    let paired = adapters[0].paired_peripherals().unwrap();
    assert_eq!(paired.len(), 1);
    assert_eq!(stack.live_handles(), 3);

    drop(paired);
    drop(adapters);
    drop(host);

    assert_eq!(stack.live_handles(), 0);
    assert_eq!(stack.release_count(), 3);
    assert_eq!(stack.double_releases(), 0);
}

#[test]
fn release_all_invalidates_outstanding_views() {
    let host = TestHost::new(two_adapter_stack());
    let adapters = host.bluetooth.list_adapters().unwrap();

    host.bluetooth.registry().release_all();

    assert!(host.bluetooth.registry().is_empty());
    for adapter in &adapters {
        assert_eq!(adapter.scan_start().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert!(!adapter.release());
    }
    assert_eq!(host.stack.release_count(), 2);
}

#[test]
fn adapter_index_from_environment_pins_enumeration() {
    let config = Config::from_lookup(|key| (key == "SIMPLEBLE_ADAPTER").then(|| "1".to_string()))
        .unwrap();
    let host = TestHost::with_config(two_adapter_stack(), config);

    let adapters = host.bluetooth.list_adapters().unwrap();
    assert_eq!(adapters.len(), 1);
    assert_eq!(adapters[0].identifier().unwrap(), "hci1");
    assert_eq!(host.bluetooth.adapter_count(), 2);
}

#[test]
fn pinned_adapter_out_of_range_is_not_found() {
    let stack = two_adapter_stack();
    let bluetooth = Bluetooth::new(
        stack.clone(),
        host_executor::Executor::new().spawner(),
        Config::default().with_adapter_index(Some(5)),
    );

    let error = bluetooth.list_adapters().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(stack.live_handles(), 0);
}

#[test]
fn release_inside_callback_is_deferred_until_dispatch_returns() {
    init_tracing();
    let stack = Arc::new(FakeStack::new());
    stack.add_adapter("hci0", "00:11:22:33:44:55");
    let index = stack.add_peripheral(FakePeripheral::heart_rate_monitor("hr", "aa:aa:aa:aa:aa:01"));
    stack.add_paired(0, index);

    let host = TestHost::new(stack.clone());
    let adapter = host.first_adapter().unwrap();
    let peripheral = adapter.paired_peripherals().unwrap().remove(0).peripheral;
    let releases_before = stack.release_count();

    let calls = Arc::new(AtomicUsize::new(0));
    let released_during_callback = Arc::new(AtomicUsize::new(usize::MAX));
    {
        let peripheral = peripheral.clone();
        let stack = stack.clone();
        let calls = calls.clone();
        let released_during_callback = released_during_callback.clone();
        peripheral
            .clone()
            .set_callback_on_connected(DeliveryPolicy::Coalesce, move || {
                calls.fetch_add(1, Ordering::SeqCst);
                assert!(peripheral.release());
                assert!(!peripheral.release());
                released_during_callback.store(stack.release_count(), Ordering::SeqCst);
            })
            .unwrap();
    }

    assert!(peripheral.connect().unwrap());
    host.drain();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(released_during_callback.load(Ordering::SeqCst), releases_before);
    assert_eq!(stack.release_count(), releases_before + 1);
    assert_eq!(stack.double_releases(), 0);
    assert_eq!(peripheral.connect().unwrap_err().kind(), ErrorKind::InvalidHandle);
}
