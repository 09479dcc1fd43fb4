use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use simpleble::{CallbackBridge, DeliveryPolicy, EventCategory, ManagedResource};
use simpleble_testkit::TestHost;

fn adapter_resource(host: &TestHost) -> Arc<ManagedResource> {
    let adapter = host.first_adapter().unwrap();
    host.bluetooth.registry().resource(adapter.handle()).unwrap()
}

fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync + 'static) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    (received, move |event| sink.lock().push(event))
}

#[test]
fn queue_all_delivers_every_event_in_order() {
    let host = TestHost::with_adapter();
    let bridge = CallbackBridge::<u32>::new(
        EventCategory::ScanFound,
        host.executor.spawner(),
        adapter_resource(&host),
    );
    let (received, callback) = recorder();
    bridge.register(DeliveryPolicy::QueueAll, callback);

    let native = bridge.clone();
    thread::spawn(move || {
        for event in 0..10_000 {
            native.post(event);
        }
    })
    .join()
    .unwrap();

    assert!(received.lock().is_empty());
    host.drain();
    assert_eq!(*received.lock(), (0..10_000).collect::<Vec<_>>());
}

#[test]
fn coalesce_delivers_the_latest_event() {
    let host = TestHost::with_adapter();
    let bridge = CallbackBridge::<u32>::new(
        EventCategory::ScanStart,
        host.executor.spawner(),
        adapter_resource(&host),
    );
    let (received, callback) = recorder();
    bridge.register(DeliveryPolicy::Coalesce, callback);

    let native = bridge.clone();
    thread::spawn(move || {
        for event in 1..=1_000 {
            native.post(event);
        }
    })
    .join()
    .unwrap();
    host.drain();

    let received = received.lock();
    assert!(!received.is_empty());
    assert!(received.len() <= 1_000);
    assert_eq!(received.last(), Some(&1_000));
}

#[test]
fn coalesce_delivers_again_after_a_drain() {
    let host = TestHost::with_adapter();
    let bridge = CallbackBridge::<u32>::new(
        EventCategory::Connected,
        host.executor.spawner(),
        adapter_resource(&host),
    );
    let (received, callback) = recorder();
    bridge.register(DeliveryPolicy::Coalesce, callback);

    bridge.post(1);
    host.drain();
    bridge.post(2);
    bridge.post(3);
    host.drain();

    assert_eq!(*received.lock(), vec![1, 3]);
}

#[test]
fn replaced_registration_is_never_invoked() {
    let host = TestHost::with_adapter();
    let bridge = CallbackBridge::<u32>::new(
        EventCategory::ScanUpdated,
        host.executor.spawner(),
        adapter_resource(&host),
    );
    let (first, callback) = recorder();
    bridge.register(DeliveryPolicy::QueueAll, callback);
    bridge.post(1);

    let (second, callback) = recorder();
    bridge.register(DeliveryPolicy::QueueAll, callback);
    host.drain();
    assert!(first.lock().is_empty());
    assert!(second.lock().is_empty());

    bridge.post(2);
    host.drain();
    assert!(first.lock().is_empty());
    assert_eq!(*second.lock(), vec![2]);
    assert_eq!(bridge.policy(), Some(DeliveryPolicy::QueueAll));
}

#[test]
fn unregister_discards_queued_events() {
    let host = TestHost::with_adapter();
    let bridge = CallbackBridge::<u32>::new(
        EventCategory::ScanStop,
        host.executor.spawner(),
        adapter_resource(&host),
    );
    let (received, callback) = recorder();
    bridge.register(DeliveryPolicy::Coalesce, callback);

    bridge.post(1);
    assert!(bridge.unregister());
    assert!(!bridge.unregister());
    assert!(!bridge.is_registered());
    host.drain();

    bridge.post(2);
    assert_eq!(host.drain(), 0);
    assert!(received.lock().is_empty());
}

#[test]
fn events_for_a_released_resource_are_dropped() {
    let host = TestHost::with_adapter();
    let adapter = host.first_adapter().unwrap();
    let resource = host.bluetooth.registry().resource(adapter.handle()).unwrap();
    let bridge =
        CallbackBridge::<u32>::new(EventCategory::ScanFound, host.executor.spawner(), resource);
    let (received, callback) = recorder();
    bridge.register(DeliveryPolicy::QueueAll, callback);

    bridge.post(1);
    assert!(adapter.release());
    host.drain();

    assert!(received.lock().is_empty());
    assert_eq!(host.stack.release_count(), 1);
}

#[test]
fn callbacks_run_on_the_host_thread() {
    let host = TestHost::with_adapter();
    let bridge = CallbackBridge::<()>::new(
        EventCategory::Disconnected,
        host.executor.spawner(),
        adapter_resource(&host),
    );
    let (threads, sink) = recorder();
    bridge.register(DeliveryPolicy::QueueAll, move |()| sink(thread::current().id()));

    let native = bridge.clone();
    let native_thread = thread::spawn(move || {
        native.post(());
        native.post(());
        thread::current().id()
    })
    .join()
    .unwrap();
    host.drain();

    let threads = threads.lock();
    assert_eq!(threads.len(), 2);
    assert!(threads.iter().all(|id| *id == thread::current().id()));
    assert!(threads.iter().all(|id| *id != native_thread));
}
