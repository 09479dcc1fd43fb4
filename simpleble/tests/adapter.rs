use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use simpleble::{Adapter, DeliveryPolicy, DiscoveredPeripheral, ErrorKind, ScanState};
use simpleble_testkit::{FakeOp, FakePeripheral, FakeStack, TestHost, init_tracing, latest};

struct Fixture {
    host: TestHost,
    adapter: Adapter,
    stack: Arc<FakeStack>,
}

fn fixture(peripherals: usize) -> Fixture {
    init_tracing();
    let stack = Arc::new(FakeStack::new());
    stack.add_adapter("hci0", "00:11:22:33:44:55");
    for n in 0..peripherals {
        stack.add_peripheral(
            FakePeripheral::new(&format!("sensor-{n}"), &format!("aa:aa:aa:aa:aa:{n:02x}"))
                .rssi(-40 - n as i16)
                .manufacturer_data(0x004c, &[n as u8]),
        );
    }
    let host = TestHost::new(stack.clone());
    let adapter = host.first_adapter().unwrap();
    Fixture {
        host,
        adapter,
        stack,
    }
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let sink = count.clone();
    (count, move || {
        sink.fetch_add(1, Ordering::SeqCst);
    })
}

fn collect_found(
    adapter: &Adapter,
    policy: DeliveryPolicy,
) -> Arc<Mutex<Vec<DiscoveredPeripheral>>> {
    let found = Arc::new(Mutex::new(Vec::new()));
    let sink = found.clone();
    assert!(
        adapter
            .set_callback_on_scan_found(policy, move |peripheral| sink.lock().push(peripheral))
            .unwrap()
    );
    found
}

#[test]
fn adapter_properties() {
    let Fixture { host, adapter, .. } = fixture(0);
    assert_eq!(adapter.identifier().unwrap(), "hci0");
    assert_eq!(adapter.address().unwrap(), "00:11:22:33:44:55");
    assert!(host.bluetooth.is_bluetooth_enabled());

    host.stack.set_bluetooth_enabled(false);
    assert!(!host.bluetooth.is_bluetooth_enabled());
}

#[test]
fn scan_start_and_stop_track_state() {
    let Fixture { adapter, stack, .. } = fixture(0);
    let mut updates = adapter.scan_state_updates();

    assert!(adapter.scan_start().unwrap());
    assert_eq!(adapter.scan_state(), ScanState::Scanning);
    assert!(adapter.is_scanning().unwrap());
    assert!(stack.is_scanning(0));
    assert_eq!(latest(&mut updates), Some(ScanState::Scanning));

    assert!(adapter.scan_stop().unwrap());
    assert_eq!(adapter.scan_state(), ScanState::Idle);
    assert!(!stack.is_scanning(0));
    assert_eq!(latest(&mut updates), Some(ScanState::Idle));
}

#[test]
fn scan_stop_while_idle_does_not_reach_native() {
    let Fixture { adapter, stack, .. } = fixture(0);
    stack.fail(FakeOp::ScanStop);

    assert!(adapter.scan_stop().unwrap());
    assert_eq!(adapter.scan_state(), ScanState::Idle);
}

#[test]
fn failed_scan_start_stays_idle() {
    let Fixture { adapter, stack, .. } = fixture(0);
    stack.fail(FakeOp::ScanStart);

    assert!(!adapter.scan_start().unwrap());
    assert_eq!(adapter.scan_state(), ScanState::Idle);
}

#[test]
fn scan_for_zero_returns_to_idle() {
    let Fixture { host, adapter, .. } = fixture(0);
    let (started, on_start) = counter();
    let (stopped, on_stop) = counter();
    assert!(adapter.set_callback_on_scan_start(DeliveryPolicy::Coalesce, on_start).unwrap());
    assert!(adapter.set_callback_on_scan_stop(DeliveryPolicy::Coalesce, on_stop).unwrap());

    assert!(adapter.scan_for(0).unwrap());
    assert_eq!(adapter.scan_state(), ScanState::Idle);

    host.drain();
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.scan_state(), ScanState::Idle);

    // Stopping after the timed scan has ended is harmless.
    assert!(adapter.scan_stop().unwrap());
}

#[test]
fn scan_for_rejects_invalid_timeouts() {
    let Fixture { adapter, stack, .. } = fixture(0);

    let error = adapter.scan_for(-1).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    let error = adapter.scan_for(i64::from(i32::MAX) + 1).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);

    assert_eq!(adapter.scan_state(), ScanState::Idle);
    assert!(!stack.is_scanning(0));
}

#[test]
fn scan_found_delivers_snapshots() {
    let Fixture {
        host,
        adapter,
        stack,
    } = fixture(2);
    let found = collect_found(&adapter, DeliveryPolicy::QueueAll);

    adapter.scan_start().unwrap();
    assert!(stack.discover(0, 0));
    assert!(stack.discover(0, 1));
    assert!(stack.discover(0, 0));
    host.drain();

    let found = found.lock();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].identifier, "sensor-0");
    assert_eq!(found[0].rssi, -40);
    assert_eq!(found[0].manufacturer_data[0].company_id, 0x004c);
    assert_eq!(found[1].address, "aa:aa:aa:aa:aa:01");
    assert_ne!(found[0].peripheral.handle(), found[1].peripheral.handle());

    // Adapter plus one handle per delivered snapshot.
    assert_eq!(stack.live_handles(), 3);
}

#[test]
fn scan_updated_is_separate_from_found() {
    let Fixture {
        host,
        adapter,
        stack,
    } = fixture(1);
    let updated = Arc::new(AtomicUsize::new(0));
    let sink = updated.clone();
    adapter
        .set_callback_on_scan_updated(DeliveryPolicy::QueueAll, move |peripheral| {
            assert_eq!(peripheral.identifier, "sensor-0");
            assert!(peripheral.peripheral.release());
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    adapter.scan_start().unwrap();
    stack.discover(0, 0);
    stack.discover(0, 0);
    stack.discover(0, 0);
    host.drain();

    assert_eq!(updated.load(Ordering::SeqCst), 2);
    assert_eq!(stack.live_handles(), 1);
}

#[test]
fn coalesced_scan_results_release_displaced_handles() {
    let Fixture {
        host,
        adapter,
        stack,
    } = fixture(3);
    let found = collect_found(&adapter, DeliveryPolicy::Coalesce);

    adapter.scan_start().unwrap();
    for peripheral in 0..3 {
        stack.discover(0, peripheral);
    }
    host.drain();

    let found = found.lock();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].identifier, "sensor-2");
    assert_eq!(stack.live_handles(), 2);
    assert_eq!(stack.release_count(), 2);
    assert_eq!(stack.double_releases(), 0);
}

#[test]
fn scan_results_after_release_are_not_leaked() {
    let Fixture {
        host,
        adapter,
        stack,
    } = fixture(1);
    let found = collect_found(&adapter, DeliveryPolicy::QueueAll);

    adapter.scan_start().unwrap();
    assert!(adapter.release());
    stack.discover(0, 0);
    host.drain();

    assert!(found.lock().is_empty());
    assert_eq!(stack.live_handles(), 0);
    assert_eq!(stack.double_releases(), 0);
    assert_eq!(stack.stale_calls(), 0);
}

#[test]
fn unreadable_scan_result_is_dropped_and_released() {
    let Fixture {
        host,
        adapter,
        stack,
    } = fixture(1);
    let found = collect_found(&adapter, DeliveryPolicy::QueueAll);

    adapter.scan_start().unwrap();
    stack.fail(FakeOp::Identifier);
    stack.discover(0, 0);
    host.drain();

    assert!(found.lock().is_empty());
    assert_eq!(stack.live_handles(), 1);
}

#[test]
fn scanned_peripherals_reset_when_a_scan_starts() {
    let Fixture { adapter, stack, .. } = fixture(2);

    adapter.scan_start().unwrap();
    stack.discover(0, 0);
    stack.discover(0, 1);
    adapter.scan_stop().unwrap();

    let first = adapter.scanned_peripherals().unwrap();
    let again = adapter.scanned_peripherals().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(again.len(), 2);
    assert_ne!(first[0].peripheral.handle(), again[0].peripheral.handle());

    adapter.scan_start().unwrap();
    stack.discover(0, 1);
    adapter.scan_stop().unwrap();

    let second = adapter.scanned_peripherals().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].identifier, "sensor-1");
}

#[test]
fn paired_peripherals_are_listed() {
    let Fixture { adapter, stack, .. } = fixture(2);
    stack.add_paired(0, 1);

    let paired = adapter.paired_peripherals().unwrap();
    assert_eq!(paired.len(), 1);
    assert_eq!(paired[0].identifier, "sensor-1");
    assert!(paired[0].peripheral.is_paired().unwrap());

    assert!(paired[0].peripheral.unpair().unwrap());
    assert!(adapter.paired_peripherals().unwrap().is_empty());
}

#[test]
fn rejected_native_callback_is_reported() {
    let Fixture { adapter, stack, .. } = fixture(0);
    stack.fail(FakeOp::SetCallback);
    assert!(
        !adapter
            .set_callback_on_scan_found(DeliveryPolicy::QueueAll, |_| {})
            .unwrap()
    );

    stack.recover(FakeOp::SetCallback);
    assert!(
        adapter
            .set_callback_on_scan_found(DeliveryPolicy::QueueAll, |_| {})
            .unwrap()
    );
}

#[test]
fn released_adapter_rejects_every_operation() {
    let Fixture { adapter, .. } = fixture(0);
    adapter.release();

    assert_eq!(adapter.scan_start().unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(adapter.scan_for(0).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(adapter.scanned_peripherals().unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(
        adapter
            .set_callback_on_scan_start(DeliveryPolicy::Coalesce, || {})
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidHandle
    );
}
