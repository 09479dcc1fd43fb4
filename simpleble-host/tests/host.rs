use std::sync::Arc;

use parking_lot::Mutex;
use simpleble::ErrorKind;
use simpleble_host::{Bindings, HostErrorKind, HostObject, HostResult, HostValue};
use simpleble_testkit::{
    FakePeripheral, FakeStack, HEART_RATE_CONTROL_POINT, HEART_RATE_MEASUREMENT,
    HEART_RATE_SERVICE, TestHost, WriteKind, init_tracing,
};

const MONITOR: usize = 0;

struct Fixture {
    host: TestHost,
    bindings: Bindings,
    adapter: HostValue,
}

fn fixture() -> Fixture {
    init_tracing();
    let stack = Arc::new(FakeStack::new());
    stack.add_adapter("hci0", "00:11:22:33:44:55");
    let monitor = stack.add_peripheral(
        FakePeripheral::heart_rate_monitor("hrm", "c0:ff:ee:00:00:01")
            .manufacturer_data(0x0059, &[0xbe, 0xef]),
    );
    stack.add_paired(0, monitor);

    let host = TestHost::new(stack);
    let bindings = Bindings::new(host.bluetooth.clone());
    let adapter = first(bindings.call("getAdapters", &[]).unwrap());
    Fixture {
        host,
        bindings,
        adapter,
    }
}

fn first(list: HostValue) -> HostValue {
    list.as_array().and_then(|items| items.first()).cloned().unwrap()
}

fn paired_monitor(fixture: &Fixture) -> HostValue {
    first(fixture.adapter.get("pairedPeripherals").unwrap())
}

fn recorder() -> (Arc<Mutex<Vec<Vec<HostValue>>>>, HostValue) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    (calls, HostValue::function(move |args| sink.lock().push(args)))
}

fn attribute(service: &str, characteristic: &str) -> Vec<HostValue> {
    vec![service.into(), characteristic.into()]
}

#[track_caller]
fn assert_raises<T: std::fmt::Debug>(result: HostResult<T>, kind: HostErrorKind, message: &str) {
    let error = result.unwrap_err();
    assert_eq!(error.kind(), kind);
    assert_eq!(error.message(), message);
}

#[test]
fn module_lists_adapters() {
    let Fixture {
        bindings, adapter, ..
    } = fixture();

    assert_eq!(bindings.call("isEnabled", &[]).unwrap(), HostValue::Bool(true));
    assert_eq!(adapter.type_name(), "Adapter");
    assert_eq!(adapter.get("identifier").unwrap(), HostValue::from("hci0"));
    assert_eq!(adapter.get("address").unwrap(), HostValue::from("00:11:22:33:44:55"));
    assert_eq!(adapter.get("active").unwrap(), HostValue::Bool(false));
    assert_eq!(adapter.get("colour").unwrap(), HostValue::Undefined);
    assert!(matches!(adapter.get("handle").unwrap(), HostValue::BigInt(id) if id > 0));
}

#[test]
fn scan_for_validates_the_timeout() {
    let Fixture { host, adapter, .. } = fixture();

    assert_raises(adapter.call("scanFor", &[]), HostErrorKind::TypeError, "Missing timeout");
    assert_raises(
        adapter.call("scanFor", &[HostValue::from("100")]),
        HostErrorKind::TypeError,
        "Timeout is not a number",
    );
    for timeout in [-5.0, -0.5, 1.5, f64::NAN] {
        let error = adapter.call("scanFor", &[HostValue::Number(timeout)]).unwrap_err();
        assert_eq!(error.kind(), HostErrorKind::RangeError);
        assert_eq!(error.source_kind(), Some(ErrorKind::InvalidArgument));
    }
    assert!(!host.stack.is_scanning(0));
    assert_eq!(adapter.get("active").unwrap(), HostValue::Bool(false));

    assert_eq!(
        adapter.call("scanFor", &[HostValue::Number(0.0)]).unwrap(),
        HostValue::Bool(true)
    );
    assert_eq!(adapter.get("active").unwrap(), HostValue::Bool(false));
}

#[test]
fn scan_callbacks_require_a_function() {
    let Fixture { adapter, .. } = fixture();

    for method in [
        "setCallbackOnScanStart",
        "setCallbackOnScanStop",
        "setCallbackOnScanUpdated",
        "setCallbackOnScanFound",
    ] {
        assert_raises(adapter.call(method, &[]), HostErrorKind::TypeError, "No callback given");
        assert_raises(
            adapter.call(method, &[HostValue::Null]),
            HostErrorKind::TypeError,
            "Callback is not a function",
        );
    }
}

#[test]
fn scan_found_hands_peripheral_objects_to_the_host() {
    let Fixture { host, adapter, .. } = fixture();
    let (started, on_start) = recorder();
    let (found, on_found) = recorder();
    assert_eq!(
        adapter.call("setCallbackOnScanStart", &[on_start]).unwrap(),
        HostValue::Bool(true)
    );
    assert_eq!(
        adapter.call("setCallbackOnScanFound", &[on_found]).unwrap(),
        HostValue::Bool(true)
    );

    assert_eq!(adapter.call("scanStart", &[]).unwrap(), HostValue::Bool(true));
    assert!(host.stack.discover(0, MONITOR));
    host.drain();

    assert_eq!(*started.lock(), vec![Vec::<HostValue>::new()]);
    let found = found.lock();
    assert_eq!(found.len(), 1);
    let peripheral = &found[0][0];
    assert_eq!(peripheral.type_name(), "Peripheral");
    assert_eq!(peripheral.get("identifier").unwrap(), HostValue::from("hrm"));
    assert_eq!(peripheral.get("connectable").unwrap(), HostValue::Bool(true));

    let scanned = adapter.get("peripherals").unwrap();
    assert_eq!(scanned.as_array().map(<[HostValue]>::len), Some(1));
    assert_eq!(adapter.call("scanStop", &[]).unwrap(), HostValue::Bool(true));
}

#[test]
fn gatt_calls_validate_arguments_before_native() {
    let fixture = fixture();
    let peripheral = paired_monitor(&fixture);
    peripheral.call("connect", &[]).unwrap();

    assert_raises(peripheral.call("read", &[]), HostErrorKind::TypeError, "Missing service");
    assert_raises(
        peripheral.call("read", &[HostValue::from(HEART_RATE_SERVICE)]),
        HostErrorKind::TypeError,
        "Missing characteristic",
    );
    assert_raises(
        peripheral.call(
            "read",
            &[HostValue::Number(0x180d as f64), HostValue::from(HEART_RATE_MEASUREMENT)],
        ),
        HostErrorKind::TypeError,
        "Service is not a string",
    );
    assert_raises(
        peripheral.call("writeRequest", &attribute(HEART_RATE_SERVICE, HEART_RATE_CONTROL_POINT)),
        HostErrorKind::TypeError,
        "Missing data",
    );

    let mut args = attribute(HEART_RATE_SERVICE, HEART_RATE_CONTROL_POINT);
    args.push(HostValue::Array(vec![HostValue::Number(1.0)]));
    assert_raises(
        peripheral.call("writeCommand", &args),
        HostErrorKind::TypeError,
        "Invalid data",
    );
    assert_raises(
        peripheral.call("readDescriptor", &attribute(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT)),
        HostErrorKind::TypeError,
        "Missing descriptor",
    );
    assert!(fixture.host.stack.writes().is_empty());
}

#[test]
fn gatt_round_trip_through_host_values() {
    let fixture = fixture();
    let stack = &fixture.host.stack;
    let peripheral = paired_monitor(&fixture);

    let error = peripheral
        .call("read", &attribute(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT))
        .unwrap_err();
    assert_eq!(error.kind(), HostErrorKind::Error);
    assert_eq!(error.source_kind(), Some(ErrorKind::NotConnected));

    assert_eq!(peripheral.call("connect", &[]).unwrap(), HostValue::Bool(true));
    assert_eq!(peripheral.get("connected").unwrap(), HostValue::Bool(true));
    assert_eq!(
        peripheral
            .call("read", &attribute(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT))
            .unwrap(),
        HostValue::Bytes(vec![0x00, 72])
    );

    let mut args = attribute(HEART_RATE_SERVICE, HEART_RATE_CONTROL_POINT);
    args.push(HostValue::Bytes(vec![0x01]));
    assert_eq!(peripheral.call("writeRequest", &args).unwrap(), HostValue::Bool(true));
    let writes = stack.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].kind, WriteKind::Request);
    assert_eq!(writes[0].data, vec![0x01]);

    let services = peripheral.get("services").unwrap();
    let service = first(services);
    assert_eq!(service.field("uuid"), Some(&HostValue::from(HEART_RATE_SERVICE)));
    let measurement = first(service.field("characteristics").cloned().unwrap());
    assert_eq!(
        measurement.field("capabilities"),
        Some(&HostValue::Array(vec!["read".into(), "notify".into()]))
    );

    let manufacturer = first(peripheral.get("manufacturerData").unwrap());
    assert_eq!(manufacturer.field("id"), Some(&HostValue::Number(89.0)));
    assert_eq!(manufacturer.field("data"), Some(&HostValue::Bytes(vec![0xbe, 0xef])));
}

#[test]
fn notify_passes_attribute_data_and_userdata() {
    let fixture = fixture();
    let stack = &fixture.host.stack;
    let peripheral = paired_monitor(&fixture);
    peripheral.call("connect", &[]).unwrap();

    let (calls, on_data) = recorder();
    let mut args = attribute(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT);
    assert_raises(peripheral.call("notify", &args), HostErrorKind::TypeError, "Missing callback");
    args.push(on_data);
    args.push(HostValue::BigInt(42));
    assert_eq!(peripheral.call("notify", &args).unwrap(), HostValue::Bool(true));

    assert!(stack.push_notification(MONITOR, HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT, &[0, 80]));
    fixture.host.drain();

    assert_eq!(
        *calls.lock(),
        vec![vec![
            HostValue::from(HEART_RATE_SERVICE),
            HostValue::from(HEART_RATE_MEASUREMENT),
            HostValue::Bytes(vec![0, 80]),
            HostValue::BigInt(42),
        ]]
    );

    assert_eq!(
        peripheral
            .call("unsubscribe", &attribute(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT))
            .unwrap(),
        HostValue::Bool(true)
    );
    assert!(!stack.push_notification(MONITOR, HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT, &[1]));
}

#[test]
fn notify_userdata_defaults_to_null() {
    let fixture = fixture();
    let peripheral = paired_monitor(&fixture);
    peripheral.call("connect", &[]).unwrap();

    let (calls, on_data) = recorder();
    let mut args = attribute(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT);
    args.push(on_data);
    peripheral.call("indicate", &args).unwrap();
    fixture
        .host
        .stack
        .push_notification(MONITOR, HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT, &[7]);
    fixture.host.drain();

    assert_eq!(calls.lock()[0][3], HostValue::Null);
}

#[test]
fn connection_callbacks_fire_on_the_host() {
    let fixture = fixture();
    let peripheral = paired_monitor(&fixture);
    let (connected, on_connected) = recorder();
    let (disconnected, on_disconnected) = recorder();

    assert_raises(
        peripheral.call("setCallbackOnConnected", &[HostValue::from("cb")]),
        HostErrorKind::TypeError,
        "Invalid callback",
    );
    peripheral
        .call("setCallbackOnConnected", &[on_connected])
        .unwrap();
    peripheral
        .call("setCallbackOnDisconnected", &[on_disconnected])
        .unwrap();

    peripheral.call("connect", &[]).unwrap();
    fixture.host.drain();
    fixture.host.stack.disconnect_remotely(MONITOR);
    fixture.host.drain();

    assert_eq!(connected.lock().len(), 1);
    assert_eq!(disconnected.lock().len(), 1);
    assert_eq!(peripheral.get("connected").unwrap(), HostValue::Bool(false));
}

#[test]
fn flat_exports_address_peripherals_by_handle() {
    let fixture = fixture();
    let bindings = &fixture.bindings;
    let peripheral = paired_monitor(&fixture);
    let handle = peripheral.get("handle").unwrap();

    assert_eq!(
        bindings
            .call("simpleble_peripheral_identifier", &[handle.clone()])
            .unwrap(),
        HostValue::from("hrm")
    );
    assert_eq!(
        bindings
            .call("simpleble_peripheral_manufacturer_data_count", &[handle.clone()])
            .unwrap(),
        HostValue::Number(1.0)
    );

    bindings
        .call("simpleble_peripheral_connect", &[handle.clone()])
        .unwrap();
    assert_eq!(
        bindings
            .call("simpleble_peripheral_services_count", &[handle.clone()])
            .unwrap(),
        HostValue::Number(1.0)
    );
    assert_raises(
        bindings.call("simpleble_peripheral_services_get", &[handle.clone()]),
        HostErrorKind::TypeError,
        "Missing index",
    );
    assert_raises(
        bindings.call(
            "simpleble_peripheral_services_get",
            &[handle.clone(), HostValue::Number(3.0)],
        ),
        HostErrorKind::RangeError,
        "Index is out-of-range",
    );
    for index in [-1.0, 0.5, f64::NAN] {
        assert_raises(
            bindings.call(
                "simpleble_peripheral_services_get",
                &[handle.clone(), HostValue::Number(index)],
            ),
            HostErrorKind::RangeError,
            "Index is out-of-range",
        );
    }

    let mut args = vec![handle.clone()];
    args.extend(attribute(HEART_RATE_SERVICE, HEART_RATE_MEASUREMENT));
    assert_eq!(
        bindings.call("simpleble_peripheral_read", &args).unwrap(),
        HostValue::Bytes(vec![0x00, 72])
    );

    assert_eq!(
        bindings
            .call("simpleble_peripheral_release_handle", &[handle.clone()])
            .unwrap(),
        HostValue::Null
    );
    let error = bindings
        .call("simpleble_peripheral_identifier", &[handle])
        .unwrap_err();
    assert_eq!(error.source_kind(), Some(ErrorKind::InvalidHandle));
    assert_eq!(fixture.host.stack.double_releases(), 0);
}

#[test]
fn malformed_handles_are_rejected() {
    let Fixture { bindings, adapter, .. } = fixture();
    let identifier = "simpleble_peripheral_identifier";

    assert_raises(bindings.call(identifier, &[]), HostErrorKind::TypeError, "No handle given");
    assert_raises(
        bindings.call(identifier, &[HostValue::Number(4096.0)]),
        HostErrorKind::TypeError,
        "Invalid handle given",
    );
    assert_raises(
        bindings.call(identifier, &[HostValue::BigInt(-1)]),
        HostErrorKind::TypeError,
        "Not lossless",
    );
    let error = bindings.call(identifier, &[HostValue::BigInt(0)]).unwrap_err();
    assert_eq!(error.source_kind(), Some(ErrorKind::InvalidHandle));

    // An adapter handle does not name a peripheral.
    let error = bindings
        .call(identifier, &[adapter.get("handle").unwrap()])
        .unwrap_err();
    assert_eq!(error.source_kind(), Some(ErrorKind::InvalidHandle));
}

#[test]
fn released_objects_raise_invalid_handle() {
    let fixture = fixture();
    let peripheral = paired_monitor(&fixture);
    assert_eq!(peripheral.call("release", &[]).unwrap(), HostValue::Null);
    assert_eq!(peripheral.call("release", &[]).unwrap(), HostValue::Null);

    let error = peripheral.get("identifier").unwrap_err();
    assert_eq!(error.kind(), HostErrorKind::TypeError);
    assert_eq!(error.source_kind(), Some(ErrorKind::InvalidHandle));

    fixture.adapter.call("release", &[]).unwrap();
    let error = fixture.adapter.call("scanStart", &[]).unwrap_err();
    assert_eq!(error.source_kind(), Some(ErrorKind::InvalidHandle));
    assert_eq!(fixture.host.stack.live_handles(), 0);
}

#[test]
fn unknown_methods_raise_type_errors() {
    let Fixture {
        bindings, adapter, ..
    } = fixture();

    assert_raises(
        adapter.call("scanForever", &[]),
        HostErrorKind::TypeError,
        "adapter.scanForever is not a function",
    );
    assert_raises(
        bindings.call("simpleble_peripheral_teleport", &[]),
        HostErrorKind::TypeError,
        "simpleble_peripheral_teleport is not a function",
    );
    let error = HostValue::from("text").call("connect", &[]).unwrap_err();
    assert_eq!(error.kind(), HostErrorKind::TypeError);
}
