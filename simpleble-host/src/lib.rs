//! The object model a scripting host sees on top of the `simpleble` crate.
//!
//! Scripts hold [`AdapterObject`]s and [`PeripheralObject`]s, read their
//! properties and call their methods with [`HostValue`] arguments. Arguments
//! are validated before any native call; failures become [`HostError`]s
//! carrying the exception class to raise. Host functions registered as
//! callbacks run on the host thread that drives the executor given to the
//! underlying [`simpleble::Bluetooth`] context.

mod adapter;
mod args;
mod bindings;
pub mod error;
mod peripheral;
mod value;

pub use adapter::AdapterObject;
pub use args::{decode_handle, encode_handle};
pub use bindings::Bindings;
pub use error::{HostError, HostErrorKind, HostResult};
pub use peripheral::PeripheralObject;
pub use value::{HostFunction, HostValue};

/// An object exposed to the host.
pub trait HostObject {
    /// Reads a property. Unknown properties are `undefined`.
    fn get(&self, property: &str) -> HostResult<HostValue>;

    /// Calls a method. Unknown methods raise a `TypeError`.
    fn call(&self, method: &str, args: &[HostValue]) -> HostResult<HostValue>;
}

impl HostObject for HostValue {
    fn get(&self, property: &str) -> HostResult<HostValue> {
        match self {
            HostValue::Adapter(adapter) => adapter.get(property),
            HostValue::Peripheral(peripheral) => peripheral.get(property),
            _ => Ok(self.field(property).cloned().unwrap_or_default()),
        }
    }

    fn call(&self, method: &str, args: &[HostValue]) -> HostResult<HostValue> {
        match self {
            HostValue::Adapter(adapter) => adapter.call(method, args),
            HostValue::Peripheral(peripheral) => peripheral.call(method, args),
            other => Err(HostError::type_error(format!(
                "{method} is not a function on {}",
                other.type_name()
            ))),
        }
    }
}
