use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::AdapterObject;
use crate::peripheral::PeripheralObject;

/// A function the host can call back into.
///
/// Invoked on the host thread with the event's arguments.
pub type HostFunction = Arc<dyn Fn(Vec<HostValue>) + Send + Sync>;

/// A value crossing the host boundary.
///
/// Arguments are validated against this once, when a call enters, and results
/// are built from it on the way out.
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<HostValue>),
    Object(BTreeMap<String, HostValue>),
    Function(HostFunction),
    Adapter(AdapterObject),
    Peripheral(PeripheralObject),
}

impl HostValue {
    pub fn function(f: impl Fn(Vec<HostValue>) + Send + Sync + 'static) -> Self {
        HostValue::Function(Arc::new(f))
    }

    /// Builds an object from `(key, value)` pairs.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, HostValue)>) -> Self {
        HostValue::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The name a host would report for the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::BigInt(_) => "bigint",
            HostValue::String(_) => "string",
            HostValue::Bytes(_) => "Uint8Array",
            HostValue::Array(_) => "Array",
            HostValue::Object(_) => "object",
            HostValue::Function(_) => "function",
            HostValue::Adapter(_) => "Adapter",
            HostValue::Peripheral(_) => "Peripheral",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, HostValue::Undefined | HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostValue::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Looks up `key` on an object value.
    pub fn field(&self, key: &str) -> Option<&HostValue> {
        match self {
            HostValue::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    pub fn as_adapter(&self) -> Option<&AdapterObject> {
        match self {
            HostValue::Adapter(adapter) => Some(adapter),
            _ => None,
        }
    }

    pub fn as_peripheral(&self) -> Option<&PeripheralObject> {
        match self {
            HostValue::Peripheral(peripheral) => Some(peripheral),
            _ => None,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => f.write_str("undefined"),
            HostValue::Null => f.write_str("null"),
            HostValue::Bool(value) => fmt::Debug::fmt(value, f),
            HostValue::Number(value) => fmt::Debug::fmt(value, f),
            HostValue::BigInt(value) => write!(f, "{value}n"),
            HostValue::String(value) => fmt::Debug::fmt(value, f),
            HostValue::Bytes(value) => f.debug_tuple("Bytes").field(value).finish(),
            HostValue::Array(values) => f.debug_list().entries(values).finish(),
            HostValue::Object(fields) => f.debug_map().entries(fields).finish(),
            HostValue::Function(_) => f.write_str("[Function]"),
            HostValue::Adapter(adapter) => fmt::Debug::fmt(adapter, f),
            HostValue::Peripheral(peripheral) => fmt::Debug::fmt(peripheral, f),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined) | (HostValue::Null, HostValue::Null) => {
                true
            }
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::BigInt(a), HostValue::BigInt(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Bytes(a), HostValue::Bytes(b)) => a == b,
            (HostValue::Array(a), HostValue::Array(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a == b,
            (HostValue::Function(a), HostValue::Function(b)) => Arc::ptr_eq(a, b),
            (HostValue::Adapter(a), HostValue::Adapter(b)) => a == b,
            (HostValue::Peripheral(a), HostValue::Peripheral(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_owned())
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        HostValue::Bytes(value)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(values: Vec<HostValue>) -> Self {
        HostValue::Array(values)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Undefined, Into::into)
    }
}
