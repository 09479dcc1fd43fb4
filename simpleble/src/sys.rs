//! Plain data types exchanged with the native library.

use std::ffi::{c_char, c_void};
use std::fmt;
use std::num::NonZeroUsize;

use btuuid::BluetoothUuid;
use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};

/// Size of a native UUID buffer, including the terminating NUL.
pub const UUID_STR_LEN: usize = 37;

/// A non-null native handle.
///
/// Raw handles never leave this crate's public API except through
/// [`NativeApi`][crate::NativeApi] implementations.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonZeroUsize);

impl RawHandle {
    pub fn new(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Self)
    }

    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        Self::new(ptr as usize)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    pub fn addr(self) -> usize {
        self.0.get()
    }
}

/// Outcome of a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    pub fn from_bool(ok: bool) -> Self {
        if ok { Status::Success } else { Status::Failure }
    }
}

/// A UUID in the native fixed-width string form.
///
/// Every byte past the end of the string is zero, so the native side never
/// reads uninitialized memory.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawUuid {
    value: [c_char; UUID_STR_LEN],
}

impl RawUuid {
    /// Copies `uuid` into a zero-padded buffer.
    ///
    /// Fails with [`ErrorKind::InvalidArgument`] if the string does not fit
    /// alongside its terminator or contains a NUL byte.
    pub fn new(uuid: &str) -> Result<Self> {
        let bytes = uuid.as_bytes();
        if bytes.len() >= UUID_STR_LEN {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!(
                    "UUID `{uuid}` is longer than {} characters",
                    UUID_STR_LEN - 1
                ),
            ));
        }
        if bytes.contains(&0) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "UUID contains a NUL byte",
            ));
        }
        Ok(Self::from_ascii(bytes))
    }

    pub fn from_uuid(uuid: &Uuid) -> Self {
        let mut buf = Uuid::encode_buffer();
        Self::from_ascii(uuid.hyphenated().encode_lower(&mut buf).as_bytes())
    }

    /// Expands 16- and 32-bit UUIDs against the Bluetooth base UUID.
    pub fn from_bluetooth_uuid(uuid: &BluetoothUuid) -> Self {
        Self::from_uuid(&Uuid::from(*uuid))
    }

    /// Reads a buffer filled in by the native side.
    ///
    /// The last byte is always treated as a terminator, even if the native
    /// side left it non-zero.
    pub fn from_raw(value: [c_char; UUID_STR_LEN]) -> Self {
        let mut uuid = Self { value };
        uuid.value[UUID_STR_LEN - 1] = 0;
        uuid
    }

    fn from_ascii(bytes: &[u8]) -> Self {
        let mut value = [0 as c_char; UUID_STR_LEN];
        for (dst, src) in value.iter_mut().zip(&bytes[..bytes.len().min(UUID_STR_LEN - 1)]) {
            *dst = *src as c_char;
        }
        Self { value }
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.value.as_ptr()
    }

    pub fn bytes(&self) -> [u8; UUID_STR_LEN] {
        self.value.map(|c| c as u8)
    }

    fn str_bytes(&self) -> Vec<u8> {
        self.bytes().into_iter().take_while(|b| *b != 0).collect()
    }
}

impl fmt::Display for RawUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.str_bytes()))
    }
}

impl fmt::Debug for RawUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawUuid({self})")
    }
}

/// A value naming a service, characteristic or descriptor.
///
/// Strings are passed through unchanged; 16- and 32-bit Bluetooth UUIDs are
/// expanded to their full form.
pub trait AttributeUuid {
    fn to_uuid_string(&self) -> String;
}

impl AttributeUuid for str {
    fn to_uuid_string(&self) -> String {
        self.to_string()
    }
}

impl AttributeUuid for String {
    fn to_uuid_string(&self) -> String {
        self.clone()
    }
}

impl AttributeUuid for Uuid {
    fn to_uuid_string(&self) -> String {
        self.hyphenated().to_string()
    }
}

impl AttributeUuid for BluetoothUuid {
    fn to_uuid_string(&self) -> String {
        RawUuid::from_bluetooth_uuid(self).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid_is_zero_padded() {
        let uuid = RawUuid::new("abc").expect("short uuid");
        let bytes = uuid.bytes();
        assert_eq!(&bytes[..3], b"abc");
        assert!(bytes[3..].iter().all(|b| *b == 0));
        assert_eq!(uuid.to_string(), "abc");
    }

    #[test]
    fn test_full_length_uuid_keeps_terminator() {
        let text = "0000180d-0000-1000-8000-00805f9b34fb";
        let uuid = RawUuid::new(text).expect("full uuid");
        assert_eq!(uuid.bytes()[UUID_STR_LEN - 1], 0);
        assert_eq!(uuid.to_string(), text);
    }

    #[test]
    fn test_oversized_uuid_is_rejected() {
        let error = RawUuid::new("0000180d-0000-1000-8000-00805f9b34fb0").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);

        let error = RawUuid::new("ab\0c").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_bluetooth_uuid_expands_against_base() {
        let uuid = RawUuid::from_bluetooth_uuid(&BluetoothUuid::from(0x180du16));
        assert_eq!(uuid.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn test_attribute_uuid_forms_agree() {
        let short = BluetoothUuid::from(0x2a37u16).to_uuid_string();
        let long = Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb).to_uuid_string();
        assert_eq!(short, long);
        assert_eq!("2A37".to_uuid_string(), "2A37");
    }

    #[test]
    fn test_native_buffer_is_always_terminated() {
        let uuid = RawUuid::from_raw([b'a' as c_char; UUID_STR_LEN]);
        assert_eq!(uuid.to_string().len(), UUID_STR_LEN - 1);
    }

    #[test]
    fn test_null_handles_are_rejected() {
        assert!(RawHandle::new(0).is_none());
        assert!(RawHandle::from_ptr(std::ptr::null_mut()).is_none());
        assert_eq!(RawHandle::new(42).map(RawHandle::addr), Some(42));
    }
}
