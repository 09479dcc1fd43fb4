use bitflags::bitflags;

bitflags! {
    /// Operations a characteristic supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        const READ = 0x01;
        const WRITE_REQUEST = 0x02;
        const WRITE_COMMAND = 0x04;
        const NOTIFY = 0x08;
        const INDICATE = 0x10;
    }
}

impl Capabilities {
    /// Names of the supported operations, in a stable order.
    pub fn names(self) -> Vec<&'static str> {
        [
            (Capabilities::READ, "read"),
            (Capabilities::WRITE_REQUEST, "write_request"),
            (Capabilities::WRITE_COMMAND, "write_command"),
            (Capabilities::NOTIFY, "notify"),
            (Capabilities::INDICATE, "indicate"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

/// A GATT characteristic as reported by the native library.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicInfo {
    pub uuid: String,
    pub capabilities: Capabilities,
    /// UUIDs of the characteristic's descriptors
    pub descriptors: Vec<String>,
}

/// A GATT service as reported by the native library.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInfo {
    pub uuid: String,
    /// Service data carried in the advertisement, if any
    pub data: Vec<u8>,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub fn characteristic(&self, uuid: &str) -> Option<&CharacteristicInfo> {
        self.characteristics
            .iter()
            .find(|c| c.uuid.eq_ignore_ascii_case(uuid))
    }
}
