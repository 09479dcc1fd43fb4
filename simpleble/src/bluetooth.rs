use std::sync::Arc;

use host_executor::Spawner;
use tracing::debug;

use crate::adapter::Adapter;
use crate::config::Config;
use crate::error::Result;
use crate::native::NativeApi;
use crate::peripheral::Peripheral;
use crate::registry::{HandleId, HandleRegistry, HandleSource};

/// Entry point: owns the handle registry for one native library instance.
///
/// Callbacks registered through adapters and peripherals obtained here run on
/// the executor behind `spawner`. Dropping the last reference to the registry
/// releases every handle that is still live.
#[derive(Debug, Clone)]
pub struct Bluetooth {
    registry: Arc<HandleRegistry>,
    config: Config,
}

impl Bluetooth {
    pub fn new(native: Arc<dyn NativeApi>, spawner: Spawner, config: Config) -> Self {
        Self {
            registry: HandleRegistry::new(native, spawner),
            config,
        }
    }

    pub fn is_bluetooth_enabled(&self) -> bool {
        self.registry.native().is_bluetooth_enabled()
    }

    /// Number of adapters the native library reports, ignoring [`Config::adapter_index`].
    pub fn adapter_count(&self) -> usize {
        self.registry.native().adapter_count()
    }

    /// Acquires a handle for each adapter.
    ///
    /// With [`Config::adapter_index`] set, returns only that adapter, or
    /// [`ErrorKind::NotFound`][crate::ErrorKind::NotFound] if it does not exist.
    pub fn list_adapters(&self) -> Result<Vec<Adapter>> {
        let indices: Vec<usize> = match self.config.adapter_index {
            Some(index) => {
                debug!(index, "adapter enumeration pinned");
                vec![index]
            }
            None => (0..self.adapter_count()).collect(),
        };

        indices
            .into_iter()
            .map(|index| {
                let entry = self.registry.acquire_entry(HandleSource::Adapters, index)?;
                Adapter::from_entry(&self.registry, &entry)
            })
            .collect()
    }

    /// Looks up a live adapter by handle.
    ///
    /// Fails with [`ErrorKind::InvalidHandle`][crate::ErrorKind::InvalidHandle]
    /// if the handle was released or names a peripheral.
    pub fn adapter(&self, handle: impl Into<HandleId>) -> Result<Adapter> {
        let entry = self.registry.entry(handle.into())?;
        Adapter::from_entry(&self.registry, &entry)
    }

    /// Looks up a live peripheral by handle.
    pub fn peripheral(&self, handle: impl Into<HandleId>) -> Result<Peripheral> {
        let entry = self.registry.entry(handle.into())?;
        Peripheral::from_entry(&self.registry, &entry)
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
