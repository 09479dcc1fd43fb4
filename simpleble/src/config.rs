use crate::error::{Error, ErrorKind, Result};

/// Environment variable that pins adapter enumeration to a single index.
pub const ADAPTER_ENV_VAR: &str = "SIMPLEBLE_ADAPTER";

/// Options for a [`Bluetooth`][crate::Bluetooth] context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// When set, [`list_adapters()`][crate::Bluetooth::list_adapters] returns
    /// only the adapter at this index.
    pub adapter_index: Option<usize>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps variable names to values.
    ///
    /// An empty value is treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let adapter_index = match lookup(ADAPTER_ENV_VAR) {
            Some(value) if !value.trim().is_empty() => {
                let index = value.trim().parse::<usize>().map_err(|_| {
                    Error::new(
                        ErrorKind::InvalidArgument,
                        format!("{ADAPTER_ENV_VAR} must be an adapter index, got `{value}`"),
                    )
                })?;
                Some(index)
            }
            _ => None,
        };

        Ok(Self { adapter_index })
    }

    pub fn with_adapter_index(mut self, index: Option<usize>) -> Self {
        self.adapter_index = index;
        self
    }
}
