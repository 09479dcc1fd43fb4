//! Test support for crates built on `simpleble`.
//!
//! [`FakeStack`] stands in for the native library. [`TestHost`] wires it to a
//! [`Bluetooth`] context and the host [`Executor`] that delivers callbacks.

mod device;
mod stack;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_broadcast::TryRecvError;
use host_executor::Executor;
use simpleble::{Adapter, Bluetooth, BroadcastReceiver, Config, Error, ErrorKind, Result};

pub use device::*;
pub use stack::FakeStack;

/// A host thread with a [`Bluetooth`] context over a [`FakeStack`].
///
/// The executor is not `Send`; the thread that creates a `TestHost` is the
/// host thread for every callback registered through it.
pub struct TestHost {
    pub executor: Executor,
    pub stack: Arc<FakeStack>,
    pub bluetooth: Bluetooth,
}

impl TestHost {
    pub fn new(stack: Arc<FakeStack>) -> Self {
        Self::with_config(stack, Config::default())
    }

    pub fn with_config(stack: Arc<FakeStack>, config: Config) -> Self {
        let executor = Executor::new();
        let bluetooth = Bluetooth::new(stack.clone(), executor.spawner(), config);
        Self {
            executor,
            stack,
            bluetooth,
        }
    }

    /// A stack with one adapter, wrapped in a host.
    pub fn with_adapter() -> Self {
        let stack = Arc::new(FakeStack::new());
        stack.add_adapter("hci0", "00:11:22:33:44:55");
        Self::new(stack)
    }

    /// The first adapter reported by [`Bluetooth::list_adapters`].
    ///
    /// Adapters after the first are released.
    pub fn first_adapter(&self) -> Result<Adapter> {
        let mut adapters = self.bluetooth.list_adapters()?.into_iter();
        let first = adapters
            .next()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no adapters"))?;
        for adapter in adapters {
            adapter.release();
        }
        Ok(first)
    }

    /// Runs queued callbacks until none are left, returning how many ran.
    pub fn drain(&self) -> usize {
        self.executor.run_until_stalled()
    }

    /// Runs callbacks as they arrive until `done` holds or `timeout` elapses.
    ///
    /// Returns whether `done` held.
    pub fn drain_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.drain();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.executor
                .turn((deadline - now).min(Duration::from_millis(10)));
        }
    }
}

/// Returns the most recent value buffered in `receiver`, if any.
///
/// Values displaced by overflow are skipped.
pub fn latest<T: Clone>(receiver: &mut BroadcastReceiver<T>) -> Option<T> {
    let mut latest = None;
    loop {
        match receiver.try_recv() {
            Ok(value) => latest = Some(value),
            Err(TryRecvError::Overflowed(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return latest,
        }
    }
}

/// Installs a `tracing` subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .try_init();
}
