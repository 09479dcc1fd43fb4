/// Runs a closure when dropped unless [`defuse`][ScopeGuard::defuse]d.
pub struct ScopeGuard<F: FnOnce()> {
    on_drop: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn defuse(mut self) {
        self.on_drop = None;
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

pub fn defer<F: FnOnce()>(on_drop: F) -> ScopeGuard<F> {
    ScopeGuard {
        on_drop: Some(on_drop),
    }
}

pub type BroadcastReceiver<T> = async_broadcast::Receiver<T>;

/// Publishes the current value of a session state to any number of watchers.
///
/// Each watcher buffers one value; a newer value displaces an unread one, so
/// watchers that fall behind only see the latest state.
pub struct StateSender<T> {
    sender: async_broadcast::Sender<T>,
    // Keeps the channel open while nobody is watching.
    _inactive: async_broadcast::InactiveReceiver<T>,
}

impl<T: Clone> StateSender<T> {
    pub fn new() -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(1);
        sender.set_overflow(true);
        Self {
            sender,
            _inactive: receiver.deactivate(),
        }
    }

    pub fn publish(&self, value: T) {
        let _ = self.sender.try_broadcast(value);
    }

    /// A receiver for values published from now on.
    pub fn subscribe(&self) -> BroadcastReceiver<T> {
        self.sender.new_receiver()
    }
}
