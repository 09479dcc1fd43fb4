//! Callback contexts handed to the native library as userdata pointers.
//!
//! The native library may be inside a trampoline on one of its own threads
//! while the host replaces or releases the callback. Each context therefore
//! carries its own `done` flag and in-flight count, and is freed by whichever
//! side finishes last.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::util::defer;

const DONE: usize = 1;
const IN_FLIGHT: usize = 2;

struct Context<C> {
    /// `DONE` in the low bit, in-flight trampolines counted in steps of `IN_FLIGHT`.
    state: AtomicUsize,
    callback: C,
}

/// A callback installed with the native library.
///
/// Dropping it retires the context: trampolines that arrive later skip the
/// callback, and the allocation is freed once the last running one returns.
pub(crate) struct Installed {
    userdata: usize,
    retire: unsafe fn(*mut c_void),
}

impl Installed {
    pub(crate) fn new<C: Send + Sync + 'static>(callback: C) -> Self {
        let context = Box::new(Context {
            state: AtomicUsize::new(0),
            callback,
        });
        Self {
            userdata: Box::into_raw(context) as usize,
            retire: retire::<C>,
        }
    }

    /// The pointer to pass as native userdata.
    pub(crate) fn userdata(&self) -> *mut c_void {
        self.userdata as *mut c_void
    }
}

impl Drop for Installed {
    fn drop(&mut self) {
        // Safety: `userdata` was created by `Installed::new` with the type
        // `retire` was instantiated for, and each `Installed` retires once.
        unsafe { (self.retire)(self.userdata()) }
    }
}

impl std::fmt::Debug for Installed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installed")
            .field("userdata", &self.userdata)
            .finish()
    }
}

unsafe fn retire<C>(userdata: *mut c_void) {
    let context = userdata as *mut Context<C>;
    // Safety: the context is alive until both `DONE` is set and no
    // trampoline is in flight.
    let previous = unsafe { (*context).state.fetch_or(DONE, Ordering::AcqRel) };
    if previous == 0 {
        // Safety: nothing is running the callback and nothing will enter it.
        drop(unsafe { Box::from_raw(context) });
    }
}

/// Runs `body` with the callback behind `userdata`, unless it was retired.
///
/// # Safety
///
/// `userdata` must come from [`Installed::new`] for the same `C`, and the
/// native library must not start a callback after the call that replaced or
/// removed it has returned.
pub(crate) unsafe fn dispatch<C>(userdata: *mut c_void, body: impl FnOnce(&C)) {
    let context = userdata as *mut Context<C>;
    // Safety: see above; entering keeps the context alive until `leave`.
    let entered = unsafe { (*context).state.fetch_add(IN_FLIGHT, Ordering::AcqRel) };
    let _leave = defer(|| unsafe { leave::<C>(context) });
    if entered & DONE == 0 {
        // Safety: the context cannot be freed while this trampoline is counted.
        body(unsafe { &(*context).callback });
    }
}

unsafe fn leave<C>(context: *mut Context<C>) {
    // Safety: this trampoline is still counted, so the context is alive.
    let previous = unsafe { (*context).state.fetch_sub(IN_FLIGHT, Ordering::AcqRel) };
    if previous == DONE | IN_FLIGHT {
        // Safety: the context was retired and this was the last trampoline in it.
        drop(unsafe { Box::from_raw(context) });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, mpsc};
    use std::thread;

    use super::*;

    /// Counts drops of the callback value itself.
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_dispatch_runs_live_callback() {
        let installed = Installed::new(41usize);
        let mut seen = None;
        unsafe { dispatch::<usize>(installed.userdata(), |value| seen = Some(*value + 1)) };
        assert_eq!(seen, Some(42));
    }

    #[test]
    fn test_retire_without_dispatch_frees_immediately() {
        let drops = Arc::new(AtomicUsize::new(0));
        drop(Installed::new(Tracked(drops.clone())));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retire_during_dispatch_waits_for_trampoline() {
        let drops = Arc::new(AtomicUsize::new(0));
        let installed = Installed::new(Tracked(drops.clone()));
        let userdata = installed.userdata() as usize;

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let native = thread::spawn(move || unsafe {
            dispatch::<Tracked>(userdata as *mut c_void, |tracked| {
                entered_tx.send(()).expect("send");
                release_rx.recv().expect("recv");
                // Still readable after the host retired it.
                assert_eq!(tracked.0.load(Ordering::SeqCst), 0);
            });
        });

        entered_rx.recv().expect("trampoline entered");
        drop(installed);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        release_tx.send(()).expect("send");
        native.join().expect("native thread");
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retired_callback_is_skipped_by_later_trampolines() {
        let drops = Arc::new(AtomicUsize::new(0));
        let installed = Installed::new(Tracked(drops.clone()));
        let userdata = installed.userdata() as usize;

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let first = thread::spawn(move || unsafe {
            dispatch::<Tracked>(userdata as *mut c_void, |_| {
                entered_tx.send(()).expect("send");
                release_rx.recv().expect("recv");
            });
        });
        entered_rx.recv().expect("trampoline entered");
        drop(installed);

        // A second trampoline that raced the retirement must not run the callback.
        let mut ran = false;
        unsafe { dispatch::<Tracked>(userdata as *mut c_void, |_| ran = true) };
        assert!(!ran);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        release_tx.send(()).expect("send");
        first.join().expect("native thread");
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_still_leaves() {
        let drops = Arc::new(AtomicUsize::new(0));
        let installed = Installed::new(Tracked(drops.clone()));
        let userdata = installed.userdata();
        let result = std::panic::catch_unwind(|| unsafe {
            dispatch::<Tracked>(userdata, |_| panic!("callback failed"));
        });
        assert!(result.is_err());
        drop(installed);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
