//! A single-threaded executor for running work on a host thread.
//!
//! Native libraries frequently invoke callbacks on threads they own, while
//! host runtimes expect all user code to run on one cooperative thread. This
//! crate provides an [`Executor`] that lives on the host thread and a
//! [`Spawner`] that can be cloned and sent to any thread to queue work for it.
//! Queued work only runs when the host drains the executor.
//!
//! # Example
//!
//! ```
//! # use host_executor::Executor;
//! let executor = Executor::new();
//! let spawner = executor.spawner();
//!
//! let task = std::thread::spawn(move || spawner.spawn(async { 42 }))
//!     .join()
//!     .unwrap();
//!
//! assert_eq!(executor.block_on(task), 42);
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::pin::{Pin, pin};
use std::task::{Context, Poll};
use std::time::Duration;

use async_io::Timer;
use async_task::Runnable;
use futures_channel::mpsc;
use futures_lite::{FutureExt, StreamExt, future};

/// An executor that runs tasks on the thread that owns it.
///
/// `Executor` is `!Send`; every task spawned through it or through one of its
/// [`Spawner`]s is polled on the owning thread, and only while that thread is
/// inside [`run_until_stalled()`][Executor::run_until_stalled],
/// [`turn()`][Executor::turn] or [`block_on()`][Executor::block_on].
pub struct Executor {
    spawner: Spawner,
    receiver: RefCell<mpsc::UnboundedReceiver<Runnable>>,
    phantom: PhantomData<*mut ()>,
}

impl Executor {
    /// Creates a new executor owned by the current thread.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded();
        Self {
            spawner: Spawner { sender },
            receiver: RefCell::new(receiver),
            phantom: PhantomData,
        }
    }

    /// Returns a [`Spawner`] that queues work onto this executor from any thread.
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    /// Spawns a new asynchronous task, returning a [`Task`] that can be used to await its result.
    ///
    /// Dropping the `Task` will cancel it. If you want the task to run independently, you must call [`detach()`][Task::detach]
    pub fn spawn<R>(&self, future: impl Future<Output = R> + Send + 'static) -> Task<R>
    where
        R: Send + 'static,
    {
        self.spawner.spawn(future)
    }

    /// Spawns a `!Send` future on this executor.
    ///
    /// The returned task may be awaited from any thread, but the future itself
    /// is only ever polled on the thread that owns the executor.
    pub fn spawn_local<R>(&self, future: impl Future<Output = R> + 'static) -> Task<R>
    where
        R: 'static,
    {
        let sender = self.spawner.sender.clone();
        let (runnable, task) = async_task::spawn_local(future, move |runnable: Runnable| {
            let _ = sender.unbounded_send(runnable);
        });
        runnable.schedule();
        Task(TaskState::Spawned(task))
    }

    /// Runs every task that is ready, including tasks scheduled while draining.
    ///
    /// Returns the number of tasks that were run. Never blocks.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while let Some(runnable) = self.try_next() {
            runnable.run();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for at least one task to become ready, then runs
    /// it and everything else that is ready.
    ///
    /// Returns the number of tasks that were run, which is zero on timeout.
    pub fn turn(&self, timeout: Duration) -> usize {
        let first = {
            let mut receiver = self.receiver.borrow_mut();
            future::block_on(receiver.next().or(async {
                Timer::after(timeout).await;
                None
            }))
        };

        match first {
            Some(runnable) => {
                runnable.run();
                1 + self.run_until_stalled()
            }
            None => 0,
        }
    }

    /// Blocks the current thread until `future` completes, running queued tasks
    /// while waiting.
    ///
    /// # Panics
    ///
    /// Panics if `future` re-enters this executor's draining methods.
    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        let mut main = pin!(future);
        loop {
            self.run_until_stalled();

            let step = {
                let mut receiver = self.receiver.borrow_mut();
                future::block_on(async { Step::Ready(main.as_mut().await) }.or(async {
                    match receiver.next().await {
                        Some(runnable) => Step::Run(runnable),
                        None => future::pending().await,
                    }
                }))
            };

            match step {
                Step::Ready(output) => return output,
                Step::Run(runnable) => {
                    runnable.run();
                }
            }
        }
    }

    fn try_next(&self) -> Option<Runnable> {
        self.receiver.borrow_mut().try_recv().ok()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("host_executor::Executor { .. }")
    }
}

enum Step<T> {
    Ready(T),
    Run(Runnable),
}

/// A cloneable, thread-safe handle for queueing work onto an [`Executor`].
#[derive(Clone)]
pub struct Spawner {
    sender: mpsc::UnboundedSender<Runnable>,
}

impl Spawner {
    /// Spawns a new asynchronous task on the owning executor.
    ///
    /// Dropping the `Task` will cancel it. If you want the task to run independently, you must call [`detach()`][Task::detach]
    pub fn spawn<R>(&self, future: impl Future<Output = R> + Send + 'static) -> Task<R>
    where
        R: Send + 'static,
    {
        let sender = self.sender.clone();
        let (runnable, task) = async_task::spawn(future, move |runnable: Runnable| {
            let _ = sender.unbounded_send(runnable);
        });
        runnable.schedule();
        Task(TaskState::Spawned(task))
    }

    /// Queues `func` to run on the owning executor's thread.
    ///
    /// Work posted from one thread runs in the order it was posted. If the
    /// executor has been dropped, `func` is dropped without running.
    pub fn post(&self, func: impl FnOnce() + Send + 'static) {
        self.spawn(async move { func() }).detach();
    }

    /// Returns `true` if the owning executor has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for Spawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawner")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Debug)]
enum TaskState<T> {
    Ready(Option<T>),
    Spawned(async_task::Task<T>),
}

/// A future that resolves to the result of an asynchronous task.
///
/// Dropping a [`Task`] cancels it, which means its future won't be polled again. To drop the
/// [`Task`] handle without canceling it, use [`detach()`][`Task::detach()`] instead.
pub struct Task<T>(TaskState<T>);

impl<T> Task<T> {
    /// Creates a new task that is already completed with the given value.
    pub fn ready(val: T) -> Self {
        Task(TaskState::Ready(Some(val)))
    }

    /// Detaches the task, allowing it to run in the background.
    pub fn detach(self) {
        match self {
            Task(TaskState::Ready(_)) => (),
            Task(TaskState::Spawned(task)) => task.detach(),
        }
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        // Safety: the output is moved out by value and never pinned.
        match unsafe { self.get_unchecked_mut() } {
            Task(TaskState::Ready(val)) => match val.take() {
                Some(val) => Poll::Ready(val),
                None => Poll::Pending,
            },
            Task(TaskState::Spawned(task)) => Pin::new(task).poll(cx),
        }
    }
}
