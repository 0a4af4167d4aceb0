//! Simulation environment for running Cohort applications on a hosted
//! environment.
//!
//! [`StdKernel`] implements every kernel trait of [`cohort_core`] on top of
//! OS threads. Each task is backed by a dedicated thread, and timer callbacks
//! run one at a time on a timer service thread.
//!
//! # Suspension and deletion
//!
//! A thread can't be stopped from the outside, so a task observes a pending
//! suspension or deletion only at a *checkpoint*: the entry of every kernel
//! service that actually blocks (including [`raw_sleep`] with any duration)
//! and every wake-up inside it. Zero-timeout services are not checkpoints.
//!
//!  - A suspended task parks at its next checkpoint until it's resumed.
//!  - A deleted task unwinds out of its next checkpoint and its thread exits.
//!    A task that deletes itself unwinds immediately.
//!
//! Task priorities are recorded but not enforced; the host OS schedules the
//! task threads.
//!
//! [`raw_sleep`]: cohort_core::kernel::KernelBase::raw_sleep
#![deny(unsafe_op_in_unsafe_fn)]
use cohort_core::{
    kernel::{AllocObjectError, NoAccessError},
    time::{Duration, Ticks},
};
use slab::Slab;
use spin::Mutex as SpinMutex;
use std::{
    any::Any,
    cell::Cell,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

mod mutex;
mod queue;
mod task;
mod timer;
mod wait;

#[doc(hidden)]
pub extern crate env_logger;

/// The default length of one kernel tick.
pub const DEFAULT_TICK: std::time::Duration = std::time::Duration::from_millis(1);

/// The default maximum number of objects of each kind.
pub const DEFAULT_MAX_OBJECTS: usize = 16;

/// Static configuration of [`StdKernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// The wall-clock length of one kernel tick.
    pub tick: std::time::Duration,
    /// The maximum number of tasks that aren't deleted. Creating more fails
    /// with `NoMemory`.
    pub max_tasks: usize,
    /// The maximum number of mutexes.
    pub max_mutexes: usize,
    /// The maximum number of queues.
    pub max_queues: usize,
    /// The maximum number of timers.
    pub max_timers: usize,
}

impl PortConfig {
    pub const DEFAULT: Self = Self {
        tick: DEFAULT_TICK,
        max_tasks: DEFAULT_MAX_OBJECTS,
        max_mutexes: DEFAULT_MAX_OBJECTS,
        max_queues: DEFAULT_MAX_OBJECTS,
        max_timers: DEFAULT_MAX_OBJECTS,
    };

    /// Use the specified tick length.
    pub const fn with_tick(self, tick: std::time::Duration) -> Self {
        Self { tick, ..self }
    }

    /// Read the tick length (in microseconds) from the `COHORT_TICK_US`
    /// environment variable, falling back to [`DEFAULT_TICK`].
    pub fn from_env() -> Self {
        let mut config = Self::DEFAULT;
        if let Ok(value) = std::env::var("COHORT_TICK_US") {
            match value.parse::<u64>() {
                Ok(us) if us > 0 => config.tick = std::time::Duration::from_micros(us),
                _ => log::warn!("ignoring invalid COHORT_TICK_US value {value:?}"),
            }
        }
        config
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

macro_rules! define_id {
    ($( $(#[$meta:meta])* $name:ident ),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            /// Get the raw slab index.
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    )*};
}

define_id! {
    /// Identifies a task of [`StdKernel`].
    TaskId,
    /// Identifies a mutex of [`StdKernel`].
    MutexId,
    /// Identifies a queue of [`StdKernel`].
    QueueId,
    /// Identifies a timer of [`StdKernel`].
    TimerId,
}

/// The role of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadRole {
    Unknown,
    /// The backing thread for a task of the kernel identified by `kernel`.
    Task { kernel: usize, task: TaskId },
    /// The timer service thread of the kernel identified by `kernel`.
    TimerService { kernel: usize },
}

thread_local! {
    /// The current thread's role. It's automatically assigned after the
    /// creation of a thread managed by the port.
    static THREAD_ROLE: Cell<ThreadRole> = Cell::new(ThreadRole::Unknown);
}

/// The unwinding payload used to terminate the thread of a deleted task.
struct TaskDeleted;

/// A kernel implementation backed by OS threads.
///
/// Cloning a `StdKernel` produces another handle to the same kernel.
#[derive(Clone)]
pub struct StdKernel {
    state: Arc<State>,
}

/// The internal state of the kernel.
struct State {
    config: PortConfig,
    origin: Instant,
    started: AtomicBool,
    shutting_down: AtomicBool,
    tasks: SpinMutex<Slab<Arc<task::TaskCb>>>,
    mutexes: SpinMutex<Slab<Arc<mutex::MutexCb>>>,
    queues: SpinMutex<Slab<Arc<queue::QueueCb>>>,
    timers: SpinMutex<Slab<Arc<timer::TimerCb>>>,
    timer_cmd_send: SpinMutex<Option<mpsc::Sender<timer::TimerCmd>>>,
    join_handles: SpinMutex<Vec<JoinHandle<()>>>,
    /// The thread blocked in [`StdKernel::start_scheduler`].
    boot_thread: SpinMutex<Option<thread::Thread>>,
    /// Panics caught in the threads managed by the port. The first one is
    /// propagated by [`StdKernel::start_scheduler`].
    panics: SpinMutex<Vec<Box<dyn Any + Send>>>,
}

impl StdKernel {
    /// Construct a kernel. Nothing runs until [`Self::start_scheduler`] is
    /// called.
    pub fn new(config: PortConfig) -> Self {
        log::trace!("creating a kernel with {config:?}");
        Self {
            state: Arc::new(State {
                config,
                origin: Instant::now(),
                started: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                tasks: SpinMutex::new(Slab::new()),
                mutexes: SpinMutex::new(Slab::new()),
                queues: SpinMutex::new(Slab::new()),
                timers: SpinMutex::new(Slab::new()),
                timer_cmd_send: SpinMutex::new(None),
                join_handles: SpinMutex::new(Vec::new()),
                boot_thread: SpinMutex::new(None),
                panics: SpinMutex::new(Vec::new()),
            }),
        }
    }

    /// Get the configuration the kernel was created with.
    pub fn config(&self) -> &PortConfig {
        &self.state.config
    }

    /// Get a flag indicating whether [`Self::start_scheduler`] has been
    /// called.
    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::Acquire)
    }

    /// Get a flag indicating whether [`Self::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.state.shutting_down.load(Ordering::Acquire)
    }

    /// Start running tasks and timers.
    ///
    /// Returns when the shutdown initiated by [`Self::shutdown`] completes.
    /// A panic in any task or timer callback initiates a shutdown and is
    /// propagated from here.
    ///
    /// # Panics
    ///
    /// Panics if called from a thread managed by the port or called twice.
    pub fn start_scheduler(&self) {
        assert_eq!(
            THREAD_ROLE.with(|r| r.get()),
            ThreadRole::Unknown,
            "`start_scheduler` called from a thread managed by the port"
        );
        assert!(
            !self.state.started.swap(true, Ordering::AcqRel),
            "`start_scheduler` called twice"
        );
        *self.state.boot_thread.lock() = Some(thread::current());

        // Start the timer service thread
        let (timer_cmd_send, timer_cmd_recv) = mpsc::channel();
        *self.state.timer_cmd_send.lock() = Some(timer_cmd_send);
        log::trace!("starting the timer service thread");
        let kernel = self.clone();
        match thread::Builder::new()
            .name("timer service".to_owned())
            .spawn(move || kernel.timer_service(timer_cmd_recv))
        {
            Ok(join_handle) => self.state.join_handles.lock().push(join_handle),
            Err(e) => self.state.fatal(format!("failed to start the timer service: {e}")),
        }

        // Start the threads of the tasks created so far
        let pending: Vec<_> = self
            .state
            .tasks
            .lock()
            .iter()
            .map(|(i, task)| (TaskId(i), Arc::clone(task)))
            .collect();
        for (id, task) in pending {
            if let Err(e) = self.spawn_task(id, task) {
                self.state
                    .fatal(format!("failed to start the thread of {id:?}: {e}"));
            }
        }

        // Wait until the shutdown is initiated
        while !self.is_shutting_down() {
            thread::park();
        }

        // Join every thread. A task created during the shutdown adds a new
        // handle, so repeat until no new handles appear.
        loop {
            let join_handles = std::mem::take(&mut *self.state.join_handles.lock());
            if join_handles.is_empty() {
                break;
            }
            for join_handle in join_handles {
                let name = join_handle.thread().name().map(str::to_owned);
                if join_handle.join().is_err() {
                    // Panics are caught and recorded by the threads themselves
                    log::warn!("thread {name:?} terminated abnormally");
                }
            }
        }
        log::trace!("all threads have exited");

        // Propagate any panic that occured in a managed thread
        let mut panics = std::mem::take(&mut *self.state.panics.lock());
        if !panics.is_empty() {
            std::panic::resume_unwind(panics.swap_remove(0));
        }
    }

    /// Initiate a graceful shutdown. Every task is deleted, and the timer
    /// service stops.
    ///
    /// This can be called from any thread. It doesn't wait for the shutdown
    /// to complete; [`Self::start_scheduler`] does that.
    pub fn shutdown(&self) {
        self.state.shutdown();
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    /// Get the task running in the current thread, if it's a task thread of
    /// this kernel.
    fn current_task(&self) -> Option<TaskId> {
        let key = self.key();
        THREAD_ROLE.with(|role| match role.get() {
            ThreadRole::Task { kernel, task } if kernel == key => Some(task),
            _ => None,
        })
    }

    fn is_timer_service_context(&self) -> bool {
        let key = self.key();
        THREAD_ROLE.with(|role| match role.get() {
            ThreadRole::TimerService { kernel } => kernel == key,
            _ => false,
        })
    }

    /// Convert a timeout to an absolute deadline. Returns `None` for an
    /// indefinite timeout.
    fn deadline_after(&self, timeout: Duration) -> Option<Instant> {
        if timeout.is_indefinite() {
            return None;
        }
        timeout
            .checked_to_wall(self.state.config.tick)
            .and_then(|wall| Instant::now().checked_add(wall))
    }

    fn tick_count_at(&self, at: Instant) -> Ticks {
        let elapsed = at.saturating_duration_since(self.state.origin);
        Ticks((elapsed.as_nanos() / self.state.config.tick.as_nanos().max(1)) as u32)
    }

    /// Check that a new object can be added to a table currently holding
    /// `len` objects.
    fn check_alloc(&self, len: usize, max: usize) -> Result<(), AllocObjectError> {
        if self.is_shutting_down() {
            Err(AllocObjectError::BadObjectState)
        } else if len >= max {
            Err(AllocObjectError::NoMemory)
        } else {
            Ok(())
        }
    }
}

impl Default for StdKernel {
    fn default() -> Self {
        Self::new(PortConfig::DEFAULT)
    }
}

impl fmt::Debug for StdKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StdKernel")
            .field("config", &self.state.config)
            .field("started", &self.is_started())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl State {
    fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        log::trace!("initiating shutdown");

        for (_, task) in self.tasks.lock().iter() {
            task.mark_deleted();
        }

        // `timer_cmd_recv.recv` will return `Err(_)` when we drop the
        // corresponding sender (`timer_cmd_send`).
        *self.timer_cmd_send.lock() = None;

        if let Some(boot_thread) = &*self.boot_thread.lock() {
            boot_thread.unpark();
        }
    }

    /// Record a panic caught in a managed thread and initiate a shutdown.
    fn record_panic(&self, payload: Box<dyn Any + Send>) {
        self.panics.lock().push(payload);
        self.shutdown();
    }

    /// Report a violation of the port's runtime invariants. The message is
    /// propagated as a panic by [`StdKernel::start_scheduler`].
    fn fatal(&self, message: String) {
        log::error!("{message}");
        self.record_panic(Box::new(message));
    }
}

/// Look up an object in one of the kernel's object tables.
fn lookup<T>(table: &SpinMutex<Slab<Arc<T>>>, index: usize) -> Result<Arc<T>, NoAccessError> {
    table
        .lock()
        .get(index)
        .cloned()
        .ok_or(NoAccessError::NoAccess)
}

/// Initialize `env_logger` for tests. Tolerates repeated calls.
#[doc(hidden)]
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
