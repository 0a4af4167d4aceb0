//! Bring-up of the whole application.
use cohort_core::kernel::{
    CreateMutexError, CreateQueueError, CreateTaskError, CreateTimerError, Kernel,
    StartTimerError, TaskAttr, TaskEntry, TimerAttr,
};
use spin::Mutex as SpinMutex;
use std::{
    fmt, io,
    sync::{Arc, OnceLock},
};

use crate::{
    channel::{Channel, Consumer, Producer},
    config::{AppConfig, ConfigError},
    console::Console,
    heartbeat::{Heartbeat, StatusIndicator},
    printer::Printer,
    supervisor::{Phase, PrinterPair, Script, Supervisor, TimerPair},
    trap::trap,
};

/// The first failure encountered by [`App::bring_up`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    Config(ConfigError),
    CreateMutex(CreateMutexError),
    CreateTask {
        name: &'static str,
        error: CreateTaskError,
    },
    CreateTimer {
        name: &'static str,
        error: CreateTimerError,
    },
    StartTimer {
        name: &'static str,
        error: StartTimerError,
    },
    CreateQueue(CreateQueueError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::CreateMutex(e) => write!(f, "failed to create the console mutex: {e}"),
            Self::CreateTask { name, error } => {
                write!(f, "failed to create task `{name}`: {error}")
            }
            Self::CreateTimer { name, error } => {
                write!(f, "failed to create timer `{name}`: {error}")
            }
            Self::StartTimer { name, error } => {
                write!(f, "failed to start timer `{name}`: {error}")
            }
            Self::CreateQueue(e) => write!(f, "failed to create the channel: {e}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

/// The tasks that aren't supervised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workers<T> {
    pub consumer: T,
    pub producer: T,
    pub heartbeat: T,
}

type SupervisorCell<K> = OnceLock<SpinMutex<Supervisor<K>>>;

/// Every object of the application. Created by [`App::bring_up`].
pub struct App<K: Kernel, W> {
    kernel: Arc<K>,
    config: AppConfig,
    console: Arc<Console<K, W>>,
    printers: PrinterPair<K::RawTaskId>,
    timers: TimerPair<K::RawTimerId>,
    channel: Channel<K>,
    workers: Workers<K::RawTaskId>,
    supervisor: Arc<SupervisorCell<K>>,
}

impl<K: Kernel, W> fmt::Debug for App<K, W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("App")
            .field("printers", &self.printers)
            .field("timers", &self.timers)
            .field("channel", &self.channel)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl<K: Kernel, W: io::Write + Send + 'static> App<K, W> {
    /// Create every task, timer, and kernel object of the application, and
    /// arm the repeating timer. The tasks start running when the kernel
    /// starts scheduling.
    ///
    /// Objects are created in a fixed order, and the first failure is
    /// returned as is. Objects created before the failure are left in place.
    pub fn bring_up(
        kernel: Arc<K>,
        config: AppConfig,
        sink: W,
        indicator: Arc<dyn StatusIndicator>,
    ) -> Result<Self, StartupError> {
        config.validate().map_err(StartupError::Config)?;

        let console = Arc::new(
            Console::new(Arc::clone(&kernel), sink).map_err(StartupError::CreateMutex)?,
        );

        let printer = |glyph| {
            Printer::new(
                Arc::clone(&kernel),
                Arc::clone(&console),
                glyph,
                config.burst_len,
                config.printer_period,
            )
        };
        let printer_o = printer(config.glyph_o);
        let printer_x = printer(config.glyph_x);
        let printers = PrinterPair {
            o: create_task(&*kernel, "printer-o", config.priority, move || printer_o.run())?,
            x: create_task(&*kernel, "printer-x", config.priority, move || printer_x.run())?,
        };

        // Both timers share one callback, which defers to the supervisor
        // installed below
        let supervisor: Arc<SupervisorCell<K>> = Arc::new(OnceLock::new());
        let timers = TimerPair {
            repeating: create_timer(
                &*kernel,
                &supervisor,
                TimerAttr {
                    name: "repeating",
                    period: config.repeating_period,
                    auto_reload: true,
                },
            )?,
            one_shot: create_timer(
                &*kernel,
                &supervisor,
                TimerAttr {
                    name: "one-shot",
                    period: config.one_shot_period,
                    auto_reload: false,
                },
            )?,
        };
        let installed = supervisor
            .set(SpinMutex::new(Supervisor::new(
                Arc::clone(&kernel),
                printers,
                timers,
                Script::from_config(&config),
            )))
            .is_ok();
        debug_assert!(installed);

        kernel
            .raw_timer_start(timers.repeating)
            .map_err(|error| StartupError::StartTimer {
                name: "repeating",
                error,
            })?;

        let channel = Channel::new(Arc::clone(&kernel), config.queue_capacity)
            .map_err(StartupError::CreateQueue)?;

        let consumer = Consumer::new(channel.clone(), config.consumer_timeout);
        let producer = Producer::new(channel.clone(), config.seed, config.producer_interval);
        let heartbeat = Heartbeat::new(
            Arc::clone(&kernel),
            indicator,
            config.heartbeat_half_period,
        );
        let workers = Workers {
            consumer: create_task(&*kernel, "consumer", config.priority, move || consumer.run())?,
            producer: create_task(&*kernel, "producer", config.priority, move || producer.run())?,
            heartbeat: create_task(&*kernel, "heartbeat", config.priority, move || {
                heartbeat.run()
            })?,
        };

        log::debug!("bring-up complete: printers = {printers:?}, timers = {timers:?}");

        Ok(Self {
            kernel,
            config,
            console,
            printers,
            timers,
            channel,
            workers,
            supervisor,
        })
    }
}

impl<K: Kernel, W> App<K, W> {
    pub fn kernel(&self) -> &Arc<K> {
        &self.kernel
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn console(&self) -> &Arc<Console<K, W>> {
        &self.console
    }

    pub fn printers(&self) -> PrinterPair<K::RawTaskId> {
        self.printers
    }

    pub fn timers(&self) -> TimerPair<K::RawTimerId> {
        self.timers
    }

    pub fn workers(&self) -> Workers<K::RawTaskId> {
        self.workers
    }

    pub fn channel(&self) -> &Channel<K> {
        &self.channel
    }

    /// Get the current lifecycle phase of the printers.
    pub fn phase(&self) -> Phase {
        self.with_supervisor(|s| s.phase())
    }

    /// Call `f` with the supervisor locked. Blocks the timer service while
    /// `f` runs.
    pub fn with_supervisor<R>(&self, f: impl FnOnce(&Supervisor<K>) -> R) -> R {
        match self.supervisor.get() {
            Some(supervisor) => f(&supervisor.lock()),
            None => trap("the supervisor isn't installed"),
        }
    }
}

fn create_task<K: Kernel>(
    kernel: &K,
    name: &'static str,
    priority: usize,
    entry: impl FnOnce() + Send + 'static,
) -> Result<K::RawTaskId, StartupError> {
    let entry: TaskEntry = Box::new(entry);
    kernel
        .raw_task_create(TaskAttr::new(name, priority), entry)
        .map_err(|error| StartupError::CreateTask { name, error })
}

fn create_timer<K: Kernel>(
    kernel: &K,
    supervisor: &Arc<SupervisorCell<K>>,
    attr: TimerAttr,
) -> Result<K::RawTimerId, StartupError> {
    let supervisor = Arc::clone(supervisor);
    kernel
        .raw_timer_create(
            attr,
            Box::new(move |timer| match supervisor.get() {
                Some(supervisor) => {
                    if let Err(e) = supervisor.lock().on_timer_fired(timer) {
                        trap(e);
                    }
                }
                None => log::warn!("{timer:?} fired before the supervisor was installed"),
            }),
        )
        .map_err(|error| StartupError::CreateTimer {
            name: attr.name,
            error,
        })
}

/// Hold the status indicator on and park the current thread forever. This is
/// where the process ends up when [`App::bring_up`] fails.
pub fn enter_error_state(indicator: &dyn StatusIndicator) -> ! {
    indicator.set(true);
    log::error!("entering the error state");
    loop {
        std::thread::park();
    }
}
