//! The lifecycle supervisor.
//!
//! The supervisor drives the printers through a fixed script using two
//! timers. Each firing of the repeating timer advances its count:
//!
//! | count            | commands                                          | phase after          |
//! |------------------|---------------------------------------------------|----------------------|
//! | `suspend_o_at`   | suspend Printer-O                                 | `PartiallySuspended` |
//! | `suspend_x_at`   | suspend Printer-X                                 | `FullySuspended`     |
//! | `hand_off_at`    | resume both, stop repeating, start one-shot       | `Resumed`            |
//!
//! The one-shot timer's first firing after the hand-off deletes both
//! printers, and the phase becomes `Terminated`. Every other firing is
//! counted and otherwise ignored.
use arrayvec::ArrayVec;
use cohort_core::{
    kernel::{KernelBase, KernelTimer, ResultCode},
    time::Ticks,
};
use core::fmt;
use std::sync::Arc;

use crate::config::AppConfig;

/// The two printer tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterPair<T> {
    pub o: T,
    pub x: T,
}

/// The two supervisor timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerPair<T> {
    pub repeating: T,
    pub one_shot: T,
}

/// Selects one of the printers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrinterRole {
    O,
    X,
}

/// The role of a timer that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerRole {
    Repeating,
    OneShot,
    /// A timer the supervisor doesn't own. Its firings are ignored.
    Unknown,
}

/// The per-timer state kept by the supervisor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    /// The number of times the timer has fired. Never reset.
    pub count: u32,
}

/// The lifecycle phase of the printers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Both printers are running.
    Running,
    /// Printer-O is suspended.
    PartiallySuspended,
    /// Both printers are suspended.
    FullySuspended,
    /// Both printers are running again, and the one-shot timer is armed.
    Resumed,
    /// Both printers are deleted.
    Terminated,
}

/// A lifecycle command issued by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Suspend(PrinterRole),
    Resume(PrinterRole),
    Delete(PrinterRole),
    StopTimer(TimerRole),
    StartTimer(TimerRole),
}

/// The outcome of one timer firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub role: TimerRole,
    /// The firing timer's count after the increment. `None` for an unknown
    /// timer.
    pub count: Option<u32>,
    /// The commands issued, in the order of issue.
    pub commands: ArrayVec<Command, 4>,
    /// The phase after the commands were issued.
    pub phase: Phase,
    /// The kernel tick count at the time of the firing.
    pub tick: Ticks,
}

/// The repeating timer's counts at which the supervisor acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Script {
    pub suspend_o_at: u32,
    pub suspend_x_at: u32,
    pub hand_off_at: u32,
}

impl Script {
    pub const fn from_config(config: &AppConfig) -> Self {
        Self {
            suspend_o_at: config.suspend_o_at,
            suspend_x_at: config.suspend_x_at,
            hand_off_at: config.hand_off_at,
        }
    }
}

/// A lifecycle command that the kernel rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorError {
    pub command: Command,
    pub code: ResultCode,
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} failed with {}", self.command, self.code)
    }
}

impl std::error::Error for SupervisorError {}

/// The number of recent transitions kept by [`Supervisor::history`].
pub const HISTORY_LEN: usize = 16;

/// Translates timer firings into lifecycle commands on the printers.
pub struct Supervisor<K: KernelBase + KernelTimer> {
    kernel: Arc<K>,
    printers: PrinterPair<K::RawTaskId>,
    timers: TimerPair<K::RawTimerId>,
    script: Script,
    repeating: TimerState,
    one_shot: TimerState,
    phase: Phase,
    history: ArrayVec<Transition, HISTORY_LEN>,
}

impl<K: KernelBase + KernelTimer> fmt::Debug for Supervisor<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("printers", &self.printers)
            .field("timers", &self.timers)
            .field("script", &self.script)
            .field("repeating", &self.repeating)
            .field("one_shot", &self.one_shot)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<K: KernelBase + KernelTimer> Supervisor<K> {
    pub fn new(
        kernel: Arc<K>,
        printers: PrinterPair<K::RawTaskId>,
        timers: TimerPair<K::RawTimerId>,
        script: Script,
    ) -> Self {
        Self {
            kernel,
            printers,
            timers,
            script,
            repeating: TimerState::default(),
            one_shot: TimerState::default(),
            phase: Phase::Running,
            history: ArrayVec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Get the state kept for the timer with the specified role.
    pub fn timer_state(&self, role: TimerRole) -> Option<TimerState> {
        match role {
            TimerRole::Repeating => Some(self.repeating),
            TimerRole::OneShot => Some(self.one_shot),
            TimerRole::Unknown => None,
        }
    }

    /// The last [`HISTORY_LEN`] transitions, oldest first.
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Identify a timer.
    pub fn role_of(&self, timer: K::RawTimerId) -> TimerRole {
        if timer == self.timers.repeating {
            TimerRole::Repeating
        } else if timer == self.timers.one_shot {
            TimerRole::OneShot
        } else {
            TimerRole::Unknown
        }
    }

    /// Handle a firing of `timer`: advance the script and apply the resulting
    /// commands through the kernel.
    ///
    /// Stops at the first command that fails. The state has already advanced
    /// by then, so the failed step is never retried.
    pub fn on_timer_fired(&mut self, timer: K::RawTimerId) -> Result<Transition, SupervisorError> {
        let role = self.role_of(timer);
        let tick = self.kernel.raw_tick_count();
        let transition = self.step(role, tick);

        match (transition.role, transition.count) {
            (TimerRole::Repeating, Some(count)) => {
                log::info!("Repeating timer [{tick}] count={count}")
            }
            (TimerRole::OneShot, Some(_)) => log::info!("One shot timer [{tick}]"),
            _ => log::debug!("ignoring unknown timer {timer:?}"),
        }
        if !transition.commands.is_empty() {
            log::info!("{:?} → {:?}", transition.commands, transition.phase);
        }

        for &command in &transition.commands {
            self.execute(command)
                .map_err(|code| SupervisorError { command, code })?;
        }
        Ok(transition)
    }

    /// Advance the script for a firing of the timer with the specified role
    /// and return the commands to issue. This doesn't touch the kernel.
    pub fn step(&mut self, role: TimerRole, tick: Ticks) -> Transition {
        let mut commands = ArrayVec::new();
        let count = match role {
            TimerRole::Repeating => {
                self.repeating.count = self.repeating.count.wrapping_add(1);
                let count = self.repeating.count;
                let script = self.script;
                match self.phase {
                    Phase::Running | Phase::PartiallySuspended | Phase::FullySuspended => {
                        if count == script.suspend_o_at {
                            commands.push(Command::Suspend(PrinterRole::O));
                            self.phase = Phase::PartiallySuspended;
                        } else if count == script.suspend_x_at {
                            commands.push(Command::Suspend(PrinterRole::X));
                            self.phase = Phase::FullySuspended;
                        } else if count == script.hand_off_at {
                            commands.push(Command::Resume(PrinterRole::O));
                            commands.push(Command::Resume(PrinterRole::X));
                            commands.push(Command::StopTimer(TimerRole::Repeating));
                            commands.push(Command::StartTimer(TimerRole::OneShot));
                            self.phase = Phase::Resumed;
                        }
                    }
                    // A firing that raced with the stop
                    Phase::Resumed | Phase::Terminated => {}
                }
                Some(count)
            }
            TimerRole::OneShot => {
                self.one_shot.count = self.one_shot.count.wrapping_add(1);
                if self.phase == Phase::Resumed {
                    commands.push(Command::Delete(PrinterRole::O));
                    commands.push(Command::Delete(PrinterRole::X));
                    self.phase = Phase::Terminated;
                }
                Some(self.one_shot.count)
            }
            TimerRole::Unknown => None,
        };

        let transition = Transition {
            role,
            count,
            commands,
            phase: self.phase,
            tick,
        };
        if self.history.is_full() {
            self.history.remove(0);
        }
        self.history.push(transition.clone());
        transition
    }

    fn execute(&self, command: Command) -> Result<(), ResultCode> {
        let kernel = &*self.kernel;
        match command {
            Command::Suspend(p) => kernel.raw_task_suspend(self.printer(p)).map_err(Into::into),
            Command::Resume(p) => kernel.raw_task_resume(self.printer(p)).map_err(Into::into),
            Command::Delete(p) => kernel.raw_task_delete(self.printer(p)).map_err(Into::into),
            Command::StopTimer(t) => match self.timer(t) {
                Some(timer) => kernel.raw_timer_stop(timer).map_err(Into::into),
                None => Err(ResultCode::NoAccess),
            },
            Command::StartTimer(t) => match self.timer(t) {
                Some(timer) => kernel.raw_timer_start(timer).map_err(Into::into),
                None => Err(ResultCode::NoAccess),
            },
        }
    }

    fn printer(&self, role: PrinterRole) -> K::RawTaskId {
        match role {
            PrinterRole::O => self.printers.o,
            PrinterRole::X => self.printers.x,
        }
    }

    fn timer(&self, role: TimerRole) -> Option<K::RawTimerId> {
        match role {
            TimerRole::Repeating => Some(self.timers.repeating),
            TimerRole::OneShot => Some(self.timers.one_shot),
            TimerRole::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cohort_core::{
        kernel::{
            CreateTaskError, CreateTimerError, DeleteTaskError, GetCurrentTaskError,
            GetTaskStateError, QueryTimerError, ResumeTaskError, SleepError, StartTimerError,
            StopTimerError, SuspendTaskError, TaskAttr, TaskEntry, TaskState, TimerAttr,
            TimerCallback,
        },
        time::Duration,
    };
    use quickcheck_macros::quickcheck;
    use spin::Mutex as SpinMutex;

    /// A kernel call made by the supervisor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Suspend(usize),
        Resume(usize),
        Delete(usize),
        Stop(usize),
        Start(usize),
    }

    /// A kernel that records lifecycle commands and tracks task states.
    #[derive(Default)]
    struct RecordingKernel {
        calls: SpinMutex<Vec<Call>>,
        tasks: SpinMutex<Vec<TaskState>>,
        timers: SpinMutex<Vec<bool>>,
    }

    impl RecordingKernel {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn task_state(&self, id: usize) -> TaskState {
            self.tasks.lock()[id]
        }
    }

    impl KernelBase for RecordingKernel {
        type RawTaskId = usize;

        fn raw_task_create(&self, _: TaskAttr, _: TaskEntry) -> Result<usize, CreateTaskError> {
            let mut tasks = self.tasks.lock();
            tasks.push(TaskState::Active);
            Ok(tasks.len() - 1)
        }

        fn raw_task_suspend(&self, this: usize) -> Result<(), SuspendTaskError> {
            self.calls.lock().push(Call::Suspend(this));
            let mut tasks = self.tasks.lock();
            match tasks.get_mut(this) {
                Some(s @ TaskState::Active) => *s = TaskState::Suspended,
                Some(TaskState::Suspended) => return Err(SuspendTaskError::BadObjectState),
                _ => return Err(SuspendTaskError::NoAccess),
            }
            Ok(())
        }

        fn raw_task_resume(&self, this: usize) -> Result<(), ResumeTaskError> {
            self.calls.lock().push(Call::Resume(this));
            let mut tasks = self.tasks.lock();
            match tasks.get_mut(this) {
                Some(s @ TaskState::Suspended) => *s = TaskState::Active,
                Some(TaskState::Active) => return Err(ResumeTaskError::BadObjectState),
                _ => return Err(ResumeTaskError::NoAccess),
            }
            Ok(())
        }

        fn raw_task_delete(&self, this: usize) -> Result<(), DeleteTaskError> {
            self.calls.lock().push(Call::Delete(this));
            let mut tasks = self.tasks.lock();
            match tasks.get_mut(this) {
                Some(TaskState::Deleted) | None => Err(DeleteTaskError::NoAccess),
                Some(s) => {
                    *s = TaskState::Deleted;
                    Ok(())
                }
            }
        }

        fn raw_task_state(&self, this: usize) -> Result<TaskState, GetTaskStateError> {
            self.tasks.lock().get(this).copied().ok_or(GetTaskStateError::NoAccess)
        }

        fn raw_task_current(&self) -> Result<usize, GetCurrentTaskError> {
            Err(GetCurrentTaskError::BadContext)
        }

        fn raw_sleep(&self, _: Duration) -> Result<(), SleepError> {
            Ok(())
        }

        fn raw_tick_count(&self) -> Ticks {
            Ticks(self.calls.lock().len() as u32)
        }
    }

    impl KernelTimer for RecordingKernel {
        type RawTimerId = usize;

        fn raw_timer_create(
            &self,
            _: TimerAttr,
            _: TimerCallback<usize>,
        ) -> Result<usize, CreateTimerError> {
            let mut timers = self.timers.lock();
            timers.push(false);
            Ok(timers.len() - 1)
        }

        fn raw_timer_start(&self, this: usize) -> Result<(), StartTimerError> {
            self.calls.lock().push(Call::Start(this));
            *self.timers.lock().get_mut(this).ok_or(StartTimerError::NoAccess)? = true;
            Ok(())
        }

        fn raw_timer_stop(&self, this: usize) -> Result<(), StopTimerError> {
            self.calls.lock().push(Call::Stop(this));
            *self.timers.lock().get_mut(this).ok_or(StopTimerError::NoAccess)? = false;
            Ok(())
        }

        fn raw_timer_is_active(&self, this: usize) -> Result<bool, QueryTimerError> {
            self.timers.lock().get(this).copied().ok_or(QueryTimerError::NoAccess)
        }
    }

    const O: usize = 0;
    const X: usize = 1;
    const REPEATING: usize = 0;
    const ONE_SHOT: usize = 1;

    fn setup() -> (Arc<RecordingKernel>, Supervisor<RecordingKernel>) {
        let kernel = Arc::new(RecordingKernel::default());
        let attr = TaskAttr::new("printer", 1);
        let o = kernel.raw_task_create(attr, Box::new(|| {})).unwrap();
        let x = kernel.raw_task_create(attr, Box::new(|| {})).unwrap();
        let timer_attr = TimerAttr {
            name: "timer",
            period: Duration::from_ticks(1),
            auto_reload: true,
        };
        let repeating = kernel.raw_timer_create(timer_attr, Box::new(|_| {})).unwrap();
        let one_shot = kernel.raw_timer_create(timer_attr, Box::new(|_| {})).unwrap();
        kernel.raw_timer_start(repeating).unwrap();
        kernel.calls.lock().clear();

        let supervisor = Supervisor::new(
            Arc::clone(&kernel),
            PrinterPair { o, x },
            TimerPair {
                repeating,
                one_shot,
            },
            Script::from_config(&AppConfig::DEFAULT),
        );
        (kernel, supervisor)
    }

    #[test]
    fn reference_script() {
        let (kernel, mut sup) = setup();

        let t = sup.on_timer_fired(REPEATING).unwrap();
        assert_eq!((t.count, t.phase), (Some(1), Phase::Running));
        assert!(t.commands.is_empty());

        let t = sup.on_timer_fired(REPEATING).unwrap();
        assert_eq!((t.count, t.phase), (Some(2), Phase::PartiallySuspended));
        assert_eq!(kernel.task_state(O), TaskState::Suspended);
        assert_eq!(kernel.task_state(X), TaskState::Active);

        let t = sup.on_timer_fired(REPEATING).unwrap();
        assert_eq!((t.count, t.phase), (Some(3), Phase::PartiallySuspended));
        assert!(t.commands.is_empty());

        let t = sup.on_timer_fired(REPEATING).unwrap();
        assert_eq!((t.count, t.phase), (Some(4), Phase::FullySuspended));
        assert_eq!(kernel.task_state(X), TaskState::Suspended);

        let t = sup.on_timer_fired(REPEATING).unwrap();
        assert_eq!((t.count, t.phase), (Some(5), Phase::Resumed));
        assert_eq!(
            t.commands.as_slice(),
            [
                Command::Resume(PrinterRole::O),
                Command::Resume(PrinterRole::X),
                Command::StopTimer(TimerRole::Repeating),
                Command::StartTimer(TimerRole::OneShot),
            ]
        );
        assert_eq!(kernel.task_state(O), TaskState::Active);
        assert_eq!(kernel.task_state(X), TaskState::Active);
        assert_eq!(kernel.raw_timer_is_active(REPEATING), Ok(false));
        assert_eq!(kernel.raw_timer_is_active(ONE_SHOT), Ok(true));

        let t = sup.on_timer_fired(ONE_SHOT).unwrap();
        assert_eq!((t.role, t.count, t.phase), (TimerRole::OneShot, Some(1), Phase::Terminated));
        assert_eq!(kernel.task_state(O), TaskState::Deleted);
        assert_eq!(kernel.task_state(X), TaskState::Deleted);

        assert_eq!(
            kernel.calls(),
            [
                Call::Suspend(O),
                Call::Suspend(X),
                Call::Resume(O),
                Call::Resume(X),
                Call::Stop(REPEATING),
                Call::Start(ONE_SHOT),
                Call::Delete(O),
                Call::Delete(X),
            ]
        );
        assert_eq!(sup.history().len(), 6);
    }

    #[test]
    fn late_firings_are_counted_and_ignored() {
        let (kernel, mut sup) = setup();
        for _ in 0..5 {
            sup.on_timer_fired(REPEATING).unwrap();
        }
        let before = kernel.calls();

        // The repeating timer raced with its own stop
        let t = sup.on_timer_fired(REPEATING).unwrap();
        assert_eq!((t.count, t.phase), (Some(6), Phase::Resumed));
        assert!(t.commands.is_empty());

        sup.on_timer_fired(ONE_SHOT).unwrap();
        let t = sup.on_timer_fired(ONE_SHOT).unwrap();
        assert_eq!((t.count, t.phase), (Some(2), Phase::Terminated));
        assert!(t.commands.is_empty());

        assert_eq!(kernel.calls().len(), before.len() + 2);
        assert_eq!(sup.timer_state(TimerRole::Repeating), Some(TimerState { count: 6 }));
        assert_eq!(sup.timer_state(TimerRole::OneShot), Some(TimerState { count: 2 }));
    }

    #[test]
    fn unknown_timer_is_ignored() {
        let (kernel, mut sup) = setup();
        let t = sup.on_timer_fired(42).unwrap();
        assert_eq!(t.role, TimerRole::Unknown);
        assert_eq!(t.count, None);
        assert_eq!(t.phase, Phase::Running);
        assert!(t.commands.is_empty());
        assert!(kernel.calls().is_empty());
        assert_eq!(sup.timer_state(TimerRole::Unknown), None);
    }

    #[test]
    fn rejected_command_is_reported() {
        let (kernel, mut sup) = setup();
        sup.on_timer_fired(REPEATING).unwrap();
        // Someone else suspended Printer-O first
        kernel.raw_task_suspend(O).unwrap();

        assert_matches!(
            sup.on_timer_fired(REPEATING),
            Err(SupervisorError {
                command: Command::Suspend(PrinterRole::O),
                code: ResultCode::BadObjectState,
            })
        );
        assert_eq!(sup.phase(), Phase::PartiallySuspended);
    }

    #[test]
    fn error_display() {
        let e = SupervisorError {
            command: Command::Delete(PrinterRole::X),
            code: ResultCode::NoAccess,
        };
        assert_eq!(e.to_string(), "Delete(X) failed with NoAccess");
    }

    /// Any interleaving of firings issues each command at most once, and no
    /// printer is deleted before the hand-off.
    #[quickcheck]
    fn commands_issued_at_most_once(firings: Vec<u8>) -> bool {
        let (_, mut sup) = setup();
        let mut issued = Vec::new();
        for f in firings {
            let role = match f % 3 {
                0 => TimerRole::Repeating,
                1 => TimerRole::OneShot,
                _ => TimerRole::Unknown,
            };
            let t = sup.step(role, Ticks(0));
            let repeating_count = sup.timer_state(TimerRole::Repeating).map_or(0, |s| s.count);
            for &c in &t.commands {
                if issued.contains(&c) {
                    return false;
                }
                if matches!(c, Command::Delete(_)) && repeating_count < 5 {
                    return false;
                }
                issued.push(c);
            }
        }
        true
    }

    #[test]
    fn early_one_shot_is_ignored() {
        let (kernel, mut sup) = setup();
        let t = sup.on_timer_fired(ONE_SHOT).unwrap();
        assert_eq!((t.count, t.phase), (Some(1), Phase::Running));
        assert!(t.commands.is_empty());
        assert!(kernel.calls().is_empty());
    }

    #[test]
    fn history_keeps_recent_transitions() {
        let (_, mut sup) = setup();
        for tick in 0..HISTORY_LEN as u32 + 10 {
            sup.step(TimerRole::Unknown, Ticks(tick));
        }
        let history = sup.history();
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history.first().map(|t| t.tick), Some(Ticks(10)));
        assert_eq!(
            history.last().map(|t| t.tick),
            Some(Ticks(HISTORY_LEN as u32 + 9))
        );
    }
}
