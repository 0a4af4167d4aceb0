//! Software timers and the timer service thread
use cohort_core::kernel::{
    CreateTimerError, KernelTimer, QueryTimerError, StartTimerError, StopTimerError, TimerAttr,
    TimerCallback,
};
use spin::Mutex as SpinMutex;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{mpsc, Arc},
    time::Instant,
};

use crate::{lookup, StdKernel, ThreadRole, TimerId, THREAD_ROLE};

pub(crate) enum TimerCmd {
    /// The set of armed timers changed. Recalculate the next deadline.
    Wake,
}

/// Timer control block
pub(crate) struct TimerCb {
    attr: TimerAttr,
    sched: SpinMutex<TimerSched>,
    /// Taken out while the callback is running so that it can be called
    /// without holding a lock.
    callback: SpinMutex<Option<TimerCallback<TimerId>>>,
}

#[derive(Debug, Clone, Copy)]
struct TimerSched {
    active: bool,
    /// The next expiration. `None` while dormant, or if the expiration is
    /// too far in the future to represent.
    expiration: Option<Instant>,
}

impl TimerCb {
    fn period(&self, kernel: &StdKernel) -> Option<std::time::Duration> {
        self.attr.period.checked_to_wall(kernel.state.config.tick)
    }
}

impl StdKernel {
    fn notify_timer_service(&self) {
        if let Some(timer_cmd_send) = &*self.state.timer_cmd_send.lock() {
            // The service only disconnects during shutdown
            let _ = timer_cmd_send.send(TimerCmd::Wake);
        }
    }

    /// The body of the timer service thread. Fires due timers one at a time,
    /// the earliest expiration first, until the kernel shuts down.
    pub(crate) fn timer_service(&self, timer_cmd_recv: mpsc::Receiver<TimerCmd>) {
        let key = self.key();
        THREAD_ROLE.with(|role| role.set(ThreadRole::TimerService { kernel: key }));
        log::trace!("timer service is running");

        while !self.is_shutting_down() {
            let next = self
                .state
                .timers
                .lock()
                .iter()
                .filter_map(|(i, timer)| timer.sched.lock().expiration.map(|at| (at, i)))
                .min();

            let now = Instant::now();
            let recv_result = match next {
                Some((at, i)) if at <= now => {
                    self.fire_timer(TimerId(i));
                    continue;
                }
                Some((at, _)) => timer_cmd_recv.recv_timeout(at - now),
                None => timer_cmd_recv
                    .recv()
                    .map_err(|_| mpsc::RecvTimeoutError::Disconnected),
            };

            match recv_result {
                Ok(TimerCmd::Wake) | Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        log::trace!("timer service is exiting");
    }

    fn fire_timer(&self, id: TimerId) {
        let Ok(timer) = lookup(&self.state.timers, id.0) else {
            return;
        };

        {
            let mut sched = timer.sched.lock();
            let Some(at) = sched.expiration else {
                return;
            };
            if timer.attr.auto_reload {
                // Measure from the previous expiration so that the period
                // doesn't drift
                sched.expiration = timer.period(self).and_then(|p| at.checked_add(p));
            } else {
                *sched = TimerSched {
                    active: false,
                    expiration: None,
                };
            }
        }

        log::trace!("{id:?} ({}) fired", timer.attr.name);

        let Some(mut callback) = timer.callback.lock().take() else {
            return;
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback(id)));
        *timer.callback.lock() = Some(callback);

        if let Err(payload) = result {
            log::error!("the callback of {id:?} ({}) panicked", timer.attr.name);
            self.state.record_panic(payload);
        }
    }
}

impl KernelTimer for StdKernel {
    type RawTimerId = TimerId;

    fn raw_timer_create(
        &self,
        attr: TimerAttr,
        callback: TimerCallback<TimerId>,
    ) -> Result<TimerId, CreateTimerError> {
        if attr.period.is_zero() {
            return Err(CreateTimerError::BadParam);
        }
        let mut timers = self.state.timers.lock();
        self.check_alloc(timers.len(), self.state.config.max_timers)?;
        let id = TimerId(timers.insert(Arc::new(TimerCb {
            attr,
            sched: SpinMutex::new(TimerSched {
                active: false,
                expiration: None,
            }),
            callback: SpinMutex::new(Some(callback)),
        })));
        log::trace!("raw_timer_create({attr:?}) = {id:?}");
        Ok(id)
    }

    fn raw_timer_start(&self, this: TimerId) -> Result<(), StartTimerError> {
        let timer = lookup(&self.state.timers, this.0)?;
        log::trace!("raw_timer_start({this:?})");
        let expiration = timer.period(self).and_then(|p| Instant::now().checked_add(p));
        *timer.sched.lock() = TimerSched {
            active: true,
            expiration,
        };
        self.notify_timer_service();
        Ok(())
    }

    fn raw_timer_stop(&self, this: TimerId) -> Result<(), StopTimerError> {
        let timer = lookup(&self.state.timers, this.0)?;
        log::trace!("raw_timer_stop({this:?})");
        *timer.sched.lock() = TimerSched {
            active: false,
            expiration: None,
        };
        self.notify_timer_service();
        Ok(())
    }

    fn raw_timer_is_active(&self, this: TimerId) -> Result<bool, QueryTimerError> {
        Ok(lookup(&self.state.timers, this.0)?.sched.lock().active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PortConfig;
    use assert_matches::assert_matches;
    use cohort_core::{kernel::KernelBase, time::Duration};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn kernel() -> StdKernel {
        crate::init_test_logger();
        StdKernel::new(PortConfig::DEFAULT)
    }

    fn attr(period: u32, auto_reload: bool) -> TimerAttr {
        TimerAttr {
            name: "test timer",
            period: Duration::from_ticks(period),
            auto_reload,
        }
    }

    #[test]
    fn zero_period() {
        let kernel = kernel();
        assert_matches!(
            kernel.raw_timer_create(attr(0, false), Box::new(|_| {})),
            Err(CreateTimerError::BadParam)
        );
    }

    #[test]
    fn start_stop_flags() {
        let kernel = kernel();
        let t = kernel
            .raw_timer_create(attr(100, true), Box::new(|_| {}))
            .unwrap();
        assert_eq!(kernel.raw_timer_is_active(t), Ok(false));
        kernel.raw_timer_start(t).unwrap();
        assert_eq!(kernel.raw_timer_is_active(t), Ok(true));
        kernel.raw_timer_stop(t).unwrap();
        kernel.raw_timer_stop(t).unwrap();
        assert_eq!(kernel.raw_timer_is_active(t), Ok(false));
    }

    #[test]
    fn one_shot_fires_once() {
        let kernel = kernel();
        let count = Arc::new(AtomicUsize::new(0));

        let one_shot = {
            let count = Arc::clone(&count);
            kernel
                .raw_timer_create(
                    attr(10, false),
                    Box::new(move |_| {
                        count.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap()
        };
        kernel.raw_timer_start(one_shot).unwrap();

        // Shuts the kernel down well after the one-shot timer expires
        let kernel2 = kernel.clone();
        let closer = kernel
            .raw_timer_create(attr(100, false), Box::new(move |_| kernel2.shutdown()))
            .unwrap();
        kernel.raw_timer_start(closer).unwrap();

        kernel.start_scheduler();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(kernel.raw_timer_is_active(one_shot), Ok(false));
    }

    #[test]
    fn periodic_until_stopped() {
        let kernel = kernel();
        let count = Arc::new(AtomicUsize::new(0));

        let kernel2 = kernel.clone();
        let count2 = Arc::clone(&count);
        let t = kernel
            .raw_timer_create(
                attr(5, true),
                Box::new(move |id| {
                    if count2.fetch_add(1, Ordering::SeqCst) + 1 == 4 {
                        kernel2.raw_timer_stop(id).unwrap();
                        kernel2.shutdown();
                    }
                }),
            )
            .unwrap();
        kernel.raw_timer_start(t).unwrap();
        kernel.start_scheduler();

        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(kernel.raw_timer_is_active(t), Ok(false));
    }

    #[test]
    fn callbacks_cannot_block() {
        let kernel = kernel();
        let result = Arc::new(SpinMutex::new(None));

        let kernel2 = kernel.clone();
        let result2 = Arc::clone(&result);
        let t = kernel
            .raw_timer_create(
                attr(1, false),
                Box::new(move |_| {
                    *result2.lock() = Some(kernel2.raw_sleep(Duration::from_ticks(1)));
                    kernel2.shutdown();
                }),
            )
            .unwrap();
        kernel.raw_timer_start(t).unwrap();
        kernel.start_scheduler();

        assert_matches!(
            *result.lock(),
            Some(Err(cohort_core::kernel::SleepError::BadContext))
        );
    }
}
