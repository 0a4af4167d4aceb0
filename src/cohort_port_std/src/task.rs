//! Tasks
use cohort_core::{
    kernel::{
        CreateTaskError, DeleteTaskError, GetCurrentTaskError, GetTaskStateError, KernelBase,
        ResumeTaskError, SleepError, SuspendTaskError, TaskAttr, TaskEntry, TaskState,
    },
    time::{Duration, Ticks},
};
use spin::Mutex as SpinMutex;
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, OnceLock},
    thread,
    time::Instant,
};

use crate::{lookup, StdKernel, TaskDeleted, TaskId, ThreadRole, THREAD_ROLE};

/// Task control block
pub(crate) struct TaskCb {
    attr: TaskAttr,
    /// The task's state in the task state machine.
    tsm: SpinMutex<Tsm>,
    /// The task body. Taken when the backing thread is spawned.
    entry: SpinMutex<Option<TaskEntry>>,
    /// The backing thread. Set when it's spawned.
    thread: OnceLock<thread::Thread>,
}

/// Task state machine
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Tsm {
    Active,
    Suspended,
    Deleted,
}

impl TaskCb {
    fn state(&self) -> TaskState {
        match *self.tsm.lock() {
            Tsm::Active => TaskState::Active,
            Tsm::Suspended => TaskState::Suspended,
            Tsm::Deleted => TaskState::Deleted,
        }
    }

    fn unpark(&self) {
        if let Some(thread) = self.thread.get() {
            thread.unpark();
        }
    }

    /// Mark the task as deleted and wake it up so that it can notice that.
    pub(crate) fn mark_deleted(&self) {
        *self.tsm.lock() = Tsm::Deleted;
        self.unpark();
    }
}

impl StdKernel {
    fn task_cb(&self, id: TaskId) -> Result<Arc<TaskCb>, cohort_core::kernel::NoAccessError> {
        lookup(&self.state.tasks, id.0)
    }

    /// Apply a pending suspension or deletion to the current task. Does
    /// nothing if the current thread isn't a task thread of this kernel.
    ///
    /// This doesn't return if the current task is deleted.
    pub(crate) fn checkpoint(&self) {
        let Some(task) = self.current_task().and_then(|id| self.task_cb(id).ok()) else {
            return;
        };
        loop {
            match *task.tsm.lock() {
                Tsm::Active => return,
                Tsm::Suspended => {}
                Tsm::Deleted => exit_deleted_task(),
            }
            log::trace!("{} is parked by suspension", task.attr.name);
            thread::park();
        }
    }

    /// Spawn the backing thread of a task. Does nothing if it's already
    /// spawned.
    pub(crate) fn spawn_task(&self, id: TaskId, task: Arc<TaskCb>) -> io::Result<()> {
        let Some(entry) = task.entry.lock().take() else {
            return Ok(());
        };

        let kernel = self.clone();
        let key = self.key();
        let task2 = Arc::clone(&task);
        let join_handle = thread::Builder::new()
            .name(task.attr.name.to_owned())
            .spawn(move || {
                THREAD_ROLE.with(|role| role.set(ThreadRole::Task { kernel: key, task: id }));
                // Publish the handle before the first checkpoint reads `tsm`
                task2.thread.set(thread::current()).ok();
                log::debug!("{id:?} ({}) is now running", task2.attr.name);

                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    kernel.checkpoint();
                    entry();
                }));

                match result {
                    Ok(()) => {
                        log::debug!("{id:?} ({}) exited", task2.attr.name);
                        *task2.tsm.lock() = Tsm::Deleted;
                    }
                    Err(payload) if payload.is::<TaskDeleted>() => {
                        log::debug!("{id:?} ({}) was deleted", task2.attr.name);
                    }
                    Err(payload) => {
                        log::error!("{id:?} ({}) panicked", task2.attr.name);
                        *task2.tsm.lock() = Tsm::Deleted;
                        kernel.state.record_panic(payload);
                    }
                }
            })?;

        self.state.join_handles.lock().push(join_handle);
        Ok(())
    }
}

/// Terminate the current task thread by unwinding out of the task body.
fn exit_deleted_task() -> ! {
    panic::resume_unwind(Box::new(TaskDeleted))
}

impl KernelBase for StdKernel {
    type RawTaskId = TaskId;

    fn raw_task_create(&self, attr: TaskAttr, entry: TaskEntry) -> Result<TaskId, CreateTaskError> {
        let task = Arc::new(TaskCb {
            attr,
            tsm: SpinMutex::new(Tsm::Active),
            entry: SpinMutex::new(Some(entry)),
            thread: OnceLock::new(),
        });

        let id = {
            let mut tasks = self.state.tasks.lock();
            let live = tasks.iter().filter(|(_, t)| t.state() != TaskState::Deleted).count();
            self.check_alloc(live, self.state.config.max_tasks)?;
            TaskId(tasks.insert(Arc::clone(&task)))
        };
        log::trace!("raw_task_create({attr:?}) = {id:?}");

        if self.is_started() {
            if let Err(e) = self.spawn_task(id, task) {
                log::warn!("failed to spawn the thread of {id:?}: {e}");
                if let Ok(task) = self.task_cb(id) {
                    *task.tsm.lock() = Tsm::Deleted;
                }
                return Err(CreateTaskError::NoMemory);
            }
        }
        Ok(id)
    }

    fn raw_task_suspend(&self, this: TaskId) -> Result<(), SuspendTaskError> {
        log::trace!("raw_task_suspend({this:?})");
        let task = self.task_cb(this)?;
        {
            let mut tsm = task.tsm.lock();
            match *tsm {
                Tsm::Active => *tsm = Tsm::Suspended,
                Tsm::Suspended => return Err(SuspendTaskError::BadObjectState),
                Tsm::Deleted => return Err(SuspendTaskError::NoAccess),
            }
        }
        if self.current_task() == Some(this) {
            self.checkpoint();
        }
        Ok(())
    }

    fn raw_task_resume(&self, this: TaskId) -> Result<(), ResumeTaskError> {
        log::trace!("raw_task_resume({this:?})");
        let task = self.task_cb(this)?;
        {
            let mut tsm = task.tsm.lock();
            match *tsm {
                Tsm::Suspended => *tsm = Tsm::Active,
                Tsm::Active => return Err(ResumeTaskError::BadObjectState),
                Tsm::Deleted => return Err(ResumeTaskError::NoAccess),
            }
        }
        task.unpark();
        Ok(())
    }

    fn raw_task_delete(&self, this: TaskId) -> Result<(), DeleteTaskError> {
        log::trace!("raw_task_delete({this:?})");
        let task = self.task_cb(this)?;
        if *task.tsm.lock() == Tsm::Deleted {
            return Err(DeleteTaskError::NoAccess);
        }

        task.mark_deleted();
        // A task that never ran won't run its body
        drop(task.entry.lock().take());

        if self.current_task() == Some(this) {
            exit_deleted_task();
        }
        Ok(())
    }

    fn raw_task_state(&self, this: TaskId) -> Result<TaskState, GetTaskStateError> {
        Ok(self.task_cb(this)?.state())
    }

    fn raw_task_current(&self) -> Result<TaskId, GetCurrentTaskError> {
        self.current_task().ok_or(GetCurrentTaskError::BadContext)
    }

    fn raw_sleep(&self, duration: Duration) -> Result<(), SleepError> {
        if self.is_timer_service_context() {
            return Err(SleepError::BadContext);
        }
        self.sleep_for(duration);
        Ok(())
    }

    fn raw_tick_count(&self) -> Ticks {
        self.tick_count_at(Instant::now())
    }
}
