//! A small concurrent application built on the [`cohort_core`] kernel
//! interface.
//!
//! Five tasks and two timers cooperate:
//!
//!  - Two **printers** ([`printer`]) periodically try to take a shared
//!    [`console::Console`] without blocking and emit a burst of glyphs when
//!    they succeed.
//!  - A **producer** and a **consumer** ([`channel`]) are connected by a
//!    bounded FIFO.
//!  - A **heartbeat** ([`heartbeat`]) toggles a status indicator.
//!  - The **lifecycle supervisor** ([`supervisor`]) is driven by a repeating
//!    timer and a one-shot timer. It suspends, resumes, and finally deletes
//!    the printers on a fixed script.
//!
//! [`app::App::bring_up`] creates everything in a fixed order and fails on
//! the first error.
pub mod app;
pub mod channel;
pub mod config;
pub mod console;
pub mod heartbeat;
pub mod printer;
pub mod supervisor;
pub mod trap;
mod worker;

pub use self::worker::WorkerError;
