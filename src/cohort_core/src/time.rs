//! Temporal quantification in kernel ticks.
//!
//! Every interval the application deals with (task delays, wait timeouts,
//! timer periods) is expressed in *ticks*, the kernel's base unit of elapsed
//! time. How long a tick lasts in wall-clock time is a property of the kernel
//! port, not of the application.
mod duration;
mod ticks;
pub use self::{duration::*, ticks::*};
