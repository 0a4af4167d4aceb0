//! The kernel-facing half of Cohort.
//!
//! This crate describes what the application expects from a real-time
//! kernel: tick-based time ([`time`]), result codes and per-operation error
//! types ([`kernel::error`]), and the kernel service traits
//! ([`kernel::raw`]). It contains no kernel implementation; see
//! `cohort_port_std` for one that runs on a hosted environment.
//!
//! Kernel objects are addressed by plain identifiers (`RawTaskId` and
//! friends) and every service is a method on an explicit kernel object, so
//! an application can hold its kernel in an `Arc` and pass it wherever it's
//! needed instead of reaching for ambient globals.
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod kernel;
pub mod time;

