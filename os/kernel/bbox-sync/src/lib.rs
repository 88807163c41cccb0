//! # Crash-recorder synchronization primitives
//!
//! Everything in the blackbox may run with interrupts masked or from inside an
//! exception handler, so nothing here ever sleeps. Two primitives exist:
//!
//! * [`SpinLock`] guards the BCH scratch state and each pool directory. It can
//!   be acquired unconditionally ([`SpinLock::lock`]) from init context, or
//!   taken with a bounded spin ([`SpinLock::try_lock_spin`]) from exception
//!   context where waiting forever on a lock held by the crashed CPU is not an
//!   option.
//! * [`InitCell`] holds process-wide singletons (the codec, the recorder
//!   context). Unlike a plain once-cell it remembers a *failed* initialization,
//!   so "codec unavailable" is a standing, queryable condition.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod init_cell;
mod spin_lock;

pub use init_cell::{InitCell, InitState};
pub use spin_lock::{SpinLock, SpinLockGuard};
