//! A preemptive real-time kernel core for single-core microcontrollers:
//! priority-based scheduling, sync objects with priority inheritance, timed
//! waits, and a process-to-process IPC mailbox. Board/MCU HAL, the heap
//! allocator, and driver/midware stacks are external collaborators reached
//! only through [`platform::Platform`] (spec §1) — this crate owns none of
//! them.
//!
//! `no_std`, no heap: every table is a fixed-capacity array sized by
//! [`config`], and variable-length collections use [`arrayvec`] rather than
//! `alloc`.

#![no_std]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod ipc;
pub mod kernel;
pub mod magic;
pub mod platform;
pub mod process;
pub mod readyqueue;
pub mod sched;
pub mod sync;
pub mod time;
pub mod timer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{KernelError, KernelResult};
pub use kernel::Kernel;
pub use platform::{DebugSink, Hpet, IrqController, Platform};
pub use process::{IpcRecord, ProcessFlags, Rex};
pub use sync::{Event, EventMode, Mutex, Semaphore};
