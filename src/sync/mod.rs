//! Sync objects (spec §4.5–§4.7): mutex with nested priority inheritance,
//! manual/auto-reset event, and counting semaphore. Each is a fixed-capacity
//! table entry plus a [`wait::WaitList`] of blocked processes; the actual
//! lock/unlock/wait/signal orchestration lives on [`crate::kernel::Kernel`]
//! (see `mutex.rs`/`event.rs`/`semaphore.rs`) since every operation needs
//! joint access to the process table, the ready queue, and the timer wheel.

pub mod event;
pub mod mutex;
pub mod semaphore;
pub mod wait;

pub use event::{Event, EventMode};
pub use mutex::Mutex;
pub use semaphore::Semaphore;
