//! Compile-time kernel capacity constants.
//!
//! These play the role `kernel_config.h` plays in a C RTOS: they size every
//! fixed-capacity table the kernel owns. There is no application-side build
//! step to override them (process creation is a runtime call, not a static
//! table), so unlike `r3_kernel`'s per-object-table const generics these are
//! plain constants.

/// Maximum number of processes the kernel can hold at once.
pub const MAX_PROCESSES: usize = 32;

/// Number of distinct priority levels, `0` (highest) ..= `PRIORITY_LEVELS - 1`
/// (lowest). Priority is a small unsigned with a fixed max (spec Non-goals).
pub const PRIORITY_LEVELS: u8 = 32;

/// Size of the "memory blocks" table donated into a process (§4.8).
pub const MAX_BLOCKS_PER_PROCESS: usize = 8;

/// Capacity of a process's IPC mailbox ring (§4.8).
pub const IPC_RING_CAPACITY: usize = 8;

/// Maximum number of mutexes a single process may hold concurrently. Bounds
/// the depth of nested priority inheritance walks (spec §9 Design Notes).
pub const MAX_OWNED_MUTEXES: usize = 8;

/// Maximum number of live mutexes, event groups, or semaphores (each kind
/// gets its own table of this size).
pub const MAX_SYNC_OBJECTS: usize = 32;
