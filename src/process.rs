//! Process control block (spec §3, §4.3, §4.4).

use arrayvec::{ArrayString, ArrayVec};

use crate::config::{IPC_RING_CAPACITY, MAX_BLOCKS_PER_PROCESS, MAX_OWNED_MUTEXES};
use crate::error::{KernelError, KernelResult};
use crate::magic::MemRegion;
use crate::sync::wait::WaitList;

/// Priority is a small unsigned; `0` is highest. Fixed max (spec Non-goals:
/// no dynamic priority ranges).
pub type Priority = u8;

bitflags::bitflags! {
    /// Flags recognized on the process descriptor (REX, spec §6).
    pub struct ProcessFlags: u32 {
        /// Schedule immediately on creation rather than starting frozen.
        const ACTIVE = 1 << 0;
        /// Create suspended; scheduled only after an explicit unfreeze.
        const FROZEN = 1 << 1;
        /// The name pointer lives in flash rather than the process's arena.
        const PERSISTENT_NAME = 1 << 2;
    }
}

/// An immutable process descriptor supplied to the creation call (spec §6:
/// "Process descriptor (REX)").
pub struct Rex<'a> {
    pub name: &'a str,
    pub stack_size: usize,
    pub priority: Priority,
    pub flags: ProcessFlags,
    /// Opaque; the kernel never calls through this (entry execution is out
    /// of scope, spec §1) but stores it for the platform's context-switch
    /// code to pick up on first dispatch.
    pub entry_point: usize,
    pub arena: MemRegion,
}

/// What a process is waiting on, if anything (spec §3 "current sync state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// Not waiting on anything.
    None,
    /// Plain timed sleep, no sync object (`kprocess_sleep` with
    /// `sync_object == None`).
    Sleep,
    Mutex,
    Event,
    Semaphore,
    /// Blocked in `ipc_read` awaiting a message of its own.
    IpcRead,
    /// Blocked in `ipc_post_wait` awaiting room in a target's mailbox.
    IpcPostWait,
}

/// Where a process currently sits relative to the scheduler (spec §3's
/// single-queue invariant: at most one of ready / waiting / sleeping /
/// frozen / running, enforced by construction since this is a single field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedState {
    Running,
    Ready,
    /// Waiting on a sync object, IPC, or a plain timed sleep. `kind` records
    /// which; the sync object handle itself lives in `Process::sync_object`.
    Waiting,
    Frozen,
    /// Torn down; the table slot is free and this value is never observed
    /// outside of `Process::destroy` itself.
    Dormant,
}

/// A single queued IPC record (spec §3 "IPC mailbox").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcRecord {
    pub cmd: u32,
    pub params: [u32; 3],
    pub sender: usize,
}

/// An opaque `(pointer, size)` capability donated into a process's block
/// table (spec §4.8).
#[derive(Debug, Clone, Copy)]
pub struct MemBlock {
    pub ptr: usize,
    pub size: usize,
    /// The process that opened this block, needed so `block_close` can be
    /// restricted to its owner... except the spec does not actually require
    /// owner-restricted close (any close call names its target + index), so
    /// this is kept purely for diagnostics.
    pub owner: usize,
}

/// Process control block.
pub struct Process {
    pub name: ArrayString<16>,
    pub arena: MemRegion,
    pub sp: usize,
    pub flags: ProcessFlags,
    pub base_priority: Priority,
    pub effective_priority: Priority,
    pub sched_state: SchedState,
    pub sync_kind: SyncKind,
    /// Handle of the sync object being waited on, if `sync_kind` names one.
    pub sync_object: Option<usize>,
    /// Deadline (absolute µs since boot) of this process's timer node, if
    /// it is currently registered in the timer wheel.
    pub timer_deadline: Option<u64>,
    /// Intrusive link for the timer wheel's singly-linked list (spec §4.2).
    pub timer_next: Option<usize>,
    /// Whether the pending wait/sleep timed out (consumed by the waking
    /// operation to decide its own return value).
    pub timed_out: bool,
    /// Intrusive link for the ready queue (spec §4.3).
    pub ready_next: Option<usize>,
    /// Intrusive link for whichever sync object's waiter list this process
    /// currently sits in (spec §3: waiter lists ordered by effective
    /// priority, ties FIFO).
    pub waiter_next: Option<usize>,
    /// Mutexes currently owned by this process, most-recently-locked last;
    /// walked for nested priority inheritance (spec §4.5, §9).
    pub owned_mutexes: ArrayVec<usize, MAX_OWNED_MUTEXES>,
    pub mailbox: ArrayVec<IpcRecord, IPC_RING_CAPACITY>,
    /// Other processes currently blocked in `ipc_post_wait`, waiting for room
    /// in *this* process's mailbox (spec §4.8). This process is the sync
    /// object in that relationship, the same way a mutex or event is for its
    /// own waiters.
    pub post_waiters: WaitList,
    /// Set while this process is blocked in `ipc_read` and a poster has
    /// delivered straight into it (spec §4.8: "deliver the record directly
    /// into the target's current receive slot and wake it"), bypassing the
    /// ring entirely.
    pub pending_ipc: Option<IpcRecord>,
    /// Set while this process is itself blocked in `ipc_post_wait`: the
    /// record it's trying to deliver, claimed back out once a mailbox slot
    /// opens up for it (see `admit_one_post_waiter`).
    pub pending_post: Option<IpcRecord>,
    pub blocks: [Option<MemBlock>; MAX_BLOCKS_PER_PROCESS],
    /// Accumulated time spent as `current`, not counting the current run if
    /// one is in progress (spec §3 "an optional uptime counter"). The live
    /// figure is `uptime_us` plus elapsed time since `running_since`, the way
    /// `Kernel::uptime_us` reports it.
    pub uptime_us: u64,
    /// Timestamp this process most recently became `current`, if it is
    /// running right now (spec §10.4/§11: updated on each context switch).
    pub running_since: Option<u64>,
    pub last_error: Option<KernelError>,
    /// Result the waking operation leaves for a blocked call to pick back up
    /// once this process is dispatched again (spec §4.3/§4.10: a kernel entry
    /// "returns via the scheduler" — the blocking call's own return value is
    /// only known once something wakes it).
    pub wake_result: Option<KernelResult<()>>,
}

impl Process {
    pub fn new(rex: &Rex<'_>) -> Self {
        let sched_state = if rex.flags.contains(ProcessFlags::FROZEN) {
            SchedState::Frozen
        } else {
            SchedState::Ready
        };
        Self {
            name: ArrayString::from(rex.name).unwrap_or_default(),
            arena: rex.arena,
            sp: 0,
            flags: rex.flags,
            base_priority: rex.priority,
            effective_priority: rex.priority,
            sched_state,
            sync_kind: SyncKind::None,
            sync_object: None,
            timer_deadline: None,
            timer_next: None,
            timed_out: false,
            ready_next: None,
            waiter_next: None,
            owned_mutexes: ArrayVec::new(),
            mailbox: ArrayVec::new(),
            post_waiters: WaitList::new(),
            pending_ipc: None,
            pending_post: None,
            blocks: [None; MAX_BLOCKS_PER_PROCESS],
            uptime_us: 0,
            running_since: None,
            last_error: None,
            wake_result: None,
        }
    }

    /// Record a `(ptr, size)` block donated by `owner` into the smallest
    /// free slot of `self`'s block table. Returns the slot index (spec
    /// §4.8). `ptr`/`size` must already have been validated against the
    /// donating process's own arena by the caller — `self` here is the
    /// *recipient*, which has no claim over whether the range is valid.
    pub fn open_block(&mut self, owner: usize, ptr: usize, size: usize) -> Result<usize, KernelError> {
        let index = self
            .blocks
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::OutOfMemory)?;
        self.blocks[index] = Some(MemBlock { ptr, size, owner });
        Ok(index)
    }

    pub fn close_block(&mut self, index: usize) -> Result<(), KernelError> {
        if index >= self.blocks.len() || self.blocks[index].is_none() {
            return Err(KernelError::AccessDenied);
        }
        self.blocks[index] = None;
        Ok(())
    }

    /// Resolve a block index to its `(ptr, size)` pair. Fails with
    /// `AccessDenied` for a closed or out-of-range index, *before* any
    /// memory is read (spec §4.8, §8 property 6).
    pub fn resolve_block(&self, index: usize) -> Result<(usize, usize), KernelError> {
        self.blocks
            .get(index)
            .and_then(|b| *b)
            .map(|b| (b.ptr, b.size))
            .ok_or(KernelError::AccessDenied)
    }
}
