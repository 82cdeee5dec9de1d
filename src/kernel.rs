//! The kernel root (spec §9 Design Notes: "a single owned root value"):
//! process table, the three sync-object tables, the ready queue, the timer
//! wheel, the clock, and the platform handle, wired together.
//!
//! Every mutating kernel operation is a method on `Kernel<P>`. There is no
//! separate lock guarding these fields against each other the way
//! `r3_kernel::klock` guards `GlobalLock` against interrupts on real
//! hardware — that boundary is the platform's interrupt-disable, entered
//! once at the top of [`crate::dispatch::Kernel::dispatch`] and exited on
//! return, matching spec §5 ("all critical sections are run with interrupts
//! disabled"). Methods below assume they already run inside that section.

use crate::config::{MAX_PROCESSES, MAX_SYNC_OBJECTS};
use crate::error::{KernelError, KernelResult};
use crate::handle::Table;
use crate::magic::{Magic, MemRegion};
use crate::platform::Platform;
use crate::process::{Process, ProcessFlags, Rex, SchedState};
use crate::readyqueue::ReadyQueue;
use crate::sync::{Event, Mutex, Semaphore};
use crate::time::Clock;
use crate::timer::TimerWheel;

pub struct Kernel<P: Platform> {
    pub(crate) platform: P,
    pub(crate) clock: Clock,
    pub(crate) processes: Table<Process, MAX_PROCESSES>,
    pub(crate) mutexes: Table<Mutex, MAX_SYNC_OBJECTS>,
    pub(crate) events: Table<Event, MAX_SYNC_OBJECTS>,
    pub(crate) semaphores: Table<Semaphore, MAX_SYNC_OBJECTS>,
    pub(crate) ready: ReadyQueue,
    pub(crate) timers: TimerWheel,
    pub(crate) current: Option<usize>,
    pending_switch: bool,
    /// Read-only flash range a process's buffer pointers may additionally
    /// fall in (spec §4.9, §6 `persistent_name`). `None` on a platform with
    /// no separate flash address window.
    pub(crate) flash_region: Option<MemRegion>,
}

impl<P: Platform> Kernel<P> {
    pub fn new(platform: P, flash_region: Option<MemRegion>) -> Self {
        Self {
            platform,
            clock: Clock::new(),
            processes: Table::new(),
            mutexes: Table::new(),
            events: Table::new(),
            semaphores: Table::new(),
            ready: ReadyQueue::new(),
            timers: TimerWheel::new(),
            current: None,
            pending_switch: false,
            flash_region,
        }
    }

    /// Current monotonic time in microseconds since boot (spec §4.1).
    pub fn now(&self) -> u64 {
        self.clock.now(&self.platform)
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The running process, if any (the kernel is idle before the first
    /// process is created, or if every process is blocked/frozen).
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// The effective priority of whichever process is currently running, if
    /// any (spec §8 property 2: this is always the numerically smallest
    /// effective priority among every ready process).
    pub fn current_priority(&self) -> Option<u8> {
        self.current.map(|pid| self.processes.get(pid).unwrap().effective_priority)
    }

    /// Consume the pending-switch flag (spec §4.3): `true` means the
    /// scheduler's pick of `current` changed since the last call and a real
    /// platform would need to service its lowest-priority exception to swap
    /// stacks. Host-testable code can poll this without a real ISR because
    /// this core never executes process entry points itself (§1).
    pub fn take_pending_switch(&mut self) -> bool {
        core::mem::replace(&mut self.pending_switch, false)
    }

    pub(crate) fn resolve_process(&self, handle: usize) -> KernelResult<usize> {
        self.processes.resolve(handle, Magic::PROCESS)
    }

    /// The process that should be running right now: the higher-priority
    /// (numerically smaller) of `current` and the ready queue's head.
    /// `None` only when both are empty.
    fn best_candidate(&self) -> Option<usize> {
        match (self.current, self.ready.peek()) {
            (None, rh) => rh,
            (Some(cur), None) => Some(cur),
            (Some(cur), Some(rh)) => {
                let cur_prio = self.processes.get(cur).expect("current in table").effective_priority;
                let rh_prio = self.processes.get(rh).expect("ready head in table").effective_priority;
                if rh_prio < cur_prio {
                    Some(rh)
                } else {
                    Some(cur)
                }
            }
        }
    }

    /// Re-pick the running process (spec §4.3, §5: "after any wake, the
    /// scheduler re-picks before returning to user code"). Called at the
    /// end of every operation that could have changed a priority or made a
    /// process ready/blocked.
    ///
    /// The actual register/stack swap is the platform's job (out of scope,
    /// §1); here "committing" a switch means updating `current` and the
    /// ready-queue membership of the two processes involved, which is the
    /// entirety of this core's observable state for a process that isn't
    /// executing its own code.
    pub(crate) fn reschedule(&mut self) {
        let best = self.best_candidate();
        if best == self.current {
            return;
        }
        self.pending_switch = true;
        let now = self.now();

        if let Some(old) = self.current {
            if let Some(p) = self.processes.get_mut(old) {
                if let Some(since) = p.running_since.take() {
                    p.uptime_us += now.saturating_sub(since);
                }
                if p.sched_state == SchedState::Running {
                    p.sched_state = SchedState::Ready;
                    self.ready.insert(&mut self.processes, old);
                }
            }
        }
        if let Some(new_cur) = best {
            self.ready.remove(&mut self.processes, new_cur);
            let p = self.processes.get_mut(new_cur).expect("candidate in table");
            p.sched_state = SchedState::Running;
            p.running_since = Some(now);
        }
        self.current = best;
    }

    // ---- process lifecycle (spec §3, §4.10 opcodes create/destroy/freeze/
    // unfreeze/get/set priority) ----

    /// Create a process from its descriptor (spec §3 "created by a factory
    /// call"). Returns the new process's handle.
    pub fn create_process(&mut self, rex: &Rex<'_>) -> KernelResult<usize> {
        let index = self.processes.alloc().ok_or_else(|| {
            log::warn!("create_process({}): out of process slots", rex.name);
            KernelError::OutOfMemory
        })?;
        self.processes.occupy(index, Magic::PROCESS, Process::new(rex));
        if rex.flags.contains(ProcessFlags::ACTIVE) && !rex.flags.contains(ProcessFlags::FROZEN) {
            self.ready.insert(&mut self.processes, index);
            self.reschedule();
        }
        log::trace!("create_process({}) -> index {index}", rex.name);
        Ok(self.processes.handle_of(index))
    }

    /// Tear down a process. Per spec §4.5, destroying a process that still
    /// owns a mutex with waiters is a fatal invariant violation; callers are
    /// expected to release owned mutexes before destroying themselves (the
    /// same contract the original places on `kprocess_destroy`).
    pub fn destroy_process(&mut self, handle: usize) -> KernelResult<()> {
        let index = self.resolve_process(handle)?;
        {
            let p = self.processes.get(index).expect("resolved index in table");
            for &mtx in &p.owned_mutexes {
                if let Some(m) = self.mutexes.get(mtx) {
                    if !m.waiters.is_empty() {
                        log::warn!("destroy_process(index {index}): still owns a contended mutex");
                        return Err(KernelError::Deadlock);
                    }
                }
            }
        }
        log::trace!("destroy_process(index {index})");
        match self.processes.get(index).unwrap().sched_state {
            SchedState::Ready => {
                self.ready.remove(&mut self.processes, index);
            }
            SchedState::Waiting => {
                self.remove_from_wait_structure(index);
                self.timers.cancel(&mut self.processes, index);
            }
            _ => {}
        }
        if self.current == Some(index) {
            self.current = None;
        }
        self.processes.free(index);
        self.reschedule();
        Ok(())
    }

    /// Suspend a process (spec §6 `frozen` flag, §5 "frozen processes skip
    /// scheduling but retain their waits"). A frozen process keeps its
    /// `sync_object`/timer exactly as they were; only its presence in the
    /// ready queue is affected.
    pub fn freeze_process(&mut self, handle: usize) -> KernelResult<()> {
        let index = self.resolve_process(handle)?;
        let was_ready = {
            let p = self.processes.get_mut(index).unwrap();
            let was_ready = p.sched_state == SchedState::Ready || p.sched_state == SchedState::Running;
            p.sched_state = SchedState::Frozen;
            was_ready
        };
        if was_ready {
            self.ready.remove(&mut self.processes, index);
            if self.current == Some(index) {
                self.current = None;
            }
        }
        self.reschedule();
        Ok(())
    }

    /// Resume a frozen process. If it was waiting when frozen, it resumes
    /// waiting with its original deadline untouched (spec §5) — freezing
    /// never touched `timer_deadline`/`sync_object`, so there is nothing to
    /// restore beyond flipping `sched_state` back.
    pub fn unfreeze_process(&mut self, handle: usize) -> KernelResult<()> {
        let index = self.resolve_process(handle)?;
        let p = self.processes.get_mut(index).unwrap();
        if p.sched_state != SchedState::Frozen {
            return Err(KernelError::NotConfigured);
        }
        if p.sync_kind == crate::process::SyncKind::None {
            p.sched_state = SchedState::Ready;
            self.ready.insert(&mut self.processes, index);
        } else {
            p.sched_state = SchedState::Waiting;
        }
        self.reschedule();
        Ok(())
    }

    pub fn get_priority(&self, handle: usize) -> KernelResult<u8> {
        let index = self.resolve_process(handle)?;
        Ok(self.processes.get(index).unwrap().base_priority)
    }

    /// The priority a process is actually scheduled at right now, which may
    /// sit below its base priority while it owns a contended mutex (spec
    /// §3, §4.5). A monitoring/diagnostic query distinct from `get_priority`,
    /// the same way the original exposes both a process's configured and
    /// inherited priority separately.
    pub fn effective_priority(&self, handle: usize) -> KernelResult<u8> {
        let index = self.resolve_process(handle)?;
        Ok(self.processes.get(index).unwrap().effective_priority)
    }

    /// Total time `handle` has spent as `current` (spec §3's "optional
    /// uptime counter"), including the run in progress if it is running
    /// right now.
    pub fn uptime_us(&self, handle: usize) -> KernelResult<u64> {
        let index = self.resolve_process(handle)?;
        let p = self.processes.get(index).unwrap();
        let live = p.running_since.map_or(0, |since| self.now().saturating_sub(since));
        Ok(p.uptime_us + live)
    }

    /// Change a process's base priority. Effective priority is recomputed
    /// immediately (spec §3 invariant): raising base priority above the
    /// current effective priority takes effect at once; lowering it may be
    /// masked by an inherited priority from a waiter on an owned mutex.
    pub fn set_priority(&mut self, handle: usize, priority: u8) -> KernelResult<()> {
        let index = self.resolve_process(handle)?;
        let inherited = self.highest_owned_mutex_waiter_priority(index);
        let p = self.processes.get_mut(index).unwrap();
        p.base_priority = priority;
        p.effective_priority = match inherited {
            Some(w) => priority.min(w),
            None => priority,
        };
        if p.sched_state == SchedState::Ready {
            self.ready.remove(&mut self.processes, index);
            self.ready.insert(&mut self.processes, index);
        }
        self.reschedule();
        Ok(())
    }

    /// The numerically-smallest (highest) effective priority among processes
    /// waiting on any mutex `index` still owns, or `None` if it owns no
    /// contended mutex (spec §3 invariant, §4.5 unlock step 3).
    pub(crate) fn highest_owned_mutex_waiter_priority(&self, index: usize) -> Option<u8> {
        self.processes
            .get(index)
            .unwrap()
            .owned_mutexes
            .iter()
            .filter_map(|&m| self.mutexes.get(m).unwrap().waiters.highest_priority(&self.processes))
            .min()
    }

    /// Remove `pid` from whichever sync-object waiter list its `sync_kind`
    /// names. Used by timeout expiry and process destruction, the two paths
    /// that unblock a process without that object's own operation popping
    /// it first.
    pub(crate) fn remove_from_wait_structure(&mut self, pid: usize) {
        let (kind, obj) = {
            let p = self.processes.get(pid).unwrap();
            (p.sync_kind, p.sync_object)
        };
        use crate::process::SyncKind;
        match (kind, obj) {
            (SyncKind::Mutex, Some(m)) => {
                self.mutexes.get_mut(m).unwrap().waiters.remove(&mut self.processes, pid);
            }
            (SyncKind::Event, Some(e)) => {
                self.events.get_mut(e).unwrap().waiters.remove(&mut self.processes, pid);
            }
            (SyncKind::Semaphore, Some(s)) => {
                self.semaphores.get_mut(s).unwrap().waiters.remove(&mut self.processes, pid);
            }
            (SyncKind::IpcPostWait, Some(target)) => {
                // `post_waiters` lives *inside* `self.processes` (the target
                // process is itself the sync object here), so it has to be
                // moved out before `procs: &mut Table<Process, N>` can be
                // passed in — otherwise this would alias `self.processes`
                // with itself.
                let mut waiters = core::mem::take(&mut self.processes.get_mut(target).unwrap().post_waiters);
                waiters.remove(&mut self.processes, pid);
                self.processes.get_mut(target).unwrap().post_waiters = waiters;
            }
            (SyncKind::IpcRead, _) | (SyncKind::Sleep, _) | (SyncKind::None, _) => {}
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPlatform;

    fn rex(name: &str, priority: u8) -> Rex<'_> {
        Rex {
            name,
            stack_size: 256,
            priority,
            flags: ProcessFlags::ACTIVE,
            entry_point: 0,
            arena: MemRegion::new(0x1000, 0x100),
        }
    }

    #[test]
    fn first_created_process_becomes_current() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let h = k.create_process(&rex("a", 5)).unwrap();
        let idx = k.resolve_process(h).unwrap();
        assert_eq!(k.current(), Some(idx));
        assert!(k.take_pending_switch());
    }

    #[test]
    fn higher_priority_creation_preempts() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let low = k.create_process(&rex("low", 5)).unwrap();
        let low_idx = k.resolve_process(low).unwrap();
        assert_eq!(k.current(), Some(low_idx));
        k.take_pending_switch();

        let high = k.create_process(&rex("high", 1)).unwrap();
        let high_idx = k.resolve_process(high).unwrap();
        assert_eq!(k.current(), Some(high_idx));
        assert!(k.take_pending_switch());
    }

    #[test]
    fn freeze_removes_from_scheduling_unfreeze_restores() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let h = k.create_process(&rex("a", 5)).unwrap();
        k.freeze_process(h).unwrap();
        assert_eq!(k.current(), None);
        k.unfreeze_process(h).unwrap();
        let idx = k.resolve_process(h).unwrap();
        assert_eq!(k.current(), Some(idx));
    }

    #[test]
    fn uptime_accrues_only_while_running() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let a = k.create_process(&rex("a", 5)).unwrap();
        let b = k.create_process(&rex("b", 5)).unwrap();

        k.platform().advance_us(1_000);
        assert_eq!(k.uptime_us(a).unwrap(), 1_000);
        assert_eq!(k.uptime_us(b).unwrap(), 0);

        k.yield_now(); // a -> b
        k.platform().advance_us(2_000);
        assert_eq!(k.uptime_us(a).unwrap(), 1_000);
        assert_eq!(k.uptime_us(b).unwrap(), 2_000);

        k.yield_now(); // b -> a
        assert_eq!(k.uptime_us(b).unwrap(), 2_000);
        assert_eq!(k.uptime_us(a).unwrap(), 1_000);
    }
}
