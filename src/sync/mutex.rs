//! Mutex with nested priority inheritance (spec §4.5).

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::magic::Magic;
use crate::platform::Platform;
use crate::process::{SchedState, SyncKind};
use crate::sync::wait::WaitList;

/// Mutex state: *unlocked* is `owner == None`; *locked(owner, count)*
/// otherwise.
pub struct Mutex {
    pub owner: Option<usize>,
    pub lock_count: u32,
    pub waiters: WaitList,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            owner: None,
            lock_count: 0,
            waiters: WaitList::new(),
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> Kernel<P> {
    pub fn mutex_create(&mut self) -> KernelResult<usize> {
        let idx = self.mutexes.alloc().ok_or(KernelError::OutOfMemory)?;
        self.mutexes.occupy(idx, Magic::MUTEX, Mutex::new());
        Ok(self.mutexes.handle_of(idx))
    }

    /// `lock` (spec §4.5). Blocks if the mutex is held by another process,
    /// propagating priority inheritance up the ownership chain first.
    pub fn mutex_lock(&mut self, handle: usize, timeout: Option<u64>) -> KernelResult<()> {
        let midx = self.mutexes.resolve(handle, Magic::MUTEX)?;
        let caller = self.current.ok_or(KernelError::NotConfigured)?;

        match self.mutexes.get(midx).unwrap().owner {
            None => {
                self.acquire(midx, caller);
                Ok(())
            }
            Some(owner) if owner == caller => {
                self.mutexes.get_mut(midx).unwrap().lock_count += 1;
                Ok(())
            }
            Some(_) => {
                self.mutexes.get_mut(midx).unwrap().waiters.insert(&mut self.processes, caller);
                self.propagate_inheritance(midx);
                self.block_current(SyncKind::Mutex, Some(midx), timeout);
                self.take_wake_result(caller).unwrap_or(Ok(()))
            }
        }
    }

    /// `try_lock` (spec §4.5): never blocks, reports whether it acquired.
    pub fn mutex_try_lock(&mut self, handle: usize) -> KernelResult<bool> {
        let midx = self.mutexes.resolve(handle, Magic::MUTEX)?;
        let caller = self.current.ok_or(KernelError::NotConfigured)?;

        match self.mutexes.get(midx).unwrap().owner {
            None => {
                self.acquire(midx, caller);
                Ok(true)
            }
            Some(owner) if owner == caller => {
                self.mutexes.get_mut(midx).unwrap().lock_count += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// `unlock` (spec §4.5). Recursion-aware; on the final release, hands
    /// the mutex straight to the highest-priority waiter and recomputes the
    /// releasing process's effective priority from its remaining owned
    /// mutexes.
    pub fn mutex_unlock(&mut self, handle: usize) -> KernelResult<()> {
        let midx = self.mutexes.resolve(handle, Magic::MUTEX)?;
        let caller = self.current.ok_or(KernelError::NotConfigured)?;

        if self.mutexes.get(midx).unwrap().owner != Some(caller) {
            return Err(KernelError::AccessDenied);
        }

        let remaining = {
            let m = self.mutexes.get_mut(midx).unwrap();
            m.lock_count -= 1;
            m.lock_count
        };
        if remaining >= 1 {
            return Ok(());
        }

        if let Some(pos) = self
            .processes
            .get(caller)
            .unwrap()
            .owned_mutexes
            .iter()
            .position(|&m| m == midx)
        {
            self.processes.get_mut(caller).unwrap().owned_mutexes.remove(pos);
        }

        let inherited = self.highest_owned_mutex_waiter_priority(caller);
        {
            let p = self.processes.get_mut(caller).unwrap();
            p.effective_priority = match inherited {
                Some(w) => p.base_priority.min(w),
                None => p.base_priority,
            };
        }
        if self.processes.get(caller).unwrap().sched_state == SchedState::Ready {
            self.ready.remove(&mut self.processes, caller);
            self.ready.insert(&mut self.processes, caller);
        }

        let next_waiter = self.mutexes.get_mut(midx).unwrap().waiters.pop_highest(&mut self.processes);
        match next_waiter {
            Some(w) => {
                self.acquire(midx, w);
                self.complete_wait(w, Ok(()));
            }
            None => {
                let m = self.mutexes.get_mut(midx).unwrap();
                m.owner = None;
                m.lock_count = 0;
            }
        }
        self.reschedule();
        Ok(())
    }

    /// `destroy` (spec §4.5): destroying a mutex with waiters is a fatal
    /// invariant violation (debug-halt, release-sentinel, spec §7/§9).
    pub fn mutex_destroy(&mut self, handle: usize) -> KernelResult<()> {
        let midx = self.mutexes.resolve(handle, Magic::MUTEX)?;
        if !self.mutexes.get(midx).unwrap().waiters.is_empty() {
            debug_assert!(false, "mutex destroyed with waiters still present");
            return Err(KernelError::Deadlock);
        }
        if let Some(owner) = self.mutexes.get(midx).unwrap().owner {
            if let Some(pos) = self
                .processes
                .get(owner)
                .and_then(|p| p.owned_mutexes.iter().position(|&m| m == midx))
            {
                self.processes.get_mut(owner).unwrap().owned_mutexes.remove(pos);
            }
        }
        self.mutexes.free(midx);
        Ok(())
    }

    /// Grant `midx` to `pid` outright (first acquire or hand-off), recording
    /// it in the new owner's owned-mutex list.
    fn acquire(&mut self, midx: usize, pid: usize) {
        let m = self.mutexes.get_mut(midx).unwrap();
        m.owner = Some(pid);
        m.lock_count = 1;
        // Capacity is bounded by `MAX_OWNED_MUTEXES` (spec §9 Design Notes:
        // exceeding it is a configuration bug, not a runtime error path).
        let _ = self.processes.get_mut(pid).unwrap().owned_mutexes.try_push(midx);
    }

    /// Walk the priority-inheritance chain starting at `midx`'s owner,
    /// raising each owner's effective priority to the highest waiter's, and
    /// following into whatever mutex that owner is itself blocked on (spec
    /// §4.5, §9 "walk the back-reference chain"). Bounded by the number of
    /// live mutexes, since a correctly-used kernel has no cycles; exceeding
    /// that bound is the documented caller-contract violation, not a normal
    /// result.
    fn propagate_inheritance(&mut self, mut midx: usize) {
        use crate::config::MAX_SYNC_OBJECTS;

        for _ in 0..MAX_SYNC_OBJECTS {
            let Some(owner) = self.mutexes.get(midx).unwrap().owner else {
                return;
            };
            let Some(waiter_prio) = self.mutexes.get(midx).unwrap().waiters.highest_priority(&self.processes) else {
                return;
            };
            let owner_eff = self.processes.get(owner).unwrap().effective_priority;
            if waiter_prio >= owner_eff {
                return;
            }
            self.processes.get_mut(owner).unwrap().effective_priority = waiter_prio;
            if self.processes.get(owner).unwrap().sched_state == SchedState::Ready {
                self.ready.remove(&mut self.processes, owner);
                self.ready.insert(&mut self.processes, owner);
            }

            let (kind, obj) = {
                let p = self.processes.get(owner).unwrap();
                (p.sync_kind, p.sync_object)
            };
            match (kind, obj) {
                (SyncKind::Mutex, Some(next)) => midx = next,
                _ => return,
            }
        }
        debug_assert!(false, "priority inheritance walk exceeded the live-mutex bound (mutex cycle?)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::magic::MemRegion;
    use crate::process::{ProcessFlags, Rex};
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
    fn uncontended_lock_unlock_roundtrip() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let p = k.create_process(&rex("a", 5)).unwrap();
        let m = k.mutex_create().unwrap();
        k.mutex_lock(m, None).unwrap();
        let midx = k.mutexes.resolve(m, Magic::MUTEX).unwrap();
        assert_eq!(k.mutexes.get(midx).unwrap().owner, Some(k.resolve_process(p).unwrap()));
        k.mutex_unlock(m).unwrap();
        assert_eq!(k.mutexes.get(midx).unwrap().owner, None);
    }

    #[test]
    fn recursive_lock_requires_matching_unlocks() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let _p = k.create_process(&rex("a", 5)).unwrap();
        let m = k.mutex_create().unwrap();
        k.mutex_lock(m, None).unwrap();
        k.mutex_lock(m, None).unwrap();
        let midx = k.mutexes.resolve(m, Magic::MUTEX).unwrap();
        assert_eq!(k.mutexes.get(midx).unwrap().lock_count, 2);
        k.mutex_unlock(m).unwrap();
        assert!(k.mutexes.get(midx).unwrap().owner.is_some());
        k.mutex_unlock(m).unwrap();
        assert!(k.mutexes.get(midx).unwrap().owner.is_none());
    }

    #[test]
    fn unlock_by_non_owner_is_access_denied() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let low = k.create_process(&rex("low", 5)).unwrap();
        let m = k.mutex_create().unwrap();
        k.mutex_lock(m, None).unwrap();
        // Switch `current` to a second process without touching the lock.
        let _high = k.create_process(&rex("high", 1)).unwrap();
        assert_ne!(k.current(), Some(k.resolve_process(low).unwrap()));
        assert_eq!(k.mutex_unlock(m), Err(KernelError::AccessDenied));
    }

    #[test]
    fn contention_raises_owner_priority_and_hands_off_on_unlock() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let low = k.create_process(&rex("low", 5)).unwrap();
        let low_idx = k.resolve_process(low).unwrap();
        let m = k.mutex_create().unwrap();
        k.mutex_lock(m, None).unwrap();
        k.take_pending_switch();

        let high = k.create_process(&rex("high", 1)).unwrap();
        let high_idx = k.resolve_process(high).unwrap();
        // `high` becomes current (higher priority); it now tries to lock a
        // mutex `low` holds, and should block while raising `low`.
        assert_eq!(k.current(), Some(high_idx));
        let outcome = k.mutex_lock(m, None);
        assert_eq!(k.processes.get(low_idx).unwrap().effective_priority, 1);
        assert_eq!(k.current(), Some(low_idx));

        k.mutex_unlock(m).unwrap();
        assert_eq!(k.take_wake_result(high_idx), Some(Ok(())));
        assert_eq!(k.processes.get(low_idx).unwrap().effective_priority, 5);
        assert_eq!(k.current(), Some(high_idx));
        let _ = outcome;
    }

    // `mutex_destroy` with a non-empty waiter list is a kernel assertion
    // failure (spec §9: "kernel assertions are fatal halts"), via
    // `debug_assert!` rather than a returned error — like the `magic`
    // module's checks, that path deliberately isn't exercised under
    // `cfg(test)` (it would panic the test binary itself). This only checks
    // the precondition it guards against.
    #[test]
    fn destroy_guard_precondition_is_reachable() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let _low = k.create_process(&rex("low", 5)).unwrap();
        let m = k.mutex_create().unwrap();
        k.mutex_lock(m, None).unwrap();
        let _high = k.create_process(&rex("high", 1)).unwrap();
        let midx = k.mutexes.resolve(m, Magic::MUTEX).unwrap();
        let high_idx = k.current().unwrap();
        k.mutexes.get_mut(midx).unwrap().waiters.insert(&mut k.processes, high_idx);
        assert!(!k.mutexes.get(midx).unwrap().waiters.is_empty());
    }
}
