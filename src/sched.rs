//! Sleep/wake and timer-driven expiry (spec §4.4), plus the two interrupt
//! entry points the platform is allowed to call into (spec §5): `tick()` on
//! each 1 Hz pulse and `hpet_expired()` when the programmed HPET fires.

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::process::{SchedState, SyncKind};

impl<P: Platform> Kernel<P> {
    /// `kprocess_sleep` (spec §4.4): remove `pid` (must be `current`) from
    /// scheduling, record what it is waiting on, register a timer if
    /// `timeout` is finite, and request a re-pick.
    pub(crate) fn block_current(&mut self, kind: SyncKind, sync_object: Option<usize>, timeout: Option<u64>) {
        let pid = self.current.expect("block_current with no current process");
        {
            let p = self.processes.get_mut(pid).unwrap();
            p.sched_state = SchedState::Waiting;
            p.sync_kind = kind;
            p.sync_object = sync_object;
            p.timed_out = false;
            p.wake_result = None;
        }
        self.current = None;
        if let Some(timeout_us) = timeout {
            let deadline = self.now() + timeout_us;
            self.timers.schedule(&mut self.processes, pid, deadline);
            self.reprogram_hpet();
        }
        self.reschedule();
    }

    /// Finish waking `pid` after the caller has already removed it from
    /// whatever sync-object waiter list it sat in (or there was none, for a
    /// plain sleep). Cancels any pending timer, clears the wait state, makes
    /// it ready, and stashes `result` for the blocked call to observe.
    pub(crate) fn complete_wait(&mut self, pid: usize, result: KernelResult<()>) {
        self.timers.cancel(&mut self.processes, pid);
        {
            let p = self.processes.get_mut(pid).unwrap();
            p.sync_object = None;
            p.sync_kind = SyncKind::None;
            p.sched_state = SchedState::Ready;
            p.wake_result = Some(result);
        }
        self.ready.insert(&mut self.processes, pid);
        self.reschedule();
    }

    /// `kprocess_wakeup` (spec §4.4): unblock `pid` outright (used by
    /// `event_set`/`pulse` and plain timed-sleep wakeups that have no result
    /// to carry beyond success).
    pub(crate) fn wakeup(&mut self, pid: usize) {
        if self.processes.get(pid).unwrap().sched_state != SchedState::Waiting {
            return;
        }
        self.remove_from_wait_structure(pid);
        self.complete_wait(pid, Ok(()));
    }

    /// Take `pid`'s pending wake result, if it has one — the return value a
    /// blocking call left behind once it was actually woken (spec §4.3: a
    /// kernel entry "returns via the scheduler", so the result is only known
    /// once this process is dispatched again).
    pub fn take_wake_result(&mut self, pid: usize) -> Option<KernelResult<()>> {
        self.processes.get_mut(pid).and_then(|p| p.wake_result.take())
    }

    /// Put `current` to sleep for `timeout_us` with no sync object (spec
    /// §4.10 opcode `sleep`).
    pub fn sleep(&mut self, timeout_us: u64) -> KernelResult<()> {
        let pid = self.current.ok_or(KernelError::NotConfigured)?;
        self.block_current(SyncKind::Sleep, None, Some(timeout_us));
        self.take_wake_result(pid).unwrap_or(Ok(()))
    }

    /// Whether `handle` currently has a timer node registered in the wheel
    /// (spec §4.2, §8 property 5: a timed-out wait leaves none behind).
    pub fn has_pending_timer(&self, handle: usize) -> KernelResult<bool> {
        let index = self.resolve_process(handle)?;
        Ok(self.processes.get(index).unwrap().timer_deadline.is_some())
    }

    /// Explicit `wake` opcode (spec §4.10): wake a sleeping or waiting
    /// process early, with success rather than a timeout. A no-op if the
    /// process is not currently waiting.
    pub fn wake_process(&mut self, handle: usize) -> KernelResult<()> {
        let index = self.resolve_process(handle)?;
        self.wakeup(index);
        Ok(())
    }

    /// Voluntary yield (spec §5 "cooperative yield points are explicit...
    /// and voluntary yield"): re-queue `current` at the back of its own
    /// priority level and re-pick.
    pub fn yield_now(&mut self) {
        let Some(pid) = self.current else { return };
        self.processes.get_mut(pid).unwrap().sched_state = SchedState::Ready;
        self.current = None;
        self.ready.insert(&mut self.processes, pid);
        self.reschedule();
    }

    /// Expire every timer due at or before `now` and wake its holder with
    /// `Err(Timeout)` (spec §4.4: "identical to wakeup but additionally sets
    /// the sleeping call's return error to timeout" — this applies uniformly,
    /// including a plain `sleep(t)` running to term; only an explicit early
    /// `wake` opcode resolves a sleep with `Ok(())`).
    fn expire_due(&mut self, now: u64) {
        let expired = self.timers.expire(&mut self.processes, now);
        for pid in expired {
            self.processes.get_mut(pid).unwrap().timed_out = true;
            self.remove_from_wait_structure(pid);
            self.complete_wait(pid, Err(KernelError::Timeout));
        }
    }

    /// Called on each 1 Hz hardware pulse (spec §4.2). Advances the clock's
    /// seconds counter, then expires any timer now due.
    pub fn tick(&mut self) {
        self.clock.on_second_pulse();
        let now = self.now();
        self.expire_due(now);
        self.reprogram_hpet();
    }

    /// Called by the platform when the programmed HPET fires (spec §4.2).
    pub fn hpet_expired(&mut self) {
        let now = self.now();
        self.expire_due(now);
        self.reprogram_hpet();
    }

    /// Re-arm the HPET to the timer wheel's new head, if any, and if it
    /// falls within the current second (spec §4.2: "otherwise it relies on
    /// the next seconds tick to re-examine the list").
    pub(crate) fn reprogram_hpet(&mut self) {
        use crate::platform::Hpet;
        match self.timers.next_deadline(&self.processes) {
            Some(deadline) => {
                let now = self.now();
                if deadline <= now {
                    return;
                }
                let delta = deadline - now;
                if delta < 1_000_000 {
                    self.platform.hpet_start(delta as u32);
                } else {
                    self.platform.hpet_stop();
                }
            }
            None => self.platform.hpet_stop(),
        }
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
    fn sleep_times_out_and_returns_to_ready_at_base_priority() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let h = k.create_process(&rex("a", 5)).unwrap();
        let pid = k.resolve_process(h).unwrap();
        k.take_pending_switch();

        k.block_current(SyncKind::Sleep, None, Some(50_000));
        assert_eq!(k.current(), None);

        k.platform().advance_us(50_000);
        k.hpet_expired();
        let result = k.take_wake_result(pid);
        assert_eq!(result, Some(Err(KernelError::Timeout)));
        assert_eq!(k.processes.get(pid).unwrap().sched_state, SchedState::Ready);
        assert!(k.processes.get(pid).unwrap().timer_deadline.is_none());
    }

    #[test]
    fn explicit_wake_resolves_ok_before_timeout() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let h = k.create_process(&rex("a", 5)).unwrap();
        let pid = k.resolve_process(h).unwrap();
        k.block_current(SyncKind::Sleep, None, Some(50_000));
        k.wake_process(h).unwrap();
        assert_eq!(k.take_wake_result(pid), Some(Ok(())));
    }

    #[test]
    fn two_processes_round_robin_via_yield() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let a = k.create_process(&rex("a", 5)).unwrap();
        let b = k.create_process(&rex("b", 5)).unwrap();
        let a_idx = k.resolve_process(a).unwrap();
        let b_idx = k.resolve_process(b).unwrap();
        assert_eq!(k.current(), Some(a_idx));
        k.yield_now();
        assert_eq!(k.current(), Some(b_idx));
        k.yield_now();
        assert_eq!(k.current(), Some(a_idx));
    }
}
