//! Event: a binary latch in manual- or auto-reset mode (spec §4.6).

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::magic::Magic;
use crate::platform::Platform;
use crate::process::SyncKind;
use crate::sync::wait::WaitList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    /// Stays set until explicitly `reset()`.
    Manual,
    /// `set()` wakes exactly one highest-priority waiter, then clears; if
    /// nobody is waiting the latch stays set for the next `wait()`.
    Auto,
}

pub struct Event {
    pub mode: EventMode,
    pub set: bool,
    pub waiters: WaitList,
}

impl Event {
    pub const fn new(mode: EventMode) -> Self {
        Self {
            mode,
            set: false,
            waiters: WaitList::new(),
        }
    }
}

impl<P: Platform> Kernel<P> {
    pub fn event_create(&mut self, mode: EventMode) -> KernelResult<usize> {
        let idx = self.events.alloc().ok_or(KernelError::OutOfMemory)?;
        self.events.occupy(idx, Magic::EVENT, Event::new(mode));
        Ok(self.events.handle_of(idx))
    }

    /// `wait(timeout)` (spec §4.6). A manual-reset event that is already set
    /// returns immediately without clearing; an auto-reset event that is
    /// already set consumes it (clears) and returns immediately. Either way,
    /// a waiter sees exactly one of a successful return or a timeout — never
    /// a spurious wakeup.
    pub fn event_wait(&mut self, handle: usize, timeout: Option<u64>) -> KernelResult<()> {
        let eidx = self.events.resolve(handle, Magic::EVENT)?;
        let caller = self.current.ok_or(KernelError::NotConfigured)?;

        if self.events.get(eidx).unwrap().set {
            if self.events.get(eidx).unwrap().mode == EventMode::Auto {
                self.events.get_mut(eidx).unwrap().set = false;
            }
            return Ok(());
        }

        self.events.get_mut(eidx).unwrap().waiters.insert(&mut self.processes, caller);
        self.block_current(SyncKind::Event, Some(eidx), timeout);
        self.take_wake_result(caller).unwrap_or(Ok(()))
    }

    /// `set()` (spec §4.6). Manual mode wakes every current waiter and
    /// leaves the latch set for anyone who checks later. Auto mode wakes at
    /// most one waiter; if nobody was waiting, the latch stays set for the
    /// next `wait()` to consume.
    pub fn event_set(&mut self, handle: usize) -> KernelResult<()> {
        let eidx = self.events.resolve(handle, Magic::EVENT)?;
        match self.events.get(eidx).unwrap().mode {
            EventMode::Manual => {
                self.events.get_mut(eidx).unwrap().set = true;
                while let Some(w) = self.events.get_mut(eidx).unwrap().waiters.pop_highest(&mut self.processes) {
                    self.complete_wait(w, Ok(()));
                }
            }
            EventMode::Auto => {
                if let Some(w) = self.events.get_mut(eidx).unwrap().waiters.pop_highest(&mut self.processes) {
                    self.complete_wait(w, Ok(()));
                } else {
                    self.events.get_mut(eidx).unwrap().set = true;
                }
            }
        }
        Ok(())
    }

    /// `reset()`: clear the latch without waking anyone.
    pub fn event_reset(&mut self, handle: usize) -> KernelResult<()> {
        let eidx = self.events.resolve(handle, Magic::EVENT)?;
        self.events.get_mut(eidx).unwrap().set = false;
        Ok(())
    }

    /// `pulse()` (spec §4.6): set and reset atomically with respect to
    /// waiters — wakes the same set `set()` would, but never leaves the
    /// latch set afterward.
    pub fn event_pulse(&mut self, handle: usize) -> KernelResult<()> {
        let eidx = self.events.resolve(handle, Magic::EVENT)?;
        match self.events.get(eidx).unwrap().mode {
            EventMode::Manual => {
                while let Some(w) = self.events.get_mut(eidx).unwrap().waiters.pop_highest(&mut self.processes) {
                    self.complete_wait(w, Ok(()));
                }
            }
            EventMode::Auto => {
                if let Some(w) = self.events.get_mut(eidx).unwrap().waiters.pop_highest(&mut self.processes) {
                    self.complete_wait(w, Ok(()));
                }
            }
        }
        self.events.get_mut(eidx).unwrap().set = false;
        Ok(())
    }

    pub fn event_destroy(&mut self, handle: usize) -> KernelResult<()> {
        let eidx = self.events.resolve(handle, Magic::EVENT)?;
        if !self.events.get(eidx).unwrap().waiters.is_empty() {
            debug_assert!(false, "event destroyed with waiters still present");
            return Err(KernelError::Deadlock);
        }
        self.events.free(eidx);
        Ok(())
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
    fn manual_reset_stays_set_until_reset() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let _p = k.create_process(&rex("a", 5)).unwrap();
        let e = k.event_create(EventMode::Manual).unwrap();
        k.event_set(e).unwrap();
        // Already set: both waits return immediately without clearing it.
        k.event_wait(e, None).unwrap();
        k.event_wait(e, None).unwrap();
        k.event_reset(e).unwrap();
        let eidx = k.events.resolve(e, Magic::EVENT).unwrap();
        assert!(!k.events.get(eidx).unwrap().set);
    }

    #[test]
    fn auto_reset_wakes_exactly_one_waiter() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let e = k.event_create(EventMode::Auto).unwrap();

        let a = k.create_process(&rex("a", 5)).unwrap();
        let a_idx = k.resolve_process(a).unwrap();
        // `a` is current; blocks on the not-yet-set event.
        k.event_wait(e, None).unwrap();
        assert_eq!(k.current(), None);

        let b = k.create_process(&rex("b", 5)).unwrap();
        let b_idx = k.resolve_process(b).unwrap();
        k.event_wait(e, None).unwrap();
        assert_eq!(k.current(), None);

        k.event_set(e).unwrap();
        let a_result = k.take_wake_result(a_idx);
        let b_result = k.take_wake_result(b_idx);
        assert_eq!(a_result, Some(Ok(())));
        assert_eq!(b_result, None);
        let eidx = k.events.resolve(e, Magic::EVENT).unwrap();
        assert!(!k.events.get(eidx).unwrap().set);
    }
}
