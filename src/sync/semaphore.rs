//! Counting semaphore with a fixed maximum (spec §4.7).

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::magic::Magic;
use crate::platform::Platform;
use crate::process::SyncKind;
use crate::sync::wait::WaitList;

pub struct Semaphore {
    pub count: u32,
    pub max: u32,
    pub waiters: WaitList,
}

impl Semaphore {
    pub const fn new(max: u32, initial: u32) -> Self {
        Self {
            count: initial,
            max,
            waiters: WaitList::new(),
        }
    }
}

impl<P: Platform> Kernel<P> {
    pub fn semaphore_create(&mut self, max: u32, initial: u32) -> KernelResult<usize> {
        if initial > max {
            return Err(KernelError::InvalidParam);
        }
        let idx = self.semaphores.alloc().ok_or(KernelError::OutOfMemory)?;
        self.semaphores.occupy(idx, Magic::SEMAPHORE, Semaphore::new(max, initial));
        Ok(self.semaphores.handle_of(idx))
    }

    /// `wait(timeout)` (spec §4.7): decrement if positive, else block.
    pub fn semaphore_wait(&mut self, handle: usize, timeout: Option<u64>) -> KernelResult<()> {
        let sidx = self.semaphores.resolve(handle, Magic::SEMAPHORE)?;
        let caller = self.current.ok_or(KernelError::NotConfigured)?;

        if self.semaphores.get(sidx).unwrap().count > 0 {
            self.semaphores.get_mut(sidx).unwrap().count -= 1;
            return Ok(());
        }

        self.semaphores.get_mut(sidx).unwrap().waiters.insert(&mut self.processes, caller);
        self.block_current(SyncKind::Semaphore, Some(sidx), timeout);
        self.take_wake_result(caller).unwrap_or(Ok(()))
    }

    /// `signal` (spec §4.7): increments toward `max`; if the count
    /// transitioned from zero, hands the just-signaled unit straight to the
    /// highest-priority waiter instead of leaving it in `count`.
    pub fn semaphore_signal(&mut self, handle: usize) -> KernelResult<()> {
        let sidx = self.semaphores.resolve(handle, Magic::SEMAPHORE)?;
        let was_zero = self.semaphores.get(sidx).unwrap().count == 0;
        let incremented = {
            let s = self.semaphores.get_mut(sidx).unwrap();
            if s.count < s.max {
                s.count += 1;
                true
            } else {
                false
            }
        };
        if was_zero && incremented {
            if let Some(w) = self.semaphores.get_mut(sidx).unwrap().waiters.pop_highest(&mut self.processes) {
                self.semaphores.get_mut(sidx).unwrap().count -= 1;
                self.complete_wait(w, Ok(()));
            }
        }
        Ok(())
    }

    pub fn semaphore_destroy(&mut self, handle: usize) -> KernelResult<()> {
        let sidx = self.semaphores.resolve(handle, Magic::SEMAPHORE)?;
        if !self.semaphores.get(sidx).unwrap().waiters.is_empty() {
            debug_assert!(false, "semaphore destroyed with waiters still present");
            return Err(KernelError::Deadlock);
        }
        self.semaphores.free(sidx);
        Ok(())
    }
}
