//! Inter-process IPC: per-process mailbox rings and the revocable memory
//! block table (spec §4.8). This is the kernel's sole call mechanism for
//! driver/midware dispatch (spec §9: "model as a message-dispatched actor").

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::process::{IpcRecord, SchedState, SyncKind};

impl<P: Platform> Kernel<P> {
    /// Deliver straight into a receiver blocked in `ipc_read`, if there is
    /// one. Returns whether delivery happened this way.
    fn try_deliver_direct(&mut self, target_idx: usize, rec: IpcRecord) -> bool {
        let target = self.processes.get(target_idx).unwrap();
        if target.sched_state == SchedState::Waiting && target.sync_kind == SyncKind::IpcRead {
            self.processes.get_mut(target_idx).unwrap().pending_ipc = Some(rec);
            self.wakeup(target_idx);
            true
        } else {
            false
        }
    }

    /// After `ipc_read` frees a mailbox slot, let the highest-priority
    /// blocked poster (if any) claim it.
    fn admit_one_post_waiter(&mut self, target_idx: usize) {
        // `post_waiters` lives inside `self.processes` itself (the target
        // process is its own sync object here); move it out before handing
        // `&mut self.processes` to `WaitList` methods to avoid a
        // self-aliased borrow.
        let mut waiters = core::mem::take(&mut self.processes.get_mut(target_idx).unwrap().post_waiters);
        let woken = waiters.pop_highest(&mut self.processes);
        self.processes.get_mut(target_idx).unwrap().post_waiters = waiters;

        if let Some(w) = woken {
            let rec = self
                .processes
                .get_mut(w)
                .unwrap()
                .pending_post
                .take()
                .expect("post waiter carries its queued record");
            let _ = self.processes.get_mut(target_idx).unwrap().mailbox.try_push(rec);
            self.complete_wait(w, Ok(()));
        }
    }

    /// `ipc_post(target, rec)` (spec §4.8), non-blocking: delivers directly
    /// if the target is already waiting on its own IPC, else enqueues, else
    /// drops with `ipc-full` to the sender. Buffer references inside `rec`
    /// should go through `block_open`/`block_close` rather than raw
    /// pointers in `params` — this call does not itself validate pointers.
    pub fn ipc_post(&mut self, target_handle: usize, cmd: u32, params: [u32; 3]) -> KernelResult<()> {
        let target_idx = self.resolve_process(target_handle)?;
        let sender = self.current.ok_or(KernelError::NotConfigured)?;
        let rec = IpcRecord { cmd, params, sender };

        if self.try_deliver_direct(target_idx, rec) {
            return Ok(());
        }
        self.processes
            .get_mut(target_idx)
            .unwrap()
            .mailbox
            .try_push(rec)
            .map_err(|_| KernelError::IpcFull)
    }

    /// `ipc_post_wait` (spec §4.8): like `ipc_post`, but blocks the sender
    /// with `timeout` instead of dropping the record when the target's ring
    /// is full.
    pub fn ipc_post_wait(
        &mut self,
        target_handle: usize,
        cmd: u32,
        params: [u32; 3],
        timeout: Option<u64>,
    ) -> KernelResult<()> {
        let target_idx = self.resolve_process(target_handle)?;
        let sender = self.current.ok_or(KernelError::NotConfigured)?;
        let rec = IpcRecord { cmd, params, sender };

        if self.try_deliver_direct(target_idx, rec) {
            return Ok(());
        }
        match self.processes.get_mut(target_idx).unwrap().mailbox.try_push(rec) {
            Ok(()) => Ok(()),
            Err(err) => {
                let rec = err.element();
                self.processes.get_mut(sender).unwrap().pending_post = Some(rec);

                let mut waiters = core::mem::take(&mut self.processes.get_mut(target_idx).unwrap().post_waiters);
                waiters.insert(&mut self.processes, sender);
                self.processes.get_mut(target_idx).unwrap().post_waiters = waiters;

                self.block_current(SyncKind::IpcPostWait, Some(target_idx), timeout);
                self.take_wake_result(sender).unwrap_or(Ok(()))
            }
        }
    }

    /// `ipc_read(rec_out, timeout)` (spec §4.8) on the current process. Other
    /// blocking calls in this kernel carry `()` as their success value, so a
    /// not-yet-woken call can simply default its synchronous placeholder
    /// return to `Ok(())`; there is no such default for an `IpcRecord`, so
    /// the placeholder here is `Err(Timeout)` instead — callers exercising
    /// this from test code should drive the waking post and then call
    /// [`Kernel::take_wake_result`] plus read `pending_ipc` directly rather
    /// than trust this call's own immediate return.
    pub fn ipc_read(&mut self, timeout: Option<u64>) -> KernelResult<IpcRecord> {
        let pid = self.current.ok_or(KernelError::NotConfigured)?;

        if !self.processes.get(pid).unwrap().mailbox.is_empty() {
            let rec = self.processes.get_mut(pid).unwrap().mailbox.remove(0);
            self.admit_one_post_waiter(pid);
            return Ok(rec);
        }

        self.block_current(SyncKind::IpcRead, None, timeout);
        match self.take_wake_result(pid) {
            Some(Ok(())) => {
                let rec = self
                    .processes
                    .get_mut(pid)
                    .unwrap()
                    .pending_ipc
                    .take()
                    .expect("a woken ipc_read always has a delivered record");
                Ok(rec)
            }
            Some(Err(e)) => Err(e),
            None => Err(KernelError::Timeout),
        }
    }

    /// `block_open(target, ptr, size)` (spec §4.8): validate that
    /// `ptr..ptr+size` lies in the caller's arena and record it in the
    /// smallest free slot of `target`'s block table.
    pub fn block_open(&mut self, target_handle: usize, ptr: usize, size: usize) -> KernelResult<usize> {
        let target_idx = self.resolve_process(target_handle)?;
        let sender = self.current.ok_or(KernelError::NotConfigured)?;
        let arena = self.processes.get(sender).unwrap().arena;
        crate::magic::check_address(arena, self.flash_region, ptr, size, false)?;
        self.processes.get_mut(target_idx).unwrap().open_block(sender, ptr, size)
    }

    /// `block_close(target, index)` (spec §4.8): revoke a previously opened
    /// block from `target`'s table. Any process naming the right target and
    /// index can close it — ownership is recorded on the block purely for
    /// diagnostics, not enforced here (see `MemBlock::owner`).
    pub fn block_close(&mut self, target_handle: usize, index: usize) -> KernelResult<()> {
        let target_idx = self.resolve_process(target_handle)?;
        self.processes.get_mut(target_idx).unwrap().close_block(index)
    }

    /// Resolve block `index` in the current process's table to its
    /// `(ptr, size)` pair, or `access-denied` if closed/invalid (spec §4.8,
    /// §8 property 6: fails before any memory is read).
    pub fn block_resolve(&self, index: usize) -> KernelResult<(usize, usize)> {
        let pid = self.current.ok_or(KernelError::NotConfigured)?;
        self.processes.get(pid).unwrap().resolve_block(index)
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
    fn post_then_read_round_trips_in_order() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        // Equal-priority creation never preempts, so `sender` stays current.
        let _sender = k.create_process(&rex("s", 5)).unwrap();
        let receiver = k.create_process(&rex("r", 5)).unwrap();
        let receiver_idx = k.resolve_process(receiver).unwrap();

        k.ipc_post(receiver, 1, [10, 0, 0]).unwrap();
        k.ipc_post(receiver, 2, [20, 0, 0]).unwrap();

        let first = k.processes.get_mut(receiver_idx).unwrap().mailbox.remove(0);
        let second = k.processes.get_mut(receiver_idx).unwrap().mailbox.remove(0);
        assert_eq!(first.cmd, 1);
        assert_eq!(second.cmd, 2);
    }

    #[test]
    fn post_direct_delivery_to_blocked_receiver() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let receiver = k.create_process(&rex("r", 5)).unwrap();
        let receiver_idx = k.resolve_process(receiver).unwrap();
        // Empty mailbox: blocks immediately, leaving no current process.
        let _ = k.ipc_read(None);
        assert_eq!(k.current(), None);

        let _sender = k.create_process(&rex("s", 5)).unwrap();
        k.ipc_post(receiver, 7, [1, 2, 3]).unwrap();
        assert_eq!(k.take_wake_result(receiver_idx), Some(Ok(())));
        assert_eq!(
            k.processes.get(receiver_idx).unwrap().pending_ipc.map(|r| r.cmd),
            Some(7)
        );
    }

    #[test]
    fn full_ring_drops_with_error_then_receiver_reads_fifo() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        // Equal-priority creation never preempts, so `sender` stays current.
        let _sender = k.create_process(&rex("s", 5)).unwrap();
        let receiver = k.create_process(&rex("r", 5)).unwrap();
        let receiver_idx = k.resolve_process(receiver).unwrap();

        for i in 0..crate::config::IPC_RING_CAPACITY as u32 {
            k.ipc_post(receiver, i, [0, 0, 0]).unwrap();
        }
        assert_eq!(k.ipc_post(receiver, 99, [0, 0, 0]), Err(KernelError::IpcFull));
        assert_eq!(k.processes.get(receiver_idx).unwrap().mailbox.len(), crate::config::IPC_RING_CAPACITY);
    }

    #[test]
    fn block_close_revokes_before_any_read() {
        let mut k = Kernel::new(MockPlatform::new(), None);
        let _a = k.create_process(&rex("a", 5)).unwrap();
        let c = k.create_process(&rex("c", 5)).unwrap();
        let c_idx = k.resolve_process(c).unwrap();

        let idx = k.block_open(c, 0x1010, 16).unwrap();
        assert!(k.processes.get(c_idx).unwrap().resolve_block(idx).is_ok());
        k.processes.get_mut(c_idx).unwrap().close_block(idx).unwrap();
        assert_eq!(
            k.processes.get(c_idx).unwrap().resolve_block(idx),
            Err(KernelError::AccessDenied)
        );
    }
}
