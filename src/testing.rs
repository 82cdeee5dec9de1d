//! A host-side [`Platform`] double (spec SPEC_FULL.md §10.4), scaled to this
//! core's actual suspension points rather than `r3_port_std`'s full
//! simulated-hardware port: since process entry points are never executed
//! here (§1), there is no need to back "processes" with real OS threads —
//! tests drive the kernel's data-structure transitions directly and use
//! [`MockPlatform`] only to stand in for the HPET/IRQ collaborator.

use core::cell::Cell;

use crate::platform::{Hpet, IrqController};

/// A manually-advanced HPET plus a recording IRQ controller double.
pub struct MockPlatform {
    elapsed_us: Cell<u32>,
    armed: Cell<Option<u32>>,
    registered: Cell<Option<(u32, fn(usize), usize)>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            elapsed_us: Cell::new(0),
            armed: Cell::new(None),
            registered: Cell::new(None),
        }
    }

    /// Advance the sub-second clock by `us` microseconds. Tests are
    /// responsible for calling `Kernel::tick()` themselves when crossing a
    /// second boundary (this double does not wrap `elapsed_us` on its own —
    /// it exists to drive `hpet_expired`, not to reimplement `Clock`).
    pub fn advance_us(&self, us: u32) {
        self.elapsed_us.set(self.elapsed_us.get() + us);
    }

    /// Whether the HPET is currently armed and the elapsed time has reached
    /// its programmed deadline — what a real ISR dispatcher would check
    /// before invoking the handler. Tests call this, then `Kernel::hpet_expired()`
    /// when it returns `true`.
    pub fn hpet_due(&self) -> bool {
        matches!(self.armed.get(), Some(d) if self.elapsed_us.get() >= d)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Hpet for MockPlatform {
    fn hpet_start(&self, us: u32) {
        self.armed.set(Some(self.elapsed_us.get() + us));
    }

    fn hpet_stop(&self) {
        self.armed.set(None);
    }

    fn hpet_elapsed(&self) -> u32 {
        self.elapsed_us.get()
    }
}

impl IrqController for MockPlatform {
    fn irq_register(&self, vec: u32, handler: fn(ctx: usize), ctx: usize) {
        self.registered.set(Some((vec, handler, ctx)));
    }

    fn irq_enable(&self, _vec: u32) {}
    fn irq_disable(&self, _vec: u32) {}
    fn irq_set_priority(&self, _vec: u32, _priority: u32) {}
}
