//! The platform contract (spec §6): everything the core expects the board's
//! HAL to provide, and nothing more. Board/MCU HAL, the process heap
//! allocator, TCP/IP and TLS midware, and `printk`/`dump` are all explicitly
//! out of scope (spec §1) — they are external collaborators the kernel only
//! ever reaches through this trait.

/// High-precision elapsed-time source: a start/stop/elapsed callback triple
/// (spec §4.1, §6) giving sub-second, microsecond-resolution offsets on top
/// of the kernel's own 1 Hz tick.
pub trait Hpet {
    /// Arm the HPET to fire once, `us` microseconds from now. Used by the
    /// timer wheel to schedule its next expiry precisely (§4.2).
    fn hpet_start(&self, us: u32);

    /// Disarm the HPET.
    fn hpet_stop(&self);

    /// Microseconds elapsed since the current second began.
    fn hpet_elapsed(&self) -> u32;
}

/// The IRQ controller contract (§6): register/enable/disable/set-priority.
/// The core only ever registers two handlers through this (§5): the 1 Hz
/// tick and the pending-switch exception.
pub trait IrqController {
    /// Register `handler` on vector `vec`. `ctx` is passed back to `handler`
    /// uninterpreted (an opaque platform cookie), mirroring a typical C HAL
    /// callback signature.
    fn irq_register(&self, vec: u32, handler: fn(ctx: usize), ctx: usize);

    fn irq_enable(&self, vec: u32);
    fn irq_disable(&self, vec: u32);

    /// Set the *platform* interrupt priority of vector `vec`. Used to make
    /// the pending-switch exception the lowest-priority exception, per
    /// spec §4.3, so it never preempts another ISR.
    fn irq_set_priority(&self, vec: u32, priority: u32);
}

/// A pluggable debug byte sink (`printk`/`dump`, spec §1). The kernel never
/// writes to this directly — it goes through the `log` facade (see
/// SPEC_FULL.md §10.1) and the platform installs a `log::Log` implementation
/// that forwards formatted records to this sink.
pub trait DebugSink {
    fn write_bytes(&self, bytes: &[u8]);
}

/// Everything the kernel needs from the platform, bundled for convenience.
pub trait Platform: Hpet + IrqController {}

impl<T: Hpet + IrqController> Platform for T {}
