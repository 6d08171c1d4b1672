//! The processor side of the tick loop.

use crate::Bus;

/// A processor driven one bus cycle at a time.
///
/// The board owns the bus and lends it to `tick`. IRQ and NMI are input
/// levels the board sets before each tick; when they are sampled is up to
/// the core.
pub trait Cpu {
    /// Register file snapshot type.
    type Registers;

    /// Run one bus cycle.
    fn tick<B: Bus>(&mut self, bus: &mut B);

    fn pc(&self) -> u16;

    fn registers(&self) -> Self::Registers;

    /// True once the core has locked up and only reset will revive it.
    fn is_halted(&self) -> bool;

    fn set_irq(&mut self, asserted: bool);

    fn set_nmi(&mut self, asserted: bool);

    /// Pull RESET. The reset sequence occupies the following ticks.
    fn reset(&mut self);
}
