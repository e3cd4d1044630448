//! Readiness polling.
//!
//! Every hardware handshake in the bring-up sequence is a busy-poll on a status bit. By default
//! the poll never gives up, so a dead oscillator hangs at an identifiable location. A bounded
//! policy turns the hang into a [`Stall`] that is handed to a [`FatalHalt`] routine.

use crate::regs::RegisterAccess;

/// How long a readiness poll may spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollPolicy {
    /// Spin until the condition holds.
    #[default]
    Unbounded,
    /// Give up after `max_polls` failed reads.
    Bounded { max_polls: u32 },
}

/// Oscillators that can be gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oscillator {
    /// 8 or 16 MHz internal RC.
    Hsi,
    /// External crystal or clock input.
    Hse,
    /// 48 MHz internal RC.
    Hsi48,
    /// Multi-speed internal RC.
    Msi,
}

/// A readiness condition the sequence waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gate {
    /// Flash wait states read back as written.
    FlashLatency,
    /// Regulator settled after a voltage range change.
    VoltageScaling,
    Oscillator(Oscillator),
    /// PLL locked.
    Pll,
    /// System clock status equals the requested source.
    SysclkSwitch { requested: u8 },
    /// Auxiliary 48 MHz oscillator ready.
    Aux48,
    /// Hardware semaphore acquired.
    Semaphore(u8),
}

/// A readiness condition that did not become true within the poll bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stall {
    pub gate: Gate,
    pub polls: u32,
}

/// Busy-poll `ready` until it returns `true`.
///
/// With [`PollPolicy::Unbounded`] this only returns `Ok`.
pub fn wait_until<B: RegisterAccess>(
    bus: &B,
    policy: PollPolicy,
    gate: Gate,
    mut ready: impl FnMut(&B) -> bool,
) -> Result<(), Stall> {
    let mut polls: u32 = 0;
    loop {
        if ready(bus) {
            return Ok(());
        }
        polls = polls.saturating_add(1);
        if let PollPolicy::Bounded { max_polls } = policy {
            if polls >= max_polls {
                return Err(Stall { gate, polls });
            }
        }
    }
}

/// Where a bounded poll goes when it gives up. Never returns.
pub trait FatalHalt {
    fn halt(&mut self, stall: Stall) -> !;
}

/// Logs the stall and spins forever, leaving the reset to a watchdog or debugger.
pub struct SpinHalt;

impl FatalHalt for SpinHalt {
    fn halt(&mut self, stall: Stall) -> ! {
        error!("bring-up stalled at {:?} after {} polls", stall.gate, stall.polls);
        loop {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{Reg, RegisterAccess};
    use core::cell::Cell;

    struct Counter(Cell<u32>);

    impl RegisterAccess for Counter {
        fn read(&self, _reg: Reg) -> u32 {
            let n = self.0.get() + 1;
            self.0.set(n);
            n
        }
        fn write(&self, _reg: Reg, _value: u32) {}
        fn barrier(&self) {}
    }

    const R: Reg = Reg::new("TEST.R", 0, 0);

    #[test]
    fn bounded_poll_gives_up_at_the_bound() {
        let bus = Counter(Cell::new(0));
        let res = wait_until(&bus, PollPolicy::Bounded { max_polls: 5 }, Gate::Pll, |b| {
            b.read(R) > 100
        });
        assert_eq!(res, Err(Stall { gate: Gate::Pll, polls: 5 }));
        assert_eq!(bus.0.get(), 5);
    }

    #[test]
    fn unbounded_poll_waits_for_the_condition() {
        let bus = Counter(Cell::new(0));
        let res = wait_until(&bus, PollPolicy::Unbounded, Gate::FlashLatency, |b| {
            b.read(R) == 1000
        });
        assert_eq!(res, Ok(()));
        assert_eq!(bus.0.get(), 1000);
    }
}
