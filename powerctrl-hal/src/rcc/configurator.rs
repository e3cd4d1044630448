//! The clock tree state machine.
//!
//! Families describe *what* to write; [`Configurator`] enforces the order. Each step is issued
//! only after the previous one's readiness flag has been observed, and every configuration
//! write is followed by a barrier.

use crate::poll::{wait_until, Gate, Oscillator, PollPolicy, Stall};
use crate::regs::{Field, RegisterAccess};

/// Progress of a bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Unconfigured,
    OscillatorEnabling,
    OscillatorReady,
    MultiplierConfiguring,
    MultiplierReady,
    SourceSwitching,
    SourceStable,
    AuxiliaryConfiguring,
    AuxiliaryReady,
    Done,
}

impl State {
    /// Forward edges of the state machine.
    ///
    /// A family with several oscillators goes back to `OscillatorEnabling` from
    /// `OscillatorReady`; a family without a PLL switches straight from `OscillatorReady`.
    pub const fn can_advance_to(self, next: State) -> bool {
        use State::*;
        matches!(
            (self, next),
            (Unconfigured, OscillatorEnabling)
                | (OscillatorEnabling, OscillatorReady)
                | (OscillatorReady, OscillatorEnabling)
                | (OscillatorReady, MultiplierConfiguring)
                | (OscillatorReady, SourceSwitching)
                | (MultiplierConfiguring, MultiplierReady)
                | (MultiplierReady, SourceSwitching)
                | (SourceSwitching, SourceStable)
                | (SourceStable, AuxiliaryConfiguring)
                | (SourceStable, Done)
                | (AuxiliaryConfiguring, AuxiliaryReady)
                | (AuxiliaryReady, Done)
        )
    }
}

/// Drives the register sequence for one bring-up.
pub struct Configurator<'a, B: RegisterAccess> {
    bus: &'a B,
    policy: PollPolicy,
    state: State,
    /// Wait states read back as committed, if any were set.
    latency: Option<u32>,
    observer: Option<&'a mut dyn FnMut(State, State)>,
}

impl<'a, B: RegisterAccess> Configurator<'a, B> {
    pub fn new(bus: &'a B, policy: PollPolicy) -> Self {
        Self {
            bus,
            policy,
            state: State::Unconfigured,
            latency: None,
            observer: None,
        }
    }

    /// Call `observer(from, to)` on every transition.
    pub fn with_observer(mut self, observer: &'a mut dyn FnMut(State, State)) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn bus(&self) -> &'a B {
        self.bus
    }

    fn advance(&mut self, next: State) {
        assert!(
            self.state.can_advance_to(next),
            "rcc: illegal transition"
        );
        let from = self.state;
        trace!("rcc: {:?} -> {:?}", from, next);
        if let Some(observer) = self.observer.as_deref_mut() {
            observer(from, next);
        }
        self.state = next;
    }

    /// Busy-poll `ready` under this bring-up's policy.
    pub fn wait(&self, gate: Gate, ready: impl FnMut(&B) -> bool) -> Result<(), Stall> {
        wait_until(self.bus, self.policy, gate, ready)
    }

    /// Write `value` and wait until the field reads it back.
    pub fn write_confirmed(&self, field: Field, value: u32, gate: Gate) -> Result<(), Stall> {
        self.bus.write_field(field, value);
        self.bus.barrier();
        self.wait(gate, |b| b.read_field(field) == value)
    }

    /// Set a clock-enable bit, e.g. the PWR interface clock.
    pub fn enable_clock(&self, en: Field) {
        self.bus.set_bit(en);
        // Read back so the enable has taken effect before the block is used.
        let _ = self.bus.read(en.reg());
        self.bus.barrier();
    }

    /// Program flash wait states for the target frequency. Must precede the source switch.
    pub fn set_flash_latency(&mut self, latency: Field, ws: u32) -> Result<(), Stall> {
        self.write_confirmed(latency, ws, Gate::FlashLatency)?;
        self.latency = Some(ws);
        Ok(())
    }

    /// Turn an oscillator on and wait for it.
    pub fn enable_oscillator(&mut self, osc: Oscillator, on: Field, rdy: Field) -> Result<(), Stall> {
        self.advance(State::OscillatorEnabling);
        self.bus.set_bit(on);
        self.bus.barrier();
        self.wait(Gate::Oscillator(osc), |b| b.is_set(rdy))?;
        self.advance(State::OscillatorReady);
        Ok(())
    }

    /// Adjust an oscillator that is already running (e.g. an MSI range change).
    ///
    /// Only valid while the oscillator is ready; `rdy` is confirmed again after the change.
    pub fn retune_oscillator(
        &mut self,
        osc: Oscillator,
        rdy: Field,
        retune: impl FnOnce(&B),
    ) -> Result<(), Stall> {
        assert!(self.state == State::OscillatorReady, "rcc: oscillator not ready");
        retune(self.bus);
        self.bus.barrier();
        self.wait(Gate::Oscillator(osc), |b| b.is_set(rdy))
    }

    /// Program the PLL with `program`, turn it on and wait for lock.
    pub fn configure_pll(
        &mut self,
        program: impl FnOnce(&B),
        on: Field,
        rdy: Field,
    ) -> Result<(), Stall> {
        self.advance(State::MultiplierConfiguring);
        program(self.bus);
        self.bus.set_bit(on);
        self.bus.barrier();
        self.wait(Gate::Pll, |b| b.is_set(rdy))?;
        self.advance(State::MultiplierReady);
        Ok(())
    }

    /// Request `src` as system clock and wait for the status field to follow.
    ///
    /// # Panics
    ///
    /// Panics if no flash latency has been committed yet.
    pub fn switch_sysclk(&mut self, sw: Field, sws: Field, src: u32) -> Result<(), Stall> {
        assert!(
            self.latency.is_some(),
            "rcc: source switch before flash latency"
        );
        self.advance(State::SourceSwitching);
        self.bus.write_field(sw, src);
        self.bus.barrier();
        self.wait(Gate::SysclkSwitch { requested: src as u8 }, |b| {
            b.read_field(sws) == src
        })?;
        self.advance(State::SourceStable);
        Ok(())
    }

    /// Run the auxiliary 48 MHz phase.
    pub fn configure_aux(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), Stall>,
    ) -> Result<(), Stall> {
        self.advance(State::AuxiliaryConfiguring);
        f(self)?;
        self.bus.barrier();
        self.advance(State::AuxiliaryReady);
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.advance(State::Done);
    }
}

#[cfg(test)]
mod tests {
    use super::State::*;
    use super::*;

    #[test]
    fn no_backward_edges() {
        let all = [
            Unconfigured,
            OscillatorEnabling,
            OscillatorReady,
            MultiplierConfiguring,
            MultiplierReady,
            SourceSwitching,
            SourceStable,
            AuxiliaryConfiguring,
            AuxiliaryReady,
            Done,
        ];
        for (i, from) in all.iter().enumerate() {
            for to in &all[..=i] {
                let repeat_oscillator = *from == OscillatorReady && *to == OscillatorEnabling;
                assert_eq!(from.can_advance_to(*to), repeat_oscillator, "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn done_is_terminal() {
        assert!(!Done.can_advance_to(Unconfigured));
        assert!(!Done.can_advance_to(Done));
    }

    #[test]
    #[should_panic(expected = "source switch before flash latency")]
    fn switch_requires_committed_latency() {
        use crate::hsem::CoreId;
        use crate::pac::stm32l0::rcc;
        use crate::rcc::FamilyId;
        use crate::sim::Sim;

        let sim = Sim::new(FamilyId::Stm32l0);
        let bus = sim.bus(CoreId::Cpu1);
        let mut c = Configurator::new(&bus, PollPolicy::Unbounded);
        c.enable_oscillator(Oscillator::Hsi, rcc::cr::HSI16ON, rcc::cr::HSI16RDYF)
            .unwrap();
        let _ = c.switch_sysclk(rcc::cfgr::SW, rcc::cfgr::SWS, 1);
    }

    #[test]
    fn switch_requires_a_ready_source() {
        assert!(!Unconfigured.can_advance_to(SourceSwitching));
        assert!(!OscillatorEnabling.can_advance_to(SourceSwitching));
        assert!(!MultiplierConfiguring.can_advance_to(SourceSwitching));
        assert!(OscillatorReady.can_advance_to(SourceSwitching));
        assert!(MultiplierReady.can_advance_to(SourceSwitching));
    }
}
