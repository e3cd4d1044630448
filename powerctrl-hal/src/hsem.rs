//! Hardware semaphores (HSEM) of dual-core parts.
//!
//! Both cores share the RCC block and the CLK48 mux. Each side takes the matching semaphore
//! before touching them. The lock only protects anything if the other core's firmware follows
//! the same protocol: it must take [`RCC_SEMID`] before writing RCC, and must not reconfigure
//! CLK48 while [`CLK48_SEMID`] is held by someone else.

use crate::pac::stm32wb::hsem::{r, rlr, R, RLR};
use crate::poll::{wait_until, Gate, PollPolicy, Stall};
use crate::regs::RegisterAccess;

/// Semaphore guarding the RCC registers.
pub const RCC_SEMID: u8 = 3;
/// Semaphore guarding the CLK48 source selection.
pub const CLK48_SEMID: u8 = 5;

/// Bus master identity as seen by HSEM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreId {
    /// Application core (Cortex-M4).
    #[default]
    Cpu1,
    /// Radio core (Cortex-M0+).
    Cpu2,
}

impl CoreId {
    /// Value of the `COREID` field for this core.
    pub const fn raw(self) -> u32 {
        match self {
            CoreId::Cpu1 => 4,
            CoreId::Cpu2 => 8,
        }
    }
}

/// HSEM access on behalf of one core.
pub struct Hsem<'a, B: RegisterAccess> {
    bus: &'a B,
    core: CoreId,
}

impl<'a, B: RegisterAccess> Hsem<'a, B> {
    pub fn new(bus: &'a B, core: CoreId) -> Self {
        Self { bus, core }
    }

    /// One attempt at a one-step lock (read of `RLR`).
    ///
    /// Returns `true` if the semaphore is now held by this core, with process id 0.
    pub fn try_lock(&self, id: u8) -> bool {
        let v = self.bus.read(RLR.at(id as u32));
        v == rlr::LOCK.mask() | rlr::COREID.val(self.core.raw())
    }

    /// Busy-poll until the semaphore is ours.
    pub fn lock(&self, id: u8, policy: PollPolicy) -> Result<(), Stall> {
        wait_until(self.bus, policy, Gate::Semaphore(id), |_| self.try_lock(id))?;
        trace!("hsem: locked {}", id);
        Ok(())
    }

    /// Release a semaphore taken with [`lock`](Self::lock).
    pub fn release(&self, id: u8) {
        self.bus.barrier();
        self.bus
            .write(R.at(id as u32), r::COREID.val(self.core.raw()) | r::PROCID.val(0));
        trace!("hsem: released {}", id);
    }

    /// Whether `id` is currently held by this core.
    pub fn is_held(&self, id: u8) -> bool {
        let v = self.bus.read(R.at(id as u32));
        v & r::LOCK.mask() != 0 && r::COREID.get(v) == self.core.raw()
    }
}
