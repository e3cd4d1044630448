//! Reset and clock control.
//!
//! Each supported silicon family is a zero-sized type implementing [`Family`]. The family
//! supplies its profiles as `const` data and the register writes of each step; the shared
//! [`Configurator`] enforces the order and the readiness handshakes.

mod clock;
pub use clock::*;
mod profile;
pub use profile::*;
mod configurator;
pub use configurator::*;

mod stm32f0;
mod stm32g0;
mod stm32l0;
mod stm32l1;
mod stm32wb;
mod stm32wl;
pub use stm32f0::Stm32f0;
pub use stm32g0::Stm32g0;
pub use stm32l0::Stm32l0;
pub use stm32l1::Stm32l1;
pub use stm32wb::Stm32wb;
pub use stm32wl::Stm32wl;

#[cfg(test)]
mod tests;

use crate::early_init::{EntryPath, ResetSnapshot};
use crate::poll::Stall;
use crate::regs::{Reg, RegisterAccess};
use crate::Config;

/// Supported silicon families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FamilyId {
    Stm32f0,
    Stm32g0,
    Stm32l0,
    Stm32l1,
    Stm32wb,
    Stm32wl,
}

impl FamilyId {
    pub const ALL: [FamilyId; 6] = [
        FamilyId::Stm32f0,
        FamilyId::Stm32g0,
        FamilyId::Stm32l0,
        FamilyId::Stm32l1,
        FamilyId::Stm32wb,
        FamilyId::Stm32wl,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            FamilyId::Stm32f0 => "stm32f0",
            FamilyId::Stm32g0 => "stm32g0",
            FamilyId::Stm32l0 => "stm32l0",
            FamilyId::Stm32l1 => "stm32l1",
            FamilyId::Stm32wb => "stm32wb",
            FamilyId::Stm32wl => "stm32wl",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

pub(crate) trait SealedFamily {}

/// A silicon family's clock bring-up.
#[allow(private_bounds)]
pub trait Family: SealedFamily + 'static {
    const ID: FamilyId;

    /// Implemented NVIC priority bits.
    const NVIC_PRIO_BITS: u8;

    /// Whether vendor code on this family reads the SysTick priority back.
    const PUBLISH_TICK_PRIORITY: bool = false;

    /// `RCC_CR` and `RCC_CFGR`, captured at reset.
    const RCC_CR: Reg;
    const RCC_CFGR: Reg;

    /// Clock interrupt enable register.
    const CLOCK_IRQ_ENABLE: Reg;

    /// Every profile of this family.
    const PROFILES: &'static [Profile];

    /// Profile selected by the `clk-*` Cargo features.
    fn default_profile() -> Profile;

    /// Decide how to treat the first entry after reset.
    fn classify(_snapshot: &ResetSnapshot) -> EntryPath {
        EntryPath::ColdStartPath
    }

    /// Take inter-core locks before the first RCC access.
    fn acquire<B: RegisterAccess>(_bus: &B, _config: &Config) -> Result<(), Stall> {
        Ok(())
    }

    /// Run the clock tree sequence, ending in `SourceStable` or `AuxiliaryReady`.
    fn configure<B: RegisterAccess>(c: &mut Configurator<'_, B>, config: &Config)
        -> Result<(), Stall>;

    /// Release what [`acquire`](Self::acquire) took.
    fn release<B: RegisterAccess>(_bus: &B, _config: &Config) {}

    /// Clock frequencies as configured in hardware. `profile` supplies the HSE frequency,
    /// which cannot be read back.
    fn read_clocks<B: RegisterAccess>(bus: &B, profile: &Profile) -> Clocks;

    /// Look up a profile by name.
    fn profile(name: &str) -> Option<Profile> {
        Self::PROFILES.iter().find(|p| p.name == name).copied()
    }
}

/// Whether the aux 48 MHz domain must be brought up.
pub(crate) fn wants_clk48(config: &Config) -> bool {
    (config.usb || config.rng) && config.profile.has_clk48()
}
