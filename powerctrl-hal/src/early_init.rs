//! First code after reset: decide between a cold start and a low-power resume.
//!
//! On dual-core parts the second core may wake from standby with HSI already driving SYSCLK.
//! Touching the oscillators then would pull the clock from under the other core, so the resume
//! path restores only core-local state and returns.

use crate::pac::cm::scb::{cpacr, CPACR};
use crate::rcc::Family;
use crate::regs::RegisterAccess;

/// `RCC_CR` and `RCC_CFGR` as found at reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetSnapshot {
    pub rcc_cr: u32,
    pub rcc_cfgr: u32,
}

impl ResetSnapshot {
    /// Read the snapshot. Must run before anything writes RCC.
    pub fn capture<F: Family, B: RegisterAccess>(bus: &B) -> Self {
        Self {
            rcc_cr: bus.read(F::RCC_CR),
            rcc_cfgr: bus.read(F::RCC_CFGR),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryPath {
    /// A clock is already running; leave the clock tree alone.
    ResumeFastPath,
    /// Full bring-up follows.
    ColdStartPath,
}

/// Classify the reset and run the matching path.
///
/// On the cold path `system_init` (the vendor `SystemInit`) runs exactly once. The clock tree
/// itself is configured later by [`crate::init`].
pub fn early_init<F: Family, B: RegisterAccess>(
    bus: &B,
    snapshot: &ResetSnapshot,
    fpu: bool,
    system_init: impl FnOnce(),
) -> EntryPath {
    let path = F::classify(snapshot);
    match path {
        EntryPath::ResumeFastPath => resume::<F, B>(bus, fpu),
        EntryPath::ColdStartPath => system_init(),
    }
    path
}

/// Classify the current RCC state the way [`early_init`] did at reset.
///
/// The resume path leaves `RCC_CR` and `RCC_CFGR` untouched, so until the clock tree is
/// configured this tells `main` whether to skip [`crate::init`].
pub fn entry_path<F: Family, B: RegisterAccess>(bus: &B) -> EntryPath {
    F::classify(&ResetSnapshot::capture::<F, B>(bus))
}

fn resume<F: Family, B: RegisterAccess>(bus: &B, fpu: bool) {
    if fpu {
        // CP10 and CP11 full access
        bus.modify(CPACR, |r| r | cpacr::CP10.val(0b11) | cpacr::CP11.val(0b11));
    }
    bus.write(F::CLOCK_IRQ_ENABLE, 0);
    bus.barrier();
}
