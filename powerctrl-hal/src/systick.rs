//! 1 kHz system tick.

use core::cell::Cell;

use critical_section::Mutex;

use crate::pac::cm::scb::{shpr3, SHPR3};
use crate::pac::cm::systick::{ctrl, load, CTRL, LOAD, VAL};
use crate::regs::RegisterAccess;
use crate::time::Hertz;

/// Tick rate.
pub const TICK_HZ: u32 = 1_000;

/// Largest value the 24-bit SysTick reload register holds.
const MAX_RELOAD: u32 = 0x00FF_FFFF;

/// Exception priority as a logical level, 0 being the most urgent.
///
/// The level is placed in the implemented (upper) bits of the 8-bit priority byte, so the same
/// level means the same thing on a 2-bit Cortex-M0+ and a 4-bit Cortex-M4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Priority(u8);

impl Priority {
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    pub const fn level(self) -> u8 {
        self.0
    }

    /// Whether a core with `prio_bits` implemented bits can represent this level.
    pub const fn fits(self, prio_bits: u8) -> bool {
        (self.0 as u32) < (1u32 << prio_bits)
    }

    /// Raw byte for SHPR/IPR registers.
    pub const fn encode(self, prio_bits: u8) -> u8 {
        ((self.0 as u32) << (8 - prio_bits as u32)) as u8
    }
}

/// Reload count for a 1 kHz tick at a given core clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickPeriod {
    reload: u32,
}

impl TickPeriod {
    /// `None` if the core clock is below 1 kHz or too fast for the 24-bit counter.
    pub const fn try_new(core_clock: Hertz) -> Option<Self> {
        let reload = core_clock.0 / TICK_HZ;
        if reload == 0 || reload - 1 > MAX_RELOAD {
            None
        } else {
            Some(Self { reload })
        }
    }

    /// Panics (at compile time in a `const` context) if no valid reload exists.
    pub const fn new(core_clock: Hertz) -> Self {
        match Self::try_new(core_clock) {
            Some(p) => p,
            None => ::core::panic!("core clock gives no valid 1 kHz SysTick reload"),
        }
    }

    /// Core clock cycles per tick.
    pub const fn reload(self) -> u32 {
        self.reload
    }

    /// Value for the `LOAD` register. The counter wraps from 0 to `LOAD`, so one period is
    /// `LOAD + 1` cycles.
    pub const fn load_value(self) -> u32 {
        self.reload - 1
    }
}

static TICK_PRIORITY: Mutex<Cell<Option<Priority>>> = Mutex::new(Cell::new(None));

/// SysTick priority published for vendor code that re-arms the tick on its own.
pub fn tick_priority() -> Option<Priority> {
    critical_section::with(|cs| TICK_PRIORITY.borrow(cs).get())
}

pub(crate) fn publish_priority(priority: Priority) {
    critical_section::with(|cs| TICK_PRIORITY.borrow(cs).set(Some(priority)));
}

/// Program and start SysTick from the core clock.
pub fn arm<B: RegisterAccess>(bus: &B, period: TickPeriod, priority: Priority, prio_bits: u8) {
    bus.set_bit(ctrl::CLKSOURCE);
    bus.write(LOAD, load::RELOAD.val(period.load_value()));
    bus.write_field(shpr3::PRI_SYSTICK, priority.encode(prio_bits) as u32);
    bus.write(VAL, 0);
    bus.write(
        CTRL,
        ctrl::CLKSOURCE.mask() | ctrl::TICKINT.mask() | ctrl::ENABLE.mask(),
    );
    bus.barrier();
    debug!(
        "systick: reload {} priority {}",
        period.reload(),
        priority.level()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_is_cycles_per_millisecond() {
        for mhz in [32, 48, 64] {
            let p = TickPeriod::new(Hertz::mhz(mhz));
            assert_eq!(p.reload(), mhz * 1_000);
            assert_eq!(p.load_value(), mhz * 1_000 - 1);
        }
    }

    #[test]
    fn reload_rounds_down() {
        assert_eq!(TickPeriod::new(Hertz(2_097_000)).reload(), 2_097);
        assert_eq!(TickPeriod::new(Hertz(1_999)).reload(), 1);
    }

    #[test]
    fn degenerate_clocks_have_no_period() {
        assert_eq!(TickPeriod::try_new(Hertz(999)), None);
        assert_eq!(TickPeriod::try_new(Hertz(0)), None);
        assert_eq!(TickPeriod::try_new(Hertz(1_000)).map(|p| p.load_value()), Some(0));
    }

    #[test]
    fn priority_uses_upper_bits() {
        assert_eq!(Priority::new(0).encode(4), 0x00);
        assert_eq!(Priority::new(1).encode(4), 0x10);
        assert_eq!(Priority::new(3).encode(2), 0xC0);
        assert!(Priority::new(3).fits(2));
        assert!(!Priority::new(4).fits(2));
    }
}
