//! Clock types, constants, and global state.

use core::cell::Cell;
use core::ops;

use critical_section::Mutex;

use crate::time::Hertz;

// =============================================================================
// Global Clock State
// =============================================================================

/// Clocks published by the last completed bring-up.
static CLOCK_FREQS: Mutex<Cell<Option<Clocks>>> = Mutex::new(Cell::new(None));

/// Publish the clock frequencies read back after configuration.
pub(crate) fn set_freqs(freqs: Clocks) {
    debug!(
        "rcc: sysclk {} hclk {}",
        freqs.sysclk.0,
        freqs.hclk.0
    );
    critical_section::with(|cs| CLOCK_FREQS.borrow(cs).set(Some(freqs)));
}

/// Clocks published by bring-up, or `None` before it completed.
pub fn try_clocks() -> Option<Clocks> {
    critical_section::with(|cs| CLOCK_FREQS.borrow(cs).get())
}

/// Get the current clock configuration.
///
/// # Panics
///
/// Panics if called before bring-up.
pub fn clocks() -> Clocks {
    match try_clocks() {
        Some(c) => c,
        None => panic!("rcc: clocks() called before bring-up"),
    }
}

/// Current core (HCLK) frequency, the value CMSIS keeps in `SystemCoreClock`.
///
/// # Panics
///
/// Panics if called before bring-up.
pub fn core_clock() -> Hertz {
    clocks().hclk
}

// =============================================================================
// Constants
// =============================================================================

pub const CLK_HSI8_FREQ: Hertz = Hertz(8_000_000);
pub const CLK_HSI16_FREQ: Hertz = Hertz(16_000_000);
pub const CLK_HSI48_FREQ: Hertz = Hertz(48_000_000);
// WB/WL radio crystal
pub const CLK_HSE32_FREQ: Hertz = Hertz(32_000_000);
// L0/L1 MSI after reset, range 5
pub const CLK_MSI_RESET_FREQ: Hertz = Hertz(2_097_000);
/// USB and RNG kernel clock.
pub const CLK48_FREQ: Hertz = Hertz(48_000_000);

/// MSI frequencies by `MSIRANGE` on WB/WL.
pub const MSI_RANGES: [Hertz; 12] = [
    Hertz(100_000),
    Hertz(200_000),
    Hertz(400_000),
    Hertz(800_000),
    Hertz(1_000_000),
    Hertz(2_000_000),
    Hertz(4_000_000),
    Hertz(8_000_000),
    Hertz(16_000_000),
    Hertz(24_000_000),
    Hertz(32_000_000),
    Hertz(48_000_000),
];

// =============================================================================
// Prescalers
// =============================================================================

/// `PLLMUL` factors on L0/L1, indexed by field value.
pub const PLLMUL_FACTORS: [u8; 9] = [3, 4, 6, 8, 12, 16, 24, 32, 48];

/// `PLLMUL` field value for a multiplication factor.
pub(crate) const fn pllmul_code(mul: u8) -> Option<u32> {
    let mut i = 0;
    while i < PLLMUL_FACTORS.len() {
        if PLLMUL_FACTORS[i] == mul {
            return Some(i as u32);
        }
        i += 1;
    }
    None
}

/// Factor selected by a `PLLMUL` field value; reserved codes read as the largest factor.
pub(crate) const fn pllmul_factor(code: u32) -> u32 {
    if (code as usize) < PLLMUL_FACTORS.len() {
        PLLMUL_FACTORS[code as usize] as u32
    } else {
        48
    }
}

/// AHB prescaler, as a divisor decoded from `HPRE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AhbPrescaler(u16);

impl AhbPrescaler {
    /// F0, G0, L0, L1: 0..=7 pass the clock through, 8..=15 divide by 2, 4, 8, 16, 64, 128,
    /// 256, 512.
    const POW2: [u16; 16] = [1, 1, 1, 1, 1, 1, 1, 1, 2, 4, 8, 16, 64, 128, 256, 512];
    /// WB, WL: 1, 2, 5, 6, 7 divide by 3, 5, 6, 10, 32. 3 and 4 are reserved and read as 1.
    const EXTENDED: [u16; 16] = [1, 3, 5, 1, 1, 6, 10, 32, 2, 4, 8, 16, 64, 128, 256, 512];

    /// Decode `HPRE` on a family with power-of-two dividers only.
    pub const fn from_hpre(hpre: u32) -> Self {
        Self(Self::POW2[(hpre & 0xF) as usize])
    }

    /// Decode `HPRE` on a family that also has the odd dividers (WB, WL).
    pub const fn from_hpre_extended(hpre: u32) -> Self {
        Self(Self::EXTENDED[(hpre & 0xF) as usize])
    }

    pub const fn divisor(self) -> u32 {
        self.0 as u32
    }
}

#[allow(clippy::suspicious_arithmetic_impl)]
impl ops::Div<AhbPrescaler> for Hertz {
    type Output = Hertz;
    fn div(self, rhs: AhbPrescaler) -> Self::Output {
        Hertz(self.0 / rhs.divisor())
    }
}

// =============================================================================
// Clocks struct
// =============================================================================

/// Clock frequencies after bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    pub sysclk: Hertz,
    /// AHB clock, which is also the core clock.
    pub hclk: Hertz,
    /// USB/RNG 48 MHz domain, if running.
    pub clk48: Option<Hertz>,
}

impl Clocks {
    pub(crate) const fn new(sysclk: Hertz, hpre: AhbPrescaler) -> Self {
        Self {
            sysclk,
            hclk: Hertz(sysclk.0 / hpre.divisor()),
            clk48: None,
        }
    }

    pub(crate) const fn with_clk48(mut self, clk48: Option<Hertz>) -> Self {
        self.clk48 = clk48;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hpre_encodings() {
        let f = Hertz::mhz(64);
        assert_eq!(f / AhbPrescaler::from_hpre(0b0011), f);
        assert_eq!(f / AhbPrescaler::from_hpre(0b1000), Hertz::mhz(32));
        assert_eq!(f / AhbPrescaler::from_hpre(0b1111), Hertz(125_000));

        assert_eq!(f / AhbPrescaler::from_hpre_extended(0b0001), Hertz(21_333_333));
        assert_eq!(f / AhbPrescaler::from_hpre_extended(0b0111), Hertz(2_000_000));
        assert_eq!(f / AhbPrescaler::from_hpre_extended(0b0011), f);
        assert_eq!(f / AhbPrescaler::from_hpre_extended(0b1001), Hertz::mhz(16));
    }
}
