//! Hardware variant profiles.
//!
//! A [`Profile`] is the compile-time description of one way to clock a family: which
//! oscillator feeds the tree, how the PLL multiplies it, how many flash wait states the target
//! frequency needs, and where the 48 MHz USB/RNG clock comes from.

use crate::systick::TickPeriod;
use crate::time::Hertz;

use super::{pllmul_code, FamilyId, CLK48_FREQ};

/// Oscillator feeding the clock tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    /// Internal RC, 8 or 16 MHz depending on the family.
    Hsi,
    /// External crystal, or an external clock when `bypass` is set.
    Hse { bypass: bool },
    /// Internal 48 MHz RC.
    Hsi48,
    /// Multi-speed internal RC at `range`.
    Msi { range: u8 },
}

/// Ratios of the multiplier/divider stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllRatios {
    /// `in / prediv * mul / div` (F0, L0, L1).
    MulDiv { prediv: u8, mul: u8, div: u8 },
    /// `in / m * n`, then one divider per output (G0, WB). Outputs with `None` stay disabled.
    Mnpqr {
        m: u8,
        n: u8,
        p: Option<u8>,
        q: Option<u8>,
        r: u8,
    },
}

/// Multiplier/divider stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pll {
    /// Legal PLL input frequency range, after the input divider.
    pub input_min: Hertz,
    pub input_max: Hertz,
    pub ratios: PllRatios,
}

impl Pll {
    /// Frequency entering the multiplier.
    pub const fn input(&self, source: Hertz) -> Hertz {
        match self.ratios {
            PllRatios::MulDiv { prediv, .. } => Hertz(source.0 / prediv as u32),
            PllRatios::Mnpqr { m, .. } => Hertz(source.0 / m as u32),
        }
    }

    /// Multiplier output before the output dividers.
    pub const fn vco(&self, source: Hertz) -> Hertz {
        let input = self.input(source);
        match self.ratios {
            PllRatios::MulDiv { mul, .. } => Hertz(input.0 * mul as u32),
            PllRatios::Mnpqr { n, .. } => Hertz(input.0 * n as u32),
        }
    }

    /// System clock output.
    pub const fn output(&self, source: Hertz) -> Hertz {
        let vco = self.vco(source);
        match self.ratios {
            PllRatios::MulDiv { div, .. } => Hertz(vco.0 / div as u32),
            PllRatios::Mnpqr { r, .. } => Hertz(vco.0 / r as u32),
        }
    }

    /// `Q` output, if enabled.
    pub const fn q_output(&self, source: Hertz) -> Option<Hertz> {
        match self.ratios {
            PllRatios::Mnpqr { q: Some(q), .. } => Some(Hertz(self.vco(source).0 / q as u32)),
            _ => None,
        }
    }

    const fn check(&self, source: Hertz) {
        match self.ratios {
            PllRatios::MulDiv { prediv, mul, div } => {
                if prediv == 0 || mul == 0 || div == 0 {
                    ::core::panic!("PLL ratios must be non-zero");
                }
            }
            PllRatios::Mnpqr { m, n, p, q, r } => {
                if m == 0 || n == 0 || r == 0 {
                    ::core::panic!("PLL ratios must be non-zero");
                }
                if let Some(0) = p {
                    ::core::panic!("PLL ratios must be non-zero");
                }
                if let Some(0) = q {
                    ::core::panic!("PLL ratios must be non-zero");
                }
            }
        }
        let input = self.input(source).0;
        if input < self.input_min.0 || input > self.input_max.0 {
            ::core::panic!("PLL input frequency out of range");
        }
    }
}

/// Clock recovery (CRS) settings for trimming HSI48 against the USB start-of-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrsSync {
    /// Initial HSI48 trim.
    pub trim: u8,
    /// Frequency error limit.
    pub felim: u8,
    /// `SYNCSRC`: 0 GPIO, 1 LSE, 2 USB SOF.
    pub sync_src: u8,
    /// Counter reload, `f_target / f_sync - 1`.
    pub reload: u16,
}

impl CrsSync {
    /// Trim against the 1 kHz USB SOF, starting from the middle of a 6-bit trim range.
    pub const USB_SOF: Self = Self {
        trim: 0x20,
        felim: 0x22,
        sync_src: 2,
        reload: (48_000_000 / 1_000 - 1) as u16,
    };

    pub const fn with_trim(mut self, trim: u8) -> Self {
        self.trim = trim;
        self
    }
}

/// Origin of the 48 MHz USB/RNG clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Aux48 {
    /// The family has no 48 MHz domain in this profile.
    None,
    /// Separate HSI48 oscillator, trimmed by CRS when USB is in use and `crs` is given.
    Hsi48 { crs: Option<CrsSync> },
    /// PLL `Q` output.
    PllQ,
    /// PLL VCO divided by two.
    PllVco,
}

/// Compile-time description of one clock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Profile {
    pub name: &'static str,
    /// Family whose register sequence can program this profile.
    pub family: FamilyId,
    pub source: Source,
    /// Nominal frequency of `source`.
    pub source_hz: Hertz,
    /// `None` when the oscillator drives SYSCLK directly.
    pub pll: Option<Pll>,
    pub target: Hertz,
    /// Flash wait states at `target`.
    pub flash_latency: u8,
    pub aux48: Aux48,
}

impl Profile {
    /// Frequency the profile actually produces.
    pub const fn sysclk(&self) -> Hertz {
        match &self.pll {
            Some(pll) => pll.output(self.source_hz),
            None => self.source_hz,
        }
    }

    /// Frequency of the 48 MHz domain, if the profile derives one.
    pub const fn clk48(&self) -> Option<Hertz> {
        match (self.aux48, &self.pll) {
            (Aux48::None, _) => None,
            (Aux48::Hsi48 { .. }, _) => Some(CLK48_FREQ),
            (Aux48::PllQ, Some(pll)) => pll.q_output(self.source_hz),
            (Aux48::PllVco, Some(pll)) => Some(Hertz(pll.vco(self.source_hz).0 / 2)),
            (_, None) => None,
        }
    }

    /// Validate the profile. Panics on inconsistent constants, or on a source, PLL or 48 MHz
    /// origin its family cannot program. At compile time in a `const` context.
    pub const fn check(&self) {
        self.check_family();
        if let Some(pll) = &self.pll {
            pll.check(self.source_hz);
        }
        if self.sysclk().0 != self.target.0 {
            ::core::panic!("profile does not reach its target frequency");
        }
        if TickPeriod::try_new(self.target).is_none() {
            ::core::panic!("profile target gives no valid SysTick reload");
        }
        match self.aux48 {
            Aux48::None => {}
            _ => match self.clk48() {
                Some(f) if f.0 == CLK48_FREQ.0 => {}
                _ => ::core::panic!("48 MHz domain is not 48 MHz"),
            },
        }
    }

    pub const fn checked(self) -> Self {
        self.check();
        self
    }

    const fn check_family(&self) {
        use FamilyId::*;

        let source_ok = match self.family {
            Stm32f0 => matches!(self.source, Source::Hsi | Source::Hse { .. } | Source::Hsi48),
            Stm32g0 | Stm32l0 | Stm32l1 => matches!(self.source, Source::Hsi | Source::Hse { .. }),
            Stm32wb => matches!(self.source, Source::Hse { bypass: false }),
            Stm32wl => matches!(self.source, Source::Msi { range } if range <= 11),
        };
        if !source_ok {
            ::core::panic!("oscillator not supported on this family");
        }

        let pll_ok = match (self.family, &self.pll) {
            (Stm32f0, None) | (Stm32wl, None) => true,
            (Stm32f0, Some(pll)) => match pll.ratios {
                PllRatios::MulDiv { prediv, mul, div } => {
                    prediv <= 16 && mul >= 2 && mul <= 16 && div == 1
                }
                PllRatios::Mnpqr { .. } => false,
            },
            (Stm32l0 | Stm32l1, Some(pll)) => match pll.ratios {
                PllRatios::MulDiv { prediv, mul, div } => {
                    prediv == 1 && pllmul_code(mul).is_some() && div >= 2 && div <= 4
                }
                PllRatios::Mnpqr { .. } => false,
            },
            (Stm32g0 | Stm32wb, Some(pll)) => matches!(pll.ratios, PllRatios::Mnpqr { .. }),
            _ => false,
        };
        if !pll_ok {
            ::core::panic!("PLL layout not supported on this family");
        }

        let aux_ok = match (self.family, self.aux48) {
            (_, Aux48::None) => true,
            (Stm32f0 | Stm32g0 | Stm32l0, Aux48::Hsi48 { .. }) => true,
            (Stm32l1, Aux48::PllVco) => true,
            (Stm32wb, Aux48::PllQ) => true,
            _ => false,
        };
        if !aux_ok {
            ::core::panic!("48 MHz origin not supported on this family");
        }
    }

    pub const fn has_clk48(&self) -> bool {
        !matches!(self.aux48, Aux48::None)
    }
}
