//! STM32F0: 48 MHz SYSCLK through the PLL, from HSI48, HSE or HSI.

use crate::pac::stm32f0::{flash, rcc};
use crate::poll::{Gate, Oscillator, Stall};
use crate::regs::{Reg, RegisterAccess};
use crate::time::Hertz;
use crate::Config;

use super::{
    wants_clk48, AhbPrescaler, Aux48, Clocks, Configurator, Family, FamilyId, Pll, PllRatios,
    Profile, SealedFamily, Source, CLK48_FREQ, CLK_HSI48_FREQ, CLK_HSI8_FREQ,
};

/// STM32F0 family.
pub struct Stm32f0;

const fn pll(prediv: u8, mul: u8) -> Option<Pll> {
    Some(Pll {
        input_min: Hertz::mhz(1),
        input_max: Hertz::mhz(24),
        ratios: PllRatios::MulDiv {
            prediv,
            mul,
            div: 1,
        },
    })
}

const fn hse_8mhz(name: &'static str, bypass: bool) -> Profile {
    Profile {
        name,
        family: FamilyId::Stm32f0,
        source: Source::Hse { bypass },
        source_hz: Hertz::mhz(8),
        pll: pll(1, 6),
        target: Hertz::mhz(48),
        flash_latency: 1,
        aux48: Aux48::Hsi48 { crs: None },
    }
    .checked()
}

impl Stm32f0 {
    /// HSI48 / 2 * 2. SYSCLK cannot select HSI48 directly through the vendor layer, so the PLL
    /// is kept in the path.
    pub const HSI48: Profile = Profile {
        name: "hsi48",
        family: FamilyId::Stm32f0,
        source: Source::Hsi48,
        source_hz: CLK_HSI48_FREQ,
        pll: pll(2, 2),
        target: Hertz::mhz(48),
        flash_latency: 1,
        aux48: Aux48::Hsi48 { crs: None },
    }
    .checked();

    /// 8 MHz crystal * 6.
    pub const HSE_8MHZ: Profile = hse_8mhz("hse", false);

    /// 8 MHz external clock * 6.
    pub const HSE_BYPASS_8MHZ: Profile = hse_8mhz("hse-bypass", true);

    /// HSI 8 MHz * 6.
    pub const HSI: Profile = Profile {
        name: "hsi",
        family: FamilyId::Stm32f0,
        source: Source::Hsi,
        source_hz: CLK_HSI8_FREQ,
        pll: pll(1, 6),
        target: Hertz::mhz(48),
        flash_latency: 1,
        aux48: Aux48::Hsi48 { crs: None },
    }
    .checked();
}

impl SealedFamily for Stm32f0 {}

impl Family for Stm32f0 {
    const ID: FamilyId = FamilyId::Stm32f0;
    const NVIC_PRIO_BITS: u8 = crate::pac::stm32f0::NVIC_PRIO_BITS;

    const RCC_CR: Reg = rcc::CR;
    const RCC_CFGR: Reg = rcc::CFGR;
    const CLOCK_IRQ_ENABLE: Reg = rcc::CIR;

    const PROFILES: &'static [Profile] = &[
        Self::HSI48,
        Self::HSE_8MHZ,
        Self::HSE_BYPASS_8MHZ,
        Self::HSI,
    ];

    fn default_profile() -> Profile {
        if cfg!(feature = "clk-hse-bypass") {
            Self::HSE_BYPASS_8MHZ
        } else if cfg!(feature = "clk-hse") {
            Self::HSE_8MHZ
        } else if cfg!(feature = "clk-hsi") {
            Self::HSI
        } else {
            Self::HSI48
        }
    }

    fn configure<B: RegisterAccess>(
        c: &mut Configurator<'_, B>,
        config: &Config,
    ) -> Result<(), Stall> {
        let p = &config.profile;
        let bus = c.bus();

        c.enable_clock(rcc::apb1enr::PWREN);
        c.set_flash_latency(flash::acr::LATENCY, p.flash_latency as u32)?;

        // PLLSRC: 1 = HSI/PREDIV, 2 = HSE/PREDIV, 3 = HSI48/PREDIV. SW uses 0/1/3 directly.
        let (pllsrc, direct_sw) = match p.source {
            Source::Hsi48 => {
                c.enable_oscillator(Oscillator::Hsi48, rcc::cr2::HSI48ON, rcc::cr2::HSI48RDY)?;
                (3, 3)
            }
            Source::Hse { bypass } => {
                if bypass {
                    bus.set_bit(rcc::cr::HSEBYP);
                }
                c.enable_oscillator(Oscillator::Hse, rcc::cr::HSEON, rcc::cr::HSERDY)?;
                (2, 1)
            }
            Source::Hsi => {
                c.enable_oscillator(Oscillator::Hsi, rcc::cr::HSION, rcc::cr::HSIRDY)?;
                (1, 0)
            }
            Source::Msi { .. } => panic!("rcc: stm32f0 has no MSI"),
        };

        let sw = match p.pll {
            Some(Pll {
                ratios: PllRatios::MulDiv { prediv, mul, .. },
                ..
            }) => {
                c.configure_pll(
                    |b| {
                        b.write(
                            rcc::CFGR,
                            rcc::cfgr::PLLMUL.val(mul as u32 - 2) | rcc::cfgr::PLLSRC.val(pllsrc),
                        );
                        b.write(rcc::CFGR2, rcc::cfgr2::PREDIV.val(prediv as u32 - 1));
                    },
                    rcc::cr::PLLON,
                    rcc::cr::PLLRDY,
                )?;
                2
            }
            Some(_) => panic!("rcc: stm32f0 PLL takes prediv/mul ratios"),
            None => direct_sw,
        };

        c.switch_sysclk(rcc::cfgr::SW, rcc::cfgr::SWS, sw)?;

        if wants_clk48(config) {
            c.configure_aux(|c| {
                c.bus().set_bit(rcc::cr2::HSI48ON);
                c.bus().barrier();
                c.wait(Gate::Aux48, |b| b.is_set(rcc::cr2::HSI48RDY))
            })?;
        }
        Ok(())
    }

    fn read_clocks<B: RegisterAccess>(bus: &B, profile: &Profile) -> Clocks {
        let cfgr = bus.read(rcc::CFGR);
        let hse = profile.source_hz;
        let sysclk = match rcc::cfgr::SWS.get(cfgr) {
            0 => CLK_HSI8_FREQ,
            1 => hse,
            2 => {
                let mul = (rcc::cfgr::PLLMUL.get(cfgr) + 2).min(16);
                let prediv = bus.read_field(rcc::cfgr2::PREDIV) + 1;
                let input = match rcc::cfgr::PLLSRC.get(cfgr) {
                    0 => CLK_HSI8_FREQ / 2,
                    1 => CLK_HSI8_FREQ / prediv,
                    2 => hse / prediv,
                    _ => CLK_HSI48_FREQ / prediv,
                };
                input * mul
            }
            _ => CLK_HSI48_FREQ,
        };
        let clk48 = bus.is_set(rcc::cr2::HSI48RDY).then_some(CLK48_FREQ);
        Clocks::new(sysclk, AhbPrescaler::from_hpre(rcc::cfgr::HPRE.get(cfgr))).with_clk48(clk48)
    }
}
