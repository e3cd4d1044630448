//! STM32L1: 32 MHz from HSI16 or a bypassed 8 MHz HSE, with the PLL VCO at 96 MHz so that
//! USB gets VCO / 2.

use crate::pac::stm32l1::{dbgmcu, flash, pwr, rcc};
use crate::poll::{Gate, Oscillator, Stall};
use crate::regs::{Reg, RegisterAccess};
use crate::time::Hertz;
use crate::Config;

use super::{
    pllmul_code, pllmul_factor, wants_clk48, AhbPrescaler, Aux48, Clocks, Configurator, Family,
    FamilyId, Pll, PllRatios, Profile, SealedFamily, Source, CLK_HSI16_FREQ, CLK_MSI_RESET_FREQ,
};

/// STM32L1 family.
pub struct Stm32l1;

const fn pll(mul: u8, div: u8) -> Option<Pll> {
    Some(Pll {
        input_min: Hertz::mhz(2),
        input_max: Hertz::mhz(24),
        ratios: PllRatios::MulDiv {
            prediv: 1,
            mul,
            div,
        },
    })
}

impl Stm32l1 {
    /// HSI16 * 6 / 3.
    pub const HSI: Profile = Profile {
        name: "hsi",
        family: FamilyId::Stm32l1,
        source: Source::Hsi,
        source_hz: CLK_HSI16_FREQ,
        pll: pll(6, 3),
        target: Hertz::mhz(32),
        flash_latency: 1,
        aux48: Aux48::PllVco,
    }
    .checked();

    /// 8 MHz external clock * 12 / 3.
    pub const HSE_BYPASS_8MHZ: Profile = Profile {
        name: "hse-bypass",
        family: FamilyId::Stm32l1,
        source: Source::Hse { bypass: true },
        source_hz: Hertz::mhz(8),
        pll: pll(12, 3),
        target: Hertz::mhz(32),
        flash_latency: 1,
        aux48: Aux48::PllVco,
    }
    .checked();
}

impl SealedFamily for Stm32l1 {}

impl Family for Stm32l1 {
    const ID: FamilyId = FamilyId::Stm32l1;
    const NVIC_PRIO_BITS: u8 = crate::pac::stm32l1::NVIC_PRIO_BITS;

    const RCC_CR: Reg = rcc::CR;
    const RCC_CFGR: Reg = rcc::CFGR;
    const CLOCK_IRQ_ENABLE: Reg = rcc::CIR;

    const PROFILES: &'static [Profile] = &[Self::HSI, Self::HSE_BYPASS_8MHZ];

    fn default_profile() -> Profile {
        if cfg!(feature = "clk-hse") {
            Self::HSE_BYPASS_8MHZ
        } else {
            Self::HSI
        }
    }

    fn configure<B: RegisterAccess>(
        c: &mut Configurator<'_, B>,
        config: &Config,
    ) -> Result<(), Stall> {
        let p = &config.profile;
        let bus = c.bus();

        c.enable_clock(rcc::apb1enr::PWREN);

        // Range 1 (1.8 V) is needed above 16 MHz.
        bus.write_field(pwr::cr::VOS, 0b01);
        bus.barrier();
        c.wait(Gate::VoltageScaling, |b| !b.is_set(pwr::csr::VOSF))?;

        // 64-bit access has to be on before the wait state can be set.
        bus.write(flash::ACR, flash::acr::ACC64.mask());
        bus.barrier();
        c.set_flash_latency(flash::acr::LATENCY, p.flash_latency as u32)?;

        // PLLSRC: 0 = HSI, 1 = HSE.
        let pllsrc = match p.source {
            Source::Hsi => {
                c.enable_oscillator(Oscillator::Hsi, rcc::cr::HSION, rcc::cr::HSIRDY)?;
                0
            }
            Source::Hse { bypass } => {
                if bypass {
                    bus.set_bit(rcc::cr::HSEBYP);
                }
                c.enable_oscillator(Oscillator::Hse, rcc::cr::HSEON, rcc::cr::HSERDY)?;
                1
            }
            _ => panic!("rcc: stm32l1 clocks from HSI or HSE"),
        };

        let Some(Pll {
            ratios: PllRatios::MulDiv { mul, div, .. },
            ..
        }) = p.pll
        else {
            panic!("rcc: stm32l1 profiles use the mul/div PLL")
        };
        let Some(mul_code) = pllmul_code(mul) else {
            panic!("rcc: unsupported PLLMUL factor")
        };

        c.configure_pll(
            |b| {
                b.write(
                    rcc::CFGR,
                    rcc::cfgr::PLLSRC.val(pllsrc)
                        | rcc::cfgr::PLLMUL.val(mul_code)
                        | rcc::cfgr::PLLDIV.val(div as u32 - 1),
                );
            },
            rcc::cr::PLLON,
            rcc::cr::PLLRDY,
        )?;

        // 3 = PLL
        c.switch_sysclk(rcc::cfgr::SW, rcc::cfgr::SWS, 3)?;

        // USB takes VCO / 2 with no mux; checking the profile was all there was to do.
        if wants_clk48(config) {
            c.configure_aux(|_| Ok(()))?;
        }

        // The debug module in low-power modes can hard fault after WFI.
        if cfg!(debug_assertions) {
            bus.modify(dbgmcu::CR, |r| {
                r & !(dbgmcu::cr::DBG_SLEEP.mask()
                    | dbgmcu::cr::DBG_STOP.mask()
                    | dbgmcu::cr::DBG_STANDBY.mask())
            });
        }
        Ok(())
    }

    fn read_clocks<B: RegisterAccess>(bus: &B, profile: &Profile) -> Clocks {
        let cfgr = bus.read(rcc::CFGR);
        let input = match rcc::cfgr::PLLSRC.get(cfgr) {
            0 => CLK_HSI16_FREQ,
            _ => profile.source_hz,
        };
        let vco = input * pllmul_factor(rcc::cfgr::PLLMUL.get(cfgr));
        let sysclk = match rcc::cfgr::SWS.get(cfgr) {
            0 => CLK_MSI_RESET_FREQ,
            1 => CLK_HSI16_FREQ,
            2 => profile.source_hz,
            _ => vco / (rcc::cfgr::PLLDIV.get(cfgr) + 1),
        };
        let clk48 = bus.is_set(rcc::cr::PLLRDY).then_some(vco / 2);
        Clocks::new(sysclk, AhbPrescaler::from_hpre(rcc::cfgr::HPRE.get(cfgr))).with_clk48(clk48)
    }
}
