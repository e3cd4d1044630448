//! STM32G0: HSI16 and the PLL at 64 MHz, HSI48 with CRS for USB and RNG.

use crate::pac::stm32g0::{crs, flash, rcc};
use crate::poll::{Gate, Oscillator, Stall};
use crate::regs::{Reg, RegisterAccess};
use crate::time::Hertz;
use crate::Config;

use super::{
    wants_clk48, AhbPrescaler, Aux48, Clocks, Configurator, CrsSync, Family, FamilyId, Pll,
    PllRatios, Profile, SealedFamily, Source, CLK48_FREQ, CLK_HSI16_FREQ,
};

/// STM32G0 family.
pub struct Stm32g0;

impl Stm32g0 {
    /// HSI16 / 1 * 8 / 2. The G0 CRS trim is 7 bits wide, so it starts from 0x40.
    pub const HSI: Profile = Profile {
        name: "hsi",
        family: FamilyId::Stm32g0,
        source: Source::Hsi,
        source_hz: CLK_HSI16_FREQ,
        pll: Some(Pll {
            input_min: Hertz(2_660_000),
            input_max: Hertz::mhz(16),
            ratios: PllRatios::Mnpqr {
                m: 1,
                n: 8,
                p: Some(2),
                q: Some(2),
                r: 2,
            },
        }),
        target: Hertz::mhz(64),
        flash_latency: 2,
        aux48: Aux48::Hsi48 {
            crs: Some(CrsSync::USB_SOF.with_trim(0x40)),
        },
    }
    .checked();
}

impl SealedFamily for Stm32g0 {}

impl Family for Stm32g0 {
    const ID: FamilyId = FamilyId::Stm32g0;
    const NVIC_PRIO_BITS: u8 = crate::pac::stm32g0::NVIC_PRIO_BITS;

    const RCC_CR: Reg = rcc::CR;
    const RCC_CFGR: Reg = rcc::CFGR;
    const CLOCK_IRQ_ENABLE: Reg = rcc::CIER;

    const PROFILES: &'static [Profile] = &[Self::HSI];

    fn default_profile() -> Profile {
        Self::HSI
    }

    fn configure<B: RegisterAccess>(
        c: &mut Configurator<'_, B>,
        config: &Config,
    ) -> Result<(), Stall> {
        let p = &config.profile;
        let bus = c.bus();

        c.enable_clock(rcc::apbenr1::PWREN);
        c.set_flash_latency(flash::acr::LATENCY, p.flash_latency as u32)?;

        // PLLSRC: 2 = HSI16, 3 = HSE.
        let pllsrc = match p.source {
            Source::Hsi => {
                c.enable_oscillator(Oscillator::Hsi, rcc::cr::HSION, rcc::cr::HSIRDY)?;
                2
            }
            Source::Hse { .. } => {
                c.enable_oscillator(Oscillator::Hse, rcc::cr::HSEON, rcc::cr::HSERDY)?;
                3
            }
            _ => panic!("rcc: stm32g0 clocks from HSI16 or HSE"),
        };

        let Some(Pll {
            ratios: PllRatios::Mnpqr { m, n, p: pdiv, q, r },
            ..
        }) = p.pll
        else {
            panic!("rcc: stm32g0 profiles use the M/N/R PLL")
        };

        c.configure_pll(
            |b| {
                use rcc::pllcfgr::*;
                let mut v = PLLR.val(r as u32 - 1)
                    | PLLREN.mask()
                    | PLLN.val(n as u32)
                    | PLLM.val(m as u32 - 1)
                    | PLLSRC.val(pllsrc);
                if let Some(pdiv) = pdiv {
                    v |= PLLP.val(pdiv as u32 - 1) | PLLPEN.mask();
                }
                if let Some(q) = q {
                    v |= PLLQ.val(q as u32 - 1) | PLLQEN.mask();
                }
                b.write(rcc::PLLCFGR, v);
            },
            rcc::cr::PLLON,
            rcc::cr::PLLRDY,
        )?;

        // 2 = PLLRCLK
        c.switch_sysclk(rcc::cfgr::SW, rcc::cfgr::SWS, 2)?;

        if wants_clk48(config) {
            let usb = config.usb;
            let aux = p.aux48;
            c.configure_aux(|c| {
                c.bus().set_bit(rcc::cr::HSI48ON);
                c.bus().barrier();
                c.wait(Gate::Aux48, |b| b.is_set(rcc::cr::HSI48RDY))?;
                if let (true, Aux48::Hsi48 { crs: Some(sync) }) = (usb, aux) {
                    c.enable_clock(rcc::apbenr1::CRSEN);
                    bus.write(crs::CR, crs::cr::TRIM.val(sync.trim as u32));
                    bus.write(
                        crs::CFGR,
                        crs::cfgr::SYNCSRC.val(sync.sync_src as u32)
                            | crs::cfgr::FELIM.val(sync.felim as u32)
                            | crs::cfgr::RELOAD.val(sync.reload as u32),
                    );
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    fn read_clocks<B: RegisterAccess>(bus: &B, profile: &Profile) -> Clocks {
        let cfgr = bus.read(rcc::CFGR);
        let sysclk = match rcc::cfgr::SWS.get(cfgr) {
            0 => CLK_HSI16_FREQ,
            1 => profile.source_hz,
            2 => {
                use rcc::pllcfgr::*;
                let pllcfgr = bus.read(rcc::PLLCFGR);
                let input = match PLLSRC.get(pllcfgr) {
                    3 => profile.source_hz,
                    _ => CLK_HSI16_FREQ,
                };
                input / (PLLM.get(pllcfgr) + 1) * PLLN.get(pllcfgr) / (PLLR.get(pllcfgr) + 1)
            }
            3 => Hertz(32_000),
            _ => Hertz(32_768),
        };
        let clk48 = bus.is_set(rcc::cr::HSI48RDY).then_some(CLK48_FREQ);
        Clocks::new(sysclk, AhbPrescaler::from_hpre(rcc::cfgr::HPRE.get(cfgr))).with_clk48(clk48)
    }
}
