//! STM32WB: 64 MHz from the 32 MHz HSE, shared with the radio core.
//!
//! CPU2 can reconfigure RCC at any time, so the whole sequence runs under [`RCC_SEMID`]. While
//! USB is in use CPU1 also keeps [`CLK48_SEMID`], which stops CPU2 from turning CLK48 off.

use crate::early_init::{EntryPath, ResetSnapshot};
use crate::hsem::{Hsem, CLK48_SEMID, RCC_SEMID};
use crate::pac::stm32wb::{flash, rcc};
use crate::poll::{Oscillator, Stall};
use crate::regs::{Reg, RegisterAccess};
use crate::time::Hertz;
use crate::Config;

use super::{
    wants_clk48, AhbPrescaler, Aux48, Clocks, Configurator, Family, FamilyId, Pll, PllRatios,
    Profile, SealedFamily, Source, CLK_HSE32_FREQ, CLK_HSI16_FREQ, MSI_RANGES,
};

/// STM32WB family.
pub struct Stm32wb;

/// `RCC_CR` after a wake from standby with HSI as system clock.
const RESUME_CR: u32 = 0x0000_0560;
/// `RCC_CFGR` after a wake from standby with HSI as system clock.
const RESUME_CFGR: u32 = 0x0007_0005;

impl Stm32wb {
    /// HSE 32 MHz / 4 * 24: R / 3 = 64 MHz, Q / 4 = 48 MHz.
    pub const HSE_32MHZ: Profile = Profile {
        name: "hse",
        family: FamilyId::Stm32wb,
        source: Source::Hse { bypass: false },
        source_hz: CLK_HSE32_FREQ,
        pll: Some(Pll {
            input_min: Hertz::mhz(2),
            input_max: Hertz::mhz(16),
            ratios: PllRatios::Mnpqr {
                m: 4,
                n: 24,
                p: None,
                q: Some(4),
                r: 3,
            },
        }),
        target: Hertz::mhz(64),
        flash_latency: 3,
        aux48: Aux48::PllQ,
    }
    .checked();
}

impl SealedFamily for Stm32wb {}

impl Family for Stm32wb {
    const ID: FamilyId = FamilyId::Stm32wb;
    const NVIC_PRIO_BITS: u8 = crate::pac::stm32wb::NVIC_PRIO_BITS;
    const PUBLISH_TICK_PRIORITY: bool = true;

    const RCC_CR: Reg = rcc::CR;
    const RCC_CFGR: Reg = rcc::CFGR;
    const CLOCK_IRQ_ENABLE: Reg = rcc::CIER;

    const PROFILES: &'static [Profile] = &[Self::HSE_32MHZ];

    fn default_profile() -> Profile {
        Self::HSE_32MHZ
    }

    fn classify(snapshot: &ResetSnapshot) -> EntryPath {
        if snapshot.rcc_cr == RESUME_CR && snapshot.rcc_cfgr == RESUME_CFGR {
            EntryPath::ResumeFastPath
        } else {
            EntryPath::ColdStartPath
        }
    }

    fn acquire<B: RegisterAccess>(bus: &B, config: &Config) -> Result<(), Stall> {
        Hsem::new(bus, config.core).lock(RCC_SEMID, config.poll)
    }

    fn configure<B: RegisterAccess>(
        c: &mut Configurator<'_, B>,
        config: &Config,
    ) -> Result<(), Stall> {
        let p = &config.profile;
        let bus = c.bus();

        c.set_flash_latency(flash::acr::LATENCY, p.flash_latency as u32)?;

        let Source::Hse { bypass: false } = p.source else {
            panic!("rcc: stm32wb clocks from the HSE crystal")
        };
        c.enable_oscillator(Oscillator::Hse, rcc::cr::HSEON, rcc::cr::HSERDY)?;

        if config.usb {
            // Held for as long as USB runs; never released here.
            Hsem::new(bus, config.core).lock(CLK48_SEMID, config.poll)?;
        }

        let Some(Pll {
            ratios: PllRatios::Mnpqr { m, n, p: pdiv, q, r },
            ..
        }) = p.pll
        else {
            panic!("rcc: stm32wb profiles use the M/N/R PLL")
        };

        c.configure_pll(
            |b| {
                use rcc::pllcfgr::*;
                // PLLSRC 3 = HSE
                let mut v = PLLR.val(r as u32 - 1)
                    | PLLREN.mask()
                    | PLLN.val(n as u32)
                    | PLLM.val(m as u32 - 1)
                    | PLLSRC.val(3);
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

        // HCLK1 = SYSCLK whatever SystemInit left in HPRE, HCLK2 (CPU2) = SYSCLK / 2.
        bus.write_field(rcc::cfgr::HPRE, 0);
        bus.write(rcc::EXTCFGR, rcc::extcfgr::C2HPRE.val(8));
        bus.barrier();

        // 3 = PLL
        c.switch_sysclk(rcc::cfgr::SW, rcc::cfgr::SWS, 3)?;

        if wants_clk48(config) {
            c.configure_aux(|c| {
                // 2 = PLLQ
                c.bus().write(rcc::CCIPR, rcc::ccipr::CLK48SEL.val(2));
                Ok(())
            })?;
        }
        Ok(())
    }

    fn release<B: RegisterAccess>(bus: &B, config: &Config) {
        Hsem::new(bus, config.core).release(RCC_SEMID);
    }

    fn read_clocks<B: RegisterAccess>(bus: &B, _profile: &Profile) -> Clocks {
        let cr = bus.read(rcc::CR);
        let cfgr = bus.read(rcc::CFGR);
        let msi = MSI_RANGES[(rcc::cr::MSIRANGE.get(cr) as usize).min(MSI_RANGES.len() - 1)];

        let pllcfgr = bus.read(rcc::PLLCFGR);
        let vco = {
            use rcc::pllcfgr::*;
            let input = match PLLSRC.get(pllcfgr) {
                1 => msi,
                2 => CLK_HSI16_FREQ,
                3 => CLK_HSE32_FREQ,
                _ => Hertz(0),
            };
            input / (PLLM.get(pllcfgr) + 1) * PLLN.get(pllcfgr)
        };

        let sysclk = match rcc::cfgr::SWS.get(cfgr) {
            0 => msi,
            1 => CLK_HSI16_FREQ,
            2 => CLK_HSE32_FREQ,
            _ => vco / (rcc::pllcfgr::PLLR.get(pllcfgr) + 1),
        };

        let pllq_on = rcc::cr::PLLRDY.get(cr) != 0 && rcc::pllcfgr::PLLQEN.get(pllcfgr) != 0;
        let clk48 = match bus.read_field(rcc::ccipr::CLK48SEL) {
            2 if pllq_on => Some(vco / (rcc::pllcfgr::PLLQ.get(pllcfgr) + 1)),
            3 => Some(msi),
            _ => None,
        };
        let hpre = AhbPrescaler::from_hpre_extended(rcc::cfgr::HPRE.get(cfgr));
        Clocks::new(sysclk, hpre).with_clk48(clk48)
    }
}
