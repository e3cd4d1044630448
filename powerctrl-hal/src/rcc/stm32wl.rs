//! STM32WL: MSI range 11 (48 MHz) straight to SYSCLK, no PLL.

use crate::pac::stm32wl::{flash, pwr, rcc};
use crate::poll::{Oscillator, Stall};
use crate::regs::{Reg, RegisterAccess};
use crate::time::Hertz;
use crate::Config;

use super::{
    AhbPrescaler, Aux48, Clocks, Configurator, Family, FamilyId, Profile, SealedFamily, Source,
    CLK_HSE32_FREQ, CLK_HSI16_FREQ, MSI_RANGES,
};

/// STM32WL family.
pub struct Stm32wl;

/// MSI range used until `MSIRGSEL` selects the `RCC_CR` range (4 MHz).
const MSI_STANDBY_RANGE: usize = 6;

impl Stm32wl {
    pub const MSI_48MHZ: Profile = Profile {
        name: "msi",
        family: FamilyId::Stm32wl,
        source: Source::Msi { range: 11 },
        source_hz: MSI_RANGES[11],
        pll: None,
        target: Hertz::mhz(48),
        flash_latency: 2,
        aux48: Aux48::None,
    }
    .checked();
}

impl SealedFamily for Stm32wl {}

impl Family for Stm32wl {
    const ID: FamilyId = FamilyId::Stm32wl;
    const NVIC_PRIO_BITS: u8 = crate::pac::stm32wl::NVIC_PRIO_BITS;

    const RCC_CR: Reg = rcc::CR;
    const RCC_CFGR: Reg = rcc::CFGR;
    const CLOCK_IRQ_ENABLE: Reg = rcc::CIER;

    const PROFILES: &'static [Profile] = &[Self::MSI_48MHZ];

    fn default_profile() -> Profile {
        Self::MSI_48MHZ
    }

    fn configure<B: RegisterAccess>(
        c: &mut Configurator<'_, B>,
        config: &Config,
    ) -> Result<(), Stall> {
        let p = &config.profile;
        let bus = c.bus();

        c.set_flash_latency(flash::acr::LATENCY, p.flash_latency as u32)?;

        // Range 1
        bus.write_field(pwr::cr1::VOS, 0b01);
        bus.barrier();

        let Source::Msi { range } = p.source else {
            panic!("rcc: stm32wl profiles run from MSI")
        };
        c.enable_oscillator(Oscillator::Msi, rcc::cr::MSION, rcc::cr::MSIRDY)?;
        c.retune_oscillator(Oscillator::Msi, rcc::cr::MSIRDY, |b| {
            b.modify(rcc::CR, |r| {
                rcc::cr::MSIRANGE.set(r | rcc::cr::MSIRGSEL.mask(), range as u32)
            });
            b.write_field(rcc::icscr::MSITRIM, 0);
        })?;

        // 0 = MSI
        c.switch_sysclk(rcc::cfgr::SW, rcc::cfgr::SWS, 0)?;

        bus.modify(rcc::CFGR, |r| {
            let r = rcc::cfgr::HPRE.set(r, 0);
            let r = rcc::cfgr::PPRE1.set(r, 0);
            rcc::cfgr::PPRE2.set(r, 0)
        });
        bus.write_field(rcc::extcfgr::SHDHPRE, 0);
        bus.barrier();
        Ok(())
    }

    fn read_clocks<B: RegisterAccess>(bus: &B, _profile: &Profile) -> Clocks {
        let cr = bus.read(rcc::CR);
        let cfgr = bus.read(rcc::CFGR);
        let msi = if rcc::cr::MSIRGSEL.get(cr) != 0 {
            MSI_RANGES[(rcc::cr::MSIRANGE.get(cr) as usize).min(MSI_RANGES.len() - 1)]
        } else {
            MSI_RANGES[MSI_STANDBY_RANGE]
        };

        let sysclk = match rcc::cfgr::SWS.get(cfgr) {
            0 => msi,
            1 => CLK_HSI16_FREQ,
            2 => CLK_HSE32_FREQ,
            _ => {
                use rcc::pllcfgr::*;
                let pllcfgr = bus.read(rcc::PLLCFGR);
                let input = match PLLSRC.get(pllcfgr) {
                    1 => msi,
                    2 => CLK_HSI16_FREQ,
                    3 => CLK_HSE32_FREQ,
                    _ => Hertz(0),
                };
                input / (PLLM.get(pllcfgr) + 1) * PLLN.get(pllcfgr) / (PLLR.get(pllcfgr) + 1)
            }
        };
        Clocks::new(sysclk, AhbPrescaler::from_hpre_extended(rcc::cfgr::HPRE.get(cfgr)))
    }
}
