//! STM32L0: HSI16 * 4 / 2 = 32 MHz. HSI48 needs the SYSCFG reference buffer and is trimmed by
//! CRS when USB is used.

use crate::pac::stm32l0::{crs, flash, rcc, syscfg};
use crate::poll::{Gate, Oscillator, Stall};
use crate::regs::{Reg, RegisterAccess};
use crate::time::Hertz;
use crate::Config;

use super::{
    pllmul_code, pllmul_factor, wants_clk48, AhbPrescaler, Aux48, Clocks, Configurator, CrsSync,
    Family, FamilyId, Pll, PllRatios, Profile, SealedFamily, Source, CLK48_FREQ, CLK_HSI16_FREQ,
    CLK_MSI_RESET_FREQ,
};

/// STM32L0 family.
pub struct Stm32l0;

impl Stm32l0 {
    pub const HSI: Profile = Profile {
        name: "hsi",
        family: FamilyId::Stm32l0,
        source: Source::Hsi,
        source_hz: CLK_HSI16_FREQ,
        pll: Some(Pll {
            input_min: Hertz::mhz(2),
            input_max: Hertz::mhz(24),
            ratios: PllRatios::MulDiv {
                prediv: 1,
                mul: 4,
                div: 2,
            },
        }),
        target: Hertz::mhz(32),
        flash_latency: 1,
        aux48: Aux48::Hsi48 {
            crs: Some(CrsSync::USB_SOF),
        },
    }
    .checked();
}

impl SealedFamily for Stm32l0 {}

impl Family for Stm32l0 {
    const ID: FamilyId = FamilyId::Stm32l0;
    const NVIC_PRIO_BITS: u8 = crate::pac::stm32l0::NVIC_PRIO_BITS;

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

        c.enable_clock(rcc::apb1enr::PWREN);
        c.set_flash_latency(flash::acr::LATENCY, p.flash_latency as u32)?;

        // PLLSRC: 0 = HSI16, 1 = HSE.
        let pllsrc = match p.source {
            Source::Hsi => {
                c.enable_oscillator(Oscillator::Hsi, rcc::cr::HSI16ON, rcc::cr::HSI16RDYF)?;
                0
            }
            Source::Hse { bypass } => {
                if bypass {
                    bus.set_bit(rcc::cr::HSEBYP);
                }
                c.enable_oscillator(Oscillator::Hse, rcc::cr::HSEON, rcc::cr::HSERDY)?;
                1
            }
            _ => panic!("rcc: stm32l0 clocks from HSI16 or HSE"),
        };

        let Some(Pll {
            ratios: PllRatios::MulDiv { mul, div, .. },
            ..
        }) = p.pll
        else {
            panic!("rcc: stm32l0 profiles use the mul/div PLL")
        };
        let Some(mul_code) = pllmul_code(mul) else {
            panic!("rcc: unsupported PLLMUL factor")
        };

        c.configure_pll(
            |b| {
                b.write(
                    rcc::CFGR,
                    rcc::cfgr::PLLDIV.val(div as u32 - 1)
                        | rcc::cfgr::PLLMUL.val(mul_code)
                        | rcc::cfgr::PLLSRC.val(pllsrc),
                );
            },
            rcc::cr::PLLON,
            rcc::cr::PLLRDY,
        )?;

        // 3 = PLL
        c.switch_sysclk(rcc::cfgr::SW, rcc::cfgr::SWS, 3)?;

        if wants_clk48(config) {
            let usb = config.usb;
            let aux = p.aux48;
            c.configure_aux(|c| {
                bus.set_bit(rcc::crrcr::HSI48ON);
                c.enable_clock(rcc::apb2enr::SYSCFGEN);
                bus.set_bit(syscfg::cfgr3::ENREF_HSI48);
                bus.barrier();
                c.wait(Gate::Aux48, |b| b.is_set(rcc::crrcr::HSI48RDY))?;

                // Route the RC48 to USB and RNG.
                bus.set_bit(rcc::ccipr::HSI48SEL);

                if let (true, Aux48::Hsi48 { crs: Some(sync) }) = (usb, aux) {
                    c.enable_clock(rcc::apb1enr::CRSEN);
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
            0 => CLK_MSI_RESET_FREQ,
            1 => CLK_HSI16_FREQ,
            2 => profile.source_hz,
            _ => {
                let input = match rcc::cfgr::PLLSRC.get(cfgr) {
                    0 => CLK_HSI16_FREQ,
                    _ => profile.source_hz,
                };
                let mul = pllmul_factor(rcc::cfgr::PLLMUL.get(cfgr));
                let div = rcc::cfgr::PLLDIV.get(cfgr) + 1;
                input * mul / div
            }
        };
        let clk48 = bus.is_set(rcc::crrcr::HSI48RDY).then_some(CLK48_FREQ);
        Clocks::new(sysclk, AhbPrescaler::from_hpre(rcc::cfgr::HPRE.get(cfgr))).with_clk48(clk48)
    }
}
