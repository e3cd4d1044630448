#![cfg_attr(not(any(test, feature = "sim")), no_std)]
#![doc = include_str!("../README.md")]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod early_init;
pub mod hsem;
pub mod poll;
pub mod rcc;
pub mod regs;
mod rt;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod systick;
pub mod time;

/// Register maps generated from `data/*.yaml`.
pub mod pac {
    #![allow(dead_code)]
    #![allow(missing_docs)]
    #![allow(clippy::all)]

    include!(concat!(env!("OUT_DIR"), "/_generated.rs"));
}

use poll::{FatalHalt, Stall};
use rcc::{Clocks, Configurator, Family, State};
use regs::RegisterAccess;
use systick::TickPeriod;

cfg_if::cfg_if! {
    if #[cfg(feature = "stm32f0")] {
        /// Family selected by Cargo features.
        pub type ActiveFamily = rcc::Stm32f0;
    } else if #[cfg(feature = "stm32g0")] {
        /// Family selected by Cargo features.
        pub type ActiveFamily = rcc::Stm32g0;
    } else if #[cfg(feature = "stm32l0")] {
        /// Family selected by Cargo features.
        pub type ActiveFamily = rcc::Stm32l0;
    } else if #[cfg(feature = "stm32l1")] {
        /// Family selected by Cargo features.
        pub type ActiveFamily = rcc::Stm32l1;
    } else if #[cfg(feature = "stm32wb")] {
        /// Family selected by Cargo features.
        pub type ActiveFamily = rcc::Stm32wb;
    } else if #[cfg(feature = "stm32wl")] {
        /// Family selected by Cargo features.
        pub type ActiveFamily = rcc::Stm32wl;
    }
}

/// Bring-up configuration
pub mod config {
    use crate::hsem::CoreId;
    use crate::poll::PollPolicy;
    use crate::rcc::{Family, Profile};
    use crate::systick::Priority;

    /// Bring-up configuration passed to [`init`](crate::init).
    #[non_exhaustive]
    #[derive(Debug, Clone, Copy)]
    pub struct Config {
        pub profile: Profile,
        /// USB is used: the 48 MHz domain is brought up and trimmed against SOF.
        pub usb: bool,
        /// RNG is used: the 48 MHz domain is brought up.
        pub rng: bool,
        pub poll: PollPolicy,
        pub systick_priority: Priority,
        /// Re-enable the FPU on the resume path.
        pub fpu: bool,
        /// Core running the bring-up, for the hardware semaphores.
        pub core: CoreId,
    }

    #[cfg(any(
        feature = "stm32f0",
        feature = "stm32g0",
        feature = "stm32l0",
        feature = "stm32l1",
        feature = "stm32wb",
        feature = "stm32wl",
    ))]
    impl Default for Config {
        fn default() -> Self {
            Self::new(crate::ActiveFamily::default_profile())
        }
    }

    impl Config {
        /// Defaults for `profile`, with USB, RNG and FPU taken from the Cargo features.
        pub const fn new(profile: Profile) -> Self {
            Self {
                profile,
                usb: cfg!(feature = "usb"),
                rng: cfg!(feature = "rng"),
                poll: PollPolicy::Unbounded,
                systick_priority: Priority::new(0),
                fpu: cfg!(feature = "fpu"),
                core: CoreId::Cpu1,
            }
        }

        pub const fn with_profile(mut self, profile: Profile) -> Self {
            self.profile = profile;
            self
        }

        pub const fn with_usb(mut self, usb: bool) -> Self {
            self.usb = usb;
            self
        }

        pub const fn with_rng(mut self, rng: bool) -> Self {
            self.rng = rng;
            self
        }

        pub const fn with_poll(mut self, poll: PollPolicy) -> Self {
            self.poll = poll;
            self
        }

        pub const fn with_systick_priority(mut self, priority: Priority) -> Self {
            self.systick_priority = priority;
            self
        }

        pub const fn with_fpu(mut self, fpu: bool) -> Self {
            self.fpu = fpu;
            self
        }

        pub const fn with_core(mut self, core: CoreId) -> Self {
            self.core = core;
            self
        }

        /// Validate the configuration.
        ///
        /// Panics (at compile time in a `const` context) on an inconsistent profile, or when
        /// USB/RNG is requested from a profile without a 48 MHz domain.
        pub const fn check(&self) {
            self.profile.check();
            if (self.usb || self.rng) && !self.profile.has_clk48() {
                ::core::panic!("USB/RNG requested but the profile has no 48 MHz clock");
            }
        }

        pub const fn checked(self) -> Self {
            self.check();
            self
        }

        /// [`check`](Self::check), and also reject a profile of another family or a SysTick
        /// priority `F` cannot represent.
        pub const fn check_for<F: Family>(&self) {
            self.check();
            if self.profile.family as u8 != F::ID as u8 {
                ::core::panic!("profile belongs to another family");
            }
            if !self.systick_priority.fits(F::NVIC_PRIO_BITS) {
                ::core::panic!("SysTick priority not representable on this core");
            }
        }
    }
}
pub use config::Config;

/// Run the clock tree sequence and arm SysTick, returning the first stall.
///
/// On success the clocks are published ([`rcc::clocks`]), the RCC semaphore is released on
/// dual-core parts, and SysTick runs at 1 kHz.
///
/// # Panics
///
/// Panics if `config` fails [`Config::check_for::<F>`](Config::check_for).
pub fn try_bring_up<F: Family, B: RegisterAccess>(
    bus: &B,
    config: &Config,
) -> Result<Clocks, Stall> {
    try_bring_up_observed::<F, B>(bus, config, &mut |_: State, _: State| {})
}

/// [`try_bring_up`], reporting every state transition to `observer`.
pub fn try_bring_up_observed<F: Family, B: RegisterAccess>(
    bus: &B,
    config: &Config,
    observer: &mut dyn FnMut(State, State),
) -> Result<Clocks, Stall> {
    config.check_for::<F>();

    F::acquire(bus, config)?;

    let mut c = Configurator::new(bus, config.poll).with_observer(observer);
    F::configure(&mut c, config)?;

    let clocks = F::read_clocks(bus, &config.profile);
    rcc::set_freqs(clocks);
    F::release(bus, config);
    c.finish();

    systick::arm(
        bus,
        TickPeriod::new(clocks.hclk),
        config.systick_priority,
        F::NVIC_PRIO_BITS,
    );
    if F::PUBLISH_TICK_PRIORITY {
        systick::publish_priority(config.systick_priority);
    }

    info!("{}: clock tree up", F::ID.name());
    Ok(clocks)
}

/// [`try_bring_up`], handing a stall to `halt`.
pub fn bring_up<F: Family, B: RegisterAccess, H: FatalHalt>(
    bus: &B,
    config: &Config,
    halt: &mut H,
) -> Clocks {
    match try_bring_up::<F, B>(bus, config) {
        Ok(clocks) => clocks,
        Err(stall) => halt.halt(stall),
    }
}

/// Bring up the clock tree of the [`ActiveFamily`] and arm SysTick.
///
/// Call once from `main`, with interrupts still disabled. The reset-time dispatch runs earlier,
/// from `__pre_init` (feature `rt`).
#[cfg(any(
    feature = "stm32f0",
    feature = "stm32g0",
    feature = "stm32l0",
    feature = "stm32l1",
    feature = "stm32wb",
    feature = "stm32wl",
))]
pub fn init(config: Config) -> Clocks {
    // Safety: `init` runs once, before anything else touches RCC on this core.
    let bus = unsafe { regs::Mmio::steal() };
    bring_up::<ActiveFamily, _, _>(&bus, &config, &mut poll::SpinHalt)
}
