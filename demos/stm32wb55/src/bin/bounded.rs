#![no_std]
#![no_main]

use defmt::*;
use defmt_rtt as _;
use panic_probe as _;

use powerctrl_hal::poll::{FatalHalt, PollPolicy, Stall};
use powerctrl_hal::rcc::Stm32wb;
use powerctrl_hal::regs::Mmio;
use powerctrl_hal::Config;

#[no_mangle]
pub extern "C" fn SystemInit() {}

/// Reports the stalled gate, then lets the debugger take over.
struct Breakpoint;

impl FatalHalt for Breakpoint {
    fn halt(&mut self, stall: Stall) -> ! {
        error!("clock bring-up stalled: {} after {} polls", stall.gate, stall.polls);
        loop {
            cortex_m::asm::bkpt();
        }
    }
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let config = Config::default()
        .with_usb(false)
        .with_poll(PollPolicy::Bounded { max_polls: 1_000_000 })
        .checked();

    // Safety: nothing else touches RCC yet.
    let bus = unsafe { Mmio::steal() };
    let clocks = powerctrl_hal::bring_up::<Stm32wb, _, _>(&bus, &config, &mut Breakpoint);
    info!("hclk {}", clocks.hclk);

    loop {
        cortex_m::asm::wfi();
    }
}
