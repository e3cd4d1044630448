#![no_std]
#![no_main]

use defmt::*;
use defmt_rtt as _;
use panic_probe as _;

use powerctrl_hal::early_init::{entry_path, EntryPath};
use powerctrl_hal::rcc;
use powerctrl_hal::regs::Mmio;
use powerctrl_hal::ActiveFamily;

// Cold-start hook run by `__pre_init`. Nothing to do on this board.
#[no_mangle]
pub extern "C" fn SystemInit() {}

#[cortex_m_rt::entry]
fn main() -> ! {
    // Safety: read-only look at RCC before bring-up.
    let bus = unsafe { Mmio::steal() };
    if entry_path::<ActiveFamily, _>(&bus) == EntryPath::ResumeFastPath {
        info!("resumed from standby, clock tree left to CPU2");
        loop {
            cortex_m::asm::wfi();
        }
    }

    let clocks = powerctrl_hal::init(Default::default());

    info!("Hello World!");
    info!("sysclk {} hclk {}", clocks.sysclk, clocks.hclk);
    if let Some(clk48) = clocks.clk48 {
        info!("clk48 {}", clk48);
    }
    info!("core clock {}", rcc::core_clock());
    info!("tick priority {}", powerctrl_hal::systick::tick_priority());

    loop {
        cortex_m::asm::wfi();
    }
}
