//! `__pre_init` hook for `cortex-m-rt`.
//!
//! Runs the reset-time dispatch before `.data` and `.bss` are initialised. The firmware must
//! provide `SystemInit`, the vendor system initialisation run on a cold start.

#[cfg(all(
    feature = "rt",
    target_arch = "arm",
    any(
        feature = "stm32f0",
        feature = "stm32g0",
        feature = "stm32l0",
        feature = "stm32l1",
        feature = "stm32wb",
        feature = "stm32wl",
    )
))]
mod hook {
    use core::arch::global_asm;

    use cortex_m_rt as _;

    use crate::early_init::{early_init, ResetSnapshot};
    use crate::regs::Mmio;
    use crate::ActiveFamily;

    extern "C" {
        fn SystemInit();
    }

    // No statics and no logging here: RAM is not initialised yet.
    extern "C" fn powerctrl_pre_init() {
        // Safety: nothing else runs this early.
        let bus = unsafe { Mmio::steal() };
        let snapshot = ResetSnapshot::capture::<ActiveFamily, _>(&bus);
        early_init::<ActiveFamily, _>(&bus, &snapshot, cfg!(feature = "fpu"), || unsafe {
            SystemInit()
        });
    }

    // Tail call, so `powerctrl_pre_init` returns straight to the reset handler.
    global_asm!(
        ".section .text.__pre_init, \"ax\", %progbits",
        ".global __pre_init",
        ".type __pre_init, %function",
        ".thumb_func",
        "__pre_init:",
        "    ldr r0, ={entry}",
        "    bx r0",
        ".ltorg",
        ".size __pre_init, . - __pre_init",
        entry = sym powerctrl_pre_init,
    );
}
