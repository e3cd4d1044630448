use std::panic::{catch_unwind, AssertUnwindSafe};

use super::*;
use crate::early_init::{early_init, entry_path, EntryPath, ResetSnapshot};
use crate::hsem::{CoreId, Hsem, RCC_SEMID};
use crate::pac;
use crate::poll::{FatalHalt, Gate, PollPolicy, Stall};
use crate::regs::{Field, RegisterAccess};
use crate::sim::{serial, Access, Event, Sim};
use crate::systick::{self, Priority};
use crate::time::Hertz;
use crate::{bring_up, try_bring_up, try_bring_up_observed, Config};

/// `(SW, SWS, LATENCY)` of a family.
fn switch_fields(family: FamilyId) -> (Field, Field, Field) {
    macro_rules! fields {
        ($f:ident) => {
            (
                pac::$f::rcc::cfgr::SW,
                pac::$f::rcc::cfgr::SWS,
                pac::$f::flash::acr::LATENCY,
            )
        };
    }
    match family {
        FamilyId::Stm32f0 => fields!(stm32f0),
        FamilyId::Stm32g0 => fields!(stm32g0),
        FamilyId::Stm32l0 => fields!(stm32l0),
        FamilyId::Stm32l1 => fields!(stm32l1),
        FamilyId::Stm32wb => fields!(stm32wb),
        FamilyId::Stm32wl => fields!(stm32wl),
    }
}

/// `SWS` value each family ends on.
fn requested_source(family: FamilyId) -> u32 {
    match family {
        FamilyId::Stm32f0 | FamilyId::Stm32g0 => 2,
        FamilyId::Stm32l0 | FamilyId::Stm32l1 | FamilyId::Stm32wb => 3,
        FamilyId::Stm32wl => 0,
    }
}

fn is_write_to(e: &Event, field: Field, value: u32) -> bool {
    e.access == Access::Write && e.addr == field.reg().addr() && field.get(e.value) == value
}

fn reaches_target<F: Family>() {
    let (_, sws, _) = switch_fields(F::ID);
    let src = requested_source(F::ID);

    for profile in F::PROFILES {
        for clk48 in [false, true] {
            if clk48 && !profile.has_clk48() {
                continue;
            }
            let _guard = serial();
            let sim = Sim::new(F::ID);
            let bus = sim.bus(CoreId::Cpu1);
            let config = Config::new(*profile).with_usb(clk48).with_rng(false).checked();

            let clocks = try_bring_up::<F, _>(&bus, &config).unwrap();

            assert_eq!(sim.peek_field(sws), src, "{} {}", F::ID.name(), profile.name);
            assert_eq!(clocks.sysclk, profile.target, "{} {}", F::ID.name(), profile.name);
            assert_eq!(clocks.hclk, profile.target);
            assert_eq!(super::clocks(), clocks);
            assert_eq!(core_clock(), profile.target);
            if clk48 {
                assert_eq!(clocks.clk48, Some(CLK48_FREQ), "{} {}", F::ID.name(), profile.name);
            }
        }
    }
}

#[test]
fn stm32f0_profiles_reach_target() {
    reaches_target::<Stm32f0>();
}

#[test]
fn stm32g0_profiles_reach_target() {
    reaches_target::<Stm32g0>();
}

#[test]
fn stm32l0_profiles_reach_target() {
    reaches_target::<Stm32l0>();
}

#[test]
fn stm32l1_profiles_reach_target() {
    reaches_target::<Stm32l1>();
}

#[test]
fn stm32wb_profiles_reach_target() {
    reaches_target::<Stm32wb>();
}

#[test]
fn stm32wl_profiles_reach_target() {
    reaches_target::<Stm32wl>();
}

fn latency_committed_before_switch<F: Family>() {
    let (sw, _, latency) = switch_fields(F::ID);
    let src = requested_source(F::ID);

    for profile in F::PROFILES {
        let _guard = serial();
        let sim = Sim::new(F::ID);
        let config = Config::new(*profile).with_usb(false).with_rng(false);
        try_bring_up::<F, _>(&sim.bus(CoreId::Cpu1), &config).unwrap();

        let ws = profile.flash_latency as u32;
        let trace = sim.trace();
        let switch = trace
            .iter()
            .position(|e| is_write_to(e, sw, src))
            .expect("no switch write");
        let written = trace[..switch]
            .iter()
            .position(|e| is_write_to(e, latency, ws))
            .expect("latency not written before switch");
        let confirmed = trace[written + 1..switch].iter().any(|e| {
            e.access == Access::Read && e.addr == latency.reg().addr() && latency.get(e.value) == ws
        });
        assert!(confirmed, "{} {}: latency not read back", F::ID.name(), profile.name);
    }
}

#[test]
fn flash_latency_precedes_switch() {
    latency_committed_before_switch::<Stm32f0>();
    latency_committed_before_switch::<Stm32g0>();
    latency_committed_before_switch::<Stm32l0>();
    latency_committed_before_switch::<Stm32l1>();
    latency_committed_before_switch::<Stm32wb>();
    latency_committed_before_switch::<Stm32wl>();
}

#[test]
fn systick_reload_follows_core_clock() {
    fn check<F: Family>(mhz: u32) {
        let _guard = serial();
        let sim = Sim::new(F::ID);
        let config = Config::new(F::default_profile()).with_usb(false).with_rng(false);
        try_bring_up::<F, _>(&sim.bus(CoreId::Cpu1), &config).unwrap();

        use pac::cm::systick::{ctrl, load, CTRL, LOAD};
        assert_eq!(load::RELOAD.get(sim.peek(LOAD)), mhz * 1_000 - 1);
        let c = sim.peek(CTRL);
        assert!(ctrl::ENABLE.get(c) != 0 && ctrl::TICKINT.get(c) != 0);
        assert!(ctrl::CLKSOURCE.get(c) != 0);
    }
    check::<Stm32l0>(32);
    check::<Stm32f0>(48);
    check::<Stm32wl>(48);
    check::<Stm32wb>(64);
}

#[test]
fn stm32wb_resume_touches_only_core_state() {
    use pac::stm32wb::rcc::{CFGR, CR};
    let sim = Sim::new(FamilyId::Stm32wb);
    sim.poke(CR, 0x0000_0560);
    sim.poke(CFGR, 0x0007_0005);
    let bus = sim.bus(CoreId::Cpu1);

    let snapshot = ResetSnapshot::capture::<Stm32wb, _>(&bus);
    let mut system_init = 0;
    let path = early_init::<Stm32wb, _>(&bus, &snapshot, true, || system_init += 1);

    assert_eq!(path, EntryPath::ResumeFastPath);
    assert_eq!(system_init, 0);
    let writes: Vec<_> = sim.writes().iter().map(|e| e.reg).collect();
    assert_eq!(writes, ["SCB.CPACR", "RCC.CIER"]);
    assert_eq!(sim.peek(CR), 0x0000_0560);
    assert_eq!(pac::cm::scb::cpacr::CP10.get(sim.peek(pac::cm::scb::CPACR)), 0b11);
    assert_eq!(entry_path::<Stm32wb, _>(&bus), EntryPath::ResumeFastPath);
}

#[test]
fn resume_without_fpu_only_masks_clock_irqs() {
    use pac::stm32wb::rcc::{CFGR, CR};
    let sim = Sim::new(FamilyId::Stm32wb);
    sim.poke(CR, 0x0000_0560);
    sim.poke(CFGR, 0x0007_0005);
    let bus = sim.bus(CoreId::Cpu2);

    let snapshot = ResetSnapshot::capture::<Stm32wb, _>(&bus);
    early_init::<Stm32wb, _>(&bus, &snapshot, false, || {});

    let writes: Vec<_> = sim.writes().iter().map(|e| e.reg).collect();
    assert_eq!(writes, ["RCC.CIER"]);
}

#[test]
fn cold_start_runs_system_init_once() {
    for family in [FamilyId::Stm32wb, FamilyId::Stm32l0] {
        let sim = Sim::new(family);
        let bus = sim.bus(CoreId::Cpu1);
        let mut system_init = 0;
        let path = match family {
            FamilyId::Stm32wb => {
                let snapshot = ResetSnapshot::capture::<Stm32wb, _>(&bus);
                early_init::<Stm32wb, _>(&bus, &snapshot, true, || system_init += 1)
            }
            _ => {
                let snapshot = ResetSnapshot::capture::<Stm32l0, _>(&bus);
                early_init::<Stm32l0, _>(&bus, &snapshot, false, || system_init += 1)
            }
        };
        assert_eq!(path, EntryPath::ColdStartPath);
        assert_eq!(system_init, 1);
        assert!(sim.writes().is_empty());
    }
}

#[test]
fn stm32wb_resume_pattern_must_match_exactly() {
    let snapshot = ResetSnapshot {
        rcc_cr: 0x0000_0560,
        rcc_cfgr: 0x0007_0001,
    };
    assert_eq!(Stm32wb::classify(&snapshot), EntryPath::ColdStartPath);
    // Other families always take the cold path.
    let snapshot = ResetSnapshot {
        rcc_cr: 0x0000_0560,
        rcc_cfgr: 0x0007_0005,
    };
    assert_eq!(Stm32wl::classify(&snapshot), EntryPath::ColdStartPath);
}

#[test]
fn second_core_never_sees_partial_state() {
    use pac::stm32wb::{flash, rcc};
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wb);
    sim.protect(
        RCC_SEMID,
        &[
            rcc::CR,
            rcc::CFGR,
            rcc::PLLCFGR,
            rcc::CCIPR,
            rcc::EXTCFGR,
            flash::ACR,
        ],
    );
    let config = Config::new(Stm32wb::HSE_32MHZ).with_usb(false).with_rng(false);

    std::thread::scope(|s| {
        let cpu1 = sim.bus(CoreId::Cpu1);
        let cpu2 = sim.bus(CoreId::Cpu2);

        s.spawn(move || {
            try_bring_up::<Stm32wb, _>(&cpu1, &config).unwrap();
        });
        s.spawn(move || {
            let hsem = Hsem::new(&cpu2, CoreId::Cpu2);
            for _ in 0..50 {
                hsem.lock(RCC_SEMID, PollPolicy::Unbounded).unwrap();
                let cr = cpu2.read(rcc::CR);
                let cfgr = cpu2.read(rcc::CFGR);
                let untouched = rcc::cr::PLLON.get(cr) == 0 && rcc::cfgr::SWS.get(cfgr) == 0;
                let finished = rcc::cr::PLLRDY.get(cr) != 0 && rcc::cfgr::SWS.get(cfgr) == 3;
                assert!(untouched || finished, "cr {:#x} cfgr {:#x}", cr, cfgr);
                hsem.release(RCC_SEMID);
                std::thread::yield_now();
            }
        });
    });

    assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    assert!(!Hsem::new(&sim.bus(CoreId::Cpu1), CoreId::Cpu1).is_held(RCC_SEMID));
}

#[test]
fn stm32wb_keeps_clk48_semaphore_for_usb() {
    use crate::hsem::CLK48_SEMID;
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wb);
    let bus = sim.bus(CoreId::Cpu1);
    let config = Config::new(Stm32wb::HSE_32MHZ).with_usb(true);
    try_bring_up::<Stm32wb, _>(&bus, &config).unwrap();

    let hsem = Hsem::new(&bus, CoreId::Cpu1);
    assert!(hsem.is_held(CLK48_SEMID));
    assert!(!hsem.is_held(RCC_SEMID));
    assert_eq!(
        sim.peek_field(pac::stm32wb::rcc::ccipr::CLK48SEL),
        2,
        "CLK48 from PLLQ"
    );
}

#[derive(Default)]
struct CountingHalt {
    stalls: Vec<Stall>,
}

impl FatalHalt for CountingHalt {
    fn halt(&mut self, stall: Stall) -> ! {
        self.stalls.push(stall);
        panic!("halted");
    }
}

#[test]
fn bounded_stall_halts_once_without_further_writes() {
    use pac::stm32wb::rcc::{cr, CR};
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wb);
    sim.stick(cr::PLLRDY);
    let bus = sim.bus(CoreId::Cpu1);
    let config = Config::new(Stm32wb::HSE_32MHZ)
        .with_usb(false)
        .with_poll(PollPolicy::Bounded { max_polls: 16 });

    let mut halt = CountingHalt::default();
    let res = catch_unwind(AssertUnwindSafe(|| {
        bring_up::<Stm32wb, _, _>(&bus, &config, &mut halt);
    }));
    assert!(res.is_err());
    assert_eq!(halt.stalls, [Stall { gate: Gate::Pll, polls: 16 }]);

    let trace = sim.trace();
    let last_write = trace
        .iter()
        .rposition(|e| e.access == Access::Write)
        .unwrap();
    assert_eq!(trace[last_write].reg, "RCC.CR");
    assert!(cr::PLLON.get(trace[last_write].value) != 0);
    let polls: Vec<_> = trace[last_write + 1..]
        .iter()
        .filter(|e| e.access == Access::Read)
        .collect();
    assert_eq!(polls.len(), 16);
    assert!(polls.iter().all(|e| e.addr == CR.addr()));
}

#[test]
fn unbounded_stall_spins_on_the_ready_bit() {
    use pac::stm32l0::rcc::cr;
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32l0);
    sim.stick(cr::HSI16RDYF);
    sim.set_poll_watchdog(Some(500));
    let bus = sim.bus(CoreId::Cpu1);
    let config = Config::new(Stm32l0::HSI).with_usb(false);

    let res = catch_unwind(AssertUnwindSafe(|| {
        let _ = try_bring_up::<Stm32l0, _>(&bus, &config);
    }));
    assert!(res.is_err());
    assert_eq!(sim.stalled_at(), Some("RCC.CR"));
    assert_eq!(sim.peek_field(pac::stm32l0::rcc::cfgr::SWS), 0);
}

#[test]
fn stm32l1_waits_for_voltage_scaling() {
    use pac::stm32l1::{flash, pwr};
    let _guard = serial();
    let sim = Sim::with_delay(FamilyId::Stm32l1, 8);
    let config = Config::new(Stm32l1::HSI).with_usb(true);
    try_bring_up::<Stm32l1, _>(&sim.bus(CoreId::Cpu1), &config).unwrap();

    let trace = sim.trace();
    let vos = trace
        .iter()
        .position(|e| e.access == Access::Write && e.addr == pwr::CR.addr())
        .unwrap();
    let settled = vos
        + trace[vos..]
            .iter()
            .position(|e| {
                e.access == Access::Read
                    && e.addr == pwr::CSR.addr()
                    && pwr::csr::VOSF.get(e.value) == 0
            })
            .unwrap();
    // VOSF was seen busy at least once.
    assert!(trace[vos..settled]
        .iter()
        .any(|e| e.addr == pwr::CSR.addr() && pwr::csr::VOSF.get(e.value) != 0));
    let acr = trace
        .iter()
        .position(|e| e.access == Access::Write && e.addr == flash::ACR.addr())
        .unwrap();
    assert!(settled < acr);
    assert!(flash::acr::ACC64.get(trace[acr].value) != 0);
}

#[test]
fn stm32wb_publishes_tick_priority() {
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wb);
    let config = Config::new(Stm32wb::HSE_32MHZ)
        .with_usb(false)
        .with_systick_priority(Priority::new(3));
    try_bring_up::<Stm32wb, _>(&sim.bus(CoreId::Cpu1), &config).unwrap();

    assert_eq!(systick::tick_priority(), Some(Priority::new(3)));
    let shpr3 = sim.peek(pac::cm::scb::SHPR3);
    assert_eq!(
        pac::cm::scb::shpr3::PRI_SYSTICK.get(shpr3),
        Priority::new(3).encode(Stm32wb::NVIC_PRIO_BITS) as u32
    );
}

#[test]
fn observer_sees_every_transition() {
    use State::*;
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32l0);
    let config = Config::new(Stm32l0::HSI).with_usb(true);
    let mut seen = Vec::new();
    let bus = sim.bus(CoreId::Cpu1);
    try_bring_up_observed::<Stm32l0, _>(&bus, &config, &mut |from: State, to: State| {
        seen.push((from, to))
    })
    .unwrap();

    assert_eq!(
        seen,
        [
            (Unconfigured, OscillatorEnabling),
            (OscillatorEnabling, OscillatorReady),
            (OscillatorReady, MultiplierConfiguring),
            (MultiplierConfiguring, MultiplierReady),
            (MultiplierReady, SourceSwitching),
            (SourceSwitching, SourceStable),
            (SourceStable, AuxiliaryConfiguring),
            (AuxiliaryConfiguring, AuxiliaryReady),
            (AuxiliaryReady, Done),
        ]
    );
}

#[test]
fn pll_less_family_switches_from_oscillator() {
    use State::*;
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wl);
    let config = Config::new(Stm32wl::MSI_48MHZ);
    let mut seen = Vec::new();
    let bus = sim.bus(CoreId::Cpu1);
    try_bring_up_observed::<Stm32wl, _>(&bus, &config, &mut |_: State, to: State| seen.push(to))
        .unwrap();
    assert_eq!(
        seen,
        [OscillatorEnabling, OscillatorReady, SourceSwitching, SourceStable, Done]
    );
    assert_eq!(sim.peek_field(pac::stm32wl::rcc::cr::MSIRANGE), 11);
}

#[test]
fn profiles_are_found_by_name() {
    assert_eq!(Stm32f0::profile("hse-bypass"), Some(Stm32f0::HSE_BYPASS_8MHZ));
    assert_eq!(Stm32wb::profile("hsi"), None);
    assert_eq!(FamilyId::from_name("stm32l1"), Some(FamilyId::Stm32l1));
    assert_eq!(FamilyId::from_name("stm32h7"), None);
}

#[test]
#[should_panic]
fn usb_without_48mhz_domain_is_rejected() {
    Config::new(Stm32wl::MSI_48MHZ).with_usb(true).checked();
}

#[test]
fn stm32wb_reads_back_the_odd_ahb_dividers() {
    use pac::stm32wb::rcc::{cfgr, CFGR};
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wb);
    let bus = sim.bus(CoreId::Cpu1);
    // Left behind by SystemInit: HCLK1 = SYSCLK / 3.
    sim.poke(CFGR, cfgr::HPRE.set(sim.peek(CFGR), 0b0001));

    let clocks = try_bring_up::<Stm32wb, _>(&bus, &Config::new(Stm32wb::HSE_32MHZ)).unwrap();

    assert_eq!(sim.peek_field(cfgr::HPRE), 0);
    assert_eq!(clocks.hclk, Hertz::mhz(64));
    assert_eq!(
        pac::cm::systick::load::RELOAD.get(sim.peek(pac::cm::systick::LOAD)),
        63_999
    );

    sim.poke(CFGR, cfgr::HPRE.set(sim.peek(CFGR), 0b0001));
    let divided = Stm32wb::read_clocks(&bus, &Stm32wb::HSE_32MHZ);
    assert_eq!(divided.sysclk, Hertz::mhz(64));
    assert_eq!(divided.hclk, Hertz(21_333_333));
}

#[test]
fn stm32wb_aux_writes() {
    use pac::stm32wb::rcc;
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wb);
    let config = Config::new(Stm32wb::HSE_32MHZ).with_usb(true);
    try_bring_up::<Stm32wb, _>(&sim.bus(CoreId::Cpu1), &config).unwrap();

    assert_eq!(sim.peek_field(rcc::extcfgr::C2HPRE), 8);
    assert_eq!(sim.peek_field(rcc::extcfgr::SHDHPRE), 0);
    assert_eq!(sim.peek_field(rcc::ccipr::CLK48SEL), 2);
}

#[test]
fn stm32wb_rng_alone_selects_clk48() {
    use crate::hsem::CLK48_SEMID;
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wb);
    let bus = sim.bus(CoreId::Cpu1);
    let config = Config::new(Stm32wb::HSE_32MHZ).with_usb(false).with_rng(true);
    try_bring_up::<Stm32wb, _>(&bus, &config).unwrap();

    assert_eq!(sim.peek_field(pac::stm32wb::rcc::ccipr::CLK48SEL), 2);
    assert!(!Hsem::new(&bus, CoreId::Cpu1).is_held(CLK48_SEMID));
}

#[test]
fn stm32l0_trims_hsi48_against_usb_sof() {
    use pac::stm32l0::{crs, rcc, syscfg};
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32l0);
    let config = Config::new(Stm32l0::HSI).with_usb(true).with_rng(false);
    try_bring_up::<Stm32l0, _>(&sim.bus(CoreId::Cpu1), &config).unwrap();

    assert_eq!(sim.peek_field(rcc::ccipr::HSI48SEL), 1);
    assert_eq!(sim.peek_field(syscfg::cfgr3::ENREF_HSI48), 1);
    assert_eq!(sim.peek_field(crs::cr::TRIM), 0x20);
    assert_eq!(sim.peek_field(crs::cfgr::SYNCSRC), 2);
    assert_eq!(sim.peek_field(crs::cfgr::FELIM), 0x22);
    assert_eq!(sim.peek_field(crs::cfgr::RELOAD), 47_999);
}

#[test]
fn stm32l0_rng_skips_crs() {
    use pac::stm32l0::{crs, rcc};
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32l0);
    let config = Config::new(Stm32l0::HSI).with_usb(false).with_rng(true);
    try_bring_up::<Stm32l0, _>(&sim.bus(CoreId::Cpu1), &config).unwrap();

    assert_eq!(sim.peek_field(rcc::ccipr::HSI48SEL), 1);
    assert!(sim.writes().iter().all(|e| e.addr != crs::CFGR.addr()));
}

#[test]
fn stm32g0_trims_hsi48_from_the_wide_midpoint() {
    use pac::stm32g0::crs;
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32g0);
    let config = Config::new(Stm32g0::HSI).with_usb(true).with_rng(false);
    try_bring_up::<Stm32g0, _>(&sim.bus(CoreId::Cpu1), &config).unwrap();

    assert_eq!(sim.peek_field(crs::cr::TRIM), 0x40);
    assert_eq!(sim.peek_field(crs::cfgr::SYNCSRC), 2);
    assert_eq!(sim.peek_field(crs::cfgr::FELIM), 0x22);
    assert_eq!(sim.peek_field(crs::cfgr::RELOAD), 47_999);
}

#[test]
fn stm32l1_debug_builds_clear_low_power_debug() {
    use pac::stm32l1::dbgmcu::{cr, CR};
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32l1);
    let all = cr::DBG_SLEEP.mask() | cr::DBG_STOP.mask() | cr::DBG_STANDBY.mask();
    sim.poke(CR, all);
    try_bring_up::<Stm32l1, _>(&sim.bus(CoreId::Cpu1), &Config::new(Stm32l1::HSI)).unwrap();

    let expected = if cfg!(debug_assertions) { 0 } else { all };
    assert_eq!(sim.peek(CR) & all, expected);
}

#[test]
fn stm32wl_resets_trim_and_prescalers() {
    use pac::stm32wl::rcc::{cfgr, icscr, CFGR, ICSCR};
    let _guard = serial();
    let sim = Sim::new(FamilyId::Stm32wl);
    sim.poke(ICSCR, icscr::MSITRIM.set(sim.peek(ICSCR), 0x15));
    let mut v = sim.peek(CFGR);
    v = cfgr::HPRE.set(v, 0b1000);
    v = cfgr::PPRE1.set(v, 0b100);
    v = cfgr::PPRE2.set(v, 0b101);
    sim.poke(CFGR, v);

    let clocks =
        try_bring_up::<Stm32wl, _>(&sim.bus(CoreId::Cpu1), &Config::new(Stm32wl::MSI_48MHZ))
            .unwrap();

    assert_eq!(sim.peek_field(icscr::MSITRIM), 0);
    assert_eq!(sim.peek_field(cfgr::HPRE), 0);
    assert_eq!(sim.peek_field(cfgr::PPRE1), 0);
    assert_eq!(sim.peek_field(cfgr::PPRE2), 0);
    assert_eq!(clocks.hclk, Hertz::mhz(48));
}

#[test]
#[should_panic(expected = "profile belongs to another family")]
fn profile_of_another_family_is_rejected() {
    let sim = Sim::new(FamilyId::Stm32wb);
    let config = Config::new(Stm32l0::HSI).with_usb(false).with_rng(false);
    let _ = try_bring_up::<Stm32wb, _>(&sim.bus(CoreId::Cpu1), &config);
}

#[test]
#[should_panic(expected = "oscillator not supported on this family")]
fn profile_shape_is_checked_against_its_family() {
    let relabelled = Profile {
        family: FamilyId::Stm32wb,
        ..Stm32l0::HSI
    };
    Config::new(relabelled).with_usb(false).check();
}

#[test]
#[should_panic(expected = "PLL layout not supported on this family")]
fn stm32l1_rejects_an_unprogrammable_multiplier() {
    let profile = Profile {
        pll: Some(Pll {
            input_min: Hertz::mhz(2),
            input_max: Hertz::mhz(24),
            ratios: PllRatios::MulDiv {
                prediv: 1,
                mul: 5,
                div: 3,
            },
        }),
        ..Stm32l1::HSI
    };
    profile.check();
}

#[test]
fn builtin_profiles_pass_their_family_check() {
    fn check<F: Family>() {
        for p in F::PROFILES {
            assert_eq!(p.family, F::ID);
            Config::new(*p).with_usb(false).with_rng(false).check_for::<F>();
        }
    }
    check::<Stm32f0>();
    check::<Stm32g0>();
    check::<Stm32l0>();
    check::<Stm32l1>();
    check::<Stm32wb>();
    check::<Stm32wl>();
}
