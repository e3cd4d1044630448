//! Host runner for the clock bring-up sequences.
//!
//! Runs the firmware's bring-up code for one family against the simulated register file and
//! prints the state transitions, the register trace and the resulting clocks.

mod board;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use powerctrl_hal::early_init::{early_init, ResetSnapshot};
use powerctrl_hal::hsem::CoreId;
use powerctrl_hal::poll::PollPolicy;
use powerctrl_hal::rcc::{
    Family, FamilyId, State, Stm32f0, Stm32g0, Stm32l0, Stm32l1, Stm32wb, Stm32wl,
};
use powerctrl_hal::sim::{self, Access, Sim};
use powerctrl_hal::systick::Priority;
use powerctrl_hal::{try_bring_up_observed, Config};

use board::Board;

/// Reads without an intervening write before an unbounded poll is reported as hung.
const HANG_READS: u32 = 10_000;

#[derive(Parser, Debug)]
#[command(name = "powerctrl-sim", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a cold-start bring-up.
    Run(RunArgs),
    /// Run the reset dispatcher on a given RCC_CR/RCC_CFGR snapshot.
    Reset(ResetArgs),
    /// List the profiles of every family.
    Profiles,
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Family, e.g. stm32wb.
    #[arg(long)]
    family: Option<String>,
    /// Profile name; the family default when omitted.
    #[arg(long)]
    profile: Option<String>,
    #[arg(long)]
    usb: bool,
    #[arg(long)]
    rng: bool,
    /// Freeze a field at its reset value, e.g. RCC.CR.PLLRDY. Repeatable.
    #[arg(long, value_name = "FIELD")]
    stuck: Vec<String>,
    /// Give up a poll after N failed reads.
    #[arg(long, value_name = "N")]
    max_polls: Option<u32>,
    /// Bus accesses before a ready flag follows its enable.
    #[arg(long)]
    delay: Option<u32>,
    #[arg(long)]
    systick_priority: Option<u8>,
    /// HJSON board file; flags override it.
    #[arg(long, value_name = "PATH")]
    board: Option<PathBuf>,
    /// Print every register access.
    #[arg(long)]
    trace: bool,
    /// With --trace, print writes only.
    #[arg(long)]
    writes: bool,
}

#[derive(clap::Args, Debug)]
struct ResetArgs {
    #[arg(long)]
    family: String,
    /// RCC_CR at reset.
    #[arg(long, value_parser = parse_u32)]
    cr: u32,
    /// RCC_CFGR at reset.
    #[arg(long, value_parser = parse_u32)]
    cfgr: u32,
    #[arg(long)]
    fpu: bool,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("{s}: {e}"))
}

/// A run after merging the board file and the flags.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Run {
    family: FamilyId,
    profile: Option<String>,
    usb: bool,
    rng: bool,
    stuck: Vec<String>,
    policy: PollPolicy,
    delay: u32,
    systick_priority: u8,
    trace: bool,
    writes: bool,
}

impl Run {
    fn resolve(args: RunArgs) -> Result<Self> {
        let board = match &args.board {
            Some(path) => Board::load(path)?,
            None => Board::default(),
        };

        let family = args
            .family
            .or(board.family)
            .ok_or_else(|| anyhow!("no family given (--family or board file)"))?;
        let family = parse_family(&family)?;

        let mut stuck = board.stuck;
        stuck.extend(args.stuck);

        let policy = match args.max_polls.or(board.max_polls) {
            Some(max_polls) => PollPolicy::Bounded { max_polls },
            None => PollPolicy::Unbounded,
        };

        Ok(Self {
            family,
            profile: args.profile.or(board.profile),
            usb: args.usb || board.usb.unwrap_or(false),
            rng: args.rng || board.rng.unwrap_or(false),
            stuck,
            policy,
            delay: args.delay.or(board.delay).unwrap_or(sim::DEFAULT_DELAY),
            systick_priority: args.systick_priority.or(board.systick_priority).unwrap_or(0),
            trace: args.trace,
            writes: args.writes,
        })
    }
}

fn parse_family(name: &str) -> Result<FamilyId> {
    FamilyId::from_name(&name.to_ascii_lowercase()).ok_or_else(|| {
        let known: Vec<_> = FamilyId::ALL.iter().map(|f| f.name()).collect();
        anyhow!("unknown family {name} (one of {})", known.join(", "))
    })
}

/// Outcome of a bring-up run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Done,
    /// A bounded poll gave up.
    Stalled(String),
    /// An unbounded poll spun on this register.
    Hung(&'static str),
}

fn run<F: Family>(run: &Run) -> Result<Outcome> {
    let profile = match &run.profile {
        Some(name) => F::profile(name)
            .with_context(|| format!("{} has no profile {name}", F::ID.name()))?,
        None => F::default_profile(),
    };
    if (run.usb || run.rng) && !profile.has_clk48() {
        bail!("profile {} of {} has no 48 MHz clock", profile.name, F::ID.name());
    }
    let priority = Priority::new(run.systick_priority);
    if !priority.fits(F::NVIC_PRIO_BITS) {
        bail!(
            "SysTick priority {} needs more than {} bits",
            run.systick_priority,
            F::NVIC_PRIO_BITS
        );
    }

    let sim = Sim::with_delay(F::ID, run.delay);
    for name in &run.stuck {
        let field = sim::field_by_name(F::ID, name)
            .with_context(|| format!("{} has no field {name}", F::ID.name()))?;
        sim.stick(field);
    }
    sim.set_poll_watchdog(Some(HANG_READS));

    let config = Config::new(profile)
        .with_usb(run.usb)
        .with_rng(run.rng)
        .with_poll(run.policy)
        .with_systick_priority(priority);

    println!(
        "{} profile {}: {} from {}",
        F::ID.name(),
        profile.name,
        profile.target,
        profile.source_hz
    );

    let bus = sim.bus(CoreId::Cpu1);
    let mut transitions: Vec<(State, State)> = Vec::new();
    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        try_bring_up_observed::<F, _>(&bus, &config, &mut |from: State, to: State| {
            transitions.push((from, to))
        })
    }));
    panic::set_hook(hook);

    for (from, to) in &transitions {
        println!("  {:?} -> {:?}", from, to);
    }

    if run.trace {
        println!();
        for event in sim.trace() {
            if !run.writes || event.access == Access::Write {
                println!("{event}");
            }
        }
    }
    println!();

    let outcome = match result {
        Ok(Ok(clocks)) => {
            println!("sysclk {}", clocks.sysclk);
            println!("hclk   {}", clocks.hclk);
            match clocks.clk48 {
                Some(clk48) => println!("clk48  {clk48}"),
                None => println!("clk48  off"),
            }
            Outcome::Done
        }
        Ok(Err(stall)) => {
            let msg = format!("stalled at {:?} after {} polls", stall.gate, stall.polls);
            println!("{msg}");
            Outcome::Stalled(msg)
        }
        Err(_) => {
            let reg = sim.stalled_at().unwrap_or("?");
            println!("hung polling {reg}");
            Outcome::Hung(reg)
        }
    };
    Ok(outcome)
}

fn run_family(run_cfg: &Run) -> Result<Outcome> {
    match run_cfg.family {
        FamilyId::Stm32f0 => run::<Stm32f0>(run_cfg),
        FamilyId::Stm32g0 => run::<Stm32g0>(run_cfg),
        FamilyId::Stm32l0 => run::<Stm32l0>(run_cfg),
        FamilyId::Stm32l1 => run::<Stm32l1>(run_cfg),
        FamilyId::Stm32wb => run::<Stm32wb>(run_cfg),
        FamilyId::Stm32wl => run::<Stm32wl>(run_cfg),
    }
}

fn reset<F: Family>(args: &ResetArgs) -> Result<()> {
    let sim = Sim::new(F::ID);
    sim.poke(F::RCC_CR, args.cr);
    sim.poke(F::RCC_CFGR, args.cfgr);
    let bus = sim.bus(CoreId::Cpu1);

    let snapshot = ResetSnapshot::capture::<F, _>(&bus);
    let mut system_init = false;
    let path = early_init::<F, _>(&bus, &snapshot, args.fpu, || system_init = true);

    println!("{} {:?}", F::ID.name(), path);
    if system_init {
        println!("SystemInit called");
    }
    for event in sim.writes() {
        println!("{event}");
    }
    Ok(())
}

fn reset_family(args: &ResetArgs) -> Result<()> {
    match parse_family(&args.family)? {
        FamilyId::Stm32f0 => reset::<Stm32f0>(args),
        FamilyId::Stm32g0 => reset::<Stm32g0>(args),
        FamilyId::Stm32l0 => reset::<Stm32l0>(args),
        FamilyId::Stm32l1 => reset::<Stm32l1>(args),
        FamilyId::Stm32wb => reset::<Stm32wb>(args),
        FamilyId::Stm32wl => reset::<Stm32wl>(args),
    }
}

fn list<F: Family>() {
    println!("{}", F::ID.name());
    let default = F::default_profile();
    for p in F::PROFILES {
        let mark = if p.name == default.name { "*" } else { " " };
        let clk48 = match p.clk48() {
            Some(_) => "usb/rng",
            None => "",
        };
        println!(
            " {mark} {:<12} {:>12} -> {:<12} ws {} {clk48}",
            p.name,
            p.source_hz.to_string(),
            p.target.to_string(),
            p.flash_latency
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            let run_cfg = Run::resolve(args)?;
            match run_family(&run_cfg)? {
                Outcome::Done => Ok(()),
                Outcome::Stalled(msg) => bail!(msg),
                Outcome::Hung(reg) => bail!("unbounded poll on {reg} never completed"),
            }
        }
        Command::Reset(args) => reset_family(&args),
        Command::Profiles => {
            list::<Stm32f0>();
            list::<Stm32g0>();
            list::<Stm32l0>();
            list::<Stm32l1>();
            list::<Stm32wb>();
            list::<Stm32wl>();
            Ok(())
        }
    }
}
