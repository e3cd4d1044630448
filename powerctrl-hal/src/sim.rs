//! Host-side register file simulator.
//!
//! [`Sim`] holds the registers of one family with their reset values and a small set of
//! behaviour rules: readiness bits that follow their enable bits after a fixed number of bus
//! accesses, status fields that mirror request fields, busy flags, and the HSEM one-step lock.
//! Every access is recorded, so tests and the `powerctrl-sim` tool can inspect the exact
//! register sequence a bring-up produced.
//!
//! Time is counted in bus accesses, which keeps runs deterministic.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::hsem::CoreId;
use crate::pac;
use crate::rcc::FamilyId;
use crate::regs::{Field, Reg, RegArray, RegisterAccess};

/// Accesses between an enabling write and the matching status change.
pub const DEFAULT_DELAY: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Barrier,
}

/// One recorded bus access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub seq: u64,
    pub core: CoreId,
    pub access: Access,
    /// Register name, empty for barriers and unmapped addresses.
    pub reg: &'static str,
    pub addr: u32,
    pub value: u32,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = match self.core {
            CoreId::Cpu1 => "cpu1",
            CoreId::Cpu2 => "cpu2",
        };
        match self.access {
            Access::Barrier => write!(f, "{:>6} {} barrier", self.seq, core),
            Access::Read => write!(
                f,
                "{:>6} {} read  {:<14} {:#010x} -> {:#010x}",
                self.seq, core, self.reg, self.addr, self.value
            ),
            Access::Write => write!(
                f,
                "{:>6} {} write {:<14} {:#010x} <- {:#010x}",
                self.seq, core, self.reg, self.addr, self.value
            ),
        }
    }
}

/// Hardware behaviour attached to register fields.
#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// `ready` is set `delay` accesses after `enable` is set, and clears with it.
    Ready { enable: Field, ready: Field, delay: u32 },
    /// `status` takes the value written to `request`, `delay` accesses later.
    Mirror { request: Field, status: Field, delay: u32 },
    /// A write to `trigger` raises `busy` for `delay` accesses.
    Busy { trigger: Reg, busy: Field, delay: u32 },
}

/// An access to a protected register by a core not holding its semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub seq: u64,
    pub core: CoreId,
    pub reg: &'static str,
    pub semaphore: u8,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    due: u64,
    field: Field,
    value: u32,
}

struct Protection {
    semaphore: u8,
    addrs: Vec<u32>,
}

struct Hsem {
    r: RegArray,
    rlr: RegArray,
}

struct Inner {
    regs: BTreeMap<u32, u32>,
    names: BTreeMap<u32, &'static str>,
    read_only: BTreeMap<u32, u32>,
    rules: Vec<Rule>,
    pending: Vec<Pending>,
    stuck: Vec<Field>,
    now: u64,
    trace: Vec<Event>,
    hsem: Option<Hsem>,
    protections: Vec<Protection>,
    violations: Vec<Violation>,
    watchdog: Option<u32>,
    idle_reads: u32,
    stalled_at: Option<&'static str>,
}

/// Simulated register file of one family, plus the Cortex-M core registers.
pub struct Sim {
    family: FamilyId,
    inner: Mutex<Inner>,
}

type RegisterMap = (&'static [Reg], &'static [Field], &'static [&'static str]);

fn register_map(family: FamilyId) -> RegisterMap {
    macro_rules! map {
        ($f:ident) => {
            (pac::$f::REGISTERS, pac::$f::FIELDS, pac::$f::FIELD_NAMES)
        };
    }
    match family {
        FamilyId::Stm32f0 => map!(stm32f0),
        FamilyId::Stm32g0 => map!(stm32g0),
        FamilyId::Stm32l0 => map!(stm32l0),
        FamilyId::Stm32l1 => map!(stm32l1),
        FamilyId::Stm32wb => map!(stm32wb),
        FamilyId::Stm32wl => map!(stm32wl),
    }
}

/// Look up a register (`RCC.CR`) of `family` or of the core.
pub fn register_by_name(family: FamilyId, name: &str) -> Option<Reg> {
    let (regs, _, _) = register_map(family);
    pac::cm::REGISTERS
        .iter()
        .chain(regs)
        .find(|r| r.name().eq_ignore_ascii_case(name))
        .copied()
}

/// Look up a field (`RCC.CR.PLLRDY`) of `family` or of the core.
pub fn field_by_name(family: FamilyId, name: &str) -> Option<Field> {
    let (_, fields, names) = register_map(family);
    let cm = pac::cm::FIELD_NAMES.iter().zip(pac::cm::FIELDS);
    cm.chain(names.iter().zip(fields))
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, f)| *f)
}

/// Oscillator, PLL and clock switch behaviour of each family.
pub fn default_rules(family: FamilyId, delay: u32) -> Vec<Rule> {
    let ready = |enable, ready| Rule::Ready {
        enable,
        ready,
        delay,
    };
    let mirror = |request, status| Rule::Mirror {
        request,
        status,
        delay,
    };
    match family {
        FamilyId::Stm32f0 => {
            use pac::stm32f0::rcc::{cfgr, cr, cr2};
            vec![
                ready(cr::HSION, cr::HSIRDY),
                ready(cr::HSEON, cr::HSERDY),
                ready(cr::PLLON, cr::PLLRDY),
                ready(cr2::HSI48ON, cr2::HSI48RDY),
                mirror(cfgr::SW, cfgr::SWS),
            ]
        }
        FamilyId::Stm32g0 => {
            use pac::stm32g0::rcc::{cfgr, cr};
            vec![
                ready(cr::HSION, cr::HSIRDY),
                ready(cr::HSEON, cr::HSERDY),
                ready(cr::HSI48ON, cr::HSI48RDY),
                ready(cr::PLLON, cr::PLLRDY),
                mirror(cfgr::SW, cfgr::SWS),
            ]
        }
        FamilyId::Stm32l0 => {
            use pac::stm32l0::rcc::{cfgr, cr, crrcr};
            vec![
                ready(cr::HSI16ON, cr::HSI16RDYF),
                ready(cr::MSION, cr::MSIRDY),
                ready(cr::HSEON, cr::HSERDY),
                ready(cr::PLLON, cr::PLLRDY),
                ready(crrcr::HSI48ON, crrcr::HSI48RDY),
                mirror(cfgr::SW, cfgr::SWS),
            ]
        }
        FamilyId::Stm32l1 => {
            use pac::stm32l1::pwr;
            use pac::stm32l1::rcc::{cfgr, cr};
            vec![
                ready(cr::HSION, cr::HSIRDY),
                ready(cr::MSION, cr::MSIRDY),
                ready(cr::HSEON, cr::HSERDY),
                ready(cr::PLLON, cr::PLLRDY),
                mirror(cfgr::SW, cfgr::SWS),
                Rule::Busy {
                    trigger: pwr::CR,
                    busy: pwr::csr::VOSF,
                    delay,
                },
            ]
        }
        FamilyId::Stm32wb => {
            use pac::stm32wb::rcc::{cfgr, cr};
            vec![
                ready(cr::MSION, cr::MSIRDY),
                ready(cr::HSION, cr::HSIRDY),
                ready(cr::HSEON, cr::HSERDY),
                ready(cr::PLLON, cr::PLLRDY),
                mirror(cfgr::SW, cfgr::SWS),
            ]
        }
        FamilyId::Stm32wl => {
            use pac::stm32wl::rcc::{cfgr, cr};
            vec![
                ready(cr::MSION, cr::MSIRDY),
                ready(cr::HSION, cr::HSIRDY),
                ready(cr::HSEON, cr::HSERDY),
                ready(cr::PLLON, cr::PLLRDY),
                mirror(cfgr::SW, cfgr::SWS),
            ]
        }
    }
}

impl Sim {
    /// Registers at their reset values, with the family's default rules.
    pub fn new(family: FamilyId) -> Self {
        Self::with_delay(family, DEFAULT_DELAY)
    }

    pub fn with_delay(family: FamilyId, delay: u32) -> Self {
        let mut regs = BTreeMap::new();
        let mut names = BTreeMap::new();
        let mut read_only: BTreeMap<u32, u32> = BTreeMap::new();

        let (family_regs, family_fields, _) = register_map(family);
        for reg in pac::cm::REGISTERS.iter().chain(family_regs) {
            regs.insert(reg.addr(), reg.reset_value());
            names.insert(reg.addr(), reg.name());
        }
        for field in pac::cm::FIELDS.iter().chain(family_fields) {
            if field.is_read_only() {
                *read_only.entry(field.reg().addr()).or_default() |= field.mask();
            }
        }

        let hsem = (family == FamilyId::Stm32wb).then_some(Hsem {
            r: pac::stm32wb::hsem::R,
            rlr: pac::stm32wb::hsem::RLR,
        });

        Self {
            family,
            inner: Mutex::new(Inner {
                regs,
                names,
                read_only,
                rules: default_rules(family, delay),
                pending: Vec::new(),
                stuck: Vec::new(),
                now: 0,
                trace: Vec::new(),
                hsem,
                protections: Vec::new(),
                violations: Vec::new(),
                watchdog: None,
                idle_reads: 0,
                stalled_at: None,
            }),
        }
    }

    pub fn family(&self) -> FamilyId {
        self.family
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A test panicking while holding the lock leaves the register file usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bus handle issuing accesses as `core`.
    pub fn bus(&self, core: CoreId) -> SimBus<'_> {
        SimBus { sim: self, core }
    }

    /// Set a register without recording an access.
    pub fn poke(&self, reg: Reg, value: u32) {
        self.lock().regs.insert(reg.addr(), value);
    }

    /// Read a register without recording an access or advancing time.
    pub fn peek(&self, reg: Reg) -> u32 {
        self.lock().regs.get(&reg.addr()).copied().unwrap_or(0)
    }

    pub fn peek_field(&self, field: Field) -> u32 {
        field.get(self.peek(field.reg()))
    }

    pub fn add_rule(&self, rule: Rule) {
        self.lock().rules.push(rule);
    }

    /// Freeze `field` at its current value: hardware never changes it again.
    pub fn stick(&self, field: Field) {
        let mut inner = self.lock();
        inner.pending.retain(|p| !overlaps(p.field, field));
        inner.stuck.push(field);
    }

    /// Panic once `reads` consecutive reads happen without any write.
    ///
    /// Turns an unbounded poll on a stuck bit into a test failure that names the register.
    pub fn set_poll_watchdog(&self, reads: Option<u32>) {
        self.lock().watchdog = reads;
    }

    /// Register the watchdog fired on, if any.
    pub fn stalled_at(&self) -> Option<&'static str> {
        self.lock().stalled_at
    }

    /// Flag every access to `regs` by a core not holding HSEM `semaphore`.
    pub fn protect(&self, semaphore: u8, regs: &[Reg]) {
        self.lock().protections.push(Protection {
            semaphore,
            addrs: regs.iter().map(|r| r.addr()).collect(),
        });
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.lock().violations.clone()
    }

    pub fn trace(&self) -> Vec<Event> {
        self.lock().trace.clone()
    }

    /// Recorded writes, in order.
    pub fn writes(&self) -> Vec<Event> {
        self.lock()
            .trace
            .iter()
            .filter(|e| e.access == Access::Write)
            .copied()
            .collect()
    }

    pub fn clear_trace(&self) {
        self.lock().trace.clear();
    }

    fn read(&self, core: CoreId, reg: Reg) -> u32 {
        let (value, stalled) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.tick();
            let addr = reg.addr();
            let value = inner.hsem_read(core, addr).unwrap_or_else(|| inner.get(addr));
            inner.record(core, Access::Read, addr, value);
            inner.check_protection(core, addr);

            inner.idle_reads = inner.idle_reads.saturating_add(1);
            let stalled = match inner.watchdog {
                Some(limit) if inner.idle_reads >= limit && inner.stalled_at.is_none() => {
                    let name = inner.name(addr);
                    inner.stalled_at = Some(name);
                    Some(name)
                }
                _ => None,
            };
            (value, stalled)
        };
        if let Some(name) = stalled {
            panic!("sim: {} polled without progress", name);
        }
        value
    }

    fn write(&self, core: CoreId, reg: Reg, value: u32) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.tick();
        let addr = reg.addr();
        inner.idle_reads = 0;
        inner.check_protection(core, addr);
        if !inner.hsem_write(core, addr, value) {
            inner.store(addr, value);
        }
        let stored = inner.get(addr);
        inner.record(core, Access::Write, addr, stored);
    }

    fn barrier(&self, core: CoreId) {
        let mut inner = self.lock();
        inner.record(core, Access::Barrier, 0, 0);
    }
}

fn overlaps(a: Field, b: Field) -> bool {
    a.reg().addr() == b.reg().addr() && a.mask() & b.mask() != 0
}

impl Inner {
    fn get(&self, addr: u32) -> u32 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    fn set_field(&mut self, field: Field, value: u32) {
        let addr = field.reg().addr();
        let v = field.set(self.get(addr), value);
        self.regs.insert(addr, v);
    }

    fn name(&self, addr: u32) -> &'static str {
        if let Some(name) = self.names.get(&addr) {
            return name;
        }
        if let Some(h) = &self.hsem {
            if h.r.index_of(addr).is_some() {
                return "HSEM.R";
            }
            if h.rlr.index_of(addr).is_some() {
                return "HSEM.RLR";
            }
        }
        ""
    }

    fn record(&mut self, core: CoreId, access: Access, addr: u32, value: u32) {
        let seq = self.trace.len() as u64;
        let reg = if access == Access::Barrier {
            ""
        } else {
            self.name(addr)
        };
        self.trace.push(Event {
            seq,
            core,
            access,
            reg,
            addr,
            value,
        });
    }

    /// Advance time by one access and apply due status changes.
    fn tick(&mut self) {
        self.now += 1;
        let now = self.now;
        let (due, later): (Vec<Pending>, Vec<Pending>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = later;
        for p in due {
            if !self.is_stuck(p.field) {
                self.set_field(p.field, p.value);
            }
        }
    }

    fn is_stuck(&self, field: Field) -> bool {
        self.stuck.iter().any(|s| overlaps(*s, field))
    }

    fn schedule(&mut self, field: Field, value: u32, delay: u32) {
        if self.is_stuck(field) {
            return;
        }
        self.pending.retain(|p| !overlaps(p.field, field));
        if delay == 0 {
            self.set_field(field, value);
        } else {
            self.pending.push(Pending {
                due: self.now + delay as u64,
                field,
                value,
            });
        }
    }

    /// Software write: read-only bits keep their value, then the rules react.
    fn store(&mut self, addr: u32, value: u32) {
        let old = self.get(addr);
        let ro = self.read_only.get(&addr).copied().unwrap_or(0);
        let new = (value & !ro) | (old & ro);
        self.regs.insert(addr, new);

        let rules = self.rules.clone();
        for rule in rules {
            match rule {
                Rule::Ready {
                    enable,
                    ready,
                    delay,
                } if enable.reg().addr() == addr => {
                    if enable.get(new) != 0 {
                        let rdy = ready.get(self.get(ready.reg().addr()));
                        if rdy == 0 && !self.pending.iter().any(|p| overlaps(p.field, ready)) {
                            self.schedule(ready, 1, delay);
                        }
                    } else {
                        self.schedule(ready, 0, 0);
                    }
                }
                Rule::Mirror {
                    request,
                    status,
                    delay,
                } if request.reg().addr() == addr => {
                    self.schedule(status, request.get(new), delay);
                }
                Rule::Busy {
                    trigger,
                    busy,
                    delay,
                } if trigger.addr() == addr => {
                    if !self.is_stuck(busy) {
                        self.set_field(busy, 1);
                    }
                    self.schedule(busy, 0, delay);
                }
                _ => {}
            }
        }
    }

    /// One-step lock: reading `RLR[n]` takes a free semaphore for the reading core.
    fn hsem_read(&mut self, core: CoreId, addr: u32) -> Option<u32> {
        let (r, n) = {
            let h = self.hsem.as_ref()?;
            if let Some(n) = h.rlr.index_of(addr) {
                (h.r, n)
            } else {
                return None;
            }
        };
        let lock = pac::stm32wb::hsem::r::LOCK;
        let coreid = pac::stm32wb::hsem::r::COREID;
        let raddr = r.at(n).addr();
        let mut v = self.get(raddr);
        if v & lock.mask() == 0 {
            v = lock.mask() | coreid.val(core.raw());
            self.regs.insert(raddr, v);
        }
        Some(v)
    }

    /// Writes to `R[n]`: `LOCK = 0` with the owner's ids frees, `LOCK = 1` is a two-step lock.
    /// Returns `false` for non-HSEM addresses.
    fn hsem_write(&mut self, core: CoreId, addr: u32, value: u32) -> bool {
        let Some(h) = self.hsem.as_ref() else {
            return false;
        };
        if h.rlr.index_of(addr).is_some() {
            // RLR is read-only.
            return true;
        }
        if h.r.index_of(addr).is_none() {
            return false;
        }
        use pac::stm32wb::hsem::r::{COREID, LOCK, PROCID};
        let cur = self.get(addr);
        let ids = COREID.mask() | PROCID.mask();
        let own = COREID.get(value) == core.raw();
        if value & LOCK.mask() == 0 {
            if cur & LOCK.mask() != 0 && own && cur & ids == value & ids {
                self.regs.insert(addr, 0);
            }
        } else if cur & LOCK.mask() == 0 && own {
            self.regs.insert(addr, value & (LOCK.mask() | ids));
        }
        true
    }

    fn check_protection(&mut self, core: CoreId, addr: u32) {
        let Some(h) = self.hsem.as_ref() else {
            return;
        };
        let r = h.r;
        let mut hits = Vec::new();
        for p in &self.protections {
            if p.addrs.contains(&addr) {
                let v = self.get(r.at(p.semaphore as u32).addr());
                let lock = pac::stm32wb::hsem::r::LOCK;
                let coreid = pac::stm32wb::hsem::r::COREID;
                if v & lock.mask() == 0 || coreid.get(v) != core.raw() {
                    hits.push(p.semaphore);
                }
            }
        }
        for semaphore in hits {
            let seq = self.trace.len() as u64;
            let reg = self.name(addr);
            self.violations.push(Violation {
                seq,
                core,
                reg,
                semaphore,
            });
        }
    }
}

/// [`RegisterAccess`] on a [`Sim`] as one core.
#[derive(Clone, Copy)]
pub struct SimBus<'a> {
    sim: &'a Sim,
    core: CoreId,
}

impl SimBus<'_> {
    pub fn core(&self) -> CoreId {
        self.core
    }
}

impl RegisterAccess for SimBus<'_> {
    fn read(&self, reg: Reg) -> u32 {
        self.sim.read(self.core, reg)
    }

    fn write(&self, reg: Reg, value: u32) {
        self.sim.write(self.core, reg, value)
    }

    fn barrier(&self) {
        self.sim.barrier(self.core)
    }
}

/// Serializes tests that touch the published clock state.
#[cfg(test)]
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pac::stm32wb::hsem::{R, RLR};

    #[test]
    fn ready_follows_enable_after_delay() {
        use pac::stm32wb::rcc::{cr, CR};
        let sim = Sim::with_delay(FamilyId::Stm32wb, 2);
        let bus = sim.bus(CoreId::Cpu1);
        bus.set_bit(cr::HSEON);
        assert!(!bus.is_set(cr::HSERDY));
        assert!(bus.is_set(cr::HSERDY));
        bus.clear_bit(cr::HSEON);
        assert_eq!(sim.peek_field(cr::HSERDY), 0);
        assert_eq!(sim.peek(CR) & cr::HSEON.mask(), 0);
    }

    #[test]
    fn read_only_bits_ignore_writes() {
        use pac::stm32wb::rcc::{cfgr, CFGR};
        let sim = Sim::new(FamilyId::Stm32wb);
        sim.bus(CoreId::Cpu1).write(CFGR, cfgr::SWS.val(3));
        assert_eq!(sim.peek_field(cfgr::SWS), 0);
    }

    #[test]
    fn stuck_field_never_changes() {
        use pac::stm32wb::rcc::cr;
        let sim = Sim::with_delay(FamilyId::Stm32wb, 1);
        sim.stick(cr::PLLRDY);
        let bus = sim.bus(CoreId::Cpu1);
        bus.set_bit(cr::PLLON);
        for _ in 0..10 {
            assert!(!bus.is_set(cr::PLLRDY));
        }
    }

    #[test]
    fn fields_are_found_by_name() {
        use pac::stm32wb::rcc::{cr, CR};
        assert_eq!(field_by_name(FamilyId::Stm32wb, "rcc.cr.pllrdy"), Some(cr::PLLRDY));
        assert_eq!(register_by_name(FamilyId::Stm32wb, "RCC.CR"), Some(CR));
        assert_eq!(
            field_by_name(FamilyId::Stm32l0, "SYSTICK.CTRL.ENABLE"),
            Some(pac::cm::systick::ctrl::ENABLE)
        );
        assert_eq!(field_by_name(FamilyId::Stm32l0, "RCC.CR.PLLQ"), None);
    }

    #[test]
    fn one_step_lock_is_exclusive() {
        let sim = Sim::new(FamilyId::Stm32wb);
        let cpu1 = sim.bus(CoreId::Cpu1);
        let cpu2 = sim.bus(CoreId::Cpu2);

        assert_eq!(cpu1.read(RLR.at(3)), 0x8000_0400);
        assert_eq!(cpu2.read(RLR.at(3)), 0x8000_0400);

        // Wrong owner cannot release.
        cpu2.write(R.at(3), 0x0000_0800);
        assert_eq!(sim.peek(R.at(3)), 0x8000_0400);

        cpu1.write(R.at(3), 0x0000_0400);
        assert_eq!(sim.peek(R.at(3)), 0);
        assert_eq!(cpu2.read(RLR.at(3)), 0x8000_0800);
    }

    #[test]
    fn protection_flags_unlocked_access() {
        use pac::stm32wb::rcc::CR;
        let sim = Sim::new(FamilyId::Stm32wb);
        sim.protect(3, &[CR]);
        let cpu1 = sim.bus(CoreId::Cpu1);
        cpu1.read(CR);
        assert_eq!(sim.violations().len(), 1);

        cpu1.read(RLR.at(3));
        cpu1.read(CR);
        assert_eq!(sim.violations().len(), 1);
        sim.bus(CoreId::Cpu2).read(CR);
        assert_eq!(sim.violations().len(), 2);
    }
}
