//! Typed register access.
//!
//! Every step of the bring-up sequence goes through [`RegisterAccess`], so the same code can
//! drive real silicon ([`Mmio`]) or the host-side register file simulator.
//!
//! Register and field descriptions are generated from `data/*.yaml` into [`crate::pac`].

/// A 32-bit memory-mapped register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg {
    name: &'static str,
    addr: u32,
    reset: u32,
}

impl Reg {
    pub const fn new(name: &'static str, addr: u32, reset: u32) -> Self {
        Self { name, addr, reset }
    }

    /// `BLOCK.REGISTER` name, for traces and logs.
    pub const fn name(self) -> &'static str {
        self.name
    }

    pub const fn addr(self) -> u32 {
        self.addr
    }

    /// Value after a power-on reset.
    pub const fn reset_value(self) -> u32 {
        self.reset
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Reg {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}@{:#010x}", self.name, self.addr)
    }
}

/// A register repeated at a fixed stride (e.g. the 32 HSEM channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegArray {
    name: &'static str,
    addr: u32,
    reset: u32,
    len: u32,
    stride: u32,
}

impl RegArray {
    pub const fn new(name: &'static str, addr: u32, reset: u32, len: u32, stride: u32) -> Self {
        Self {
            name,
            addr,
            reset,
            len,
            stride,
        }
    }

    /// Register `n` of the array.
    ///
    /// Panics if `n` is out of range.
    pub const fn at(self, n: u32) -> Reg {
        if n >= self.len {
            ::core::panic!("register array index out of range");
        }
        Reg::new(self.name, self.addr + n * self.stride, self.reset)
    }

    /// Index of the register at `addr`, if it belongs to this array.
    pub const fn index_of(self, addr: u32) -> Option<u32> {
        if addr < self.addr {
            return None;
        }
        let off = addr - self.addr;
        if off % self.stride != 0 || off / self.stride >= self.len {
            return None;
        }
        Some(off / self.stride)
    }
}

/// A bit field within a [`Reg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    reg: Reg,
    pos: u8,
    width: u8,
    read_only: bool,
}

impl Field {
    pub const fn new(reg: Reg, pos: u8, width: u8, read_only: bool) -> Self {
        Self {
            reg,
            pos,
            width,
            read_only,
        }
    }

    pub const fn reg(self) -> Reg {
        self.reg
    }

    pub const fn pos(self) -> u8 {
        self.pos
    }

    pub const fn width(self) -> u8 {
        self.width
    }

    /// Status fields are written by hardware only.
    pub const fn is_read_only(self) -> bool {
        self.read_only
    }

    /// Mask of the field, in register position.
    pub const fn mask(self) -> u32 {
        let raw = if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        };
        raw << self.pos
    }

    /// Extract this field from a raw register value.
    pub const fn get(self, raw: u32) -> u32 {
        (raw & self.mask()) >> self.pos
    }

    /// Replace this field in a raw register value.
    ///
    /// Bits of `value` that do not fit the field are dropped.
    pub const fn set(self, raw: u32, value: u32) -> u32 {
        (raw & !self.mask()) | ((value << self.pos) & self.mask())
    }

    /// `value` shifted into position, for building whole-register writes.
    pub const fn val(self, value: u32) -> u32 {
        self.set(0, value)
    }
}

/// Read/modify/write access to memory-mapped registers.
///
/// Implementations must perform every access in program order. [`barrier`](Self::barrier)
/// additionally guarantees that all earlier writes have completed before anything after it is
/// issued.
pub trait RegisterAccess {
    fn read(&self, reg: Reg) -> u32;

    fn write(&self, reg: Reg, value: u32);

    /// Complete all outstanding writes before continuing.
    fn barrier(&self);

    fn modify(&self, reg: Reg, f: impl FnOnce(u32) -> u32) {
        let v = self.read(reg);
        self.write(reg, f(v));
    }

    fn read_field(&self, field: Field) -> u32 {
        field.get(self.read(field.reg()))
    }

    fn write_field(&self, field: Field, value: u32) {
        self.modify(field.reg(), |r| field.set(r, value));
    }

    fn set_bit(&self, field: Field) {
        self.modify(field.reg(), |r| r | field.mask());
    }

    fn clear_bit(&self, field: Field) {
        self.modify(field.reg(), |r| r & !field.mask());
    }

    fn is_set(&self, field: Field) -> bool {
        self.read(field.reg()) & field.mask() != 0
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &T {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }

    fn barrier(&self) {
        (**self).barrier()
    }
}

/// Volatile access to the real memory-mapped registers.
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// Gives unsynchronized access to every register of the device. The caller must be the
    /// only code configuring the clock tree on this core.
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl RegisterAccess for Mmio {
    #[inline]
    fn read(&self, reg: Reg) -> u32 {
        unsafe { core::ptr::read_volatile(reg.addr() as usize as *const u32) }
    }

    #[inline]
    fn write(&self, reg: Reg, value: u32) {
        unsafe { core::ptr::write_volatile(reg.addr() as usize as *mut u32, value) }
    }

    #[inline]
    fn barrier(&self) {
        #[cfg(target_arch = "arm")]
        {
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
        }
        #[cfg(not(target_arch = "arm"))]
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: Reg = Reg::new("TEST.R", 0x4000_0000, 0);
    const PLLN: Field = Field::new(R, 8, 7, false);

    #[test]
    fn field_set_keeps_neighbours() {
        let raw = 0xFFFF_FFFF;
        let v = PLLN.set(raw, 24);
        assert_eq!(PLLN.get(v), 24);
        assert_eq!(v | PLLN.mask(), 0xFFFF_FFFF);
        assert_eq!(v & 0xFF, 0xFF);
    }

    #[test]
    fn field_set_truncates_wide_values() {
        assert_eq!(PLLN.val(0x1FF), 0x7F << 8);
    }

    #[test]
    fn array_indexing() {
        let a = RegArray::new("HSEM.R", 0x5800_1400, 0, 32, 4);
        assert_eq!(a.at(3).addr(), 0x5800_140C);
        assert_eq!(a.index_of(0x5800_140C), Some(3));
        assert_eq!(a.index_of(0x5800_140D), None);
        assert_eq!(a.index_of(0x5800_1480), None);
    }
}
