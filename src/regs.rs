//! Register access used by the drivers in this crate.
//!
//! Each peripheral names its registers with a small enum (eg `RccReg`, `I2cReg`), and drivers
//! are generic over a type that can read and write those registers. On target, this is
//! implemented for the PAC and Cortex-M peripheral singletons. Host tests implement it with
//! simulated register files.

/// Read and write access to a peripheral's 32-bit registers, named by `R`.
pub trait RegAccess<R: Copy> {
    /// Read the full register.
    fn read(&self, reg: R) -> u32;

    /// Write the full register.
    fn write(&mut self, reg: R, value: u32);

    /// Read-modify-write.
    fn modify(&mut self, reg: R, f: impl FnOnce(u32) -> u32) {
        let val = self.read(reg);
        self.write(reg, f(val));
    }

    /// Set the bits in `mask`, leaving the others untouched.
    fn set_bits(&mut self, reg: R, mask: u32) {
        self.modify(reg, |v| v | mask);
    }

    /// Clear the bits in `mask`, leaving the others untouched.
    fn clear_bits(&mut self, reg: R, mask: u32) {
        self.modify(reg, |v| v & !mask);
    }

    /// Replace the field at `shift`, `mask` wide (unshifted), with `value`.
    fn write_field(&mut self, reg: R, shift: u8, mask: u32, value: u32) {
        self.modify(reg, |v| (v & !(mask << shift)) | ((value & mask) << shift));
    }

    /// Read the field at `shift`, `mask` wide (unshifted).
    fn read_field(&self, reg: R, shift: u8, mask: u32) -> u32 {
        (self.read(reg) >> shift) & mask
    }

    fn is_set(&self, reg: R, bit: u8) -> bool {
        self.read(reg) & (1 << bit) != 0
    }
}

/// Implements `RegAccess` for a PAC peripheral whose register accessors are named after
/// the lowercase enum variants. eg `RccReg::Pllcfgr` -> `rcc.pllcfgr()`. Read-only registers
/// go in the `ro` list; writes to them are discarded.
#[cfg(hw)]
macro_rules! impl_reg_access {
    ($periph:ty, $reg:ident, rw: [$($rw:ident),* $(,)?] $(, ro: [$($ro:ident),* $(,)?])?) => {
        paste::paste! {
            impl $crate::regs::RegAccess<$reg> for $periph {
                fn read(&self, reg: $reg) -> u32 {
                    match reg {
                        $($reg::$rw => self.[<$rw:lower>]().read().bits() as u32,)*
                        $($($reg::$ro => self.[<$ro:lower>]().read().bits() as u32,)*)?
                    }
                }

                fn write(&mut self, reg: $reg, value: u32) {
                    match reg {
                        $($reg::$rw => {
                            self.[<$rw:lower>]().write(|w| unsafe { w.bits(value as _) });
                        })*
                        $($($reg::$ro => (),)*)?
                    }
                }
            }
        }
    };
}

#[cfg(hw)]
pub(crate) use impl_reg_access;
