//! System configuration controller: routing GPIO pins to EXTI lines 0 to 15.
//!
//! The SYSCFG clock must be enabled first, eg with
//! `rcc.enable_peripheral(Bus::Apb2, apb2::SYSCFG)`.

#[cfg(hw)]
use crate::pac;
use crate::{exti::ExtiLine, macros::log_warn, nvic::InterruptError, regs::RegAccess};

/// EXTI configuration registers 1 to 4, each holding 4 lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyscfgReg {
    Exticr(u8),
}

#[cfg(hw)]
impl RegAccess<SyscfgReg> for pac::SYSCFG {
    fn read(&self, reg: SyscfgReg) -> u32 {
        let SyscfgReg::Exticr(i) = reg;
        match i {
            0 => self.exticr1().read().bits(),
            1 => self.exticr2().read().bits(),
            2 => self.exticr3().read().bits(),
            _ => self.exticr4().read().bits(),
        }
    }

    fn write(&mut self, reg: SyscfgReg, value: u32) {
        let SyscfgReg::Exticr(i) = reg;
        unsafe {
            match i {
                0 => self.exticr1().write(|w| w.bits(value)),
                1 => self.exticr2().write(|w| w.bits(value)),
                2 => self.exticr3().write(|w| w.bits(value)),
                _ => self.exticr4().write(|w| w.bits(value)),
            };
        }
    }
}

/// GPIO ports, as coded in EXTICR.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
    G = 6,
    H = 7,
}

impl TryFrom<u8> for Port {
    type Error = InterruptError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Ok(match val {
            0 => Self::A,
            1 => Self::B,
            2 => Self::C,
            3 => Self::D,
            4 => Self::E,
            5 => Self::F,
            6 => Self::G,
            7 => Self::H,
            _ => return Err(InterruptError::Port),
        })
    }
}

pub struct Syscfg<R> {
    pub regs: R,
}

impl<R> Syscfg<R>
where
    R: RegAccess<SyscfgReg>,
{
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Select which port's pin drives an EXTI line. eg `(L5, Port::C)` routes PC5 to line 5.
    /// Only lines 0 to 15 are GPIO lines; others give `InterruptError::Line`.
    pub fn set_exti_port(&mut self, line: ExtiLine, port: Port) -> Result<(), InterruptError> {
        let line = line as u8;
        if line > 15 {
            log_warn!("EXTI line {} isn't a GPIO line", line);
            return Err(InterruptError::Line);
        }

        self.regs.write_field(
            SyscfgReg::Exticr(line / 4),
            (line % 4) * 4,
            0b1111,
            port as u32,
        );
        Ok(())
    }

    /// The port currently routed to a GPIO EXTI line.
    pub fn exti_port(&self, line: ExtiLine) -> Result<Port, InterruptError> {
        let line = line as u8;
        if line > 15 {
            return Err(InterruptError::Line);
        }

        let bits = self
            .regs
            .read_field(SyscfgReg::Exticr(line / 4), (line % 4) * 4, 0b1111);
        Port::try_from(bits as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::sim::RegFile;

    #[test]
    fn exticr_field_per_line() {
        let mut syscfg = Syscfg::new(RegFile::new());
        syscfg.regs.set(SyscfgReg::Exticr(1), 0xffff);

        syscfg.set_exti_port(ExtiLine::L5, Port::C).unwrap();
        syscfg.set_exti_port(ExtiLine::L0, Port::H).unwrap();
        syscfg.set_exti_port(ExtiLine::L15, Port::B).unwrap();

        assert_eq!(syscfg.regs.get(SyscfgReg::Exticr(1)), 0xff2f);
        assert_eq!(syscfg.regs.get(SyscfgReg::Exticr(0)), 7);
        assert_eq!(syscfg.regs.get(SyscfgReg::Exticr(3)), 1 << 12);
        assert_eq!(syscfg.exti_port(ExtiLine::L5), Ok(Port::C));
        assert_eq!(syscfg.exti_port(ExtiLine::L6), Err(InterruptError::Port));
    }

    #[test]
    fn internal_lines_and_bad_ports_are_rejected() {
        let mut syscfg = Syscfg::new(RegFile::new());
        assert_eq!(
            syscfg.set_exti_port(ExtiLine::L16, Port::A),
            Err(InterruptError::Line)
        );
        assert!(syscfg.regs.writes.is_empty());
        assert_eq!(Port::try_from(8), Err(InterruptError::Port));
    }
}
