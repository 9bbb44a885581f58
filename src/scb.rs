//! System control block: interrupt priority grouping, configurable fault enables, and
//! handlers for the system exceptions.

#[cfg(hw)]
use cortex_m::peripheral::SCB;

use crate::{
    nvic::{HandlerTable, InterruptError},
    regs::RegAccess,
};

const AIRCR_VECTKEY: u32 = 0x05FA << 16;
const AIRCR_PRIGROUP: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScbReg {
    Aircr,
    Ccr,
    Shcsr,
}

#[cfg(hw)]
impl RegAccess<ScbReg> for SCB {
    fn read(&self, reg: ScbReg) -> u32 {
        match reg {
            ScbReg::Aircr => self.aircr.read(),
            ScbReg::Ccr => self.ccr.read(),
            ScbReg::Shcsr => self.shcsr.read(),
        }
    }

    fn write(&mut self, reg: ScbReg, value: u32) {
        unsafe {
            match reg {
                ScbReg::Aircr => self.aircr.write(value),
                ScbReg::Ccr => self.ccr.write(value),
                ScbReg::Shcsr => self.shcsr.write(value),
            }
        }
    }
}

/// How the 4 priority bits split into preemption priority (group) and subpriority. Set with
/// AIRCR.PRIGROUP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum PriorityGroup {
    /// 16 preemption levels, no subpriority.
    Group16Sub1 = 0,
    Group8Sub2 = 4,
    Group4Sub4 = 5,
    Group2Sub8 = 6,
    /// No preemption between configurable interrupts; 16 subpriorities.
    Group1Sub16 = 7,
}

impl TryFrom<u8> for PriorityGroup {
    type Error = InterruptError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Ok(match val {
            0 => Self::Group16Sub1,
            4 => Self::Group8Sub2,
            5 => Self::Group4Sub4,
            6 => Self::Group2Sub8,
            7 => Self::Group1Sub16,
            _ => return Err(InterruptError::PriorityGroup),
        })
    }
}

/// Fault sources that can be enabled individually. The value is the enable bit: the traps are
/// in CCR, the fault handlers in SHCSR. Disabled faults escalate to HardFault, and disabled
/// traps don't fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Fault {
    /// Unaligned word and halfword accesses raise UsageFault.
    UnalignedTrap = 3,
    /// Integer division by 0 raises UsageFault.
    DivByZeroTrap = 4,
    MemManage = 16,
    BusFault = 17,
    UsageFault = 18,
}

impl Fault {
    fn reg(self) -> ScbReg {
        match self {
            Self::UnalignedTrap | Self::DivByZeroTrap => ScbReg::Ccr,
            _ => ScbReg::Shcsr,
        }
    }
}

pub struct Scb<R> {
    pub regs: R,
}

impl<R> Scb<R>
where
    R: RegAccess<ScbReg>,
{
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn set_priority_grouping(&mut self, group: PriorityGroup) {
        // Writes without the key are ignored.
        self.regs.write(
            ScbReg::Aircr,
            AIRCR_VECTKEY | ((group as u32) << AIRCR_PRIGROUP),
        );
    }

    /// The raw PRIGROUP value. 1 to 3 behave as 0.
    pub fn priority_grouping(&self) -> u8 {
        self.regs.read_field(ScbReg::Aircr, AIRCR_PRIGROUP, 0b111) as u8
    }

    pub fn enable_fault(&mut self, fault: Fault) {
        self.regs.set_bits(fault.reg(), 1 << fault as u8);
    }

    pub fn disable_fault(&mut self, fault: Fault) {
        self.regs.clear_bits(fault.reg(), 1 << fault as u8);
    }

    pub fn is_fault_enabled(&self, fault: Fault) -> bool {
        self.regs.is_set(fault.reg(), fault as u8)
    }
}

/// System exceptions that can be given a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Exception {
    Nmi = 0,
    HardFault = 1,
    MemManage = 2,
    BusFault = 3,
    UsageFault = 4,
    SvCall = 5,
    DebugMonitor = 6,
    PendSv = 7,
}

/// Handlers for the system exceptions, for calling from the `#[exception]` functions.
#[derive(Clone, Copy, Default)]
pub struct ExceptionHandlers {
    table: HandlerTable<8>,
}

impl ExceptionHandlers {
    pub const fn new() -> Self {
        Self {
            table: HandlerTable::new(),
        }
    }

    pub fn register(
        &mut self,
        exception: Exception,
        handler: Option<fn()>,
    ) -> Result<(), InterruptError> {
        let handler = handler.ok_or(InterruptError::NullArgument)?;
        self.table.register(exception as usize, handler)
    }

    /// Run the exception's handler, if one is registered. Returns `false` if there isn't one.
    pub fn dispatch(&self, exception: Exception) -> bool {
        self.table.call(exception as usize)
    }
}
