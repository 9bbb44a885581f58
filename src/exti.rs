//! External interrupt and event controller (EXTI). Configures line triggers and masks, and
//! dispatches to handlers registered per line.
//!
//! Lines 0 to 15 are GPIO pins; select the port for each with `syscfg::Syscfg::set_exti_port`.
//! The others are internal sources; eg line 17 is the RTC alarm.
//!
//! To use from interrupt handlers, store the `Exti` in a global with `make_globals!`, and call
//! `on_interrupt` or `on_shared_interrupt` from the vector:
//!
//! ```rust,ignore
//! make_globals!((EXTI, Exti<pac::EXTI>));
//!
//! #[interrupt]
//! fn EXTI9_5() {
//!     critical_section::with(|cs| {
//!         access_global!(EXTI, exti, cs);
//!         exti.on_shared_interrupt(&EXTI9_5).ok();
//!     });
//! }
//! ```

#[cfg(hw)]
use crate::{pac, regs::impl_reg_access};
use crate::{
    macros::log_warn,
    nvic::{HandlerTable, Interrupt, InterruptError},
    regs::RegAccess,
};

const NUM_LINES: usize = 23;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtiReg {
    Imr,
    Emr,
    Rtsr,
    Ftsr,
    Swier,
    Pr,
}

#[cfg(hw)]
impl_reg_access!(pac::EXTI, ExtiReg, rw: [Imr, Emr, Rtsr, Ftsr, Swier, Pr]);

/// EXTI lines. There's no line 19 on this device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum ExtiLine {
    L0 = 0,
    L1 = 1,
    L2 = 2,
    L3 = 3,
    L4 = 4,
    L5 = 5,
    L6 = 6,
    L7 = 7,
    L8 = 8,
    L9 = 9,
    L10 = 10,
    L11 = 11,
    L12 = 12,
    L13 = 13,
    L14 = 14,
    L15 = 15,
    /// PVD output
    L16 = 16,
    /// RTC alarm
    L17 = 17,
    /// USB OTG FS wakeup
    L18 = 18,
    /// USB OTG HS wakeup
    L20 = 20,
    /// RTC tamper and timestamp
    L21 = 21,
    /// RTC wakeup
    L22 = 22,
}

/// Lines sharing the `EXTI9_5` vector.
pub const EXTI9_5: [ExtiLine; 5] = [
    ExtiLine::L5,
    ExtiLine::L6,
    ExtiLine::L7,
    ExtiLine::L8,
    ExtiLine::L9,
];

/// Lines sharing the `EXTI15_10` vector.
pub const EXTI15_10: [ExtiLine; 6] = [
    ExtiLine::L10,
    ExtiLine::L11,
    ExtiLine::L12,
    ExtiLine::L13,
    ExtiLine::L14,
    ExtiLine::L15,
];

impl TryFrom<u8> for ExtiLine {
    type Error = InterruptError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Ok(match val {
            0 => Self::L0,
            1 => Self::L1,
            2 => Self::L2,
            3 => Self::L3,
            4 => Self::L4,
            5 => Self::L5,
            6 => Self::L6,
            7 => Self::L7,
            8 => Self::L8,
            9 => Self::L9,
            10 => Self::L10,
            11 => Self::L11,
            12 => Self::L12,
            13 => Self::L13,
            14 => Self::L14,
            15 => Self::L15,
            16 => Self::L16,
            17 => Self::L17,
            18 => Self::L18,
            20 => Self::L20,
            21 => Self::L21,
            22 => Self::L22,
            _ => return Err(InterruptError::Line),
        })
    }
}

impl ExtiLine {
    fn bit(self) -> u32 {
        1 << self as u8
    }

    /// The NVIC interrupt this line is routed to.
    pub fn irq(self) -> Interrupt {
        match self as u8 {
            0 => Interrupt::EXTI0,
            1 => Interrupt::EXTI1,
            2 => Interrupt::EXTI2,
            3 => Interrupt::EXTI3,
            4 => Interrupt::EXTI4,
            5..=9 => Interrupt::EXTI9_5,
            10..=15 => Interrupt::EXTI15_10,
            16 => Interrupt::PVD,
            17 => Interrupt::RTC_ALARM,
            18 => Interrupt::OTG_FS_WKUP,
            20 => Interrupt::OTG_HS_WKUP,
            21 => Interrupt::TAMP_STAMP,
            _ => Interrupt::RTC_WKUP,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum Trigger {
    Rising,
    Falling,
    Both,
}

#[derive(Clone, Copy, Debug)]
pub struct ExtiConfig {
    pub line: ExtiLine,
    pub trigger: Trigger,
    /// Unmask the interrupt after configuring it.
    pub enabled: bool,
    /// Called from `on_interrupt` when this line fires. Required.
    pub handler: Option<fn()>,
}

/// Represents the EXTI peripheral, and a handler for each line.
pub struct Exti<R> {
    pub regs: R,
    handlers: HandlerTable<NUM_LINES>,
}

impl<R> Exti<R>
where
    R: RegAccess<ExtiReg>,
{
    pub fn new(regs: R) -> Self {
        Self {
            regs,
            handlers: HandlerTable::new(),
        }
    }

    /// Register a line's handler, set its trigger, and mask or unmask it.
    pub fn init(&mut self, cfg: &ExtiConfig) -> Result<(), InterruptError> {
        let Some(handler) = cfg.handler else {
            log_warn!("No handler for EXTI line {}", cfg.line as u8);
            return Err(InterruptError::NullArgument);
        };

        self.handlers.register(cfg.line as usize, handler)?;
        self.set_trigger(cfg.line, cfg.trigger);

        if cfg.enabled {
            self.enable(cfg.line);
        } else {
            self.disable(cfg.line);
        }
        Ok(())
    }

    pub fn set_trigger(&mut self, line: ExtiLine, trigger: Trigger) {
        let bit = line.bit();
        match trigger {
            Trigger::Rising => {
                self.regs.set_bits(ExtiReg::Rtsr, bit);
                self.regs.clear_bits(ExtiReg::Ftsr, bit);
            }
            Trigger::Falling => {
                self.regs.set_bits(ExtiReg::Ftsr, bit);
                self.regs.clear_bits(ExtiReg::Rtsr, bit);
            }
            Trigger::Both => {
                self.regs.set_bits(ExtiReg::Rtsr, bit);
                self.regs.set_bits(ExtiReg::Ftsr, bit);
            }
        }
    }

    /// Unmask the line's interrupt.
    pub fn enable(&mut self, line: ExtiLine) {
        self.regs.set_bits(ExtiReg::Imr, line.bit());
    }

    pub fn disable(&mut self, line: ExtiLine) {
        self.regs.clear_bits(ExtiReg::Imr, line.bit());
    }

    pub fn clear_pending(&mut self, line: ExtiLine) {
        // rc_w1: a read-modify-write would clear every pending line.
        self.regs.write(ExtiReg::Pr, line.bit());
    }

    pub fn is_pending(&self, line: ExtiLine) -> bool {
        self.regs.read(ExtiReg::Pr) & line.bit() != 0
    }

    /// Raise the line's interrupt from software. It must be unmasked.
    pub fn software_trigger(&mut self, line: ExtiLine) {
        self.regs.set_bits(ExtiReg::Swier, line.bit());
    }

    /// Call from the line's interrupt vector. Clears the pending flag, then runs the handler.
    pub fn on_interrupt(&mut self, line: ExtiLine) -> Result<(), InterruptError> {
        self.clear_pending(line);

        if self.handlers.call(line as usize) {
            Ok(())
        } else {
            log_warn!("Unhandled EXTI line {}", line as u8);
            Err(InterruptError::Unregistered)
        }
    }

    /// Call from a vector shared by several lines, eg `EXTI9_5`. Handles each line that's
    /// pending.
    pub fn on_shared_interrupt(&mut self, lines: &[ExtiLine]) -> Result<(), InterruptError> {
        let mut result = Ok(());
        for line in lines {
            if self.is_pending(*line) {
                if let Err(e) = self.on_interrupt(*line) {
                    result = Err(e);
                }
            }
        }
        result
    }
}
