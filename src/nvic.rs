//! Nested vectored interrupt controller: enabling, pending and prioritizing the F446's
//! peripheral interrupts. Also contains the handler table used by `exti` and `scb`.
//!
//! Interrupts are named with the PAC's `Interrupt` enum, eg `Interrupt::EXTI15_10`. Methods take
//! any `InterruptNumber`, as `cortex_m::peripheral::NVIC`'s do.

use cortex_m::interrupt::InterruptNumber;
#[cfg(hw)]
use cortex_m::peripheral::NVIC;

pub use crate::pac::Interrupt;
use crate::{macros::log_warn, regs::RegAccess};

#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum InterruptError {
    /// Not an interrupt number on this device.
    Irq,
    /// Not an EXTI line on this device.
    Line,
    /// Priority above 15.
    Priority,
    PriorityGroup,
    /// A handler is required.
    NullArgument,
    /// Not a GPIO port on this device.
    Port,
    /// No handler is registered for the interrupt that fired.
    Unregistered,
    /// Past the end of a handler table.
    TableIndex,
}

/// Highest priority value; 4 bits are implemented.
pub const MAX_PRIORITY: u8 = 15;

/// NVIC registers. The index is the register's position in its array: `Ipr` is byte-indexed by
/// interrupt number, the others hold 32 interrupts each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NvicReg {
    Iser(u8),
    Icer(u8),
    Ispr(u8),
    Icpr(u8),
    Iabr(u8),
    Ipr(u8),
}

#[cfg(hw)]
impl RegAccess<NvicReg> for NVIC {
    fn read(&self, reg: NvicReg) -> u32 {
        match reg {
            NvicReg::Iser(i) => self.iser[i as usize].read(),
            NvicReg::Icer(i) => self.icer[i as usize].read(),
            NvicReg::Ispr(i) => self.ispr[i as usize].read(),
            NvicReg::Icpr(i) => self.icpr[i as usize].read(),
            NvicReg::Iabr(i) => self.iabr[i as usize].read(),
            NvicReg::Ipr(i) => self.ipr[i as usize].read() as u32,
        }
    }

    fn write(&mut self, reg: NvicReg, value: u32) {
        unsafe {
            match reg {
                NvicReg::Iser(i) => self.iser[i as usize].write(value),
                NvicReg::Icer(i) => self.icer[i as usize].write(value),
                NvicReg::Ispr(i) => self.ispr[i as usize].write(value),
                NvicReg::Icpr(i) => self.icpr[i as usize].write(value),
                // Read only
                NvicReg::Iabr(_) => (),
                NvicReg::Ipr(i) => self.ipr[i as usize].write(value as u8),
            }
        }
    }
}

/// Last peripheral interrupt, FMPI2C1_ERROR.
const LAST_IRQ: u8 = 96;

/// Reserved positions in the F446's vector table.
const RESERVED_IRQS: [u8; 11] = [61, 62, 79, 80, 82, 83, 85, 86, 88, 89, 90];

/// Look up a peripheral interrupt by its position in the vector table. Positions the F446
/// doesn't implement give `InterruptError::Irq`.
pub fn interrupt_from_number(irq: u8) -> Result<Interrupt, InterruptError> {
    if irq > LAST_IRQ || RESERVED_IRQS.contains(&irq) {
        log_warn!("No interrupt {} on this device", irq);
        return Err(InterruptError::Irq);
    }
    // `Interrupt` is `repr(u16)` with a variant at every other position up to `LAST_IRQ`.
    Ok(unsafe { core::mem::transmute::<u16, Interrupt>(irq as u16) })
}

/// Register index and bit, for the 32-interrupt-wide registers.
fn position<I: InterruptNumber>(irq: I) -> (u8, u32) {
    let n = irq.number();
    ((n / 32) as u8, 1 << (n % 32))
}

pub struct Nvic<R> {
    pub regs: R,
}

impl<R> Nvic<R>
where
    R: RegAccess<NvicReg>,
{
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    // ISER, ICER, ISPR and ICPR ignore 0 bits, so a plain write only affects this interrupt.

    pub fn enable<I: InterruptNumber>(&mut self, irq: I) {
        let (i, bit) = position(irq);
        self.regs.write(NvicReg::Iser(i), bit);
    }

    pub fn disable<I: InterruptNumber>(&mut self, irq: I) {
        let (i, bit) = position(irq);
        self.regs.write(NvicReg::Icer(i), bit);
    }

    pub fn is_enabled<I: InterruptNumber>(&self, irq: I) -> bool {
        let (i, bit) = position(irq);
        self.regs.read(NvicReg::Iser(i)) & bit != 0
    }

    pub fn set_pending<I: InterruptNumber>(&mut self, irq: I) {
        let (i, bit) = position(irq);
        self.regs.write(NvicReg::Ispr(i), bit);
    }

    pub fn clear_pending<I: InterruptNumber>(&mut self, irq: I) {
        let (i, bit) = position(irq);
        self.regs.write(NvicReg::Icpr(i), bit);
    }

    pub fn is_pending<I: InterruptNumber>(&self, irq: I) -> bool {
        let (i, bit) = position(irq);
        self.regs.read(NvicReg::Ispr(i)) & bit != 0
    }

    /// Is the interrupt's handler running, or preempted?
    pub fn is_active<I: InterruptNumber>(&self, irq: I) -> bool {
        let (i, bit) = position(irq);
        self.regs.read(NvicReg::Iabr(i)) & bit != 0
    }

    /// Set the priority, from 0 (highest) to 15. How this splits into preemption priority and
    /// subpriority is set by `scb::set_priority_grouping`.
    pub fn set_priority<I: InterruptNumber>(
        &mut self,
        irq: I,
        priority: u8,
    ) -> Result<(), InterruptError> {
        if priority > MAX_PRIORITY {
            log_warn!("Interrupt priority out of range: {}", priority);
            return Err(InterruptError::Priority);
        }
        // Only the upper 4 bits of each priority byte are implemented.
        self.regs
            .write(NvicReg::Ipr(irq.number() as u8), (priority << 4) as u32);
        Ok(())
    }

    pub fn priority<I: InterruptNumber>(&self, irq: I) -> u8 {
        (self.regs.read(NvicReg::Ipr(irq.number() as u8)) >> 4) as u8
    }
}

/// A handler for each of `N` interrupt sources, set at runtime. Each slot is either empty or
/// holds a function to call when that source fires.
#[derive(Clone, Copy)]
pub struct HandlerTable<const N: usize> {
    handlers: [Option<fn()>; N],
}

impl<const N: usize> Default for HandlerTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> HandlerTable<N> {
    pub const fn new() -> Self {
        Self {
            handlers: [None; N],
        }
    }

    /// Set the handler at `index`, replacing any existing one.
    pub fn register(&mut self, index: usize, handler: fn()) -> Result<(), InterruptError> {
        let slot = self
            .handlers
            .get_mut(index)
            .ok_or(InterruptError::TableIndex)?;
        *slot = Some(handler);
        Ok(())
    }

    pub fn unregister(&mut self, index: usize) {
        if let Some(slot) = self.handlers.get_mut(index) {
            *slot = None;
        }
    }

    pub fn is_registered(&self, index: usize) -> bool {
        matches!(self.handlers.get(index), Some(Some(_)))
    }

    /// Run the handler at `index`. Returns `false` if there isn't one.
    pub fn call(&self, index: usize) -> bool {
        match self.handlers.get(index) {
            Some(Some(handler)) => {
                handler();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::regs::sim::RegFile;

    #[test]
    fn raw_interrupt_numbers() {
        assert_eq!(interrupt_from_number(6), Ok(Interrupt::EXTI0));
        assert_eq!(interrupt_from_number(23), Ok(Interrupt::EXTI9_5));
        assert_eq!(interrupt_from_number(40), Ok(Interrupt::EXTI15_10));
        assert_eq!(interrupt_from_number(71), Ok(Interrupt::USART6));

        assert_eq!(interrupt_from_number(96), Ok(Interrupt::FMPI2C1_ERROR));

        for n in [61, 62, 79, 90, 97, 128, 255] {
            assert_eq!(interrupt_from_number(n), Err(InterruptError::Irq));
        }
    }

    #[test]
    fn enable_and_pending_use_word_and_bit() {
        let mut nvic = Nvic::new(RegFile::new());
        nvic.enable(Interrupt::USART6);
        nvic.disable(Interrupt::EXTI0);
        nvic.set_pending(Interrupt::RTC_ALARM);
        nvic.clear_pending(Interrupt::I2C1_EV);

        // 71 = 2 * 32 + 7
        assert_eq!(nvic.regs.writes_to(NvicReg::Iser(2)), [1 << 7]);
        assert_eq!(nvic.regs.writes_to(NvicReg::Icer(0)), [1 << 6]);
        // 41
        assert_eq!(nvic.regs.writes_to(NvicReg::Ispr(1)), [1 << 9]);
        assert_eq!(nvic.regs.writes_to(NvicReg::Icpr(0)), [1 << 31]);
    }

    #[test]
    fn status_reads() {
        let mut nvic = Nvic::new(RegFile::new());
        nvic.regs.set(NvicReg::Ispr(1), 1 << 8);
        nvic.regs.set(NvicReg::Iabr(0), 1 << 23);
        nvic.regs.set(NvicReg::Iser(2), 1 << 7);

        assert!(nvic.is_pending(Interrupt::EXTI15_10));
        assert!(!nvic.is_pending(Interrupt::RTC_ALARM));
        assert!(nvic.is_active(Interrupt::EXTI9_5));
        assert!(!nvic.is_active(Interrupt::EXTI4));
        assert!(nvic.is_enabled(Interrupt::USART6));
        assert!(!nvic.is_enabled(Interrupt::EXTI0));
    }

    #[test]
    fn priority_is_in_the_upper_nibble() {
        let mut nvic = Nvic::new(RegFile::new());
        nvic.set_priority(Interrupt::EXTI0, 5).unwrap();
        nvic.set_priority(Interrupt::USART6, 15).unwrap();

        assert_eq!(nvic.regs.get(NvicReg::Ipr(6)), 0x50);
        assert_eq!(nvic.regs.get(NvicReg::Ipr(71)), 0xf0);
        assert_eq!(nvic.priority(Interrupt::EXTI0), 5);

        assert_eq!(
            nvic.set_priority(Interrupt::EXTI0, 16),
            Err(InterruptError::Priority)
        );
        assert_eq!(nvic.priority(Interrupt::EXTI0), 5);
    }

    static CALLS: AtomicU32 = AtomicU32::new(0);

    fn count() {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn handler_table() {
        let mut table = HandlerTable::<4>::new();
        assert!(!table.call(2));

        table.register(2, count).unwrap();
        assert!(table.is_registered(2));
        assert!(table.call(2));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        table.unregister(2);
        assert!(!table.call(2));
    }

    #[test]
    fn handler_table_rejects_indexes_past_the_end() {
        let mut table = HandlerTable::<4>::new();
        assert_eq!(table.register(4, count), Err(InterruptError::TableIndex));
        assert_eq!(table.register(9, count), Err(InterruptError::TableIndex));
        assert!(!table.is_registered(4));
        assert!(!table.call(9));
    }
}
