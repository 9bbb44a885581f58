//! This module contains clock configurations for the STM32F446.
//!
//! [`Rcc`] is the low-level clock controller: it turns oscillators and PLLs on and off with a
//! bounded wait for their ready flags, writes the PLL factors and bus prescalers, selects the
//! system clock, and gates peripheral clocks. [`Clocks`] is a preset built on top of it; create
//! it with `Clocks::default()`, modify as required, then apply it with `setup()`.

mod f;
mod rcc;

pub use f::*;
pub use rcc::*;

/// Clocks-related errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum RccError {
    /// A ready flag didn't set within the poll ceiling.
    Timeout,
    /// The system clock status didn't follow a switch within the poll ceiling.
    SwitchTimeout,
    InvalidClockState,
    InvalidClockType,
    InvalidPllSource,
    /// PLLM or PLLN outside its legal range.
    PllFactor,
    /// A divider the given bus doesn't support.
    Prescaler(PrescaledBus),
    PeripheralEnable,
    PeripheralDisable,
    PeripheralReset,
    InvalidBus,
    /// A required configuration wasn't passed.
    NullArgument,
    /// Clock speeds are out of range.
    Speed,
}

/// This trait allows you to return information about a clocks's speeds.
/// It's used for configuring peripherals.
pub trait ClockCfg {
    /// System clock speed, in Hz.
    fn sysclk(&self) -> u32;

    /// HCLK speed, in Hz. Ie AHB bus, core, memory, and DMA.
    fn hclk(&self) -> u32;

    /// Cortex System timer speed, in Hz.
    fn systick(&self) -> u32;

    /// APB1 peripheral clocks speed, in Hz.
    fn apb1(&self) -> u32;

    /// APB1 timer clocks speed, in Hz.
    fn apb1_timer(&self) -> u32;

    /// APB2 peripheral clocks speed, in Hz.
    fn apb2(&self) -> u32;

    /// APB2 timer clocks speed, in Hz.
    fn apb2_timer(&self) -> u32;
}
