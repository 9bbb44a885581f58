//! Peripheral access layer for the STM32F446.
//!
//! Covers the clock tree (RCC), blocking SysTick delays, a polling I2C master, clients for a
//! DS1307-class real time clock and a 24C08-class EEPROM, configuration of the NVIC, EXTI, SCB
//! and SYSCFG, and USART baud rate setup.
//!
//! Drivers are generic over [`regs::RegAccess`]. With the `f446` feature, that's implemented
//! for the PAC and Cortex-M peripherals, eg `Rcc::new(dp.RCC)`, `I2c::new(dp.I2C1, cfg)`.
//!
//! Typical bring-up:
//! ```ignore
//! let clock_cfg = Clocks::default();
//! let mut rcc = Rcc::new(dp.RCC);
//! clock_cfg.setup(&mut rcc, &mut dp.FLASH)?;
//! rcc.enable_peripheral(Bus::Apb1, apb1::I2C1)?;
//!
//! let i2c = I2c::new(dp.I2C1, I2cConfig::from_clocks(&clock_cfg))?;
//! let mut rtc = Ds1307::new(i2c, HourFormat::H24);
//! let now = rtc.read_time()?;
//! ```

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "f446")]
pub use stm32f4::stm32f446 as pac;

pub mod macros;

pub mod clocks;
pub mod delay;
pub mod ds1307;
pub mod eeprom;
pub mod error;
pub mod exti;
pub mod i2c;
pub mod nvic;
pub mod regs;
pub mod scb;
pub mod syscfg;
pub mod usart;

#[cfg(test)]
mod sim;
