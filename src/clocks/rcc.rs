//! Low-level RCC driver: oscillator and PLL control, PLL factors, bus prescalers, system clock
//! selection and peripheral clock gating. See RM0390, section 6.

use super::{ApbPrescaler, HclkPrescaler, PllSrc, Pllp, Pllq, Pllr, RccError};
#[cfg(hw)]
use crate::{pac, regs::impl_reg_access};
use crate::{
    macros::{log_debug, log_warn},
    regs::RegAccess,
};

/// Number of times a ready flag is polled before giving up.
pub const READY_POLL_LIMIT: u32 = 400;

/// RCC registers used by this driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RccReg {
    Cr,
    Pllcfgr,
    Cfgr,
    Ahb1rstr,
    Ahb2rstr,
    Ahb3rstr,
    Apb1rstr,
    Apb2rstr,
    Ahb1enr,
    Ahb2enr,
    Ahb3enr,
    Apb1enr,
    Apb2enr,
}

#[cfg(hw)]
impl_reg_access!(
    pac::RCC,
    RccReg,
    rw: [
        Cr, Pllcfgr, Cfgr, Ahb1rstr, Ahb2rstr, Ahb3rstr, Apb1rstr, Apb2rstr, Ahb1enr, Ahb2enr,
        Ahb3enr, Apb1enr, Apb2enr,
    ]
);

// RCC_CR
const CR_HSEBYP: u8 = 18;

// RCC_PLLCFGR
const PLLCFGR_PLLM: u8 = 0;
const PLLCFGR_PLLN: u8 = 6;
const PLLCFGR_PLLP: u8 = 16;
const PLLCFGR_PLLSRC: u8 = 22;
const PLLCFGR_PLLQ: u8 = 24;
const PLLCFGR_PLLR: u8 = 28;

// RCC_CFGR
const CFGR_SW: u8 = 0;
const CFGR_SWS: u8 = 2;
const CFGR_HPRE: u8 = 4;
const CFGR_PPRE1: u8 = 10;
const CFGR_PPRE2: u8 = 13;

/// An oscillator or PLL that can be switched on and off in RCC_CR. The value is the position
/// of its enable bit; its ready flag is the next bit up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum ClockSource {
    Hsi = 0,
    Hse = 16,
    MainPll = 24,
    PllI2s = 26,
    PllSai = 28,
}

impl ClockSource {
    pub fn on_bit(self) -> u8 {
        self as u8
    }

    pub fn ready_bit(self) -> u8 {
        self as u8 + 1
    }
}

impl TryFrom<u8> for ClockSource {
    type Error = RccError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Ok(match val {
            0 => Self::Hsi,
            16 => Self::Hse,
            24 => Self::MainPll,
            26 => Self::PllI2s,
            28 => Self::PllSai,
            _ => return Err(RccError::InvalidClockType),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum ClockState {
    Off = 0,
    On = 1,
}

impl TryFrom<u8> for ClockState {
    type Error = RccError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(Self::Off),
            1 => Ok(Self::On),
            _ => Err(RccError::InvalidClockState),
        }
    }
}

/// System clock selection, as written to CFGR.SW and reported by CFGR.SWS.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum SysClockSel {
    Hsi = 0b00,
    Hse = 0b01,
    PllP = 0b10,
    PllR = 0b11,
}

impl SysClockSel {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => Self::Hsi,
            0b01 => Self::Hse,
            0b10 => Self::PllP,
            _ => Self::PllR,
        }
    }
}

/// Main PLL settings. VCO input = src / m; VCO output = input * n; SYSCLK (if PLL P is selected)
/// = output / p. Q feeds USB OTG FS, SDIO and the RNG; R feeds I2S, SAI and optionally SYSCLK.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct PllConfig {
    pub src: PllSrc,
    /// Input divider, 2 to 63.
    pub m: u8,
    /// VCO multiplier, 50 to 432.
    pub n: u16,
    pub p: Pllp,
    pub q: Pllq,
    pub r: Pllr,
}

impl PllConfig {
    pub fn validate(&self) -> Result<(), RccError> {
        if !(2..=63).contains(&self.m) || !(50..=432).contains(&self.n) {
            return Err(RccError::PllFactor);
        }
        Ok(())
    }
}

impl Default for PllConfig {
    /// HSI / 8 * 180 / 2 = 180Mhz.
    fn default() -> Self {
        Self {
            src: PllSrc::Hsi,
            m: 8,
            n: 180,
            p: Pllp::Div2,
            q: Pllq::Div8,
            r: Pllr::Div2,
        }
    }
}

/// A bus with a prescaler in RCC_CFGR.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum PrescaledBus {
    Ahb,
    Apb1,
    Apb2,
}

/// A peripheral clock bus, for gating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Bus {
    Ahb1 = 0,
    Ahb2 = 1,
    Ahb3 = 2,
    Apb1 = 3,
    Apb2 = 4,
}

impl TryFrom<u8> for Bus {
    type Error = RccError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Ok(match val {
            0 => Self::Ahb1,
            1 => Self::Ahb2,
            2 => Self::Ahb3,
            3 => Self::Apb1,
            4 => Self::Apb2,
            _ => return Err(RccError::InvalidBus),
        })
    }
}

impl Bus {
    /// Is `bit` a peripheral on this bus? AHB2 and AHB3 only gate two peripherals each.
    pub fn has_peripheral(self, bit: u8) -> bool {
        match self {
            Self::Ahb1 => bit <= ahb1::OTGHSULPI,
            Self::Ahb2 => bit == ahb2::DCMI || bit == ahb2::OTGFS,
            Self::Ahb3 => bit == ahb3::FMC || bit == ahb3::QSPI,
            Self::Apb1 => bit <= apb1::DAC,
            Self::Apb2 => bit <= apb2::SAI2,
        }
    }

    fn enr(self) -> RccReg {
        match self {
            Self::Ahb1 => RccReg::Ahb1enr,
            Self::Ahb2 => RccReg::Ahb2enr,
            Self::Ahb3 => RccReg::Ahb3enr,
            Self::Apb1 => RccReg::Apb1enr,
            Self::Apb2 => RccReg::Apb2enr,
        }
    }

    fn rstr(self) -> RccReg {
        match self {
            Self::Ahb1 => RccReg::Ahb1rstr,
            Self::Ahb2 => RccReg::Ahb2rstr,
            Self::Ahb3 => RccReg::Ahb3rstr,
            Self::Apb1 => RccReg::Apb1rstr,
            Self::Apb2 => RccReg::Apb2rstr,
        }
    }
}

/// AHB1ENR bit positions.
pub mod ahb1 {
    pub const GPIOA: u8 = 0;
    pub const GPIOB: u8 = 1;
    pub const GPIOC: u8 = 2;
    pub const GPIOD: u8 = 3;
    pub const GPIOE: u8 = 4;
    pub const GPIOF: u8 = 5;
    pub const GPIOG: u8 = 6;
    pub const GPIOH: u8 = 7;
    pub const CRC: u8 = 12;
    pub const BKPSRAM: u8 = 18;
    pub const DMA1: u8 = 21;
    pub const DMA2: u8 = 22;
    pub const OTGHS: u8 = 29;
    pub const OTGHSULPI: u8 = 30;
}

/// AHB2ENR bit positions.
pub mod ahb2 {
    pub const DCMI: u8 = 0;
    pub const OTGFS: u8 = 7;
}

/// AHB3ENR bit positions.
pub mod ahb3 {
    pub const FMC: u8 = 0;
    pub const QSPI: u8 = 1;
}

/// APB1ENR bit positions.
pub mod apb1 {
    pub const TIM2: u8 = 0;
    pub const TIM3: u8 = 1;
    pub const TIM4: u8 = 2;
    pub const TIM5: u8 = 3;
    pub const TIM6: u8 = 4;
    pub const TIM7: u8 = 5;
    pub const TIM12: u8 = 6;
    pub const TIM13: u8 = 7;
    pub const TIM14: u8 = 8;
    pub const WWDG: u8 = 11;
    pub const SPI2: u8 = 14;
    pub const SPI3: u8 = 15;
    pub const SPDIFRX: u8 = 16;
    pub const USART2: u8 = 17;
    pub const USART3: u8 = 18;
    pub const UART4: u8 = 19;
    pub const UART5: u8 = 20;
    pub const I2C1: u8 = 21;
    pub const I2C2: u8 = 22;
    pub const I2C3: u8 = 23;
    pub const FMPI2C1: u8 = 24;
    pub const CAN1: u8 = 25;
    pub const CAN2: u8 = 26;
    pub const CEC: u8 = 27;
    pub const PWR: u8 = 28;
    pub const DAC: u8 = 29;
}

/// APB2ENR bit positions.
pub mod apb2 {
    pub const TIM1: u8 = 0;
    pub const TIM8: u8 = 1;
    pub const USART1: u8 = 4;
    pub const USART6: u8 = 5;
    pub const ADC1: u8 = 8;
    pub const ADC2: u8 = 9;
    pub const ADC3: u8 = 10;
    pub const SDIO: u8 = 11;
    pub const SPI1: u8 = 12;
    pub const SPI4: u8 = 13;
    pub const SYSCFG: u8 = 14;
    pub const TIM9: u8 = 16;
    pub const TIM10: u8 = 17;
    pub const TIM11: u8 = 18;
    pub const SAI1: u8 = 22;
    pub const SAI2: u8 = 23;
}

/// Represents the Reset and Clock Control (RCC) peripheral.
pub struct Rcc<R> {
    pub regs: R,
    poll_limit: u32,
}

impl<R> Rcc<R>
where
    R: RegAccess<RccReg>,
{
    pub fn new(regs: R) -> Self {
        Self {
            regs,
            poll_limit: READY_POLL_LIMIT,
        }
    }

    /// Change how many times ready flags are polled before returning `RccError::Timeout`.
    pub fn with_poll_limit(mut self, poll_limit: u32) -> Self {
        self.poll_limit = poll_limit;
        self
    }

    /// Poll a bit until it reads `level`. Returns `false` if the poll limit is reached first.
    fn wait_for(&self, reg: RccReg, bit: u8, level: bool) -> bool {
        for _ in 0..self.poll_limit {
            if self.regs.is_set(reg, bit) == level {
                return true;
            }
        }
        false
    }

    /// Turn a clock source on or off. Turning on waits for its ready flag, at most
    /// `poll_limit` reads. Turning off doesn't wait.
    ///
    /// Configure the PLL (`set_pll_config`) or HSE bypass before turning those on.
    pub fn set_clock_state(
        &mut self,
        source: ClockSource,
        state: ClockState,
    ) -> Result<(), RccError> {
        match state {
            ClockState::On => {
                self.regs.set_bits(RccReg::Cr, 1 << source.on_bit());

                if !self.wait_for(RccReg::Cr, source.ready_bit(), true) {
                    log_warn!("Clock source not ready after {} polls", self.poll_limit);
                    return Err(RccError::Timeout);
                }
            }
            ClockState::Off => {
                self.regs.clear_bits(RccReg::Cr, 1 << source.on_bit());
            }
        }
        Ok(())
    }

    /// As `set_clock_state`, from raw values: the source is its RCC_CR enable bit position,
    /// and the state is 0 (off) or 1 (on).
    pub fn set_clock_state_raw(&mut self, source: u8, state: u8) -> Result<(), RccError> {
        let source = ClockSource::try_from(source)?;
        let state = ClockState::try_from(state)?;
        self.set_clock_state(source, state)
    }

    /// Is this source's ready flag set?
    pub fn is_ready(&self, source: ClockSource) -> bool {
        self.regs.is_set(RccReg::Cr, source.ready_bit())
    }

    /// Write the main PLL's factors and input source. All PLLs (main, I2S and SAI) must be off
    /// when this is called; that isn't checked.
    pub fn set_pll_config(&mut self, cfg: Option<&PllConfig>) -> Result<(), RccError> {
        let cfg = cfg.ok_or(RccError::NullArgument)?;
        cfg.validate()?;

        let r = &mut self.regs;
        r.write_field(RccReg::Pllcfgr, PLLCFGR_PLLR, 0b111, cfg.r as u32);
        r.write_field(RccReg::Pllcfgr, PLLCFGR_PLLQ, 0b1111, cfg.q as u32);
        r.write_field(RccReg::Pllcfgr, PLLCFGR_PLLP, 0b11, cfg.p as u32);
        r.write_field(RccReg::Pllcfgr, PLLCFGR_PLLN, 0x1ff, cfg.n as u32);
        r.write_field(RccReg::Pllcfgr, PLLCFGR_PLLM, 0x3f, cfg.m as u32);
        r.write_field(RccReg::Pllcfgr, PLLCFGR_PLLSRC, 1, cfg.src.bits() as u32);

        Ok(())
    }

    /// As `set_pll_config`, with the source given as a raw PLLSRC value: 0 for HSI, 1 for HSE.
    /// An HSE frequency is taken from `cfg.src` if it names one.
    pub fn set_pll_config_raw(&mut self, cfg: Option<&PllConfig>, src: u8) -> Result<(), RccError> {
        let cfg = cfg.ok_or(RccError::NullArgument)?;

        let hse_freq = match cfg.src {
            PllSrc::Hse(freq) => freq,
            PllSrc::Hsi => 0,
        };

        let src = PllSrc::from_bits(src, hse_freq)?;
        self.set_pll_config(Some(&PllConfig { src, ..*cfg }))
    }

    /// Request a system clock source. The hardware ignores the switch if the source isn't
    /// ready; check `sysclk_status`, or use `switch_sysclk`.
    pub fn set_sysclk(&mut self, sel: SysClockSel) {
        self.regs
            .write_field(RccReg::Cfgr, CFGR_SW, 0b11, sel as u32);
    }

    /// The system clock source currently in use, from CFGR.SWS.
    pub fn sysclk_status(&self) -> SysClockSel {
        SysClockSel::from_bits(self.regs.read_field(RccReg::Cfgr, CFGR_SWS, 0b11))
    }

    /// Select a system clock source, and wait for the hardware to report it in use.
    pub fn switch_sysclk(&mut self, sel: SysClockSel) -> Result<(), RccError> {
        self.set_sysclk(sel);

        for _ in 0..self.poll_limit {
            if self.sysclk_status() == sel {
                log_debug!("SYSCLK switched");
                return Ok(());
            }
        }

        log_warn!("SYSCLK switch not acknowledged");
        Err(RccError::SwitchTimeout)
    }

    pub fn set_ahb_prescaler(&mut self, prescaler: HclkPrescaler) {
        self.regs
            .write_field(RccReg::Cfgr, CFGR_HPRE, 0b1111, prescaler as u32);
    }

    pub fn set_apb1_prescaler(&mut self, prescaler: ApbPrescaler) {
        self.regs
            .write_field(RccReg::Cfgr, CFGR_PPRE1, 0b111, prescaler as u32);
    }

    pub fn set_apb2_prescaler(&mut self, prescaler: ApbPrescaler) {
        self.regs
            .write_field(RccReg::Cfgr, CFGR_PPRE2, 0b111, prescaler as u32);
    }

    /// Set a bus prescaler from its division factor, eg `set_bus_prescaler(PrescaledBus::Apb1, 4)`.
    /// AHB supports 1, 2, 4, 8, 16, 64, 128, 256 and 512; the APBs 1, 2, 4, 8 and 16.
    pub fn set_bus_prescaler(&mut self, bus: PrescaledBus, divider: u16) -> Result<(), RccError> {
        match bus {
            PrescaledBus::Ahb => {
                let p = HclkPrescaler::from_value(divider).ok_or(RccError::Prescaler(bus))?;
                self.set_ahb_prescaler(p);
            }
            PrescaledBus::Apb1 | PrescaledBus::Apb2 => {
                let p = ApbPrescaler::from_value(divider).ok_or(RccError::Prescaler(bus))?;
                if bus == PrescaledBus::Apb1 {
                    self.set_apb1_prescaler(p);
                } else {
                    self.set_apb2_prescaler(p);
                }
            }
        }
        Ok(())
    }

    /// Bypass the HSE oscillator, for use with an external clock signal. Set before turning
    /// the HSE on.
    pub fn hse_bypass(&mut self, bypass: bool) {
        if bypass {
            self.regs.set_bits(RccReg::Cr, 1 << CR_HSEBYP);
        } else {
            self.regs.clear_bits(RccReg::Cr, 1 << CR_HSEBYP);
        }
    }

    /// Enable a peripheral's clock. `bit` is its position in the bus's enable register; see the
    /// `ahb1`, `apb1` etc tables.
    pub fn enable_peripheral(&mut self, bus: Bus, bit: u8) -> Result<(), RccError> {
        if !bus.has_peripheral(bit) {
            return Err(RccError::PeripheralEnable);
        }
        self.regs.set_bits(bus.enr(), 1 << bit);
        Ok(())
    }

    /// Disable a peripheral's clock.
    pub fn disable_peripheral(&mut self, bus: Bus, bit: u8) -> Result<(), RccError> {
        if !bus.has_peripheral(bit) {
            return Err(RccError::PeripheralDisable);
        }
        self.regs.clear_bits(bus.enr(), 1 << bit);
        Ok(())
    }

    /// As `enable_peripheral`, with the bus given as a raw value (AHB1 = 0 ... APB2 = 4).
    pub fn enable_peripheral_raw(&mut self, bus: u8, bit: u8) -> Result<(), RccError> {
        self.enable_peripheral(Bus::try_from(bus)?, bit)
    }

    /// As `disable_peripheral`, with the bus given as a raw value.
    pub fn disable_peripheral_raw(&mut self, bus: u8, bit: u8) -> Result<(), RccError> {
        self.disable_peripheral(Bus::try_from(bus)?, bit)
    }

    /// Pulse a peripheral's reset line, returning its registers to their reset values.
    pub fn reset_peripheral(&mut self, bus: Bus, bit: u8) -> Result<(), RccError> {
        if !bus.has_peripheral(bit) {
            return Err(RccError::PeripheralReset);
        }
        self.regs.set_bits(bus.rstr(), 1 << bit);
        self.regs.clear_bits(bus.rstr(), 1 << bit);
        Ok(())
    }

    /// Enable and reset a peripheral; the usual first step before configuring it.
    pub fn enable_and_reset(&mut self, bus: Bus, bit: u8) -> Result<(), RccError> {
        self.enable_peripheral(bus, bit)?;
        self.reset_peripheral(bus, bit)
    }

    /// Wait for a source's ready flag to clear after turning it off. Needed before changing
    /// the PLL factors.
    pub(crate) fn wait_stopped(&self, source: ClockSource) -> Result<(), RccError> {
        if self.wait_for(RccReg::Cr, source.ready_bit(), false) {
            Ok(())
        } else {
            Err(RccError::Timeout)
        }
    }
}
