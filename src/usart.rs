//! U(S)ART setup: frame format and baud rate generation. Covers USART1, 2, 3 and 6.
//!
//! The kernel clock is the peripheral's APB clock: APB2 for USART1 and 6, APB1 for USART2 and 3.
//! Pass it from `Clocks::apb1` or `Clocks::apb2`.

#[cfg(hw)]
use crate::{pac, regs::impl_reg_access};
use crate::{macros::log_warn, regs::RegAccess};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UsartReg {
    Sr,
    Dr,
    Brr,
    Cr1,
    Cr2,
    Cr3,
}

#[cfg(hw)]
impl_reg_access!(pac::USART1, UsartReg, rw: [Sr, Dr, Brr, Cr1, Cr2, Cr3]);
#[cfg(hw)]
impl_reg_access!(pac::USART2, UsartReg, rw: [Sr, Dr, Brr, Cr1, Cr2, Cr3]);
#[cfg(hw)]
impl_reg_access!(pac::USART3, UsartReg, rw: [Sr, Dr, Brr, Cr1, Cr2, Cr3]);
#[cfg(hw)]
impl_reg_access!(pac::USART6, UsartReg, rw: [Sr, Dr, Brr, Cr1, Cr2, Cr3]);

// CR1
const CR1_RE: u8 = 2;
const CR1_TE: u8 = 3;
const CR1_PS: u8 = 9;
const CR1_PCE: u8 = 10;
const CR1_M: u8 = 12;
const CR1_UE: u8 = 13;
const CR1_OVER8: u8 = 15;

// CR2
const CR2_STOP: u8 = 12;

/// Largest BRR mantissa.
const MAX_MANTISSA: u32 = 0xfff;

#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum UsartError {
    /// The baud rate is 0, or can't be generated from the kernel clock.
    Baud,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
/// The number of stop bits. (USART_CR2, STOP)
pub enum StopBits {
    S1 = 0b00,
    S0_5 = 0b01,
    S2 = 0b10,
    S1_5 = 0b11,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
/// Parity control enable/disable, and even/odd selection (USART_CR1, PCE and PS)
pub enum Parity {
    EnabledEven,
    EnabledOdd,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
/// The length of word to transmit and receive, including any parity bit. (USART_CR1, M)
pub enum WordLen {
    W8 = 0,
    W9 = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
/// Set Oversampling16 or Oversampling8 modes.
pub enum OverSampling {
    O16 = 0,
    /// Allows baud rates up to the kernel clock / 8, with less tolerance to clock deviation.
    O8 = 1,
}

/// Configuration for U(S)ART. Can be used with default::Default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct UsartConfig {
    /// Word length. Defaults to 8-bits.
    pub word_len: WordLen,
    /// Stop bits: Defaults to 1.
    pub stop_bits: StopBits,
    /// Oversampling rate. Defaults to 16x.
    pub oversampling: OverSampling,
    /// Enable or disable parity control. Defaults to disabled.
    pub parity: Parity,
}

impl Default for UsartConfig {
    fn default() -> Self {
        Self {
            word_len: WordLen::W8,
            stop_bits: StopBits::S1,
            oversampling: OverSampling::O16,
            parity: Parity::Disabled,
        }
    }
}

/// BRR value for a baud rate. `fclk` is the peripheral's kernel clock, in Hz.
///
/// USARTDIV = fclk / (8 * (2 - OVER8) * baud), coded as a 12-bit mantissa and a fraction of
/// 4 bits (OVER8 = 0) or 3 bits (OVER8 = 1). The nearest representable value is used.
pub fn brr(fclk: u32, baud: u32, oversampling: OverSampling) -> Result<u32, UsartError> {
    if baud == 0 {
        return Err(UsartError::Baud);
    }

    // USARTDIV, in units of 1/16 (O16) or 1/8 (O8).
    let div = ((fclk as u64 + baud as u64 / 2) / baud as u64) as u32;

    let (mantissa, fraction) = match oversampling {
        OverSampling::O16 => (div >> 4, div & 0xf),
        OverSampling::O8 => (div >> 3, div & 0b111),
    };

    if mantissa == 0 || mantissa > MAX_MANTISSA {
        log_warn!("Baud rate {} out of range for a {} Hz clock", baud, fclk);
        return Err(UsartError::Baud);
    }

    Ok((mantissa << 4) | fraction)
}

/// Represents the USART peripheral, for serial communications.
pub struct Usart<R> {
    pub regs: R,
    pub config: UsartConfig,
    baud: u32,
    /// Kernel clock, in Hz.
    fclk: u32,
}

impl<R> Usart<R>
where
    R: RegAccess<UsartReg>,
{
    /// Initialize a U(S)ART peripheral, including configuration register writes, and enabling
    /// the transmitter and receiver. The peripheral's RCC clock must already be enabled.
    /// `baud` is the baud rate, in bits-per-second.
    pub fn new(regs: R, baud: u32, config: UsartConfig, fclk: u32) -> Result<Self, UsartError> {
        let mut usart = Self {
            regs,
            config,
            baud,
            fclk,
        };

        // Some bits can't be set with USART enabled.
        usart.regs.clear_bits(UsartReg::Cr1, 1 << CR1_UE);

        // 1. Program the M bit in USART_CR1 to define the word length.
        let mut cr1 = usart.regs.read(UsartReg::Cr1);
        cr1 &= !((1 << CR1_M) | (1 << CR1_PCE) | (1 << CR1_PS) | (1 << CR1_OVER8));
        cr1 |= (config.word_len as u32) << CR1_M;
        cr1 |= (config.oversampling as u32) << CR1_OVER8;
        if config.parity != Parity::Disabled {
            cr1 |= 1 << CR1_PCE;
        }
        if config.parity == Parity::EnabledOdd {
            cr1 |= 1 << CR1_PS;
        }
        usart.regs.write(UsartReg::Cr1, cr1);

        // 2. Select the desired baud rate using the USART_BRR register.
        usart.set_baud(baud)?;

        // 3. Program the number of stop bits in USART_CR2.
        usart
            .regs
            .write_field(UsartReg::Cr2, CR2_STOP, 0b11, config.stop_bits as u32);

        // 4. Enable the USART by writing the UE bit in USART_CR1 register to 1.
        // 5. Set the TE and RE bits, to send an idle frame and start searching for a start bit.
        usart.regs.set_bits(
            UsartReg::Cr1,
            (1 << CR1_UE) | (1 << CR1_TE) | (1 << CR1_RE),
        );

        Ok(usart)
    }

    /// Set the BAUD rate. Called during init, and can be called later to change BAUD
    /// during program execution. The registers are unchanged if the rate isn't reachable.
    pub fn set_baud(&mut self, baud: u32) -> Result<(), UsartError> {
        let brr = brr(self.fclk, baud, self.config.oversampling)?;

        let originally_enabled = self.regs.is_set(UsartReg::Cr1, CR1_UE);
        if originally_enabled {
            self.regs.clear_bits(UsartReg::Cr1, 1 << CR1_UE);
        }

        self.regs.write(UsartReg::Brr, brr);
        self.baud = baud;

        if originally_enabled {
            self.regs.set_bits(UsartReg::Cr1, 1 << CR1_UE);
        }
        Ok(())
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }
}
