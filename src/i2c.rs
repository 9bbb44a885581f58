//! I2C master support for the F4's I2C peripheral. Blocking and polled.
//!
//! The driver exposes the individual bus primitives (start, repeated start, write, read, stop)
//! through the [`I2cMaster`] trait, so device clients can build their own framing. It also
//! implements `embedded_hal::i2c::I2c`.

// Based on `stm32f4xx-hal`.

use crate::{
    clocks::ClockCfg,
    macros::{bounded_loop, log_error},
    regs::RegAccess,
};
#[cfg(hw)]
use crate::{pac, regs::impl_reg_access};

/// How many times a status flag is polled before giving up with `I2cError::Timeout`.
pub const MAX_ITERS: u32 = 300_000;

/// I2C registers used by this driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum I2cReg {
    Cr1,
    Cr2,
    Oar1,
    Dr,
    Sr1,
    Sr2,
    Ccr,
    Trise,
}

#[cfg(hw)]
impl_reg_access!(pac::I2C1, I2cReg, rw: [Cr1, Cr2, Oar1, Dr, Sr1, Ccr, Trise], ro: [Sr2]);
#[cfg(hw)]
impl_reg_access!(pac::I2C2, I2cReg, rw: [Cr1, Cr2, Oar1, Dr, Sr1, Ccr, Trise], ro: [Sr2]);
#[cfg(hw)]
impl_reg_access!(pac::I2C3, I2cReg, rw: [Cr1, Cr2, Oar1, Dr, Sr1, Ccr, Trise], ro: [Sr2]);

// CR1
const CR1_PE: u8 = 0;
const CR1_START: u8 = 8;
const CR1_STOP: u8 = 9;
const CR1_ACK: u8 = 10;

// SR1
const SR1_SB: u8 = 0;
const SR1_ADDR: u8 = 1;
const SR1_BTF: u8 = 2;
const SR1_RXNE: u8 = 6;
const SR1_TXE: u8 = 7;
const SR1_BERR: u8 = 8;
const SR1_ARLO: u8 = 9;
const SR1_AF: u8 = 10;
const SR1_OVR: u8 = 11;
const SR1_TIMEOUT: u8 = 14;

// SR2
const SR2_BUSY: u8 = 1;

// OAR1
const OAR1_ADDMODE: u8 = 15;
/// RM0390: "Should always be kept at 1 by software."
const OAR1_BIT14: u8 = 14;

// CCR
const CCR_FS: u8 = 15;
const CCR_DUTY: u8 = 14;

#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum I2cError {
    /// Misplaced start or stop condition (BERR).
    Bus,
    /// Arbitration lost (ARLO).
    Arbitration,
    /// Address or data not acknowledged (AF).
    Nack,
    Overrun,
    /// A status flag didn't change within `MAX_ITERS` polls, or the SMBus timeout fired.
    Timeout,
    /// Peripheral clock frequency out of range.
    Config,
}

impl embedded_hal::i2c::Error for I2cError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

        match self {
            Self::Bus => ErrorKind::Bus,
            Self::Arbitration => ErrorKind::ArbitrationLoss,
            Self::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Self::Overrun => ErrorKind::Overrun,
            Self::Timeout | Self::Config => ErrorKind::Other,
        }
    }
}

/// Transfer direction; the R/W bit that follows the 7-bit address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum AddressingMode {
    SevenBit,
    TenBit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum I2cSpeed {
    /// Standard mode, 100kHz.
    Standard100K,
    /// Fast mode, 400kHz, with a 2:1 low:high SCL duty cycle.
    Fast400K,
    /// Fast mode, 400kHz, with a 16:9 duty cycle. Allows reaching 400kHz with a peripheral
    /// clock that's a multiple of 10Mhz.
    Fast400KDuty16_9,
}

impl I2cSpeed {
    pub fn hz(&self) -> u32 {
        match self {
            Self::Standard100K => 100_000,
            _ => 400_000,
        }
    }
}

/// Configuration data for the I2C peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct I2cConfig {
    /// Peripheral (APB1) clock, in Mhz. 2 to 45.
    pub freq_mhz: u8,
    pub addressing: AddressingMode,
    /// This node's own address. Only relevant when addressed as a slave.
    pub own_address: u16,
    pub speed: I2cSpeed,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            freq_mhz: 16,
            addressing: AddressingMode::SevenBit,
            own_address: 0,
            speed: I2cSpeed::Standard100K,
        }
    }
}

impl I2cConfig {
    /// Default config, with the frequency taken from the APB1 clock.
    pub fn from_clocks<C: ClockCfg>(clocks: &C) -> Self {
        Self {
            freq_mhz: (clocks.apb1() / 1_000_000) as u8,
            ..Default::default()
        }
    }
}

/// Master-mode bus primitives. Device clients are generic over this, so they can run over
/// this crate's `I2c`, or anything else that can sequence a bus.
pub trait I2cMaster {
    /// Wait for the bus to be free, generate a start condition, and send the address with the
    /// direction bit.
    fn start(&mut self, addr: u8, dir: Direction) -> Result<(), I2cError>;

    /// Generate a start condition without waiting for the bus to be free, eg to switch from
    /// writing a register address to reading.
    fn repeated_start(&mut self, addr: u8, dir: Direction) -> Result<(), I2cError>;

    /// Send bytes, waiting for each to be transferred.
    fn write(&mut self, bytes: &[u8]) -> Result<(), I2cError>;

    /// Receive bytes. All but the last are acknowledged, and the stop condition is requested
    /// before the last byte arrives, so the bus closes right after it.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), I2cError>;

    /// Generate a stop condition, unless a read has already requested one.
    fn stop(&mut self);
}

/// Represents an Inter-Integrated Circuit (I2C) peripheral.
pub struct I2c<R> {
    pub regs: R,
    pub cfg: I2cConfig,
    /// Addressed for reading, with ADDR not yet cleared. The receiver clears it once ACK is
    /// set up for the transfer length.
    addr_pending: bool,
    /// STOP was set by a closing read.
    stop_requested: bool,
}

impl<R> I2c<R>
where
    R: RegAccess<I2cReg>,
{
    /// Initialize an I2C peripheral, including configuration register writes. The peripheral's
    /// clock must already be enabled, eg with `Rcc::enable_peripheral`.
    pub fn new(regs: R, cfg: I2cConfig) -> Result<Self, I2cError> {
        let mut i2c = Self {
            regs,
            cfg,
            addr_pending: false,
            stop_requested: false,
        };
        i2c.init()?;
        Ok(i2c)
    }

    fn init(&mut self) -> Result<(), I2cError> {
        let freq = self.cfg.freq_mhz as u32;
        if !(2..=45).contains(&freq) {
            log_error!("I2C peripheral clock out of range: {} Mhz", freq);
            return Err(I2cError::Config);
        }

        // Make sure the I2C unit is disabled so we can configure it
        self.regs.clear_bits(I2cReg::Cr1, 1 << CR1_PE);

        // Configure bus frequency into I2C peripheral
        self.regs.write_field(I2cReg::Cr2, 0, 0x3f, freq);

        let oar1 = match self.cfg.addressing {
            AddressingMode::SevenBit => ((self.cfg.own_address as u32) & 0x7f) << 1,
            AddressingMode::TenBit => ((self.cfg.own_address as u32) & 0x3ff) | (1 << OAR1_ADDMODE),
        };
        self.regs.write(I2cReg::Oar1, oar1 | (1 << OAR1_BIT14));

        let clock = freq * 1_000_000;
        let speed = self.cfg.speed.hz();

        // Configure correct rise times
        let trise = if speed <= 100_000 {
            freq + 1
        } else {
            (freq * 300) / 1000 + 1
        };
        self.regs.write(I2cReg::Trise, trise);

        // I2C clock control calculation
        let ccr = match self.cfg.speed {
            I2cSpeed::Standard100K => {
                // Standard mode needs a CCR of at least 4.
                (clock / (speed * 2)).max(4)
            }
            I2cSpeed::Fast400K => (clock / (speed * 3)).max(1) | (1 << CCR_FS),
            I2cSpeed::Fast400KDuty16_9 => {
                (clock / (speed * 25)).max(1) | (1 << CCR_FS) | (1 << CCR_DUTY)
            }
        };
        self.regs.write(I2cReg::Ccr, ccr);

        // Enable the I2C processing
        self.regs.set_bits(I2cReg::Cr1, 1 << CR1_PE);

        Ok(())
    }

    pub fn check_and_clear_error_flags(&mut self) -> Result<(), I2cError> {
        // Note that flags should only be cleared once they have been registered. If flags are
        // cleared otherwise, there may be an inherent race condition and flags may be missed.
        let sr1 = self.regs.read(I2cReg::Sr1);

        let err = if sr1 & (1 << SR1_TIMEOUT) != 0 {
            Some((SR1_TIMEOUT, I2cError::Timeout))
        } else if sr1 & (1 << SR1_OVR) != 0 {
            Some((SR1_OVR, I2cError::Overrun))
        } else if sr1 & (1 << SR1_AF) != 0 {
            Some((SR1_AF, I2cError::Nack))
        } else if sr1 & (1 << SR1_ARLO) != 0 {
            Some((SR1_ARLO, I2cError::Arbitration))
        } else if sr1 & (1 << SR1_BERR) != 0 {
            Some((SR1_BERR, I2cError::Bus))
        } else {
            None
        };

        match err {
            Some((bit, e)) => {
                // rc_w0: Writing 0 clears the flag; 1s leave the others alone.
                self.regs.write(I2cReg::Sr1, !(1 << bit) & 0xffff);
                log_error!("I2C error: {}", e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Poll an SR1 flag until set, checking the error flags on each iteration.
    fn wait_sr1(&mut self, bit: u8) -> Result<(), I2cError> {
        bounded_loop!(
            !self.regs.is_set(I2cReg::Sr1, bit),
            I2cError::Timeout,
            MAX_ITERS,
            {
                self.check_and_clear_error_flags()?;
            }
        );
        Ok(())
    }

    fn send_start(&mut self, addr: u8, dir: Direction) -> Result<(), I2cError> {
        self.stop_requested = false;
        self.addr_pending = false;

        // Send a START condition
        self.regs.set_bits(I2cReg::Cr1, 1 << CR1_START);

        // Wait until START condition was generated
        self.wait_sr1(SR1_SB)?;

        // Set up current address, we're trying to talk to
        self.regs
            .write(I2cReg::Dr, ((addr as u32) << 1) | dir as u32);

        // Wait until address was sent
        //
        // Check for any I2C errors. If a Nack occurs, the ADDR bit will never be set.
        self.wait_sr1(SR1_ADDR)?;

        match dir {
            Direction::Write => self.clear_addr_flag(),
            Direction::Read => self.addr_pending = true,
        }

        Ok(())
    }

    /// Clear ADDR by reading SR2. The transfer starts once it's cleared.
    fn clear_addr_flag(&mut self) {
        let _ = self.regs.read(I2cReg::Sr2);
        self.addr_pending = false;
    }

    pub fn send_byte(&mut self, byte: u8) -> Result<(), I2cError> {
        // Wait until we're ready for sending
        self.wait_sr1(SR1_TXE)?;

        // Push out a byte of data
        self.regs.write(I2cReg::Dr, byte as u32);

        // Wait until byte is transferred
        self.wait_sr1(SR1_BTF)
    }

    pub fn recv_byte(&mut self) -> Result<u8, I2cError> {
        self.wait_sr1(SR1_RXNE)?;
        Ok(self.regs.read(I2cReg::Dr) as u8)
    }

    /// Receive bytes. With `close`, the final byte is Nacked and followed by a STOP; otherwise
    /// every byte is acknowledged, and the transfer continues.
    fn read_bytes(&mut self, buf: &mut [u8], close: bool) -> Result<(), I2cError> {
        let Some((last, rest)) = buf.split_last_mut() else {
            if self.addr_pending {
                self.clear_addr_flag();
            }
            return Ok(());
        };

        if close && rest.is_empty() {
            // Single byte: ACK must be cleared before ADDR is, then STOP set.
            // (RM0390, master receiver)
            self.regs.clear_bits(I2cReg::Cr1, 1 << CR1_ACK);
            if self.addr_pending {
                self.clear_addr_flag();
            }
            self.regs.set_bits(I2cReg::Cr1, 1 << CR1_STOP);
            self.stop_requested = true;
        } else {
            self.regs.set_bits(I2cReg::Cr1, 1 << CR1_ACK);
            if self.addr_pending {
                self.clear_addr_flag();
            }

            for byte in rest {
                *byte = self.recv_byte()?;
            }

            if close {
                // Prepare to send a Nack then STOP after the next byte
                self.regs.modify(I2cReg::Cr1, |v| {
                    (v & !(1 << CR1_ACK)) | (1 << CR1_STOP)
                });
                self.stop_requested = true;
            }
        }

        *last = self.recv_byte()?;
        Ok(())
    }
}

impl<R> I2cMaster for I2c<R>
where
    R: RegAccess<I2cReg>,
{
    fn start(&mut self, addr: u8, dir: Direction) -> Result<(), I2cError> {
        bounded_loop!(
            self.regs.is_set(I2cReg::Sr2, SR2_BUSY),
            I2cError::Timeout,
            MAX_ITERS
        );
        self.send_start(addr, dir)
    }

    fn repeated_start(&mut self, addr: u8, dir: Direction) -> Result<(), I2cError> {
        self.send_start(addr, dir)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), I2cError> {
        for byte in bytes {
            self.send_byte(*byte)?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), I2cError> {
        self.read_bytes(buf, true)
    }

    fn stop(&mut self) {
        if !self.stop_requested {
            self.regs.set_bits(I2cReg::Cr1, 1 << CR1_STOP);
        }
        self.stop_requested = false;

        // Addressed for reading, but nothing was read.
        if self.addr_pending {
            self.clear_addr_flag();
        }

        // Wait for the STOP to be sent. Hardware clears the bit.
        for _ in 0..MAX_ITERS {
            if !self.regs.is_set(I2cReg::Cr1, CR1_STOP) {
                break;
            }
        }
    }
}

mod embedded_hal_impl {
    use embedded_hal::i2c::{ErrorType, I2c as I2cEh, Operation, SevenBitAddress};

    use super::*;

    impl<R> ErrorType for I2c<R>
    where
        R: RegAccess<I2cReg>,
    {
        type Error = I2cError;
    }

    impl<R> I2cEh<SevenBitAddress> for I2c<R>
    where
        R: RegAccess<I2cReg>,
    {
        /// embedded_hal Operation Contract:
        ///
        /// 1 - Before executing the first operation an ST is sent automatically. This is followed by SAD+R/W as appropriate.
        /// 2 - Data from adjacent operations of the same type are sent after each other without an SP or SR.
        /// 3 - Between adjacent operations of a different type an SR and SAD+R/W is sent.
        /// 4 - After executing the last operation an SP is sent automatically.
        /// 5 - If the last operation is a Read the master does not send an acknowledge for the last byte.
        fn transaction(
            &mut self,
            address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            let mut prev: Option<Direction> = None;
            let len = operations.len();

            for i in 0..len {
                let next_is_read = i + 1 < len && matches!(operations[i + 1], Operation::Read(_));

                let dir = match operations[i] {
                    Operation::Write(_) => Direction::Write,
                    Operation::Read(_) => Direction::Read,
                };

                let result = match prev {
                    None => self.start(address, dir),
                    Some(p) if p != dir => self.repeated_start(address, dir),
                    _ => Ok(()),
                }
                .and_then(|_| match &mut operations[i] {
                    Operation::Write(bytes) => I2cMaster::write(self, bytes),
                    // Only the final byte of a run of reads is Nacked.
                    Operation::Read(buf) => self.read_bytes(buf, !next_is_read),
                });

                if let Err(e) = result {
                    self.stop();
                    return Err(e);
                }

                prev = Some(dir);
            }

            if prev.is_some() {
                self.stop();
            }

            Ok(())
        }
    }
}
