//! Client for a 24C08-style serial EEPROM (1 KiB, 16-byte pages), over I2C.
//!
//! The 10-bit memory address is split: bits 9 and 8 select a 256-byte block, and are sent in
//! the device address. The low 8 bits are sent as the word address.
//!
//! Writes don't cross pages: the device wraps the internal address within the current page.
//! Keep each write inside one 16-byte page, and call `write_cycle_delay` before accessing the
//! device again.

use embedded_hal::delay::DelayNs;

use crate::i2c::{Direction, I2cError, I2cMaster};

/// Fixed high bits of the 7-bit device address.
const DEVICE_TYPE: u8 = 0b1010;

pub const PAGE_SIZE: usize = 16;
/// Highest memory address.
pub const MAX_ADDRESS: u16 = 1023;

/// Delay after the word address, before the first data byte.
const ADDRESS_SETTLE_US: u32 = 1;
/// Delay after each data byte.
const BYTE_DELAY_US: u32 = 200;
/// Internal write cycle time.
const WRITE_CYCLE_MS: u32 = 5;

#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum EepromError {
    /// The memory address is above `MAX_ADDRESS`.
    AddressOutOfRange,
    /// A write is longer than one page.
    PageOverflow,
    Bus(I2cError),
}

impl EepromError {
    pub fn bus_error(&self) -> Option<I2cError> {
        match self {
            Self::Bus(e) => Some(*e),
            _ => None,
        }
    }
}

impl From<I2cError> for EepromError {
    fn from(e: I2cError) -> Self {
        Self::Bus(e)
    }
}

/// State of the device's A2 pin. Two devices can share a bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum ChipSelect {
    Device0 = 0,
    Device1 = 1,
}

/// EEPROM client. Generic over the I2C master, and the delay provider used for the write timing.
pub struct Eeprom<I, D> {
    pub i2c: I,
    pub delay: D,
    pub chip_select: ChipSelect,
}

impl<I: I2cMaster, D: DelayNs> Eeprom<I, D> {
    pub fn new(i2c: I, delay: D, chip_select: ChipSelect) -> Self {
        Self {
            i2c,
            delay,
            chip_select,
        }
    }

    /// Release the I2C master and delay provider.
    pub fn free(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    /// 7-bit device address for a memory address: `1010`, then A2, then address bits 9 and 8.
    pub fn device_address(&self, addr: u16) -> Result<u8, EepromError> {
        if addr > MAX_ADDRESS {
            return Err(EepromError::AddressOutOfRange);
        }
        Ok((DEVICE_TYPE << 3) | ((self.chip_select as u8) << 2) | (addr >> 8) as u8)
    }

    /// Run a framed transfer, and send a stop whether or not it succeeded.
    fn framed(
        &mut self,
        transfer: impl FnOnce(&mut I, &mut D) -> Result<(), I2cError>,
    ) -> Result<(), EepromError> {
        let result = transfer(&mut self.i2c, &mut self.delay);
        self.i2c.stop();
        result.map_err(EepromError::Bus)
    }

    /// Write up to one page, starting at `addr`. Data past the end of the page wraps to its start.
    pub fn write_bytes(&mut self, addr: u16, data: &[u8]) -> Result<(), EepromError> {
        let device = self.device_address(addr)?;
        if data.len() > PAGE_SIZE {
            return Err(EepromError::PageOverflow);
        }

        self.framed(|i2c, delay| {
            i2c.start(device, Direction::Write)?;
            i2c.write(&[addr as u8])?;
            delay.delay_us(ADDRESS_SETTLE_US);

            for byte in data {
                i2c.write(&[*byte])?;
                delay.delay_us(BYTE_DELAY_US);
            }
            Ok(())
        })
    }

    /// Read `buf.len()` bytes, starting at `addr`. Reads continue across pages and blocks.
    pub fn read_bytes(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), EepromError> {
        let device = self.device_address(addr)?;

        self.framed(|i2c, _| {
            i2c.start(device, Direction::Write)?;
            i2c.write(&[addr as u8])?;
            i2c.repeated_start(device, Direction::Read)?;
            i2c.read(buf)
        })
    }

    /// Block for the device's internal write cycle. Call after each write.
    pub fn write_cycle_delay(&mut self) {
        self.delay.delay_ms(WRITE_CYCLE_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{BusEvent, SimBus, SimDelay};

    fn eeprom() -> Eeprom<SimBus, SimDelay> {
        Eeprom::new(SimBus::new(), SimDelay::default(), ChipSelect::Device0)
    }

    #[test]
    fn write_cycle_read_scenario() {
        let mut e = eeprom();
        e.write_bytes(0x10, &[0xaa, 0xbb, 0xcc]).unwrap();
        e.write_cycle_delay();

        let mut buf = [0; 3];
        e.read_bytes(0x10, &mut buf).unwrap();
        assert_eq!(buf, [0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn write_framing_and_timing() {
        let mut e = eeprom();
        e.write_bytes(0x2f3, &[1, 2]).unwrap();
        e.write_cycle_delay();

        assert_eq!(
            e.i2c.events,
            [
                BusEvent::Start(0b101_0010, Direction::Write),
                BusEvent::Write(vec![0xf3]),
                BusEvent::Write(vec![1]),
                BusEvent::Write(vec![2]),
                BusEvent::Stop,
            ]
        );
        assert_eq!(e.delay.calls_ns, [1_000, 200_000, 200_000, 5_000_000]);
    }

    #[test]
    fn device_address_encoding() {
        let mut e = eeprom();
        for addr in 0..=MAX_ADDRESS {
            assert_eq!(e.device_address(addr), Ok(0x50 | (addr >> 8) as u8));
        }

        e.chip_select = ChipSelect::Device1;
        assert_eq!(e.device_address(0), Ok(0x54));
        assert_eq!(e.device_address(0x3ff), Ok(0x57));
        assert_eq!(e.device_address(1024), Err(EepromError::AddressOutOfRange));
    }

    #[test]
    fn rejected_writes_send_nothing() {
        let mut e = eeprom();
        assert_eq!(
            e.write_bytes(1024, &[0]),
            Err(EepromError::AddressOutOfRange)
        );
        assert_eq!(e.write_bytes(0, &[0; 17]), Err(EepromError::PageOverflow));
        assert_eq!(
            e.read_bytes(2000, &mut [0; 2]),
            Err(EepromError::AddressOutOfRange)
        );
        assert!(e.i2c.events.is_empty());

        e.write_bytes(0x30, &[0x5a; 16]).unwrap();
    }

    #[test]
    fn writes_wrap_within_the_page() {
        let mut e = eeprom();
        e.write_bytes(0x1e, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0; 2];
        e.read_bytes(0x10, &mut buf).unwrap();
        assert_eq!(buf, [3, 4]);
        e.read_bytes(0x1e, &mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        // The next page is untouched.
        e.read_bytes(0x20, &mut buf).unwrap();
        assert_eq!(buf, [0xff, 0xff]);
    }

    #[test]
    fn chip_selects_are_separate_devices() {
        let mut e = eeprom();
        e.write_bytes(5, &[7]).unwrap();

        let (bus, delay) = e.free();
        let mut e1 = Eeprom::new(bus, delay, ChipSelect::Device1);
        e1.write_bytes(5, &[9]).unwrap();

        let mut buf = [0];
        e1.read_bytes(5, &mut buf).unwrap();
        assert_eq!(buf, [9]);
        e1.chip_select = ChipSelect::Device0;
        e1.read_bytes(5, &mut buf).unwrap();
        assert_eq!(buf, [7]);
    }

    #[test]
    fn bus_failure_aborts_and_releases_the_bus() {
        let mut e = eeprom();
        // Fail on the second data byte.
        e.i2c.fail_op = Some((3, I2cError::Nack));

        assert_eq!(
            e.write_bytes(0, &[1, 2, 3]),
            Err(EepromError::Bus(I2cError::Nack))
        );
        assert_eq!(e.i2c.events.last(), Some(&BusEvent::Stop));
        assert_eq!(e.i2c.written_frames().len(), 0);
    }

    #[test]
    fn read_failure_aborts_and_releases_the_bus() {
        // start, pointer write, repeated start, read
        for (op, err) in [(2, I2cError::Nack), (3, I2cError::Timeout)] {
            let mut e = eeprom();
            e.i2c.fail_op = Some((op, err));

            let mut buf = [0; 4];
            assert_eq!(e.read_bytes(0x10, &mut buf), Err(EepromError::Bus(err)));
            assert_eq!(e.i2c.events.last(), Some(&BusEvent::Stop));
            assert_eq!(buf, [0; 4]);
        }
    }
}
