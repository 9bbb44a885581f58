//! Client for a DS1307 real time clock, over I2C.
//!
//! Time and date are kept in BCD in registers 0 to 6; seconds, minutes, hours, day of the week,
//! date, month and year. A write sends the register pointer then all 7 fields; a read sets the
//! pointer to 0 and reads the 7 fields back.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::{
    i2c::{Direction, I2cError, I2cMaster},
    macros::log_warn,
};

/// 7-bit bus address.
pub const DEVICE_ADDRESS: u8 = 0b110_1000;

/// Register pointer for the seconds register; the start of the time and date block.
const WORD_ADDRESS: u8 = 0;

// Hours register
const HOUR_12_24_BIT: u8 = 6;
const HOUR_AM_PM_BIT: u8 = 5;
const HOUR_12_MASK: u8 = 0x1f;
const HOUR_24_MASK: u8 = 0x3f;

// Seconds register. Bit 7 is clock halt.
const SECONDS_MASK: u8 = 0x7f;

/// Time and date fields, for reporting which one is out of range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum TimeField {
    Seconds,
    Minutes,
    Hours,
    /// AM/PM is missing in 12-hour mode.
    Period,
    Weekday,
    Date,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum RtcError {
    /// A field of the record is out of range. Nothing was sent.
    Invalid(TimeField),
    Bus(I2cError),
}

impl RtcError {
    pub fn bus_error(&self) -> Option<I2cError> {
        match self {
            Self::Bus(e) => Some(*e),
            _ => None,
        }
    }
}

impl From<I2cError> for RtcError {
    fn from(e: I2cError) -> Self {
        Self::Bus(e)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum HourFormat {
    /// Hours 0 to 23.
    H24,
    /// Hours 1 to 12, with AM/PM.
    H12,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum Period {
    Am,
    Pm,
}

/// Day of the week, as numbered by the DS1307 register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Weekday {
    Sunday = 1,
    Monday = 2,
    Tuesday = 3,
    Wednesday = 4,
    Thursday = 5,
    Friday = 6,
    Saturday = 7,
}

/// One time and date reading. Fields are in binary; conversion to BCD happens on write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, defmt::Format)]
pub struct TimeRecord {
    /// 0 to 59
    pub seconds: u8,
    /// 0 to 59
    pub minutes: u8,
    /// 0 to 23, or 1 to 12 in 12-hour mode.
    pub hours: u8,
    /// Required in 12-hour mode; ignored in 24-hour mode.
    pub period: Option<Period>,
    /// 1 (Sunday) to 7. See `Weekday`.
    pub weekday: u8,
    /// Day of the month, 1 to 31.
    pub date: u8,
    /// 1 to 12
    pub month: u8,
    /// 0 to 99, from 2000.
    pub year: u8,
}

impl TimeRecord {
    /// Check each field's range, in register order, returning the first that's out of range.
    pub fn validate(&self, format: HourFormat) -> Result<(), RtcError> {
        let invalid = |f| Err(RtcError::Invalid(f));

        if self.seconds > 59 {
            return invalid(TimeField::Seconds);
        }
        if self.minutes > 59 {
            return invalid(TimeField::Minutes);
        }
        match format {
            HourFormat::H24 => {
                if self.hours > 23 {
                    return invalid(TimeField::Hours);
                }
            }
            HourFormat::H12 => {
                if !(1..=12).contains(&self.hours) {
                    return invalid(TimeField::Hours);
                }
                if self.period.is_none() {
                    return invalid(TimeField::Period);
                }
            }
        }
        if !(1..=7).contains(&self.weekday) {
            return invalid(TimeField::Weekday);
        }
        if !(1..=31).contains(&self.date) {
            return invalid(TimeField::Date);
        }
        if !(1..=12).contains(&self.month) {
            return invalid(TimeField::Month);
        }
        if self.year > 99 {
            return invalid(TimeField::Year);
        }
        Ok(())
    }

    /// The register frame for a write: the register pointer followed by the 7 BCD fields.
    pub fn to_frame(&self, format: HourFormat) -> Result<[u8; 8], RtcError> {
        self.validate(format)?;

        // Fields are validated, so these are all in 0..=99.
        let bcd = |v: u8| bcd2_encode(v).unwrap_or(0);

        let hours = match format {
            HourFormat::H24 => bcd(self.hours),
            HourFormat::H12 => {
                let mut h = bcd(self.hours) | (1 << HOUR_12_24_BIT);
                if self.period == Some(Period::Pm) {
                    h |= 1 << HOUR_AM_PM_BIT;
                }
                h
            }
        };

        Ok([
            WORD_ADDRESS,
            bcd(self.seconds),
            bcd(self.minutes),
            hours,
            bcd(self.weekday),
            bcd(self.date),
            bcd(self.month),
            bcd(self.year),
        ])
    }

    /// Decode the 7 registers read back from the device. Values aren't range-checked.
    pub fn from_registers(regs: &[u8; 7], format: HourFormat) -> Self {
        let (hours, period) = match format {
            HourFormat::H24 => (bcd2_decode(regs[2] & HOUR_24_MASK), None),
            HourFormat::H12 => {
                let period = if regs[2] & (1 << HOUR_AM_PM_BIT) != 0 {
                    Period::Pm
                } else {
                    Period::Am
                };
                (bcd2_decode(regs[2] & HOUR_12_MASK), Some(period))
            }
        };

        Self {
            seconds: bcd2_decode(regs[0] & SECONDS_MASK),
            minutes: bcd2_decode(regs[1]),
            hours,
            period,
            weekday: bcd2_decode(regs[3]),
            date: bcd2_decode(regs[4]),
            month: bcd2_decode(regs[5]),
            year: bcd2_decode(regs[6]),
        }
    }

    /// From a `chrono` datetime, in 24-hour form. Returns `None` outside 2000 to 2099.
    pub fn from_datetime(dt: &NaiveDateTime) -> Option<Self> {
        let year = dt.year().checked_sub(2000)?;
        if !(0..=99).contains(&year) {
            return None;
        }

        Some(Self {
            seconds: dt.second() as u8,
            minutes: dt.minute() as u8,
            hours: dt.hour() as u8,
            period: None,
            weekday: dt.weekday().number_from_sunday() as u8,
            date: dt.day() as u8,
            month: dt.month() as u8,
            year: year as u8,
        })
    }

    /// To a `chrono` datetime. 12-hour records are converted using their period. Returns
    /// `None` if the fields don't form a valid date and time. The weekday isn't checked.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let hours = match self.period {
            None => self.hours,
            Some(Period::Am) => self.hours % 12,
            Some(Period::Pm) => self.hours % 12 + 12,
        };

        NaiveDate::from_ymd_opt(2000 + self.year as i32, self.month as u32, self.date as u32)?
            .and_hms_opt(hours as u32, self.minutes as u32, self.seconds as u32)
    }
}

/// Convert a value from 0 to 99 to two BCD digits. Returns `None` above 99.
pub fn bcd2_encode(value: u8) -> Option<u8> {
    if value > 99 {
        return None;
    }
    Some(((value / 10) << 4) | (value % 10))
}

/// Convert two BCD digits to binary.
pub fn bcd2_decode(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0f)
}

/// DS1307 client. Generic over the I2C master, which must already be initialized.
pub struct Ds1307<I> {
    pub i2c: I,
    pub hour_format: HourFormat,
}

impl<I: I2cMaster> Ds1307<I> {
    pub fn new(i2c: I, hour_format: HourFormat) -> Self {
        Self { i2c, hour_format }
    }

    /// Release the I2C master.
    pub fn free(self) -> I {
        self.i2c
    }

    /// Run a framed transfer, and send a stop whether or not it succeeded.
    fn framed(
        &mut self,
        transfer: impl FnOnce(&mut I) -> Result<(), I2cError>,
    ) -> Result<(), RtcError> {
        let result = transfer(&mut self.i2c);
        self.i2c.stop();
        result.map_err(RtcError::Bus)
    }

    /// Set the time and date. Fields are validated first; nothing is sent if one is out of range.
    pub fn write_time(&mut self, time: &TimeRecord) -> Result<(), RtcError> {
        let frame = time.to_frame(self.hour_format).inspect_err(|e| {
            log_warn!("Invalid RTC record: {}", e);
        })?;

        self.framed(|i2c| {
            i2c.start(DEVICE_ADDRESS, Direction::Write)?;
            i2c.write(&frame)
        })
    }

    /// Read the current time and date.
    pub fn read_time(&mut self) -> Result<TimeRecord, RtcError> {
        let mut regs = [0; 7];

        self.framed(|i2c| {
            i2c.start(DEVICE_ADDRESS, Direction::Write)?;
            i2c.write(&[WORD_ADDRESS])?;
            i2c.repeated_start(DEVICE_ADDRESS, Direction::Read)?;
            i2c.read(&mut regs)
        })?;

        Ok(TimeRecord::from_registers(&regs, self.hour_format))
    }
}
