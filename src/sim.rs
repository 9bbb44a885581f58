//! Host-side models of the peripherals and devices, for unit tests. Each implements the same
//! trait the driver uses on hardware (`RegAccess`, `I2cMaster` or `DelayNs`), with enough of
//! the hardware's behaviour for the drivers' sequencing to be checked.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    vec::Vec,
};

use embedded_hal::delay::DelayNs;

use crate::{
    clocks::{ClockSource, RccReg},
    delay::SystReg,
    i2c::{Direction, I2cError, I2cMaster, I2cReg},
    regs::{RegAccess, sim::RegFile},
};

const OSCILLATORS: [ClockSource; 5] = [
    ClockSource::Hsi,
    ClockSource::Hse,
    ClockSource::MainPll,
    ClockSource::PllI2s,
    ClockSource::PllSai,
];

// RCC_CR after reset: HSION, HSITRIM = 16. HSIRDY is derived.
const CR_RESET: u32 = 0x0000_0081;
const PLLCFGR_RESET: u32 = 0x2400_3010;

struct Oscillator {
    /// CR reads, after being turned on, before the ready flag sets. `None` never sets it.
    ready_after: Option<u32>,
    polls: Cell<u32>,
}

/// RCC with oscillators that become ready some number of polls after being turned on, and a
/// system clock switch that only takes effect once the selected source is ready.
pub struct SimRcc {
    file: RegFile<RccReg>,
    oscillators: [Oscillator; 5],
    cr_reads: Cell<u32>,
    sws: Cell<u32>,
}

impl SimRcc {
    pub fn new() -> Self {
        let mut file = RegFile::new();
        file.set(RccReg::Cr, CR_RESET);
        file.set(RccReg::Pllcfgr, PLLCFGR_RESET);

        Self {
            file,
            oscillators: core::array::from_fn(|_| Oscillator {
                ready_after: Some(0),
                polls: Cell::new(0),
            }),
            cr_reads: Cell::new(0),
            sws: Cell::new(0),
        }
    }

    /// Set how many CR reads it takes, after turning `source` on, for its ready flag to set.
    pub fn ready_after(&mut self, source: ClockSource, reads: Option<u32>) {
        self.oscillators[Self::index(source)].ready_after = reads;
    }

    /// Total reads of RCC_CR.
    pub fn cr_reads(&self) -> u32 {
        self.cr_reads.get()
    }

    pub fn set(&mut self, reg: RccReg, value: u32) {
        self.file.set(reg, value);
    }

    pub fn writes_to(&self, reg: RccReg) -> Vec<u32> {
        self.file.writes_to(reg)
    }

    fn index(source: ClockSource) -> usize {
        OSCILLATORS
            .iter()
            .position(|s| *s == source)
            .unwrap()
    }

    fn is_on(&self, source: ClockSource) -> bool {
        self.file.get(RccReg::Cr) & (1 << source.on_bit()) != 0
    }

    fn ready(&self, source: ClockSource) -> bool {
        let osc = &self.oscillators[Self::index(source)];
        self.is_on(source) && osc.ready_after.is_some_and(|n| osc.polls.get() >= n)
    }

    fn ready_mask() -> u32 {
        OSCILLATORS.iter().fold(0, |m, s| m | (1 << s.ready_bit()))
    }

    fn source_for_sw(sw: u32) -> ClockSource {
        match sw {
            0 => ClockSource::Hsi,
            1 => ClockSource::Hse,
            _ => ClockSource::MainPll,
        }
    }
}

impl RegAccess<RccReg> for SimRcc {
    fn read(&self, reg: RccReg) -> u32 {
        match reg {
            RccReg::Cr => {
                self.cr_reads.set(self.cr_reads.get() + 1);

                let mut value = self.file.get(RccReg::Cr);
                for (i, source) in OSCILLATORS.iter().enumerate() {
                    if self.is_on(*source) {
                        let polls = &self.oscillators[i].polls;
                        polls.set(polls.get() + 1);
                    }
                    if self.ready(*source) {
                        value |= 1 << source.ready_bit();
                    }
                }
                value
            }
            RccReg::Cfgr => {
                let cfgr = self.file.get(RccReg::Cfgr);
                let sw = cfgr & 0b11;
                if self.ready(Self::source_for_sw(sw)) {
                    self.sws.set(sw);
                }
                (cfgr & !(0b11 << 2)) | (self.sws.get() << 2)
            }
            _ => self.file.get(reg),
        }
    }

    fn write(&mut self, reg: RccReg, value: u32) {
        match reg {
            RccReg::Cr => {
                let value = value & !Self::ready_mask();
                for (i, source) in OSCILLATORS.iter().enumerate() {
                    let bit = 1 << source.on_bit();
                    if !self.is_on(*source) && value & bit != 0 {
                        self.oscillators[i].polls.set(0);
                    }
                }
                self.file.write(reg, value);
            }
            RccReg::Cfgr => self.file.write(reg, value & !(0b11 << 2)),
            _ => self.file.write(reg, value),
        }
    }
}

// SYST_CSR
const CSR_ENABLE: u32 = 1;
const CSR_CLKSOURCE: u32 = 1 << 2;
const CSR_COUNTFLAG: u32 = 1 << 16;

/// SysTick whose countdowns finish immediately: `COUNTFLAG` reads set whenever the counter is
/// enabled.
pub struct SimSyst {
    file: RegFile<SystReg>,
    /// Reload value, and whether HCLK (not HCLK/8) was selected, for each countdown started.
    pub countdowns: Vec<(u32, bool)>,
}

impl SimSyst {
    pub fn new() -> Self {
        Self {
            file: RegFile::new(),
            countdowns: Vec::new(),
        }
    }

    pub fn get(&self, reg: SystReg) -> u32 {
        self.file.get(reg)
    }

    pub fn csr_writes(&self) -> Vec<u32> {
        self.file.writes_to(SystReg::Csr)
    }
}

impl RegAccess<SystReg> for SimSyst {
    fn read(&self, reg: SystReg) -> u32 {
        let value = self.file.get(reg);
        if reg == SystReg::Csr && value & CSR_ENABLE != 0 {
            value | CSR_COUNTFLAG
        } else {
            value
        }
    }

    fn write(&mut self, reg: SystReg, value: u32) {
        self.file.write(reg, value);
        if reg == SystReg::Csr && value & CSR_ENABLE != 0 {
            self.countdowns
                .push((self.file.get(SystReg::Rvr), value & CSR_CLKSOURCE != 0));
        }
    }
}

/// What the I2C peripheral put on the wire, or received from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireEvent {
    Start,
    RepeatedStart,
    /// Address byte, including the R/W bit.
    Address(u8),
    Byte(u8),
    Received { byte: u8, ack: bool },
    Stop,
}

// I2C bits
const CR1_START: u32 = 1 << 8;
const CR1_STOP: u32 = 1 << 9;
const CR1_ACK: u32 = 1 << 10;
const SR1_SB: u32 = 1;
const SR1_ADDR: u32 = 1 << 1;
const SR1_BTF: u32 = 1 << 2;
const SR1_RXNE: u32 = 1 << 6;
const SR1_TXE: u32 = 1 << 7;
const SR1_AF: u32 = 1 << 10;
const SR2_MSL: u32 = 1;
const SR2_BUSY: u32 = 1 << 1;

/// I2C peripheral in master mode, attached to a device that acknowledges every address (unless
/// `nack_address` is set) and sends bytes from a queue.
pub struct SimI2c {
    file: RefCell<RegFile<I2cReg>>,
    events: RefCell<Vec<WireEvent>>,
    rx: RefCell<VecDeque<u8>>,
    /// Direction of the current transfer, once addressed.
    mode: Option<Direction>,
    master: bool,
    pub nack_address: bool,
    /// Report the bus busy, as if another master held it.
    pub stuck_busy: bool,
    /// CR1.ACK when ADDR was last cleared.
    ack_at_addr_clear: Cell<Option<bool>>,
}

impl SimI2c {
    pub fn new() -> Self {
        Self {
            file: RefCell::new(RegFile::new()),
            events: RefCell::new(Vec::new()),
            rx: RefCell::new(VecDeque::new()),
            mode: None,
            master: false,
            nack_address: false,
            stuck_busy: false,
            ack_at_addr_clear: Cell::new(None),
        }
    }

    pub fn get(&self, reg: I2cReg) -> u32 {
        self.file.borrow().get(reg)
    }

    pub fn set(&mut self, reg: I2cReg, value: u32) {
        self.file.borrow_mut().set(reg, value);
    }

    /// Bytes the device sends on subsequent reads.
    pub fn queue_rx(&mut self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes);
    }

    pub fn events(&self) -> Vec<WireEvent> {
        self.events.borrow().clone()
    }

    /// Whether ACK was set when the address phase was released, for the latest transfer.
    pub fn ack_at_addr_clear(&self) -> Option<bool> {
        self.ack_at_addr_clear.get()
    }

    fn record(&self, event: WireEvent) {
        self.events.borrow_mut().push(event);
    }

    fn modify_sr1(&self, f: impl FnOnce(u32) -> u32) {
        let mut file = self.file.borrow_mut();
        let sr1 = file.get(I2cReg::Sr1);
        file.set(I2cReg::Sr1, f(sr1));
    }
}

impl RegAccess<I2cReg> for SimI2c {
    fn read(&self, reg: I2cReg) -> u32 {
        match reg {
            I2cReg::Sr1 => {
                let mut sr1 = self.get(I2cReg::Sr1);
                match self.mode {
                    Some(Direction::Write) => sr1 |= SR1_TXE | SR1_BTF,
                    Some(Direction::Read) if !self.rx.borrow().is_empty() => sr1 |= SR1_RXNE,
                    _ => (),
                }
                sr1
            }
            I2cReg::Sr2 => {
                if self.get(I2cReg::Sr1) & SR1_ADDR != 0 {
                    self.ack_at_addr_clear
                        .set(Some(self.get(I2cReg::Cr1) & CR1_ACK != 0));
                }
                self.modify_sr1(|v| v & !SR1_ADDR);

                let mut sr2 = 0;
                if self.master {
                    sr2 |= SR2_MSL | SR2_BUSY;
                }
                if self.stuck_busy {
                    sr2 |= SR2_BUSY;
                }
                sr2
            }
            I2cReg::Dr => match self.rx.borrow_mut().pop_front() {
                Some(byte) => {
                    let ack = self.get(I2cReg::Cr1) & CR1_ACK != 0;
                    self.record(WireEvent::Received { byte, ack });
                    byte as u32
                }
                None => 0,
            },
            _ => self.get(reg),
        }
    }

    fn write(&mut self, reg: I2cReg, value: u32) {
        match reg {
            I2cReg::Cr1 => {
                if value & CR1_START != 0 {
                    self.record(if self.master {
                        WireEvent::RepeatedStart
                    } else {
                        WireEvent::Start
                    });
                    self.master = true;
                    self.mode = None;
                    self.modify_sr1(|v| v | SR1_SB);
                }
                if value & CR1_STOP != 0 {
                    self.record(WireEvent::Stop);
                    self.master = false;
                    // A receiver finishes the byte in progress before the STOP goes out.
                    if self.mode != Some(Direction::Read) {
                        self.mode = None;
                    }
                }
                // START and STOP are cleared by hardware once generated.
                self.file
                    .get_mut()
                    .write(reg, value & !(CR1_START | CR1_STOP));
            }
            I2cReg::Dr => {
                let byte = value as u8;
                if self.get(I2cReg::Sr1) & SR1_SB != 0 {
                    self.record(WireEvent::Address(byte));
                    if self.nack_address {
                        self.modify_sr1(|v| (v & !SR1_SB) | SR1_AF);
                    } else {
                        self.modify_sr1(|v| (v & !SR1_SB) | SR1_ADDR);
                        self.mode = Some(if byte & 1 != 0 {
                            Direction::Read
                        } else {
                            Direction::Write
                        });
                    }
                } else {
                    self.record(WireEvent::Byte(byte));
                }
                self.file.get_mut().writes.push((reg, value));
            }
            // rc_w0
            I2cReg::Sr1 => self.modify_sr1(|v| v & value),
            _ => self.file.get_mut().write(reg, value),
        }
    }
}

/// A transfer primitive called on `SimBus`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Start(u8, Direction),
    RepeatedStart(u8, Direction),
    Write(Vec<u8>),
    /// Number of bytes read.
    Read(usize),
    Stop,
}

const RTC_ADDRESS: u8 = 0b110_1000;
const EEPROM_ADDRESSES: core::ops::RangeInclusive<u8> = 0x50..=0x57;
const EEPROM_SIZE: usize = 1024;
const EEPROM_PAGE: usize = 16;

/// An I2C bus at the transfer level, with a DS1307 and two 24C08 EEPROMs attached.
///
/// Each device keeps a register pointer, set by the first byte written after it's addressed
/// for writing. The EEPROM's pointer wraps within the page on writes, as the real part does.
pub struct SimBus {
    pub events: Vec<BusEvent>,
    /// DS1307 registers: time and date, control, then RAM.
    pub rtc_regs: [u8; 64],
    /// Memory of the EEPROM with A2 low, then the one with A2 high. Erased to 0xff.
    pub eeproms: [[u8; EEPROM_SIZE]; 2],
    /// Addresses that don't acknowledge.
    pub absent: Vec<u8>,
    /// Fail the nth transfer primitive (start, repeated start, write or read; counted from 0).
    pub fail_op: Option<(usize, I2cError)>,
    ops: usize,
    addressed: Option<(u8, Direction)>,
    pointer: usize,
    pointer_pending: bool,
    frame: Vec<u8>,
    frame_ok: bool,
    frames: Vec<Vec<u8>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            rtc_regs: [0; 64],
            eeproms: [[0xff; EEPROM_SIZE]; 2],
            absent: Vec::new(),
            fail_op: None,
            ops: 0,
            addressed: None,
            pointer: 0,
            pointer_pending: false,
            frame: Vec::new(),
            frame_ok: true,
            frames: Vec::new(),
        }
    }

    /// Bytes written in each completed, error-free transaction that didn't read.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.frames.clone()
    }

    fn next_op(&mut self) -> Result<(), I2cError> {
        let op = self.ops;
        self.ops += 1;
        match self.fail_op {
            Some((n, e)) if n == op => {
                self.frame_ok = false;
                Err(e)
            }
            _ => Ok(()),
        }
    }

    fn address(&mut self, addr: u8, dir: Direction) -> Result<(), I2cError> {
        let known = addr == RTC_ADDRESS || EEPROM_ADDRESSES.contains(&addr);
        if !known || self.absent.contains(&addr) {
            self.frame_ok = false;
            self.addressed = None;
            return Err(I2cError::Nack);
        }

        if dir == Direction::Read {
            self.frame_ok = false;
        } else {
            self.pointer_pending = true;
        }
        self.addressed = Some((addr, dir));
        Ok(())
    }

    fn eeprom_select(addr: u8) -> (usize, usize) {
        (((addr >> 2) & 1) as usize, (addr & 0b11) as usize)
    }
}

impl I2cMaster for SimBus {
    fn start(&mut self, addr: u8, dir: Direction) -> Result<(), I2cError> {
        self.next_op()?;
        self.events.push(BusEvent::Start(addr, dir));
        self.address(addr, dir)
    }

    fn repeated_start(&mut self, addr: u8, dir: Direction) -> Result<(), I2cError> {
        self.next_op()?;
        self.events.push(BusEvent::RepeatedStart(addr, dir));
        self.address(addr, dir)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), I2cError> {
        self.next_op()?;
        let Some((addr, Direction::Write)) = self.addressed else {
            return Err(I2cError::Bus);
        };
        self.events.push(BusEvent::Write(bytes.to_vec()));
        self.frame.extend_from_slice(bytes);

        for byte in bytes {
            if addr == RTC_ADDRESS {
                if self.pointer_pending {
                    self.pointer = *byte as usize % self.rtc_regs.len();
                } else {
                    self.rtc_regs[self.pointer] = *byte;
                    self.pointer = (self.pointer + 1) % self.rtc_regs.len();
                }
            } else {
                let (chip, block) = Self::eeprom_select(addr);
                if self.pointer_pending {
                    self.pointer = (block << 8) | *byte as usize;
                } else {
                    self.eeproms[chip][self.pointer] = *byte;
                    let page = self.pointer & !(EEPROM_PAGE - 1);
                    self.pointer = page | ((self.pointer + 1) & (EEPROM_PAGE - 1));
                }
            }
            self.pointer_pending = false;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), I2cError> {
        self.next_op()?;
        let Some((addr, Direction::Read)) = self.addressed else {
            return Err(I2cError::Bus);
        };
        self.events.push(BusEvent::Read(buf.len()));

        for byte in buf.iter_mut() {
            if addr == RTC_ADDRESS {
                *byte = self.rtc_regs[self.pointer];
                self.pointer = (self.pointer + 1) % self.rtc_regs.len();
            } else {
                let (chip, _) = Self::eeprom_select(addr);
                *byte = self.eeproms[chip][self.pointer];
                self.pointer = (self.pointer + 1) % EEPROM_SIZE;
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.events.push(BusEvent::Stop);

        let frame = core::mem::take(&mut self.frame);
        if self.frame_ok && !frame.is_empty() {
            self.frames.push(frame);
        }
        self.frame_ok = true;
        self.addressed = None;
    }
}

/// Records each delay requested, in ns.
#[derive(Default)]
pub struct SimDelay {
    pub calls_ns: Vec<u64>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls_ns.push(ns as u64);
    }

    fn delay_us(&mut self, us: u32) {
        self.calls_ns.push(us as u64 * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls_ns.push(ms as u64 * 1_000_000);
    }
}
