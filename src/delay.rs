//! Blocking delays, using the Cortex-M SysTick timer.
//!
//! Each delay programs the reload value, runs one countdown and busy-waits on `COUNTFLAG`.
//! The inherent `delay_us` and `delay_ms` reject delays that don't fit in a single 24-bit
//! countdown. The `embedded_hal::delay::DelayNs` impl splits long delays into several.

#[cfg(hw)]
use cortex_m::peripheral::SYST;

use crate::{clocks::ClockCfg, macros::log_warn, regs::RegAccess};

/// Largest SysTick reload value.
pub const MAX_RVR: u32 = 0x00FF_FFFF;

// SYST_CSR
const CSR_ENABLE: u8 = 0;
const CSR_TICKINT: u8 = 1;
const CSR_CLKSOURCE: u8 = 2;
const CSR_COUNTFLAG: u8 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SystReg {
    Csr,
    Rvr,
    Cvr,
}

#[cfg(hw)]
impl RegAccess<SystReg> for SYST {
    fn read(&self, reg: SystReg) -> u32 {
        match reg {
            SystReg::Csr => self.csr.read(),
            SystReg::Rvr => self.rvr.read(),
            SystReg::Cvr => self.cvr.read(),
        }
    }

    fn write(&mut self, reg: SystReg, value: u32) {
        unsafe {
            match reg {
                SystReg::Csr => self.csr.write(value),
                SystReg::Rvr => self.rvr.write(value),
                SystReg::Cvr => self.cvr.write(value),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum DelayError {
    /// The delay needs more than `MAX_RVR` ticks.
    ReloadOverflow,
}

/// SysTick clock source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum TickSource {
    /// HCLK / 8. At 16Mhz, a tick is 0.5µs.
    AhbDiv8,
    /// HCLK. At 16Mhz, a tick is 0.0625µs.
    Ahb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct DelayConfig {
    pub source: TickSource,
    /// Raise the SysTick exception on each countdown.
    pub exception: bool,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            source: TickSource::AhbDiv8,
            exception: false,
        }
    }
}

/// System timer (SysTick) as a delay provider
pub struct Delay<T> {
    pub regs: T,
    cfg: DelayConfig,
    /// HCLK frequency, in Hz.
    hclk: u32,
}

impl<T> Delay<T>
where
    T: RegAccess<SystReg>,
{
    pub fn new(regs: T, hclk: u32, cfg: DelayConfig) -> Self {
        Self { regs, cfg, hclk }
    }

    /// Configures the system timer (SysTick) as a delay provider, using the HCLK speed from a
    /// clock configuration.
    pub fn from_clocks<C: ClockCfg>(regs: T, clock_cfg: &C, cfg: DelayConfig) -> Self {
        Self::new(regs, clock_cfg.systick(), cfg)
    }

    /// SysTick counting frequency, in Hz.
    pub fn tick_freq(&self) -> u32 {
        match self.cfg.source {
            TickSource::AhbDiv8 => self.hclk / 8,
            TickSource::Ahb => self.hclk,
        }
    }

    fn ticks(&self, duration: u64, units_per_sec: u64) -> u64 {
        duration * self.tick_freq() as u64 / units_per_sec
    }

    /// Delay for a number of µs. Returns `DelayError::ReloadOverflow`, without delaying, if
    /// this doesn't fit in a single countdown.
    pub fn delay_us(&mut self, us: u32) -> Result<(), DelayError> {
        self.single_countdown(self.ticks(us as u64, 1_000_000))
    }

    /// Delay for a number of ms. Returns `DelayError::ReloadOverflow`, without delaying, if
    /// this doesn't fit in a single countdown.
    pub fn delay_ms(&mut self, ms: u32) -> Result<(), DelayError> {
        self.single_countdown(self.ticks(ms as u64, 1_000))
    }

    fn single_countdown(&mut self, ticks: u64) -> Result<(), DelayError> {
        if ticks > MAX_RVR as u64 {
            log_warn!("SysTick reload out of range: {} ticks", ticks);
            return Err(DelayError::ReloadOverflow);
        }
        self.countdown(ticks as u32);
        Ok(())
    }

    /// Wait for any number of ticks, as a series of countdowns.
    fn wait_ticks(&mut self, mut ticks: u64) {
        while ticks > MAX_RVR as u64 {
            self.countdown(MAX_RVR);
            ticks -= MAX_RVR as u64;
        }
        self.countdown(ticks as u32);
    }

    /// Run one countdown from `reload`, and block until it wraps.
    fn countdown(&mut self, reload: u32) {
        if reload == 0 {
            return;
        }

        self.regs.write(SystReg::Rvr, reload);
        self.regs.write(SystReg::Cvr, 0);

        let mut csr = 1 << CSR_ENABLE;
        if self.cfg.exception {
            csr |= 1 << CSR_TICKINT;
        }
        if self.cfg.source == TickSource::Ahb {
            csr |= 1 << CSR_CLKSOURCE;
        }
        self.regs.write(SystReg::Csr, csr);

        while !self.regs.is_set(SystReg::Csr, CSR_COUNTFLAG) {}

        self.regs.write(SystReg::Csr, 0);
    }
}

impl<T> embedded_hal::delay::DelayNs for Delay<T>
where
    T: RegAccess<SystReg>,
{
    fn delay_ns(&mut self, ns: u32) {
        // Round up, so short delays aren't skipped.
        let ticks = (ns as u64 * self.tick_freq() as u64).div_ceil(1_000_000_000);
        self.wait_ticks(ticks);
    }

    fn delay_us(&mut self, us: u32) {
        self.wait_ticks(self.ticks(us as u64, 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.wait_ticks(self.ticks(ms as u64, 1_000));
    }
}
