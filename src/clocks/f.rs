//! Clock tree presets for the F446: PLL and prescaler enums, and the `Clocks` struct.

use super::{ClockCfg, ClockSource, ClockState, PllConfig, Rcc, RccError, RccReg, SysClockSel};
#[cfg(hw)]
use crate::{pac, regs::impl_reg_access};
use crate::{macros::log_debug, regs::RegAccess};

const HSI_FREQ: u32 = 16_000_000;

// RCC_CR
const CR_CSSON: u8 = 19;

/// FLASH registers used for setting wait states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlashReg {
    Acr,
}

#[cfg(hw)]
impl_reg_access!(pac::FLASH, FlashReg, rw: [Acr]);

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
/// The clocks source input used by the PLL.
pub enum PllSrc {
    Hsi,
    Hse(u32), // Freq in Hz
}

impl PllSrc {
    /// Required instead of u8 repr due to numerical value on non-uniform discrim being experimental.
    /// (ie, can't set on `Pll(Pllsrc)`.
    pub fn bits(&self) -> u8 {
        match self {
            Self::Hsi => 0,
            Self::Hse(_) => 1,
        }
    }

    /// From a raw PLLSRC value. `hse_freq` is only used if the value selects HSE.
    pub fn from_bits(bits: u8, hse_freq: u32) -> Result<Self, RccError> {
        match bits {
            0 => Ok(Self::Hsi),
            1 => Ok(Self::Hse(hse_freq)),
            _ => Err(RccError::InvalidPllSource),
        }
    }

    pub fn freq(&self) -> u32 {
        match self {
            Self::Hsi => HSI_FREQ,
            Self::Hse(freq) => *freq,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum InputSrc {
    Hsi,
    Hse(u32), // freq in Hz
    /// Main PLL, P output.
    Pll(PllSrc),
    /// Main PLL, R output.
    PllR(PllSrc),
}

impl InputSrc {
    pub fn sysclk_sel(&self) -> SysClockSel {
        match self {
            Self::Hsi => SysClockSel::Hsi,
            Self::Hse(_) => SysClockSel::Hse,
            Self::Pll(_) => SysClockSel::PllP,
            Self::PllR(_) => SysClockSel::PllR,
        }
    }

    fn pll_src(&self) -> Option<PllSrc> {
        match self {
            Self::Pll(src) | Self::PllR(src) => Some(*src),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Pllp {
    Div2 = 0b00,
    Div4 = 0b01,
    Div6 = 0b10,
    Div8 = 0b11,
}

impl Pllp {
    pub fn value(&self) -> u8 {
        match self {
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div6 => 6,
            Self::Div8 => 8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
/// Main PLL division factor for USB OTG FS, SDIO and the RNG. The register value is the
/// division factor.
pub enum Pllq {
    Div2 = 2,
    Div3 = 3,
    Div4 = 4,
    Div5 = 5,
    Div6 = 6,
    Div7 = 7,
    Div8 = 8,
    Div9 = 9,
    Div10 = 10,
    Div11 = 11,
    Div12 = 12,
    Div13 = 13,
    Div14 = 14,
    Div15 = 15,
}

impl Pllq {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
/// Main PLL division factor for I2S, SAI and SYSCLK (when selected).
pub enum Pllr {
    Div2 = 2,
    Div3 = 3,
    Div4 = 4,
    Div5 = 5,
    Div6 = 6,
    Div7 = 7,
}

impl Pllr {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
/// Clock divider for the HCLK. See RM0390, section 6.3.3: RCC_CFGR, HPRE field.
pub enum HclkPrescaler {
    Div1 = 0b0000,
    Div2 = 0b1000,
    Div4 = 0b1001,
    Div8 = 0b1010,
    Div16 = 0b1011,
    Div64 = 0b1100,
    Div128 = 0b1101,
    Div256 = 0b1110,
    Div512 = 0b1111,
}

impl HclkPrescaler {
    pub fn value(&self) -> u16 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div64 => 64,
            Self::Div128 => 128,
            Self::Div256 => 256,
            Self::Div512 => 512,
        }
    }

    /// From a division factor. There's no /32.
    pub fn from_value(div: u16) -> Option<Self> {
        Some(match div {
            1 => Self::Div1,
            2 => Self::Div2,
            4 => Self::Div4,
            8 => Self::Div8,
            16 => Self::Div16,
            64 => Self::Div64,
            128 => Self::Div128,
            256 => Self::Div256,
            512 => Self::Div512,
            _ => return None,
        })
    }
}

/// Represents Flash wait states in the FLASH_ACR register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum WaitState {
    W0 = 0,
    W1 = 1,
    W2 = 2,
    W3 = 3,
    W4 = 4,
    W5 = 5,
}

impl WaitState {
    /// RM0390, table 5. Assumes 2.7 to 3.6V.
    fn from_hclk(hclk: u32) -> Self {
        if hclk <= 30_000_000 {
            Self::W0
        } else if hclk <= 60_000_000 {
            Self::W1
        } else if hclk <= 90_000_000 {
            Self::W2
        } else if hclk <= 120_000_000 {
            Self::W3
        } else if hclk <= 150_000_000 {
            Self::W4
        } else {
            Self::W5
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
/// For use with `RCC_CFGR`, `PPRE1` and `PPRE2` fields.
pub enum ApbPrescaler {
    Div1 = 0b000,
    Div2 = 0b100,
    Div4 = 0b101,
    Div8 = 0b110,
    Div16 = 0b111,
}

impl ApbPrescaler {
    pub fn value(&self) -> u8 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
        }
    }

    pub fn from_value(div: u16) -> Option<Self> {
        Some(match div {
            1 => Self::Div1,
            2 => Self::Div2,
            4 => Self::Div4,
            8 => Self::Div8,
            16 => Self::Div16,
            _ => return None,
        })
    }
}

/// Settings used to configure clocks. Create this struct by using its `Default::default()`
/// implementation, then modify as required, referencing RM0390's clock tree,
/// or Stm32Cube IDE's interactive clock manager. Apply settings by running `.setup()`.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct Clocks {
    /// The input source for the system and peripheral clocks. Eg HSE, HSI, PLL etc
    pub input_src: InputSrc,
    pub pllm: u8,
    pub plln: u16,
    pub pllp: Pllp,
    pub pllq: Pllq, // USB prescaler, for target of 48Mhz.
    pub pllr: Pllr,
    /// The value to divide SYSCLK by, to get systick and peripheral clocks. Also known as AHB divider
    pub hclk_prescaler: HclkPrescaler,
    /// The divider of HCLK to get the APB1 peripheral clock
    pub apb1_prescaler: ApbPrescaler,
    /// The divider of HCLK to get the APB2 peripheral clock
    pub apb2_prescaler: ApbPrescaler,
    /// Bypass the HSE output, for use with oscillators that don't need it. Saves power, and
    /// frees up the pin for use as GPIO.
    pub hse_bypass: bool,
    pub security_system: bool,
}

impl Clocks {
    /// Apply these settings: flash wait states, oscillator and PLL, prescalers, then the
    /// system clock switch. Returns an error, without changing anything, if the speeds are
    /// out of range.
    pub fn setup<R, F>(&self, rcc: &mut Rcc<R>, flash: &mut F) -> Result<(), RccError>
    where
        R: RegAccess<RccReg>,
        F: RegAccess<FlashReg>,
    {
        self.validate_speeds()?;

        // Adjust flash wait states according to the HCLK frequency.
        // We need to do this before enabling PLL, or it won't enable.
        let ws = WaitState::from_hclk(self.hclk());
        flash.write_field(FlashReg::Acr, 0, 0b1111, ws as u32);

        // Bypass must be set before HSE is enabled.
        rcc.hse_bypass(self.hse_bypass);

        // Enable oscillators, and wait until ready.
        let osc = match self.input_src {
            InputSrc::Hsi => ClockSource::Hsi,
            InputSrc::Hse(_) => ClockSource::Hse,
            InputSrc::Pll(src) | InputSrc::PllR(src) => match src {
                PllSrc::Hsi => ClockSource::Hsi,
                PllSrc::Hse(_) => ClockSource::Hse,
            },
        };
        rcc.set_clock_state(osc, ClockState::On)?;

        if self.input_src.pll_src().is_some() {
            // Turn off the PLL: Required for modifying some of the settings below.
            rcc.set_clock_state(ClockSource::MainPll, ClockState::Off)?;
            rcc.wait_stopped(ClockSource::MainPll)?;

            rcc.set_pll_config(Some(&self.pll_config()))?;

            // Now turn PLL back on, once we're configured things that can only be set with it off.
            rcc.set_clock_state(ClockSource::MainPll, ClockState::On)?;
        }

        rcc.set_ahb_prescaler(self.hclk_prescaler);
        rcc.set_apb1_prescaler(self.apb1_prescaler);
        rcc.set_apb2_prescaler(self.apb2_prescaler);

        rcc.switch_sysclk(self.input_src.sysclk_sel())?;

        if self.security_system {
            rcc.regs.set_bits(RccReg::Cr, 1 << CR_CSSON);
        } else {
            rcc.regs.clear_bits(RccReg::Cr, 1 << CR_CSSON);
        }

        // If we're not using the default clock source as input source or for PLL, turn it off.
        if osc != ClockSource::Hsi {
            rcc.set_clock_state(ClockSource::Hsi, ClockState::Off)?;
        }

        log_debug!("Clocks set up. SYSCLK: {} Hz", self.sysclk());

        Ok(())
    }

    /// The PLL factors these settings use. The source defaults to HSI if the PLL doesn't
    /// drive SYSCLK.
    pub fn pll_config(&self) -> PllConfig {
        PllConfig {
            src: self.input_src.pll_src().unwrap_or(PllSrc::Hsi),
            m: self.pllm,
            n: self.plln,
            p: self.pllp,
            q: self.pllq,
            r: self.pllr,
        }
    }

    /// VCO output frequency, in Hz.
    fn vco(&self) -> u32 {
        let input = self.input_src.pll_src().unwrap_or(PllSrc::Hsi).freq();
        input / self.pllm as u32 * self.plln as u32
    }

    /// Calculate the sysclock frequency, in  Hz.
    pub fn sysclk(&self) -> u32 {
        match self.input_src {
            InputSrc::Hsi => HSI_FREQ,
            InputSrc::Hse(freq) => freq,
            InputSrc::Pll(_) => self.vco() / self.pllp.value() as u32,
            InputSrc::PllR(_) => self.vco() / self.pllr.value() as u32,
        }
    }

    /// The main PLL's Q output, in Hz. USB OTG FS needs 48Mhz.
    pub fn pll_q(&self) -> u32 {
        self.vco() / self.pllq.value() as u32
    }

    pub fn hclk(&self) -> u32 {
        self.sysclk() / self.hclk_prescaler.value() as u32
    }

    pub fn systick(&self) -> u32 {
        self.hclk()
    }

    pub fn apb1(&self) -> u32 {
        self.hclk() / self.apb1_prescaler.value() as u32
    }

    pub fn apb1_timer(&self) -> u32 {
        if let ApbPrescaler::Div1 = self.apb1_prescaler {
            self.apb1()
        } else {
            self.apb1() * 2
        }
    }

    pub fn apb2(&self) -> u32 {
        self.hclk() / self.apb2_prescaler.value() as u32
    }

    pub fn apb2_timer(&self) -> u32 {
        if let ApbPrescaler::Div1 = self.apb2_prescaler {
            self.apb2()
        } else {
            self.apb2() * 2
        }
    }

    pub fn validate_speeds(&self) -> Result<(), RccError> {
        let max_clock = 180_000_000;

        if self.input_src.pll_src().is_some() {
            self.pll_config().validate().map_err(|_| RccError::Speed)?;
        }

        if self.sysclk() > max_clock || self.hclk() > max_clock {
            return Err(RccError::Speed);
        }

        if self.apb1() > 45_000_000 {
            return Err(RccError::Speed);
        }

        if self.apb2() > 90_000_000 {
            return Err(RccError::Speed);
        }

        Ok(())
    }
}

impl ClockCfg for Clocks {
    fn sysclk(&self) -> u32 {
        Clocks::sysclk(self)
    }

    fn hclk(&self) -> u32 {
        Clocks::hclk(self)
    }

    fn systick(&self) -> u32 {
        Clocks::systick(self)
    }

    fn apb1(&self) -> u32 {
        Clocks::apb1(self)
    }

    fn apb1_timer(&self) -> u32 {
        Clocks::apb1_timer(self)
    }

    fn apb2(&self) -> u32 {
        Clocks::apb2(self)
    }

    fn apb2_timer(&self) -> u32 {
        Clocks::apb2_timer(self)
    }
}

impl Default for Clocks {
    /// This preset configures clocks with a HSI, and a 180Mhz system clock. APB1 is at 45Mhz,
    /// and APB2 at 90Mhz. Not valid for USB.
    fn default() -> Self {
        Self {
            input_src: InputSrc::Pll(PllSrc::Hsi),
            pllm: 8,
            plln: 180,
            pllp: Pllp::Div2,
            pllq: Pllq::Div8, // Note that this produces an invalid USB speed.
            pllr: Pllr::Div2,
            hclk_prescaler: HclkPrescaler::Div1,
            apb1_prescaler: ApbPrescaler::Div4,
            apb2_prescaler: ApbPrescaler::Div2,
            hse_bypass: false,
            security_system: false,
        }
    }
}
