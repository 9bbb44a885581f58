// On-target tests for the clock setup, SysTick delays, and the I2C device clients.

// This test requires a DS1307 and a 24C08 (A2 tied low) on I2C1:
// * pb8 <-> SCL
// * pb9 <-> SDA
// with pull-ups on both lines.

#![deny(warnings)]
#![no_std]
#![no_main]

#[cfg(test)]
#[embedded_test::tests(setup = rtt_target::rtt_init_defmt!())]
mod tests {
    use hal::{
        clocks::{Bus, ClockSource, Clocks, Rcc, SysClockSel, ahb1, apb1},
        delay::{Delay, DelayConfig, DelayError},
        ds1307::{Ds1307, HourFormat, Period, TimeRecord},
        eeprom::{ChipSelect, Eeprom},
        i2c::{I2c, I2cConfig},
        pac,
    };

    struct State {
        rcc: Rcc<pac::RCC>,
        clocks: Clocks,
        i2c: Option<I2c<pac::I2C1>>,
        delay: Delay<cortex_m::peripheral::SYST>,
    }

    #[init]
    fn init() -> State {
        let cp = cortex_m::Peripherals::take().unwrap();
        let dp = pac::Peripherals::take().unwrap();

        let clocks = Clocks::default();
        let mut rcc = Rcc::new(dp.RCC);
        let mut flash = dp.FLASH;
        clocks.setup(&mut rcc, &mut flash).unwrap();

        rcc.enable_peripheral(Bus::Ahb1, ahb1::GPIOB).unwrap();
        rcc.enable_and_reset(Bus::Apb1, apb1::I2C1).unwrap();

        // PB8, PB9: AF4, open drain
        let gpiob = &dp.GPIOB;
        gpiob
            .moder()
            .modify(|r, w| unsafe { w.bits((r.bits() & !(0b1111 << 16)) | (0b1010 << 16)) });
        gpiob
            .otyper()
            .modify(|r, w| unsafe { w.bits(r.bits() | (0b11 << 8)) });
        gpiob
            .afrh()
            .modify(|r, w| unsafe { w.bits((r.bits() & !0xff) | 0x44) });

        let i2c = I2c::new(dp.I2C1, I2cConfig::from_clocks(&clocks)).unwrap();

        State {
            rcc,
            clocks,
            i2c: Some(i2c),
            delay: Delay::from_clocks(cp.SYST, &clocks, DelayConfig::default()),
        }
    }

    #[test]
    fn running_from_pll(state: State) {
        defmt::assert_eq!(state.rcc.sysclk_status(), SysClockSel::PllP);
        defmt::assert!(state.rcc.is_ready(ClockSource::MainPll));
        defmt::assert_eq!(state.clocks.apb1(), 45_000_000);
    }

    #[test]
    fn delay_limits(mut state: State) {
        state.delay.delay_ms(100).unwrap();
        // HCLK / 8 = 22.5Mhz; 1 s is over 24 bits of ticks.
        defmt::assert_eq!(state.delay.delay_ms(1_000), Err(DelayError::ReloadOverflow));
    }

    #[test]
    fn rtc_round_trip(mut state: State) {
        let mut rtc = Ds1307::new(state.i2c.take().unwrap(), HourFormat::H12);

        let t = TimeRecord {
            seconds: 0,
            minutes: 30,
            hours: 11,
            period: Some(Period::Pm),
            weekday: 5,
            date: 20,
            month: 11,
            year: 23,
        };
        rtc.write_time(&t).unwrap();

        let read = rtc.read_time().unwrap();
        defmt::assert_eq!(read.hours, 11);
        defmt::assert_eq!(read.period, Some(Period::Pm));
        defmt::assert_eq!(read.date, 20);
        // Less than a second has passed.
        defmt::assert!(read.seconds <= 1);
    }

    #[test]
    fn eeprom_round_trip(mut state: State) {
        let mut eeprom = Eeprom::new(state.i2c.take().unwrap(), state.delay, ChipSelect::Device0);

        eeprom.write_bytes(0x10, &[0xaa, 0xbb, 0xcc]).unwrap();
        eeprom.write_cycle_delay();

        let mut buf = [0; 3];
        eeprom.read_bytes(0x10, &mut buf).unwrap();
        defmt::assert_eq!(buf, [0xaa, 0xbb, 0xcc]);

        // Upper block, via the device address.
        eeprom.write_bytes(0x3f0, &[1, 2]).unwrap();
        eeprom.write_cycle_delay();
        eeprom.read_bytes(0x3f0, &mut buf[..2]).unwrap();
        defmt::assert_eq!(buf[..2], [1, 2]);
    }
}
