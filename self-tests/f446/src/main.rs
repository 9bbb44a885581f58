//! Bring-up example: configures the clock tree, then reads a DS1307 on I2C1 (PB8 SCL, PB9 SDA),
//! printing the time once a second. The user button (PC13) logs an EXTI interrupt.

#![deny(warnings)]
#![no_std]
#![no_main]

use cortex_m_rt::entry; // The runtime
use embedded_hal::delay::DelayNs;
use hal::{
    access_global,
    clocks::{Bus, Clocks, Rcc, ahb1, apb1, apb2},
    delay::{Delay, DelayConfig},
    ds1307::{Ds1307, HourFormat},
    exti::{EXTI15_10, Exti, ExtiConfig, ExtiLine, Trigger},
    i2c::{I2c, I2cConfig},
    init_globals, make_globals,
    nvic::Nvic,
    pac::{self, interrupt},
    syscfg::{Port, Syscfg},
};

// Import the panic handler
use panic_probe as _;

make_globals!((EXTI, Exti<pac::EXTI>));

fn on_button() {
    defmt::println!("Button pressed");
}

/// Route PB8 and PB9 to I2C1: alternate function 4, open drain.
fn i2c_pins(gpiob: &pac::GPIOB) {
    gpiob
        .moder()
        .modify(|r, w| unsafe { w.bits((r.bits() & !(0b1111 << 16)) | (0b1010 << 16)) });
    gpiob
        .otyper()
        .modify(|r, w| unsafe { w.bits(r.bits() | (0b11 << 8)) });
    gpiob
        .afrh()
        .modify(|r, w| unsafe { w.bits((r.bits() & !0xff) | 0x44) });
}

#[entry]
fn main() -> ! {
    rtt_target::rtt_init_defmt!();
    // Set up CPU peripherals
    let cp = cortex_m::Peripherals::take().unwrap();
    // Set up microcontroller peripherals
    let dp = pac::Peripherals::take().unwrap();

    let clock_cfg = Clocks::default();
    let mut rcc = Rcc::new(dp.RCC);
    let mut flash = dp.FLASH;
    clock_cfg.setup(&mut rcc, &mut flash).unwrap();
    defmt::println!("SYSCLK: {} Hz", clock_cfg.sysclk());

    rcc.enable_peripheral(Bus::Ahb1, ahb1::GPIOB).unwrap();
    rcc.enable_and_reset(Bus::Apb1, apb1::I2C1).unwrap();
    rcc.enable_peripheral(Bus::Apb2, apb2::SYSCFG).unwrap();

    i2c_pins(&dp.GPIOB);

    let mut delay = Delay::from_clocks(cp.SYST, &clock_cfg, DelayConfig::default());

    // PC13 falling edge, on the shared EXTI15_10 vector.
    let mut syscfg = Syscfg::new(dp.SYSCFG);
    syscfg.set_exti_port(ExtiLine::L13, Port::C).unwrap();

    let mut exti = Exti::new(dp.EXTI);
    exti.init(&ExtiConfig {
        line: ExtiLine::L13,
        trigger: Trigger::Falling,
        enabled: true,
        handler: Some(on_button),
    })
    .unwrap();
    init_globals!((EXTI, exti));

    let mut nvic = Nvic::new(cp.NVIC);
    nvic.set_priority(ExtiLine::L13.irq(), 6).unwrap();
    nvic.enable(ExtiLine::L13.irq());

    let i2c = I2c::new(dp.I2C1, I2cConfig::from_clocks(&clock_cfg)).unwrap();
    let mut rtc = Ds1307::new(i2c, HourFormat::H24);

    loop {
        match rtc.read_time() {
            Ok(t) => defmt::println!(
                "20{:02}-{:02}-{:02} {:02}:{:02}:{:02}",
                t.year,
                t.month,
                t.date,
                t.hours,
                t.minutes,
                t.seconds
            ),
            Err(e) => defmt::println!("RTC read failed: {}", e),
        }
        DelayNs::delay_ms(&mut delay, 1_000);
    }
}

#[interrupt]
fn EXTI15_10() {
    critical_section::with(|cs| {
        access_global!(EXTI, exti, cs);
        exti.on_shared_interrupt(&EXTI15_10).ok();
    });
}

// same panicking *behavior* as `panic-probe` but doesn't print a panic message
// this prevents the panic message being printed *twice* when `defmt::panic` is invoked
#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
