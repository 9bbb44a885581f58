//! Common error definitions.

use crate::{
    clocks::RccError, delay::DelayError, ds1307::RtcError, eeprom::EepromError, i2c::I2cError,
    nvic::InterruptError, usart::UsartError,
};

macro_rules! impl_from_error {
    ($error:ident) => {
        impl From<$error> for Error {
            fn from(error: $error) -> Self {
                Self::$error(error)
            }
        }
    };
}

/// Alias for Result<T, Error>.
pub type Result<T> = core::result::Result<T, Error>;

/// Collection of all errors that can occur.
#[derive(Debug, Clone, Copy, Eq, PartialEq, defmt::Format)]
pub enum Error {
    /// Clock errors.
    RccError(RccError),
    DelayError(DelayError),
    I2cError(I2cError),
    /// DS1307 errors.
    RtcError(RtcError),
    EepromError(EepromError),
    /// NVIC, EXTI, SCB and SYSCFG configuration errors.
    InterruptError(InterruptError),
    UsartError(UsartError),
}

impl_from_error!(RccError);
impl_from_error!(DelayError);
impl_from_error!(I2cError);
impl_from_error!(RtcError);
impl_from_error!(EepromError);
impl_from_error!(InterruptError);
impl_from_error!(UsartError);

mod embedded_hal_impl {
    use embedded_hal::i2c::{Error as I2cEhError, ErrorKind as I2cErrorKind};

    use super::Error;

    impl I2cEhError for Error {
        fn kind(&self) -> I2cErrorKind {
            match self {
                Error::I2cError(i) => i.kind(),
                Error::RtcError(r) => match r.bus_error() {
                    Some(i) => i.kind(),
                    None => I2cErrorKind::Other,
                },
                Error::EepromError(e) => match e.bus_error() {
                    Some(i) => i.kind(),
                    None => I2cErrorKind::Other,
                },
                _ => I2cErrorKind::Other,
            }
        }
    }
}
