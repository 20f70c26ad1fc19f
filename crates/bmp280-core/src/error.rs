//! Error taxonomy shared by every driver operation

use embedded_hal::i2c::ErrorKind;
use thiserror_no_std::Error;

use crate::registers::CHIP_ID;

/// Errors produced by the BMP280 driver.
///
/// The driver never retries internally: every variant is reported to the
/// caller as soon as it happens.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A configuration value was outside its encodable range
    #[error("Invalid argument: {what}")]
    InvalidArgument { what: &'static str },

    /// The shared bus lock was not obtained within its bound.
    /// The bus was not touched.
    #[error("Timed out waiting for the shared I2C bus")]
    LockTimeout,

    /// The bus transaction itself failed or timed out
    #[error("I2C transaction on register {register:#04x} failed: {kind}")]
    TransportFailure { register: u8, kind: ErrorKind },

    /// The identity register did not hold the BMP280 chip id
    #[error("Unexpected chip id {found:#04x} (expected {:#04x})", CHIP_ID)]
    NotFound { found: u8 },

    /// Measurement requested before a successful bring-up
    #[error("Sensor is not initialized")]
    NotInitialized,
}

impl Error {
    /// Whether the failure may clear up on its own by the next poll.
    ///
    /// Lock contention and bus glitches are transient during steady-state
    /// polling. A missing chip, a bad argument or an unconfigured handle
    /// will fail the same way every time.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::LockTimeout | Self::TransportFailure { .. })
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_state_failures_are_transient() {
        assert!(Error::LockTimeout.is_transient());
        assert!(
            Error::TransportFailure {
                register: 0xF7,
                kind: ErrorKind::Other
            }
            .is_transient()
        );
    }

    #[test]
    fn bring_up_and_usage_failures_are_not_transient() {
        assert!(!Error::NotFound { found: 0x60 }.is_transient());
        assert!(!Error::NotInitialized.is_transient());
        assert!(
            !Error::InvalidArgument {
                what: "filter coefficient must be 0..=4"
            }
            .is_transient()
        );
    }
}
