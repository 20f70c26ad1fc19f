//! Raw ADC samples, decoded status and compensated results

use log::debug;

use crate::error::Result;
use crate::registers::{DATA_LEN, REG_PRESS_MSB, REG_STATUS};
use crate::transport::Registers;

/// One coherent pair of 20-bit ADC counts, read in a single burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub pressure: i32,
    pub temperature: i32,
}

/// Assemble a 20-bit count from MSB, LSB and the top nibble of XLSB
#[inline]
fn adc20(msb: u8, lsb: u8, xlsb: u8) -> i32 {
    (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
}

impl RawSample {
    /// Decode the burst starting at 0xF7: pressure MSB, LSB, XLSB, then
    /// temperature MSB, LSB, XLSB.
    pub fn from_bytes(raw: &[u8; DATA_LEN]) -> Self {
        Self {
            pressure: adc20(raw[0], raw[1], raw[2]),
            temperature: adc20(raw[3], raw[4], raw[5]),
        }
    }

    /// Read both channels with one burst so they belong to the same
    /// conversion.
    pub fn read(bus: &mut impl Registers) -> Result<Self> {
        let raw = bus.read_array::<DATA_LEN>(REG_PRESS_MSB)?;
        let sample = Self::from_bytes(&raw);
        debug!(
            "BMP280 raw sample: pressure={} temperature={}",
            sample.pressure, sample.temperature
        );
        Ok(sample)
    }
}

/// Temperature and pressure compensated from the same raw sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_celsius: f32,
    pub pressure_hpa: f32,
}

impl Measurement {
    pub fn temperature_fahrenheit(&self) -> f32 {
        self.temperature_celsius * 9.0 / 5.0 + 32.0
    }
}

/// Contents of the status register (0xF3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    /// A conversion is running
    pub measuring: bool,
    /// Calibration data is being copied from NVM
    pub im_update: bool,
}

impl Status {
    pub const fn from_byte(val: u8) -> Self {
        Self {
            measuring: val & 0x08 != 0,
            im_update: val & 0x01 != 0,
        }
    }

    pub fn read(bus: &mut impl Registers) -> Result<Self> {
        let [val] = bus.read_array::<1>(REG_STATUS)?;
        Ok(Self::from_byte(val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_twenty_bit_fields() {
        let sample = RawSample::from_bytes(&[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00]);
        assert_eq!(sample.pressure, 415_148);
        assert_eq!(sample.temperature, 519_888);
    }

    #[test]
    fn low_nibble_of_xlsb_is_ignored() {
        let sample = RawSample::from_bytes(&[0x12, 0x34, 0x5F, 0xAB, 0xCD, 0xEF]);
        assert_eq!(sample.pressure, 0x12345);
        assert_eq!(sample.temperature, 0xABCDE);
    }

    #[test]
    fn extremes() {
        let max = RawSample::from_bytes(&[0xFF; DATA_LEN]);
        assert_eq!(max.pressure, 0xFFFFF);
        assert_eq!(max.temperature, 0xFFFFF);

        // Skipped channels read back as 0x80000
        let skipped = RawSample::from_bytes(&[0x80, 0x00, 0x00, 0x80, 0x00, 0x00]);
        assert_eq!(skipped.pressure, 0x80000);
        assert_eq!(skipped.temperature, 0x80000);
    }

    #[test]
    fn status_bits() {
        assert_eq!(Status::from_byte(0x00), Status::default());
        assert_eq!(
            Status::from_byte(0x09),
            Status {
                measuring: true,
                im_update: true
            }
        );
        let measuring = Status::from_byte(0x08);
        assert!(measuring.measuring && !measuring.im_update);
    }

    #[test]
    fn fahrenheit_conversion() {
        let m = Measurement {
            temperature_celsius: 25.0,
            pressure_hpa: 1013.25,
        };
        assert!((m.temperature_fahrenheit() - 77.0).abs() < 1e-4);
    }
}
