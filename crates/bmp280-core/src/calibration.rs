//! Factory calibration coefficients and the fixed-point compensation math
//!
//! Every unit leaves the factory with 24 bytes of trimming coefficients at
//! 0x88..=0x9F. They turn the raw 20-bit ADC counts into °C and Pa using the
//! integer formulas published with the sensor. The integer path is kept bit
//! exact: the temperature side works in 32-bit, the pressure side in 64-bit
//! two's-complement arithmetic, with arithmetic right shifts.
//!
//! Arithmetic wraps instead of panicking, so garbage coefficients or counts
//! (a misbehaving bus, a counterfeit part) produce garbage numbers rather
//! than a crash. Valid inputs never come close to wrapping.

use log::{debug, info};

use crate::error::Result;
use crate::registers::{CALIBRATION_LEN, REG_CALIB_START};
use crate::transport::Registers;

/// Output of temperature compensation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    /// Temperature in degrees Celsius, 0.01 °C resolution
    pub celsius: f32,
    /// Fine temperature, the input pressure compensation needs
    pub t_fine: i32,
}

/// The twelve trimming coefficients of one sensor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
}

impl Calibration {
    /// Decode the little-endian calibration block.
    pub fn from_bytes(raw: &[u8; CALIBRATION_LEN]) -> Self {
        let unsigned = |i: usize| u16::from_le_bytes([raw[i], raw[i + 1]]);
        let signed = |i: usize| i16::from_le_bytes([raw[i], raw[i + 1]]);

        Self {
            dig_t1: unsigned(0),
            dig_t2: signed(2),
            dig_t3: signed(4),
            dig_p1: unsigned(6),
            dig_p2: signed(8),
            dig_p3: signed(10),
            dig_p4: signed(12),
            dig_p5: signed(14),
            dig_p6: signed(16),
            dig_p7: signed(18),
            dig_p8: signed(20),
            dig_p9: signed(22),
        }
    }

    /// Read and decode the calibration block with a single burst read.
    ///
    /// Nothing is returned unless the whole block was read.
    pub fn load(bus: &mut impl Registers) -> Result<Self> {
        let raw = bus.read_array::<CALIBRATION_LEN>(REG_CALIB_START)?;
        let calibration = Self::from_bytes(&raw);
        info!("BMP280 calibration loaded");
        debug!("{:?}", calibration);
        Ok(calibration)
    }

    /// Convert a raw temperature count.
    pub fn compensate_temperature(&self, raw_temperature: i32) -> Temperature {
        let adc_t = raw_temperature;
        let t1 = i32::from(self.dig_t1);
        let t2 = i32::from(self.dig_t2);
        let t3 = i32::from(self.dig_t3);

        let var1 = ((adc_t >> 3).wrapping_sub(t1 << 1)).wrapping_mul(t2) >> 11;
        let delta = (adc_t >> 4).wrapping_sub(t1);
        let var2 = ((delta.wrapping_mul(delta) >> 12).wrapping_mul(t3)) >> 14;

        let t_fine = var1.wrapping_add(var2);
        let centi_celsius = t_fine.wrapping_mul(5).wrapping_add(128) >> 8;

        Temperature {
            celsius: centi_celsius as f32 / 100.0,
            t_fine,
        }
    }

    /// Convert a raw pressure count to hPa using the fine temperature of
    /// the same sample.
    ///
    /// Returns 0.0 when the coefficients would divide by zero (`dig_p1 == 0`
    /// is the usual cause).
    pub fn compensate_pressure(&self, t_fine: i32, raw_pressure: i32) -> f32 {
        let p1 = i64::from(self.dig_p1);
        let p2 = i64::from(self.dig_p2);
        let p3 = i64::from(self.dig_p3);
        let p4 = i64::from(self.dig_p4);
        let p5 = i64::from(self.dig_p5);
        let p6 = i64::from(self.dig_p6);
        let p7 = i64::from(self.dig_p7);
        let p8 = i64::from(self.dig_p8);
        let p9 = i64::from(self.dig_p9);

        let mut var1 = i64::from(t_fine) - 128_000;
        let mut var2 = var1.wrapping_mul(var1).wrapping_mul(p6);
        var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 17);
        var2 = var2.wrapping_add(p4 << 35);
        var1 = (var1.wrapping_mul(var1).wrapping_mul(p3) >> 8)
            .wrapping_add(var1.wrapping_mul(p2) << 12);
        var1 = ((1i64 << 47).wrapping_add(var1)).wrapping_mul(p1) >> 33;

        if var1 == 0 {
            return 0.0;
        }

        let mut p = 1_048_576 - i64::from(raw_pressure);
        p = ((p << 31).wrapping_sub(var2))
            .wrapping_mul(3125)
            .wrapping_div(var1);
        let var1 = p9.wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
        let var2 = p8.wrapping_mul(p) >> 19;
        p = (p.wrapping_add(var1).wrapping_add(var2) >> 8).wrapping_add(p7 << 4);

        // p is Pa in Q24.8
        p as f32 / 256.0 / 100.0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use std::vec;

    use crate::bus_lock::NoLock;
    use crate::error::Error;
    use crate::registers::Address;
    use crate::transport::{RegisterTransport, Timeouts};

    /// Calibration block of the worked example in the sensor datasheet
    pub(crate) const REFERENCE_BLOCK: [u8; CALIBRATION_LEN] = [
        0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27, 0x0B,
        0x8C, 0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17,
    ];

    pub(crate) fn reference() -> Calibration {
        Calibration::from_bytes(&REFERENCE_BLOCK)
    }

    #[test]
    fn decodes_reference_block() {
        let c = reference();
        assert_eq!(c.dig_t1, 27504);
        assert_eq!(c.dig_t2, 26435);
        assert_eq!(c.dig_t3, -1000);
        assert_eq!(c.dig_p1, 36477);
        assert_eq!(c.dig_p2, -10685);
        assert_eq!(c.dig_p3, 3024);
        assert_eq!(c.dig_p4, 2855);
        assert_eq!(c.dig_p5, 140);
        assert_eq!(c.dig_p6, -7);
        assert_eq!(c.dig_p7, 15500);
        assert_eq!(c.dig_p8, -14600);
        assert_eq!(c.dig_p9, 6000);
    }

    #[test]
    fn reference_temperature() {
        let t = reference().compensate_temperature(519_888);
        assert_eq!(t.t_fine, 128_422);
        assert!((t.celsius - 25.08).abs() < 0.001);
    }

    #[test]
    fn reference_pressure() {
        let hpa = reference().compensate_pressure(128_422, 415_148);
        assert!((hpa - 1006.5325).abs() < 0.001, "got {hpa}");
    }

    #[test]
    fn pressure_from_zero_fine_temperature() {
        // What a caller gets by skipping temperature compensation
        let hpa = reference().compensate_pressure(0, 415_148);
        assert!((hpa - 968.2106).abs() < 0.001, "got {hpa}");
    }

    #[test]
    fn zero_p1_hits_division_guard() {
        let mut c = reference();
        c.dig_p1 = 0;
        assert_eq!(c.compensate_pressure(128_422, 415_148), 0.0);
    }

    #[test]
    fn garbage_input_does_not_panic() {
        let c = Calibration::from_bytes(&[0xFF; CALIBRATION_LEN]);
        for raw in [0, 1, 0x80000, 0xFFFFF, i32::MAX, i32::MIN] {
            let t = c.compensate_temperature(raw);
            let _ = c.compensate_pressure(t.t_fine, raw);
            let _ = c.compensate_pressure(i32::MIN, raw);
            let _ = reference().compensate_pressure(i32::MAX, raw);
        }
    }

    #[test]
    fn load_is_one_burst_read() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            0x76,
            vec![0x88],
            REFERENCE_BLOCK.to_vec(),
        )]);
        let mut transport =
            RegisterTransport::new(i2c.clone(), Address::Primary, NoLock, Timeouts::default());

        assert_eq!(Calibration::load(&mut transport), Ok(reference()));
        i2c.done();
    }

    #[test]
    fn load_failure_yields_no_calibration() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            0x76,
            vec![0x88],
            vec![0; CALIBRATION_LEN],
        )
        .with_error(ErrorKind::Other)]);
        let mut transport =
            RegisterTransport::new(i2c.clone(), Address::Primary, NoLock, Timeouts::default());

        assert!(matches!(
            Calibration::load(&mut transport),
            Err(Error::TransportFailure { register: 0x88, .. })
        ));
        i2c.done();
    }
}
