//! The BMP280 device handle: bring-up, configuration and measurements
//!
//! ```text
//! Uninitialized -> VerifyingChipId -> Resetting -> LoadingCalibration
//!     -> ConfiguringFilters -> ConfiguringSamplingAndMode -> Ready
//! ```
//!
//! Any failing step moves the handle to `Failed(reason)`. Bring-up holds the
//! bus lock for the whole sequence; everything else locks per transaction.
//!
//! The driver never retries. Trying the other strap address or repeating
//! bring-up is up to the task that owns the handle:
//!
//! ```ignore
//! for _ in 0..3 {
//!     for address in Address::ALL {
//!         sensor.set_address(address);
//!         if sensor.init().is_ok() {
//!             return Ok(sensor);
//!         }
//!     }
//! }
//! ```

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info};

use crate::bus_lock::{BusLock, NoLock};
use crate::calibration::Calibration;
use crate::error::{Error, Result};
use crate::measurement::{Measurement, RawSample, Status};
use crate::registers::{
    Address, CHIP_ID, REG_CONFIG, REG_CTRL_MEAS, REG_ID, REG_RESET, RESET_COMMAND,
};
use crate::settings::Settings;
use crate::transport::{RegisterTransport, Registers, Timeouts};

/// Where the handle is in its bring-up sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    VerifyingChipId,
    Resetting,
    LoadingCalibration,
    ConfiguringFilters,
    ConfiguringSamplingAndMode,
    Ready,
    /// The last bring-up attempt stopped at this error
    Failed(Error),
}

/// BMP280 driver handle.
///
/// `L` is the bus lock capability. [`NoLock`] (the default) is for callers
/// that own the bus; use a [`SharedBusLock`](crate::bus_lock::SharedBusLock)
/// when other tasks talk on the same bus.
pub struct Bmp280<I2C, D, L = NoLock> {
    transport: RegisterTransport<I2C, L>,
    delay: D,
    settings: Settings,
    calibration: Option<Calibration>,
    t_fine: i32,
    state: LifecycleState,
}

impl<I2C, D> Bmp280<I2C, D, NoLock>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Create a handle for a bus the caller owns exclusively.
    pub fn new(i2c: I2C, address: Address, delay: D) -> Self {
        Self::with_lock(i2c, address, delay, NoLock)
    }
}

impl<I2C, D, L> Bmp280<I2C, D, L>
where
    I2C: I2c,
    D: DelayNs,
    L: BusLock,
{
    /// Create a handle that takes `lock` before every bus access.
    pub fn with_lock(i2c: I2C, address: Address, delay: D, lock: L) -> Self {
        Self {
            transport: RegisterTransport::new(i2c, address, lock, Timeouts::default()),
            delay,
            settings: Settings::default(),
            calibration: None,
            t_fine: 0,
            state: LifecycleState::Uninitialized,
        }
    }

    /// Settings written during the next bring-up
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.transport.set_timeouts(timeouts);
        self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Bring the sensor up: verify the chip id, reset it, load calibration
    /// and write the configured settings.
    ///
    /// The bus lock is held for the whole sequence and released on every
    /// exit path. On failure the handle keeps no calibration and reports
    /// `Failed(reason)` from [`state`](Self::state).
    pub fn init(&mut self) -> Result<()> {
        self.calibration = None;
        self.t_fine = 0;
        self.state = LifecycleState::Uninitialized;

        let timeouts = self.transport.timeouts();
        let settings = self.settings;
        let delay = &mut self.delay;
        let state = &mut self.state;

        let result = self.transport.exclusive(timeouts.bring_up_lock, |bus| {
            bring_up(bus, delay, state, settings, timeouts.reset_settle)
        });

        match result {
            Ok(calibration) => {
                self.calibration = Some(calibration);
                self.state = LifecycleState::Ready;
                info!(
                    "BMP280 ready at {:#04x}",
                    self.transport.address().as_u8()
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "BMP280 bring-up at {:#04x} failed: {}",
                    self.transport.address().as_u8(),
                    e
                );
                self.state = LifecycleState::Failed(e);
                Err(e)
            }
        }
    }

    /// Point the handle at another strap address. The handle must be
    /// brought up again afterwards.
    pub fn set_address(&mut self, address: Address) {
        self.transport.set_address(address);
        self.calibration = None;
        self.t_fine = 0;
        self.state = LifecycleState::Uninitialized;
    }

    pub fn address(&self) -> Address {
        self.transport.address()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    pub fn timeouts(&self) -> Timeouts {
        self.transport.timeouts()
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Change the sampling parameters of a running sensor.
    ///
    /// Writes `config` then `ctrl_meas`, each under its own lock
    /// acquisition. The settings are kept for later bring-ups once both
    /// writes went through.
    ///
    /// If the `config` write lands and the `ctrl_meas` write fails, the
    /// sensor runs a mix of old and new settings while
    /// [`settings`](Self::settings) still reports the old ones. The next
    /// [`init`](Self::init) or a repeated `configure` rewrites both
    /// registers.
    pub fn configure(&mut self, settings: Settings) -> Result<()> {
        self.transport
            .write_register(REG_CONFIG, settings.config_byte())?;
        self.transport
            .write_register(REG_CTRL_MEAS, settings.ctrl_meas_byte())?;
        self.settings = settings;
        info!("BMP280 configured: {:?}", settings);
        Ok(())
    }

    /// [`configure`](Self::configure) from raw register field values.
    ///
    /// # Errors
    /// `InvalidArgument` for out-of-range values, before any bus access.
    pub fn configure_raw(
        &mut self,
        osrs_t: u8,
        osrs_p: u8,
        mode: u8,
        standby: u8,
        filter: u8,
    ) -> Result<()> {
        let settings = Settings::from_raw(osrs_t, osrs_p, mode, standby, filter)?;
        self.configure(settings)
    }

    /// Give back the bus and the delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.transport.release(), self.delay)
    }

    // =========================================================================
    // Measurements
    // =========================================================================

    fn require_calibration(&self) -> Result<Calibration> {
        self.calibration.ok_or(Error::NotInitialized)
    }

    /// Read both raw ADC counts in one burst.
    pub fn read_raw(&mut self) -> Result<RawSample> {
        self.require_calibration()?;
        RawSample::read(&mut self.transport)
    }

    /// Read the temperature in °C.
    pub fn read_temperature(&mut self) -> Result<f32> {
        let calibration = self.require_calibration()?;
        let sample = RawSample::read(&mut self.transport)?;
        let temperature = calibration.compensate_temperature(sample.temperature);
        self.t_fine = temperature.t_fine;
        Ok(temperature.celsius)
    }

    /// Read the pressure in hPa.
    ///
    /// The temperature of the same sample is compensated first so the
    /// pressure never uses a stale fine temperature.
    pub fn read_pressure(&mut self) -> Result<f32> {
        Ok(self.read_data()?.pressure_hpa)
    }

    /// Read temperature and pressure from one coherent sample.
    pub fn read_data(&mut self) -> Result<Measurement> {
        let calibration = self.require_calibration()?;
        let sample = RawSample::read(&mut self.transport)?;

        let temperature = calibration.compensate_temperature(sample.temperature);
        self.t_fine = temperature.t_fine;
        let pressure_hpa = calibration.compensate_pressure(temperature.t_fine, sample.pressure);

        debug!(
            "BMP280: {} °C, {} hPa",
            temperature.celsius, pressure_hpa
        );
        Ok(Measurement {
            temperature_celsius: temperature.celsius,
            pressure_hpa,
        })
    }

    /// Read the status register. Works before bring-up.
    pub fn read_status(&mut self) -> Result<Status> {
        Status::read(&mut self.transport)
    }

    // =========================================================================
    // Low-level compensation
    // =========================================================================

    /// Compensate a raw temperature count and remember its fine temperature
    /// for the next [`compensate_pressure`](Self::compensate_pressure).
    pub fn compensate_temperature(&mut self, raw_temperature: i32) -> Result<f32> {
        let calibration = self.require_calibration()?;
        let temperature = calibration.compensate_temperature(raw_temperature);
        self.t_fine = temperature.t_fine;
        Ok(temperature.celsius)
    }

    /// Compensate a raw pressure count with the fine temperature left by the
    /// last temperature compensation on this handle.
    ///
    /// Calling this without a preceding temperature compensation uses a
    /// fine temperature of 0 (after bring-up) or one belonging to an older
    /// sample. The result is then wrong. Prefer [`read_data`](Self::read_data).
    pub fn compensate_pressure(&self, raw_pressure: i32) -> Result<f32> {
        let calibration = self.require_calibration()?;
        Ok(calibration.compensate_pressure(self.t_fine, raw_pressure))
    }

    /// Fine temperature carried between the two compensation calls
    pub fn t_fine(&self) -> i32 {
        self.t_fine
    }
}

/// The bring-up sequence, run with the bus lock already held.
fn bring_up(
    bus: &mut impl Registers,
    delay: &mut impl DelayNs,
    state: &mut LifecycleState,
    settings: Settings,
    reset_settle: Duration,
) -> Result<Calibration> {
    *state = LifecycleState::VerifyingChipId;
    let [id] = bus.read_array::<1>(REG_ID)?;
    if id != CHIP_ID {
        error!("BMP280 chip id mismatch: {:#04x}", id);
        return Err(Error::NotFound { found: id });
    }
    info!("BMP280 chip id verified");

    *state = LifecycleState::Resetting;
    bus.write_register(REG_RESET, RESET_COMMAND)?;
    delay.delay_us(u32::try_from(reset_settle.as_micros()).unwrap_or(u32::MAX));

    *state = LifecycleState::LoadingCalibration;
    let calibration = Calibration::load(bus)?;

    *state = LifecycleState::ConfiguringFilters;
    bus.write_register(REG_CONFIG, settings.config_byte())?;

    *state = LifecycleState::ConfiguringSamplingAndMode;
    bus.write_register(REG_CTRL_MEAS, settings.ctrl_meas_byte())?;

    Ok(calibration)
}
