//! Hardware-independent BMP280 pressure/temperature driver
//!
//! The driver talks to the sensor through a blocking `embedded-hal` I2C
//! bus and can share that bus with other tasks through an Embassy mutex
//! (see [`bus_lock`]). Every blocking point is bounded by a timeout.
//!
//! It is `#![no_std]` without allocation, so it compiles on embedded
//! targets and on desktop hosts (for the simulator and tests).
//!
//! ```ignore
//! let mut sensor = Bmp280::with_lock(i2c, Address::Primary, delay, SharedBusLock::new(&I2C_LOCK));
//! sensor.init()?;
//! let m = sensor.read_data()?;
//! let h = altitude(m.pressure_hpa, SEA_LEVEL_PRESSURE_HPA);
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

pub mod altitude;
pub mod bus_lock;
pub mod calibration;
pub mod device;
pub mod error;
pub mod measurement;
pub mod registers;
pub mod settings;
pub mod transport;

pub use altitude::{SEA_LEVEL_PRESSURE_HPA, altitude, sea_level_pressure};
pub use bus_lock::{BusLock, BusMutex, NoLock, SharedBusLock};
pub use calibration::{Calibration, Temperature};
pub use device::{Bmp280, LifecycleState};
pub use error::{Error, Result};
pub use measurement::{Measurement, RawSample, Status};
pub use registers::Address;
pub use settings::{Filter, Oversampling, PowerMode, Settings, StandbyTime};
pub use transport::Timeouts;
