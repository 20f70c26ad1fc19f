//! Desktop simulator for the BMP280 driver.
//!
//! Plays the tasks that surround the driver on the real board against a
//! simulated sensor:
//!
//! - a polling task that brings the sensor up (three attempts, primary then
//!   secondary address each time) and then reads it on a fixed cadence;
//! - a touch task that shares the I2C bus and takes the same lock with a
//!   short bound, skipping its cycle when the bus is busy.
//!
//! # Environment
//!
//! | Variable             | Effect                                        |
//! |----------------------|-----------------------------------------------|
//! | `BMP280_SIM_ADDRESS` | Strap address of the part: `0x76`, `0x77` or `none` |
//! | `RUST_LOG`           | Log filter (`env_logger`)                     |

mod sim_sensor;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration as StdDuration;

use embassy_sync::mutex::Mutex;
use embassy_time::{Delay, Duration};
use log::{debug, error, info, warn};

use bmp280_core::{
    Address, BusLock, BusMutex, Bmp280, SEA_LEVEL_PRESSURE_HPA, SharedBusLock, Timeouts, altitude,
};

use crate::sim_sensor::SimulatedBmp280;

// ---------------------------------------------------------------------------
// Task constants
// ---------------------------------------------------------------------------

/// Interval between two sensor reads
const POLL_INTERVAL: StdDuration = StdDuration::from_secs(2);

/// Wait before the first bring-up attempt, for the bus and display to settle
const STARTUP_DELAY: StdDuration = StdDuration::from_millis(500);

/// Bring-up attempts; each one tries both strap addresses
const BRING_UP_ATTEMPTS: usize = 3;
const RETRY_DELAY: StdDuration = StdDuration::from_millis(500);
const ADDRESS_SWITCH_DELAY: StdDuration = StdDuration::from_millis(100);

/// The touch controller gives up on the bus after this long
const TOUCH_LOCK_TIMEOUT: Duration = Duration::from_millis(50);
const TOUCH_INTERVAL: StdDuration = StdDuration::from_millis(30);
const TOUCH_HOLD: StdDuration = StdDuration::from_millis(2);

/// The part does not measure humidity; the dashboard shows a fixed value
const DUMMY_HUMIDITY_PERCENT: f32 = 65.0;

/// Lock shared by every user of the I2C bus
static I2C_LOCK: BusMutex = Mutex::new(());

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parse `BMP280_SIM_ADDRESS`. `None` means no part on the bus.
fn parse_strap(value: &str) -> Result<Option<Address>, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u8::from_str_radix(digits, 16)
        .ok()
        .and_then(Address::from_u8)
        .map(Some)
        .ok_or_else(|| format!("invalid BMP280_SIM_ADDRESS {value:?}"))
}

fn strap_from_env() -> Option<Address> {
    match std::env::var("BMP280_SIM_ADDRESS") {
        Ok(value) => match parse_strap(&value) {
            Ok(strap) => strap,
            Err(e) => {
                warn!("{e}, using 0x76");
                Some(Address::Primary)
            }
        },
        Err(_) => Some(Address::Primary),
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

type Sensor = Bmp280<SimulatedBmp280<'static>, Delay, SharedBusLock<'static>>;

/// Try every address `BRING_UP_ATTEMPTS` times. The driver itself never
/// retries, so this loop is the whole retry policy.
fn bring_up(sensor: &mut Sensor) -> bool {
    for attempt in 0..BRING_UP_ATTEMPTS {
        if attempt > 0 {
            info!("Retry {attempt}: attempting BMP280 initialization");
            thread::sleep(RETRY_DELAY);
        }

        for (i, address) in Address::ALL.into_iter().enumerate() {
            if i > 0 {
                thread::sleep(ADDRESS_SWITCH_DELAY);
            }
            sensor.set_address(address);
            match sensor.init() {
                Ok(()) => return true,
                Err(e) => warn!("BMP280 init at {:#04x} failed: {e}", address.as_u8()),
            }
        }
    }
    false
}

fn polling_task(mut sensor: Sensor, stop: &AtomicBool) {
    thread::sleep(STARTUP_DELAY);

    if !bring_up(&mut sensor) {
        error!("BMP280 initialization failed after {BRING_UP_ATTEMPTS} attempts on both addresses");
        error!("Please check:");
        error!("  1. The sensor is wired to the I2C bus");
        error!("  2. The sensor address (0x76 or 0x77 via the SDO pin)");
        error!("  3. Power supply to the sensor (3.3V)");
        return;
    }
    info!(
        "BMP280 initialized at address {:#04x}",
        sensor.address().as_u8()
    );

    while !stop.load(Ordering::Relaxed) {
        if !poll_once(&mut sensor) {
            error!("BMP280 polling disabled");
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// One polling tick. Returns whether polling should continue.
///
/// Lock contention and bus glitches are reported and retried on the next
/// tick with the same handle. Any other error means the handle is unusable.
fn poll_once(sensor: &mut Sensor) -> bool {
    match sensor.read_data() {
        Ok(m) => {
            info!(
                "Temperature: {:.2}°C ({:.1}°F), Pressure: {:.2} hPa, Altitude: {:.1} m, Humidity: {:.0}%",
                m.temperature_celsius,
                m.temperature_fahrenheit(),
                m.pressure_hpa,
                altitude(m.pressure_hpa, SEA_LEVEL_PRESSURE_HPA),
                DUMMY_HUMIDITY_PERCENT,
            );
            true
        }
        Err(e) if e.is_transient() => {
            warn!("Failed to read BMP280, retrying next tick: {e}");
            true
        }
        Err(e) => {
            error!("BMP280 read failed permanently: {e}");
            false
        }
    }
}

fn touch_task(lock: &'static BusMutex, stop: &AtomicBool, skipped: &AtomicU32) {
    let lock = SharedBusLock::new(lock);
    while !stop.load(Ordering::Relaxed) {
        match lock.acquire(TOUCH_LOCK_TIMEOUT) {
            Some(_bus) => thread::sleep(TOUCH_HOLD),
            None => {
                skipped.fetch_add(1, Ordering::Relaxed);
                debug!("Touch read skipped, bus busy");
            }
        }
        thread::sleep(TOUCH_INTERVAL);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting BMP280 simulator");

    let strap = strap_from_env();
    match strap {
        Some(address) => info!("Simulated part strapped to {:#04x}", address.as_u8()),
        None => info!("No part on the simulated bus"),
    }

    // The simulated controller enforces the bus bound, as a real peripheral
    // configured from the same timeouts would
    let timeouts = Timeouts::default();
    let sim = SimulatedBmp280::new(strap)
        .guarded_by(&I2C_LOCK)
        .with_bus_timeout(StdDuration::from_micros(timeouts.bus.as_micros()));
    let sensor = Bmp280::with_lock(
        sim,
        Address::Primary,
        Delay,
        SharedBusLock::new(&I2C_LOCK),
    )
    .with_timeouts(timeouts);

    let stop = AtomicBool::new(false);
    let skipped = AtomicU32::new(0);

    thread::scope(|s| {
        s.spawn(|| touch_task(&I2C_LOCK, &stop, &skipped));
        polling_task(sensor, &stop);
        // Only reached when bring-up failed; the touch task keeps the
        // board usable, so give it a moment before shutting down.
        thread::sleep(StdDuration::from_secs(1));
        stop.store(true, Ordering::Relaxed);
    });

    info!(
        "Simulator exiting ({} touch reads skipped)",
        skipped.load(Ordering::Relaxed)
    );
}
