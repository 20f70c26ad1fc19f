//! Shared I2C bus ownership
//!
//! The BMP280 shares its bus with other peripherals (a touch controller on
//! the reference board). Ownership of the bus is expressed by a lock
//! capability injected into the driver once, at construction:
//!
//! - [`SharedBusLock`] wraps an Embassy [`Mutex`] that every bus user agrees
//!   to take before talking on the bus. Other tasks may lock the same mutex
//!   asynchronously with `.lock().await`.
//! - [`NoLock`] is used when the caller owns the bus exclusively. Acquiring
//!   it always succeeds immediately and costs nothing.
//!
//! Acquisition is bounded: the driver is blocking, so it polls the mutex
//! until a deadline instead of awaiting it. There is no fairness between
//! contending tasks. A waiter gets the bus if its poll happens to land
//! after the holder released it; no FIFO order is promised.
//!
//! The wait is a busy spin (`block_for`), not an `.await`. An async task
//! holding the mutex can only release it while the spin runs if it lives
//! on another executor or at a higher interrupt priority. On a single
//! cooperative executor the holder never gets polled, so every contended
//! acquire stalls the executor for the full timeout and then fails.
//!
//! # Example
//!
//! ```no_run
//! use bmp280_core::bus_lock::{BusMutex, SharedBusLock};
//! use embassy_sync::mutex::Mutex;
//!
//! static I2C_LOCK: BusMutex = Mutex::new(());
//!
//! let sensor_lock = SharedBusLock::new(&I2C_LOCK);
//! // The touch task keeps a plain reference and does
//! // `let _bus = I2C_LOCK.lock().await;` around its own transactions.
//! // It must run on a different executor (or priority) than the sensor.
//! ```

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_time::{Duration, Instant, block_for};

/// The mutex type bus users share. It guards no data, only the right to
/// start a transaction.
pub type BusMutex = Mutex<CriticalSectionRawMutex, ()>;

/// Delay between two attempts at taking a contended lock
const POLL_INTERVAL: Duration = Duration::from_micros(500);

/// A capability granting temporary ownership of the bus.
pub trait BusLock {
    /// Held while the bus is owned; ownership ends when it is dropped.
    type Guard<'a>
    where
        Self: 'a;

    /// Try to take the bus, giving up after `timeout`.
    ///
    /// Returns `None` if the bus could not be obtained in time.
    fn acquire(&self, timeout: Duration) -> Option<Self::Guard<'_>>;
}

/// Lock capability for a bus the driver owns exclusively.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock;

impl BusLock for NoLock {
    type Guard<'a>
        = ()
    where
        Self: 'a;

    #[inline]
    fn acquire(&self, _timeout: Duration) -> Option<()> {
        Some(())
    }
}

/// Lock capability backed by a mutex shared with other bus users.
pub struct SharedBusLock<'a, M: RawMutex = CriticalSectionRawMutex> {
    bus: &'a Mutex<M, ()>,
}

impl<'a, M: RawMutex> SharedBusLock<'a, M> {
    /// Create a new `SharedBusLock`.
    #[inline]
    pub const fn new(bus: &'a Mutex<M, ()>) -> Self {
        Self { bus }
    }
}

impl<M: RawMutex> BusLock for SharedBusLock<'_, M> {
    type Guard<'a>
        = MutexGuard<'a, M, ()>
    where
        Self: 'a;

    fn acquire(&self, timeout: Duration) -> Option<MutexGuard<'_, M, ()>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(guard) = self.bus.try_lock() {
                return Some(guard);
            }
            if Instant::now() >= deadline {
                return None;
            }
            block_for(POLL_INTERVAL);
        }
    }
}
