//! Byte-level register access over a (possibly shared) I2C bus
//!
//! Two flavours of access exist:
//!
//! - [`RegisterTransport`] itself implements [`Registers`] by taking the bus
//!   lock around every single transaction. Other bus users can slip in
//!   between two calls.
//! - [`RegisterTransport::exclusive`] takes the lock once and hands out a
//!   [`HeldBus`] for a whole multi-register sequence. The lock is released
//!   when the closure returns, whatever it returns.
//!
//! Nothing here retries: a failed transaction is reported immediately.

use embassy_time::Duration;
use embedded_hal::i2c::{Error as _, I2c};
use log::{error, warn};

use crate::bus_lock::BusLock;
use crate::error::{Error, Result};
use crate::registers::Address;

/// Default bound for taking the bus lock around a single transaction
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(200);
/// Default bound for taking the bus lock for the whole bring-up sequence
pub const BRING_UP_LOCK_TIMEOUT: Duration = Duration::from_millis(500);
/// Bound the I2C peripheral should enforce on one transaction
pub const BUS_TIMEOUT: Duration = Duration::from_millis(1000);
/// Time the sensor needs after a soft reset before its registers are valid
pub const RESET_SETTLE: Duration = Duration::from_millis(50);

/// Every blocking point of the driver has its own independent bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Lock wait for per-call operations
    pub lock: Duration,
    /// Lock wait for the bring-up sequence
    pub bring_up_lock: Duration,
    /// Transaction bound for the I2C peripheral. The driver does not read
    /// it: `embedded-hal` has no per-transaction timeout, so the caller
    /// configures the peripheral with it. The peripheral's timeout error
    /// then reaches the caller as `TransportFailure`.
    pub bus: Duration,
    /// Settle delay after soft reset
    pub reset_settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            lock: LOCK_TIMEOUT,
            bring_up_lock: BRING_UP_LOCK_TIMEOUT,
            bus: BUS_TIMEOUT,
            reset_settle: RESET_SETTLE,
        }
    }
}

/// Register-level access to the sensor.
pub trait Registers {
    /// Write a single register
    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;

    /// Burst-read `buf.len()` registers starting at `start`
    fn read_registers(&mut self, start: u8, buf: &mut [u8]) -> Result<()>;

    /// Burst-read exactly `N` registers starting at `start`
    fn read_array<const N: usize>(&mut self, start: u8) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_registers(start, &mut buf)?;
        Ok(buf)
    }
}

fn bus_write<I2C: I2c>(i2c: &mut I2C, address: u8, register: u8, value: u8) -> Result<()> {
    i2c.write(address, &[register, value]).map_err(|e| {
        let kind = e.kind();
        error!("Failed to write register {:#04x}: {:?}", register, kind);
        Error::TransportFailure { register, kind }
    })
}

fn bus_read<I2C: I2c>(i2c: &mut I2C, address: u8, start: u8, buf: &mut [u8]) -> Result<()> {
    i2c.write_read(address, &[start], buf).map_err(|e| {
        let kind = e.kind();
        error!("Failed to read register {:#04x}: {:?}", start, kind);
        Error::TransportFailure {
            register: start,
            kind,
        }
    })
}

/// The sensor's end of the bus: the I2C peripheral, the device address and
/// the lock capability shared with other bus users.
pub struct RegisterTransport<I2C, L> {
    i2c: I2C,
    address: Address,
    lock: L,
    timeouts: Timeouts,
}

impl<I2C, L> RegisterTransport<I2C, L>
where
    I2C: I2c,
    L: BusLock,
{
    pub fn new(i2c: I2C, address: Address, lock: L, timeouts: Timeouts) -> Self {
        Self {
            i2c,
            address,
            lock,
            timeouts,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    /// Run a multi-register sequence while holding the bus lock.
    ///
    /// The lock is taken once, with `timeout` as its bound, and released
    /// after `f` returns on every path.
    ///
    /// # Errors
    /// `LockTimeout` if the lock was not obtained (the bus is not touched),
    /// otherwise whatever `f` returns.
    pub fn exclusive<R>(
        &mut self,
        timeout: Duration,
        f: impl FnOnce(&mut HeldBus<'_, I2C>) -> Result<R>,
    ) -> Result<R> {
        let Some(_guard) = self.lock.acquire(timeout) else {
            warn!("Failed to take I2C lock for exclusive sequence");
            return Err(Error::LockTimeout);
        };

        let mut bus = HeldBus {
            i2c: &mut self.i2c,
            address: self.address.as_u8(),
        };
        f(&mut bus)
    }

    /// Releases the I2C handle consuming the transport.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, L> Registers for RegisterTransport<I2C, L>
where
    I2C: I2c,
    L: BusLock,
{
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        let Some(_guard) = self.lock.acquire(self.timeouts.lock) else {
            warn!("Failed to take I2C lock for write of {:#04x}", register);
            return Err(Error::LockTimeout);
        };
        bus_write(&mut self.i2c, self.address.as_u8(), register, value)
    }

    fn read_registers(&mut self, start: u8, buf: &mut [u8]) -> Result<()> {
        let Some(_guard) = self.lock.acquire(self.timeouts.lock) else {
            warn!("Failed to take I2C lock for read of {:#04x}", start);
            return Err(Error::LockTimeout);
        };
        bus_read(&mut self.i2c, self.address.as_u8(), start, buf)
    }
}

/// Register access for code that already holds the bus lock.
///
/// Only obtainable through [`RegisterTransport::exclusive`].
pub struct HeldBus<'a, I2C> {
    i2c: &'a mut I2C,
    address: u8,
}

impl<I2C: I2c> Registers for HeldBus<'_, I2C> {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        bus_write(self.i2c, self.address, register, value)
    }

    fn read_registers(&mut self, start: u8, buf: &mut [u8]) -> Result<()> {
        bus_read(self.i2c, self.address, start, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus_lock::{BusMutex, NoLock, SharedBusLock};
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use std::vec;

    const ADDR: u8 = 0x76;

    #[test]
    fn write_sends_register_then_value() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write(ADDR, vec![0xF4, 0xB7])]);
        let mut transport =
            RegisterTransport::new(i2c.clone(), Address::Primary, NoLock, Timeouts::default());

        transport.write_register(0xF4, 0xB7).unwrap();
        i2c.done();
    }

    #[test]
    fn read_array_is_one_burst() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            0x77,
            vec![0xF7],
            vec![1, 2, 3, 4, 5, 6],
        )]);
        let mut transport =
            RegisterTransport::new(i2c.clone(), Address::Secondary, NoLock, Timeouts::default());

        let bytes: [u8; 6] = transport.read_array(0xF7).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4, 5, 6]);
        i2c.done();
    }

    #[test]
    fn bus_errors_become_transport_failures() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write(ADDR, vec![0xE0, 0xB6]).with_error(ErrorKind::Other),
            I2cTransaction::write_read(ADDR, vec![0xD0], vec![0x00]).with_error(ErrorKind::Bus),
        ]);
        let mut transport =
            RegisterTransport::new(i2c.clone(), Address::Primary, NoLock, Timeouts::default());

        assert_eq!(
            transport.write_register(0xE0, 0xB6),
            Err(Error::TransportFailure {
                register: 0xE0,
                kind: ErrorKind::Other
            })
        );
        let mut id = [0u8; 1];
        assert_eq!(
            transport.read_registers(0xD0, &mut id),
            Err(Error::TransportFailure {
                register: 0xD0,
                kind: ErrorKind::Bus
            })
        );
        i2c.done();
    }

    #[test]
    fn held_lock_times_out_without_touching_the_bus() {
        let bus = BusMutex::new(());
        let _touch_task = bus.try_lock().unwrap();

        let mut i2c = I2cMock::new(&[]);
        let timeouts = Timeouts {
            lock: Duration::from_millis(20),
            ..Timeouts::default()
        };
        let mut transport = RegisterTransport::new(
            i2c.clone(),
            Address::Primary,
            SharedBusLock::new(&bus),
            timeouts,
        );

        assert_eq!(transport.write_register(0xF4, 0x00), Err(Error::LockTimeout));
        let mut buf = [0u8; 6];
        assert_eq!(
            transport.read_registers(0xF7, &mut buf),
            Err(Error::LockTimeout)
        );
        assert_eq!(
            transport.exclusive(Duration::from_millis(20), |_| Ok(())),
            Err(Error::LockTimeout)
        );
        i2c.done();
    }

    #[test]
    fn per_call_access_releases_lock_between_calls() {
        let bus = BusMutex::new(());
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write(ADDR, vec![0xF5, 0x90]),
            I2cTransaction::write(ADDR, vec![0xF4, 0xB7]),
        ]);
        let mut transport = RegisterTransport::new(
            i2c.clone(),
            Address::Primary,
            SharedBusLock::new(&bus),
            Timeouts::default(),
        );

        transport.write_register(0xF5, 0x90).unwrap();
        assert!(bus.try_lock().is_ok());
        transport.write_register(0xF4, 0xB7).unwrap();
        assert!(bus.try_lock().is_ok());
        i2c.done();
    }

    #[test]
    fn exclusive_holds_lock_for_sequence_and_releases_on_error() {
        let bus = BusMutex::new(());
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write(ADDR, vec![0xE0, 0xB6]),
            I2cTransaction::write_read(ADDR, vec![0x88], vec![0; 2]).with_error(ErrorKind::Other),
        ]);
        let mut transport = RegisterTransport::new(
            i2c.clone(),
            Address::Primary,
            SharedBusLock::new(&bus),
            Timeouts::default(),
        );

        let result = transport.exclusive(Duration::from_millis(100), |held| {
            held.write_register(0xE0, 0xB6)?;
            assert!(bus.try_lock().is_err(), "lock must be held mid-sequence");
            let _: [u8; 2] = held.read_array(0x88)?;
            Ok(())
        });

        assert!(matches!(result, Err(Error::TransportFailure { register: 0x88, .. })));
        assert!(bus.try_lock().is_ok(), "lock must be released after abort");
        i2c.done();
    }

    #[test]
    fn address_can_be_switched_for_retries() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write(0x77, vec![0xF4, 0x00])]);
        let mut transport =
            RegisterTransport::new(i2c.clone(), Address::Primary, NoLock, Timeouts::default());

        transport.set_address(Address::Secondary);
        assert_eq!(transport.address(), Address::Secondary);
        transport.write_register(0xF4, 0x00).unwrap();
        i2c.done();
    }
}
