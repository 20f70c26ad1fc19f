//! A simulated BMP280 behind an `embedded-hal` I2C interface.
//!
//! The part answers only at its strap address, holds the datasheet's
//! reference calibration block, honours soft reset and ctrl/config writes,
//! and produces slowly drifting ADC counts while not sleeping.
//!
//! When constructed with [`SimulatedBmp280::guarded_by`] every transaction
//! also checks that somebody holds the shared bus mutex, so a driver that
//! touches the bus without the lock gets caught.
//!
//! The simulated peripheral enforces a transaction bound like a real I2C
//! controller would: a stall injected through [`SimulatedBmp280::stall_control`]
//! that reaches the bound aborts the transaction with `ErrorKind::Other`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use log::{trace, warn};

use bmp280_core::BusMutex;
use bmp280_core::registers::{
    Address, CALIBRATION_LEN, CHIP_ID, REG_CALIB_START, REG_CONFIG, REG_CTRL_MEAS, REG_ID,
    REG_PRESS_MSB, REG_RESET, REG_STATUS, RESET_COMMAND,
};

/// Datasheet worked-example calibration block
const CALIBRATION: [u8; CALIBRATION_LEN] = [
    0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27, 0x0B, 0x8C,
    0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17,
];

/// Counts reported by a channel that is skipped or not yet measured
const ADC_SKIPPED: i32 = 0x80000;

/// ~25 °C / ~1006 hPa with the reference calibration
const BASE_RAW_TEMPERATURE: f64 = 519_888.0;
const BASE_RAW_PRESSURE: f64 = 415_148.0;

pub struct SimulatedBmp280<'a> {
    address: Option<Address>,
    regs: [u8; 256],
    pointer: u8,
    tick: u32,
    lock: Option<&'a BusMutex>,
    unguarded: u32,
    bus_timeout: Duration,
    /// Milliseconds the next transaction hangs before completing
    stall_ms: Arc<AtomicU32>,
}

impl<'a> SimulatedBmp280<'a> {
    /// A part strapped to `address`, or no part at all for `None`.
    pub fn new(address: Option<Address>) -> Self {
        let mut sim = Self {
            address,
            regs: [0; 256],
            pointer: 0,
            tick: 0,
            lock: None,
            unguarded: 0,
            bus_timeout: Duration::from_millis(1000),
            stall_ms: Arc::new(AtomicU32::new(0)),
        };
        sim.power_on_reset();
        sim
    }

    /// Flag transactions that run while `lock` is free.
    pub fn guarded_by(mut self, lock: &'a BusMutex) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Transaction bound of the simulated I2C controller
    pub fn with_bus_timeout(mut self, timeout: Duration) -> Self {
        self.bus_timeout = timeout;
        self
    }

    /// Handle for making the next transaction hang for the stored number
    /// of milliseconds. Usable after the part has been moved into a driver.
    pub fn stall_control(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.stall_ms)
    }

    /// Transactions that ran without the shared bus lock held
    pub fn unguarded_transactions(&self) -> u32 {
        self.unguarded
    }

    pub fn ctrl_meas(&self) -> u8 {
        self.regs[REG_CTRL_MEAS as usize]
    }

    pub fn config(&self) -> u8 {
        self.regs[REG_CONFIG as usize]
    }

    fn power_on_reset(&mut self) {
        self.regs = [0; 256];
        self.regs[REG_ID as usize] = CHIP_ID;
        let calib = REG_CALIB_START as usize;
        self.regs[calib..calib + CALIBRATION_LEN].copy_from_slice(&CALIBRATION);
        self.store_adc(ADC_SKIPPED, ADC_SKIPPED);
    }

    fn sleeping(&self) -> bool {
        self.ctrl_meas() & 0x03 == 0
    }

    fn store_adc(&mut self, pressure: i32, temperature: i32) {
        let at = REG_PRESS_MSB as usize;
        for (offset, raw) in [(0, pressure), (3, temperature)] {
            let shifted = (raw as u32) << 4;
            self.regs[at + offset] = (shifted >> 16) as u8;
            self.regs[at + offset + 1] = (shifted >> 8) as u8;
            self.regs[at + offset + 2] = shifted as u8;
        }
    }

    /// Advance one conversion
    fn convert(&mut self) {
        if self.sleeping() {
            return;
        }
        self.tick = self.tick.wrapping_add(1);
        let t = f64::from(self.tick);

        let osrs_t = self.ctrl_meas() >> 5;
        let osrs_p = (self.ctrl_meas() >> 2) & 0x07;
        let temperature = if osrs_t == 0 {
            ADC_SKIPPED
        } else {
            (BASE_RAW_TEMPERATURE + 2000.0 * (t / 10.0).sin()) as i32
        };
        let pressure = if osrs_p == 0 {
            ADC_SKIPPED
        } else {
            (BASE_RAW_PRESSURE + 300.0 * (t / 7.0).cos()) as i32
        };
        self.store_adc(pressure, temperature);
    }

    fn write_register(&mut self, register: u8, value: u8) {
        trace!("sim: write {:#04x} <- {:#04x}", register, value);
        match register {
            REG_RESET if value == RESET_COMMAND => self.power_on_reset(),
            REG_CONFIG | REG_CTRL_MEAS => self.regs[register as usize] = value,
            // Everything else is read-only
            _ => {}
        }
    }

    /// Hang for an injected stall, giving up at the bus bound.
    fn stall(&self) -> Result<(), ErrorKind> {
        let stall = Duration::from_millis(u64::from(self.stall_ms.swap(0, Ordering::Relaxed)));
        if stall >= self.bus_timeout {
            thread::sleep(self.bus_timeout);
            warn!("sim: transaction timed out after {:?}", self.bus_timeout);
            return Err(ErrorKind::Other);
        }
        thread::sleep(stall);
        Ok(())
    }

    fn check_guard(&mut self) {
        if let Some(lock) = self.lock {
            if lock.try_lock().is_ok() {
                self.unguarded += 1;
                warn!("sim: transaction without the bus lock held");
            }
        }
    }
}

impl ErrorType for SimulatedBmp280<'_> {
    type Error = ErrorKind;
}

impl I2c for SimulatedBmp280<'_> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.address.map(Address::as_u8) != Some(address) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        self.check_guard();
        self.stall()?;

        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    let Some((&first, rest)) = bytes.split_first() else {
                        continue;
                    };
                    self.pointer = first;
                    // Register/value pairs; a lone register byte only moves the pointer
                    let mut register = first;
                    for (i, &b) in rest.iter().enumerate() {
                        if i % 2 == 0 {
                            self.write_register(register, b);
                        } else {
                            register = b;
                        }
                    }
                }
                Operation::Read(buf) => {
                    if self.pointer == REG_PRESS_MSB {
                        self.convert();
                    }
                    for b in buf.iter_mut() {
                        *b = match self.pointer {
                            REG_STATUS => 0,
                            p => self.regs[p as usize],
                        };
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}
