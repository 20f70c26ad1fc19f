//! BMP280 register map and bus addresses

// =============================================================================
// I2C Address
// =============================================================================

/// 7-bit bus address, selected by the SDO strap pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Address {
    /// SDO tied to GND
    Primary = 0x76,
    /// SDO tied to VDDIO
    Secondary = 0x77,
}

impl Address {
    /// Both addresses in the order bring-up should try them.
    pub const ALL: [Address; 2] = [Address::Primary, Address::Secondary];

    /// Raw 7-bit address
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Convert from a raw 7-bit address
    pub const fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x76 => Some(Self::Primary),
            0x77 => Some(Self::Secondary),
            _ => None,
        }
    }
}

// =============================================================================
// Register Addresses
// =============================================================================

// Measurement data (burst readable, auto-incrementing)
pub const REG_TEMP_XLSB: u8 = 0xFC;
pub const REG_TEMP_LSB: u8 = 0xFB;
pub const REG_TEMP_MSB: u8 = 0xFA;
pub const REG_PRESS_XLSB: u8 = 0xF9;
pub const REG_PRESS_LSB: u8 = 0xF8;
pub const REG_PRESS_MSB: u8 = 0xF7;

// Control registers
/// t_sb[7:5], filter[4:2], spi3w_en[0]
pub const REG_CONFIG: u8 = 0xF5;
/// osrs_t[7:5], osrs_p[4:2], mode[1:0]
pub const REG_CTRL_MEAS: u8 = 0xF4;
/// measuring[3], im_update[0]
pub const REG_STATUS: u8 = 0xF3;

// Reset and identification
pub const REG_RESET: u8 = 0xE0;
pub const REG_ID: u8 = 0xD0;

// Factory calibration, 0x88..=0x9F
pub const REG_CALIB_START: u8 = 0x88;

// =============================================================================
// Constants
// =============================================================================

/// Value of [`REG_ID`] on a genuine BMP280
pub const CHIP_ID: u8 = 0x58;

/// Writing this to [`REG_RESET`] triggers a full power-on reset
pub const RESET_COMMAND: u8 = 0xB6;

/// Size of the factory calibration block
pub const CALIBRATION_LEN: usize = 24;

/// Size of the pressure + temperature burst starting at [`REG_PRESS_MSB`]
pub const DATA_LEN: usize = 6;
