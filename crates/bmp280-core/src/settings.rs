//! Sampling configuration and its register encodings
//!
//! Two registers hold the whole configuration:
//!
//! | Register         | Bits 7:5 | Bits 4:2 | Bits 1:0 |
//! |------------------|----------|----------|----------|
//! | `config` (0xF5)  | t_sb     | filter   | spi3w_en |
//! | `ctrl_meas` (0xF4) | osrs_t | osrs_p   | mode     |

use serde::{Deserialize, Serialize};

use crate::error::Error;

// =============================================================================
// Enums
// =============================================================================

/// Oversampling applied to one of the two ADC channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Oversampling {
    /// Channel not measured; its output register holds 0x80000
    Skipped = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

impl Oversampling {
    /// Number of internal samples averaged per reading
    pub const fn factor(self) -> u8 {
        match self {
            Self::Skipped => 0,
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
            Self::X16 => 16,
        }
    }
}

impl TryFrom<u8> for Oversampling {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(Self::Skipped),
            1 => Ok(Self::X1),
            2 => Ok(Self::X2),
            3 => Ok(Self::X4),
            4 => Ok(Self::X8),
            5 => Ok(Self::X16),
            _ => Err(Error::InvalidArgument {
                what: "oversampling must be 0..=5",
            }),
        }
    }
}

/// Power mode (mode[1:0] in ctrl_meas)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PowerMode {
    /// No measurements, lowest power
    Sleep = 0,
    /// One measurement cycle, then back to sleep
    Forced = 1,
    /// Continuous measure / standby cycling
    Normal = 3,
}

impl TryFrom<u8> for PowerMode {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(Self::Sleep),
            1 => Ok(Self::Forced),
            3 => Ok(Self::Normal),
            _ => Err(Error::InvalidArgument {
                what: "power mode must be 0 (sleep), 1 (forced) or 3 (normal)",
            }),
        }
    }
}

/// Idle time between measurement cycles in normal mode (t_sb[2:0] in config)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StandbyTime {
    Ms0_5 = 0,
    Ms62_5 = 1,
    Ms125 = 2,
    Ms250 = 3,
    Ms500 = 4,
    Ms1000 = 5,
    Ms2000 = 6,
    Ms4000 = 7,
}

impl StandbyTime {
    /// Standby interval in microseconds
    pub const fn as_micros(self) -> u32 {
        match self {
            Self::Ms0_5 => 500,
            Self::Ms62_5 => 62_500,
            Self::Ms125 => 125_000,
            Self::Ms250 => 250_000,
            Self::Ms500 => 500_000,
            Self::Ms1000 => 1_000_000,
            Self::Ms2000 => 2_000_000,
            Self::Ms4000 => 4_000_000,
        }
    }
}

impl TryFrom<u8> for StandbyTime {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(Self::Ms0_5),
            1 => Ok(Self::Ms62_5),
            2 => Ok(Self::Ms125),
            3 => Ok(Self::Ms250),
            4 => Ok(Self::Ms500),
            5 => Ok(Self::Ms1000),
            6 => Ok(Self::Ms2000),
            7 => Ok(Self::Ms4000),
            _ => Err(Error::InvalidArgument {
                what: "standby time must be 0..=7",
            }),
        }
    }
}

/// IIR filter coefficient (filter[2:0] in config)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Filter {
    Off = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
}

impl TryFrom<u8> for Filter {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(Self::Off),
            1 => Ok(Self::X2),
            2 => Ok(Self::X4),
            3 => Ok(Self::X8),
            4 => Ok(Self::X16),
            _ => Err(Error::InvalidArgument {
                what: "filter coefficient must be 0..=4",
            }),
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Complete sampling configuration of the sensor.
///
/// The default is the bring-up profile: 16× oversampling on both channels,
/// normal mode, 500 ms standby and the strongest IIR filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub temperature_oversampling: Oversampling,
    pub pressure_oversampling: Oversampling,
    pub mode: PowerMode,
    pub standby: StandbyTime,
    pub filter: Filter,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temperature_oversampling: Oversampling::X16,
            pressure_oversampling: Oversampling::X16,
            mode: PowerMode::Normal,
            standby: StandbyTime::Ms500,
            filter: Filter::X16,
        }
    }
}

impl Settings {
    /// Build settings from raw register field values.
    ///
    /// # Errors
    /// `InvalidArgument` if any field is outside its encodable range,
    /// including the reserved power mode 2.
    pub fn from_raw(osrs_t: u8, osrs_p: u8, mode: u8, t_sb: u8, filter: u8) -> Result<Self, Error> {
        Ok(Self {
            temperature_oversampling: Oversampling::try_from(osrs_t)?,
            pressure_oversampling: Oversampling::try_from(osrs_p)?,
            mode: PowerMode::try_from(mode)?,
            standby: StandbyTime::try_from(t_sb)?,
            filter: Filter::try_from(filter)?,
        })
    }

    /// Value for the `config` register. spi3w_en is always left at 0.
    pub const fn config_byte(&self) -> u8 {
        ((self.standby as u8) << 5) | ((self.filter as u8) << 2)
    }

    /// Value for the `ctrl_meas` register
    pub const fn ctrl_meas_byte(&self) -> u8 {
        ((self.temperature_oversampling as u8) << 5)
            | ((self.pressure_oversampling as u8) << 2)
            | (self.mode as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_encode_to_bring_up_profile() {
        let settings = Settings::default();
        assert_eq!(settings.config_byte(), 0x90);
        assert_eq!(settings.ctrl_meas_byte(), 0xB7);
    }

    #[test]
    fn fields_land_in_their_bit_positions() {
        let settings = Settings {
            temperature_oversampling: Oversampling::X1,
            pressure_oversampling: Oversampling::X4,
            mode: PowerMode::Forced,
            standby: StandbyTime::Ms4000,
            filter: Filter::X2,
        };
        assert_eq!(settings.ctrl_meas_byte(), 0b001_011_01);
        assert_eq!(settings.config_byte(), 0b111_001_00);
    }

    #[test]
    fn from_raw_accepts_every_encodable_value() {
        let settings = Settings::from_raw(5, 5, 3, 4, 4).unwrap();
        assert_eq!(settings, Settings::default());

        let sleepy = Settings::from_raw(0, 0, 0, 0, 0).unwrap();
        assert_eq!(sleepy.mode, PowerMode::Sleep);
        assert_eq!(sleepy.temperature_oversampling, Oversampling::Skipped);
    }

    #[test]
    fn from_raw_rejects_out_of_range_values() {
        let invalid = |r: Result<Settings, Error>| {
            matches!(r, Err(Error::InvalidArgument { .. }))
        };
        assert!(invalid(Settings::from_raw(6, 5, 3, 4, 4)));
        assert!(invalid(Settings::from_raw(5, 6, 3, 4, 4)));
        // mode 2 is a reserved alias of forced mode
        assert!(invalid(Settings::from_raw(5, 5, 2, 4, 4)));
        assert!(invalid(Settings::from_raw(5, 5, 3, 8, 4)));
        assert!(invalid(Settings::from_raw(5, 5, 3, 4, 5)));
    }

    #[test]
    fn helper_conversions() {
        assert_eq!(Oversampling::X8.factor(), 8);
        assert_eq!(Oversampling::Skipped.factor(), 0);
        assert_eq!(StandbyTime::Ms62_5.as_micros(), 62_500);
        assert_eq!(StandbyTime::Ms500.as_micros(), 500_000);
    }

    #[test]
    fn settings_survive_persistence() {
        let settings = Settings {
            filter: Filter::Off,
            standby: StandbyTime::Ms125,
            ..Settings::default()
        };
        let bytes = postcard::to_allocvec(&settings).unwrap();
        let restored: Settings = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(restored, settings);
    }
}
