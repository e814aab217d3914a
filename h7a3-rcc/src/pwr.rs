//! Core voltage scaling (PWR_SRDCR.VOS).

use crate::rcc::{ClockDomain, Error};
use crate::time::Hertz;

// Maximum sysclk / AHB frequency per VOS level, RM0455 "Voltage scaling".
pub const VOS3_LIMIT: Hertz = Hertz(88_000_000);
pub const VOS2_LIMIT: Hertz = Hertz(160_000_000);
pub const VOS1_LIMIT: Hertz = Hertz(225_000_000);
pub const VOS0_LIMIT: Hertz = Hertz(280_000_000);

/// Core supply voltage level.
///
/// Declared from the lowest to the highest voltage, so the derived ordering
/// follows the voltage: `Scale3 < Scale2 < Scale1 < Scale0`. The discriminant
/// is the VOS field encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageScale {
    Scale3 = 0b00,
    Scale2 = 0b01,
    Scale1 = 0b10,
    Scale0 = 0b11,
}

impl VoltageScale {
    /// Lowest scale able to run `sysclk`.
    pub const fn required_for(sysclk: Hertz) -> Result<Self, Error> {
        let hz = sysclk.0;
        if hz <= VOS3_LIMIT.0 {
            Ok(VoltageScale::Scale3)
        } else if hz <= VOS2_LIMIT.0 {
            Ok(VoltageScale::Scale2)
        } else if hz <= VOS1_LIMIT.0 {
            Ok(VoltageScale::Scale1)
        } else if hz <= VOS0_LIMIT.0 {
            Ok(VoltageScale::Scale0)
        } else {
            Err(Error::FrequencyOutOfRange {
                domain: ClockDomain::Sysclk,
                freq: sysclk,
                max: VOS0_LIMIT,
            })
        }
    }

    /// `VoltageScale::from_level(0)` is `Scale0`, the datasheet naming.
    pub const fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(VoltageScale::Scale0),
            1 => Some(VoltageScale::Scale1),
            2 => Some(VoltageScale::Scale2),
            3 => Some(VoltageScale::Scale3),
            _ => None,
        }
    }

    pub const fn level(self) -> u8 {
        3 - self as u8
    }

    pub const fn to_bits(self) -> u8 {
        self as u8
    }

    /// Maximum sysclk, CPU and AHB frequency at this scale.
    pub const fn max_sysclk(self) -> Hertz {
        match self {
            VoltageScale::Scale3 => VOS3_LIMIT,
            VoltageScale::Scale2 => VOS2_LIMIT,
            VoltageScale::Scale1 => VOS1_LIMIT,
            VoltageScale::Scale0 => VOS0_LIMIT,
        }
    }

    /// Maximum APB1..APB4 frequency at this scale.
    pub const fn max_apb(self) -> Hertz {
        Hertz(self.max_sysclk().0 / 2)
    }

    /// Whether this scale is at least as high as `other`.
    pub const fn covers(self, other: VoltageScale) -> bool {
        self as u8 >= other as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_scale_boundaries() {
        assert_eq!(VoltageScale::required_for(Hertz::mhz(64)), Ok(VoltageScale::Scale3));
        assert_eq!(VoltageScale::required_for(Hertz::mhz(88)), Ok(VoltageScale::Scale3));
        assert_eq!(VoltageScale::required_for(Hertz::hz(88_000_001)), Ok(VoltageScale::Scale2));
        assert_eq!(VoltageScale::required_for(Hertz::mhz(225)), Ok(VoltageScale::Scale1));
        assert_eq!(VoltageScale::required_for(Hertz::mhz(280)), Ok(VoltageScale::Scale0));
        assert_eq!(
            VoltageScale::required_for(Hertz::mhz(281)),
            Err(Error::FrequencyOutOfRange {
                domain: ClockDomain::Sysclk,
                freq: Hertz::mhz(281),
                max: Hertz::mhz(280),
            })
        );
    }

    #[test]
    fn ordering_follows_voltage() {
        assert!(VoltageScale::Scale0 > VoltageScale::Scale1);
        assert!(VoltageScale::Scale2 > VoltageScale::Scale3);
        assert!(VoltageScale::Scale0.covers(VoltageScale::Scale2));
        assert!(!VoltageScale::Scale3.covers(VoltageScale::Scale2));
        assert_eq!(VoltageScale::from_level(0).map(VoltageScale::level), Some(0));
        assert_eq!(VoltageScale::Scale0.max_apb(), Hertz::mhz(140));
    }
}
