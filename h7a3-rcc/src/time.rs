//! Time units

use core::fmt::Display;

/// Hertz
#[derive(PartialEq, PartialOrd, Ord, Clone, Copy, Eq, Debug, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hertz(pub u32);

impl Display for Hertz {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl Hertz {
    /// Create a `Hertz` from the given hertz.
    pub const fn hz(hertz: u32) -> Self {
        Self(hertz)
    }

    /// Create a `Hertz` from the given megahertz.
    ///
    /// Overflows above 4294 MHz; host code taking user input should use
    /// `checked_mul` instead.
    pub const fn mhz(megahertz: u32) -> Self {
        Self(megahertz * 1_000_000)
    }

    /// Whole megahertz, truncated.
    pub const fn to_mhz(self) -> u32 {
        self.0 / 1_000_000
    }
}
