//! Reset and clock control: clock tree model, PLL1 validation and bring-up.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

mod bring_up;
mod clock;
mod clock_config;
pub mod pll;
mod resolver;

pub use bring_up::*;
pub use clock::*;
pub use clock_config::*;
pub use pll::{PllDivider, PllFactors, PllFault, PllOutputs};
pub use resolver::peripherals_on;

pub use crate::_generated::Peripheral;
pub use crate::flash::FlashLatency;
pub use crate::pwr::VoltageScale;

use crate::time::Hertz;

/// RCC error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// PLL1 factors are illegal for the oscillator feeding them.
    InvalidPllFactors(PllFault),
    /// HSE frequency outside 4..=50 MHz.
    OscillatorOutOfRange(Hertz),
    /// A derived clock is above what its domain tolerates.
    FrequencyOutOfRange {
        domain: ClockDomain,
        freq: Hertz,
        max: Hertz,
    },
    /// A bus prescaler does not divide its parent clock exactly.
    InexactDivision {
        domain: ClockDomain,
        parent: Hertz,
        divisor: u32,
    },
    /// The configured voltage scale cannot sustain the target sysclk.
    VoltageScaleMismatch {
        required: VoltageScale,
        configured: VoltageScale,
    },
    /// An oscillator or PLL1 did not report ready in time.
    ClockSourceNotReady(ClockSource),
    /// A voltage, flash latency or clock switch change was not acknowledged in time.
    SwitchTimeout(Transition),
    /// Clocks were queried before bring-up completed.
    DomainNotReady,
    /// Bring-up was started a second time.
    ReentrantBringUp,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPllFactors(PllFault::DividerOutOfRange(d)) => {
                write!(f, "PLL1 divider {:?} outside its register range", d)
            }
            Error::InvalidPllFactors(PllFault::InputOutOfRange { reference }) => {
                write!(f, "PLL1 reference {} outside the selected input range", reference)
            }
            Error::InvalidPllFactors(PllFault::VcoOutOfRange { vco }) => {
                write!(f, "PLL1 VCO {} outside the VCO range", vco)
            }
            Error::OscillatorOutOfRange(freq) => {
                write!(f, "HSE frequency {} outside {}..={}", freq, HSE_MIN, HSE_MAX)
            }
            Error::InvalidPllFactors(PllFault::InexactOutput(d)) => {
                write!(f, "PLL1 VCO is not a multiple of divider {:?}", d)
            }
            Error::InexactDivision { domain, parent, divisor } => {
                write!(f, "{} is {} / {}, not a whole number of Hz", domain, parent, divisor)
            }
            Error::FrequencyOutOfRange { domain, freq, max } => {
                write!(f, "{} at {} exceeds {}", domain, freq, max)
            }
            Error::VoltageScaleMismatch { required, configured } => write!(
                f,
                "sysclk needs VOS{} but VOS{} is configured",
                required.level(),
                configured.level()
            ),
            Error::ClockSourceNotReady(source) => write!(f, "{:?} not ready", source),
            Error::SwitchTimeout(transition) => write!(f, "{:?} change not acknowledged", transition),
            Error::DomainNotReady => f.write_str("clocks queried before bring-up completed"),
            Error::ReentrantBringUp => f.write_str("clock bring-up already ran"),
        }
    }
}

// =============================================================================
// Core frequency cache
// =============================================================================

/// CPU clock frequency seen by delay loops. Out of reset the core runs from HSI.
static CORE_FREQUENCY: AtomicU32 = AtomicU32::new(HSI_FREQ.0);

/// Current CPU clock frequency.
pub fn core_frequency() -> Hertz {
    Hertz(CORE_FREQUENCY.load(Ordering::Acquire))
}

/// Record a new CPU clock frequency. Only call once the switch is confirmed.
pub fn set_core_frequency(freq: Hertz) {
    debug!("rcc: core frequency {}", freq.0);
    CORE_FREQUENCY.store(freq.0, Ordering::Release);
}

#[cfg(test)]
mod tests;
