//! PLL1 factor validation and search.
//!
//! ```text
//! input ── /M ── ref ── xN ── vco ──┬── /P ── pll1_p (sysclk)
//!                                   ├── /Q ── pll1_q
//!                                   └── /R ── pll1_r
//! ```

use super::{ClockDomain, Error, PllInputRange, PLL_OUT_MAX};
use crate::time::Hertz;

/// PLL1 divider and multiplier settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllFactors {
    /// Band the reference (`input / m`) must fall into.
    pub range: PllInputRange,
    /// DIVM1, 1..=63
    pub m: u8,
    /// DIVN1, 4..=512
    pub n: u16,
    /// DIVP1, 1 or even 2..=128
    pub p: u8,
    /// DIVQ1, 1..=128
    pub q: u8,
    /// DIVR1, 1..=128
    pub r: u8,
}

/// Which PLL1 divider is outside its register range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllDivider {
    M,
    N,
    P,
    Q,
    R,
}

/// Why a set of [`PllFactors`] was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllFault {
    DividerOutOfRange(PllDivider),
    /// `input / m` is not an integer inside the selected band.
    InputOutOfRange { reference: Hertz },
    VcoOutOfRange { vco: Hertz },
    /// The VCO is not a whole multiple of this output divider.
    InexactOutput(PllDivider),
}

/// Frequencies produced by a validated PLL1 setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllOutputs {
    pub reference: Hertz,
    pub vco: Hertz,
    pub p: Hertz,
    pub q: Hertz,
    pub r: Hertz,
}

impl PllFactors {
    pub const fn new(range: PllInputRange, m: u8, n: u16, p: u8, q: u8, r: u8) -> Self {
        Self { range, m, n, p, q, r }
    }

    const fn check_dividers(&self) -> Result<(), Error> {
        let bad = if self.m < 1 || self.m > 63 {
            Some(PllDivider::M)
        } else if self.n < 4 || self.n > 512 {
            Some(PllDivider::N)
        } else if !(self.p == 1 || (self.p >= 2 && self.p <= 128 && self.p % 2 == 0)) {
            Some(PllDivider::P)
        } else if self.q < 1 || self.q > 128 {
            Some(PllDivider::Q)
        } else if self.r < 1 || self.r > 128 {
            Some(PllDivider::R)
        } else {
            None
        };
        match bad {
            Some(divider) => Err(Error::InvalidPllFactors(PllFault::DividerOutOfRange(divider))),
            None => Ok(()),
        }
    }

    /// Validate these factors against `input` and compute the PLL1 outputs.
    ///
    /// Pure; the same inputs always give the same verdict.
    pub const fn outputs(&self, input: Hertz) -> Result<PllOutputs, Error> {
        const_try!(self.check_dividers());

        let m = self.m as u32;
        let reference = Hertz(input.0 / m);
        if input.0 % m != 0 || !self.range.contains(reference) {
            return Err(Error::InvalidPllFactors(PllFault::InputOutOfRange { reference }));
        }

        // Up to 16 MHz * 512 overflows u32.
        let vco = reference.0 as u64 * self.n as u64;
        let (vco_min, vco_max) = self.range.vco().bounds();
        if vco < vco_min.0 as u64 || vco > vco_max.0 as u64 {
            let vco = if vco > u32::MAX as u64 { u32::MAX } else { vco as u32 };
            return Err(Error::InvalidPllFactors(PllFault::VcoOutOfRange { vco: Hertz(vco) }));
        }
        let vco = Hertz(vco as u32);

        let p = const_try!(output(vco, self.p, PllDivider::P, ClockDomain::Pll1P));
        let q = const_try!(output(vco, self.q, PllDivider::Q, ClockDomain::Pll1Q));
        let r = const_try!(output(vco, self.r, PllDivider::R, ClockDomain::Pll1R));

        Ok(PllOutputs { reference, vco, p, q, r })
    }
}

const fn output(vco: Hertz, div: u8, divider: PllDivider, domain: ClockDomain) -> Result<Hertz, Error> {
    let div = div as u32;
    if vco.0 % div != 0 {
        return Err(Error::InvalidPllFactors(PllFault::InexactOutput(divider)));
    }
    let freq = Hertz(vco.0 / div);
    if freq.0 > PLL_OUT_MAX.0 {
        Err(Error::FrequencyOutOfRange {
            domain,
            freq,
            max: PLL_OUT_MAX,
        })
    } else {
        Ok(freq)
    }
}

/// Search for factors producing exactly `target` on every PLL1 output.
///
/// Prefers the smallest `m`, then the smallest `p`. Q and R copy P.
pub fn solve(input: Hertz, target: Hertz) -> Option<PllFactors> {
    if target.0 == 0 || target.0 > PLL_OUT_MAX.0 {
        return None;
    }

    for m in 1..=63u8 {
        if input.0 % m as u32 != 0 {
            continue;
        }
        let reference = Hertz(input.0 / m as u32);
        let Some(range) = PllInputRange::for_reference(reference) else {
            continue;
        };

        let dividers = core::iter::once(1u8).chain((2..=128u8).step_by(2));
        for p in dividers {
            let vco = target.0 as u64 * p as u64;
            if vco % reference.0 as u64 != 0 {
                continue;
            }
            let n = vco / reference.0 as u64;
            if n < 4 || n > 512 {
                continue;
            }

            let factors = PllFactors::new(range, m, n as u16, p, p, p);
            if factors.outputs(input).is_ok() {
                trace!("rcc: pll solved m={} n={} p={}", m, n, p);
                return Some(factors);
            }
        }
    }

    None
}
