//! Clock types, constants, and the derived frequency table.

use core::fmt;

use crate::time::Hertz;

// =============================================================================
// Constants
// =============================================================================

// NOTE: uncalibrated, +-1% over temperature
pub const HSI_FREQ: Hertz = Hertz(64_000_000);
pub const HSE_MIN: Hertz = Hertz(4_000_000);
pub const HSE_MAX: Hertz = Hertz(50_000_000);

/// Upper limit of every PLL1 output (P, Q, R).
pub const PLL_OUT_MAX: Hertz = Hertz(280_000_000);

// =============================================================================
// Sources
// =============================================================================

/// Oscillator feeding PLL1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OscillatorSource {
    /// 64 MHz internal RC oscillator.
    Hsi,
    /// External crystal or clock.
    Hse {
        freq: Hertz,
        /// External clock on OSC_IN (e.g. ST-LINK MCO) instead of a crystal.
        bypass: bool,
    },
}

impl OscillatorSource {
    pub const fn frequency(self) -> Hertz {
        match self {
            OscillatorSource::Hsi => HSI_FREQ,
            OscillatorSource::Hse { freq, .. } => freq,
        }
    }

    pub const fn clock_source(self) -> ClockSource {
        match self {
            OscillatorSource::Hsi => ClockSource::Hsi,
            OscillatorSource::Hse { .. } => ClockSource::Hse,
        }
    }
}

/// Anything with a ready flag that bring-up waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    Hsi,
    Hse,
    Pll1,
}

/// Hardware transitions acknowledged through a status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    /// PWR_SRDCR.VOS / PWR_CSR1.ACTVOSRDY
    VoltageScale,
    /// FLASH_ACR.LATENCY read back
    FlashLatency,
    /// RCC_CFGR.SW / RCC_CFGR.SWS
    SystemClock,
}

/// RCC_CFGR.SW encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemClockSource {
    Hsi = 0b000,
    Hse = 0b010,
    Pll1 = 0b011,
}

impl SystemClockSource {
    pub const fn to_bits(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// PLL input / VCO ranges
// =============================================================================

/// PLL1 reference frequency band (RCC_PLLCFGR.PLL1RGE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllInputRange {
    MHz1_2 = 0b00,
    MHz2_4 = 0b01,
    MHz4_8 = 0b10,
    MHz8_16 = 0b11,
}

impl PllInputRange {
    /// Inclusive bounds of the band.
    pub const fn bounds(self) -> (Hertz, Hertz) {
        match self {
            PllInputRange::MHz1_2 => (Hertz(1_000_000), Hertz(2_000_000)),
            PllInputRange::MHz2_4 => (Hertz(2_000_000), Hertz(4_000_000)),
            PllInputRange::MHz4_8 => (Hertz(4_000_000), Hertz(8_000_000)),
            PllInputRange::MHz8_16 => (Hertz(8_000_000), Hertz(16_000_000)),
        }
    }

    pub const fn contains(self, reference: Hertz) -> bool {
        let (min, max) = self.bounds();
        reference.0 >= min.0 && reference.0 <= max.0
    }

    /// Band for a given reference frequency. Shared edges go to the upper band.
    pub const fn for_reference(reference: Hertz) -> Option<Self> {
        let hz = reference.0;
        if hz < 1_000_000 || hz > 16_000_000 {
            None
        } else if hz < 2_000_000 {
            Some(PllInputRange::MHz1_2)
        } else if hz < 4_000_000 {
            Some(PllInputRange::MHz2_4)
        } else if hz < 8_000_000 {
            Some(PllInputRange::MHz4_8)
        } else {
            Some(PllInputRange::MHz8_16)
        }
    }

    /// The 1-2 MHz band can only drive the medium VCO.
    pub const fn vco(self) -> VcoRange {
        match self {
            PllInputRange::MHz1_2 => VcoRange::Medium,
            _ => VcoRange::Wide,
        }
    }

    pub const fn to_bits(self) -> u8 {
        self as u8
    }
}

/// PLL1 VCO selection (RCC_PLLCFGR.PLL1VCOSEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VcoRange {
    Wide = 0,
    Medium = 1,
}

impl VcoRange {
    /// Inclusive bounds of the VCO output, RM0455.
    pub const fn bounds(self) -> (Hertz, Hertz) {
        match self {
            VcoRange::Wide => (Hertz(128_000_000), Hertz(560_000_000)),
            VcoRange::Medium => (Hertz(150_000_000), Hertz(420_000_000)),
        }
    }

    pub const fn to_bits(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// Prescalers
// =============================================================================

/// Divider of the CPU (CDCPRE) and AHB (HPRE) stages. There is no /32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AhbPrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
    Div16,
    Div64,
    Div128,
    Div256,
    Div512,
}

impl AhbPrescaler {
    pub const fn divisor(self) -> u32 {
        match self {
            AhbPrescaler::Div1 => 1,
            AhbPrescaler::Div2 => 2,
            AhbPrescaler::Div4 => 4,
            AhbPrescaler::Div8 => 8,
            AhbPrescaler::Div16 => 16,
            AhbPrescaler::Div64 => 64,
            AhbPrescaler::Div128 => 128,
            AhbPrescaler::Div256 => 256,
            AhbPrescaler::Div512 => 512,
        }
    }

    pub const fn from_divisor(div: u32) -> Option<Self> {
        match div {
            1 => Some(AhbPrescaler::Div1),
            2 => Some(AhbPrescaler::Div2),
            4 => Some(AhbPrescaler::Div4),
            8 => Some(AhbPrescaler::Div8),
            16 => Some(AhbPrescaler::Div16),
            64 => Some(AhbPrescaler::Div64),
            128 => Some(AhbPrescaler::Div128),
            256 => Some(AhbPrescaler::Div256),
            512 => Some(AhbPrescaler::Div512),
            _ => None,
        }
    }

    /// 4-bit field: `0xxx` is /1, `1000` /2 up to `1111` /512.
    pub const fn to_bits(self) -> u8 {
        match self {
            AhbPrescaler::Div1 => 0b0000,
            AhbPrescaler::Div2 => 0b1000,
            AhbPrescaler::Div4 => 0b1001,
            AhbPrescaler::Div8 => 0b1010,
            AhbPrescaler::Div16 => 0b1011,
            AhbPrescaler::Div64 => 0b1100,
            AhbPrescaler::Div128 => 0b1101,
            AhbPrescaler::Div256 => 0b1110,
            AhbPrescaler::Div512 => 0b1111,
        }
    }
}

/// Divider of the APB1..APB4 stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApbPrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
    Div16,
}

impl ApbPrescaler {
    pub const fn divisor(self) -> u32 {
        match self {
            ApbPrescaler::Div1 => 1,
            ApbPrescaler::Div2 => 2,
            ApbPrescaler::Div4 => 4,
            ApbPrescaler::Div8 => 8,
            ApbPrescaler::Div16 => 16,
        }
    }

    pub const fn from_divisor(div: u32) -> Option<Self> {
        match div {
            1 => Some(ApbPrescaler::Div1),
            2 => Some(ApbPrescaler::Div2),
            4 => Some(ApbPrescaler::Div4),
            8 => Some(ApbPrescaler::Div8),
            16 => Some(ApbPrescaler::Div16),
            _ => None,
        }
    }

    pub const fn to_bits(self) -> u8 {
        match self {
            ApbPrescaler::Div1 => 0b000,
            ApbPrescaler::Div2 => 0b100,
            ApbPrescaler::Div4 => 0b101,
            ApbPrescaler::Div8 => 0b110,
            ApbPrescaler::Div16 => 0b111,
        }
    }

    /// Timer kernel clock multiplier with RCC_CFGR.TIMPRE = 0.
    pub const fn timer_multiplier(self) -> u32 {
        match self {
            ApbPrescaler::Div1 => 1,
            _ => 2,
        }
    }
}

/// Bus stage with its own prescaler field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bus {
    /// RCC_CDCFGR1.CDCPRE
    Core,
    /// RCC_CDCFGR1.HPRE
    Ahb,
    /// RCC_CDCFGR2.CDPPRE1
    Apb1,
    /// RCC_CDCFGR2.CDPPRE2
    Apb2,
    /// RCC_CDCFGR1.CDPPRE
    Apb3,
    /// RCC_SRDCFGR.SRDPPRE
    Apb4,
}

/// One prescaler write, as issued by bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    Core(AhbPrescaler),
    Ahb(AhbPrescaler),
    Apb1(ApbPrescaler),
    Apb2(ApbPrescaler),
    Apb3(ApbPrescaler),
    Apb4(ApbPrescaler),
}

impl Prescaler {
    pub const fn bus(self) -> Bus {
        match self {
            Prescaler::Core(_) => Bus::Core,
            Prescaler::Ahb(_) => Bus::Ahb,
            Prescaler::Apb1(_) => Bus::Apb1,
            Prescaler::Apb2(_) => Bus::Apb2,
            Prescaler::Apb3(_) => Bus::Apb3,
            Prescaler::Apb4(_) => Bus::Apb4,
        }
    }

    pub const fn divisor(self) -> u32 {
        match self {
            Prescaler::Core(p) | Prescaler::Ahb(p) => p.divisor(),
            Prescaler::Apb1(p) | Prescaler::Apb2(p) | Prescaler::Apb3(p) | Prescaler::Apb4(p) => p.divisor(),
        }
    }

    pub const fn to_bits(self) -> u8 {
        match self {
            Prescaler::Core(p) | Prescaler::Ahb(p) => p.to_bits(),
            Prescaler::Apb1(p) | Prescaler::Apb2(p) | Prescaler::Apb3(p) | Prescaler::Apb4(p) => p.to_bits(),
        }
    }
}

// =============================================================================
// Clock domains
// =============================================================================

/// A node of the clock tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDomain {
    Sysclk,
    Pll1P,
    Pll1Q,
    Pll1R,
    /// CPU clock (rcc_c_ck)
    Core,
    /// rcc_hclk, before the per-bus gates
    Ahb,
    Ahb1,
    Ahb2,
    Ahb3,
    Ahb4,
    Apb1,
    Apb2,
    Apb3,
    Apb4,
    Apb1Timer,
    Apb2Timer,
}

impl ClockDomain {
    pub const ALL: [ClockDomain; 16] = [
        ClockDomain::Sysclk,
        ClockDomain::Pll1P,
        ClockDomain::Pll1Q,
        ClockDomain::Pll1R,
        ClockDomain::Core,
        ClockDomain::Ahb,
        ClockDomain::Ahb1,
        ClockDomain::Ahb2,
        ClockDomain::Ahb3,
        ClockDomain::Ahb4,
        ClockDomain::Apb1,
        ClockDomain::Apb2,
        ClockDomain::Apb3,
        ClockDomain::Apb4,
        ClockDomain::Apb1Timer,
        ClockDomain::Apb2Timer,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ClockDomain::Sysclk => "sysclk",
            ClockDomain::Pll1P => "pll1_p",
            ClockDomain::Pll1Q => "pll1_q",
            ClockDomain::Pll1R => "pll1_r",
            ClockDomain::Core => "core",
            ClockDomain::Ahb => "ahb",
            ClockDomain::Ahb1 => "ahb1",
            ClockDomain::Ahb2 => "ahb2",
            ClockDomain::Ahb3 => "ahb3",
            ClockDomain::Ahb4 => "ahb4",
            ClockDomain::Apb1 => "apb1",
            ClockDomain::Apb2 => "apb2",
            ClockDomain::Apb3 => "apb3",
            ClockDomain::Apb4 => "apb4",
            ClockDomain::Apb1Timer => "apb1_timer",
            ClockDomain::Apb2Timer => "apb2_timer",
        }
    }
}

impl fmt::Display for ClockDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Clocks struct
// =============================================================================

/// Resolved frequency of every clock domain.
///
/// Only produced by a successful validation, so every field is within the
/// limits of the configured voltage scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    pub sysclk: Hertz,
    pub pll1_p: Hertz,
    pub pll1_q: Hertz,
    pub pll1_r: Hertz,
    pub core: Hertz,
    pub ahb: Hertz,
    pub ahb1: Hertz,
    pub ahb2: Hertz,
    pub ahb3: Hertz,
    pub ahb4: Hertz,
    pub apb1: Hertz,
    pub apb2: Hertz,
    pub apb3: Hertz,
    pub apb4: Hertz,
    pub apb1_timer: Hertz,
    pub apb2_timer: Hertz,
}

impl Clocks {
    pub const fn get(&self, domain: ClockDomain) -> Hertz {
        match domain {
            ClockDomain::Sysclk => self.sysclk,
            ClockDomain::Pll1P => self.pll1_p,
            ClockDomain::Pll1Q => self.pll1_q,
            ClockDomain::Pll1R => self.pll1_r,
            ClockDomain::Core => self.core,
            ClockDomain::Ahb => self.ahb,
            ClockDomain::Ahb1 => self.ahb1,
            ClockDomain::Ahb2 => self.ahb2,
            ClockDomain::Ahb3 => self.ahb3,
            ClockDomain::Ahb4 => self.ahb4,
            ClockDomain::Apb1 => self.apb1,
            ClockDomain::Apb2 => self.apb2,
            ClockDomain::Apb3 => self.apb3,
            ClockDomain::Apb4 => self.apb4,
            ClockDomain::Apb1Timer => self.apb1_timer,
            ClockDomain::Apb2Timer => self.apb2_timer,
        }
    }

    /// `(domain, frequency)` pairs in [`ClockDomain::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (ClockDomain, Hertz)> + '_ {
        ClockDomain::ALL.iter().map(move |&d| (d, self.get(d)))
    }
}
