//! Clock configuration and derivation of the clock tree.

use super::{
    AhbPrescaler, ApbPrescaler, ClockDomain, Clocks, Error, FlashLatency, OscillatorSource,
    PllFactors, PllFault, PllInputRange, Prescaler, VoltageScale, HSE_MAX, HSE_MIN,
};
use crate::time::Hertz;

/// Clock configuration
///
/// Defaults to the HSI, PLL1 at 280 MHz and VOS0:
/// - sysclk = core = AHB = 64 MHz / 4 * 35 / 2 = 280 MHz
/// - APB1..APB4 = 280 MHz / 2 = 140 MHz
/// - APB1/APB2 timers = 280 MHz
///
/// sysclk is always PLL1 P.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct ConfigBuilder {
    /// Oscillator feeding PLL1
    pub oscillator: OscillatorSource,
    /// PLL1 settings
    pub pll: PllFactors,
    /// Core voltage level; must cover the sysclk
    pub voltage_scale: VoltageScale,
    /// sysclk to CPU clock (CDCPRE)
    pub core_div: AhbPrescaler,
    /// CPU clock to AHB (HPRE)
    pub ahb_div: AhbPrescaler,
    pub apb1_div: ApbPrescaler,
    pub apb2_div: ApbPrescaler,
    pub apb3_div: ApbPrescaler,
    pub apb4_div: ApbPrescaler,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub const fn new() -> Self {
        Self {
            oscillator: OscillatorSource::Hsi,
            pll: PllFactors::new(PllInputRange::MHz8_16, 4, 35, 2, 2, 2),
            voltage_scale: VoltageScale::Scale0,
            core_div: AhbPrescaler::Div1,
            ahb_div: AhbPrescaler::Div1,
            apb1_div: ApbPrescaler::Div2,
            apb2_div: ApbPrescaler::Div2,
            apb3_div: ApbPrescaler::Div2,
            apb4_div: ApbPrescaler::Div2,
        }
    }

    pub const fn with_oscillator(mut self, oscillator: OscillatorSource) -> Self {
        self.oscillator = oscillator;
        self
    }

    pub const fn with_pll(mut self, pll: PllFactors) -> Self {
        self.pll = pll;
        self
    }

    pub const fn with_voltage_scale(mut self, voltage_scale: VoltageScale) -> Self {
        self.voltage_scale = voltage_scale;
        self
    }

    pub const fn with_core_div(mut self, core_div: AhbPrescaler) -> Self {
        self.core_div = core_div;
        self
    }

    pub const fn with_ahb_div(mut self, ahb_div: AhbPrescaler) -> Self {
        self.ahb_div = ahb_div;
        self
    }

    pub const fn with_apb1_div(mut self, apb1_div: ApbPrescaler) -> Self {
        self.apb1_div = apb1_div;
        self
    }

    pub const fn with_apb2_div(mut self, apb2_div: ApbPrescaler) -> Self {
        self.apb2_div = apb2_div;
        self
    }

    pub const fn with_apb3_div(mut self, apb3_div: ApbPrescaler) -> Self {
        self.apb3_div = apb3_div;
        self
    }

    pub const fn with_apb4_div(mut self, apb4_div: ApbPrescaler) -> Self {
        self.apb4_div = apb4_div;
        self
    }

    /// Prescaler writes in the order bring-up issues them.
    pub const fn prescalers(&self) -> [Prescaler; 6] {
        [
            Prescaler::Core(self.core_div),
            Prescaler::Ahb(self.ahb_div),
            Prescaler::Apb1(self.apb1_div),
            Prescaler::Apb2(self.apb2_div),
            Prescaler::Apb3(self.apb3_div),
            Prescaler::Apb4(self.apb4_div),
        ]
    }

    /// Compute every domain frequency. Only the oscillator and PLL1 are
    /// checked; bus limits are left to [`validate`](Self::validate).
    pub const fn derive(&self) -> Result<Clocks, Error> {
        if let OscillatorSource::Hse { freq, .. } = self.oscillator {
            if freq.0 < HSE_MIN.0 || freq.0 > HSE_MAX.0 {
                return Err(Error::OscillatorOutOfRange(freq));
            }
        }

        let pll = const_try!(self.pll.outputs(self.oscillator.frequency()));

        let sysclk = pll.p;
        let core = const_try!(divide(sysclk, self.core_div.divisor(), ClockDomain::Core));
        let ahb = const_try!(divide(core, self.ahb_div.divisor(), ClockDomain::Ahb));
        let apb1 = const_try!(divide(ahb, self.apb1_div.divisor(), ClockDomain::Apb1));
        let apb2 = const_try!(divide(ahb, self.apb2_div.divisor(), ClockDomain::Apb2));
        let apb3 = const_try!(divide(ahb, self.apb3_div.divisor(), ClockDomain::Apb3));
        let apb4 = const_try!(divide(ahb, self.apb4_div.divisor(), ClockDomain::Apb4));

        Ok(Clocks {
            sysclk,
            pll1_p: pll.p,
            pll1_q: pll.q,
            pll1_r: pll.r,
            core,
            ahb,
            ahb1: ahb,
            ahb2: ahb,
            ahb3: ahb,
            ahb4: ahb,
            apb1,
            apb2,
            apb3,
            apb4,
            apb1_timer: Hertz(apb1.0 * self.apb1_div.timer_multiplier()),
            apb2_timer: Hertz(apb2.0 * self.apb2_div.timer_multiplier()),
        })
    }

    /// Derive the clock tree and check every domain against the limits of
    /// the configured voltage scale.
    pub const fn validate(&self) -> Result<Clocks, Error> {
        let clocks = const_try!(self.derive());

        let required = const_try!(VoltageScale::required_for(clocks.sysclk));
        if !self.voltage_scale.covers(required) {
            return Err(Error::VoltageScaleMismatch {
                required,
                configured: self.voltage_scale,
            });
        }

        let max = self.voltage_scale.max_sysclk();
        let max_apb = self.voltage_scale.max_apb();
        let mut i = 0;
        while i < ClockDomain::ALL.len() {
            let domain = ClockDomain::ALL[i];
            let limit = match domain {
                ClockDomain::Apb1 | ClockDomain::Apb2 | ClockDomain::Apb3 | ClockDomain::Apb4 => max_apb,
                _ => max,
            };
            let freq = clocks.get(domain);
            if freq.0 > limit.0 {
                return Err(Error::FrequencyOutOfRange { domain, freq, max: limit });
            }
            i += 1;
        }

        const_try!(FlashLatency::for_frequency(clocks.ahb, self.voltage_scale));

        Ok(clocks)
    }

    /// Validate the clock configuration at compile time.
    ///
    /// Panics with a descriptive message if the configuration is invalid.
    /// Use inside `const { }` blocks to get compile-time errors.
    ///
    /// Note: Uses `::core::panic!` to bypass defmt's panic override,
    /// which is not const-compatible.
    pub const fn check(&self) {
        match self.validate() {
            Ok(_) => {}
            Err(Error::InvalidPllFactors(PllFault::DividerOutOfRange(_))) => {
                ::core::panic!("PLL1 divider outside its register range")
            }
            Err(Error::InvalidPllFactors(PllFault::InputOutOfRange { .. })) => {
                ::core::panic!("PLL1 reference (input / m) is not an integer inside the selected input range")
            }
            Err(Error::InvalidPllFactors(PllFault::VcoOutOfRange { .. })) => {
                ::core::panic!("PLL1 VCO frequency outside the VCO range of the input range")
            }
            Err(Error::InvalidPllFactors(PllFault::InexactOutput(_))) => {
                ::core::panic!("PLL1 VCO frequency is not a multiple of an output divider")
            }
            Err(Error::InexactDivision { .. }) => {
                ::core::panic!("bus prescaler does not divide its parent clock exactly")
            }
            Err(Error::OscillatorOutOfRange(_)) => ::core::panic!("HSE frequency must be within 4-50 MHz"),
            Err(Error::FrequencyOutOfRange {
                domain: ClockDomain::Pll1P | ClockDomain::Pll1Q | ClockDomain::Pll1R,
                ..
            }) => ::core::panic!("PLL1 output exceeds 280 MHz"),
            Err(Error::FrequencyOutOfRange {
                domain: ClockDomain::Sysclk,
                ..
            }) => ::core::panic!("sysclk exceeds 280 MHz"),
            Err(Error::FrequencyOutOfRange {
                domain: ClockDomain::Apb1 | ClockDomain::Apb2 | ClockDomain::Apb3 | ClockDomain::Apb4,
                ..
            }) => ::core::panic!("APB clock exceeds the voltage scale limit, increase its prescaler"),
            Err(Error::FrequencyOutOfRange { .. }) => {
                ::core::panic!("clock exceeds the voltage scale limit")
            }
            Err(Error::VoltageScaleMismatch { .. }) => {
                ::core::panic!("voltage scale too low for sysclk")
            }
            Err(_) => ::core::panic!("invalid clock configuration"),
        }
    }

    /// Validate and return a [`Config`]. Use in `const { }` blocks for compile-time checking.
    ///
    /// ```rust,ignore
    /// const CONFIG: rcc::Config = rcc::ConfigBuilder::new().with_pll(...).checked();
    /// ```
    pub const fn checked(self) -> Config {
        self.check();
        match self.validate() {
            Ok(clocks) => Config { builder: self, clocks },
            Err(_) => ::core::panic!("invalid clock configuration"),
        }
    }

    /// Runtime counterpart of [`checked`](Self::checked).
    pub const fn build(self) -> Result<Config, Error> {
        let clocks = const_try!(self.validate());
        Ok(Config { builder: self, clocks })
    }
}

/// `parent / divisor`, refusing to round.
const fn divide(parent: Hertz, divisor: u32, domain: ClockDomain) -> Result<Hertz, Error> {
    if parent.0 % divisor != 0 {
        return Err(Error::InexactDivision { domain, parent, divisor });
    }
    Ok(Hertz(parent.0 / divisor))
}

/// A validated clock configuration.
///
/// Can only be constructed via [`ConfigBuilder::checked()`] or
/// [`ConfigBuilder::build()`], so the cached [`Clocks`] are always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    builder: ConfigBuilder,
    clocks: Clocks,
}

impl Config {
    pub const fn builder(&self) -> &ConfigBuilder {
        &self.builder
    }

    /// Frequencies this configuration produces once applied.
    pub const fn clocks(&self) -> &Clocks {
        &self.clocks
    }

    /// Flash wait states for the target AHB frequency.
    pub const fn flash_latency(&self) -> FlashLatency {
        match FlashLatency::for_frequency(self.clocks.ahb, self.builder.voltage_scale) {
            Ok(latency) => latency,
            // validate() already rejected this case
            Err(_) => FlashLatency::RESET,
        }
    }
}
