//! Clock plan file format.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use h7a3_rcc::rcc::{
    AhbPrescaler, ApbPrescaler, ConfigBuilder, OscillatorSource, PllFactors, PllInputRange, VoltageScale,
};
use h7a3_rcc::time::Hertz;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub oscillator: Oscillator,
    pub pll: Pll,
    /// VOS level, 0 is the highest voltage.
    #[serde(default)]
    pub voltage_scale: u8,
    #[serde(default)]
    pub prescalers: Prescalers,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Hsi,
    Hse,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Oscillator {
    pub source: Source,
    /// HSE frequency in Hz.
    pub frequency: Option<u32>,
    #[serde(default)]
    pub bypass: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum Range {
    #[serde(rename = "1-2")]
    MHz1_2,
    #[serde(rename = "2-4")]
    MHz2_4,
    #[serde(rename = "4-8")]
    MHz4_8,
    #[serde(rename = "8-16")]
    MHz8_16,
}

impl From<Range> for PllInputRange {
    fn from(range: Range) -> Self {
        match range {
            Range::MHz1_2 => PllInputRange::MHz1_2,
            Range::MHz2_4 => PllInputRange::MHz2_4,
            Range::MHz4_8 => PllInputRange::MHz4_8,
            Range::MHz8_16 => PllInputRange::MHz8_16,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pll {
    /// Input band in MHz; picked from `input / m` when omitted.
    pub range: Option<Range>,
    pub m: u8,
    pub n: u16,
    pub p: u8,
    pub q: u8,
    pub r: u8,
}

/// Divisors, not register encodings.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Prescalers {
    pub core: u32,
    pub ahb: u32,
    pub apb1: u32,
    pub apb2: u32,
    pub apb3: u32,
    pub apb4: u32,
}

impl Default for Prescalers {
    fn default() -> Self {
        Self {
            core: 1,
            ahb: 1,
            apb1: 2,
            apb2: 2,
            apb3: 2,
            apb4: 2,
        }
    }
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_hjson::from_str(text)?)
    }

    pub fn to_builder(&self) -> Result<ConfigBuilder> {
        let oscillator = match self.oscillator.source {
            Source::Hsi => {
                if self.oscillator.frequency.is_some() {
                    bail!("oscillator.frequency is only valid with source \"hse\"");
                }
                OscillatorSource::Hsi
            }
            Source::Hse => OscillatorSource::Hse {
                freq: Hertz(
                    self.oscillator
                        .frequency
                        .context("oscillator.frequency is required with source \"hse\"")?,
                ),
                bypass: self.oscillator.bypass,
            },
        };

        let range = match self.pll.range {
            Some(range) => range.into(),
            None => {
                let input = oscillator.frequency().0;
                let reference = Hertz(input / u32::from(self.pll.m.max(1)));
                PllInputRange::for_reference(reference)
                    .with_context(|| format!("no PLL input range contains {} (input / m)", reference))?
            }
        };
        let pll = PllFactors::new(range, self.pll.m, self.pll.n, self.pll.p, self.pll.q, self.pll.r);

        let voltage_scale = VoltageScale::from_level(self.voltage_scale)
            .with_context(|| format!("voltage_scale must be 0..=3, got {}", self.voltage_scale))?;

        let p = &self.prescalers;
        Ok(ConfigBuilder::new()
            .with_oscillator(oscillator)
            .with_pll(pll)
            .with_voltage_scale(voltage_scale)
            .with_core_div(ahb_prescaler("core", p.core)?)
            .with_ahb_div(ahb_prescaler("ahb", p.ahb)?)
            .with_apb1_div(apb_prescaler("apb1", p.apb1)?)
            .with_apb2_div(apb_prescaler("apb2", p.apb2)?)
            .with_apb3_div(apb_prescaler("apb3", p.apb3)?)
            .with_apb4_div(apb_prescaler("apb4", p.apb4)?))
    }
}

fn ahb_prescaler(name: &str, div: u32) -> Result<AhbPrescaler> {
    AhbPrescaler::from_divisor(div)
        .ok_or_else(|| anyhow!("prescalers.{name} must be one of 1, 2, 4, 8, 16, 64, 128, 256, 512, got {div}"))
}

fn apb_prescaler(name: &str, div: u32) -> Result<ApbPrescaler> {
    ApbPrescaler::from_divisor(div)
        .ok_or_else(|| anyhow!("prescalers.{name} must be one of 1, 2, 4, 8, 16, got {div}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUCLEO: &str = r#"{
        "oscillator": { "source": "hse", "frequency": 8000000, "bypass": true },
        "pll": { "range": "2-4", "m": 4, "n": 280, "p": 2, "q": 2, "r": 2 },
        "voltage_scale": 0
    }"#;

    #[test]
    fn nucleo_plan() {
        let builder = Plan::parse(NUCLEO).unwrap().to_builder().unwrap();
        let clocks = builder.validate().unwrap();
        assert_eq!(clocks.sysclk, Hertz::mhz(280));
        assert_eq!(clocks.apb1, Hertz::mhz(140));
    }

    #[test]
    fn range_from_reference() {
        let plan = Plan::parse(
            r#"{
                "oscillator": { "source": "hsi" },
                "pll": { "m": 4, "n": 35, "p": 2, "q": 2, "r": 2 }
            }"#,
        )
        .unwrap();
        let builder = plan.to_builder().unwrap();
        assert_eq!(builder.pll.range, PllInputRange::MHz8_16);
        assert_eq!(builder.validate().map(|c| c.sysclk), Ok(Hertz::mhz(280)));
    }

    #[test]
    fn bad_prescaler() {
        let plan = Plan::parse(
            r#"{
                "oscillator": { "source": "hsi" },
                "pll": { "m": 4, "n": 35, "p": 2, "q": 2, "r": 2 },
                "prescalers": { "ahb": 32 }
            }"#,
        )
        .unwrap();
        assert!(plan.to_builder().is_err());
    }

    #[test]
    fn hse_needs_frequency() {
        let plan = Plan::parse(
            r#"{
                "oscillator": { "source": "hse" },
                "pll": { "m": 4, "n": 280, "p": 2, "q": 2, "r": 2 }
            }"#,
        )
        .unwrap();
        assert!(plan.to_builder().is_err());
    }
}
