//! An [`RccHal`] that prints register writes instead of performing them.

use std::convert::Infallible;

use clap::ValueEnum;
use h7a3_rcc::rcc::{
    Bus, FlashLatency, OscillatorSource, PllFactors, Prescaler, RccHal, SystemClockSource, VoltageScale,
};
use h7a3_rcc::time::Hertz;

/// Readiness flag that never sets, to rehearse a failing bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stuck {
    Voltage,
    Oscillator,
    Pll,
    Flash,
    Switch,
}

pub struct DryRun {
    stuck: Option<Stuck>,
    echo: bool,
    claimed: bool,
    pub writes: Vec<String>,
    pub polls: u32,
}

impl DryRun {
    pub fn new(stuck: Option<Stuck>, echo: bool) -> Self {
        Self {
            stuck,
            echo,
            claimed: false,
            writes: Vec::new(),
            polls: 0,
        }
    }

    fn write(&mut self, line: String) {
        if self.echo {
            println!("{:>3}  {}", self.writes.len() + 1, line);
        }
        self.writes.push(line);
    }

    fn poll(&mut self, flag: Stuck) -> nb::Result<(), Infallible> {
        self.polls += 1;
        if self.stuck == Some(flag) {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }
}

fn register(bus: Bus) -> &'static str {
    match bus {
        Bus::Core => "RCC_CDCFGR1.CDCPRE",
        Bus::Ahb => "RCC_CDCFGR1.HPRE",
        Bus::Apb1 => "RCC_CDCFGR2.CDPPRE1",
        Bus::Apb2 => "RCC_CDCFGR2.CDPPRE2",
        Bus::Apb3 => "RCC_CDCFGR1.CDPPRE",
        Bus::Apb4 => "RCC_SRDCFGR.SRDPPRE",
    }
}

impl RccHal for DryRun {
    // A dry run has its own pretend RCC.
    fn claim(&mut self) -> bool {
        !std::mem::replace(&mut self.claimed, true)
    }

    fn set_voltage_scale(&mut self, scale: VoltageScale) {
        self.write(format!("PWR_SRDCR.VOS = 0b{:02b} (VOS{})", scale.to_bits(), scale.level()));
    }

    fn poll_voltage_ready(&mut self) -> nb::Result<(), Infallible> {
        self.poll(Stuck::Voltage)
    }

    fn enable_oscillator(&mut self, oscillator: OscillatorSource) {
        let line = match oscillator {
            OscillatorSource::Hsi => "RCC_CR.HSION = 1".to_string(),
            OscillatorSource::Hse { freq, bypass } => {
                format!("RCC_CR.HSEBYP = {}, HSEON = 1 ({} MHz)", bypass as u8, freq.to_mhz())
            }
        };
        self.write(line);
    }

    fn poll_oscillator_ready(&mut self, _oscillator: OscillatorSource) -> nb::Result<(), Infallible> {
        self.poll(Stuck::Oscillator)
    }

    fn configure_pll(&mut self, oscillator: OscillatorSource, factors: &PllFactors) {
        let source = match oscillator {
            OscillatorSource::Hsi => "HSI",
            OscillatorSource::Hse { .. } => "HSE",
        };
        self.write(format!("RCC_PLLCKSELR.PLLSRC = {}, DIVM1 = {}", source, factors.m));
        self.write(format!(
            "RCC_PLLCFGR.PLL1RGE = 0b{:02b}, PLL1VCOSEL = {}, DIVP1EN = DIVQ1EN = DIVR1EN = 1",
            factors.range.to_bits(),
            factors.range.vco().to_bits()
        ));
        self.write(format!(
            "RCC_PLL1DIVR.DIVN1 = {}, DIVP1 = {}, DIVQ1 = {}, DIVR1 = {}",
            factors.n - 1,
            factors.p - 1,
            factors.q - 1,
            factors.r - 1
        ));
        self.write("RCC_CR.PLL1ON = 1".to_string());
    }

    fn poll_pll_locked(&mut self) -> nb::Result<(), Infallible> {
        self.poll(Stuck::Pll)
    }

    fn set_flash_latency(&mut self, latency: FlashLatency) {
        self.write(format!("FLASH_ACR.LATENCY = {}", latency.wait_states()));
    }

    fn poll_flash_latency(&mut self, _latency: FlashLatency) -> nb::Result<(), Infallible> {
        self.poll(Stuck::Flash)
    }

    fn set_prescaler(&mut self, prescaler: Prescaler) {
        self.write(format!(
            "{} = 0b{:b} (/{})",
            register(prescaler.bus()),
            prescaler.to_bits(),
            prescaler.divisor()
        ));
    }

    fn switch_system_clock_source(&mut self, source: SystemClockSource) {
        self.write(format!("RCC_CFGR.SW = 0b{:03b} ({:?})", source.to_bits(), source));
    }

    fn poll_system_clock_switched(&mut self, _source: SystemClockSource) -> nb::Result<(), Infallible> {
        self.poll(Stuck::Switch)
    }

    fn update_core_frequency_cache(&mut self, core: Hertz) {
        self.write(format!("core frequency cache = {} Hz", core.0));
    }
}

/// Polling needs no real time on the host.
pub struct NoDelay;

impl embedded_hal::delay::DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
