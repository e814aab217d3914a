//! One-shot clock bring-up sequence.
//!
//! The order is fixed by the hardware:
//!
//! 1. raise the core voltage (VOS) for the target sysclk
//! 2. start the oscillator and wait until it is stable
//! 3. configure PLL1 against it and wait for lock
//! 4. raise flash wait states to cover the target AHB frequency
//! 5. program every bus prescaler
//! 6. switch sysclk to PLL1 P and wait for the acknowledge
//! 7. relax flash wait states if the target needs fewer than reset
//! 8. publish the new core frequency
//!
//! Every step is irreversible. A failure leaves the clock tree half
//! configured, there is no fallback.

use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal_1::delay::DelayNs;

use super::{
    ClockSource, Clocks, Config, Error, FlashLatency, OscillatorSource, Peripheral, PllFactors,
    Prescaler, SystemClockSource, Transition, VoltageScale,
};
use crate::time::Hertz;

/// Default number of polls before a readiness wait gives up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 10_000;
/// Default pause between two polls.
pub const DEFAULT_POLL_INTERVAL_US: u32 = 1;

/// Set by the first bring-up of the chip's RCC.
static RCC_CLAIMED: AtomicBool = AtomicBool::new(false);

/// `true` for the first caller only.
pub(crate) fn claim_rcc() -> bool {
    !RCC_CLAIMED.swap(true, Ordering::AcqRel)
}

/// Register-level operations bring-up needs from the RCC, PWR and FLASH blocks.
///
/// Writers only issue the write; the matching `poll_*` reports completion
/// with `Err(nb::Error::WouldBlock)` until the hardware acknowledges it.
pub trait RccHal {
    /// Reserve the RCC for one bring-up; `false` once any bring-up started.
    ///
    /// The chip has a single RCC, so the default is process-wide.
    fn claim(&mut self) -> bool {
        claim_rcc()
    }

    /// PWR_SRDCR.VOS
    fn set_voltage_scale(&mut self, scale: VoltageScale);
    /// PWR_SRDCR.VOSRDY
    fn poll_voltage_ready(&mut self) -> nb::Result<(), Infallible>;

    /// RCC_CR.HSION / HSEON (+ HSEBYP)
    fn enable_oscillator(&mut self, oscillator: OscillatorSource);
    /// RCC_CR.HSIRDY / HSERDY
    fn poll_oscillator_ready(&mut self, oscillator: OscillatorSource) -> nb::Result<(), Infallible>;

    /// PLLCKSELR, PLLCFGR and PLL1DIVR, then RCC_CR.PLL1ON.
    fn configure_pll(&mut self, oscillator: OscillatorSource, factors: &PllFactors);
    /// RCC_CR.PLL1RDY
    fn poll_pll_locked(&mut self) -> nb::Result<(), Infallible>;

    /// FLASH_ACR.LATENCY
    fn set_flash_latency(&mut self, latency: FlashLatency);
    /// FLASH_ACR.LATENCY read back equal to `latency`.
    fn poll_flash_latency(&mut self, latency: FlashLatency) -> nb::Result<(), Infallible>;

    fn set_prescaler(&mut self, prescaler: Prescaler);

    /// RCC_CFGR.SW
    fn switch_system_clock_source(&mut self, source: SystemClockSource);
    /// RCC_CFGR.SWS equal to `source`.
    fn poll_system_clock_switched(&mut self, source: SystemClockSource) -> nb::Result<(), Infallible>;

    /// Publish the CPU frequency to timing code.
    fn update_core_frequency_cache(&mut self, core: Hertz) {
        super::set_core_frequency(core);
    }
}

/// Progress of a [`BringUp`]. Declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringUpState {
    Idle,
    VoltageScaled,
    OscillatorEnabled,
    PllLocked,
    FlashLatencySet,
    PrescalersSet,
    SystemClockSwitched,
    CoreFrequencyCacheUpdated,
    Ready,
    /// A step failed. Terminal.
    Faulted,
}

/// Applies a validated [`Config`] to the hardware, once.
#[derive(Debug)]
pub struct BringUp {
    config: Config,
    state: BringUpState,
    poll_attempts: u32,
    poll_interval_us: u32,
}

struct Timeout;

impl BringUp {
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            state: BringUpState::Idle,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
        }
    }

    /// Number of polls per readiness wait, at least 1.
    pub const fn with_poll_attempts(mut self, attempts: u32) -> Self {
        self.poll_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    pub const fn with_poll_interval_us(mut self, interval_us: u32) -> Self {
        self.poll_interval_us = interval_us;
        self
    }

    pub const fn state(&self) -> BringUpState {
        self.state
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Run the whole sequence inside a critical section.
    ///
    /// Can only succeed once per RCC: any later call, from this or another
    /// [`BringUp`] and including after a failure, returns
    /// [`Error::ReentrantBringUp`] without touching the hardware.
    pub fn run<H: RccHal, D: DelayNs>(&mut self, hw: &mut H, delay: &mut D) -> Result<Clocks, Error> {
        if self.state != BringUpState::Idle {
            warn!("rcc: bring-up requested again in state {:?}", self.state);
            return Err(Error::ReentrantBringUp);
        }
        if !hw.claim() {
            warn!("rcc: hardware already brought up by another sequencer");
            return Err(Error::ReentrantBringUp);
        }

        critical_section::with(|_cs| {
            let result = self.sequence(hw, delay);
            if let Err(e) = result {
                error!("rcc: bring-up failed after {:?}: {:?}", self.state, e);
                self.state = BringUpState::Faulted;
            }
            result
        })
    }

    fn sequence<H: RccHal, D: DelayNs>(&mut self, hw: &mut H, delay: &mut D) -> Result<Clocks, Error> {
        let builder = *self.config.builder();
        let clocks = *self.config.clocks();
        let target = self.config.flash_latency();
        let (attempts, interval) = (self.poll_attempts, self.poll_interval_us);

        debug!("rcc: voltage scale VOS{}", builder.voltage_scale.level());
        hw.set_voltage_scale(builder.voltage_scale);
        poll_until(attempts, interval, delay, || hw.poll_voltage_ready())
            .map_err(|Timeout| Error::SwitchTimeout(Transition::VoltageScale))?;
        self.advance(BringUpState::VoltageScaled);

        let oscillator = builder.oscillator;
        hw.enable_oscillator(oscillator);
        poll_until(attempts, interval, delay, || hw.poll_oscillator_ready(oscillator))
            .map_err(|Timeout| Error::ClockSourceNotReady(oscillator.clock_source()))?;
        self.advance(BringUpState::OscillatorEnabled);

        hw.configure_pll(oscillator, &builder.pll);
        poll_until(attempts, interval, delay, || hw.poll_pll_locked())
            .map_err(|Timeout| Error::ClockSourceNotReady(ClockSource::Pll1))?;
        self.advance(BringUpState::PllLocked);

        // Never below reset latency while still running from the reset clock.
        let latency = target.max(FlashLatency::RESET);
        set_flash_latency(hw, delay, latency, attempts, interval)?;
        self.advance(BringUpState::FlashLatencySet);

        for prescaler in builder.prescalers() {
            trace!("rcc: {:?} /{}", prescaler.bus(), prescaler.divisor());
            hw.set_prescaler(prescaler);
        }
        self.advance(BringUpState::PrescalersSet);

        let source = SystemClockSource::Pll1;
        hw.switch_system_clock_source(source);
        poll_until(attempts, interval, delay, || hw.poll_system_clock_switched(source))
            .map_err(|Timeout| Error::SwitchTimeout(Transition::SystemClock))?;
        self.advance(BringUpState::SystemClockSwitched);

        if target < latency {
            set_flash_latency(hw, delay, target, attempts, interval)?;
        }

        hw.update_core_frequency_cache(clocks.core);
        self.advance(BringUpState::CoreFrequencyCacheUpdated);

        self.advance(BringUpState::Ready);
        info!("rcc: sysclk {} Hz, ahb {} Hz", clocks.sysclk.0, clocks.ahb.0);
        Ok(clocks)
    }

    fn advance(&mut self, state: BringUpState) {
        trace!("rcc: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// The applied clock tree, once bring-up is complete.
    pub fn clocks(&self) -> Result<&Clocks, Error> {
        match self.state {
            BringUpState::Ready => Ok(self.config.clocks()),
            _ => Err(Error::DomainNotReady),
        }
    }

    /// Kernel clock of `peripheral`, once bring-up is complete.
    pub fn frequency_of(&self, peripheral: Peripheral) -> Result<Hertz, Error> {
        self.clocks().map(|clocks| clocks.peripheral(peripheral))
    }
}

fn set_flash_latency<H: RccHal, D: DelayNs>(
    hw: &mut H,
    delay: &mut D,
    latency: FlashLatency,
    attempts: u32,
    interval_us: u32,
) -> Result<(), Error> {
    debug!("rcc: flash latency {} WS", latency.wait_states());
    hw.set_flash_latency(latency);
    poll_until(attempts, interval_us, delay, || hw.poll_flash_latency(latency))
        .map_err(|Timeout| Error::SwitchTimeout(Transition::FlashLatency))
}

/// Poll `ready` up to `attempts` times, pausing `interval_us` after each miss.
fn poll_until<D: DelayNs>(
    attempts: u32,
    interval_us: u32,
    delay: &mut D,
    mut ready: impl FnMut() -> nb::Result<(), Infallible>,
) -> Result<(), Timeout> {
    for _ in 0..attempts {
        match ready() {
            Ok(()) => return Ok(()),
            Err(nb::Error::WouldBlock) => delay.delay_us(interval_us),
            Err(nb::Error::Other(never)) => match never {},
        }
    }
    Err(Timeout)
}
