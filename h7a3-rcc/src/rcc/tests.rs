extern crate std;

use core::convert::Infallible;
use std::vec::Vec;

use embedded_hal_1::delay::DelayNs;

use super::*;
use crate::time::Hertz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    VoltageScale(VoltageScale),
    Oscillator(OscillatorSource),
    Pll(PllFactors),
    FlashLatency(u8),
    Prescaler(Bus),
    Switch(SystemClockSource),
    CoreFrequency(Hertz),
}

/// Records every write; each flag becomes ready after a set number of polls.
struct MockRcc {
    ops: Vec<Op>,
    voltage_polls: Option<u32>,
    oscillator_polls: Option<u32>,
    pll_polls: Option<u32>,
    switch_polls: Option<u32>,
    oscillator_attempts: u32,
    flash: Option<FlashLatency>,
    claimed: bool,
}

impl MockRcc {
    fn new() -> Self {
        Self {
            ops: Vec::new(),
            voltage_polls: Some(2),
            oscillator_polls: Some(3),
            pll_polls: Some(5),
            switch_polls: Some(1),
            oscillator_attempts: 0,
            flash: None,
            claimed: false,
        }
    }

    fn position(&self, f: impl Fn(&Op) -> bool) -> usize {
        self.ops.iter().position(f).unwrap()
    }
}

/// `None` never becomes ready, `Some(n)` after n misses.
fn countdown(remaining: &mut Option<u32>) -> nb::Result<(), Infallible> {
    match remaining {
        None => Err(nb::Error::WouldBlock),
        Some(0) => Ok(()),
        Some(n) => {
            *n -= 1;
            Err(nb::Error::WouldBlock)
        }
    }
}

impl RccHal for MockRcc {
    // One RCC per mock, so tests can run in parallel.
    fn claim(&mut self) -> bool {
        !core::mem::replace(&mut self.claimed, true)
    }

    fn set_voltage_scale(&mut self, scale: VoltageScale) {
        self.ops.push(Op::VoltageScale(scale));
    }

    fn poll_voltage_ready(&mut self) -> nb::Result<(), Infallible> {
        countdown(&mut self.voltage_polls)
    }

    fn enable_oscillator(&mut self, oscillator: OscillatorSource) {
        self.ops.push(Op::Oscillator(oscillator));
    }

    fn poll_oscillator_ready(&mut self, _oscillator: OscillatorSource) -> nb::Result<(), Infallible> {
        self.oscillator_attempts += 1;
        countdown(&mut self.oscillator_polls)
    }

    fn configure_pll(&mut self, _oscillator: OscillatorSource, factors: &PllFactors) {
        self.ops.push(Op::Pll(*factors));
    }

    fn poll_pll_locked(&mut self) -> nb::Result<(), Infallible> {
        countdown(&mut self.pll_polls)
    }

    fn set_flash_latency(&mut self, latency: FlashLatency) {
        self.ops.push(Op::FlashLatency(latency.wait_states()));
        self.flash = Some(latency);
    }

    fn poll_flash_latency(&mut self, latency: FlashLatency) -> nb::Result<(), Infallible> {
        if self.flash == Some(latency) {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn set_prescaler(&mut self, prescaler: Prescaler) {
        self.ops.push(Op::Prescaler(prescaler.bus()));
    }

    fn switch_system_clock_source(&mut self, source: SystemClockSource) {
        self.ops.push(Op::Switch(source));
    }

    fn poll_system_clock_switched(&mut self, _source: SystemClockSource) -> nb::Result<(), Infallible> {
        countdown(&mut self.switch_polls)
    }

    // The real cache is process-wide; keep tests independent of it.
    fn update_core_frequency_cache(&mut self, core: Hertz) {
        self.ops.push(Op::CoreFrequency(core));
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// NUCLEO-H7A3ZI-Q: 8 MHz from the ST-LINK MCO, 2 MHz reference, 560 MHz VCO.
fn hse_280() -> ConfigBuilder {
    ConfigBuilder::new()
        .with_oscillator(OscillatorSource::Hse {
            freq: Hertz::mhz(8),
            bypass: true,
        })
        .with_pll(PllFactors::new(PllInputRange::MHz2_4, 4, 280, 2, 2, 2))
}

/// 64 MHz sysclk from a 512 MHz VCO, low enough for VOS3 and 2 wait states.
fn hsi_64() -> ConfigBuilder {
    ConfigBuilder::new()
        .with_pll(PllFactors::new(PllInputRange::MHz2_4, 16, 128, 8, 8, 8))
        .with_voltage_scale(VoltageScale::Scale3)
}

// =============================================================================
// Frequency model
// =============================================================================

#[test]
fn derive_full_speed_from_hse() {
    let clocks = hse_280().validate().unwrap();
    assert_eq!(clocks.sysclk, Hertz::mhz(280));
    assert_eq!(clocks.pll1_q, Hertz::mhz(280));
    assert_eq!(clocks.core, Hertz::mhz(280));
    assert_eq!(clocks.ahb, Hertz::mhz(280));
    assert_eq!(clocks.ahb4, Hertz::mhz(280));
    assert_eq!(clocks.apb1, Hertz::mhz(140));
    assert_eq!(clocks.apb2, Hertz::mhz(140));
    assert_eq!(clocks.apb1_timer, Hertz::mhz(280));
    assert_eq!(clocks.apb2_timer, Hertz::mhz(280));

    let pll = hse_280().pll.outputs(Hertz::mhz(8)).unwrap();
    assert_eq!(pll.reference, Hertz::mhz(2));
    assert_eq!(pll.vco, Hertz::mhz(560));
}

#[test]
fn derive_full_speed_from_hsi() {
    let clocks = ConfigBuilder::new().validate().unwrap();
    assert_eq!(clocks.sysclk, Hertz::mhz(280));
    assert_eq!(clocks.apb1, Hertz::mhz(140));
    assert_eq!(clocks.apb1_timer, Hertz::mhz(280));
}

#[test]
fn hse_with_hsi_factors_is_rejected() {
    // 8 MHz / 4 = 2 MHz, x35 = 70 MHz VCO
    let builder = hse_280().with_pll(PllFactors::new(PllInputRange::MHz2_4, 4, 35, 2, 2, 2));
    assert_eq!(
        builder.validate(),
        Err(Error::InvalidPllFactors(PllFault::VcoOutOfRange {
            vco: Hertz::mhz(70)
        }))
    );
}

#[test]
fn reference_outside_declared_range() {
    let builder = hse_280().with_pll(PllFactors::new(PllInputRange::MHz4_8, 4, 280, 2, 2, 2));
    assert_eq!(
        builder.validate(),
        Err(Error::InvalidPllFactors(PllFault::InputOutOfRange {
            reference: Hertz::mhz(2)
        }))
    );
}

#[test]
fn timer_doubling() {
    let clocks = hse_280()
        .with_apb1_div(ApbPrescaler::Div4)
        .with_apb2_div(ApbPrescaler::Div1)
        .with_ahb_div(AhbPrescaler::Div2)
        .validate()
        .unwrap();
    assert_eq!(clocks.ahb, Hertz::mhz(140));
    assert_eq!(clocks.apb1, Hertz::mhz(35));
    assert_eq!(clocks.apb1_timer, Hertz::mhz(70));
    assert_eq!(clocks.apb2, Hertz::mhz(140));
    assert_eq!(clocks.apb2_timer, Hertz::mhz(140));
}

#[test]
fn apb_above_limit_is_rejected() {
    assert_eq!(
        hse_280().with_apb3_div(ApbPrescaler::Div1).validate(),
        Err(Error::FrequencyOutOfRange {
            domain: ClockDomain::Apb3,
            freq: Hertz::mhz(280),
            max: Hertz::mhz(140),
        })
    );
}

#[test]
fn voltage_scale_too_low() {
    assert_eq!(
        hse_280().with_voltage_scale(VoltageScale::Scale1).validate(),
        Err(Error::VoltageScaleMismatch {
            required: VoltageScale::Scale0,
            configured: VoltageScale::Scale1,
        })
    );
}

#[test]
fn hse_frequency_limits() {
    let builder = hse_280().with_oscillator(OscillatorSource::Hse {
        freq: Hertz::mhz(52),
        bypass: false,
    });
    assert_eq!(builder.validate(), Err(Error::OscillatorOutOfRange(Hertz::mhz(52))));
}

#[test]
fn accepted_configurations_respect_bus_limits() {
    let apb = [ApbPrescaler::Div1, ApbPrescaler::Div2, ApbPrescaler::Div4];
    for n in (200..=280).step_by(8) {
        for &div in &apb {
            let builder = hse_280()
                .with_pll(PllFactors::new(PllInputRange::MHz2_4, 4, n, 2, 2, 2))
                .with_apb1_div(div)
                .with_apb2_div(div)
                .with_apb3_div(div)
                .with_apb4_div(div);
            if let Ok(clocks) = builder.validate() {
                assert!(clocks.sysclk <= Hertz::mhz(280));
                assert!(clocks.apb1 <= Hertz::mhz(140));
                assert!(clocks.apb4 <= Hertz::mhz(140));
            }
        }
    }
}

#[test]
fn bus_division_must_be_exact() {
    // 2 MHz * 275 / 2 = 275 MHz sysclk, APB /2 would be 137.5 MHz
    let builder = hse_280().with_pll(PllFactors::new(PllInputRange::MHz2_4, 4, 275, 2, 2, 2));
    assert_eq!(
        builder.validate(),
        Err(Error::InexactDivision {
            domain: ClockDomain::Apb1,
            parent: Hertz::mhz(275),
            divisor: 2,
        })
    );

    let apb1_undivided = builder.with_apb1_div(ApbPrescaler::Div1);
    assert!(matches!(
        apb1_undivided.validate(),
        Err(Error::InexactDivision {
            domain: ClockDomain::Apb2,
            ..
        })
    ));
}

#[test]
fn pll_output_must_be_exact() {
    // 64 MHz / 4 * 35 = 560 MHz VCO, /6 would be 93.33 MHz
    let builder = ConfigBuilder::new().with_pll(PllFactors::new(PllInputRange::MHz8_16, 4, 35, 6, 2, 2));
    assert_eq!(
        builder.validate(),
        Err(Error::InvalidPllFactors(PllFault::InexactOutput(PllDivider::P)))
    );
}

/// Independent statement of PLL1 legality for an 8 MHz input.
fn pll_is_legal(f: &PllFactors, input: Hertz) -> bool {
    let dividers = (1..=63).contains(&f.m)
        && (4..=512).contains(&f.n)
        && (f.p == 1 || (f.p % 2 == 0 && (2..=128).contains(&f.p)))
        && (1..=128).contains(&f.q)
        && (1..=128).contains(&f.r);
    if !dividers || input.0 % f.m as u32 != 0 {
        return false;
    }

    let reference = input.0 / f.m as u32;
    let (ref_min, ref_max) = f.range.bounds();
    let vco = reference as u64 * f.n as u64;
    let (vco_min, vco_max) = f.range.vco().bounds();
    let outputs_ok = [f.p, f.q, f.r]
        .iter()
        .all(|&d| vco % d as u64 == 0 && vco / d as u64 <= PLL_OUT_MAX.0 as u64);

    (ref_min.0..=ref_max.0).contains(&reference)
        && (vco_min.0 as u64..=vco_max.0 as u64).contains(&vco)
        && outputs_ok
}

#[test]
fn pll_sweep_from_8mhz() {
    let input = Hertz::mhz(8);
    let ranges = [
        PllInputRange::MHz1_2,
        PllInputRange::MHz2_4,
        PllInputRange::MHz4_8,
        PllInputRange::MHz8_16,
    ];
    let dividers = [0u8, 1, 2, 3, 4, 7, 8, 128, 129];

    for range in ranges {
        for m in 0..=64u8 {
            for n in 3..=513u16 {
                for p in dividers {
                    let factors = PllFactors::new(range, m, n, p, 2, 2);
                    match factors.outputs(input) {
                        Ok(out) => {
                            let (ref_min, ref_max) = range.bounds();
                            let (vco_min, vco_max) = range.vco().bounds();
                            assert!(ref_min <= out.reference && out.reference <= ref_max, "{:?}", factors);
                            assert!(vco_min <= out.vco && out.vco <= vco_max, "{:?}", factors);
                            assert!(out.p <= PLL_OUT_MAX && out.q <= PLL_OUT_MAX && out.r <= PLL_OUT_MAX);
                            assert!(pll_is_legal(&factors, input), "{:?}", factors);
                        }
                        Err(_) => assert!(!pll_is_legal(&factors, input), "{:?}", factors),
                    }
                }
            }
        }
    }
}

#[test]
fn validation_is_idempotent() {
    let builder = hse_280();
    assert_eq!(builder.validate(), builder.validate());
    let bad = builder.with_apb1_div(ApbPrescaler::Div1);
    assert_eq!(bad.validate(), bad.validate());
    assert_eq!(builder, hse_280());
}

#[test]
fn checked_in_const_context() {
    const CONFIG: Config = ConfigBuilder::new().checked();
    assert_eq!(CONFIG.clocks().sysclk, Hertz::mhz(280));
    assert_eq!(CONFIG.flash_latency().wait_states(), 6);
}

#[test]
#[should_panic(expected = "APB clock exceeds")]
fn check_panics_on_fast_apb() {
    hse_280().with_apb1_div(ApbPrescaler::Div1).check();
}

#[test]
fn build_reports_error() {
    assert_eq!(
        hse_280().with_voltage_scale(VoltageScale::Scale2).build().err(),
        Some(Error::VoltageScaleMismatch {
            required: VoltageScale::Scale0,
            configured: VoltageScale::Scale2,
        })
    );
}

// =============================================================================
// Bring-up
// =============================================================================

#[test]
fn bring_up_order() {
    let config = hse_280().build().unwrap();
    let mut hw = MockRcc::new();
    let mut bring_up = BringUp::new(config);

    let clocks = bring_up.run(&mut hw, &mut NoDelay).unwrap();
    assert_eq!(clocks.sysclk, Hertz::mhz(280));
    assert_eq!(bring_up.state(), BringUpState::Ready);

    let voltage = hw.position(|op| matches!(op, Op::VoltageScale(VoltageScale::Scale0)));
    let oscillator = hw.position(|op| matches!(op, Op::Oscillator(_)));
    let pll = hw.position(|op| matches!(op, Op::Pll(_)));
    let flash = hw.position(|op| matches!(op, Op::FlashLatency(_)));
    let switch = hw.position(|op| matches!(op, Op::Switch(SystemClockSource::Pll1)));
    let cache = hw.position(|op| matches!(op, Op::CoreFrequency(_)));

    assert!(voltage < oscillator);
    assert!(oscillator < pll);
    assert!(pll < flash);
    assert!(flash < switch);
    assert!(switch < cache);

    let prescalers: Vec<usize> = hw
        .ops
        .iter()
        .enumerate()
        .filter(|(_, op)| matches!(op, Op::Prescaler(_)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(prescalers.len(), 6);
    assert!(prescalers.iter().all(|&i| i < switch));

    assert_eq!(hw.ops[flash], Op::FlashLatency(6));
    assert_eq!(hw.ops.last(), Some(&Op::CoreFrequency(Hertz::mhz(280))));
}

#[test]
fn bring_up_runs_once() {
    let mut hw = MockRcc::new();
    let mut bring_up = BringUp::new(hse_280().build().unwrap());
    bring_up.run(&mut hw, &mut NoDelay).unwrap();

    let writes = hw.ops.len();
    assert_eq!(bring_up.run(&mut hw, &mut NoDelay), Err(Error::ReentrantBringUp));
    assert_eq!(hw.ops.len(), writes);
    assert_eq!(bring_up.state(), BringUpState::Ready);
}

#[test]
fn second_sequencer_is_refused() {
    let config = hse_280().build().unwrap();
    let mut hw = MockRcc::new();
    BringUp::new(config).run(&mut hw, &mut NoDelay).unwrap();

    let writes = hw.ops.len();
    let mut again = BringUp::new(config);
    assert_eq!(again.run(&mut hw, &mut NoDelay), Err(Error::ReentrantBringUp));
    assert_eq!(hw.ops.len(), writes);
    assert_eq!(again.clocks(), Err(Error::DomainNotReady));
}

#[test]
fn default_claim_is_process_wide() {
    // The only test touching the process-wide flag.
    assert!(super::bring_up::claim_rcc());
    assert!(!super::bring_up::claim_rcc());
}

#[test]
fn oscillator_timeout_is_bounded() {
    let mut hw = MockRcc::new();
    hw.oscillator_polls = None;
    let mut bring_up = BringUp::new(hse_280().build().unwrap()).with_poll_attempts(25);

    assert_eq!(
        bring_up.run(&mut hw, &mut NoDelay),
        Err(Error::ClockSourceNotReady(ClockSource::Hse))
    );
    assert_eq!(hw.oscillator_attempts, 25);
    assert_eq!(bring_up.state(), BringUpState::Faulted);
    assert!(!hw.ops.iter().any(|op| matches!(op, Op::Pll(_) | Op::Switch(_))));

    // A failed bring-up cannot be retried.
    let writes = hw.ops.len();
    assert_eq!(bring_up.run(&mut hw, &mut NoDelay), Err(Error::ReentrantBringUp));
    assert_eq!(hw.ops.len(), writes);
}

#[test]
fn pll_lock_timeout() {
    let mut hw = MockRcc::new();
    hw.pll_polls = None;
    let mut bring_up = BringUp::new(hse_280().build().unwrap()).with_poll_attempts(10);
    assert_eq!(
        bring_up.run(&mut hw, &mut NoDelay),
        Err(Error::ClockSourceNotReady(ClockSource::Pll1))
    );
    assert!(!hw.ops.iter().any(|op| matches!(op, Op::FlashLatency(_))));
}

#[test]
fn switch_timeout_leaves_cache_alone() {
    let mut hw = MockRcc::new();
    hw.switch_polls = None;
    let mut bring_up = BringUp::new(hse_280().build().unwrap()).with_poll_attempts(10);
    assert_eq!(
        bring_up.run(&mut hw, &mut NoDelay),
        Err(Error::SwitchTimeout(Transition::SystemClock))
    );
    assert!(!hw.ops.iter().any(|op| matches!(op, Op::CoreFrequency(_))));
    assert_eq!(bring_up.clocks(), Err(Error::DomainNotReady));
}

#[test]
fn voltage_timeout() {
    let mut hw = MockRcc::new();
    hw.voltage_polls = None;
    let mut bring_up = BringUp::new(hse_280().build().unwrap()).with_poll_attempts(3);
    assert_eq!(
        bring_up.run(&mut hw, &mut NoDelay),
        Err(Error::SwitchTimeout(Transition::VoltageScale))
    );
    assert_eq!(hw.ops, [Op::VoltageScale(VoltageScale::Scale0)]);
}

#[test]
fn flash_latency_relaxed_after_switch() {
    let config = hsi_64().build().unwrap();
    assert_eq!(config.flash_latency().wait_states(), 2);

    let mut hw = MockRcc::new();
    BringUp::new(config).run(&mut hw, &mut NoDelay).unwrap();

    let switch = hw.position(|op| matches!(op, Op::Switch(_)));
    let latencies: Vec<(usize, Op)> = hw
        .ops
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, op)| matches!(op, Op::FlashLatency(_)))
        .collect();
    assert_eq!(latencies.len(), 2);
    assert_eq!(latencies[0].1, Op::FlashLatency(3));
    assert!(latencies[0].0 < switch);
    assert_eq!(latencies[1].1, Op::FlashLatency(2));
    assert!(latencies[1].0 > switch);
    assert_eq!(hw.ops.last(), Some(&Op::CoreFrequency(Hertz::mhz(64))));
}

// =============================================================================
// Resolver
// =============================================================================

#[test]
fn resolver_before_ready() {
    let bring_up = BringUp::new(hse_280().build().unwrap());
    assert_eq!(bring_up.frequency_of(Peripheral::USART3), Err(Error::DomainNotReady));
    assert_eq!(bring_up.clocks(), Err(Error::DomainNotReady));
}

#[test]
fn resolver_after_ready() {
    let mut bring_up = BringUp::new(hse_280().build().unwrap());
    bring_up.run(&mut MockRcc::new(), &mut NoDelay).unwrap();

    assert_eq!(bring_up.frequency_of(Peripheral::USART3), Ok(Hertz::mhz(140)));
    assert_eq!(bring_up.frequency_of(Peripheral::USART1), Ok(Hertz::mhz(140)));
    assert_eq!(bring_up.frequency_of(Peripheral::TIM2), Ok(Hertz::mhz(280)));
    assert_eq!(bring_up.frequency_of(Peripheral::SPI1), Ok(Hertz::mhz(280)));
    assert_eq!(bring_up.frequency_of(Peripheral::LPUART1), Ok(Hertz::mhz(140)));
    assert_eq!(bring_up.frequency_of(Peripheral::ADC1), Ok(Hertz::mhz(280)));
}

#[test]
fn peripheral_table() {
    assert_eq!(Peripheral::USART3.clock_domain(), ClockDomain::Apb1);
    assert_eq!(Peripheral::TIM1.clock_domain(), ClockDomain::Apb2Timer);
    assert_eq!(Peripheral::USART3.name(), "USART3");
    assert!(peripherals_on(ClockDomain::Apb4).any(|p| p == Peripheral::I2C4));
    assert!(peripherals_on(ClockDomain::Apb1Timer).all(|p| p.name().starts_with("TIM")));
}

#[test]
fn core_frequency_cache() {
    set_core_frequency(Hertz::mhz(280));
    assert_eq!(core_frequency(), Hertz::mhz(280));
}
