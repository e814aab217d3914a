//! NUCLEO-H7A3ZI-Q clock preset.
//!
//! HSE is the 8 MHz ST-LINK MCO output in bypass mode. PLL1 runs it to
//! 280 MHz through a 2 MHz reference and a 560 MHz VCO; every APB bus
//! runs at 140 MHz.

use core::fmt;

use embedded_hal_1::delay::DelayNs;

use crate::rcc::{
    self, AhbPrescaler, ApbPrescaler, BringUp, Clocks, Config, ConfigBuilder, OscillatorSource,
    Peripheral, PllFactors, PllInputRange, RccHal, VoltageScale,
};
use crate::time::Hertz;
use crate::timing::{self, UsartDivisor};

pub const HSE_FREQ: Hertz = Hertz::mhz(8);

/// USART3 on PD8/PD9 is wired to the ST-LINK virtual COM port.
pub const STLINK_UART: Peripheral = Peripheral::USART3;
pub const STLINK_BAUDRATE: u32 = 115_200;

pub const SYSTICK_HZ: u32 = 1_000;

pub const fn builder() -> ConfigBuilder {
    ConfigBuilder::new()
        .with_oscillator(OscillatorSource::Hse {
            freq: HSE_FREQ,
            bypass: true,
        })
        .with_pll(PllFactors::new(PllInputRange::MHz2_4, 4, 280, 2, 2, 2))
        .with_voltage_scale(VoltageScale::Scale0)
        .with_core_div(AhbPrescaler::Div1)
        .with_ahb_div(AhbPrescaler::Div1)
        .with_apb1_div(ApbPrescaler::Div2)
        .with_apb2_div(ApbPrescaler::Div2)
        .with_apb3_div(ApbPrescaler::Div2)
        .with_apb4_div(ApbPrescaler::Div2)
}

/// Board clock configuration, validated at compile time.
pub const CONFIG: Config = builder().checked();

/// Board initialization error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Clock(rcc::Error),
    Timing(timing::Error),
}

impl From<rcc::Error> for Error {
    fn from(e: rcc::Error) -> Self {
        Error::Clock(e)
    }
}

impl From<timing::Error> for Error {
    fn from(e: timing::Error) -> Self {
        Error::Timing(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Clock(e) => write!(f, "clock bring-up: {}", e),
            Error::Timing(e) => write!(f, "timing: {}", e),
        }
    }
}

/// What the rest of the firmware needs once clocks are up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    pub clocks: Clocks,
    /// Divisor for [`STLINK_UART`] at [`STLINK_BAUDRATE`].
    pub stlink_uart: UsartDivisor,
    /// SysTick reload for [`SYSTICK_HZ`] from the core clock.
    pub systick_reload: u32,
}

/// Bring the board clocks up and derive the console and tick timing.
///
/// Only the first call touches the hardware; later calls fail with
/// [`rcc::Error::ReentrantBringUp`]. A clock error is fatal, callers should halt.
pub fn initialize<H: RccHal, D: DelayNs>(hw: &mut H, delay: &mut D) -> Result<Board, Error> {
    let mut bring_up = BringUp::new(CONFIG);
    let clocks = bring_up.run(hw, delay)?;

    let uart_clock = bring_up.frequency_of(STLINK_UART)?;
    let stlink_uart = timing::usart_divisor(uart_clock, STLINK_BAUDRATE)?;
    let systick_reload = timing::systick_reload(clocks.core, SYSTICK_HZ)?;

    info!(
        "board: {} at {} Bd (actual {}), systick reload {}",
        STLINK_UART.name(),
        STLINK_BAUDRATE,
        stlink_uart.actual,
        systick_reload
    );

    Ok(Board {
        clocks,
        stlink_uart,
        systick_reload,
    })
}
