//! Timing parameters derived from resolved kernel clocks.

use core::fmt;

use crate::time::Hertz;

/// Timing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Baudrate too low
    BaudrateTooLow,
    /// Baudrate too high
    BaudrateTooHigh,
    /// SysTick reload outside 1..=0xFF_FFFF
    TickRateUnreachable,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BaudrateTooLow => f.write_str("baudrate too low for the kernel clock"),
            Error::BaudrateTooHigh => f.write_str("baudrate too high for the kernel clock"),
            Error::TickRateUnreachable => f.write_str("tick rate outside the SysTick reload range"),
        }
    }
}

/// USART_PRESC: kernel clock divider, indexed by the register value.
const PRESCALERS: [u16; 12] = [1, 2, 4, 6, 8, 10, 12, 16, 32, 64, 128, 256];

/// Settings for USART_PRESC, USART_BRR and USART_CR1.OVER8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsartDivisor {
    /// USART_PRESC.PRESCALER
    pub presc: u8,
    /// Value to write to BRR, already in the OVER8 layout when `over8` is set.
    pub brr: u32,
    pub over8: bool,
    /// Baudrate actually produced.
    pub actual: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Usart,
    Lpuart,
}

fn calculate_brr(baud: u32, pclk: u32, presc: u32, mul: u32) -> u32 {
    // mul * pclk / presc / baud; mul is applied last so the 32-bit division stays exact
    let clock = pclk / presc;
    let brr = (clock / baud) as u64 * mul as u64;

    // Integer division lost up to `mul` steps; round to nearest.
    let rounding = ((clock % baud) as u64 * mul as u64 + (baud / 2) as u64) / baud as u64;

    u32::try_from(brr + rounding).unwrap_or(u32::MAX)
}

/// BRR for a USART/UART instance with 16x oversampling, falling back to 8x.
pub fn usart_divisor(kernel: Hertz, baud: u32) -> Result<UsartDivisor, Error> {
    find_brr(Kind::Usart, kernel, baud)
}

/// BRR for LPUART1 (256 * kernel / baud).
pub fn lpuart_divisor(kernel: Hertz, baud: u32) -> Result<UsartDivisor, Error> {
    find_brr(Kind::Lpuart, kernel, baud)
}

fn find_brr(kind: Kind, kernel: Hertz, baud: u32) -> Result<UsartDivisor, Error> {
    if baud == 0 {
        return Err(Error::BaudrateTooLow);
    }

    let (mul, brr_min, brr_max) = match kind {
        Kind::Usart => (1, 0x10, 0x1_0000),
        Kind::Lpuart => (256, 0x300, 0x10_0000),
    };

    for (presc, &div) in PRESCALERS.iter().enumerate() {
        let brr = calculate_brr(baud, kernel.0, div as u32, mul);
        trace!("usart: presc={} brr=0x{:08x}", div, brr);

        if brr < brr_min {
            if brr * 2 >= brr_min && kind == Kind::Usart {
                let actual = kernel.0 / div as u32 / brr;
                return Ok(UsartDivisor {
                    presc: presc as u8,
                    brr: ((brr << 1) & !0xF) | (brr & 0x07),
                    over8: true,
                    actual,
                });
            }
            return Err(Error::BaudrateTooHigh);
        }

        if brr < brr_max {
            let actual = ((kernel.0 / div as u32) as u64 * mul as u64 / brr as u64) as u32;
            return Ok(UsartDivisor {
                presc: presc as u8,
                brr,
                over8: false,
                actual,
            });
        }
    }

    Err(Error::BaudrateTooLow)
}

/// SysTick reload value for `tick_hz` interrupts from a `clock` input.
pub fn systick_reload(clock: Hertz, tick_hz: u32) -> Result<u32, Error> {
    if tick_hz == 0 || tick_hz > clock.0 {
        return Err(Error::TickRateUnreachable);
    }
    match clock.0 / tick_hz - 1 {
        reload @ 1..=0xFF_FFFF => Ok(reload),
        _ => Err(Error::TickRateUnreachable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stlink_vcp_at_140mhz() {
        let div = usart_divisor(Hertz::mhz(140), 115_200).unwrap();
        assert_eq!(div.presc, 0);
        assert_eq!(div.brr, 1215);
        assert!(!div.over8);
        assert_eq!(div.actual, 115_226);
    }

    #[test]
    fn falls_back_to_over8() {
        let div = usart_divisor(Hertz::mhz(140), 10_000_000).unwrap();
        assert!(div.over8);
        // USARTDIV = 28: BRR[15:4] = 1, BRR[2:0] = 6
        assert_eq!(div.brr, 0x16);
        assert_eq!(div.actual, 10_000_000);
        assert_eq!(usart_divisor(Hertz::mhz(140), 20_000_000), Err(Error::BaudrateTooHigh));
    }

    #[test]
    fn slow_baudrates_use_the_prescaler() {
        let div = usart_divisor(Hertz::mhz(140), 100).unwrap();
        assert_eq!(PRESCALERS[div.presc as usize], 32);
        assert_eq!(usart_divisor(Hertz::mhz(140), 1), Err(Error::BaudrateTooLow));
        assert_eq!(usart_divisor(Hertz::mhz(140), 0), Err(Error::BaudrateTooLow));
    }

    #[test]
    fn lpuart_scale() {
        let div = lpuart_divisor(Hertz::mhz(140), 115_200).unwrap();
        assert_eq!(div.brr, 311_111);
        assert!(!div.over8);
    }

    #[test]
    fn systick() {
        assert_eq!(systick_reload(Hertz::mhz(280), 1_000), Ok(279_999));
        assert_eq!(systick_reload(Hertz::mhz(280), 10), Err(Error::TickRateUnreachable));
        assert_eq!(systick_reload(Hertz::mhz(280), 0), Err(Error::TickRateUnreachable));
        assert_eq!(systick_reload(Hertz::mhz(64), 32_000_000), Ok(1));
    }
}
