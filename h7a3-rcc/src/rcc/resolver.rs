//! Peripheral kernel clock lookup.
//!
//! The peripheral to domain table is generated from
//! `data/<chip>/peripherals.yaml` by the build script.
//!
//! Drivers resolve their kernel clock through
//! [`BringUp::frequency_of`](super::BringUp::frequency_of), which refuses
//! until the tree is applied:
//!
//! ```compile_fail
//! use h7a3_rcc::{board, rcc::Peripheral};
//!
//! let freq = board::CONFIG.clocks().peripheral(Peripheral::USART3);
//! ```

use super::{ClockDomain, Clocks, Peripheral};
use crate::time::Hertz;

impl Clocks {
    /// Frequency of the domain clocking `peripheral`.
    pub(crate) const fn peripheral(&self, peripheral: Peripheral) -> Hertz {
        self.get(peripheral.clock_domain())
    }
}

/// Peripherals clocked from `domain`, in table order.
pub fn peripherals_on(domain: ClockDomain) -> impl Iterator<Item = Peripheral> {
    Peripheral::ALL.into_iter().filter(move |p| p.clock_domain() == domain)
}
