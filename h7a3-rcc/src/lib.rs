#![no_std]
#![doc = include_str!("../README.md")]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod macros;

pub mod board;
pub mod flash;
pub mod pwr;
pub mod rcc;
pub mod time;
pub mod timing;

pub(crate) mod _generated {
    #![allow(dead_code)]
    #![allow(unused_imports)]
    #![allow(non_snake_case)]
    #![allow(missing_docs)]
    #![allow(clippy::all)]

    include!(concat!(env!("OUT_DIR"), "/_generated.rs"));
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "arm")] {
        /// Busy-wait for `us` microseconds, sized from [`rcc::core_frequency`].
        pub fn blocking_delay_us(us: u32) {
            let freq = rcc::core_frequency().0 as u64;
            let cycles = freq * us as u64 / 1_000_000;
            cortex_m::asm::delay(u32::try_from(cycles).unwrap_or(u32::MAX));
        }

        /// Cycle-counting [`DelayNs`](embedded_hal_1::delay::DelayNs), for polling
        /// during bring-up.
        ///
        /// Reads the core frequency on every call, so it stays correct across
        /// the clock switch.
        pub struct CycleDelay;

        impl embedded_hal_1::delay::DelayNs for CycleDelay {
            fn delay_ns(&mut self, ns: u32) {
                let freq = rcc::core_frequency().0 as u64;
                let cycles = freq * ns as u64 / 1_000_000_000;
                cortex_m::asm::delay(u32::try_from(cycles).unwrap_or(u32::MAX));
            }

            fn delay_us(&mut self, us: u32) {
                blocking_delay_us(us);
            }
        }
    }
}
