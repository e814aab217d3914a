use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use h7a3_rcc::board;
use h7a3_rcc::rcc::{self, BringUp, Config, Peripheral};
use h7a3_rcc::time::Hertz;

mod dry_run;
mod plan;

use dry_run::{DryRun, NoDelay, Stuck};
use plan::Plan;

#[derive(Parser)]
#[command(version, about = "Check, rehearse and solve STM32H7A3 clock plans")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a plan and print the derived clock tree
    Check {
        /// HJSON plan file; the NUCLEO-H7A3ZI-Q preset when omitted
        plan: Option<PathBuf>,
        /// Also list every peripheral with its kernel clock
        #[arg(long)]
        peripherals: bool,
    },
    /// Print the register writes bring-up issues, in order
    Sequence {
        /// HJSON plan file; the NUCLEO-H7A3ZI-Q preset when omitted
        plan: Option<PathBuf>,
        /// Pretend this readiness flag never sets
        #[arg(long, value_enum)]
        stuck: Option<Stuck>,
        /// Polls per readiness wait
        #[arg(long, default_value_t = rcc::DEFAULT_POLL_ATTEMPTS)]
        attempts: u32,
    },
    /// Search PLL1 factors producing a sysclk from an input frequency
    Solve {
        /// Oscillator frequency in MHz
        #[arg(long)]
        input_mhz: u32,
        /// Target sysclk in MHz
        #[arg(long)]
        sysclk_mhz: u32,
    },
}

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("warn")).init();

    match Cli::parse().command {
        Command::Check { plan, peripherals } => check(plan.as_deref(), peripherals),
        Command::Sequence { plan, stuck, attempts } => sequence(plan.as_deref(), stuck, attempts),
        Command::Solve { input_mhz, sysclk_mhz } => solve(input_mhz, sysclk_mhz),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        log::debug!("no plan given, using the NUCLEO-H7A3ZI-Q preset");
        return Ok(board::CONFIG);
    };
    log::debug!("loading plan {}", path.display());
    let builder = Plan::load(path)?.to_builder()?;
    builder.build().map_err(|e| anyhow!("{}: {}", path.display(), e))
}

fn mhz(freq: Hertz) -> String {
    format!("{}.{:03} MHz", freq.0 / 1_000_000, freq.0 % 1_000_000 / 1_000)
}

fn check(path: Option<&Path>, peripherals: bool) -> Result<()> {
    let config = load_config(path)?;
    let builder = config.builder();
    let clocks = config.clocks();
    let pll = builder
        .pll
        .outputs(builder.oscillator.frequency())
        .map_err(|e| anyhow!("{e}"))?;

    println!("oscillator   {:?}", builder.oscillator);
    println!(
        "pll1         m={} n={} p={} q={} r={}, {:?} ref {}, {:?} VCO {}",
        builder.pll.m,
        builder.pll.n,
        builder.pll.p,
        builder.pll.q,
        builder.pll.r,
        builder.pll.range,
        mhz(pll.reference),
        builder.pll.range.vco(),
        mhz(pll.vco)
    );
    println!("voltage      VOS{}", builder.voltage_scale.level());
    println!("flash        {} wait states", config.flash_latency().wait_states());
    println!();

    for (domain, freq) in clocks.iter() {
        println!("{:<12} {:>15}", domain.name(), mhz(freq));
    }

    if peripherals {
        println!();
        for peripheral in Peripheral::ALL {
            println!(
                "{:<8} {:<12} {:>15}",
                peripheral.name(),
                peripheral.clock_domain().name(),
                mhz(clocks.get(peripheral.clock_domain()))
            );
        }
    }

    Ok(())
}

fn sequence(path: Option<&Path>, stuck: Option<Stuck>, attempts: u32) -> Result<()> {
    let config = load_config(path)?;
    let mut hw = DryRun::new(stuck, true);
    let mut bring_up = BringUp::new(config).with_poll_attempts(attempts);

    match bring_up.run(&mut hw, &mut NoDelay) {
        Ok(clocks) => {
            println!();
            println!("ready: core {}, ahb {}", mhz(clocks.core), mhz(clocks.ahb));
            Ok(())
        }
        Err(e) => bail!("bring-up stopped in {:?} after {} polls: {}", bring_up.state(), hw.polls, e),
    }
}

/// `value` MHz as [`Hertz`], refusing anything that does not fit in a u32.
fn from_mhz(name: &str, value: u32) -> Result<Hertz> {
    match value.checked_mul(1_000_000) {
        Some(hz) => Ok(Hertz(hz)),
        None => bail!("{name} of {value} MHz does not fit in 32-bit Hz"),
    }
}

fn solve(input_mhz: u32, sysclk_mhz: u32) -> Result<()> {
    let input = from_mhz("--input-mhz", input_mhz)?;
    let sysclk = from_mhz("--sysclk-mhz", sysclk_mhz)?;
    let Some(factors) = rcc::pll::solve(input, sysclk) else {
        bail!("no PLL1 factors give exactly {sysclk_mhz} MHz from {input_mhz} MHz");
    };
    let outputs = factors.outputs(input).map_err(|e| anyhow!("{e}"))?;

    println!("pll: {{");
    println!("  range: \"{}\"", range_name(factors.range));
    println!("  m: {}, n: {}, p: {}, q: {}, r: {}", factors.m, factors.n, factors.p, factors.q, factors.r);
    println!("}}");
    println!("// ref {}, VCO {}", mhz(outputs.reference), mhz(outputs.vco));
    Ok(())
}

fn range_name(range: rcc::PllInputRange) -> &'static str {
    match range {
        rcc::PllInputRange::MHz1_2 => "1-2",
        rcc::PllInputRange::MHz2_4 => "2-4",
        rcc::PllInputRange::MHz4_8 => "4-8",
        rcc::PllInputRange::MHz8_16 => "8-16",
    }
}
