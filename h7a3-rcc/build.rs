use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use proc_macro2::TokenStream;
use quote::format_ident;
use quote::quote;

mod build_serde;
use build_serde::Peripherals;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let chip_name = match env::vars()
        .map(|(a, _)| a)
        .filter(|x| x.starts_with("CARGO_FEATURE_STM32H7"))
        .get_one()
    {
        Ok(x) => x,
        Err(GetOneError::None) => panic!("No stm32h7xx Cargo feature enabled"),
        Err(GetOneError::Multiple) => panic!("Multiple stm32h7xx Cargo features enabled"),
    }
        .strip_prefix("CARGO_FEATURE_")
        .unwrap()
        .to_ascii_lowercase();

    println!("cargo:rerun-if-changed=data/{}", chip_name);
    let data_dir = Path::new("data").join(&chip_name);

    // Read and parse peripherals.yaml
    let peripherals_path = data_dir.join("peripherals.yaml");
    let peripherals_content = fs::read_to_string(&peripherals_path)
        .map_err(|e| format!("Failed to read peripherals.yaml: {}", e))?;

    let peripherals: Peripherals = serde_yaml::from_str(&peripherals_content)
        .map_err(|e| format!("Failed to parse peripherals.yaml: {}", e))?;

    // Get output path from env
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let dest_path = out_dir.join("_generated.rs");

    let token_stream = generate_peripheral_clocks(&peripherals);

    let mut file = File::create(&dest_path).unwrap();
    write!(file, "{}", token_stream).unwrap();
    rustfmt(&dest_path);

    Ok(())
}

fn generate_peripheral_clocks(peripherals: &Peripherals) -> TokenStream {
    let mut seen = BTreeSet::new();
    let mut variants = Vec::new();
    let mut names = Vec::new();
    let mut domains = Vec::new();
    let mut docs = Vec::new();

    for peripheral in &peripherals.peripherals {
        if !seen.insert(peripheral.name.clone()) {
            panic!("Duplicate peripheral {} in peripherals.yaml", peripheral.name);
        }

        variants.push(format_ident!("{}", peripheral.name));
        names.push(peripheral.name.clone());
        domains.push(clock_to_domain(&peripheral.clock));
        docs.push(
            peripheral
                .description
                .clone()
                .unwrap_or_else(|| format!("{}, clocked from `{}`", peripheral.name, peripheral.clock)),
        );
    }

    let count = variants.len();

    quote! {
        use crate::rcc::ClockDomain;

        /// Peripheral instances with a known kernel clock domain.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub enum Peripheral {
            #(
                #[doc = #docs]
                #variants,
            )*
        }

        impl Peripheral {
            /// Every peripheral of the clock table, in declaration order.
            pub const ALL: [Peripheral; #count] = [#(Peripheral::#variants,)*];

            /// Reference manual name of the instance.
            pub const fn name(self) -> &'static str {
                match self {
                    #(Peripheral::#variants => #names,)*
                }
            }

            /// Clock domain feeding this peripheral's kernel clock.
            pub const fn clock_domain(self) -> ClockDomain {
                match self {
                    #(Peripheral::#variants => #domains,)*
                }
            }
        }
    }
}

fn clock_to_domain(clock: &str) -> TokenStream {
    match clock {
        "sysclk" => quote! { ClockDomain::Sysclk },
        "pll1_p" => quote! { ClockDomain::Pll1P },
        "pll1_q" => quote! { ClockDomain::Pll1Q },
        "pll1_r" => quote! { ClockDomain::Pll1R },
        "core" => quote! { ClockDomain::Core },
        "ahb" => quote! { ClockDomain::Ahb },
        "ahb1" => quote! { ClockDomain::Ahb1 },
        "ahb2" => quote! { ClockDomain::Ahb2 },
        "ahb3" => quote! { ClockDomain::Ahb3 },
        "ahb4" => quote! { ClockDomain::Ahb4 },
        "apb1" => quote! { ClockDomain::Apb1 },
        "apb2" => quote! { ClockDomain::Apb2 },
        "apb3" => quote! { ClockDomain::Apb3 },
        "apb4" => quote! { ClockDomain::Apb4 },
        "apb1_timer" => quote! { ClockDomain::Apb1Timer },
        "apb2_timer" => quote! { ClockDomain::Apb2Timer },
        _ => panic!("Unknown clock domain: {}", clock),
    }
}

enum GetOneError {
    None,
    Multiple,
}

trait IteratorExt: Iterator {
    fn get_one(self) -> Result<Self::Item, GetOneError>;
}

impl<T: Iterator> IteratorExt for T {
    fn get_one(mut self) -> Result<Self::Item, GetOneError> {
        match self.next() {
            None => Err(GetOneError::None),
            Some(res) => match self.next() {
                Some(_) => Err(GetOneError::Multiple),
                None => Ok(res),
            },
        }
    }
}

/// rustfmt a given path.
/// Failures are logged to stderr and ignored.
fn rustfmt(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match Command::new("rustfmt").args([path]).output() {
        Err(e) => {
            eprintln!("failed to exec rustfmt {:?}: {:?}", path, e);
        }
        Ok(out) => {
            if !out.status.success() {
                eprintln!("rustfmt {:?} failed:", path);
                eprintln!("=== STDOUT:");
                std::io::stderr().write_all(&out.stdout).unwrap();
                eprintln!("=== STDERR:");
                std::io::stderr().write_all(&out.stderr).unwrap();
            }
        }
    }
}
