//! evovm-trace - Run one organism and trace what its CPU does
//!
//! # Usage
//!
//! ```bash
//! # Run an ancestor for 1000 steps with default hardware settings
//! evovm-trace ancestor.org
//!
//! # Custom hardware and instruction set, fixed seed, 500 steps
//! evovm-trace -c hw.json -i inst.json -s 7 -n 500 ancestor.org
//!
//! # Print the full CPU status after every step
//! evovm-trace -v ancestor.org
//! ```
//!
//! # Exit Codes
//!
//! - 0: At least one offspring was produced
//! - 1: The run ended without offspring
//! - 2: Invalid arguments or IO error

use anyhow::{bail, Context as _, Result};
use evovm::vm::FaultRecord;
use evovm::{loader, Context, Hardware, HardwareConfig, InstLib, Organism, RandomStream, RecordingOrganism, StepResult};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

struct Options {
    config: Option<String>,
    inst_set: Option<String>,
    seed: u64,
    steps: u64,
    verbose: bool,
    genome: String,
}

enum Parsed {
    Run(Options),
    Help,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Parsed::Run(options)) => options,
        Ok(Parsed::Help) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {}\n", e);
            print_help();
            return ExitCode::from(2);
        }
    };

    match run(&options) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn parse_args(args: &[String]) -> Result<Parsed> {
    let mut config = None;
    let mut inst_set = None;
    let mut seed = 1;
    let mut steps = 1000;
    let mut verbose = false;
    let mut genome = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-v" | "--verbose" => verbose = true,
            "-c" | "--config" => config = Some(value(&mut iter, arg)?.to_string()),
            "-i" | "--inst-set" => inst_set = Some(value(&mut iter, arg)?.to_string()),
            "-s" | "--seed" => {
                seed = value(&mut iter, arg)?
                    .parse()
                    .with_context(|| format!("{} expects an unsigned integer", arg))?
            }
            "-n" | "--steps" => {
                steps = value(&mut iter, arg)?
                    .parse()
                    .with_context(|| format!("{} expects an unsigned integer", arg))?
            }
            _ if arg.starts_with('-') => bail!("unknown option: {}", arg),
            _ if genome.is_some() => bail!("only one genome file may be given"),
            _ => genome = Some(arg.clone()),
        }
    }

    let Some(genome) = genome else {
        bail!("no genome file specified");
    };
    Ok(Parsed::Run(Options { config, inst_set, seed, steps, verbose, genome }))
}

fn value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a str> {
    iter.next()
        .map(String::as_str)
        .with_context(|| format!("{} expects a value", flag))
}

/// Returns whether any offspring was produced
fn run(options: &Options) -> Result<bool> {
    let config = match &options.config {
        Some(path) => loader::load_config(path).with_context(|| format!("loading config {}", path))?,
        None => HardwareConfig::default(),
    };
    let lib = match &options.inst_set {
        Some(path) => {
            let set = loader::load_inst_set(path).with_context(|| format!("loading instruction set {}", path))?;
            InstLib::with_overrides(&set)?
        }
        None => InstLib::standard(),
    };
    let lib = Arc::new(lib);
    let genome = loader::load_genome(&options.genome, &lib)
        .with_context(|| format!("loading genome {}", options.genome))?;

    println!("genome {} ({} instructions): {}", options.genome, genome.len(), genome);

    let mut org = RecordingOrganism::new(genome);
    let mut hw = Hardware::from_organism(Arc::clone(&lib), Arc::new(config), &org);
    let mut rng = RandomStream::new(options.seed);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut seen_faults = 0;
    let mut seen_offspring = 0;
    for step in 1..=options.steps {
        let result = hw.single_process(&mut Context::new(&mut rng, &mut org));

        for fault in &org.faults[seen_faults..] {
            print_fault(&mut out, step, fault)?;
        }
        seen_faults = org.faults.len();

        for child in &org.offspring[seen_offspring..] {
            writeln!(out, "[{:>6}] divide: offspring {} instructions: {}", step, child.len(), child)?;
        }
        seen_offspring = org.offspring.len();

        if options.verbose {
            hw.print_status(&mut out, &org)?;
        }
        if result == StepResult::Died {
            writeln!(out, "[{:>6}] organism died", step)?;
            break;
        }
    }

    let phenotype = org.phenotype();
    writeln!(
        out,
        "steps {}  offspring {}  faults {}  copy mutations {}",
        phenotype.time_used,
        org.offspring.len(),
        org.faults.len(),
        phenotype.copy_mut_count
    )?;
    Ok(!org.offspring.is_empty())
}

fn print_fault(out: &mut impl Write, step: u64, fault: &FaultRecord) -> io::Result<()> {
    writeln!(out, "[{:>6}] fault ({}): {}", step, fault.location, fault.message)
}

fn print_help() {
    eprintln!(
        r#"evovm-trace - Run one organism and trace its virtual CPU

USAGE:
    evovm-trace [OPTIONS] <GENOME.org>

OPTIONS:
    -c, --config <FILE>     Hardware configuration (JSON)
    -i, --inst-set <FILE>   Instruction-set overrides (JSON)
    -s, --seed <N>          Random seed [default: 1]
    -n, --steps <N>         Engine calls to run [default: 1000]
    -v, --verbose           Print CPU status after every step
    -h, --help              Print this help

EXIT CODES:
    0    At least one offspring was produced
    1    Run ended without offspring
    2    Invalid arguments or IO error
"#
    );
}
