use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args as ClapArgs, Parser, Subcommand};

use cemc_core::{CemcError, StdoutSink};
use cemc_mc::{Canonical, Kinetic, RunManager, RunParams, SemiGrandCanonical};
use cemc_system::System;

#[derive(Parser, Debug)]
#[command(name = "cemc-sim", version, about = "Cluster-expansion Monte Carlo CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Canonical Monte Carlo (fixed composition).
    Canonical(RunArgs),
    /// Semi-grand canonical Monte Carlo (fixed chemical potential).
    SemiGrand(RunArgs),
    /// Kinetic Monte Carlo (rejection-free, time-weighted).
    Kinetic(RunArgs),
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// JSON file specifying the Monte Carlo system.
    system: PathBuf,
    /// JSON file specifying the Monte Carlo run parameters.
    run_params: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Canonical(args) => run_calculator(CalculatorKind::Canonical, args),
        Command::SemiGrand(args) => run_calculator(CalculatorKind::SemiGrand, args),
        Command::Kinetic(args) => run_calculator(CalculatorKind::Kinetic, args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("Error: {err}");
            ExitCode::from(1)
        }
    }
}

enum CalculatorKind {
    Canonical,
    SemiGrand,
    Kinetic,
}

fn run_calculator(kind: CalculatorKind, args: RunArgs) -> Result<(), CemcError> {
    let system = Arc::new(System::load(&args.system)?);
    let params = RunParams::load(&args.run_params)?;

    let mut run_manager = RunManager::new(
        params.run_manager.clone(),
        params.sampling_fixtures.clone(),
    );
    run_manager.set_log(Box::new(StdoutSink));

    let seed = params.calculation_options.seed;
    match kind {
        CalculatorKind::Canonical => {
            println!("Cluster expansion canonical Monte Carlo");
            let calculator = Canonical::new(system)?;
            calculator.run_series(&params.state_generation, &mut run_manager, seed)
        }
        CalculatorKind::SemiGrand => {
            println!("Cluster expansion semi-grand canonical Monte Carlo");
            let calculator = SemiGrandCanonical::new(system)?;
            calculator.run_series(&params.state_generation, &mut run_manager, seed)
        }
        CalculatorKind::Kinetic => {
            println!("Cluster expansion kinetic Monte Carlo");
            let calculator = Kinetic::new(system)?;
            calculator.run_series(&params.state_generation, &mut run_manager, seed)
        }
    }
}
