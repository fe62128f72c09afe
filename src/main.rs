use std::path::PathBuf;

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use globopt::{
    FragmentPartitioner, InternalCompilerError, OptimizerOptions, Optimizer, Program,
    middle::ir::{MethodId, pretty_print::pretty_print_program},
};
use log::{LevelFilter, info};
use thiserror::Error;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Serialized program to optimize
    program: PathBuf,

    /// Deferred entry method (`Type.method`) starting a lazily loaded fragment
    #[arg(long = "split", value_name = "METHOD")]
    split_points: Vec<String>,

    /// Trust casts instead of checking them at runtime
    #[arg(long)]
    disable_cast_checking: bool,

    /// Keep the runtime support types even when nothing references them
    #[arg(long)]
    preserve_scaffolding_types: bool,

    /// Upper bound on pruning and narrowing rounds
    #[arg(long, default_value_t = OptimizerOptions::default().max_rounds)]
    max_rounds: usize,

    /// Print the optimized program
    #[arg(long)]
    print: bool,

    /// Write the optimized program as JSON
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// More logging, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed program: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no method named '{0}' in the program")]
    UnknownMethod(String),

    #[error(transparent)]
    Internal(#[from] InternalCompilerError),
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_module("globopt", level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    if !args.program.is_file() {
        Args::command()
            .error(
                ErrorKind::InvalidValue,
                format!("Input path '{}' is not a file!", args.program.display()),
            )
            .exit()
    }

    if let Err(error) = run(&args) {
        match &error {
            CliError::Internal(error) => eprintln!("{}", error.report()),
            error => eprintln!("{}: {error}", "error".red().bold()),
        }

        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let contents = std::fs::read_to_string(&args.program).map_err(|source| CliError::Io {
        path: args.program.clone(),
        source,
    })?;
    let mut program: Program = serde_json::from_str(&contents)?;
    program.validate()?;

    let options = OptimizerOptions {
        disable_cast_checking: args.disable_cast_checking,
        preserve_scaffolding_types: args.preserve_scaffolding_types,
        max_rounds: args.max_rounds,
    };

    // Split points are resolved before optimizing, while every name exists
    let split_points = args
        .split_points
        .iter()
        .map(|name| {
            program
                .find_method(name)
                .ok_or_else(|| CliError::UnknownMethod(name.clone()))
        })
        .collect::<Result<Vec<MethodId>, _>>()?;

    // Deferred entries must survive pruning like any other entry
    let initial_entries = program.entry_methods.clone();
    program.entry_methods.extend(split_points.iter().copied());

    let (oracle, stats) = Optimizer::new(options).optimize(&mut program)?;
    program.entry_methods = initial_entries;

    info!("optimization finished after {} rounds", stats.rounds);
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if args.print {
        pretty_print_program(&program);
    }

    if !split_points.is_empty() {
        let assignment = FragmentPartitioner::new(&program, &oracle).partition(&split_points)?;

        for fragment in 0..assignment.fragment_count() {
            println!("{}", format!("fragment {fragment}:").bright_red());

            for atom in assignment.atoms_in(fragment) {
                println!("    {}", atom.describe(&program));
            }
        }
    }

    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&program)?;
        std::fs::write(output, json).map_err(|source| CliError::Io {
            path: output.clone(),
            source,
        })?;
    }

    Ok(())
}
