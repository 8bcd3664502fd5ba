//! Command-line driver for the `awkvm` library (§6 "CLI surface").

use std::collections::HashMap;
use std::fs;
use std::io;
use std::process::ExitCode;

use clap::Parser;

use awkvm::config::{Config, RegexMode};
use awkvm::{CancellationToken, Classification};

/// A bytecode-compiled AWK interpreter with an optional data-parallel executor.
#[derive(Parser, Debug)]
#[command(name = "awkvm", version, about)]
struct Cli {
    /// Without -f: program text, then input files. With -f: input files only.
    /// Standard input is read when no files are given.
    args: Vec<String>,

    /// Read the program from a file (repeatable; bodies are concatenated).
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    program_files: Vec<String>,

    /// Sets FS (the field separator).
    #[arg(short = 'F', value_name = "SEP")]
    fs: Option<String>,

    /// Writes output to this file instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<String>,

    /// Pre-defines a variable as name=value (repeatable).
    #[arg(short = 'v', value_name = "NAME=VALUE")]
    assignments: Vec<String>,

    /// Number of parallel worker threads (1 = sequential).
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    jobs: usize,

    /// Parallel chunk size in bytes.
    #[arg(long = "chunk-size", default_value_t = 4 * 1024 * 1024)]
    chunk_size: usize,

    /// Use leftmost-first regex semantics instead of POSIX leftmost-longest.
    #[arg(long = "no-posix")]
    no_posix: bool,

    /// Use POSIX (leftmost-longest) regex semantics. Default; accepted for symmetry with --no-posix.
    #[arg(long = "posix", conflicts_with = "no_posix")]
    posix: bool,

    /// Print the compiled bytecode instead of running the program.
    #[arg(long = "dump-bytecode")]
    dump_bytecode: bool,

    /// Print the parallel-safety classification instead of running the program.
    #[arg(long = "dump-parallel")]
    dump_parallel: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (source, files) = match load_source_and_files(&cli) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("awkvm: {e}");
            return ExitCode::FAILURE;
        }
    };

    let program = match awkvm::compile(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("awkvm: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dump_bytecode {
        print!("{}", program.disassemble());
        return ExitCode::SUCCESS;
    }

    let config = match build_config(&cli, files) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("awkvm: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dump_parallel {
        let analysis = program.can_parallelize(&config.rs);
        match analysis.classification {
            Classification::Unsafe => println!("unsafe: {}", analysis.reason.unwrap_or_default()),
            Classification::Stateless => println!("stateless"),
            Classification::Aggregatable => println!(
                "aggregatable: {} scalar(s), {} array(s)",
                analysis.aggregated_scalars.len(),
                analysis.aggregated_arrays.len()
            ),
        }
        return ExitCode::SUCCESS;
    }

    // Real input files (if any) are opened by `Program::run` itself from
    // `config.args`; this is only the fallback stream for when none are
    // plain filenames.
    let cancel = CancellationToken::new();
    match program.run(io::stdin(), &config, &cancel) {
        Ok(outcome) => {
            print!("{}", outcome.output);
            ExitCode::from(outcome.exit_code.rem_euclid(256) as u8)
        }
        Err(e) => {
            eprintln!("awkvm: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_source_and_files(cli: &Cli) -> Result<(String, Vec<String>), String> {
    if !cli.program_files.is_empty() {
        let mut combined = String::new();
        for path in &cli.program_files {
            let text = fs::read_to_string(path).map_err(|e| format!("reading {path}: {e}"))?;
            combined.push_str(&text);
            combined.push('\n');
        }
        return Ok((combined, cli.args.clone()));
    }
    let mut rest = cli.args.iter().cloned();
    let source = rest.next().ok_or_else(|| "no program text given (use -f or a program argument)".to_string())?;
    Ok((source, rest.collect()))
}

fn build_config(cli: &Cli, files: Vec<String>) -> Result<Config, String> {
    let mut config = Config::default();
    if let Some(fs) = &cli.fs {
        config.fs = fs.clone();
    }
    config.output = cli.output.as_ref().map(std::path::PathBuf::from);
    config.parallel = cli.jobs.max(1);
    config.chunk_size = cli.chunk_size.max(1);
    config.regex_mode = if cli.no_posix { RegexMode::LeftmostFirst } else { RegexMode::Posix };

    let mut variables = HashMap::new();
    for assignment in &cli.assignments {
        let (name, value) = assignment.split_once('=').ok_or_else(|| format!("-v {assignment}: expected name=value"))?;
        variables.insert(name.to_string(), value.to_string());
    }
    config.variables = variables;
    config.args = files;

    Ok(config)
}
