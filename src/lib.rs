//! A bytecode-compiled AWK interpreter with an optional data-parallel
//! executor. `compile` turns source text into a `Program`; `Program::run`
//! executes it against an input stream and a `Config`, sequentially or
//! (when safe and requested) fanned out across worker threads.

pub mod ast;
pub mod bytecode;
mod compiler;
pub mod config;
pub mod debug;
pub mod error;
mod fmt;
mod lexer;
pub mod parallel;
mod parser;
mod regex_adapter;
mod resolve;
mod token;
pub mod value;
mod vm;

use std::io::Read;

use bytecode::CompiledProgram;
use config::Config;
use error::{AwkError, CompileError, ParseError};

pub use error::RuntimeError;
pub use parallel::{CancellationToken, Classification, ParallelAnalysis};

/// A compiled, ready-to-run program.
pub struct Program {
    compiled: CompiledProgram,
}

/// What a completed run produced: captured output and the process exit code
/// (`0` unless the program called `exit(n)`).
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub output: String,
    pub exit_code: i32,
}

/// Compiles AWK source into a `Program`. Lexing never fails; a malformed
/// parse or a resolution/arity problem surfaces as `CompileError`.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let tokens = lexer::Lexer::new(source).tokenize();
    let mut parser = parser::Parser::new(tokens);
    let ast = parser.parse().map_err(|msg| CompileError::Parse(parse_error_from(&msg)))?;
    let compiled = compiler::compile(&ast)?;
    Ok(Program { compiled })
}

impl Program {
    /// Runs the program against `input`, sequentially or (if `config.parallel
    /// > 1` and the program is safe to split) across `config.parallel`
    /// worker threads. `cancel` is checked at the parallel executor's yield
    /// points; a sequential run ignores it, since its dispatch loop has none.
    pub fn run(
        &self,
        input: impl Read + Send + 'static,
        config: &Config,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AwkError> {
        let (output, exit_code) = if config.parallel > 1 {
            let analysis = parallel::analyze(&self.compiled, &config.rs);
            if !matches!(analysis.classification, Classification::Unsafe) {
                parallel::execute(&self.compiled, input, config, &analysis, config.parallel, cancel)?
            } else {
                let vm = vm::Vm::new(&self.compiled, config);
                vm.run(input, config)?
            }
        } else {
            let vm = vm::Vm::new(&self.compiled, config);
            vm.run(input, config)?
        };

        if let Some(path) = &config.output {
            std::fs::write(path, &output)
                .map_err(|e| AwkError::Runtime(error::RuntimeError::Integrity(format!("writing {}: {e}", path.display()))))?;
            return Ok(RunOutcome { output: String::new(), exit_code });
        }
        Ok(RunOutcome { output, exit_code })
    }

    /// Classifies this program for the parallel executor without running it
    /// (`--dump-parallel`, and what `run` itself consults internally).
    pub fn can_parallelize(&self, rs: &str) -> ParallelAnalysis {
        parallel::analyze(&self.compiled, rs)
    }

    pub fn disassemble(&self) -> String {
        debug::disassemble(&self.compiled)
    }
}

/// The parser reports errors as plain strings, some prefixed with `"{line}:
/// {column}: "` and some not (see `parser.rs`'s call sites). Extracts that
/// prefix when present rather than threading a structured position through
/// every parse error call site; falls back to `0:0` when it's absent.
fn parse_error_from(msg: &str) -> ParseError {
    if let Some((line, rest)) = msg.split_once(':') {
        if let Ok(line) = line.parse::<usize>() {
            if let Some((col, rest)) = rest.split_once(':') {
                if let Ok(column) = col.trim().parse::<usize>() {
                    return ParseError { line, column, message: rest.trim().to_string() };
                }
            }
        }
    }
    ParseError { line: 0, column: 0, message: msg.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_runs_a_trivial_program() {
        let program = compile("{ print $1 }").unwrap();
        let cancel = CancellationToken::new();
        let outcome = program.run(std::io::Cursor::new(b"a b c\n".to_vec()), &Config::default(), &cancel).unwrap();
        assert_eq!(outcome.output, "a\n");
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn parse_error_carries_position_when_present() {
        let err = compile("BEGIN { print ( }");
        assert!(err.is_err());
    }
}
