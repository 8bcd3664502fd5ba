//! Driver/worker fan-out for a program the analyser has classified as
//! `Stateless` or `Aggregatable` (§4.7 "Execution"). One driver `Vm` runs
//! `BEGIN`, seeds a worker `Vm` per chunk, then merges the workers' output
//! and global state back before running `END`.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use rayon::iter::{ParallelBridge, ParallelIterator};

use crate::bytecode::CompiledProgram;
use crate::config::Config;
use crate::error::RuntimeError;
use crate::value::Value;
use crate::vm::frame::Array;
use crate::vm::Vm;

use super::analyzer::ParallelAnalysis;
use super::chunk::Chunker;

/// A caller-supplied stop signal, checked at the chunk reader, each worker's
/// per-chunk entry point, and the result collector (§5 "Cancellation").
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct WorkerResult {
    chunk_id: u64,
    output: Vec<u8>,
    scalars: Vec<Value>,
    arrays: Vec<Array>,
}

/// Runs `program` over `input` using `analysis`'s aggregation plan, fanning
/// the main loop out across `workers` worker `Vm`s. Returns the same
/// `(output, exit_code)` shape as `Vm::run`.
pub fn execute(
    program: &CompiledProgram,
    input: impl Read + Send + 'static,
    config: &Config,
    analysis: &ParallelAnalysis,
    workers: usize,
    cancel: &CancellationToken,
) -> Result<(String, i32), RuntimeError> {
    let mut driver = Vm::new(program, config);
    if driver.run_begin_only()? {
        let code = driver.exit_code().unwrap_or(0);
        return Ok((String::from_utf8_lossy(&driver.take_output()).into_owned(), code));
    }
    driver.apply_variables(&config.variables);

    let mut output = driver.take_output();
    let baseline_scalars = driver.global_scalars().to_vec();
    let baseline_arrays = driver.global_arrays().to_vec();

    let chunk_size = config.chunk_size;
    let rs = config.rs.clone();
    let mut chunker = Chunker::new(input, chunk_size, &rs);

    let nworkers = workers.max(1);
    let (chunk_tx, chunk_rx) = mpsc::sync_channel(nworkers * 2);
    let reader_cancel = cancel.clone();
    let reader = thread::spawn(move || -> std::io::Result<u64> {
        loop {
            if reader_cancel.is_cancelled() {
                break;
            }
            match chunker.next_chunk()? {
                Some(c) => {
                    if chunk_tx.send(c).is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(chunker.total_records())
    });

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nworkers)
        .build()
        .map_err(|e| RuntimeError::Integrity(e.to_string()))?;

    let aggregated_scalars = &analysis.aggregated_scalars;
    let aggregated_arrays = &analysis.aggregated_arrays;

    let mut results: Vec<WorkerResult> = pool.install(|| {
        chunk_rx
            .into_iter()
            .par_bridge()
            .map(|chunk| -> Result<WorkerResult, RuntimeError> {
                if cancel.is_cancelled() {
                    return Err(RuntimeError::Integrity("cancelled".to_string()));
                }
                let mut worker = Vm::new(program, config);

                // The baseline (driver's post-BEGIN state) carries every
                // slot over unchanged, including BEGIN-seeded variables the
                // analyser reports in `seed_scalars`/`seed_arrays` — those
                // are initial state, not a reduction target, and must not be
                // reset or merged. Only `aggregated_*` (main-written,
                // END-read) gets reset here so each worker's result is a
                // pure delta to be summed back in below.
                let mut scalars = baseline_scalars.clone();
                for &idx in aggregated_scalars {
                    if let Some(slot) = scalars.get_mut(idx as usize) {
                        *slot = Value::Null;
                    }
                }
                worker.set_global_scalars(scalars);

                let mut arrays = baseline_arrays.clone();
                for &idx in aggregated_arrays {
                    let ai = super::ARRAY_ARENA_BASE + idx as usize;
                    if let Some(slot) = arrays.get_mut(ai) {
                        slot.clear();
                    }
                }
                worker.set_global_arrays(arrays);
                worker.set_nr_fnr(chunk.start_nr as f64);

                worker.run_chunk(&chunk.data)?;
                Ok(WorkerResult {
                    chunk_id: chunk.chunk_id,
                    output: worker.take_output(),
                    scalars: worker.global_scalars().to_vec(),
                    arrays: worker.global_arrays().to_vec(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    let total_nr = reader.join().expect("chunk reader thread panicked").map_err(|e| RuntimeError::Integrity(e.to_string()))?;

    results.sort_by_key(|r| r.chunk_id);

    let mut merged_scalars = baseline_scalars;
    let mut merged_arrays = baseline_arrays;

    for r in &results {
        output.extend_from_slice(&r.output);
        for &idx in aggregated_scalars {
            let i = idx as usize;
            if let Some(v) = r.scalars.get(i) {
                merge_scalar_into(&mut merged_scalars[i], v);
            }
        }
        for &idx in aggregated_arrays {
            let ai = super::ARRAY_ARENA_BASE + idx as usize;
            if let Some(src) = r.arrays.get(ai) {
                merge_array_into(&mut merged_arrays[ai], src);
            }
        }
    }

    driver.set_global_scalars(merged_scalars);
    driver.set_global_arrays(merged_arrays);
    driver.set_nr_fnr(total_nr as f64);

    driver.run_end_only()?;
    output.extend_from_slice(&driver.take_output());

    let code = driver.exit_code().unwrap_or(0);
    Ok((String::from_utf8_lossy(&output).into_owned(), code))
}

/// Combines one worker's contribution to an aggregated scalar into the
/// running merge: numeric values sum, everything else keeps the latest
/// non-empty string (§4.6 "Aggregatable"). Each worker started from a
/// reset (`Null`) copy of this slot, so summing every worker's result on
/// top of the driver's own post-`BEGIN` value double-counts nothing.
fn merge_scalar_into(acc: &mut Value, next: &Value) {
    if next.is_numeric_like() {
        *acc = Value::Num(acc.as_number() + next.as_number());
        return;
    }
    let s = next.as_string("%.6g");
    if !s.is_empty() {
        *acc = Value::Str(s);
    }
}

fn merge_array_into(acc: &mut Array, next: &Array) {
    for (k, v) in next {
        match acc.get_mut(k) {
            Some(existing) => merge_scalar_into(existing, v),
            None => {
                acc.insert(k.clone(), v.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use std::io::Cursor;

    fn compile_src(src: &str) -> CompiledProgram {
        let tokens = Lexer::new(src).tokenize();
        let prog = Parser::new(tokens).parse().unwrap();
        compile(&prog).unwrap()
    }

    #[test]
    fn stateless_filter_concatenates_in_chunk_order() {
        let program = compile_src("{ print $1 }");
        let config = Config { chunk_size: 8, ..Config::default() };
        let analysis = super::super::analyzer::analyze(&program, &config.rs);
        let cancel = CancellationToken::new();
        let data = b"1\n2\n3\n4\n5\n6\n".to_vec();
        let (out, code) = execute(&program, Cursor::new(data), &config, &analysis, 2, &cancel).unwrap();
        assert_eq!(out, "1\n2\n3\n4\n5\n6\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn aggregatable_sum_matches_sequential_total() {
        let program = compile_src("{ sum += $1 } END { print sum }");
        let config = Config { chunk_size: 8, ..Config::default() };
        let analysis = super::super::analyzer::analyze(&program, &config.rs);
        let cancel = CancellationToken::new();
        let data = b"1\n2\n3\n4\n5\n".to_vec();
        let (out, _) = execute(&program, Cursor::new(data), &config, &analysis, 3, &cancel).unwrap();
        assert_eq!(out, "15\n");
    }

    #[test]
    fn begin_seeded_variable_reaches_every_worker_unchanged() {
        let program = compile_src("BEGIN { base = 100 } { print $1 + base }");
        let config = Config { chunk_size: 4, ..Config::default() };
        let analysis = super::super::analyzer::analyze(&program, &config.rs);
        let cancel = CancellationToken::new();
        let data = b"1\n2\n3\n4\n".to_vec();
        let (out, _) = execute(&program, Cursor::new(data), &config, &analysis, 4, &cancel).unwrap();
        assert_eq!(out, "101\n102\n103\n104\n");
    }
}
