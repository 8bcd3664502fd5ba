//! Classifies a compiled program for the parallel executor (§4.6). Walks
//! bytecode directly, not the AST, so the classification reflects the
//! post-fusion program the VM actually runs.

use std::collections::HashSet;

use crate::bytecode::{ActionPattern, Builtin, CompiledProgram, Op};
use crate::resolve::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Unsafe,
    Stateless,
    Aggregatable,
}

#[derive(Debug, Clone)]
pub struct ParallelAnalysis {
    pub classification: Classification,
    /// Set for `Unsafe`: which condition tripped it.
    pub reason: Option<String>,
    /// Written in the main loop, read in `END`: cross-worker sums/merges.
    pub aggregated_scalars: Vec<u32>,
    pub aggregated_arrays: Vec<u32>,
    /// Written in `BEGIN`, read in the main loop: initial state every worker
    /// must start from unchanged, not a cross-worker reduction target.
    pub seed_scalars: Vec<u32>,
    pub seed_arrays: Vec<u32>,
}

impl ParallelAnalysis {
    fn unsafe_because(reason: impl Into<String>) -> Self {
        ParallelAnalysis {
            classification: Classification::Unsafe,
            reason: Some(reason.into()),
            aggregated_scalars: Vec::new(),
            aggregated_arrays: Vec::new(),
            seed_scalars: Vec::new(),
            seed_arrays: Vec::new(),
        }
    }
}

pub fn analyze(program: &CompiledProgram, rs: &str) -> ParallelAnalysis {
    if rs.chars().count() != 1 {
        return ParallelAnalysis::unsafe_because(format!(
            "RS {rs:?} is not a single character the chunk splitter can split on"
        ));
    }

    for action in &program.actions {
        if matches!(action.pattern, ActionPattern::Range(_, _)) {
            return ParallelAnalysis::unsafe_because("a range pattern is stateful across records");
        }
        if let ActionPattern::Expr(code) = &action.pattern {
            if let Some(reason) = find_unsafe_op(code) {
                return ParallelAnalysis::unsafe_because(reason);
            }
        }
        if let Some(reason) = find_unsafe_op(&action.body) {
            return ParallelAnalysis::unsafe_because(reason);
        }
    }

    let mut begin_scalar_writes = HashSet::new();
    let mut begin_array_writes = HashSet::new();
    let mut main_scalar_writes = HashSet::new();
    let mut main_array_writes = HashSet::new();
    let mut main_scalar_reads = HashSet::new();
    let mut main_array_reads = HashSet::new();
    let mut end_scalar_reads = HashSet::new();
    let mut end_array_reads = HashSet::new();

    for action in &program.actions {
        let (sw, aw, sr, ar) = collect_global_accesses(&action.body);
        match action.pattern {
            ActionPattern::Begin => {
                begin_scalar_writes.extend(sw);
                begin_array_writes.extend(aw);
            }
            ActionPattern::End => {
                end_scalar_reads.extend(sr);
                end_array_reads.extend(ar);
            }
            _ => {
                main_scalar_writes.extend(sw);
                main_array_writes.extend(aw);
                main_scalar_reads.extend(sr);
                main_array_reads.extend(ar);
            }
        }
    }

    // Written in main, read in END: a cross-worker reduction target (§4.6
    // "Aggregatable"). Kept disjoint from `seed_*` below — a BEGIN-seeded
    // variable that main also happens to read in END is still just initial
    // state unless main itself writes it too.
    let mut aggregated_scalars: Vec<u32> = main_scalar_writes.intersection(&end_scalar_reads).copied().collect();
    let mut aggregated_arrays: Vec<u32> = main_array_writes.intersection(&end_array_reads).copied().collect();
    aggregated_scalars.sort_unstable();
    aggregated_scalars.dedup();
    aggregated_arrays.sort_unstable();
    aggregated_arrays.dedup();

    // Written in BEGIN, read in main: every worker must start from this
    // value unchanged (§4.6 "treated as initial state"), never reset to
    // Null and never merged back across workers.
    let mut seed_scalars: Vec<u32> = begin_scalar_writes.intersection(&main_scalar_reads).copied().collect();
    let mut seed_arrays: Vec<u32> = begin_array_writes.intersection(&main_array_reads).copied().collect();
    seed_scalars.sort_unstable();
    seed_scalars.dedup();
    seed_arrays.sort_unstable();
    seed_arrays.dedup();

    if aggregated_scalars.is_empty() && aggregated_arrays.is_empty() {
        ParallelAnalysis {
            classification: Classification::Stateless,
            reason: None,
            aggregated_scalars,
            aggregated_arrays,
            seed_scalars,
            seed_arrays,
        }
    } else {
        ParallelAnalysis {
            classification: Classification::Aggregatable,
            reason: None,
            aggregated_scalars,
            aggregated_arrays,
            seed_scalars,
            seed_arrays,
        }
    }
}

fn find_unsafe_op(code: &[Op]) -> Option<&'static str> {
    for op in code {
        match op {
            Op::Getline(_) | Op::GetlineVar(..) | Op::GetlineField(_) => {
                return Some("getline is inter-record control");
            }
            Op::Next | Op::NextFile => return Some("next/nextfile is inter-record control"),
            Op::CallBuiltin(Builtin::System, _) => return Some("system() has unordered side effects"),
            Op::Print(_, Some(_)) | Op::Printf(_, Some(_)) => {
                return Some("redirected output is a shared sink");
            }
            Op::CallUser { .. } => return Some("user function calls are conservatively unsafe"),
            _ => {}
        }
    }
    None
}

/// `(scalar_writes, array_writes, scalar_reads, array_reads)`, global indices only.
fn collect_global_accesses(code: &[Op]) -> (HashSet<u32>, HashSet<u32>, HashSet<u32>, HashSet<u32>) {
    let mut sw = HashSet::new();
    let mut aw = HashSet::new();
    let mut sr = HashSet::new();
    let mut ar = HashSet::new();
    for op in code {
        match op {
            Op::LoadScalar(Scope::Global, i) => {
                sr.insert(*i);
            }
            Op::StoreScalar(Scope::Global, i) | Op::AugScalar(Scope::Global, i, _) | Op::IncDecScalar(Scope::Global, i, _) => {
                sw.insert(*i);
            }
            Op::ArrayGet(Scope::Global, i) | Op::ArrayIn(Scope::Global, i) => {
                ar.insert(*i);
            }
            Op::ArraySet(Scope::Global, i)
            | Op::ArrayDelete(Scope::Global, i)
            | Op::ArrayClear(Scope::Global, i)
            | Op::AugArray(Scope::Global, i, _)
            | Op::IncDecArray(Scope::Global, i, _)
            | Op::SubArray(Scope::Global, i, _)
            | Op::CallSplit { arr_scope: Scope::Global, arr_idx: i, .. } => {
                aw.insert(*i);
            }
            Op::ForIn { arr_scope: Scope::Global, arr_idx, .. } => {
                ar.insert(*arr_idx);
            }
            Op::ScalarCmpNumJump(Scope::Global, i, _, _, _) | Op::SubScalar(Scope::Global, i, _) => {
                sr.insert(*i);
            }
            _ => {}
        }
    }
    (sw, aw, sr, ar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn analyze_src(src: &str, rs: &str) -> ParallelAnalysis {
        let tokens = Lexer::new(src).tokenize();
        let prog = Parser::new(tokens).parse().unwrap();
        let compiled = crate::compiler::compile(&prog).unwrap();
        analyze(&compiled, rs)
    }

    #[test]
    fn simple_sum_is_aggregatable() {
        let a = analyze_src("{ sum += $1 } END { print sum }", "\n");
        assert_eq!(a.classification, Classification::Aggregatable);
        assert_eq!(a.aggregated_scalars.len(), 1);
    }

    #[test]
    fn begin_seeded_variable_is_not_aggregated() {
        let a = analyze_src("BEGIN { base = 100 } { print $1 + base }", "\n");
        assert_eq!(a.classification, Classification::Stateless);
        assert!(a.aggregated_scalars.is_empty());
        assert_eq!(a.seed_scalars.len(), 1);
    }

    #[test]
    fn pure_filter_is_stateless() {
        let a = analyze_src("/foo/ { print }", "\n");
        assert_eq!(a.classification, Classification::Stateless);
    }

    #[test]
    fn getline_is_unsafe() {
        let a = analyze_src("{ getline }", "\n");
        assert_eq!(a.classification, Classification::Unsafe);
    }

    #[test]
    fn range_pattern_is_unsafe() {
        let a = analyze_src("/start/,/end/ { print }", "\n");
        assert_eq!(a.classification, Classification::Unsafe);
    }

    #[test]
    fn multi_char_rs_is_unsafe() {
        let a = analyze_src("{ print }", "::");
        assert_eq!(a.classification, Classification::Unsafe);
    }
}
