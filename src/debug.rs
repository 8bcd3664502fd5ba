//! Bytecode disassembly (`--dump-bytecode`). Generalizes the teacher's
//! `disassemble()`: instead of walking a packed byte stream and decoding a
//! variable-width instruction at each program counter, `Op` is already a
//! typed enum, so this just prints `{index:04}: {op:?}` for every action and
//! function body, plus the literal/regex pools and the function table.

use std::fmt::Write as _;

use crate::bytecode::{ActionPattern, CompiledProgram};

pub fn disassemble(program: &CompiledProgram) -> String {
    let mut out = String::new();

    writeln!(out, "num pool ({} entries):", program.num_pool.len()).unwrap();
    for (i, n) in program.num_pool.iter().enumerate() {
        writeln!(out, "  [{i}] {n}").unwrap();
    }
    writeln!(out, "str pool ({} entries):", program.str_pool.len()).unwrap();
    for (i, s) in program.str_pool.iter().enumerate() {
        writeln!(out, "  [{i}] {s:?}").unwrap();
    }
    writeln!(out, "regex pool ({} entries):", program.regex_pool.len()).unwrap();
    for (i, r) in program.regex_pool.iter().enumerate() {
        writeln!(out, "  [{i}] /{r}/").unwrap();
    }

    writeln!(out, "\nglobals: {} scalar, {} array", program.num_globals_scalar(), program.num_globals_array()).unwrap();
    for (i, n) in program.global_scalar_names.iter().enumerate() {
        writeln!(out, "  scalar[{i}] {n}").unwrap();
    }
    for (i, n) in program.global_array_names.iter().enumerate() {
        writeln!(out, "  array[{i}] {n}").unwrap();
    }

    writeln!(out, "\nfunctions ({}):", program.functions.len()).unwrap();
    for (i, f) in program.functions.iter().enumerate() {
        writeln!(
            out,
            "  [{i}] {} ({} scalar params, {} array params, {} scalar locals, {} array locals)",
            f.name, f.num_scalar_params, f.num_array_params, f.num_locals_scalar, f.num_locals_array
        )
        .unwrap();
        disassemble_block(&mut out, &f.code);
    }

    writeln!(out, "\nactions ({}):", program.actions.len()).unwrap();
    for (i, a) in program.actions.iter().enumerate() {
        match &a.pattern {
            ActionPattern::Always => writeln!(out, "  [{i}] always").unwrap(),
            ActionPattern::Begin => writeln!(out, "  [{i}] BEGIN").unwrap(),
            ActionPattern::End => writeln!(out, "  [{i}] END").unwrap(),
            ActionPattern::Expr(code) => {
                writeln!(out, "  [{i}] pattern:").unwrap();
                disassemble_block(&mut out, code);
            }
            ActionPattern::Range(start, end) => {
                writeln!(out, "  [{i}] range start:").unwrap();
                disassemble_block(&mut out, start);
                writeln!(out, "  [{i}] range end:").unwrap();
                disassemble_block(&mut out, end);
            }
        }
        writeln!(out, "  [{i}] body:").unwrap();
        disassemble_block(&mut out, &a.body);
    }

    out
}

fn disassemble_block(out: &mut String, code: &[crate::bytecode::Op]) {
    for (pc, op) in code.iter().enumerate() {
        writeln!(out, "    {pc:04}: {op:?}").unwrap();
    }
}
