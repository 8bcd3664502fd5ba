//! Lowers a resolved AST into `bytecode::CompiledProgram` (§4.4).
//!
//! Structurally this plays the role the teacher's top-level `Compiler`
//! struct plays for Perl opcodes: one pass per function/rule body, a shared
//! literal pool, and a peephole pass run once each block is fully emitted.
//! The AWK-specific pieces (pattern compilation, getline/printf/sub
//! lowering, the array-vs-scalar call-site convention) replace the
//! teacher's Perl statement/expression lowering.

mod expr;
mod func;
mod pattern;
mod peephole;
mod stmt;

use std::collections::HashMap;

use crate::ast::Program;
use crate::bytecode::{CompiledProgram, Op, PoolBuilder};
use crate::error::CompileError;
use crate::resolve::{self, SymbolTable};

/// How `continue` inside the loop currently being compiled should resolve.
pub(crate) enum ContinueTarget {
    /// The jump-back target is already fixed (e.g. a `while`'s test, which
    /// precedes the body).
    Known(usize),
    /// The target isn't known until the body finishes compiling (e.g. a
    /// `for`'s step, or a `do/while`'s test) — patched once we reach it.
    PatchToHere,
}

pub(crate) struct LoopCx {
    pub break_patches: Vec<usize>,
    pub continue_target: ContinueTarget,
    pub continue_patches: Vec<usize>,
    /// `true` for a `for (k in arr)` loop, where `break` compiles to the
    /// dedicated `BreakForIn` opcode instead of a patched jump.
    pub is_for_in: bool,
}

/// Per-compilation state, threaded through every function body and rule.
/// `cur_func` switches name resolution between globals-only (`None`, for
/// BEGIN/END/pattern/main-rule code) and a specific function's locals.
pub struct Compiler<'a> {
    symbols: &'a SymbolTable,
    pools: PoolBuilder,
    cur_func: Option<String>,
    loops: Vec<LoopCx>,
    next_range_idx: u32,
}

pub fn compile(program: &Program) -> Result<CompiledProgram, CompileError> {
    let symbols = resolve::resolve(program).map_err(CompileError::Resolve)?;
    let mut c = Compiler {
        symbols: &symbols,
        pools: PoolBuilder::default(),
        cur_func: None,
        loops: Vec::new(),
        next_range_idx: 0,
    };

    // Declared order must match `FunctionSig::index` so `CallUser::func_idx`
    // lines up with `functions[idx]`.
    let mut ordered: Vec<&str> = symbols.functions.keys().map(|s| s.as_str()).collect();
    ordered.sort_by_key(|name| symbols.function(name).unwrap().index);

    let mut functions = Vec::with_capacity(ordered.len());
    let mut function_index = HashMap::new();
    for name in ordered {
        let block = func::compile_function(&mut c, name)?;
        function_index.insert(name.to_string(), functions.len() as u32);
        functions.push(block);
    }

    let mut actions = Vec::with_capacity(program.rules.len());
    for rule in &program.rules {
        actions.push(pattern::compile_rule(&mut c, rule)?);
    }

    Ok(CompiledProgram {
        num_pool: c.pools.num_pool,
        str_pool: c.pools.str_pool,
        regex_pool: c.pools.regex_pool,
        global_scalar_names: symbols.globals_scalar.clone(),
        global_array_names: symbols.globals_array.clone(),
        functions,
        function_index,
        actions,
        num_range_patterns: c.next_range_idx,
    })
}

/// Computes the relative offset a jump at `from` needs to land on `to`,
/// given the VM advances `pc` past the jump before applying it.
fn offset(from: usize, to: usize) -> i32 {
    to as i32 - (from as i32 + 1)
}

fn patch_jump_to(buf: &mut [Op], pos: usize, target: usize) {
    let off = offset(pos, target);
    match &mut buf[pos] {
        Op::Jump(o) | Op::JumpTrue(o) | Op::JumpFalse(o) => *o = off,
        Op::FieldIntCmpNumJump(_, _, _, o) => *o = off,
        Op::ScalarCmpNumJump(_, _, _, _, o) => *o = off,
        other => panic!("patch_jump_to on non-jump opcode: {other:?}"),
    }
}

fn patch_list_to_here(buf: &mut Vec<Op>, patches: &[usize]) {
    let here = buf.len();
    for &p in patches {
        patch_jump_to(buf, p, here);
    }
}
