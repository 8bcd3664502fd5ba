//! Peephole fusion pass (§4.4 point 4). Runs once per emitted block, after
//! every jump inside it has already been patched to a concrete target, and
//! rewrites fixed windows in place, padding with `Nop` so the block's
//! instruction count — and therefore every other jump's offset, inside or
//! outside this block — never needs rebasing. Fusion never crosses a block
//! boundary and is semantics-preserving: observable only in disassembly.
//!
//! One window from spec §4.4 doesn't carry over 1:1: "two typed global
//! loads feeding Add fuse into typed-load + typed-add" assumes a storage
//! representation with separate typed registers (the teacher's Z80 model).
//! Here a scalar slot holds a dynamically-tagged `Value` regardless of
//! inferred type, so there's no separate `LoadScalarNum` opcode to fuse
//! into — the compiler already specializes the *operator* (`AddNum` vs
//! `Add`) directly from syntactic inference in `expr.rs`, which captures the
//! same intent without a load-side counterpart. Recorded in DESIGN.md.

use crate::bytecode::{CmpOp, Op};

pub(super) fn fuse(code: &mut Vec<Op>, num_pool: &[f64]) {
    let mut i = 0;
    while i < code.len() {
        if let Some((fused, window_len)) = try_fuse_at(code, i, num_pool) {
            code[i] = fused;
            for slot in code.iter_mut().take(i + window_len).skip(i + 1) {
                *slot = Op::Nop;
            }
            i += window_len;
        } else {
            i += 1;
        }
    }
}

fn try_fuse_at(code: &[Op], pos: usize, num_pool: &[f64]) -> Option<(Op, usize)> {
    // FieldInt(k); Num(n); Cmp; JumpFalse(off) -> FieldIntCmpNumJump(k, n, cmp, off')
    //
    // Deliberately matches the *generic* `Cmp`, not `CmpNum`: a bare field is
    // NumStr, whose comparison against a constant depends at runtime on
    // whether its text looks numeric (§4.1), so the compiler's syntactic
    // `is_numeric_expr` never proves a field read numeric and `CmpNum` is
    // never emitted for one. The fused opcode still has to run the full
    // Str-vs-NumStr comparison, just without the intermediate `Value`s.
    if let [Op::LoadFieldImm(k), Op::PushNum(ni), Op::Cmp(op), Op::JumpFalse(off)] =
        code.get(pos..pos + 4)?
    {
        let n = *num_pool.get(*ni as usize)?;
        return Some((Op::FieldIntCmpNumJump(*k, n, *op, off + 3), 4));
    }

    // FieldInt(i); FieldInt(j); Add -> AddFields(i, j)
    if let [Op::LoadFieldImm(i), Op::LoadFieldImm(j), Op::Add | Op::AddNum] = code.get(pos..pos + 3)? {
        return Some((Op::AddFields(*i, *j), 3));
    }

    // LoadScalar(scope,idx); Num(n); Cmp; JumpFalse(off) -> ScalarCmpNumJump(..., off')
    if let [Op::LoadScalar(scope, idx), Op::PushNum(ni), Op::CmpNum(op), Op::JumpFalse(off)] =
        code.get(pos..pos + 4)?
    {
        let n = *num_pool.get(*ni as usize)?;
        return Some((Op::ScalarCmpNumJump(*scope, *idx, n, *op, off + 3), 4));
    }

    // Num(c); LoadScalar(scope,idx); LessNum; JumpFalse(off) -> ScalarCmpNumJump(.., Ge, off')
    // (operand inversion: `c < x` becomes `x >= c`.)
    if let [Op::PushNum(ni), Op::LoadScalar(scope, idx), Op::CmpNum(CmpOp::Lt), Op::JumpFalse(off)] =
        code.get(pos..pos + 4)?
    {
        let n = *num_pool.get(*ni as usize)?;
        return Some((Op::ScalarCmpNumJump(*scope, *idx, n, CmpOp::Ge, off + 3), 4));
    }

    None
}
