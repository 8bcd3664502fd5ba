use crate::ast::{BinOp, Expr, GetlineSource, UnaryOp};
use crate::bytecode::{ArithOp, Builtin, CmpOp, GetlineSourceTag, IncDec, Op};
use crate::error::CompileError;
use crate::resolve::{Kind, Scope, VarRef};

use super::Compiler;

/// Lvalue shape for assignment, op-assign, pre/post inc-dec, sub/gsub
/// targets, and getline targets. Field targets carry no payload here: the
/// field-index expression is compiled by the caller at the point it's
/// needed, since the push order differs between assignment and
/// augmented-assignment.
enum Lv<'e> {
    Scalar(Scope, u32),
    Field(&'e Expr),
    Array(Scope, u32, &'e [Expr]),
}

fn lvalue_of<'e>(c: &Compiler, e: &'e Expr) -> Result<Lv<'e>, CompileError> {
    match e {
        Expr::Var(name) => {
            let r = resolve_checked(c, name, Kind::Scalar)?;
            Ok(Lv::Scalar(r.scope, r.index))
        }
        Expr::Field(k) => Ok(Lv::Field(k)),
        Expr::Index(name, idxs) => {
            let r = resolve_checked(c, name, Kind::Array)?;
            Ok(Lv::Array(r.scope, r.index, idxs))
        }
        _ => Err(CompileError::Check("not an assignable expression".to_string())),
    }
}

fn resolve_checked(c: &Compiler, name: &str, want: Kind) -> Result<VarRef, CompileError> {
    let r = c.symbols.resolve(c.cur_func.as_deref(), name);
    if r.kind != want {
        return Err(CompileError::Check(format!(
            "'{name}' used as {:?} but resolved as {:?}",
            want, r.kind
        )));
    }
    Ok(r)
}

fn binop_to_arith(op: BinOp) -> Option<ArithOp> {
    Some(match op {
        BinOp::Add => ArithOp::Add,
        BinOp::Sub => ArithOp::Sub,
        BinOp::Mul => ArithOp::Mul,
        BinOp::Div => ArithOp::Div,
        BinOp::Mod => ArithOp::Mod,
        BinOp::Pow => ArithOp::Pow,
        _ => return None,
    })
}

fn binop_to_cmp(op: BinOp) -> Option<CmpOp> {
    Some(match op {
        BinOp::Eq => CmpOp::Eq,
        BinOp::Ne => CmpOp::Ne,
        BinOp::Lt => CmpOp::Lt,
        BinOp::Le => CmpOp::Le,
        BinOp::Gt => CmpOp::Gt,
        BinOp::Ge => CmpOp::Ge,
        _ => return None,
    })
}

/// Conservative syntactic numeric-type inference used for the compiler's
/// type specialization (§4.4 point 3). This isn't a full type system — it
/// only recognizes expressions that are numeric by construction, not ones
/// that merely tend to hold numbers at runtime (e.g. plain field reads,
/// which are `NumStr` and must go through the generic, runtime-dispatched
/// family).
fn is_numeric_expr(c: &Compiler, e: &Expr) -> bool {
    match e {
        Expr::Number(_) => true,
        Expr::UnaryOp(UnaryOp::Neg | UnaryOp::Pos, inner) => is_numeric_expr(c, inner),
        Expr::BinOp(a, op, b) => {
            binop_to_arith(*op).is_some() && is_numeric_expr(c, a) && is_numeric_expr(c, b)
        }
        Expr::PreIncr(_) | Expr::PreDecr(_) | Expr::PostIncr(_) | Expr::PostDecr(_) => true,
        Expr::Var(name) => matches!(
            name.as_str(),
            "NR" | "NF" | "FNR" | "RSTART" | "RLENGTH" | "ARGC"
        ),
        Expr::Call(name, _) => matches!(
            name.as_str(),
            "length"
                | "index"
                | "split"
                | "sin"
                | "cos"
                | "atan2"
                | "exp"
                | "log"
                | "sqrt"
                | "int"
                | "rand"
                | "srand"
                | "match"
        ),
        Expr::Grouping(inner) => is_numeric_expr(c, inner),
        _ => false,
    }
}

fn push_bool(c: &mut Compiler, buf: &mut Vec<Op>, v: bool) {
    let idx = c.pools.add_num(if v { 1.0 } else { 0.0 });
    buf.push(Op::PushNum(idx));
}

/// Pops `idxs.len()` strings (joined by SUBSEP) to form one array key.
pub(super) fn compile_index_key(
    c: &mut Compiler,
    buf: &mut Vec<Op>,
    idxs: &[Expr],
) -> Result<(), CompileError> {
    for i in idxs {
        compile_expr(c, buf, i)?;
    }
    buf.push(Op::IndexMulti(idxs.len() as u32));
    Ok(())
}

/// Compiles an argument used where a builtin expects a regex source
/// string (`match`'s, `sub`/`gsub`'s pattern argument): a bare `/re/`
/// literal pushes its source text directly rather than being treated as a
/// standalone `$0 ~ /re/` boolean test.
fn compile_regex_source(c: &mut Compiler, buf: &mut Vec<Op>, e: &Expr) -> Result<(), CompileError> {
    if let Expr::Regex(pat) = e {
        let idx = c.pools.add_str(pat);
        buf.push(Op::PushStr(idx));
        Ok(())
    } else {
        compile_expr(c, buf, e)
    }
}

pub(super) fn compile_expr(c: &mut Compiler, buf: &mut Vec<Op>, e: &Expr) -> Result<(), CompileError> {
    match e {
        Expr::Number(n) => {
            let idx = c.pools.add_num(*n);
            buf.push(Op::PushNum(idx));
        }
        Expr::Str(s) => {
            let idx = c.pools.add_str(s);
            buf.push(Op::PushStr(idx));
        }
        Expr::Regex(pat) => {
            // Standalone `/re/` means `$0 ~ /re/`.
            let idx = c.pools.add_regex(pat);
            buf.push(Op::LoadFieldImm(0));
            buf.push(Op::MatchConst(idx, false));
        }
        Expr::Var(name) => {
            let r = resolve_checked(c, name, Kind::Scalar)?;
            buf.push(Op::LoadScalar(r.scope, r.index));
        }
        Expr::Field(k) => match k.as_ref() {
            Expr::Number(n) if *n >= 0.0 && n.fract() == 0.0 => {
                buf.push(Op::LoadFieldImm(*n as u32));
            }
            _ => {
                compile_expr(c, buf, k)?;
                buf.push(Op::LoadFieldDyn);
            }
        },
        Expr::Index(name, idxs) => {
            let r = resolve_checked(c, name, Kind::Array)?;
            compile_index_key(c, buf, idxs)?;
            buf.push(Op::ArrayGet(r.scope, r.index));
        }
        Expr::BinOp(a, BinOp::And, b) => {
            compile_expr(c, buf, a)?;
            let jf1 = buf.len();
            buf.push(Op::JumpFalse(0));
            compile_expr(c, buf, b)?;
            let jf2 = buf.len();
            buf.push(Op::JumpFalse(0));
            push_bool(c, buf, true);
            let jend = buf.len();
            buf.push(Op::Jump(0));
            let lfalse = buf.len();
            super::patch_jump_to(buf, jf1, lfalse);
            super::patch_jump_to(buf, jf2, lfalse);
            push_bool(c, buf, false);
            let lend = buf.len();
            super::patch_jump_to(buf, jend, lend);
        }
        Expr::BinOp(a, BinOp::Or, b) => {
            compile_expr(c, buf, a)?;
            let jt1 = buf.len();
            buf.push(Op::JumpTrue(0));
            compile_expr(c, buf, b)?;
            let jt2 = buf.len();
            buf.push(Op::JumpTrue(0));
            push_bool(c, buf, false);
            let jend = buf.len();
            buf.push(Op::Jump(0));
            let ltrue = buf.len();
            super::patch_jump_to(buf, jt1, ltrue);
            super::patch_jump_to(buf, jt2, ltrue);
            push_bool(c, buf, true);
            let lend = buf.len();
            super::patch_jump_to(buf, jend, lend);
        }
        Expr::BinOp(a, op, b) => {
            let numeric = is_numeric_expr(c, a) && is_numeric_expr(c, b);
            compile_expr(c, buf, a)?;
            compile_expr(c, buf, b)?;
            if let Some(arith) = binop_to_arith(*op) {
                buf.push(if numeric {
                    match arith {
                        ArithOp::Add => Op::AddNum,
                        ArithOp::Sub => Op::SubNum,
                        ArithOp::Mul => Op::MulNum,
                        ArithOp::Div => Op::DivNum,
                        ArithOp::Mod => Op::ModNum,
                        ArithOp::Pow => Op::PowNum,
                    }
                } else {
                    match arith {
                        ArithOp::Add => Op::Add,
                        ArithOp::Sub => Op::Sub,
                        ArithOp::Mul => Op::Mul,
                        ArithOp::Div => Op::Div,
                        ArithOp::Mod => Op::Mod,
                        ArithOp::Pow => Op::Pow,
                    }
                });
            } else if let Some(cmp) = binop_to_cmp(*op) {
                buf.push(if numeric { Op::CmpNum(cmp) } else { Op::Cmp(cmp) });
            } else {
                unreachable!("BinOp variant not arithmetic, comparison, And, or Or");
            }
        }
        Expr::UnaryOp(UnaryOp::Not, inner) => {
            compile_expr(c, buf, inner)?;
            buf.push(Op::Not);
        }
        Expr::UnaryOp(UnaryOp::Neg, inner) => {
            compile_expr(c, buf, inner)?;
            buf.push(Op::Neg);
        }
        Expr::UnaryOp(UnaryOp::Pos, inner) => {
            compile_expr(c, buf, inner)?;
            buf.push(Op::Pos);
        }
        Expr::PreIncr(inner) => compile_incdec(c, buf, inner, IncDec::PreInc)?,
        Expr::PreDecr(inner) => compile_incdec(c, buf, inner, IncDec::PreDec)?,
        Expr::PostIncr(inner) => compile_incdec(c, buf, inner, IncDec::PostInc)?,
        Expr::PostDecr(inner) => compile_incdec(c, buf, inner, IncDec::PostDec)?,
        Expr::Assign(lhs, rhs) => {
            compile_expr(c, buf, rhs)?;
            match lvalue_of(c, lhs)? {
                Lv::Scalar(scope, idx) => {
                    buf.push(Op::Dup);
                    buf.push(Op::StoreScalar(scope, idx));
                }
                Lv::Field(k) => {
                    buf.push(Op::Dup);
                    compile_expr(c, buf, k)?;
                    buf.push(Op::StoreFieldDyn);
                }
                Lv::Array(scope, idx, idxs) => {
                    buf.push(Op::Dup);
                    compile_index_key(c, buf, idxs)?;
                    buf.push(Op::ArraySet(scope, idx));
                }
            }
        }
        Expr::OpAssign(lhs, op, rhs) => {
            let arith = binop_to_arith(*op)
                .ok_or_else(|| CompileError::Check("invalid op-assign operator".to_string()))?;
            compile_expr(c, buf, rhs)?;
            match lvalue_of(c, lhs)? {
                Lv::Scalar(scope, idx) => buf.push(Op::AugScalar(scope, idx, arith)),
                Lv::Field(k) => {
                    compile_expr(c, buf, k)?;
                    buf.push(Op::AugField(arith));
                }
                Lv::Array(scope, idx, idxs) => {
                    compile_index_key(c, buf, idxs)?;
                    buf.push(Op::AugArray(scope, idx, arith));
                }
            }
        }
        Expr::Concat(a, b) => {
            compile_expr(c, buf, a)?;
            compile_expr(c, buf, b)?;
            buf.push(Op::Concat);
        }
        Expr::Ternary(cond, t, f) => {
            compile_expr(c, buf, cond)?;
            let jf = buf.len();
            buf.push(Op::JumpFalse(0));
            compile_expr(c, buf, t)?;
            let jend = buf.len();
            buf.push(Op::Jump(0));
            let lelse = buf.len();
            super::patch_jump_to(buf, jf, lelse);
            compile_expr(c, buf, f)?;
            let lend = buf.len();
            super::patch_jump_to(buf, jend, lend);
        }
        Expr::Match(a, b, negate) => {
            compile_expr(c, buf, a)?;
            if let Expr::Regex(pat) = b.as_ref() {
                let idx = c.pools.add_regex(pat);
                buf.push(Op::MatchConst(idx, *negate));
            } else {
                compile_expr(c, buf, b)?;
                buf.push(Op::MatchDyn(*negate));
            }
        }
        Expr::In(items, name) => {
            let r = resolve_checked(c, name, Kind::Array)?;
            compile_index_key(c, buf, items)?;
            buf.push(Op::ArrayIn(r.scope, r.index));
        }
        Expr::Getline { target, source } => compile_getline(c, buf, target, source)?,
        Expr::Grouping(inner) => compile_expr(c, buf, inner)?,
        Expr::Call(name, args) => compile_call(c, buf, name, args)?,
    }
    Ok(())
}

fn compile_incdec(
    c: &mut Compiler,
    buf: &mut Vec<Op>,
    target: &Expr,
    kind: IncDec,
) -> Result<(), CompileError> {
    match lvalue_of(c, target)? {
        Lv::Scalar(scope, idx) => buf.push(Op::IncDecScalar(scope, idx, kind)),
        Lv::Field(k) => {
            compile_expr(c, buf, k)?;
            buf.push(Op::IncDecField(kind));
        }
        Lv::Array(scope, idx, idxs) => {
            compile_index_key(c, buf, idxs)?;
            buf.push(Op::IncDecArray(scope, idx, kind));
        }
    }
    Ok(())
}

fn compile_getline(
    c: &mut Compiler,
    buf: &mut Vec<Op>,
    target: &Option<Box<Expr>>,
    source: &GetlineSource,
) -> Result<(), CompileError> {
    let tag = match source {
        GetlineSource::Main => GetlineSourceTag::Main,
        GetlineSource::File(_) => GetlineSourceTag::File,
        GetlineSource::Command(_) => GetlineSourceTag::Command,
    };
    match source {
        GetlineSource::Main => {}
        GetlineSource::File(e) | GetlineSource::Command(e) => compile_expr(c, buf, e)?,
    }
    match target {
        None => buf.push(Op::Getline(tag)),
        Some(t) => match t.as_ref() {
            Expr::Var(name) => {
                let r = resolve_checked(c, name, Kind::Scalar)?;
                buf.push(Op::GetlineVar(tag, r.scope, r.index));
            }
            Expr::Field(k) => {
                compile_expr(c, buf, k)?;
                buf.push(Op::GetlineField(tag));
            }
            _ => {
                return Err(CompileError::Check(
                    "getline target must be a scalar variable or field".to_string(),
                ))
            }
        },
    }
    Ok(())
}

fn compile_call(
    c: &mut Compiler,
    buf: &mut Vec<Op>,
    name: &str,
    args: &[Expr],
) -> Result<(), CompileError> {
    match name {
        "length" => {
            if args.is_empty() {
                buf.push(Op::LoadFieldImm(0));
            } else {
                compile_expr(c, buf, &args[0])?;
            }
            buf.push(Op::CallBuiltin(Builtin::Length, 1));
        }
        "substr" if args.len() == 2 => {
            compile_expr(c, buf, &args[0])?;
            compile_expr(c, buf, &args[1])?;
            buf.push(Op::CallBuiltin(Builtin::Substr2, 2));
        }
        "substr" if args.len() >= 3 => {
            compile_expr(c, buf, &args[0])?;
            compile_expr(c, buf, &args[1])?;
            compile_expr(c, buf, &args[2])?;
            buf.push(Op::CallBuiltin(Builtin::Substr3, 3));
        }
        "index" if args.len() == 2 => {
            compile_expr(c, buf, &args[0])?;
            compile_expr(c, buf, &args[1])?;
            buf.push(Op::CallBuiltin(Builtin::Index, 2));
        }
        "split" if args.len() >= 2 => {
            let arr_name = match &args[1] {
                Expr::Var(n) => n,
                _ => return Err(CompileError::Check("split's second argument must be an array".to_string())),
            };
            let r = resolve_checked(c, arr_name, Kind::Array)?;
            compile_expr(c, buf, &args[0])?;
            let has_fs = args.len() >= 3;
            if has_fs {
                compile_regex_source(c, buf, &args[2])?;
            }
            buf.push(Op::CallSplit { arr_scope: r.scope, arr_idx: r.index, has_fs });
        }
        "sub" if args.len() >= 2 => compile_sub_gsub(c, buf, args, false)?,
        "gsub" if args.len() >= 2 => compile_sub_gsub(c, buf, args, true)?,
        "match" if args.len() == 2 => {
            compile_expr(c, buf, &args[0])?;
            compile_regex_source(c, buf, &args[1])?;
            buf.push(Op::CallBuiltin(Builtin::Match, 2));
        }
        "sprintf" if !args.is_empty() => {
            for a in args {
                compile_expr(c, buf, a)?;
            }
            buf.push(Op::CallBuiltin(Builtin::Sprintf, args.len() as u8));
        }
        "tolower" if args.len() == 1 => {
            compile_expr(c, buf, &args[0])?;
            buf.push(Op::CallBuiltin(Builtin::ToLower, 1));
        }
        "toupper" if args.len() == 1 => {
            compile_expr(c, buf, &args[0])?;
            buf.push(Op::CallBuiltin(Builtin::ToUpper, 1));
        }
        "sin" | "cos" | "exp" | "log" | "sqrt" | "int" if args.len() == 1 => {
            compile_expr(c, buf, &args[0])?;
            let b = match name {
                "sin" => Builtin::Sin,
                "cos" => Builtin::Cos,
                "exp" => Builtin::Exp,
                "log" => Builtin::Log,
                "sqrt" => Builtin::Sqrt,
                _ => Builtin::Int,
            };
            buf.push(Op::CallBuiltin(b, 1));
        }
        "atan2" if args.len() == 2 => {
            compile_expr(c, buf, &args[0])?;
            compile_expr(c, buf, &args[1])?;
            buf.push(Op::CallBuiltin(Builtin::Atan2, 2));
        }
        "rand" if args.is_empty() => buf.push(Op::CallBuiltin(Builtin::Rand, 0)),
        "srand" if args.is_empty() => buf.push(Op::CallBuiltin(Builtin::Srand0, 0)),
        "srand" if args.len() == 1 => {
            compile_expr(c, buf, &args[0])?;
            buf.push(Op::CallBuiltin(Builtin::Srand1, 1));
        }
        "close" if args.len() == 1 => {
            compile_expr(c, buf, &args[0])?;
            buf.push(Op::CallBuiltin(Builtin::Close, 1));
        }
        "fflush" if args.is_empty() => buf.push(Op::CallBuiltin(Builtin::FflushAll, 0)),
        "fflush" if args.len() == 1 => {
            compile_expr(c, buf, &args[0])?;
            buf.push(Op::CallBuiltin(Builtin::FflushOne, 1));
        }
        "system" if args.len() == 1 => {
            compile_expr(c, buf, &args[0])?;
            buf.push(Op::CallBuiltin(Builtin::System, 1));
        }
        _ => compile_user_call(c, buf, name, args)?,
    }
    Ok(())
}

fn compile_sub_gsub(
    c: &mut Compiler,
    buf: &mut Vec<Op>,
    args: &[Expr],
    global: bool,
) -> Result<(), CompileError> {
    compile_regex_source(c, buf, &args[0])?;
    compile_expr(c, buf, &args[1])?;
    match args.get(2) {
        None => {
            let zero = c.pools.add_num(0.0);
            buf.push(Op::PushNum(zero));
            buf.push(Op::SubField(global));
        }
        Some(t) => match lvalue_of(c, t)? {
            Lv::Scalar(scope, idx) => buf.push(Op::SubScalar(scope, idx, global)),
            Lv::Field(k) => {
                compile_expr(c, buf, k)?;
                buf.push(Op::SubField(global));
            }
            Lv::Array(scope, idx, idxs) => {
                compile_index_key(c, buf, idxs)?;
                buf.push(Op::SubArray(scope, idx, global));
            }
        },
    }
    Ok(())
}

fn compile_user_call(
    c: &mut Compiler,
    buf: &mut Vec<Op>,
    name: &str,
    args: &[Expr],
) -> Result<(), CompileError> {
    let sig = c
        .symbols
        .function(name)
        .ok_or_else(|| CompileError::Check(format!("call to undefined function '{name}'")))?;
    let func_idx = sig.index;
    let param_kinds = sig.param_kinds.clone();

    let mut array_args = Vec::new();
    let mut num_scalar_args: u8 = 0;
    for (i, a) in args.iter().enumerate() {
        let kind = param_kinds.get(i).copied().unwrap_or(Kind::Scalar);
        match kind {
            Kind::Scalar => {
                compile_expr(c, buf, a)?;
                num_scalar_args += 1;
            }
            Kind::Array => match a {
                Expr::Var(vn) => {
                    let r = resolve_checked(c, vn, Kind::Array)?;
                    array_args.push((r.scope, r.index));
                }
                _ => {
                    return Err(CompileError::Check(format!(
                        "argument {i} to '{name}' must be an array variable"
                    )))
                }
            },
        }
    }

    buf.push(Op::CallUser { func_idx, num_scalar_args, array_args });
    Ok(())
}
