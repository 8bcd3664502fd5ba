use crate::ast::{Redirect, Stmt};
use crate::bytecode::{Op, RedirectTag};
use crate::error::CompileError;
use crate::resolve::Kind;

use super::{ContinueTarget, LoopCx};
use super::Compiler;

fn compile_redirect(
    c: &mut Compiler,
    buf: &mut Vec<Op>,
    r: &Option<Redirect>,
) -> Result<Option<RedirectTag>, CompileError> {
    match r {
        None => Ok(None),
        Some(Redirect::File(e)) => {
            super::expr::compile_expr(c, buf, e)?;
            Ok(Some(RedirectTag::Write))
        }
        Some(Redirect::Append(e)) => {
            super::expr::compile_expr(c, buf, e)?;
            Ok(Some(RedirectTag::Append))
        }
        Some(Redirect::Pipe(e)) => {
            super::expr::compile_expr(c, buf, e)?;
            Ok(Some(RedirectTag::Pipe))
        }
    }
}

pub(super) fn compile_stmt(c: &mut Compiler, buf: &mut Vec<Op>, s: &Stmt) -> Result<(), CompileError> {
    match s {
        Stmt::Expr(e) => {
            super::expr::compile_expr(c, buf, e)?;
            buf.push(Op::Drop);
        }
        Stmt::Print(args, redirect) => {
            for a in args {
                super::expr::compile_expr(c, buf, a)?;
            }
            let tag = compile_redirect(c, buf, redirect)?;
            buf.push(Op::Print(args.len() as u8, tag));
        }
        Stmt::Printf(args, redirect) => {
            for a in args {
                super::expr::compile_expr(c, buf, a)?;
            }
            let tag = compile_redirect(c, buf, redirect)?;
            buf.push(Op::Printf(args.len() as u8, tag));
        }
        Stmt::If { cond, then_branch, else_branch } => {
            super::expr::compile_expr(c, buf, cond)?;
            let jf = buf.len();
            buf.push(Op::JumpFalse(0));
            compile_stmt(c, buf, then_branch)?;
            match else_branch {
                None => super::patch_list_to_here(buf, &[jf]),
                Some(eb) => {
                    let jend = buf.len();
                    buf.push(Op::Jump(0));
                    super::patch_list_to_here(buf, &[jf]);
                    compile_stmt(c, buf, eb)?;
                    super::patch_list_to_here(buf, &[jend]);
                }
            }
        }
        Stmt::While { cond, body } => {
            let loop_start = buf.len();
            super::expr::compile_expr(c, buf, cond)?;
            let jf = buf.len();
            buf.push(Op::JumpFalse(0));
            c.loops.push(LoopCx {
                break_patches: vec![jf],
                continue_target: ContinueTarget::Known(loop_start),
                continue_patches: Vec::new(),
                is_for_in: false,
            });
            compile_stmt(c, buf, body)?;
            let cx = c.loops.pop().unwrap();
            buf.push(Op::Jump(super::offset(buf.len(), loop_start)));
            super::patch_list_to_here(buf, &cx.break_patches);
        }
        Stmt::DoWhile { body, cond } => {
            let loop_start = buf.len();
            c.loops.push(LoopCx {
                break_patches: Vec::new(),
                continue_target: ContinueTarget::PatchToHere,
                continue_patches: Vec::new(),
                is_for_in: false,
            });
            compile_stmt(c, buf, body)?;
            let cx = c.loops.pop().unwrap();
            super::patch_list_to_here(buf, &cx.continue_patches);
            super::expr::compile_expr(c, buf, cond)?;
            buf.push(Op::JumpTrue(super::offset(buf.len(), loop_start)));
            super::patch_list_to_here(buf, &cx.break_patches);
        }
        Stmt::For { init, cond, step, body } => {
            if let Some(i) = init {
                compile_stmt(c, buf, i)?;
            }
            let loop_start = buf.len();
            let mut break_patches = Vec::new();
            if let Some(cnd) = cond {
                super::expr::compile_expr(c, buf, cnd)?;
                let jf = buf.len();
                buf.push(Op::JumpFalse(0));
                break_patches.push(jf);
            }
            c.loops.push(LoopCx {
                break_patches,
                continue_target: ContinueTarget::PatchToHere,
                continue_patches: Vec::new(),
                is_for_in: false,
            });
            compile_stmt(c, buf, body)?;
            let cx = c.loops.pop().unwrap();
            super::patch_list_to_here(buf, &cx.continue_patches);
            if let Some(st) = step {
                compile_stmt(c, buf, st)?;
            }
            buf.push(Op::Jump(super::offset(buf.len(), loop_start)));
            super::patch_list_to_here(buf, &cx.break_patches);
        }
        Stmt::ForIn { var, array, body } => {
            let var_ref = c.symbols.resolve(c.cur_func.as_deref(), var);
            let arr_ref = c.symbols.resolve(c.cur_func.as_deref(), array);
            if arr_ref.kind != Kind::Array {
                return Err(CompileError::Check(format!("'{array}' used as array but resolved as scalar")));
            }

            let mut sub_body = Vec::new();
            c.loops.push(LoopCx {
                break_patches: Vec::new(),
                continue_target: ContinueTarget::PatchToHere,
                continue_patches: Vec::new(),
                is_for_in: true,
            });
            compile_stmt(c, &mut sub_body, body)?;
            let cx = c.loops.pop().unwrap();
            super::patch_list_to_here(&mut sub_body, &cx.continue_patches);

            buf.push(Op::ForIn {
                var_scope: var_ref.scope,
                var_idx: var_ref.index,
                arr_scope: arr_ref.scope,
                arr_idx: arr_ref.index,
                body_len: sub_body.len() as u32,
            });
            buf.extend(sub_body);
        }
        Stmt::Block(stmts) => {
            for s in stmts {
                compile_stmt(c, buf, s)?;
            }
        }
        Stmt::Break => match c.loops.last() {
            Some(top) if top.is_for_in => buf.push(Op::BreakForIn),
            Some(_) => {
                let pos = buf.len();
                buf.push(Op::Jump(0));
                c.loops.last_mut().unwrap().break_patches.push(pos);
            }
            None => return Err(CompileError::Check("'break' outside a loop".to_string())),
        },
        Stmt::Continue => {
            let top = c
                .loops
                .last_mut()
                .ok_or_else(|| CompileError::Check("'continue' outside a loop".to_string()))?;
            match top.continue_target {
                ContinueTarget::Known(target) => {
                    let pos = buf.len();
                    buf.push(Op::Jump(super::offset(pos, target)));
                }
                ContinueTarget::PatchToHere => {
                    let pos = buf.len();
                    buf.push(Op::Jump(0));
                    top.continue_patches.push(pos);
                }
            }
        }
        Stmt::Next => buf.push(Op::Next),
        Stmt::NextFile => buf.push(Op::NextFile),
        Stmt::Exit(e) => match e {
            Some(e) => {
                super::expr::compile_expr(c, buf, e)?;
                buf.push(Op::ExitCode);
            }
            None => buf.push(Op::Exit),
        },
        Stmt::Return(e) => match e {
            Some(e) => {
                super::expr::compile_expr(c, buf, e)?;
                buf.push(Op::Return);
            }
            None => buf.push(Op::ReturnNull),
        },
        Stmt::Delete(name, idxs) => {
            let r = c.symbols.resolve(c.cur_func.as_deref(), name);
            if r.kind != Kind::Array {
                return Err(CompileError::Check(format!("'{name}' used as array but resolved as scalar")));
            }
            super::expr::compile_index_key(c, buf, idxs)?;
            buf.push(Op::ArrayDelete(r.scope, r.index));
        }
        Stmt::DeleteAll(name) => {
            let r = c.symbols.resolve(c.cur_func.as_deref(), name);
            if r.kind != Kind::Array {
                return Err(CompileError::Check(format!("'{name}' used as array but resolved as scalar")));
            }
            buf.push(Op::ArrayClear(r.scope, r.index));
        }
    }
    Ok(())
}
