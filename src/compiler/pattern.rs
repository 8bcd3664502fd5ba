use crate::ast::{Pattern, Rule, Stmt};
use crate::bytecode::{ActionBlock, ActionPattern};
use crate::error::CompileError;

use super::Compiler;

pub(super) fn compile_rule(c: &mut Compiler, rule: &Rule) -> Result<ActionBlock, CompileError> {
    let (pattern, range_state_idx) = match &rule.pattern {
        Pattern::Always => (ActionPattern::Always, None),
        Pattern::Begin => (ActionPattern::Begin, None),
        Pattern::End => (ActionPattern::End, None),
        Pattern::Expr(e) => {
            let mut code = Vec::new();
            super::expr::compile_expr(c, &mut code, e)?;
            super::peephole::fuse(&mut code, &c.pools.num_pool);
            (ActionPattern::Expr(code), None)
        }
        Pattern::Range(start, end) => {
            let mut start_code = Vec::new();
            super::expr::compile_expr(c, &mut start_code, start)?;
            super::peephole::fuse(&mut start_code, &c.pools.num_pool);

            let mut end_code = Vec::new();
            super::expr::compile_expr(c, &mut end_code, end)?;
            super::peephole::fuse(&mut end_code, &c.pools.num_pool);

            let idx = c.next_range_idx;
            c.next_range_idx += 1;
            (ActionPattern::Range(start_code, end_code), Some(idx))
        }
    };

    let mut body = Vec::new();
    match &rule.action {
        Some(stmts) => {
            for s in stmts {
                super::stmt::compile_stmt(c, &mut body, s)?;
            }
        }
        None => {
            // An empty action body means `{ print $0 }`.
            super::stmt::compile_stmt(c, &mut body, &Stmt::Print(vec![], None))?;
        }
    }
    super::peephole::fuse(&mut body, &c.pools.num_pool);

    Ok(ActionBlock { pattern, body, range_state_idx })
}
