use crate::bytecode::{FuncBlock, Op};
use crate::error::CompileError;
use crate::resolve::Kind;

use super::Compiler;

pub(super) fn compile_function(c: &mut Compiler, name: &str) -> Result<FuncBlock, CompileError> {
    let sig = c.symbols.function(name).unwrap();
    let param_kinds = sig.param_kinds.clone();
    let num_scalar_params = param_kinds.iter().filter(|k| **k == Kind::Scalar).count() as u32;
    let num_array_params = param_kinds.iter().filter(|k| **k == Kind::Array).count() as u32;
    let num_locals_scalar = sig.num_locals_scalar;
    let num_locals_array = sig.num_locals_array;
    let body = sig.body.clone();

    c.cur_func = Some(name.to_string());
    let mut code = Vec::new();
    for s in &body {
        super::stmt::compile_stmt(c, &mut code, s)?;
    }
    // A body that falls off the end without `return` yields Null.
    code.push(Op::ReturnNull);
    c.cur_func = None;

    super::peephole::fuse(&mut code, &c.pools.num_pool);

    Ok(FuncBlock {
        name: name.to_string(),
        num_scalar_params,
        num_array_params,
        param_kinds,
        num_locals_scalar,
        num_locals_array,
        code,
    })
}
