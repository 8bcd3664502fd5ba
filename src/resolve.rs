//! The semantic resolver — spec §1 calls this component "on the boundary":
//! its *output schema* (scope/index/kind per identifier use, per-function
//! parameter classification) is fixed by §4.4; its algorithm is ours to
//! choose. This implements the straightforward two-pass approach named as
//! the Open Question resolution in DESIGN.md: collect declarations, then
//! classify scalar-vs-array usage with a small fixed-point iteration over
//! call sites (a parameter used as an array anywhere in a function's body,
//! or bound from an already-array-typed argument at a call site, is an
//! array parameter; this must iterate because that classification can
//! cascade through chains of calls).

use std::collections::HashMap;

use crate::ast::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Scalar,
    Array,
}

#[derive(Debug, Clone, Copy)]
pub struct VarRef {
    pub scope: Scope,
    pub index: u32,
    pub kind: Kind,
}

/// The fixed fan-out of special variables, in a stable declaration order
/// that also fixes their dense index (spec §3 "Special variables").
pub const SPECIAL_NAMES: &[(&str, Kind)] = &[
    ("NR", Kind::Scalar),
    ("NF", Kind::Scalar),
    ("FS", Kind::Scalar),
    ("RS", Kind::Scalar),
    ("OFS", Kind::Scalar),
    ("ORS", Kind::Scalar),
    ("FILENAME", Kind::Scalar),
    ("FNR", Kind::Scalar),
    ("RLENGTH", Kind::Scalar),
    ("RSTART", Kind::Scalar),
    ("SUBSEP", Kind::Scalar),
    ("CONVFMT", Kind::Scalar),
    ("OFMT", Kind::Scalar),
    ("ARGC", Kind::Scalar),
    ("ARGV", Kind::Array),
    ("ENVIRON", Kind::Array),
];

pub fn special_index(name: &str) -> Option<u32> {
    SPECIAL_NAMES.iter().position(|(n, _)| *n == name).map(|i| i as u32)
}

pub struct FunctionSig {
    pub index: u32,
    pub params: Vec<String>,
    pub param_kinds: Vec<Kind>,
    pub num_locals_scalar: u32,
    pub num_locals_array: u32,
    pub locals: HashMap<String, VarRef>,
    pub body: Vec<Stmt>,
}

pub struct SymbolTable {
    pub globals_scalar: Vec<String>,
    pub globals_array: Vec<String>,
    global_refs: HashMap<String, VarRef>,
    pub functions: HashMap<String, FunctionSig>,
}

impl SymbolTable {
    /// Resolves an identifier used inside `func` (or the main program, if
    /// `func` is `None`) to its scope/index/kind.
    pub fn resolve(&self, func: Option<&str>, name: &str) -> VarRef {
        if let Some(idx) = special_index(name) {
            let kind = SPECIAL_NAMES[idx as usize].1;
            return VarRef { scope: Scope::Special, index: idx, kind };
        }
        if let Some(f) = func {
            if let Some(sig) = self.functions.get(f) {
                if let Some(r) = sig.locals.get(name) {
                    return *r;
                }
            }
        }
        self.global_refs
            .get(name)
            .copied()
            .unwrap_or(VarRef { scope: Scope::Global, index: 0, kind: Kind::Scalar })
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSig> {
        self.functions.get(name)
    }
}

struct Builder<'a> {
    program: &'a Program,
    /// kind classification: (Some(function name) | None for global, var name) -> Kind
    kinds: HashMap<(Option<String>, String), Kind>,
    func_order: Vec<String>,
}

pub fn resolve(program: &Program) -> Result<SymbolTable, String> {
    let mut seen = HashMap::new();
    for f in &program.functions {
        if seen.insert(f.name.clone(), ()).is_some() {
            return Err(format!("duplicate function definition: {}", f.name));
        }
    }

    let mut builder = Builder {
        program,
        kinds: HashMap::new(),
        func_order: program.functions.iter().map(|f| f.name.clone()).collect(),
    };

    // Seed every declared parameter as Scalar by default so lookups never
    // miss, then raise to Array wherever usage proves it.
    for f in &program.functions {
        for p in &f.params {
            builder.kinds.entry((Some(f.name.clone()), p.clone())).or_insert(Kind::Scalar);
        }
    }

    // Fixed-point: a handful of passes is enough for realistic call graphs;
    // classification only ever moves Scalar -> Array, so this terminates.
    for _ in 0..8 {
        let mut changed = false;
        for rule in &program.rules {
            if let Some(body) = &rule.action {
                changed |= builder.walk_stmts(None, body);
            }
            if let Pattern::Expr(e) | Pattern::Range(e, _) = &rule.pattern {
                changed |= builder.walk_expr(None, e);
            }
            if let Pattern::Range(_, e2) = &rule.pattern {
                changed |= builder.walk_expr(None, e2);
            }
        }
        for f in &program.functions {
            changed |= builder.walk_stmts(Some(&f.name), &f.body);
        }
        if !changed {
            break;
        }
    }

    builder.build()
}

impl<'a> Builder<'a> {
    fn mark(&mut self, ctx: Option<&str>, name: &str, kind: Kind) -> bool {
        if special_index(name).is_some() {
            return false;
        }
        // Only mark as local if this name is actually a parameter of ctx;
        // otherwise it's a global even when used inside a function body.
        let key_ctx = match ctx {
            Some(f) if self.is_param(f, name) => Some(f.to_string()),
            _ => None,
        };
        let key = (key_ctx, name.to_string());
        let entry = self.kinds.entry(key).or_insert(Kind::Scalar);
        if kind == Kind::Array && *entry == Kind::Scalar {
            *entry = Kind::Array;
            true
        } else {
            false
        }
    }

    fn is_param(&self, func: &str, name: &str) -> bool {
        self.program
            .functions
            .iter()
            .find(|f| f.name == func)
            .is_some_and(|f| f.params.iter().any(|p| p == name))
    }

    fn kind_of(&self, ctx: Option<&str>, name: &str) -> Kind {
        if special_index(name).is_some() {
            return SPECIAL_NAMES[special_index(name).unwrap() as usize].1;
        }
        let key_ctx = match ctx {
            Some(f) if self.is_param(f, name) => Some(f.to_string()),
            _ => None,
        };
        self.kinds.get(&(key_ctx, name.to_string())).copied().unwrap_or(Kind::Scalar)
    }

    fn walk_stmts(&mut self, ctx: Option<&str>, stmts: &[Stmt]) -> bool {
        let mut changed = false;
        for s in stmts {
            changed |= self.walk_stmt(ctx, s);
        }
        changed
    }

    fn walk_stmt(&mut self, ctx: Option<&str>, s: &Stmt) -> bool {
        let mut changed = false;
        match s {
            Stmt::Expr(e) => changed |= self.walk_expr(ctx, e),
            Stmt::Print(args, r) | Stmt::Printf(args, r) => {
                for a in args {
                    changed |= self.walk_expr(ctx, a);
                }
                if let Some(r) = r {
                    changed |= self.walk_redirect(ctx, r);
                }
            }
            Stmt::If { cond, then_branch, else_branch } => {
                changed |= self.walk_expr(ctx, cond);
                changed |= self.walk_stmt(ctx, then_branch);
                if let Some(e) = else_branch {
                    changed |= self.walk_stmt(ctx, e);
                }
            }
            Stmt::While { cond, body } => {
                changed |= self.walk_expr(ctx, cond);
                changed |= self.walk_stmt(ctx, body);
            }
            Stmt::DoWhile { body, cond } => {
                changed |= self.walk_stmt(ctx, body);
                changed |= self.walk_expr(ctx, cond);
            }
            Stmt::For { init, cond, step, body } => {
                if let Some(i) = init {
                    changed |= self.walk_stmt(ctx, i);
                }
                if let Some(c) = cond {
                    changed |= self.walk_expr(ctx, c);
                }
                if let Some(st) = step {
                    changed |= self.walk_stmt(ctx, st);
                }
                changed |= self.walk_stmt(ctx, body);
            }
            Stmt::ForIn { var: _, array, body } => {
                changed |= self.mark(ctx, array, Kind::Array);
                changed |= self.walk_stmt(ctx, body);
            }
            Stmt::Block(stmts) => changed |= self.walk_stmts(ctx, stmts),
            Stmt::Break | Stmt::Continue | Stmt::Next | Stmt::NextFile => {}
            Stmt::Exit(e) | Stmt::Return(e) => {
                if let Some(e) = e {
                    changed |= self.walk_expr(ctx, e);
                }
            }
            Stmt::Delete(name, idx) => {
                changed |= self.mark(ctx, name, Kind::Array);
                for i in idx {
                    changed |= self.walk_expr(ctx, i);
                }
            }
            Stmt::DeleteAll(name) => changed |= self.mark(ctx, name, Kind::Array),
        }
        changed
    }

    fn walk_redirect(&mut self, ctx: Option<&str>, r: &Redirect) -> bool {
        match r {
            Redirect::File(e) | Redirect::Append(e) | Redirect::Pipe(e) => self.walk_expr(ctx, e),
        }
    }

    fn walk_expr(&mut self, ctx: Option<&str>, e: &Expr) -> bool {
        let mut changed = false;
        match e {
            Expr::Number(_) | Expr::Str(_) | Expr::Regex(_) | Expr::Var(_) => {}
            Expr::Field(e) => changed |= self.walk_expr(ctx, e),
            Expr::Index(name, idx) => {
                changed |= self.mark(ctx, name, Kind::Array);
                for i in idx {
                    changed |= self.walk_expr(ctx, i);
                }
            }
            Expr::BinOp(a, _, b) => {
                changed |= self.walk_expr(ctx, a);
                changed |= self.walk_expr(ctx, b);
            }
            Expr::UnaryOp(_, a) => changed |= self.walk_expr(ctx, a),
            Expr::PreIncr(a) | Expr::PreDecr(a) | Expr::PostIncr(a) | Expr::PostDecr(a) => {
                changed |= self.walk_expr(ctx, a);
            }
            Expr::Assign(a, b) => {
                changed |= self.walk_expr(ctx, a);
                changed |= self.walk_expr(ctx, b);
            }
            Expr::OpAssign(a, _, b) => {
                changed |= self.walk_expr(ctx, a);
                changed |= self.walk_expr(ctx, b);
            }
            Expr::Concat(a, b) => {
                changed |= self.walk_expr(ctx, a);
                changed |= self.walk_expr(ctx, b);
            }
            Expr::Ternary(c, t, f) => {
                changed |= self.walk_expr(ctx, c);
                changed |= self.walk_expr(ctx, t);
                changed |= self.walk_expr(ctx, f);
            }
            Expr::Match(a, b, _) => {
                changed |= self.walk_expr(ctx, a);
                changed |= self.walk_expr(ctx, b);
            }
            Expr::In(items, name) => {
                changed |= self.mark(ctx, name, Kind::Array);
                for i in items {
                    changed |= self.walk_expr(ctx, i);
                }
            }
            Expr::Getline { target, source } => {
                if let Some(t) = target {
                    changed |= self.walk_expr(ctx, t);
                }
                match source {
                    GetlineSource::Main => {}
                    GetlineSource::File(e) | GetlineSource::Command(e) => {
                        changed |= self.walk_expr(ctx, e)
                    }
                }
            }
            Expr::Grouping(e) => changed |= self.walk_expr(ctx, e),
            Expr::Call(name, args) => {
                if name == "split" && args.len() >= 2 {
                    if let Expr::Var(arrname) = &args[1] {
                        changed |= self.mark(ctx, arrname, Kind::Array);
                    }
                }
                if let Some(callee) = self.program.functions.iter().find(|f| &f.name == name) {
                    for (i, a) in args.iter().enumerate() {
                        if let Expr::Var(argname) = a {
                            if let Some(param) = callee.params.get(i) {
                                let callee_kind = self.kind_of(Some(&callee.name), param);
                                if callee_kind == Kind::Array {
                                    changed |= self.mark(ctx, argname, Kind::Array);
                                }
                            }
                        }
                    }
                }
                for a in args {
                    changed |= self.walk_expr(ctx, a);
                }
            }
        }
        changed
    }

    fn build(self) -> Result<SymbolTable, String> {
        let mut globals_scalar = Vec::new();
        let mut globals_array = Vec::new();
        let mut global_refs = HashMap::new();

        let mut global_names: Vec<(String, Kind)> = self
            .kinds
            .iter()
            .filter(|((ctx, _), _)| ctx.is_none())
            .map(|((_, name), k)| (name.clone(), *k))
            .collect();
        global_names.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, kind) in global_names {
            match kind {
                Kind::Scalar => {
                    let idx = globals_scalar.len() as u32;
                    globals_scalar.push(name.clone());
                    global_refs.insert(name, VarRef { scope: Scope::Global, index: idx, kind });
                }
                Kind::Array => {
                    let idx = globals_array.len() as u32;
                    globals_array.push(name.clone());
                    global_refs.insert(name, VarRef { scope: Scope::Global, index: idx, kind });
                }
            }
        }

        let mut functions = HashMap::new();
        for (fi, fname) in self.func_order.iter().enumerate() {
            let fdef = self.program.functions.iter().find(|f| &f.name == fname).unwrap();
            let mut locals = HashMap::new();
            let mut param_kinds = Vec::with_capacity(fdef.params.len());
            let mut n_scalar = 0u32;
            let mut n_array = 0u32;
            for p in &fdef.params {
                let kind = self.kinds.get(&(Some(fname.clone()), p.clone())).copied().unwrap_or(Kind::Scalar);
                param_kinds.push(kind);
                let idx = match kind {
                    Kind::Scalar => {
                        let i = n_scalar;
                        n_scalar += 1;
                        i
                    }
                    Kind::Array => {
                        let i = n_array;
                        n_array += 1;
                        i
                    }
                };
                locals.insert(p.clone(), VarRef { scope: Scope::Local, index: idx, kind });
            }
            functions.insert(
                fname.clone(),
                FunctionSig {
                    index: fi as u32,
                    params: fdef.params.clone(),
                    param_kinds,
                    num_locals_scalar: n_scalar,
                    num_locals_array: n_array,
                    locals,
                    body: fdef.body.clone(),
                },
            );
        }

        Ok(SymbolTable { globals_scalar, globals_array, global_refs, functions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn resolve_src(src: &str) -> SymbolTable {
        let mut lex = Lexer::new(src);
        let tokens = lex.tokenize();
        let prog = Parser::new(tokens).parse().unwrap();
        resolve(&prog).unwrap()
    }

    #[test]
    fn array_usage_promotes_global_kind() {
        let syms = resolve_src("{ count[$1]++ } END { for (k in count) print k, count[k] }");
        assert!(syms.globals_array.contains(&"count".to_string()));
    }

    #[test]
    fn array_param_propagates_through_call() {
        let syms = resolve_src(
            "function fill(a) { a[1] = 1 } BEGIN { fill(seen) }",
        );
        let sig = syms.function("fill").unwrap();
        assert_eq!(sig.param_kinds[0], Kind::Array);
        assert!(syms.globals_array.contains(&"seen".to_string()));
    }

    #[test]
    fn split_second_arg_is_array() {
        let syms = resolve_src("BEGIN { n = split(\"a:b\", parts, \":\") }");
        assert!(syms.globals_array.contains(&"parts".to_string()));
    }
}
