//! Bytecode instruction set and compiled-program representation (§4.3).
//!
//! The teacher's `bytecode.rs` packs each opcode into a literal byte plus
//! inline byte/word operands, because its target is a Z80 ROM image that
//! must be serialized to disk. This engine's target is an in-process
//! dispatch loop, not a wire format, so operands are carried as ordinary
//! enum fields rather than packed bytes — the opcode *taxonomy* (the
//! families enumerated below) is unchanged from spec §4.3, and `Op` is still
//! "a primary tag plus inline immediate operands", just typed instead of
//! byte-packed. This tradeoff is recorded in DESIGN.md.

use crate::resolve::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Scalar,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDec {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTag {
    Write,
    Append,
    Pipe,
}

/// Where a `getline` variant reads from. `File`/`Command` pop the
/// filename/command string from the stack before reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetlineSourceTag {
    Main,
    File,
    Command,
}

/// The closed built-in function set (§4.5). The compiler emits one
/// `CallBuiltin` per call site; the VM dispatches on this tag rather than
/// branching on argument count, since arity is fixed (or fixed-pair) per
/// builtin and already checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Length,
    Substr2,
    Substr3,
    Index,
    Match,
    Sprintf,
    ToLower,
    ToUpper,
    Sin,
    Cos,
    Atan2,
    Exp,
    Log,
    Sqrt,
    Int,
    Rand,
    Srand0,
    Srand1,
    Close,
    FflushAll,
    FflushOne,
    System,
}

#[derive(Debug, Clone)]
pub enum Op {
    // ---- stack ----
    PushNum(u32),
    PushStr(u32),
    Drop,
    Dup,
    Swap,
    Rote,
    /// Peephole-fusion padding: keeps a fused window's instruction count
    /// unchanged so unrelated jump targets never need rebasing.
    Nop,

    // ---- scalars ----
    LoadScalar(Scope, u32),
    StoreScalar(Scope, u32),

    // ---- fields ----
    /// Read `$k`, `k` as a compile-time immediate.
    LoadFieldImm(u32),
    /// Read `$k`, `k` popped from the stack.
    LoadFieldDyn,
    /// Write `$k`: pops `k` then the value to store.
    StoreFieldDyn,

    // ---- arrays ----
    ArrayGet(Scope, u32),
    ArraySet(Scope, u32),
    ArrayDelete(Scope, u32),
    ArrayIn(Scope, u32),
    ArrayClear(Scope, u32),
    /// Pops `n` strings and pushes their SUBSEP join, for multi-dim indices.
    IndexMulti(u32),

    // ---- augmented updates: `x op= y` ----
    AugScalar(Scope, u32, ArithOp),
    /// Field index popped first, then the rhs operand.
    AugField(ArithOp),
    AugArray(Scope, u32, ArithOp),

    // ---- sub/gsub, mutating their target in place ----
    /// Stack (top to bottom): replacement, regex source. Pushes the
    /// substitution count.
    SubScalar(Scope, u32, bool),
    /// Stack: field index, replacement, regex source.
    SubField(bool),
    /// Stack: joined key, replacement, regex source.
    SubArray(Scope, u32, bool),

    /// Pops `n` strings/keys laid out by the array-call-site convention and
    /// clears the named array before splitting `s` by `fs` (or the global
    /// `FS` when `has_fs` is false) into it.
    CallSplit {
        arr_scope: Scope,
        arr_idx: u32,
        has_fs: bool,
    },

    // ---- pre/post increment ----
    IncDecScalar(Scope, u32, IncDec),
    IncDecField(IncDec),
    IncDecArray(Scope, u32, IncDec),

    // ---- arithmetic / comparison (generic, any Value) ----
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Cmp(CmpOp),
    Concat,
    /// Dynamic regex popped from the stack (its source string, compiled
    /// on the fly through the cache).
    MatchDyn(bool),
    /// Regex pool index known at compile time.
    MatchConst(u32, bool),

    // ---- unary ----
    Neg,
    /// Unary `+`: forces numeric context without negating.
    Pos,
    Not,

    // ---- typed specializations: both operands proved numeric ----
    AddNum,
    SubNum,
    MulNum,
    DivNum,
    ModNum,
    PowNum,
    CmpNum(CmpOp),

    // ---- fused opcodes ----
    /// `$k <cmp> n` folded with its guarding `JumpFalse`.
    FieldIntCmpNumJump(u32, f64, CmpOp, i32),
    /// `$i + $j` folded into one dispatch.
    AddFields(u32, u32),
    /// `global[idx] <cmp> n` folded with its guarding `JumpFalse`
    /// (`JumpGlobalGrEqNum` et al. in spec §4.4 are this family with
    /// `cmp` inverted at fusion time).
    ScalarCmpNumJump(Scope, u32, f64, CmpOp, i32),

    // ---- control flow ----
    Jump(i32),
    JumpTrue(i32),
    JumpFalse(i32),
    /// Iterates keys of an array; `body_len` is the instruction count of the
    /// loop body immediately following this opcode, so `BreakForIn`/fallthrough
    /// both know where the loop ends.
    ForIn {
        var_scope: Scope,
        var_idx: u32,
        arr_scope: Scope,
        arr_idx: u32,
        body_len: u32,
    },
    BreakForIn,

    // ---- calls ----
    CallBuiltin(Builtin, u8),
    /// `array_args` are (scope, index) pairs bound to the callee's array
    /// parameters in declared order; scalar arguments are already on the
    /// stack, `num_scalar_args` deep.
    CallUser {
        func_idx: u32,
        num_scalar_args: u8,
        array_args: Vec<(Scope, u32)>,
    },
    Return,
    ReturnNull,

    // ---- record control ----
    Next,
    NextFile,
    Exit,
    ExitCode,

    // ---- I/O ----
    Print(u8, Option<RedirectTag>),
    Printf(u8, Option<RedirectTag>),
    /// Reads a record into `$0`, resplitting fields and bumping NR/FNR (and
    /// NF). Pops the source name first when the tag isn't `Main`.
    Getline(GetlineSourceTag),
    /// Reads a record into a scalar; bumps NR/FNR for `Main`/`Command` but
    /// never touches `$0` or NF.
    GetlineVar(GetlineSourceTag, Scope, u32),
    /// Reads a record into field `k`, `k` popped from the stack (pushed
    /// after the source name, if any), re-deriving `$0` from OFS.
    GetlineField(GetlineSourceTag),
}

#[derive(Debug, Clone)]
pub struct FuncBlock {
    pub name: String,
    pub num_scalar_params: u32,
    pub num_array_params: u32,
    pub param_kinds: Vec<Kind>,
    pub num_locals_scalar: u32,
    pub num_locals_array: u32,
    pub code: Vec<Op>,
}

#[derive(Debug, Clone)]
pub enum ActionPattern {
    Always,
    Begin,
    End,
    Expr(Vec<Op>),
    Range(Vec<Op>, Vec<Op>),
}

#[derive(Debug, Clone)]
pub struct ActionBlock {
    pub pattern: ActionPattern,
    pub body: Vec<Op>,
    /// Index into the VM's per-action `range_active` flags; only `Some` for
    /// `ActionPattern::Range`.
    pub range_state_idx: Option<u32>,
}

/// The immutable compiled artefact (§3 "Bytecode program"). Shared
/// read-only across every VM instance created from it.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub num_pool: Vec<f64>,
    pub str_pool: Vec<String>,
    pub regex_pool: Vec<String>,
    pub global_scalar_names: Vec<String>,
    pub global_array_names: Vec<String>,
    pub functions: Vec<FuncBlock>,
    pub function_index: std::collections::HashMap<String, u32>,
    pub actions: Vec<ActionBlock>,
    pub num_range_patterns: u32,
}

impl CompiledProgram {
    pub fn num_globals_scalar(&self) -> u32 {
        self.global_scalar_names.len() as u32
    }

    pub fn num_globals_array(&self) -> u32 {
        self.global_array_names.len() as u32
    }
}

/// Builds up the literal/regex pools during compilation, deduplicating
/// entries the way the teacher's `Module::add_string` does.
#[derive(Debug, Default)]
pub struct PoolBuilder {
    pub num_pool: Vec<f64>,
    pub str_pool: Vec<String>,
    pub regex_pool: Vec<String>,
}

impl PoolBuilder {
    pub fn add_num(&mut self, n: f64) -> u32 {
        if let Some(idx) = self.num_pool.iter().position(|x| x.to_bits() == n.to_bits()) {
            return idx as u32;
        }
        self.num_pool.push(n);
        (self.num_pool.len() - 1) as u32
    }

    pub fn add_str(&mut self, s: &str) -> u32 {
        if let Some(idx) = self.str_pool.iter().position(|x| x == s) {
            return idx as u32;
        }
        self.str_pool.push(s.to_string());
        (self.str_pool.len() - 1) as u32
    }

    pub fn add_regex(&mut self, pattern: &str) -> u32 {
        if let Some(idx) = self.regex_pool.iter().position(|x| x == pattern) {
            return idx as u32;
        }
        self.regex_pool.push(pattern.to_string());
        (self.regex_pool.len() - 1) as u32
    }
}
