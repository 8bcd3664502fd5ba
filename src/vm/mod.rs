//! The stack-based dispatch loop (§4.5). One `Vm` owns every piece of
//! mutable execution state: the operand stack, globals, call frames, the
//! current record, the regex cache, and the I/O registry — there is no
//! suspension point inside the loop, so none of it needs to be `Sync`.
//!
//! Grounded on the teacher's `interpreter.rs` dispatch-loop shape (one big
//! `match` over an opcode, typed stack helpers for the hot numeric path);
//! generalized from Z80 opcodes to this engine's `Op` taxonomy.

mod builtins;
pub mod frame;
pub mod io;
pub mod record;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bytecode::{ActionBlock, ActionPattern, ArithOp, CmpOp, CompiledProgram, Op};
use crate::config::{Config, RegexMode};
use crate::error::RuntimeError;
use crate::regex_adapter::RegexCache;
use crate::resolve::{special_index, Scope};
use crate::value::{compare, format_number, parse_number_prefix, Value};

use frame::{Array, CallFrame};
use record::{split_fields, Record};

/// Index into `SPECIAL_NAMES` / `Vm::specials` for each named special.
const NR: u32 = 0;
const NF: u32 = 1;
const FS: u32 = 2;
const RS: u32 = 3;
const OFS: u32 = 4;
const ORS: u32 = 5;
const FILENAME: u32 = 6;
const FNR: u32 = 7;
const RLENGTH: u32 = 8;
const RSTART: u32 = 9;
const SUBSEP: u32 = 10;
const CONVFMT: u32 = 11;
const OFMT: u32 = 12;
const ARGC: u32 = 13;
const ARGV: u32 = 14;
const ENVIRON: u32 = 15;

/// The arena slot every VM reserves for `ARGV`/`ENVIRON` before any global
/// array gets one; `Scope::Global` array indices are offset by this. Visible
/// to the parallel executor so it can map an analyser-reported global array
/// index onto the `global_arrays()` slice it gets back from a `Vm`.
pub(crate) const ARRAY_ARENA_BASE: usize = 2;

/// What a dispatch loop invocation unwound to. `Normal` means it ran off the
/// end of its code slice; everything else is a tagged unwind token (§7
/// "Control flow via tagged returns, not exceptions"), consumed by the
/// nearest handler that understands it (`ForIn` for `BreakForIn`, the
/// `CallUser` site for `Return`, the main record loop for `Next`/`NextFile`/
/// `Exit`).
#[derive(Debug)]
enum Signal {
    Normal,
    Next,
    NextFile,
    Exit,
    Return(Value),
    BreakForIn,
}

enum RecordOutcome {
    Continue,
    NextFile,
    Exit,
}

pub struct Vm<'p> {
    program: &'p CompiledProgram,
    globals_scalar: Vec<Value>,
    arrays: Vec<Array>,
    specials: Vec<Value>,
    frames: Vec<CallFrame>,
    stack: Vec<Value>,
    record: Record,
    regex_cache: RegexCache,
    io: io::IoRegistry,
    range_active: Vec<bool>,
    rng_seed: u64,
    posix: bool,
    exit_code: Option<i32>,
    out: Vec<u8>,
    /// The stream the main record loop (and a bare `getline`) reads from.
    current_reader: Option<Box<dyn BufRead>>,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p CompiledProgram, config: &Config) -> Self {
        let mut specials = vec![Value::Null; 16];
        specials[NR as usize] = Value::Num(0.0);
        specials[NF as usize] = Value::Num(0.0);
        specials[FS as usize] = Value::Str(config.fs.clone());
        specials[RS as usize] = Value::Str(config.rs.clone());
        specials[OFS as usize] = Value::Str(config.ofs.clone());
        specials[ORS as usize] = Value::Str(config.ors.clone());
        specials[FILENAME as usize] = Value::Str(String::new());
        specials[FNR as usize] = Value::Num(0.0);
        specials[RLENGTH as usize] = Value::Num(-1.0);
        specials[RSTART as usize] = Value::Num(0.0);
        specials[SUBSEP as usize] = Value::Str("\u{1c}".to_string());
        specials[CONVFMT as usize] = Value::Str("%.6g".to_string());
        specials[OFMT as usize] = Value::Str("%.6g".to_string());
        specials[ARGC as usize] = Value::Num((1 + config.args.len()) as f64);

        let mut argv = HashMap::new();
        argv.insert("0".to_string(), Value::Str("awk".to_string()));
        for (i, a) in config.args.iter().enumerate() {
            argv.insert((i + 1).to_string(), Value::Str(a.clone()));
        }
        let mut environ = HashMap::new();
        for (k, v) in std::env::vars() {
            environ.insert(k, Value::Str(v));
        }

        let mut arrays = vec![argv, environ];
        arrays.extend((0..program.num_globals_array()).map(|_| HashMap::new()));

        Vm {
            program,
            globals_scalar: vec![Value::Null; program.num_globals_scalar() as usize],
            arrays,
            specials,
            frames: Vec::new(),
            stack: Vec::new(),
            record: Record::default(),
            regex_cache: RegexCache::new(),
            io: io::IoRegistry::new(),
            range_active: vec![false; program.num_range_patterns as usize],
            rng_seed: 88172645463325252u64,
            posix: matches!(config.regex_mode, RegexMode::Posix),
            exit_code: None,
            out: Vec::new(),
            current_reader: None,
        }
    }

    /// Runs the program to completion: `BEGIN`, then every record read from
    /// `input` or from real files named by `config.args` (if any are plain
    /// filenames rather than `name=value` assignments), then `END`. Returns
    /// the captured output and the process exit code.
    pub fn run(mut self, input: impl Read + 'static, config: &Config) -> Result<(String, i32), RuntimeError> {
        let begin: Vec<&ActionBlock> =
            self.program.actions.iter().filter(|a| matches!(a.pattern, ActionPattern::Begin)).collect();
        let mut exited = false;
        for action in begin {
            match self.run_block(&action.body)? {
                Signal::Exit => {
                    exited = true;
                    break;
                }
                _ => {}
            }
        }

        for (name, value) in &config.variables {
            self.assign_named(name, Value::NumStr(value.clone()));
        }

        if !exited {
            self.run_main(input)?;
        }

        let end: Vec<&ActionBlock> =
            self.program.actions.iter().filter(|a| matches!(a.pattern, ActionPattern::End)).collect();
        for action in end {
            if matches!(self.run_block(&action.body)?, Signal::Exit) {
                break;
            }
        }

        let code = self.exit_code.unwrap_or(0);
        Ok((String::from_utf8_lossy(&self.out).into_owned(), code))
    }

    /// Runs only the `BEGIN` actions. Used by the parallel executor, which
    /// runs `BEGIN` once on a driver VM before fanning the main loop out to
    /// workers (§4.7 phase 1). Returns `true` if `exit` fired.
    pub(crate) fn run_begin_only(&mut self) -> Result<bool, RuntimeError> {
        for action in self.program.actions.iter().filter(|a| matches!(a.pattern, ActionPattern::Begin)) {
            let body = action.body.clone();
            if matches!(self.run_block(&body)?, Signal::Exit) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Runs only the `END` actions, against whatever global state is already
    /// seeded on `self` (the parallel executor calls this on the driver VM
    /// after merging worker results back in).
    pub(crate) fn run_end_only(&mut self) -> Result<(), RuntimeError> {
        for action in self.program.actions.iter().filter(|a| matches!(a.pattern, ActionPattern::End)) {
            let body = action.body.clone();
            if matches!(self.run_block(&body)?, Signal::Exit) {
                break;
            }
        }
        Ok(())
    }

    pub(crate) fn apply_variables(&mut self, variables: &HashMap<String, String>) {
        for (name, value) in variables {
            self.assign_named(name, Value::NumStr(value.clone()));
        }
    }

    /// Runs every record in `data` as the main loop body, with no `BEGIN`/`END`
    /// and no `ARGV` file iteration — a worker's chunk already *is* the input
    /// (§4.7 phase 2). `next`/`nextfile` inside a parallelised program are
    /// unreachable in practice (the analyser marks them `Unsafe`), but are
    /// still handled rather than treated as integrity failures.
    pub(crate) fn run_chunk(&mut self, data: &[u8]) -> Result<(), RuntimeError> {
        self.current_reader = Some(Box::new(BufReader::new(std::io::Cursor::new(data.to_vec()))));
        loop {
            let rs = self.rs();
            let Some(line) = self.read_main_record(&rs)? else { break };
            self.specials[NR as usize] = Value::Num(self.specials[NR as usize].as_number() + 1.0);
            self.specials[FNR as usize] = Value::Num(self.specials[FNR as usize].as_number() + 1.0);
            self.record.set_line(line);
            match self.dispatch_record()? {
                RecordOutcome::Continue | RecordOutcome::NextFile => {}
                RecordOutcome::Exit => break,
            }
        }
        Ok(())
    }

    pub(crate) fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
    pub(crate) fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }
    pub(crate) fn global_scalars(&self) -> &[Value] {
        &self.globals_scalar
    }
    pub(crate) fn set_global_scalars(&mut self, v: Vec<Value>) {
        self.globals_scalar = v;
    }
    pub(crate) fn global_arrays(&self) -> &[Array] {
        &self.arrays
    }
    pub(crate) fn set_global_arrays(&mut self, v: Vec<Array>) {
        self.arrays = v;
    }
    pub(crate) fn nr(&self) -> f64 {
        self.specials[NR as usize].as_number()
    }
    pub(crate) fn set_nr_fnr(&mut self, nr: f64) {
        self.specials[NR as usize] = Value::Num(nr);
        self.specials[FNR as usize] = Value::Num(nr);
    }
    pub(crate) fn set_filename(&mut self, name: &str) {
        self.specials[FILENAME as usize] = Value::Str(name.to_string());
    }

    /// Returns `true` if an `exit` fired during the main loop.
    fn run_main(&mut self, input: impl Read + 'static) -> Result<bool, RuntimeError> {
        let argc = self.specials[ARGC as usize].as_number() as i64;
        let mut any_file = false;
        let mut i: i64 = 1;
        while i < argc {
            let arg = self.arrays[0].get(&i.to_string()).cloned().unwrap_or(Value::Null).as_string(&self.convfmt());
            i += 1;
            if let Some((name, value)) = parse_var_assign(&arg) {
                self.assign_named(&name, Value::NumStr(value));
                continue;
            }
            if arg.is_empty() {
                continue;
            }
            any_file = true;
            self.specials[FILENAME as usize] = Value::Str(arg.clone());
            self.specials[FNR as usize] = Value::Num(0.0);
            let opened: Box<dyn BufRead> = if arg == "-" {
                Box::new(BufReader::new(std::io::stdin()))
            } else {
                match File::open(&arg) {
                    Ok(f) => Box::new(BufReader::new(f)),
                    Err(_) => continue,
                }
            };
            self.current_reader = Some(opened);
            match self.run_stream()? {
                RecordOutcome::Exit => return Ok(true),
                RecordOutcome::NextFile | RecordOutcome::Continue => {}
            }
        }
        if !any_file {
            self.specials[FNR as usize] = Value::Num(0.0);
            self.current_reader = Some(Box::new(BufReader::new(input)));
            if let RecordOutcome::Exit = self.run_stream()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reads and processes records from `self.current_reader` until it's
    /// exhausted, `nextfile` ends the current file early, or `exit` fires.
    fn run_stream(&mut self) -> Result<RecordOutcome, RuntimeError> {
        loop {
            let rs = self.rs();
            let Some(line) = self.read_main_record(&rs)? else { break };

            self.specials[NR as usize] = Value::Num(self.specials[NR as usize].as_number() + 1.0);
            self.specials[FNR as usize] = Value::Num(self.specials[FNR as usize].as_number() + 1.0);
            self.record.set_line(line);

            match self.dispatch_record()? {
                RecordOutcome::Continue => {}
                RecordOutcome::NextFile => return Ok(RecordOutcome::Continue),
                RecordOutcome::Exit => return Ok(RecordOutcome::Exit),
            }
        }
        Ok(RecordOutcome::Continue)
    }

    fn read_main_record(&mut self, rs: &str) -> Result<Option<String>, RuntimeError> {
        match &mut self.current_reader {
            Some(r) => io::read_record(r.as_mut(), rs).map_err(|e| RuntimeError::Integrity(e.to_string())),
            None => Ok(None),
        }
    }

    fn dispatch_record(&mut self) -> Result<RecordOutcome, RuntimeError> {
        let n = self.program.actions.len();
        for idx in 0..n {
            let action = &self.program.actions[idx];
            if matches!(action.pattern, ActionPattern::Begin | ActionPattern::End) {
                continue;
            }
            if self.pattern_matches(idx)? {
                let body = &self.program.actions[idx].body;
                match self.run_block(body)? {
                    Signal::Normal | Signal::Next => {}
                    Signal::NextFile => return Ok(RecordOutcome::NextFile),
                    Signal::Exit => return Ok(RecordOutcome::Exit),
                    Signal::Return(_) | Signal::BreakForIn => {
                        return Err(RuntimeError::Integrity(
                            "return/break escaped its enclosing function/loop".to_string(),
                        ))
                    }
                }
            }
        }
        Ok(RecordOutcome::Continue)
    }

    fn pattern_matches(&mut self, action_idx: usize) -> Result<bool, RuntimeError> {
        match &self.program.actions[action_idx].pattern {
            ActionPattern::Always => Ok(true),
            ActionPattern::Begin | ActionPattern::End => Ok(true),
            ActionPattern::Expr(code) => {
                let code = code.clone();
                self.run_block(&code)?;
                Ok(self.pop().as_bool())
            }
            ActionPattern::Range(start, end) => {
                let start = start.clone();
                let end = end.clone();
                let state_idx = self.program.actions[action_idx].range_state_idx.unwrap() as usize;
                if !self.range_active[state_idx] {
                    self.run_block(&start)?;
                    if !self.pop().as_bool() {
                        return Ok(false);
                    }
                    self.range_active[state_idx] = true;
                }
                self.run_block(&end)?;
                if self.pop().as_bool() {
                    self.range_active[state_idx] = false;
                }
                Ok(true)
            }
        }
    }

    // ---- special/global access helpers ----

    fn convfmt(&self) -> String {
        self.specials[CONVFMT as usize].as_string("%.6g")
    }
    fn ofmt(&self) -> String {
        self.specials[OFMT as usize].as_string("%.6g")
    }
    fn fs(&self) -> String {
        let fmt = self.convfmt();
        self.specials[FS as usize].as_string(&fmt)
    }
    fn ofs(&self) -> String {
        let fmt = self.convfmt();
        self.specials[OFS as usize].as_string(&fmt)
    }
    fn ors(&self) -> String {
        let fmt = self.convfmt();
        self.specials[ORS as usize].as_string(&fmt)
    }
    fn rs(&self) -> String {
        let fmt = self.convfmt();
        self.specials[RS as usize].as_string(&fmt)
    }
    fn subsep(&self) -> String {
        let fmt = self.convfmt();
        self.specials[SUBSEP as usize].as_string(&fmt)
    }

    fn assign_named(&mut self, name: &str, value: Value) {
        if let Some(idx) = special_index(name) {
            self.special_set(idx, value);
            return;
        }
        if let Some(i) = self.program.global_scalar_names.iter().position(|n| n == name) {
            self.globals_scalar[i] = value;
        }
    }

    fn compute_nf(&mut self) -> usize {
        let fs = self.fs();
        self.record.nf(&fs, &self.regex_cache, self.posix)
    }

    fn special_get(&mut self, idx: u32) -> Value {
        match idx {
            NF => Value::Num(self.compute_nf() as f64),
            ARGV | ENVIRON => Value::Null,
            _ => self.specials[idx as usize].clone(),
        }
    }

    fn special_set(&mut self, idx: u32, v: Value) {
        match idx {
            NF => {
                let n = v.as_number().max(0.0) as usize;
                let fs = self.fs();
                let ofs = self.ofs();
                self.record.set_nf(n, &fs, &ofs, &self.regex_cache, self.posix);
            }
            ARGV | ENVIRON => {}
            _ => self.specials[idx as usize] = v,
        }
    }

    // ---- scalar/array slot resolution ----

    fn scalar_get(&mut self, scope: Scope, idx: u32) -> Value {
        match scope {
            Scope::Global => self.globals_scalar[idx as usize].clone(),
            Scope::Special => self.special_get(idx),
            Scope::Local => self.frames.last().unwrap().scalars[idx as usize].clone(),
        }
    }

    fn scalar_set(&mut self, scope: Scope, idx: u32, v: Value) {
        match scope {
            Scope::Global => self.globals_scalar[idx as usize] = v,
            Scope::Special => self.special_set(idx, v),
            Scope::Local => self.frames.last_mut().unwrap().scalars[idx as usize] = v,
        }
    }

    fn array_arena_index(&self, scope: Scope, idx: u32) -> usize {
        match scope {
            Scope::Global => ARRAY_ARENA_BASE + idx as usize,
            Scope::Special => {
                if idx == ARGV {
                    0
                } else {
                    1
                }
            }
            Scope::Local => self.frames.last().unwrap().array_slots[idx as usize],
        }
    }

    fn array_mut(&mut self, scope: Scope, idx: u32) -> &mut Array {
        let ai = self.array_arena_index(scope, idx);
        &mut self.arrays[ai]
    }

    // ---- field access ----

    fn field_value(&mut self, i: usize) -> Value {
        let fs = self.fs();
        let (text, explicit) = self.record.get_field(i, &fs, &self.regex_cache, self.posix);
        if explicit {
            Value::Str(text)
        } else {
            Value::NumStr(text)
        }
    }

    fn field_text(&mut self, i: usize) -> String {
        let fs = self.fs();
        self.record.get_field(i, &fs, &self.regex_cache, self.posix).0
    }

    fn set_field(&mut self, i: usize, value: String) {
        let fs = self.fs();
        let ofs = self.ofs();
        self.record.set_field(i, value, &fs, &ofs, &self.regex_cache, self.posix);
    }

    // ---- stack helpers ----

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let mut v = Vec::with_capacity(n);
        for _ in 0..n {
            v.push(self.pop());
        }
        v.reverse();
        v
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn rand_next(&mut self) -> f64 {
        let mut x = self.rng_seed;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_seed = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    fn write_output(&mut self, s: &str, redirect: Option<(String, bool, bool)>) {
        match redirect {
            None => self.out.extend_from_slice(s.as_bytes()),
            Some((name, pipe, append)) => {
                let _ = self.io.write_to(&name, pipe, append, s.as_bytes());
            }
        }
    }

    // ---- main dispatch ----

    fn run_block(&mut self, code: &[Op]) -> Result<Signal, RuntimeError> {
        let mut pc = 0usize;
        while pc < code.len() {
            let op = &code[pc];
            pc += 1;
            match op {
                Op::Nop => {}
                Op::PushNum(i) => self.push(Value::Num(self.program.num_pool[*i as usize])),
                Op::PushStr(i) => self.push(Value::Str(self.program.str_pool[*i as usize].clone())),
                Op::Drop => {
                    self.pop();
                }
                Op::Dup => {
                    let v = self.stack.last().cloned().unwrap_or(Value::Null);
                    self.push(v);
                }
                Op::Swap => {
                    let n = self.stack.len();
                    if n >= 2 {
                        self.stack.swap(n - 1, n - 2);
                    }
                }
                Op::Rote => {
                    let c = self.pop();
                    let b = self.pop();
                    let a = self.pop();
                    self.push(b);
                    self.push(c);
                    self.push(a);
                }

                Op::LoadScalar(scope, idx) => {
                    let v = self.scalar_get(*scope, *idx);
                    self.push(v);
                }
                Op::StoreScalar(scope, idx) => {
                    let v = self.pop();
                    self.scalar_set(*scope, *idx, v);
                }

                Op::LoadFieldImm(k) => {
                    let v = self.field_value(*k as usize);
                    self.push(v);
                }
                Op::LoadFieldDyn => {
                    let k = self.pop().as_number().max(0.0) as usize;
                    let v = self.field_value(k);
                    self.push(v);
                }
                Op::StoreFieldDyn => {
                    let k = self.pop().as_number().max(0.0) as usize;
                    let v = self.pop();
                    let fmt = self.convfmt();
                    self.set_field(k, v.as_string(&fmt));
                }

                Op::ArrayGet(scope, idx) => {
                    let key = self.pop().as_string(&self.convfmt());
                    let v = self.array_mut(*scope, *idx).entry(key).or_insert(Value::Null).clone();
                    self.push(v);
                }
                Op::ArraySet(scope, idx) => {
                    let key = self.pop().as_string(&self.convfmt());
                    let v = self.pop();
                    self.array_mut(*scope, *idx).insert(key, v);
                }
                Op::ArrayDelete(scope, idx) => {
                    let key = self.pop().as_string(&self.convfmt());
                    self.array_mut(*scope, *idx).remove(&key);
                }
                Op::ArrayIn(scope, idx) => {
                    let key = self.pop().as_string(&self.convfmt());
                    let present = self.array_mut(*scope, *idx).contains_key(&key);
                    self.push(Value::Bool(present));
                }
                Op::ArrayClear(scope, idx) => {
                    self.array_mut(*scope, *idx).clear();
                }
                Op::IndexMulti(n) => {
                    let parts = self.pop_n(*n as usize);
                    let sep = self.subsep();
                    let fmt = self.convfmt();
                    let joined = parts.iter().map(|v| v.as_string(&fmt)).collect::<Vec<_>>().join(&sep);
                    self.push(Value::Str(joined));
                }

                Op::AugScalar(scope, idx, arith) => {
                    let rhs = self.pop().as_number();
                    let cur = self.scalar_get(*scope, *idx).as_number();
                    let n = apply_arith(*arith, cur, rhs)?;
                    self.scalar_set(*scope, *idx, Value::Num(n));
                    self.push(Value::Num(n));
                }
                Op::AugField(arith) => {
                    let k = self.pop().as_number().max(0.0) as usize;
                    let rhs = self.pop().as_number();
                    let cur = parse_number_prefix(&self.field_text(k));
                    let n = apply_arith(*arith, cur, rhs)?;
                    let fmt = self.convfmt();
                    self.set_field(k, format_number(n, &fmt));
                    self.push(Value::Num(n));
                }
                Op::AugArray(scope, idx, arith) => {
                    let key = self.pop().as_string(&self.convfmt());
                    let rhs = self.pop().as_number();
                    let cur = self.array_mut(*scope, *idx).get(&key).map(|v| v.as_number()).unwrap_or(0.0);
                    let n = apply_arith(*arith, cur, rhs)?;
                    self.array_mut(*scope, *idx).insert(key, Value::Num(n));
                    self.push(Value::Num(n));
                }

                Op::SubScalar(scope, idx, global) => {
                    let repl = self.pop().as_string(&self.convfmt());
                    let restr = self.pop().as_string(&self.convfmt());
                    let cur = self.scalar_get(*scope, *idx).as_string(&self.convfmt());
                    let (count, new) = self.do_sub(&restr, &repl, &cur, *global);
                    self.scalar_set(*scope, *idx, Value::Str(new));
                    self.push(Value::Num(count as f64));
                }
                Op::SubField(global) => {
                    let k = self.pop().as_number().max(0.0) as usize;
                    let repl = self.pop().as_string(&self.convfmt());
                    let restr = self.pop().as_string(&self.convfmt());
                    let cur = self.field_text(k);
                    let (count, new) = self.do_sub(&restr, &repl, &cur, *global);
                    self.set_field(k, new);
                    self.push(Value::Num(count as f64));
                }
                Op::SubArray(scope, idx, global) => {
                    let key = self.pop().as_string(&self.convfmt());
                    let repl = self.pop().as_string(&self.convfmt());
                    let restr = self.pop().as_string(&self.convfmt());
                    let cur = self.array_mut(*scope, *idx).get(&key).cloned().unwrap_or(Value::Null).as_string(&self.convfmt());
                    let (count, new) = self.do_sub(&restr, &repl, &cur, *global);
                    self.array_mut(*scope, *idx).insert(key, Value::Str(new));
                    self.push(Value::Num(count as f64));
                }

                Op::CallSplit { arr_scope, arr_idx, has_fs } => {
                    let fs = if *has_fs { self.pop().as_string(&self.convfmt()) } else { self.fs() };
                    let subject = self.pop().as_string(&self.convfmt());
                    let parts = split_fields(&subject, &fs, &self.regex_cache, self.posix);
                    let n = parts.len();
                    let arr = self.array_mut(*arr_scope, *arr_idx);
                    arr.clear();
                    for (i, p) in parts.into_iter().enumerate() {
                        arr.insert((i + 1).to_string(), Value::NumStr(p));
                    }
                    self.push(Value::Num(n as f64));
                }

                Op::IncDecScalar(scope, idx, kind) => {
                    let cur = self.scalar_get(*scope, *idx).as_number();
                    let new = cur + incdec_delta(*kind);
                    self.scalar_set(*scope, *idx, Value::Num(new));
                    self.push(Value::Num(if incdec_is_pre(*kind) { new } else { cur }));
                }
                Op::IncDecField(kind) => {
                    let k = self.pop().as_number().max(0.0) as usize;
                    let cur = parse_number_prefix(&self.field_text(k));
                    let new = cur + incdec_delta(*kind);
                    let fmt = self.convfmt();
                    self.set_field(k, format_number(new, &fmt));
                    self.push(Value::Num(if incdec_is_pre(*kind) { new } else { cur }));
                }
                Op::IncDecArray(scope, idx, kind) => {
                    let key = self.pop().as_string(&self.convfmt());
                    let cur = self.array_mut(*scope, *idx).get(&key).map(|v| v.as_number()).unwrap_or(0.0);
                    let new = cur + incdec_delta(*kind);
                    self.array_mut(*scope, *idx).insert(key, Value::Num(new));
                    self.push(Value::Num(if incdec_is_pre(*kind) { new } else { cur }));
                }

                Op::Add | Op::AddNum => {
                    let b = self.pop().as_number();
                    let a = self.pop().as_number();
                    self.push(Value::Num(a + b));
                }
                Op::Sub | Op::SubNum => {
                    let b = self.pop().as_number();
                    let a = self.pop().as_number();
                    self.push(Value::Num(a - b));
                }
                Op::Mul | Op::MulNum => {
                    let b = self.pop().as_number();
                    let a = self.pop().as_number();
                    self.push(Value::Num(a * b));
                }
                Op::Div | Op::DivNum => {
                    let b = self.pop().as_number();
                    let a = self.pop().as_number();
                    if b == 0.0 {
                        return Err(RuntimeError::DivByZero);
                    }
                    self.push(Value::Num(a / b));
                }
                Op::Mod | Op::ModNum => {
                    let b = self.pop().as_number();
                    let a = self.pop().as_number();
                    if b == 0.0 {
                        return Err(RuntimeError::ModByZero);
                    }
                    self.push(Value::Num(a % b));
                }
                Op::Pow | Op::PowNum => {
                    let b = self.pop().as_number();
                    let a = self.pop().as_number();
                    self.push(Value::Num(a.powf(b)));
                }
                Op::Cmp(cmp_op) | Op::CmpNum(cmp_op) => {
                    let b = self.pop();
                    let a = self.pop();
                    let ord = compare(&a, &b);
                    self.push(Value::Bool(cmp_matches(*cmp_op, ord)));
                }
                Op::Concat => {
                    let b = self.pop().as_string(&self.convfmt());
                    let a = self.pop().as_string(&self.convfmt());
                    self.push(Value::Str(a + &b));
                }
                Op::MatchDyn(negate) => {
                    let pat = self.pop().as_string(&self.convfmt());
                    let subject = self.pop().as_string(&self.convfmt());
                    let m = self.regex_match(&pat, &subject);
                    self.push(Value::Bool(m ^ negate));
                }
                Op::MatchConst(idx, negate) => {
                    let pat = self.program.regex_pool[*idx as usize].clone();
                    let subject = self.pop().as_string(&self.convfmt());
                    let m = self.regex_match(&pat, &subject);
                    self.push(Value::Bool(m ^ negate));
                }

                Op::Neg => {
                    let v = self.pop().as_number();
                    self.push(Value::Num(-v));
                }
                Op::Pos => {
                    let v = self.pop().as_number();
                    self.push(Value::Num(v));
                }
                Op::Not => {
                    let v = self.pop().as_bool();
                    self.push(Value::Bool(!v));
                }

                Op::FieldIntCmpNumJump(k, n, cmp_op, off) => {
                    let v = self.field_value(*k as usize);
                    let ord = compare(&v, &Value::Num(*n));
                    if !cmp_matches(*cmp_op, ord) {
                        pc = (pc as i32 + off) as usize;
                    }
                }
                Op::AddFields(i, j) => {
                    let a = parse_number_prefix(&self.field_text(*i as usize));
                    let b = parse_number_prefix(&self.field_text(*j as usize));
                    self.push(Value::Num(a + b));
                }
                Op::ScalarCmpNumJump(scope, idx, n, cmp_op, off) => {
                    let v = self.scalar_get(*scope, *idx).as_number();
                    let ord = v.partial_cmp(n).unwrap_or(std::cmp::Ordering::Equal);
                    if !cmp_matches(*cmp_op, ord) {
                        pc = (pc as i32 + off) as usize;
                    }
                }

                Op::Jump(off) => pc = (pc as i32 + off) as usize,
                Op::JumpTrue(off) => {
                    if self.pop().as_bool() {
                        pc = (pc as i32 + off) as usize;
                    }
                }
                Op::JumpFalse(off) => {
                    if !self.pop().as_bool() {
                        pc = (pc as i32 + off) as usize;
                    }
                }
                Op::ForIn { var_scope, var_idx, arr_scope, arr_idx, body_len } => {
                    let keys: Vec<String> = self.array_mut(*arr_scope, *arr_idx).keys().cloned().collect();
                    let body_start = pc;
                    let body_end = body_start + *body_len as usize;
                    let sub_code = code[body_start..body_end].to_vec();
                    for k in keys {
                        self.scalar_set(*var_scope, *var_idx, Value::NumStr(k));
                        match self.run_block(&sub_code)? {
                            Signal::Normal => {}
                            Signal::BreakForIn => break,
                            other => return Ok(other),
                        }
                    }
                    pc = body_end;
                }
                Op::BreakForIn => return Ok(Signal::BreakForIn),

                Op::CallBuiltin(b, argc) => {
                    let args = self.pop_n(*argc as usize);
                    let v = builtins::call_builtin(self, *b, args);
                    self.push(v);
                }
                Op::CallUser { func_idx, num_scalar_args, array_args } => {
                    let sig = self.call_user(*func_idx, *num_scalar_args, array_args)?;
                    match sig {
                        Signal::Return(v) => self.push(v),
                        Signal::Normal => self.push(Value::Null),
                        other => return Ok(other),
                    }
                }
                Op::Return => {
                    let v = self.pop();
                    return Ok(Signal::Return(v));
                }
                Op::ReturnNull => return Ok(Signal::Return(Value::Null)),

                Op::Next => return Ok(Signal::Next),
                Op::NextFile => return Ok(Signal::NextFile),
                Op::Exit => return Ok(Signal::Exit),
                Op::ExitCode => {
                    let v = self.pop();
                    self.exit_code = Some(v.as_number() as i32);
                    return Ok(Signal::Exit);
                }

                Op::Print(argc, tag) => {
                    let mut args = self.pop_n(*argc as usize);
                    let target = self.pop_redirect_target(tag);
                    if args.is_empty() {
                        args.push(self.field_value(0));
                    }
                    let ofmt = self.ofmt();
                    let ofs = self.ofs();
                    let ors = self.ors();
                    let line = args.iter().map(|v| v.as_string(&ofmt)).collect::<Vec<_>>().join(&ofs) + &ors;
                    self.write_output(&line, target);
                }
                Op::Printf(argc, tag) => {
                    let args = self.pop_n(*argc as usize);
                    let target = self.pop_redirect_target(tag);
                    let fmt = args.first().cloned().unwrap_or(Value::Null).as_string(&self.convfmt());
                    let rendered = crate::fmt::sprintf(&fmt, &args[1.min(args.len())..]);
                    self.write_output(&rendered, target);
                }

                Op::Getline(tag) => {
                    let v = self.do_getline(*tag, None)?;
                    self.push(Value::Num(v));
                }
                Op::GetlineVar(tag, scope, idx) => {
                    let v = self.do_getline(*tag, Some(GetlineTarget::Scalar(*scope, *idx)))?;
                    self.push(Value::Num(v));
                }
                Op::GetlineField(tag) => {
                    let k = self.pop().as_number().max(0.0) as usize;
                    let v = self.do_getline(*tag, Some(GetlineTarget::Field(k)))?;
                    self.push(Value::Num(v));
                }
            }
        }
        Ok(Signal::Normal)
    }

    fn pop_redirect_target(&mut self, tag: &Option<crate::bytecode::RedirectTag>) -> Option<(String, bool, bool)> {
        use crate::bytecode::RedirectTag;
        (*tag).map(|t| {
            let name = self.pop().as_string(&self.convfmt());
            match t {
                RedirectTag::Write => (name, false, false),
                RedirectTag::Append => (name, false, true),
                RedirectTag::Pipe => (name, true, false),
            }
        })
    }

    fn call_user(&mut self, func_idx: u32, num_scalar_args: u8, array_args: &[(Scope, u32)]) -> Result<Signal, RuntimeError> {
        // `func` borrows through `self.program: &'p CompiledProgram`, a
        // reference field whose pointee lives for `'p` independent of this
        // `&mut self` borrow, so holding `code` doesn't block the frame
        // push/pop or the recursive `run_block` call below from mutating
        // every other field.
        let func = &self.program.functions[func_idx as usize];
        let num_locals_scalar = func.num_locals_scalar as usize;
        let num_locals_array = func.num_locals_array as usize;
        let code: &[Op] = &func.code;

        let scalar_args = self.pop_n(num_scalar_args as usize);
        let mut scalars = vec![Value::Null; num_locals_scalar];
        for (i, v) in scalar_args.into_iter().enumerate() {
            if i < scalars.len() {
                scalars[i] = v;
            }
        }

        let mut array_slots = Vec::with_capacity(num_locals_array);
        for i in 0..num_locals_array {
            if let Some((scope, idx)) = array_args.get(i) {
                array_slots.push(self.array_arena_index(*scope, *idx));
            } else {
                self.arrays.push(HashMap::new());
                array_slots.push(self.arrays.len() - 1);
            }
        }

        self.frames.push(CallFrame { scalars, array_slots, return_pc: 0, return_code_idx: 0 });
        let result = self.run_block(code);
        self.frames.pop();
        result
    }

    fn regex_match(&self, pattern: &str, subject: &str) -> bool {
        match self.regex_cache.get_or_compile(pattern, self.posix) {
            Some(h) => h.with(|m| m.matches(subject)),
            None => false,
        }
    }

    fn do_sub(&self, pattern: &str, repl: &str, subject: &str, global: bool) -> (usize, String) {
        match self.regex_cache.get_or_compile(pattern, self.posix) {
            Some(h) => h.with(|m| if global { m.replace_all(subject, repl) } else { m.replace_first(subject, repl) }),
            None => (0, subject.to_string()),
        }
    }

    fn do_getline(&mut self, tag: crate::bytecode::GetlineSourceTag, target: Option<GetlineTarget>) -> Result<f64, RuntimeError> {
        use crate::bytecode::GetlineSourceTag;
        let rs = self.rs();
        let line = match tag {
            GetlineSourceTag::Main => match self.read_main_record(&rs) {
                Ok(v) => Ok(v),
                Err(_) => Err(std::io::Error::new(std::io::ErrorKind::Other, "main stream read failed")),
            },
            GetlineSourceTag::File => {
                let name = self.pop().as_string(&self.convfmt());
                self.io.getline_from(&name, false, &rs)
            }
            GetlineSourceTag::Command => {
                let cmd = self.pop().as_string(&self.convfmt());
                self.io.getline_from(&cmd, true, &rs)
            }
        };
        let line = match line {
            Ok(Some(l)) => l,
            Ok(None) => return Ok(0.0),
            Err(_) => return Ok(-1.0),
        };

        // NR bumps for every source but an explicit file; FNR bumps only for
        // the main input stream (`cmd | getline` and `getline < file` both
        // leave FNR alone).
        if !matches!(tag, GetlineSourceTag::File) {
            self.specials[NR as usize] = Value::Num(self.specials[NR as usize].as_number() + 1.0);
        }
        if matches!(tag, GetlineSourceTag::Main) {
            self.specials[FNR as usize] = Value::Num(self.specials[FNR as usize].as_number() + 1.0);
        }

        match target {
            None => self.record.set_line(line),
            Some(GetlineTarget::Scalar(scope, idx)) => self.scalar_set(scope, idx, Value::NumStr(line)),
            Some(GetlineTarget::Field(k)) => self.set_field(k, line),
        }
        Ok(1.0)
    }
}

enum GetlineTarget {
    Scalar(Scope, u32),
    Field(usize),
}

fn cmp_matches(op: CmpOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CmpOp::Eq => ord == Equal,
        CmpOp::Ne => ord != Equal,
        CmpOp::Lt => ord == Less,
        CmpOp::Le => ord != Greater,
        CmpOp::Gt => ord == Greater,
        CmpOp::Ge => ord != Less,
    }
}

fn apply_arith(op: ArithOp, a: f64, b: f64) -> Result<f64, RuntimeError> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(RuntimeError::DivByZero);
            }
            a / b
        }
        ArithOp::Mod => {
            if b == 0.0 {
                return Err(RuntimeError::ModByZero);
            }
            a % b
        }
        ArithOp::Pow => a.powf(b),
    })
}

fn incdec_delta(kind: crate::bytecode::IncDec) -> f64 {
    use crate::bytecode::IncDec::*;
    match kind {
        PreInc | PostInc => 1.0,
        PreDec | PostDec => -1.0,
    }
}

fn incdec_is_pre(kind: crate::bytecode::IncDec) -> bool {
    use crate::bytecode::IncDec::*;
    matches!(kind, PreInc | PreDec)
}

/// Parses a leading `name=value` command-line operand (POSIX awk's
/// mixed-in variable assignment convention). `name` must look like an AWK
/// identifier, which is what keeps a filename like `a=b.txt` (not intended
/// as an assignment in practice, but syntactically ambiguous) out of scope
/// here; callers are expected to accept the POSIX ambiguity as-is.
fn parse_var_assign(arg: &str) -> Option<(String, String)> {
    let eq = arg.find('=')?;
    let (name, rest) = arg.split_at(eq);
    let value = &rest[1..];
    if name.is_empty() {
        return None;
    }
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

fn seed_from_time() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(1).max(1)
}
