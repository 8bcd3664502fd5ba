//! Built-in function dispatch (§4.5 "Built-in functions"). `sub`/`gsub`/
//! `split` are compiled to dedicated mutating opcodes (see `bytecode::Op`)
//! since they write back into an lvalue the call site already knows the
//! shape of; everything else routes through this one `call_builtin` match,
//! mirroring the teacher's single dispatch table for its ROM-resident
//! builtins rather than one Rust function per builtin.

use crate::bytecode::Builtin;
use crate::value::Value;

use super::Vm;

pub(super) fn call_builtin(vm: &mut Vm, b: Builtin, args: Vec<Value>) -> Value {
    let convfmt = vm.convfmt();
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);

    match b {
        Builtin::Length => {
            let v = arg(0);
            let n = if args.is_empty() {
                vm.field_text(0).chars().count()
            } else {
                v.as_string(&convfmt).chars().count()
            };
            Value::Num(n as f64)
        }
        Builtin::Substr2 => {
            let s = arg(0).as_string(&convfmt);
            let start = arg(1).as_number();
            Value::Str(substr(&s, start, None))
        }
        Builtin::Substr3 => {
            let s = arg(0).as_string(&convfmt);
            let start = arg(1).as_number();
            let len = arg(2).as_number();
            Value::Str(substr(&s, start, Some(len)))
        }
        Builtin::Index => {
            let s = arg(0).as_string(&convfmt);
            let t = arg(1).as_string(&convfmt);
            let pos = s.find(&t).map(|byte| s[..byte].chars().count() + 1).unwrap_or(0);
            Value::Num(pos as f64)
        }
        Builtin::Match => {
            let s = arg(0).as_string(&convfmt);
            let pat = arg(1).as_string(&convfmt);
            match vm.regex_cache.get_or_compile(&pat, vm.posix) {
                Some(h) => match h.with(|m| m.find(&s)) {
                    Some((start, len)) => {
                        let rstart = s[..start].chars().count() + 1;
                        let rlen = s[start..start + len].chars().count();
                        vm.specials[super::RSTART as usize] = Value::Num(rstart as f64);
                        vm.specials[super::RLENGTH as usize] = Value::Num(rlen as f64);
                        Value::Num(rstart as f64)
                    }
                    None => {
                        vm.specials[super::RSTART as usize] = Value::Num(0.0);
                        vm.specials[super::RLENGTH as usize] = Value::Num(-1.0);
                        Value::Num(0.0)
                    }
                },
                None => {
                    vm.specials[super::RSTART as usize] = Value::Num(0.0);
                    vm.specials[super::RLENGTH as usize] = Value::Num(-1.0);
                    Value::Num(0.0)
                }
            }
        }
        Builtin::Sprintf => {
            let fmt = arg(0).as_string(&convfmt);
            Value::Str(crate::fmt::sprintf(&fmt, &args[1.min(args.len())..]))
        }
        Builtin::ToLower => Value::Str(arg(0).as_string(&convfmt).to_lowercase()),
        Builtin::ToUpper => Value::Str(arg(0).as_string(&convfmt).to_uppercase()),
        Builtin::Sin => Value::Num(arg(0).as_number().sin()),
        Builtin::Cos => Value::Num(arg(0).as_number().cos()),
        Builtin::Atan2 => Value::Num(arg(0).as_number().atan2(arg(1).as_number())),
        Builtin::Exp => Value::Num(arg(0).as_number().exp()),
        Builtin::Log => Value::Num(arg(0).as_number().ln()),
        Builtin::Sqrt => Value::Num(arg(0).as_number().sqrt()),
        Builtin::Int => Value::Num(arg(0).as_number().trunc()),
        Builtin::Rand => Value::Num(vm.rand_next()),
        Builtin::Srand0 => {
            let prev = vm.rng_seed;
            vm.rng_seed = super::seed_from_time();
            Value::Num(prev as f64)
        }
        Builtin::Srand1 => {
            let prev = vm.rng_seed;
            let seed = arg(0).as_number();
            vm.rng_seed = if seed == 0.0 { 1 } else { seed.abs() as u64 };
            Value::Num(prev as f64)
        }
        Builtin::Close => {
            let name = arg(0).as_string(&convfmt);
            Value::Num(vm.io.close(&name) as f64)
        }
        Builtin::FflushAll => Value::Num(vm.io.fflush_all() as f64),
        Builtin::FflushOne => {
            let name = arg(0).as_string(&convfmt);
            Value::Num(vm.io.fflush_one(&name) as f64)
        }
        Builtin::System => {
            let cmd = arg(0).as_string(&convfmt);
            let _ = std::io::Write::flush(&mut std::io::stdout());
            match std::process::Command::new("sh").arg("-c").arg(&cmd).status() {
                Ok(status) => Value::Num(status.code().unwrap_or(-1) as f64),
                Err(_) => Value::Num(-1.0),
            }
        }
    }
}

/// 1-based, AWK-style: `start` < 1 clamps the beginning of the slice down
/// (and the clamp shrinks `len` to match), and `start`/`len` can run past
/// the string's end with no error, just an empty/truncated result.
fn substr(s: &str, start: f64, len: Option<f64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len() as f64;
    let start_req = start;
    let end_req = match len {
        Some(l) => start_req + l,
        None => n + 1.0,
    };
    let begin = start_req.max(1.0);
    let end = end_req.min(n + 1.0);
    if end <= begin {
        return String::new();
    }
    let begin_idx = (begin - 1.0) as usize;
    let end_idx = (end - 1.0) as usize;
    chars[begin_idx.min(chars.len())..end_idx.min(chars.len())].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substr_clamps_negative_start() {
        assert_eq!(substr("hello", -2.0, Some(5.0)), "he");
    }

    #[test]
    fn substr_past_end_is_empty() {
        assert_eq!(substr("hello", 10.0, Some(3.0)), "");
    }

    #[test]
    fn substr_no_length_reads_to_end() {
        assert_eq!(substr("hello", 3.0, None), "llo");
    }
}
