//! printf/sprintf-family formatting shared by `Value` string conversion
//! (CONVFMT/OFMT, a single `%`-directive applied to one number) and the
//! `sprintf`/`printf` builtins (§4.5 "Built-in functions", full directive set).

use crate::value::Value;

/// Applies a single numeric conversion spec (e.g. `"%.6g"`, `"%d"`) to one
/// f64. Used by `Value::as_string` for CONVFMT/OFMT, which are always a lone
/// directive, never a full template with literal text.
pub fn format_single_number(fmt: &str, n: f64) -> String {
    sprintf(fmt, &[Value::Num(n)])
}

struct Spec {
    flag_minus: bool,
    flag_plus: bool,
    flag_space: bool,
    flag_hash: bool,
    flag_zero: bool,
    width: Option<i64>,
    precision: Option<i64>,
    conv: char,
}

/// Full AWK `sprintf` directive set: `%d %i %o %u %x %X %c %s %e %E %f %F %g
/// %G %%`, flags `- + <space> # 0`, width/precision including `*`. Extra
/// arguments are ignored; missing arguments are treated as `Value::Null`.
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0;
    let mut argi = 0;
    let next_arg = |argi: &mut usize| -> Value {
        let v = args.get(*argi).cloned().unwrap_or(Value::Null);
        *argi += 1;
        v
    };

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        if i >= chars.len() {
            out.push('%');
            break;
        }
        if chars[i] == '%' {
            out.push('%');
            i += 1;
            continue;
        }

        let mut spec = Spec {
            flag_minus: false,
            flag_plus: false,
            flag_space: false,
            flag_hash: false,
            flag_zero: false,
            width: None,
            precision: None,
            conv: '\0',
        };

        loop {
            match chars.get(i) {
                Some('-') => {
                    spec.flag_minus = true;
                    i += 1;
                }
                Some('+') => {
                    spec.flag_plus = true;
                    i += 1;
                }
                Some(' ') => {
                    spec.flag_space = true;
                    i += 1;
                }
                Some('#') => {
                    spec.flag_hash = true;
                    i += 1;
                }
                Some('0') => {
                    spec.flag_zero = true;
                    i += 1;
                }
                _ => break,
            }
        }

        if chars.get(i) == Some(&'*') {
            spec.width = Some(next_arg(&mut argi).as_number() as i64);
            i += 1;
        } else {
            let start = i;
            while matches!(chars.get(i), Some(c) if c.is_ascii_digit()) {
                i += 1;
            }
            if i > start {
                spec.width = chars[start..i].iter().collect::<String>().parse().ok();
            }
        }

        if chars.get(i) == Some(&'.') {
            i += 1;
            if chars.get(i) == Some(&'*') {
                spec.precision = Some(next_arg(&mut argi).as_number() as i64);
                i += 1;
            } else {
                let start = i;
                while matches!(chars.get(i), Some(c) if c.is_ascii_digit()) {
                    i += 1;
                }
                spec.precision = Some(chars[start..i].iter().collect::<String>().parse().unwrap_or(0));
            }
        }

        spec.conv = match chars.get(i) {
            Some(c) => *c,
            None => break,
        };
        i += 1;

        let rendered = render_one(&spec, &next_arg(&mut argi));
        out.push_str(&rendered);
    }
    out
}

fn pad(body: String, spec: &Spec, is_numeric: bool) -> String {
    let width = spec.width.unwrap_or(0);
    let neg_width = width < 0;
    let width = width.unsigned_abs() as usize;
    let minus = spec.flag_minus || neg_width;
    if body.chars().count() >= width {
        return body;
    }
    let pad_len = width - body.chars().count();
    if minus {
        format!("{}{}", body, " ".repeat(pad_len))
    } else if spec.flag_zero && is_numeric && spec.precision.is_none() {
        // zero-padding goes after an explicit sign character
        if let Some(stripped) = body.strip_prefix('-') {
            format!("-{}{}", "0".repeat(pad_len), stripped)
        } else if let Some(stripped) = body.strip_prefix('+') {
            format!("+{}{}", "0".repeat(pad_len), stripped)
        } else {
            format!("{}{}", "0".repeat(pad_len), body)
        }
    } else {
        format!("{}{}", " ".repeat(pad_len), body)
    }
}

fn sign_prefix(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.flag_plus {
        "+"
    } else if spec.flag_space {
        " "
    } else {
        ""
    }
}

fn render_one(spec: &Spec, v: &Value) -> String {
    match spec.conv {
        'd' | 'i' => {
            let n = v.as_number();
            let i = n as i64;
            let digits = i.unsigned_abs().to_string();
            let digits = apply_precision_int(digits, spec.precision);
            let body = format!("{}{}", sign_prefix(spec, i < 0), digits);
            pad(body, spec, true)
        }
        'u' => {
            let n = v.as_number();
            let i = n as i64 as u64;
            let digits = apply_precision_int(i.to_string(), spec.precision);
            pad(digits, spec, true)
        }
        'o' => {
            let i = v.as_number() as i64 as u64;
            let mut digits = format!("{:o}", i);
            if spec.flag_hash && !digits.starts_with('0') {
                digits = format!("0{}", digits);
            }
            pad(apply_precision_int(digits, spec.precision), spec, true)
        }
        'x' => {
            let i = v.as_number() as i64 as u64;
            let digits = format!("{:x}", i);
            let digits = apply_precision_int(digits, spec.precision);
            let body = if spec.flag_hash && i != 0 {
                format!("0x{}", digits)
            } else {
                digits
            };
            pad(body, spec, true)
        }
        'X' => {
            let i = v.as_number() as i64 as u64;
            let digits = format!("{:X}", i);
            let digits = apply_precision_int(digits, spec.precision);
            let body = if spec.flag_hash && i != 0 {
                format!("0X{}", digits)
            } else {
                digits
            };
            pad(body, spec, true)
        }
        'c' => {
            let s = match v {
                Value::Str(s) | Value::NumStr(s) if !s.is_empty() => {
                    s.chars().next().unwrap().to_string()
                }
                Value::Num(n) => (*n as i64 as u8 as char).to_string(),
                _ => String::new(),
            };
            pad(s, spec, false)
        }
        's' => {
            let s = v.as_string("%.6g");
            let s = match spec.precision {
                Some(p) if p >= 0 => s.chars().take(p as usize).collect(),
                _ => s,
            };
            pad(s, spec, false)
        }
        'e' | 'E' => {
            let n = v.as_number();
            let prec = spec.precision.unwrap_or(6).max(0) as usize;
            let body = format_exp(n.abs(), prec, spec.conv == 'E');
            let body = format!("{}{}", sign_prefix(spec, n.is_sign_negative() && n != 0.0), body);
            pad(body, spec, true)
        }
        'f' | 'F' => {
            let n = v.as_number();
            let prec = spec.precision.unwrap_or(6).max(0) as usize;
            let body = format!("{:.*}", prec, n.abs());
            let body = format!("{}{}", sign_prefix(spec, n.is_sign_negative() && n != 0.0), body);
            pad(body, spec, true)
        }
        'g' | 'G' => {
            let n = v.as_number();
            let prec = spec.precision.unwrap_or(6).max(1) as usize;
            let body = format_g(n, prec, spec.conv == 'G', spec.flag_hash);
            pad(body, spec, true)
        }
        _ => String::new(),
    }
}

fn apply_precision_int(digits: String, precision: Option<i64>) -> String {
    match precision {
        Some(p) if p >= 0 => {
            let p = p as usize;
            if digits.len() < p {
                format!("{}{}", "0".repeat(p - digits.len()), digits)
            } else {
                digits
            }
        }
        _ => digits,
    }
}

fn format_exp(mag: f64, prec: usize, upper: bool) -> String {
    if mag == 0.0 {
        let mantissa = format!("{:.*}", prec, 0.0);
        return format!("{}{}+00", mantissa, if upper { 'E' } else { 'e' });
    }
    let exp = mag.log10().floor() as i32;
    let mantissa = mag / 10f64.powi(exp);
    let (mantissa, exp) = if mantissa >= 10.0 {
        (mantissa / 10.0, exp + 1)
    } else if mantissa < 1.0 {
        (mantissa * 10.0, exp - 1)
    } else {
        (mantissa, exp)
    };
    format!(
        "{:.*}{}{}{:02}",
        prec,
        mantissa,
        if upper { 'E' } else { 'e' },
        if exp < 0 { '-' } else { '+' },
        exp.abs()
    )
}

fn format_g(n: f64, prec: usize, upper: bool, keep_trailing: bool) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let exp = n.abs().log10().floor() as i32;
    if exp < -4 || exp >= prec as i32 {
        let s = format_exp(n.abs(), prec.saturating_sub(1), upper);
        let s = if keep_trailing { s } else { strip_trailing_zeros_exp(&s) };
        if n < 0.0 {
            format!("-{}", s)
        } else {
            s
        }
    } else {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        let s = format!("{:.*}", decimals, n.abs());
        let s = if keep_trailing { s } else { strip_trailing_zeros(&s) };
        if n < 0.0 {
            format!("-{}", s)
        } else {
            s
        }
    }
}

fn strip_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let s = s.trim_end_matches('0');
    s.trim_end_matches('.').to_string()
}

fn strip_trailing_zeros_exp(s: &str) -> String {
    if let Some(pos) = s.find(|c| c == 'e' || c == 'E') {
        let (mantissa, rest) = s.split_at(pos);
        format!("{}{}", strip_trailing_zeros(mantissa), rest)
    } else {
        strip_trailing_zeros(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_d() {
        assert_eq!(sprintf("%d", &[Value::Num(42.0)]), "42");
        assert_eq!(sprintf("%5d", &[Value::Num(42.0)]), "   42");
        assert_eq!(sprintf("%-5d|", &[Value::Num(42.0)]), "42   |");
        assert_eq!(sprintf("%05d", &[Value::Num(42.0)]), "00042");
    }

    #[test]
    fn string_and_char() {
        assert_eq!(sprintf("%s", &[Value::Str("hi".into())]), "hi");
        assert_eq!(sprintf("%c", &[Value::Num(65.0)]), "A");
        assert_eq!(sprintf("%c", &[Value::Str("zebra".into())]), "z");
    }

    #[test]
    fn float_formats() {
        assert_eq!(sprintf("%.2f", &[Value::Num(3.14159)]), "3.14");
        assert_eq!(sprintf("%g", &[Value::Num(100000.0)]), "100000");
        assert_eq!(sprintf("%g", &[Value::Num(1000000.0)]), "1e+06");
    }

    #[test]
    fn missing_args_are_null() {
        assert_eq!(sprintf("%s|%d", &[Value::Str("a".into())]), "a|0");
    }
}
