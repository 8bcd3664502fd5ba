//! Black-box checks for the invariants that are observable from outside the VM.
//! Stack balance and record laziness live inside the VM's own unit tests; the
//! ones below are provable from `Program::run`'s input/output alone.

use std::io::Cursor;

use awkvm::config::Config;
use awkvm::CancellationToken;

fn run(program: &str, input: &str) -> String {
    let compiled = awkvm::compile(program).expect("compiles");
    let cancel = CancellationToken::new();
    let outcome = compiled.run(Cursor::new(input.as_bytes().to_vec()), &Config::default(), &cancel).expect("runs");
    outcome.output
}

/// Field idempotence: reading `$i` twice is byte-identical, and `$i = $i`
/// leaves `$0` unchanged when FS == OFS and there's no trailing separator.
#[test]
fn reading_a_field_twice_is_byte_identical() {
    assert_eq!(run("{ print $2; print $2 }", "a b c\n"), "b\nb\n");
}

#[test]
fn reassigning_a_field_to_itself_preserves_the_record() {
    assert_eq!(run("{ $1 = $1; print }", "a b c\n"), "a b c\n");
}

/// Generation invalidation: assigning one field doesn't disturb the others,
/// which still read back as the current line's own split.
#[test]
fn assigning_one_field_leaves_others_reading_the_current_split() {
    assert_eq!(run("{ $2 = \"Z\"; print $1, $3 }", "a b c\n"), "a c\n");
}

/// Comparison semantics: a numeric string compares numerically against a
/// number, but a value built with an explicit string concatenation that
/// yields non-numeric text compares lexicographically.
#[test]
fn numeric_field_compares_numerically_against_a_literal() {
    assert_eq!(run("{ if ($1 == 10) print \"eq\" }", "10\n"), "eq\n");
    assert_eq!(run("{ if ($1 == 10) print \"eq\" }", "10.0\n"), "eq\n");
}

#[test]
fn non_numeric_text_compares_lexicographically() {
    assert_eq!(run("BEGIN { if (\"10x\" == 10) print \"eq\"; else print \"ne\" }", ""), "ne\n");
}

/// Round-trip for sprintf/printf: `%d` on an integer always prints its plain
/// decimal form, including negatives and zero.
#[test]
fn printf_d_round_trips_integers() {
    assert_eq!(run("BEGIN { printf \"%d\\n\", 42 }", ""), "42\n");
    assert_eq!(run("BEGIN { printf \"%d\\n\", -7 }", ""), "-7\n");
    assert_eq!(run("BEGIN { printf \"%d\\n\", 0 }", ""), "0\n");
    assert_eq!(run("BEGIN { printf \"%d\\n\", 9007199254740992 }", ""), "9007199254740992\n");
}

/// Exit folds into the run's own exit code rather than surfacing as an error.
#[test]
fn exit_is_not_an_error() {
    let compiled = awkvm::compile("BEGIN { print \"before\"; exit(3); print \"after\" }").unwrap();
    let cancel = CancellationToken::new();
    let outcome = compiled.run(Cursor::new(Vec::new()), &Config::default(), &cancel).unwrap();
    assert_eq!(outcome.output, "before\n");
    assert_eq!(outcome.exit_code, 3);
}

/// END still runs after exit() inside the main loop, and an exit() in END wins.
#[test]
fn exit_in_main_still_runs_end_and_end_exit_wins() {
    let compiled = awkvm::compile("{ exit(1) } END { print \"end\"; exit(2) }").unwrap();
    let cancel = CancellationToken::new();
    let outcome = compiled.run(Cursor::new(b"x\n".to_vec()), &Config::default(), &cancel).unwrap();
    assert_eq!(outcome.output, "end\n");
    assert_eq!(outcome.exit_code, 2);
}
