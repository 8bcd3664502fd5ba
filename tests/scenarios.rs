//! End-to-end scenarios: literal program + input, literal expected output.

use std::collections::HashSet;
use std::io::Cursor;

use awkvm::config::Config;
use awkvm::CancellationToken;

fn run(program: &str, input: &str) -> String {
    let compiled = awkvm::compile(program).expect("compiles");
    let cancel = CancellationToken::new();
    let outcome = compiled.run(Cursor::new(input.as_bytes().to_vec()), &Config::default(), &cancel).expect("runs");
    outcome.output
}

#[test]
fn sums_a_column() {
    assert_eq!(run("{ sum += $1 } END { print sum }", "1\n2\n3\n"), "6\n");
}

#[test]
fn begin_sets_fs_before_main_runs() {
    assert_eq!(run("BEGIN { FS=\":\" } { print $1 }", "a:b:c\nd:e\n"), "a\nd\n");
}

#[test]
fn regex_pattern_prints_nr_and_line() {
    assert_eq!(run("/foo/ { print NR, $0 }", "bar\nfoo\nfood\n"), "2 foo\n3 food\n");
}

#[test]
fn for_in_over_a_counted_array() {
    let out = run("{ count[$1]++ } END { for (k in count) print k, count[k] }", "a\nb\na\na\nb\n");
    let lines: HashSet<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.contains("a 3"));
    assert!(lines.contains("b 2"));
}

#[test]
fn recursive_user_function() {
    assert_eq!(run("function f(n){ return n<=1?1:n*f(n-1) } BEGIN { print f(5) }", ""), "120\n");
}

#[test]
fn field_assignment_rejoins_with_ofs() {
    let mut config = Config::default();
    config.ofs = ",".to_string();
    let compiled = awkvm::compile("{ $2 = \"X\"; print }").unwrap();
    let cancel = CancellationToken::new();
    let outcome = compiled.run(Cursor::new(b"1 2 3\n".to_vec()), &config, &cancel).unwrap();
    assert_eq!(outcome.output, "1,X,3\n");
}
