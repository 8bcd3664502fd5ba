//! Parallel equivalence: for a Stateless or Aggregatable program, parallel
//! execution at any worker count must match sequential output byte-for-byte.

use std::io::Cursor;

use awkvm::config::Config;
use awkvm::CancellationToken;

fn run_with(program: &str, input: &[u8], parallel: usize, chunk_size: usize) -> String {
    let compiled = awkvm::compile(program).expect("compiles");
    let cancel = CancellationToken::new();
    let config = Config { parallel, chunk_size, ..Config::default() };
    compiled.run(Cursor::new(input.to_vec()), &config, &cancel).expect("runs").output
}

fn input_lines(n: u64) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 1..=n {
        data.extend_from_slice(format!("{i} {}\n", i * 2).as_bytes());
    }
    data
}

#[test]
fn stateless_filter_matches_sequential_across_worker_counts() {
    let program = "$1 % 2 == 0 { print $0 }";
    let data = input_lines(50);
    let sequential = run_with(program, &data, 1, 4096);
    for workers in [1, 2, 3, 8] {
        // Small chunk size forces many chunks, exercising real fan-out.
        let parallel = run_with(program, &data, workers, 32);
        assert_eq!(parallel, sequential, "worker count {workers} diverged");
    }
}

#[test]
fn aggregatable_sum_matches_sequential_across_worker_counts() {
    let program = "{ total += $1 } END { print total }";
    let data = input_lines(200);
    let sequential = run_with(program, &data, 1, 4096);
    for workers in [1, 2, 4, 6] {
        let parallel = run_with(program, &data, workers, 64);
        assert_eq!(parallel, sequential, "worker count {workers} diverged");
    }
}

#[test]
fn aggregatable_count_array_matches_sequential_across_worker_counts() {
    let program = "{ seen[$1 % 3]++ } END { print seen[0], seen[1], seen[2] }";
    let data = input_lines(90);
    let sequential = run_with(program, &data, 1, 4096);
    for workers in [1, 2, 5] {
        let parallel = run_with(program, &data, workers, 48);
        assert_eq!(parallel, sequential, "worker count {workers} diverged");
    }
}
