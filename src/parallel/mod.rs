//! Optional data-parallel executor (§4.6, §4.7). A program only takes this
//! path when `analyzer::analyze` reports it safe to split across workers;
//! otherwise callers fall back to the ordinary single-threaded `Vm::run`.

pub mod analyzer;
pub mod chunk;
pub mod executor;

pub use analyzer::{analyze, Classification, ParallelAnalysis};
pub use executor::{execute, CancellationToken};

pub(crate) use crate::vm::ARRAY_ARENA_BASE;
