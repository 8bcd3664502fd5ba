//! Run configuration (§6 "Configuration"). Plain data, no behavior; `Program::run`
//! takes one of these and a fresh VM is built from it every call.

use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexMode {
    /// Leftmost-longest (POSIX).
    Posix,
    /// Leftmost-first (Perl-like), whatever the underlying engine gives by default.
    LeftmostFirst,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub fs: String,
    pub rs: String,
    pub ofs: String,
    pub ors: String,
    pub variables: HashMap<String, String>,
    /// External sink for the program's final output. Absent (the default)
    /// means output is captured in memory and returned in `RunOutcome`; set
    /// it to write directly to a file instead.
    pub output: Option<PathBuf>,
    pub args: Vec<String>,
    pub regex_mode: RegexMode,
    pub parallel: usize,
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fs: " ".to_string(),
            rs: "\n".to_string(),
            ofs: " ".to_string(),
            ors: "\n".to_string(),
            variables: HashMap::new(),
            output: None,
            args: Vec::new(),
            regex_mode: RegexMode::Posix,
            parallel: 1,
            chunk_size: 4 * 1024 * 1024,
        }
    }
}
