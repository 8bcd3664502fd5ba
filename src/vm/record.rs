//! The current input record: `$0`, its lazily-split fields, and the
//! generation bookkeeping that drives NumStr-vs-Str on read (§4.5 "Lazy
//! field splitting").

use crate::regex_adapter::RegexCache;

pub struct Record {
    line: String,
    fields: Vec<String>,
    have_fields: bool,
    have_nf: bool,
    nf: usize,
    /// Wraps, but is never allowed to land on 0 (0 means "no record yet").
    generation: u64,
    /// `fields_gen[0]` tracks `$0`; `fields_gen[i]` tracks `$i`. A slot
    /// equal to the current generation means that field was explicitly
    /// assigned this record; anything else reads back as `NumStr`.
    fields_gen: Vec<u64>,
}

const BASE_CAPACITY: usize = 32;
const CAPACITY_RESET_THRESHOLD: usize = 1024;

impl Default for Record {
    fn default() -> Self {
        Record {
            line: String::new(),
            fields: Vec::with_capacity(BASE_CAPACITY),
            have_fields: false,
            have_nf: false,
            nf: 0,
            generation: 1,
            fields_gen: vec![0; BASE_CAPACITY],
        }
    }
}

/// Splits `line` by `fs` following the three-case FS convention (single
/// space means "runs of whitespace", empty means "one field per character",
/// anything else is a regex even if it's a single non-space char).
pub fn split_fields(line: &str, fs: &str, cache: &RegexCache, posix: bool) -> Vec<String> {
    if line.is_empty() {
        return Vec::new();
    }
    if fs == " " {
        line.split_whitespace().map(String::from).collect()
    } else if fs.is_empty() {
        line.chars().map(|c| c.to_string()).collect()
    } else if fs.chars().count() == 1 {
        let c = fs.chars().next().unwrap();
        line.split(c).map(String::from).collect()
    } else {
        match cache.get_or_compile(fs, posix) {
            Some(h) => h.with(|m| m.split(line, 0).into_iter().map(String::from).collect()),
            None => vec![line.to_string()],
        }
    }
}

impl Record {
    pub fn set_line(&mut self, s: String) {
        self.line = s;
        self.have_fields = false;
        self.have_nf = false;
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.generation = 1;
        }
        if self.fields.capacity() > CAPACITY_RESET_THRESHOLD {
            self.fields = Vec::with_capacity(BASE_CAPACITY);
        } else {
            self.fields.clear();
        }
        self.fields_gen.iter_mut().for_each(|g| *g = 0);
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Splits and materializes every field. Called the first time any
    /// instruction reads a specific field or rebuilds `$0`.
    pub fn ensure_fields(&mut self, fs: &str, cache: &RegexCache, posix: bool) {
        if self.have_fields {
            return;
        }
        self.fields = split_fields(&self.line, fs, cache, posix);
        self.nf = self.fields.len();
        self.have_fields = true;
        self.have_nf = true;
        self.grow_gen(self.nf);
    }

    /// Counts fields without materializing any of them. Called when a rule
    /// references `NF` without reading a specific field.
    pub fn count_nf(&mut self, fs: &str, cache: &RegexCache, posix: bool) -> usize {
        if self.have_nf {
            return self.nf;
        }
        let n = if self.line.is_empty() {
            0
        } else if fs == " " {
            self.line.split_whitespace().count()
        } else if fs.is_empty() {
            self.line.chars().count()
        } else if fs.chars().count() == 1 {
            let c = fs.chars().next().unwrap();
            self.line.split(c).count()
        } else {
            match cache.get_or_compile(fs, posix) {
                Some(h) => h.with(|m| m.split(&self.line, 0).len()),
                None => 1,
            }
        };
        self.nf = n;
        self.have_nf = true;
        n
    }

    fn grow_gen(&mut self, upto: usize) {
        if self.fields_gen.len() < upto + 1 {
            self.fields_gen.resize(upto + 1, 0);
        }
    }

    /// `(text, was_explicit_this_generation)` for `$i`; `i == 0` means `$0`.
    pub fn get_field(&mut self, i: usize, fs: &str, cache: &RegexCache, posix: bool) -> (String, bool) {
        if i == 0 {
            let explicit = self.fields_gen.first().is_some_and(|g| *g == self.generation);
            return (self.line.clone(), explicit);
        }
        self.ensure_fields(fs, cache, posix);
        if i > self.nf {
            return (String::new(), false);
        }
        let explicit = self.fields_gen.get(i).is_some_and(|g| *g == self.generation);
        (self.fields[i - 1].clone(), explicit)
    }

    pub fn set_field(&mut self, i: usize, value: String, fs: &str, ofs: &str, cache: &RegexCache, posix: bool) {
        if i == 0 {
            self.set_line(value);
            self.grow_gen(0);
            self.fields_gen[0] = self.generation;
            return;
        }
        self.ensure_fields(fs, cache, posix);
        if i > self.nf {
            self.fields.resize(i, String::new());
            self.nf = i;
            self.grow_gen(i);
        }
        self.fields[i - 1] = value;
        self.grow_gen(i);
        self.fields_gen[i] = self.generation;
        self.rebuild_line(ofs);
    }

    pub fn set_nf(&mut self, new_nf: usize, fs: &str, ofs: &str, cache: &RegexCache, posix: bool) {
        self.ensure_fields(fs, cache, posix);
        self.fields.resize(new_nf, String::new());
        self.nf = new_nf;
        self.grow_gen(new_nf);
        self.rebuild_line(ofs);
    }

    fn rebuild_line(&mut self, ofs: &str) {
        self.line = self.fields.join(ofs);
    }

    pub fn nf(&mut self, fs: &str, cache: &RegexCache, posix: bool) -> usize {
        if self.have_nf {
            return self.nf;
        }
        self.count_nf(fs, cache, posix)
    }
}
