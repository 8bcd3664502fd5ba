//! I/O redirection registry and record reading (§4.5 "I/O redirection",
//! spec §... "Record reading"). A small registry keyed by target name caches
//! writers (`> file`, `>> file`, `| cmd`) and readers (`getline < file`,
//! `cmd | getline`); `close(name)` tears one down, `fflush` flushes one or
//! all. The VM treats I/O errors as a builtin returning `-1`, never a panic
//! or abort — grounded on the teacher's own "errors are values" posture in
//! its interpreter-loop error handling.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub enum Writer {
    File(File),
    Pipe(Child, ChildStdin),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::File(f) => f.write(buf),
            Writer::Pipe(_, stdin) => stdin.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::File(f) => f.flush(),
            Writer::Pipe(_, stdin) => stdin.flush(),
        }
    }
}

pub enum Reader {
    File(BufReader<File>),
    Command(Child, BufReader<ChildStdout>),
}

impl Reader {
    fn as_bufread(&mut self) -> &mut dyn BufRead {
        match self {
            Reader::File(b) => b,
            Reader::Command(_, b) => b,
        }
    }
}

#[derive(Default)]
pub struct IoRegistry {
    writers: HashMap<String, Writer>,
    readers: HashMap<String, Reader>,
}

impl IoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_writer(name: &str, append: bool) -> io::Result<Writer> {
        let f = OpenOptions::new().write(true).create(true).append(append).truncate(!append).open(name)?;
        Ok(Writer::File(f))
    }

    fn open_pipe_writer(cmd: &str) -> io::Result<Writer> {
        let mut child = Command::new("sh").arg("-c").arg(cmd).stdin(Stdio::piped()).spawn()?;
        let stdin = child.stdin.take().expect("piped stdin");
        Ok(Writer::Pipe(child, stdin))
    }

    /// Writes `data` to the named sink, creating it on first use.
    /// `append`/`pipe` select the open mode for a fresh sink; an
    /// already-open sink is reused regardless (matching `>` and `>>`
    /// both reusing a stream opened earlier in the run).
    pub fn write_to(&mut self, name: &str, pipe: bool, append: bool, data: &[u8]) -> io::Result<()> {
        if !self.writers.contains_key(name) {
            let w = if pipe { Self::open_pipe_writer(name)? } else { Self::open_writer(name, append)? };
            self.writers.insert(name.to_string(), w);
        }
        let w = self.writers.get_mut(name).unwrap();
        w.write_all(data)
    }

    fn open_file_reader(name: &str) -> io::Result<Reader> {
        Ok(Reader::File(BufReader::new(File::open(name)?)))
    }

    fn open_command_reader(cmd: &str) -> io::Result<Reader> {
        let mut child = Command::new("sh").arg("-c").arg(cmd).stdout(Stdio::piped()).spawn()?;
        let stdout = child.stdout.take().expect("piped stdout");
        Ok(Reader::Command(child, BufReader::new(stdout)))
    }

    /// Reads one record from the named source (a file path or a command
    /// line), per `rs` (see `read_record`). Returns `Ok(None)` at EOF.
    pub fn getline_from(&mut self, name: &str, is_command: bool, rs: &str) -> io::Result<Option<String>> {
        if !self.readers.contains_key(name) {
            let r = if is_command { Self::open_command_reader(name)? } else { Self::open_file_reader(name)? };
            self.readers.insert(name.to_string(), r);
        }
        let r = self.readers.get_mut(name).unwrap();
        read_record(r.as_bufread(), rs)
    }

    /// Closes and drops both the writer and reader registered under `name`,
    /// if present. Returns the close status awk expects from its `close()`
    /// builtin: `0` on success, `-1` if nothing was open under that name.
    pub fn close(&mut self, name: &str) -> i32 {
        let mut found = false;
        if let Some(mut w) = self.writers.remove(name) {
            let _ = w.flush();
            if let Writer::Pipe(mut child, stdin) = w {
                drop(stdin);
                let _ = child.wait();
            }
            found = true;
        }
        if let Some(r) = self.readers.remove(name) {
            if let Reader::Command(mut child, _) = r {
                let _ = child.wait();
            }
            found = true;
        }
        if found {
            0
        } else {
            -1
        }
    }

    pub fn fflush_all(&mut self) -> i32 {
        let mut ok = true;
        for w in self.writers.values_mut() {
            ok &= w.flush().is_ok();
        }
        if ok {
            0
        } else {
            -1
        }
    }

    pub fn fflush_one(&mut self, name: &str) -> i32 {
        match self.writers.get_mut(name) {
            Some(w) => {
                if w.flush().is_ok() {
                    0
                } else {
                    -1
                }
            }
            None => -1,
        }
    }
}

/// Reads one record from `r` per the record-separator rules: `"\n"` is a
/// plain line (trailing newline stripped), `""` is paragraph mode (leading
/// blank lines skipped, record ends at a blank line or EOF), a single
/// character ends the record there, and anything else falls back to
/// newline-delimited reading.
pub fn read_record<R: BufRead + ?Sized>(r: &mut R, rs: &str) -> io::Result<Option<String>> {
    if rs.is_empty() {
        return read_paragraph(r);
    }
    if rs.chars().count() == 1 {
        let delim = rs.as_bytes()[0];
        let mut buf = Vec::new();
        let n = r.read_until(delim, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&delim) {
            buf.pop();
        }
        return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
    }
    // Multi-character RS: fall back to newline splitting per spec.
    let mut line = String::new();
    let n = r.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Some(line))
}

fn read_paragraph<R: BufRead + ?Sized>(r: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    // Skip leading blank lines.
    loop {
        line.clear();
        let n = r.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if !line.trim_end_matches('\n').is_empty() {
            break;
        }
    }
    let mut record = String::new();
    loop {
        let trimmed = line.trim_end_matches('\n');
        if trimmed.is_empty() {
            break;
        }
        if !record.is_empty() {
            record.push('\n');
        }
        record.push_str(trimmed);
        line.clear();
        let n = r.read_line(&mut line)?;
        if n == 0 {
            break;
        }
    }
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn newline_record() {
        let mut c = Cursor::new(b"a\nb\n".to_vec());
        assert_eq!(read_record(&mut c, "\n").unwrap(), Some("a".to_string()));
        assert_eq!(read_record(&mut c, "\n").unwrap(), Some("b".to_string()));
        assert_eq!(read_record(&mut c, "\n").unwrap(), None);
    }

    #[test]
    fn single_char_rs() {
        let mut c = Cursor::new(b"a;b;c".to_vec());
        assert_eq!(read_record(&mut c, ";").unwrap(), Some("a".to_string()));
        assert_eq!(read_record(&mut c, ";").unwrap(), Some("b".to_string()));
        assert_eq!(read_record(&mut c, ";").unwrap(), Some("c".to_string()));
    }

    #[test]
    fn paragraph_mode_skips_blank_runs() {
        let mut c = Cursor::new(b"\n\nfoo\nbar\n\n\nbaz\n".to_vec());
        assert_eq!(read_record(&mut c, "").unwrap(), Some("foo\nbar".to_string()));
        assert_eq!(read_record(&mut c, "").unwrap(), Some("baz".to_string()));
        assert_eq!(read_record(&mut c, "").unwrap(), None);
    }
}
