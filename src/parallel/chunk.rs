//! Input chunking for the parallel executor (§4.7 "Chunking"). Reads the
//! input in buffers of the configured chunk size, then backs up to the last
//! record-separator byte so no record is split across a chunk boundary; the
//! remainder carries forward as the prefix of the next chunk.

use std::io::{self, Read};

pub struct Chunk {
    pub chunk_id: u64,
    pub start_nr: u64,
    pub data: Vec<u8>,
}

pub struct Chunker<R> {
    reader: R,
    chunk_size: usize,
    rs_byte: u8,
    carry: Vec<u8>,
    next_chunk_id: u64,
    next_nr: u64,
    done: bool,
}

impl<R: Read> Chunker<R> {
    pub fn new(reader: R, chunk_size: usize, rs: &str) -> Self {
        let rs_byte = rs.as_bytes().first().copied().unwrap_or(b'\n');
        Chunker { reader, chunk_size: chunk_size.max(1), rs_byte, carry: Vec::new(), next_chunk_id: 0, next_nr: 0, done: false }
    }

    /// Reads and returns the next chunk, or `None` once the input and any
    /// carried remainder are exhausted.
    pub fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        if self.done && self.carry.is_empty() {
            return Ok(None);
        }
        let mut filled = std::mem::take(&mut self.carry);
        while !self.done && !(filled.len() >= self.chunk_size && filled.contains(&self.rs_byte)) {
            let mut buf = vec![0u8; self.chunk_size];
            let n = self.reader.read(&mut buf)?;
            if n == 0 {
                self.done = true;
                break;
            }
            filled.extend_from_slice(&buf[..n]);
        }
        if filled.is_empty() {
            return Ok(None);
        }
        let split_at = if self.done {
            filled.len()
        } else {
            match filled.iter().rposition(|&b| b == self.rs_byte) {
                Some(pos) => pos + 1,
                None => filled.len(),
            }
        };
        self.carry = filled.split_off(split_at);
        let records_in_chunk = filled.iter().filter(|&&b| b == self.rs_byte).count() as u64;
        let chunk = Chunk { chunk_id: self.next_chunk_id, start_nr: self.next_nr, data: filled };
        self.next_chunk_id += 1;
        self.next_nr += records_in_chunk;
        Ok(Some(chunk))
    }

    /// Total record count across every chunk handed out so far; meaningful
    /// once the reader has drained the input (`next_chunk` returned `None`).
    pub fn total_records(&self) -> u64 {
        self.next_nr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn splits_on_last_newline_within_budget() {
        let data = b"aa\nbb\ncc\ndd\n".to_vec();
        let mut c = Chunker::new(Cursor::new(data), 6, "\n");
        let first = c.next_chunk().unwrap().unwrap();
        assert_eq!(first.data, b"aa\nbb\n");
        assert_eq!(first.start_nr, 0);
        let second = c.next_chunk().unwrap().unwrap();
        assert_eq!(second.data, b"cc\ndd\n");
        assert_eq!(second.start_nr, 2);
        assert!(c.next_chunk().unwrap().is_none());
    }

    #[test]
    fn record_longer_than_chunk_size_is_not_split() {
        let data = b"aaaaaaaaaa\nb\n".to_vec();
        let mut c = Chunker::new(Cursor::new(data), 4, "\n");
        let first = c.next_chunk().unwrap().unwrap();
        assert_eq!(first.data, b"aaaaaaaaaa\n");
        let second = c.next_chunk().unwrap().unwrap();
        assert_eq!(second.data, b"b\n");
    }

    #[test]
    fn trailing_data_without_separator_is_final_chunk() {
        let data = b"a\nb".to_vec();
        let mut c = Chunker::new(Cursor::new(data), 64, "\n");
        let first = c.next_chunk().unwrap().unwrap();
        assert_eq!(first.data, b"a\nb");
        assert!(c.next_chunk().unwrap().is_none());
    }
}
