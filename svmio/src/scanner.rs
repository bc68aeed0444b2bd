//! This module gives line-level and word-level access to text files without
//! copying them: files are memory-mapped and cut into byte slices on a
//! delimiter.
//!
//! Since every slice borrows from the map, slices can be handed to other
//! threads for as long as the `MappedFile` outlives them (see `std::thread::scope`
//! in the ingestion pipeline).

use std::fs::File;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use itertools::Itertools;
use memmap::{Mmap, MmapOptions};

use crate::error::{Error, Result};

/// An iterator over byte slices separated by a delimiter.
/// The iterated-over slices won't contain the delimiter, but may be empty.
#[derive(Clone)]
pub struct DelimIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    delim: u8,
}

impl<'a> DelimIter<'a> {
    pub fn new<'b>(bytes: &'b [u8], delim: u8) -> DelimIter<'b> {
        DelimIter {
            bytes,
            pos: 0,
            delim,
        }
    }

    /// Assuming contents are utf8, returns them.
    pub fn dbg_line(&self) -> String {
        self.clone()
            .map(|w| std::str::from_utf8(w).unwrap_or("<BAD-UTF8>"))
            .join(" ")
    }
}

impl<'a> Iterator for DelimIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.pos == self.bytes.len() {
            None
        } else {
            let start = self.pos;
            let bytes = &self.bytes[start..];
            let (end, new_pos) = match bytes.find_byte(self.delim) {
                None => (bytes.len(), bytes.len()),
                Some(next_line) => (next_line, next_line + 1),
            };
            self.pos = start + new_pos;
            Some(&bytes[..end])
        }
    }
}

/// A read-only file mapped into memory.
///
/// The user must promise the file isn't concurrently modified for the
/// lifetime of the map.
pub struct MappedFile {
    path: PathBuf,
    // empty files can't be mapped on every platform, so they have no map
    mmap: Option<Mmap>,
}

impl MappedFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let len = file.metadata().map_err(|e| Error::io(&path, e))?.len();
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: caller must guarantee this file is not
            // mutated during use, per type documentation.
            Some(unsafe { MmapOptions::new().map(&file) }.map_err(|e| Error::io(&path, e))?)
        };
        Ok(MappedFile { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Lines of the file, without their '\n' (and without a trailing '\r').
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> + Clone + '_ {
        DelimIter::new(self.bytes(), b'\n').map(trim_line_end)
    }
}

/// Words of a line, skipping the empty words produced by repeated spaces.
pub fn words(line: &[u8]) -> impl Iterator<Item = &[u8]> + Clone + '_ {
    DelimIter::new(line, b' ').filter(|word| not_space(word))
}

pub fn not_space(word: &[u8]) -> bool {
    !word.iter().copied().all(|c| c.is_ascii_whitespace())
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn delim_iter_keeps_empty_words() {
        let words: Vec<_> = DelimIter::new(b"a  b", b' ').collect();
        assert_eq!(words, vec![&b"a"[..], b"", b"b"]);
    }

    #[test]
    fn delim_iter_trailing_delimiter_ends_iteration() {
        let lines: Vec<_> = DelimIter::new(b"x\ny\n", b'\n').collect();
        assert_eq!(lines, vec![&b"x"[..], b"y"]);
        assert_eq!(DelimIter::new(b"", b'\n').count(), 0);
    }

    #[test]
    fn words_skip_repeated_spaces() {
        let ws: Vec<_> = words(b" 1  3:2.0 ").collect();
        assert_eq!(ws, vec![&b"1"[..], b"3:2.0"]);
    }

    #[test]
    fn dbg_line_joins_words() {
        assert_eq!(DelimIter::new(b"1 2:3", b' ').dbg_line(), "1 2:3");
    }

    #[test]
    fn mapped_file_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"1 1:1\r\n0 2:1\n").unwrap();
        let mapped = MappedFile::open(file.path()).unwrap();
        let lines: Vec<_> = mapped.lines().collect();
        assert_eq!(lines, vec![&b"1 1:1"[..], b"0 2:1"]);
    }

    #[test]
    fn mapped_empty_file_has_no_lines() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mapped = MappedFile::open(file.path()).unwrap();
        assert_eq!(mapped.lines().count(), 0);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        match MappedFile::open(dir.path().join("nope.svm")) {
            Err(Error::Io { .. }) => {}
            other => panic!("expected io error, got {:?}", other.map(|_| ())),
        }
    }
}
