//! Line access to an append-only log file.
//!
//! [`tail`] seeks backwards from the end of the file to find the first line of
//! the requested window and then streams forward, so asking for the last few
//! thousand lines of a multi-megabyte `emerge.log` only touches its last blocks.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Block size used when scanning the file
const BLOCK_SIZE: usize = 64 * 1024;

/// A single line of the current scan window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// 1-based position within the scan window (oldest line is 1)
    pub number: usize,
    /// Line text without the trailing newline
    pub text: String,
}

/// Count the lines in `path`.
///
/// A final line without a trailing newline still counts.
pub fn line_count(path: &Path) -> io::Result<usize> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut count = 0usize;
    let mut last_byte = None;

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        count += memchr::memchr_iter(b'\n', &buf[..n]).count();
        last_byte = Some(buf[n - 1]);
    }

    if matches!(last_byte, Some(b) if b != b'\n') {
        count += 1;
    }
    Ok(count)
}

/// Open `path` and position a reader on the `n`th line from the end.
///
/// Each call opens its own file handle; nothing is shared between calls.
pub fn tail(path: &Path, n: usize) -> Result<TailLines> {
    let mut file = File::open(path).map_err(|e| Error::log_access(path, e))?;
    let offset = tail_offset(&mut file, n).map_err(|e| Error::log_access(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::log_access(path, e))?;

    Ok(TailLines {
        path: path.to_path_buf(),
        reader: BufReader::new(file),
        remaining: n,
        number: 0,
        buf: Vec::with_capacity(256),
    })
}

/// Byte offset of the first of the last `n` lines
fn tail_offset(file: &mut File, n: usize) -> io::Result<u64> {
    let len = file.metadata()?.len();
    if n == 0 {
        return Ok(len);
    }

    let mut pos = len;
    let mut newlines = 0usize;
    // The newline terminating the last line does not start a new one.
    let mut at_last_block = true;
    let mut buf = vec![0u8; BLOCK_SIZE];

    while pos > 0 {
        let read_len = (BLOCK_SIZE as u64).min(pos) as usize;
        pos -= read_len as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut buf[..read_len])?;

        let mut end = read_len;
        if std::mem::take(&mut at_last_block) && buf[end - 1] == b'\n' {
            end -= 1;
        }
        while let Some(i) = memchr::memrchr(b'\n', &buf[..end]) {
            newlines += 1;
            if newlines == n {
                return Ok(pos + i as u64 + 1);
            }
            end = i;
        }
    }

    Ok(0)
}

/// Lazy iterator over the lines of a tail window, oldest first
#[derive(Debug)]
pub struct TailLines {
    path: PathBuf,
    reader: BufReader<File>,
    remaining: usize,
    number: usize,
    buf: Vec<u8>,
}

impl Iterator for TailLines {
    type Item = Result<LogLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                    self.buf.pop();
                }
                self.remaining -= 1;
                self.number += 1;
                Some(Ok(LogLine {
                    number: self.number,
                    text: String::from_utf8_lossy(&self.buf).into_owned(),
                }))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(Error::log_access(&self.path, e)))
            }
        }
    }
}
