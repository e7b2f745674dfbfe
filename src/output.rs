//! Line assembly for the output stream.
//!
//! Every emitted line is built in one fixed buffer and handed to the writer
//! in a single `write_all`, so that lines from different sources never
//! interleave on a pipe (writes below `PIPE_BUF` are atomic).

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsFd;

use crate::buffer::SEGMENT_LEN;
use crate::error::Error;

/// Bytes available for one formatted line: room for a full input line plus
/// its path, timestamp and literals.
pub const OUTPUT_CAPACITY: usize = 2 * SEGMENT_LEN;

/// Builds one output line at a time and flushes it to `W`.
#[derive(Debug)]
pub struct OutputSink<W> {
    writer: W,
    buf: Box<[u8]>,
    pos: usize,
    saturated: bool,
}

impl<W: Write> OutputSink<W> {
    pub fn new(writer: W) -> Self {
        OutputSink {
            writer,
            buf: vec![0; OUTPUT_CAPACITY].into_boxed_slice(),
            pos: 0,
            saturated: false,
        }
    }

    /// Starts a new line, discarding anything not yet flushed.
    pub fn start(&mut self) {
        self.pos = 0;
        self.saturated = false;
    }

    /// Appends raw bytes.
    ///
    /// When they do not fit, the sink saturates: nothing more is appended
    /// until the next [`start`](Self::start), and the line is flushed as far
    /// as it got.
    pub fn append_text(&mut self, text: &[u8]) {
        if self.saturated {
            return;
        }
        let end = self.pos + text.len();
        if end > self.buf.len() {
            self.saturated = true;
            return;
        }
        self.buf[self.pos..end].copy_from_slice(text);
        self.pos = end;
    }

    /// Appends `value` as an unsigned decimal.
    pub fn append_number(&mut self, value: u64) {
        if self.saturated {
            return;
        }
        let mut tail = &mut self.buf[self.pos..];
        let room = tail.len();
        match write!(tail, "{}", value) {
            Ok(()) => {
                let written = room - tail.len();
                self.pos += written;
            }
            Err(_) => self.saturated = true,
        }
    }

    /// Returns `true` once an append has been dropped for lack of room.
    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Bytes of the line under construction.
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Writes the line with a single call on the underlying writer.
    pub fn flush(&mut self) -> Result<(), Error> {
        write_line(&mut self.writer, &self.buf[..self.pos]).map_err(Error::Write)
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Standard output as a plain file, so a flushed line reaches the kernel in
/// one write whatever it ends with. [`std::io::Stdout`] buffers by line.
pub fn stdout_file() -> io::Result<File> {
    let fd = io::stdout().as_fd().try_clone_to_owned()?;
    Ok(File::from(fd))
}

fn write_line<W: Write>(writer: &mut W, line: &[u8]) -> io::Result<()> {
    writer.write_all(line)?;
    writer.flush()
}
