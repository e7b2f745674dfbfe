//! Fixed line buffers for one source.
//!
//! A source owns [`SEGMENT_COUNT`] segments of [`SEGMENT_LEN`] bytes each,
//! allocated once. Reads append to the *active* segment; complete lines are
//! then referred to by [`LineRef`] handles rather than copied. A handle stays
//! valid until its segment becomes active again, which [`BufferPool::rotate`]
//! never allows while the handle is still in use.

use std::io::{self, Read, Seek, SeekFrom};

use crate::config::Delimiters;

/// Longest line that is reassembled intact. Longer lines are cut here.
pub const MAX_LINE_LEN: usize = 1023;

/// One segment: a full line plus room for a synthesized delimiter.
pub const SEGMENT_LEN: usize = MAX_LINE_LEN + 1;

/// Two segments can be pinned (last printed and held line), one is filled.
pub const SEGMENT_COUNT: usize = 3;

/// Position of a complete line inside a [`BufferPool`], delimiter excluded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LineRef {
    segment: usize,
    start: usize,
    len: usize,
}

impl LineRef {
    /// Index of the segment holding the line.
    pub fn segment(&self) -> usize {
        self.segment
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset just past the line's delimiter, where the next line begins.
    fn next_start(&self) -> usize {
        self.start + self.len + 1
    }
}

#[derive(Debug)]
pub struct BufferPool {
    storage: Box<[u8]>,
    active: usize,
    filled: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool {
            storage: vec![0; SEGMENT_COUNT * SEGMENT_LEN].into_boxed_slice(),
            active: 0,
            filled: 0,
        }
    }

    /// Index of the segment receiving reads.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Bytes currently held in the active segment.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Contents of a line previously returned by [`next_line`](Self::next_line).
    pub fn line(&self, line: LineRef) -> &[u8] {
        let begin = line.segment * SEGMENT_LEN + line.start;
        &self.storage[begin..begin + line.len]
    }

    /// Performs one read into the unfilled tail of the active segment.
    ///
    /// With `reseek` the source is rewound first, for files whose content is
    /// a current value rather than a stream. Returns the number of bytes
    /// consumed, where 0 means nothing was available (including
    /// `WouldBlock`). A read that reaches [`MAX_LINE_LEN`] gets `terminator`
    /// appended, so the truncated content ends a line; that byte is counted.
    pub fn fill<R>(&mut self, source: &mut R, reseek: bool, terminator: u8) -> io::Result<usize>
    where
        R: Read + Seek,
    {
        if reseek {
            source.seek(SeekFrom::Start(0))?;
        }

        let base = self.active * SEGMENT_LEN;
        let tail = &mut self.storage[base + self.filled..base + MAX_LINE_LEN];

        let mut count = match source.read(tail) {
            Ok(count) => count,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
            Err(e) => return Err(e),
        };
        if count == 0 {
            return Ok(0);
        }

        self.filled += count;
        if self.filled == MAX_LINE_LEN {
            self.storage[base + self.filled] = terminator;
            self.filled += 1;
            count += 1;
        }

        Ok(count)
    }

    /// Finds the first complete line in the active segment at or after
    /// `from`.
    pub fn next_line(&self, from: usize, delimiters: &Delimiters) -> Option<LineRef> {
        let base = self.active * SEGMENT_LEN;
        let filled = &self.storage[base..base + self.filled];

        filled
            .get(from..)?
            .iter()
            .position(|&byte| delimiters.contains(byte))
            .map(|len| LineRef {
                segment: self.active,
                start: from,
                len,
            })
    }

    /// Offset where scanning resumes after `line`.
    pub fn after(&self, line: LineRef) -> usize {
        line.next_start()
    }

    /// Switches to a segment that holds none of `in_use` and moves the
    /// unterminated bytes from `partial_from` onwards to its start.
    ///
    /// The lowest free segment wins, which may be the current one. Returns
    /// the new active segment, or `None` if every segment is pinned.
    pub fn rotate(&mut self, partial_from: usize, in_use: [Option<LineRef>; 2]) -> Option<usize> {
        let pinned = in_use
            .iter()
            .flatten()
            .fold(0u8, |mask, line| mask | 1 << line.segment);

        let next = (0..SEGMENT_COUNT).find(|segment| pinned & (1 << segment) == 0)?;

        let old_base = self.active * SEGMENT_LEN;
        let partial = old_base + partial_from.min(self.filled)..old_base + self.filled;
        let remainder = partial.len();

        self.storage.copy_within(partial, next * SEGMENT_LEN);
        self.active = next;
        self.filled = remainder;

        Some(next)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
