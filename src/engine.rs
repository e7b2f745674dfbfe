//! Line splitting, debouncing and duplicate suppression for one source.
//!
//! Debouncing holds data back instead of printing it while the source keeps
//! changing. Once the source has been quiet for the debounce time, the held
//! line is printed (unless it repeats the last output and duplicates are
//! off). This reacts immediately to the first change after a quiet period,
//! drops the bounces in between and still reports the final state.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, trace};

use crate::buffer::{BufferPool, LineRef};
use crate::config::SourceOptions;
use crate::error::Error;
use crate::format::Instruction;
use crate::output::OutputSink;

/// State machine turning raw reads from one source into emitted lines.
///
/// Times are offsets from a fixed epoch (the scheduler uses the Unix epoch);
/// they only need to be consistent between calls.
#[derive(Debug)]
pub struct LineEngine {
    path: PathBuf,
    options: SourceOptions,
    pool: BufferPool,
    last_printed: Option<LineRef>,
    held: Option<LineRef>,
    last_read: Duration,
}

impl LineEngine {
    pub fn new(path: impl Into<PathBuf>, options: SourceOptions) -> Self {
        LineEngine {
            path: path.into(),
            options,
            pool: BufferPool::new(),
            last_printed: None,
            held: None,
            last_read: Duration::ZERO,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time of the most recent read that returned data.
    pub fn last_read(&self) -> Duration {
        self.last_read
    }

    /// Returns `true` while a line is waiting for the source to settle.
    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }

    /// Emits the held line if the source has been quiet long enough.
    ///
    /// Returns whether the source is settled at `now`, which the following
    /// [`ingest`](Self::ingest) needs to decide the fate of its first line.
    pub fn settle<W: std::io::Write>(
        &mut self,
        now: Duration,
        sink: &mut OutputSink<W>,
    ) -> Result<bool, Error> {
        let settled = now.saturating_sub(self.last_read) >= self.options.debounce;

        if settled {
            if let Some(line) = self.held.take() {
                trace!(path = %self.path.display(), "settled, releasing held line");
                self.emit(line, sink)?;
            }
        }

        Ok(settled)
    }

    /// Reads once from `source` and processes every complete line.
    ///
    /// Lines are emitted while the source is settled (only the first line of
    /// a batch can see the settled state unless debouncing is off); the rest
    /// replace each other as the held line. The trailing partial line is kept
    /// for the next read. Returns the number of bytes consumed, 0 when
    /// nothing was available.
    pub fn ingest<R, W>(
        &mut self,
        now: Duration,
        settled: bool,
        source: &mut R,
        reseek: bool,
        sink: &mut OutputSink<W>,
    ) -> Result<usize, Error>
    where
        R: Read + Seek,
        W: std::io::Write,
    {
        let count = self
            .pool
            .fill(source, reseek, self.options.delimiters.terminator())
            .map_err(|source| Error::Read {
                path: self.path.clone(),
                source,
            })?;
        if count == 0 {
            return Ok(0);
        }
        trace!(path = %self.path.display(), count, "read");

        self.last_read = now;

        let mut settled = settled;
        let mut from = 0;
        while let Some(line) = self.pool.next_line(from, &self.options.delimiters) {
            from = self.pool.after(line);

            if settled && self.held.is_none() {
                self.emit(line, sink)?;
            } else {
                if self.held.is_some() {
                    trace!(path = %self.path.display(), "replacing held line");
                }
                self.held = Some(line);
            }

            settled = self.options.debounce.is_zero();
        }

        let segment = self
            .pool
            .rotate(from, [self.last_printed, self.held])
            .ok_or_else(|| Error::NoFreeSegment(self.path.clone()))?;
        trace!(path = %self.path.display(), segment, carried = self.pool.filled(), "rotated");

        Ok(count)
    }

    /// How long until this source needs checking again without new data.
    ///
    /// `None` means no deadline: nothing is held.
    pub fn next_wake(&self, now: Duration) -> Option<Duration> {
        self.held.map(|_| {
            let quiet = now.saturating_sub(self.last_read);
            self.options.debounce.saturating_sub(quiet)
        })
    }

    /// Formats and writes `line` unless it is empty or a suppressed repeat.
    fn emit<W: std::io::Write>(&mut self, line: LineRef, sink: &mut OutputSink<W>) -> Result<(), Error> {
        let text = self.pool.line(line);
        if text.is_empty() {
            return Ok(());
        }

        if !self.options.duplicates {
            if let Some(previous) = self.last_printed {
                if self.pool.line(previous) == text {
                    debug!(path = %self.path.display(), "duplicate suppressed");
                    return Ok(());
                }
            }
        }

        sink.start();
        for instruction in &self.options.format {
            match instruction {
                Instruction::Literal(bytes) => sink.append_text(bytes),
                Instruction::Line => sink.append_text(text),
                Instruction::Path => sink.append_text(self.path.as_os_str().as_encoded_bytes()),
                Instruction::Timestamp => sink.append_number(micros(self.last_read)),
            }
        }
        sink.flush()?;

        self.last_printed = Some(line);
        Ok(())
    }
}

fn micros(time: Duration) -> u64 {
    u64::try_from(time.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MAX_LINE_LEN;
    use crate::config::Delimiters;
    use crate::format::Format;
    use proptest::prelude::*;
    use std::io::Cursor;

    const START_MS: u64 = 1_000;

    struct Harness {
        engine: LineEngine,
        sink: OutputSink<Vec<u8>>,
    }

    impl Harness {
        fn new(options: SourceOptions) -> Self {
            Harness {
                engine: LineEngine::new("/tmp/fifo", options),
                sink: OutputSink::new(Vec::new()),
            }
        }

        fn debounced(millis: u64) -> Self {
            Harness::new(SourceOptions {
                debounce: Duration::from_millis(millis),
                ..SourceOptions::default()
            })
        }

        /// One scheduler wake at `ms`, optionally with data ready to read.
        fn wake(&mut self, ms: u64, input: Option<&[u8]>) -> Option<Duration> {
            self.wake_source(ms, input, false)
        }

        fn wake_source(&mut self, ms: u64, input: Option<&[u8]>, reseek: bool) -> Option<Duration> {
            let now = Duration::from_millis(ms);
            let settled = self.engine.settle(now, &mut self.sink).unwrap();
            if let Some(bytes) = input {
                let mut source = Cursor::new(bytes);
                self.engine
                    .ingest(now, settled, &mut source, reseek, &mut self.sink)
                    .unwrap();
            }
            self.assert_no_aliasing();
            self.engine.next_wake(now)
        }

        fn assert_no_aliasing(&self) {
            let active = self.engine.pool.active();
            for pinned in [self.engine.last_printed, self.engine.held].iter().flatten() {
                assert_ne!(pinned.segment(), active, "active segment is pinned");
            }
        }

        fn output(&self) -> String {
            String::from_utf8(self.sink.writer().clone()).unwrap()
        }
    }

    #[test]
    fn test_lines_in_order() {
        let mut h = Harness::new(SourceOptions::default());

        assert_eq!(h.wake(START_MS, Some(b"open\n")), None);
        assert_eq!(h.wake(START_MS + 1, Some(b"closed\n")), None);
        assert_eq!(h.output(), "open\nclosed\n");
    }

    #[test]
    fn test_partial_lines_are_reassembled() {
        let mut h = Harness::new(SourceOptions::default());

        h.wake(START_MS, Some(b"hel"));
        h.wake(START_MS + 1, Some(b"lo\nwor"));
        assert_eq!(h.output(), "hello\n");
        h.wake(START_MS + 2, Some(b"ld\n"));
        assert_eq!(h.output(), "hello\nworld\n");
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let mut h = Harness::new(SourceOptions::default());

        h.wake(START_MS, Some(b"\n\na\n\n"));
        assert_eq!(h.output(), "a\n");
    }

    #[test]
    fn test_no_data_changes_nothing() {
        let mut h = Harness::debounced(100);

        h.wake(START_MS, Some(b""));
        assert_eq!(h.engine.last_read(), Duration::ZERO);
        assert_eq!(h.output(), "");
    }

    #[test]
    fn test_debounce_collapses_to_last_value() {
        let mut h = Harness::debounced(100);

        // Quiet before: the first change is reported at once.
        assert_eq!(h.wake(START_MS, Some(b"0\n")), None);
        assert_eq!(h.output(), "0\n");

        // Bounces while unsettled are held; only the last survives.
        assert_eq!(h.wake(START_MS + 50, Some(b"1\n")), Some(Duration::from_millis(100)));
        assert_eq!(h.wake(START_MS + 60, Some(b"2\n")), Some(Duration::from_millis(100)));
        assert_eq!(h.wake(START_MS + 70, Some(b"3\n")), Some(Duration::from_millis(100)));
        assert!(h.engine.is_holding());

        assert_eq!(h.wake(START_MS + 169, None), Some(Duration::from_millis(1)));
        assert_eq!(h.output(), "0\n");

        assert_eq!(h.wake(START_MS + 170, None), None);
        assert_eq!(h.output(), "0\n3\n");
        assert!(!h.engine.is_holding());
    }

    #[test]
    fn test_debounce_leading_edge_in_one_batch() {
        let mut h = Harness::debounced(100);

        // Several lines in one read: the first goes out, the others are
        // collapsed into the held line.
        assert_eq!(h.wake(START_MS, Some(b"1\n2\n3\n")), Some(Duration::from_millis(100)));
        assert_eq!(h.output(), "1\n");

        assert_eq!(h.wake(START_MS + 100, None), None);
        assert_eq!(h.output(), "1\n3\n");
    }

    #[test]
    fn test_held_line_released_before_new_data() {
        let mut h = Harness::debounced(100);

        h.wake(START_MS, Some(b"a\n"));
        h.wake(START_MS + 10, Some(b"b\n"));
        // Settled again when the next change arrives: the held line goes
        // first, then the new line is reported at once.
        assert_eq!(h.wake(START_MS + 200, Some(b"c\n")), None);
        assert_eq!(h.output(), "a\nb\nc\n");
    }

    #[test]
    fn test_zero_debounce_never_holds() {
        let mut h = Harness::new(SourceOptions::default());

        assert_eq!(h.wake(START_MS, Some(b"1\n2\n3\n")), None);
        assert!(!h.engine.is_holding());
        assert_eq!(h.output(), "1\n2\n3\n");
    }

    #[test]
    fn test_duplicates_suppressed() {
        let mut h = Harness::new(SourceOptions {
            duplicates: false,
            ..SourceOptions::default()
        });

        h.wake(START_MS, Some(b"A\n"));
        h.wake(START_MS + 1, Some(b"A\n"));
        assert_eq!(h.output(), "A\n");

        h.wake(START_MS + 2, Some(b"B\nB\nA\n"));
        assert_eq!(h.output(), "A\nB\nA\n");
    }

    #[test]
    fn test_duplicates_allowed() {
        let mut h = Harness::new(SourceOptions::default());

        h.wake(START_MS, Some(b"A\n"));
        h.wake(START_MS + 1, Some(b"A\n"));
        assert_eq!(h.output(), "A\nA\n");
    }

    #[test]
    fn test_debounced_repeat_of_last_output_is_dropped() {
        let mut h = Harness::new(SourceOptions {
            debounce: Duration::from_millis(100),
            duplicates: false,
            ..SourceOptions::default()
        });

        h.wake(START_MS, Some(b"1\n"));
        // Bounce away and back within the window.
        h.wake(START_MS + 10, Some(b"0\n"));
        h.wake(START_MS + 20, Some(b"1\n"));
        h.wake(START_MS + 120, None);
        assert_eq!(h.output(), "1\n");
    }

    #[test]
    fn test_unchanged_value_file() {
        let mut h = Harness::new(SourceOptions {
            duplicates: false,
            ..SourceOptions::default()
        });

        h.wake_source(START_MS, Some(b"1\n"), true);
        h.wake_source(START_MS + 1, Some(b"1\n"), true);
        assert_eq!(h.output(), "1\n");

        h.wake_source(START_MS + 2, Some(b"0\n"), true);
        assert_eq!(h.output(), "1\n0\n");
    }

    #[test]
    fn test_format_instructions() {
        let mut h = Harness::new(SourceOptions {
            format: Format::parse(b"%p: %l\n"),
            ..SourceOptions::default()
        });

        h.wake(START_MS, Some(b"x\n"));
        assert_eq!(h.output(), "/tmp/fifo: x\n");
    }

    #[test]
    fn test_timestamp_is_read_time() {
        let mut h = Harness::new(SourceOptions {
            format: Format::parse(b"%t %l\n"),
            debounce: Duration::from_millis(5),
            ..SourceOptions::default()
        });

        h.wake(START_MS, Some(b"a\n"));
        h.wake(START_MS + 1, Some(b"b\n"));
        // Released later, but stamped with the time it was read.
        h.wake(START_MS + 50, None);
        assert_eq!(h.output(), "1000000 a\n1001000 b\n");
    }

    #[test]
    fn test_custom_delimiters() {
        let mut h = Harness::new(SourceOptions {
            delimiters: Delimiters::new(b",;".to_vec()).unwrap(),
            ..SourceOptions::default()
        });

        h.wake(START_MS, Some(b"a,b;c"));
        assert_eq!(h.output(), "a\nb\n");
    }

    #[test]
    fn test_long_line_is_truncated() {
        let mut h = Harness::new(SourceOptions::default());
        let mut input = vec![b'x'; MAX_LINE_LEN];
        input.extend_from_slice(b"tail\n");

        let now = Duration::from_millis(START_MS);
        let mut source = Cursor::new(input);
        let settled = h.engine.settle(now, &mut h.sink).unwrap();
        h.engine
            .ingest(now, settled, &mut source, false, &mut h.sink)
            .unwrap();
        h.engine
            .ingest(now, true, &mut source, false, &mut h.sink)
            .unwrap();

        let mut expected = "x".repeat(MAX_LINE_LEN);
        expected.push_str("\ntail\n");
        assert_eq!(h.output(), expected);
    }

    #[test]
    fn test_held_and_printed_pin_two_segments() {
        let mut h = Harness::debounced(100);

        h.wake(START_MS, Some(b"printed\npar"));
        h.wake(START_MS + 10, Some(b"tial\nheld\nrest"));
        let printed = h.engine.last_printed.unwrap();
        let held = h.engine.held.unwrap();
        assert_ne!(printed.segment(), held.segment());
        assert_eq!(h.engine.pool.line(held), b"held");

        h.wake(START_MS + 20, Some(b"\n"));
        h.wake(START_MS + 200, None);
        assert_eq!(h.output(), "printed\nrest\n");
    }

    proptest! {
        #[test]
        fn prop_zero_debounce_preserves_order(
            lines in prop::collection::vec("[a-z]{1,12}", 1..40),
            chunk in 1usize..17,
        ) {
            let mut h = Harness::new(SourceOptions::default());
            let input: Vec<u8> = lines.iter().flat_map(|l| format!("{l}\n").into_bytes()).collect();

            for (i, piece) in input.chunks(chunk).enumerate() {
                h.wake(START_MS + i as u64, Some(piece));
            }

            let expected: String = lines.iter().map(|l| format!("{l}\n")).collect();
            prop_assert_eq!(h.output(), expected);
        }

        #[test]
        fn prop_rotation_never_aliases(
            steps in prop::collection::vec((0u64..60, prop::option::of("[ab]{0,3}\n?[ab]{0,3}\n?")), 1..80),
            debounce in 0u64..50,
            duplicates in any::<bool>(),
        ) {
            let mut h = Harness::new(SourceOptions {
                debounce: Duration::from_millis(debounce),
                duplicates,
                ..SourceOptions::default()
            });

            let mut now = START_MS;
            for (gap, input) in &steps {
                now += gap;
                // Aliasing is asserted inside every wake.
                h.wake(now, input.as_deref().map(str::as_bytes));

                let printed = h.engine.last_printed.map(|l| h.engine.pool.line(l).to_vec());
                if let Some(text) = printed {
                    prop_assert!(!text.is_empty());
                }
            }
        }
    }
}
