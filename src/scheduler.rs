//! The readiness loop driving every source.

use std::array;
use std::convert::Infallible;
use std::fs::File;
use std::future::{self, Future};
use std::io::{self, Write};
use std::path::Path;
use std::pin::{pin, Pin};
use std::task::Poll;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::FutureExt;
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};

use crate::config::SourceSpec;
use crate::engine::LineEngine;
use crate::error::Error;
use crate::output::OutputSink;
use crate::source::{self, Access};

/// Most sources one scheduler will poll.
pub const MAX_SOURCES: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatchStatus {
    Active,
    /// Hung up; kept in its slot but never waited on or read again.
    HungUp,
}

/// An opened source together with its line engine.
#[derive(Debug)]
pub struct SourceWatch {
    index: usize,
    access: Access,
    channel: AsyncFd<File>,
    status: WatchStatus,
    engine: LineEngine,
}

impl SourceWatch {
    fn open(index: usize, spec: SourceSpec) -> Result<Self, Error> {
        let (access, channel) = source::open(&spec.path)?;

        Ok(SourceWatch {
            index,
            access,
            channel,
            status: WatchStatus::Active,
            engine: LineEngine::new(spec.path, spec.options),
        })
    }

    pub fn path(&self) -> &Path {
        self.engine.path()
    }

    pub fn status(&self) -> WatchStatus {
        self.status
    }

    async fn readiness(&self) -> io::Result<()> {
        self.channel.ready(self.access.interest).await.map(drop)
    }

    /// Processes one wake for this source, whether or not it became ready.
    ///
    /// Returns how long until it wants to be checked again.
    fn check<W: Write>(
        &mut self,
        now: Duration,
        sink: &mut OutputSink<W>,
    ) -> Result<Option<Duration>, Error> {
        let settled = self.engine.settle(now, sink)?;

        if self.status == WatchStatus::HungUp {
            return Ok(self.engine.next_wake(now));
        }

        // Ready state is cached by the reactor, so this never waits.
        let mut guard = match self.channel.ready(self.access.interest).now_or_never() {
            Some(guard) => guard.map_err(Error::Poll)?,
            None => return Ok(self.engine.next_wake(now)),
        };
        let ready = guard.ready();

        if ready.is_read_closed() {
            warn!(index = self.index, path = %self.engine.path().display(), "EOF, no longer polling");
            self.status = WatchStatus::HungUp;
        }

        if self.access.matches(ready) {
            let mut file = self.channel.get_ref();
            let count = self
                .engine
                .ingest(now, settled, &mut file, self.access.reseek, sink)?;

            // A value file stays readable forever; wait for the next change.
            if count == 0 || self.access.reseek {
                guard.clear_ready();
            }
        }

        Ok(self.engine.next_wake(now))
    }
}

/// Multiplexes up to [`MAX_SOURCES`] sources onto one output.
///
/// Each [`turn`](Self::turn) waits until a source is ready or a debounce
/// deadline passes, then checks every source in the order they were added.
///
/// ```no_run
/// use linepoll::{Scheduler, SourceOptions, SourceSpec};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), linepoll::Error> {
///     let mut scheduler = Scheduler::new(std::io::stdout());
///     scheduler.add_source(SourceSpec::new("/tmp/fifo", SourceOptions::default()))?;
///     scheduler.run().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Scheduler<W: Write> {
    watches: Vec<SourceWatch>,
    sink: OutputSink<W>,
    timeout: Option<Duration>,
}

impl<W: Write> Scheduler<W> {
    pub fn new(writer: W) -> Self {
        Scheduler {
            watches: Vec::new(),
            sink: OutputSink::new(writer),
            timeout: None,
        }
    }

    /// Opens the source named by `spec` and adds it to the poll set.
    ///
    /// Must be called from within a Tokio runtime. Returns the new source's
    /// index.
    pub fn add_source(&mut self, spec: SourceSpec) -> Result<usize, Error> {
        if self.watches.len() >= MAX_SOURCES {
            return Err(Error::TooManySources(MAX_SOURCES));
        }

        let index = self.watches.len();
        let watch = SourceWatch::open(index, spec)?;
        self.watches.push(watch);

        Ok(index)
    }

    pub fn sources(&self) -> &[SourceWatch] {
        &self.watches
    }

    /// Deadline of the next wake when no source becomes ready, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn writer(&self) -> &W {
        self.sink.writer()
    }

    /// Waits once and checks every source.
    ///
    /// Returns the timeout the next turn will use.
    pub async fn turn(&mut self) -> Result<Option<Duration>, Error> {
        self.wait().await?;

        let now = wall_clock();
        self.timeout = self.dispatch(now)?;

        Ok(self.timeout)
    }

    /// Runs turns until a fatal error.
    pub async fn run(&mut self) -> Result<Infallible, Error> {
        debug!(sources = self.watches.len(), "polling");
        loop {
            self.turn().await?;
        }
    }

    async fn wait(&self) -> Result<(), Error> {
        // One slot per possible source, kept in place for the whole wait.
        let slots: [Option<_>; MAX_SOURCES] = array::from_fn(|i| {
            self.watches
                .get(i)
                .filter(|watch| watch.status == WatchStatus::Active)
                .map(|watch| watch.readiness())
        });
        let mut slots = pin!(slots);

        // Never completes when no source is active.
        let any_ready = future::poll_fn(|cx| {
            // SAFETY: the array is pinned and its elements are never moved.
            let slots = unsafe { slots.as_mut().get_unchecked_mut() };
            for slot in slots.iter_mut().flatten() {
                let slot = unsafe { Pin::new_unchecked(slot) };
                if let Poll::Ready(res) = slot.poll(cx) {
                    return Poll::Ready(res);
                }
            }
            Poll::Pending
        });

        let res = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, any_ready)
                .await
                .unwrap_or(Ok(())),
            None => any_ready.await,
        };

        res.map_err(Error::Poll)
    }

    fn dispatch(&mut self, now: Duration) -> Result<Option<Duration>, Error> {
        let mut next: Option<Duration> = None;

        for watch in &mut self.watches {
            let wake = watch.check(now, &mut self.sink)?;
            next = match (next, wake) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }

        Ok(next)
    }
}

fn wall_clock() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
