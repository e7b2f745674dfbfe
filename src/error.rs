//! Errors that stop a [`Scheduler`](crate::Scheduler).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions raised while opening, reading or emitting.
///
/// A hang-up on a single source is not represented here; it only disables
/// that source.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid device: {}", .0.display())]
    InvalidDevice(PathBuf),
    #[error("read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("poll")]
    Poll(#[source] io::Error),
    #[error("write")]
    Write(#[source] io::Error),
    #[error("No free buffers: {}", .0.display())]
    NoFreeSegment(PathBuf),
    #[error("Too many files (at most {0})")]
    TooManySources(usize),
}
