//! Classifying and opening the files to poll.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;

use nix::fcntl::OFlag;
use tokio::io::unix::AsyncFd;
use tokio::io::{Interest, Ready};
use tracing::debug;

use crate::error::Error;

/// What kind of file a source is, as far as polling is concerned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    /// Regular file holding a current value, e.g. `/sys/class/gpio/gpio4/value`.
    Attribute,
    /// Character device, e.g. `/dev/ttyUSB0`.
    CharDevice,
    /// Named pipe, e.g. `/tmp/fifo`.
    Fifo,
}

/// How a source is opened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessMode {
    ReadOnly,
    ReadOnlyNonBlocking,
    /// Pipes are opened for writing as well, so the kernel never reports end
    /// of stream while no other writer is attached.
    ReadWriteNonBlocking,
}

impl AccessMode {
    fn open_options(self) -> OpenOptions {
        let nonblock = OFlag::O_NONBLOCK.bits();
        let mut options = OpenOptions::new();

        match self {
            AccessMode::ReadOnly => options.read(true),
            AccessMode::ReadOnlyNonBlocking => options.read(true).custom_flags(nonblock),
            AccessMode::ReadWriteNonBlocking => {
                options.read(true).write(true).custom_flags(nonblock)
            }
        };

        options
    }
}

/// Access facts derived from a source's kind when it is opened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Access {
    pub kind: SourceKind,
    pub mode: AccessMode,
    /// Readiness that means "read me".
    pub interest: Interest,
    /// Re-read from offset 0 on every notification.
    pub reseek: bool,
}

impl Access {
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            // sysfs attributes signal changes as priority events
            SourceKind::Attribute => Access {
                kind,
                mode: AccessMode::ReadOnly,
                interest: Interest::PRIORITY,
                reseek: true,
            },
            SourceKind::CharDevice => Access {
                kind,
                mode: AccessMode::ReadOnlyNonBlocking,
                interest: Interest::READABLE,
                reseek: false,
            },
            SourceKind::Fifo => Access {
                kind,
                mode: AccessMode::ReadWriteNonBlocking,
                interest: Interest::READABLE,
                reseek: false,
            },
        }
    }

    /// Returns `true` if `ready` carries the event this source waits for.
    pub fn matches(&self, ready: Ready) -> bool {
        if self.interest.is_priority() {
            ready.is_priority()
        } else {
            ready.is_readable()
        }
    }
}

/// Determines how `path` must be opened.
pub fn classify(path: &Path) -> Result<Access, Error> {
    let file_type = fs::metadata(path)
        .map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?
        .file_type();

    let kind = if file_type.is_file() {
        SourceKind::Attribute
    } else if file_type.is_char_device() {
        SourceKind::CharDevice
    } else if file_type.is_fifo() {
        SourceKind::Fifo
    } else {
        return Err(Error::InvalidDevice(path.to_path_buf()));
    };

    Ok(Access::for_kind(kind))
}

/// Classifies and opens `path`, registering it with the Tokio reactor.
///
/// Must be called from within a Tokio runtime with I/O enabled. Files the
/// kernel cannot poll are refused at registration.
pub fn open(path: &Path) -> Result<(Access, AsyncFd<File>), Error> {
    let access = classify(path)?;

    let open_error = |source: io::Error| Error::Open {
        path: path.to_path_buf(),
        source,
    };

    let file = access.mode.open_options().open(path).map_err(open_error)?;
    let channel = AsyncFd::with_interest(file, access.interest).map_err(open_error)?;

    debug!(path = %path.display(), kind = ?access.kind, "opened");

    Ok((access, channel))
}
