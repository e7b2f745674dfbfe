//! Per-source options and the ordered command-line grammar that produces them.

use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::format::{unescape, Format};

/// Non-empty set of bytes that terminate a line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delimiters(Box<[u8]>);

impl Delimiters {
    /// Returns `None` for an empty set, which could never end a line.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            None
        } else {
            Some(Delimiters(bytes.into_boxed_slice()))
        }
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.0.contains(&byte)
    }

    /// Byte written in place of a delimiter when an over-long line is cut.
    pub fn terminator(&self) -> u8 {
        self.0[0]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters(Box::new([b'\n']))
    }
}

/// Options captured for a source when it is opened.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceOptions {
    pub format: Format,
    pub delimiters: Delimiters,
    /// Quiet period required after the last read before a held line is
    /// emitted. Zero disables holding.
    pub debounce: Duration,
    /// Emit a line even when it repeats the previous one.
    pub duplicates: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        SourceOptions {
            format: Format::default(),
            delimiters: Delimiters::default(),
            debounce: Duration::ZERO,
            duplicates: true,
        }
    }
}

/// A path together with the options in force where it was named.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub options: SourceOptions,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>, options: SourceOptions) -> Self {
        SourceSpec {
            path: path.into(),
            options,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown option: {0}")]
    UnknownOption(String),
    #[error("Missing value for {0}")]
    MissingValue(&'static str),
    #[error("Invalid debounce time {value:?}: {source}")]
    InvalidDebounce {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Delimiter set must not be empty")]
    EmptyDelimiters,
    #[error("No files to poll")]
    NoSources,
}

/// Parses a millisecond count written in decimal, hex (`0x64`) or octal
/// (`0144`).
fn parse_millis(value: &str) -> Result<u64, ParseIntError> {
    let value = value.trim();

    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if value.len() > 1 && value.starts_with('0') {
        u64::from_str_radix(&value[1..], 8)
    } else {
        value.parse()
    }
}

/// Builds source specs from the raw per-file arguments, left to right.
///
/// Options stay in force for every following file until changed:
///
/// * `--default` resets everything;
/// * `--unique` / `--duplicate` toggle duplicate suppression;
/// * `--delimiters DELIMS` sets the line delimiters (backslash escapes allowed);
/// * `--debounce MS` sets the debounce time in milliseconds (decimal, `0x` hex
///   or leading-`0` octal);
/// * `+FORMAT` sets the output format (see [`Format::parse`]).
///
/// Anything else not starting with `-` names a file.
pub fn parse_sources<I, S>(args: I) -> Result<Vec<SourceSpec>, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = SourceOptions::default();
    let mut specs = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg.as_ref();

        match arg {
            "--default" => options = SourceOptions::default(),
            "--unique" => options.duplicates = false,
            "--duplicate" | "--duplicates" => options.duplicates = true,
            "--delimiters" => {
                let value = args.next().ok_or(ConfigError::MissingValue("--delimiters"))?;
                options.delimiters = Delimiters::new(unescape(value.as_ref()))
                    .ok_or(ConfigError::EmptyDelimiters)?;
            }
            "--debounce" => {
                let value = args.next().ok_or(ConfigError::MissingValue("--debounce"))?;
                let value = value.as_ref();
                let millis = parse_millis(value).map_err(|source| ConfigError::InvalidDebounce {
                    value: value.to_string(),
                    source,
                })?;
                options.debounce = Duration::from_millis(millis);
            }
            _ if arg.starts_with('-') => {
                return Err(ConfigError::UnknownOption(arg.to_string()));
            }
            _ if arg.starts_with('+') => {
                options.format = Format::parse(&unescape(&arg[1..]));
            }
            _ => specs.push(SourceSpec::new(arg, options.clone())),
        }
    }

    if specs.is_empty() {
        return Err(ConfigError::NoSources);
    }

    Ok(specs)
}
