//! Output format instructions and backslash translation of arguments.

use std::slice::Iter;

/// One step of rendering an emitted line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Instruction {
    /// Copy these bytes verbatim.
    Literal(Box<[u8]>),
    /// The line read from the source, without its delimiter.
    Line,
    /// The path the source was opened with.
    Path,
    /// Time of the most recent read, in microseconds since the Unix epoch.
    Timestamp,
}

/// Compiled format: the instructions run in order for every emitted line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Format {
    instructions: Box<[Instruction]>,
}

impl Format {
    /// Compiles format text.
    ///
    /// `%l`, `%p` and `%t` select the line, path and timestamp; `%%` is a
    /// literal `%`. A `%` followed by anything else is kept as written. No
    /// newline is implied, so a line-per-line format needs an explicit `\n`.
    pub fn parse(text: &[u8]) -> Self {
        let mut instructions = Vec::new();
        let mut literal = Vec::new();
        let mut bytes = text.iter().copied().peekable();

        while let Some(byte) = bytes.next() {
            if byte != b'%' {
                literal.push(byte);
                continue;
            }

            let field = match bytes.peek() {
                Some(b'l') => Instruction::Line,
                Some(b'p') => Instruction::Path,
                Some(b't') => Instruction::Timestamp,
                Some(b'%') => {
                    bytes.next();
                    literal.push(b'%');
                    continue;
                }
                _ => {
                    literal.push(b'%');
                    continue;
                }
            };
            bytes.next();

            if !literal.is_empty() {
                let run = std::mem::take(&mut literal);
                instructions.push(Instruction::Literal(run.into_boxed_slice()));
            }
            instructions.push(field);
        }

        if !literal.is_empty() {
            instructions.push(Instruction::Literal(literal.into_boxed_slice()));
        }

        Format {
            instructions: instructions.into_boxed_slice(),
        }
    }

    /// Returns an iterator over the instructions.
    pub fn iter(&self) -> Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Returns `true` if rendering produces no output at all.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::parse(b"%l\n")
    }
}

impl<'a> IntoIterator for &'a Format {
    type Item = &'a Instruction;
    type IntoIter = Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

const ESCAPES: &[(u8, u8)] = &[
    (b'a', 0x07),
    (b'b', 0x08),
    (b'f', 0x0c),
    (b'n', b'\n'),
    (b'r', b'\r'),
    (b't', b'\t'),
    (b'v', 0x0b),
    (b'\\', b'\\'),
    (b'1', 1),
    (b'2', 2),
    (b'3', 3),
    (b'4', 4),
    (b'5', 5),
    (b'6', 6),
    (b'7', 7),
    (b'8', 8),
    (b'9', 9),
];

/// Translates backslash sequences in a command-line argument.
///
/// Unrecognised sequences, including a trailing lone backslash, are left
/// untouched.
pub fn unescape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();

    while let Some(byte) = bytes.next() {
        if byte == b'\\' {
            let translated = bytes
                .peek()
                .and_then(|next| ESCAPES.iter().find(|(code, _)| code == next))
                .map(|&(_, value)| value);

            if let Some(value) = translated {
                bytes.next();
                out.push(value);
                continue;
            }
        }
        out.push(byte);
    }

    out
}
