use std::io;
use thiserror::Error;

/// The error produced when a massif capture cannot be parsed.
///
/// Carries the 1-based number of the line on which the problem was detected
/// and a [ParseErrorKind] describing what went wrong. No partial
/// [crate::Profile] is ever produced alongside one of these.
#[derive(Error, Debug)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    line: u64,
    #[source]
    kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: u64, kind: ParseErrorKind) -> ParseError {
        ParseError { line, kind }
    }

    /// The 1-based line number the error was detected on.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// What went wrong.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

/// The different ways a parse can fail.
#[derive(Error, Debug)]
pub enum ParseErrorKind {
    /// The underlying line source failed. The cause is attached.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// End of stream was reached without a single completed snapshot.
    #[error("no snapshots found")]
    NoSnapshots,

    /// A line did not match the field the parser was positioned at.
    #[error("expected {state}, got {got:?}")]
    UnexpectedLine {
        state: &'static str,
        got: String,
    },

    /// A field was present but its value was not usable, e.g. a numeric
    /// field with non-digit characters or an unknown `heap_tree=` kind.
    #[error("unexpected value for {field}: {got:?}")]
    UnexpectedValue {
        field: &'static str,
        got: String,
    },

    /// A heap tree node line could not be parsed or violated the tree shape.
    #[error("malformed heap tree node: {0}")]
    MalformedHeapNode(#[from] HeapNodeError),

    /// End of stream arrived while a heap tree still had children pending.
    #[error("heap tree truncated by end of input")]
    TruncatedTree,

    /// Non-ignorable content after the last complete snapshot that does not
    /// begin another snapshot.
    #[error("trailing data after last snapshot: {got:?}")]
    TrailingData {
        got: String,
    },
}

/// The ways a single heap tree node line can be malformed.
///
/// Node lines have the shape `n<k>: <bytes> <label>`, indented one space per
/// tree level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapNodeError {
    #[error("missing child count token")]
    MissingChildCount,

    #[error("missing byte count")]
    MissingBytes,

    #[error("missing label")]
    MissingLabel,

    /// The line is indented deeper than one level below the innermost open
    /// node.
    #[error("indentation depth {got} skips past depth {expected}")]
    DepthJump {
        got: u32,
        expected: u32,
    },

    /// The line is indented at a level where no node is still expecting
    /// children.
    #[error("indentation depth {got} does not match any open tree level (expected {expected})")]
    DepthMismatch {
        got: u32,
        expected: u32,
    },

    /// The first token was not of the literal form `n<digits>:`.
    #[error("bad child count token {0:?}")]
    BadChildCountToken(String),
}
