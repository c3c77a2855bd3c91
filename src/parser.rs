//! The line-oriented state machine that recognizes massif's output format.
//!
//! The format has no framing: header lines, snapshot fields and heap tree
//! bodies are told apart only by field prefix and indentation, in a fixed
//! order. The parser therefore tracks what the next non-ignored line must
//! be and refuses anything else.
// format reference: https://sourceware.org/git/?p=valgrind.git;a=blob;f=massif/ms_main.c

use std::convert::TryFrom;
use std::io;

use tracing::{debug, trace};

use crate::error::{ParseError, ParseErrorKind};
use crate::heap_tree::{FeedResult, HeapNode, TreeBuilder};
use crate::line_source::LineSource;
use crate::tokenize;
use crate::{HeapTreeKind, Profile, Snapshot};

/// Consume `reader` to end of stream and assemble the profile.
pub(crate) fn parse<R: io::Read>(reader: R) -> Result<Profile, ParseError> {
    let mut source = LineSource::new(reader);
    let mut parser = Parser::new();
    loop {
        match source.read_line() {
            Ok(Some(line)) => parser.feed_line(line)?,
            Ok(None) => return parser.finish(),
            Err(cause) => return Err(parser.io_error(cause)),
        }
    }
}

/// What the parser expects from the next non-ignored line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Desc,
    Cmd,
    TimeUnit,
    AwaitSnapshot,
    Time,
    MemHeap,
    MemHeapExtra,
    MemStacks,
    HeapTreeKind,
    HeapTreeNode,
}

impl State {
    fn describe(self) -> &'static str {
        match self {
            State::Desc => "the `desc:` header",
            State::Cmd => "the `cmd:` header",
            State::TimeUnit => "the `time_unit:` header",
            State::AwaitSnapshot => "a `snapshot=` header",
            State::Time => "the `time=` field",
            State::MemHeap => "the `mem_heap_B=` field",
            State::MemHeapExtra => "the `mem_heap_extra_B=` field",
            State::MemStacks => "the `mem_stacks_B=` field",
            State::HeapTreeKind => "the `heap_tree=` field",
            State::HeapTreeNode => "a heap tree node",
        }
    }
}

/// Accumulates the fields of the snapshot currently being parsed.
///
/// Every field stays absent until its line has actually been seen, so a
/// half-read snapshot can never leak into the output.
#[derive(Debug)]
struct SnapshotBuilder {
    index: u32,
    time: Option<u64>,
    mem_heap_bytes: Option<u64>,
    mem_heap_extra_bytes: Option<u64>,
    mem_stacks_bytes: Option<u64>,
}

impl SnapshotBuilder {
    fn new(index: u32) -> SnapshotBuilder {
        SnapshotBuilder {
            index,
            time: None,
            mem_heap_bytes: None,
            mem_heap_extra_bytes: None,
            mem_stacks_bytes: None,
        }
    }

    fn finish(self, heap_tree_kind: HeapTreeKind, heap_tree: Option<HeapNode>) -> Option<Snapshot> {
        match (
            self.time,
            self.mem_heap_bytes,
            self.mem_heap_extra_bytes,
            self.mem_stacks_bytes,
        ) {
            (Some(time), Some(heap), Some(heap_extra), Some(stacks)) => Some(Snapshot::new(
                self.index,
                time,
                heap,
                heap_extra,
                stacks,
                heap_tree_kind,
                heap_tree,
            )),
            _ => None,
        }
    }
}

struct Parser {
    state: State,
    /// 1-based number of the line most recently fed.
    line_no: u64,
    description: String,
    command: String,
    time_unit: String,
    snapshots: Vec<Snapshot>,
    current: Option<SnapshotBuilder>,
    tree: TreeBuilder,
    max_time: u64,
    max_total_bytes: u64,
}

impl Parser {
    fn new() -> Parser {
        Parser {
            state: State::Desc,
            line_no: 0,
            description: String::new(),
            command: String::new(),
            time_unit: String::new(),
            snapshots: Vec::new(),
            current: None,
            tree: TreeBuilder::new(),
            max_time: 0,
            max_total_bytes: 0,
        }
    }

    fn feed_line(&mut self, line: &str) -> Result<(), ParseError> {
        self.line_no += 1;
        trace!(line_no = self.line_no, state = ?self.state, "line: {:?}", line);

        // inside a tree body a blank line is a malformed node, not padding;
        // everywhere else, including before the first node line, it is
        if !(self.state == State::HeapTreeNode && self.tree.in_body()) && is_ignorable(line) {
            return Ok(());
        }

        match self.state {
            State::Desc => {
                self.description = self.header_field(line, "desc")?;
                self.state = State::Cmd;
            }
            State::Cmd => {
                self.command = self.header_field(line, "cmd")?;
                self.state = State::TimeUnit;
            }
            State::TimeUnit => {
                self.time_unit = self.header_field(line, "time_unit")?;
                self.state = State::AwaitSnapshot;
            }
            State::AwaitSnapshot => match tokenize::split_once(line, "=") {
                Some(("snapshot", value)) => {
                    let index = tokenize::parse_unsigned(value)
                        .and_then(|raw| u32::try_from(raw).ok())
                        .ok_or_else(|| self.unexpected_value("snapshot", value))?;
                    self.current = Some(SnapshotBuilder::new(index));
                    self.state = State::Time;
                }
                _ => return Err(self.trailing_or_unexpected(line)),
            },
            State::Time => {
                let time = self.numeric_field(line, "time")?;
                if let Some(current) = self.current.as_mut() {
                    current.time = Some(time);
                }
                self.state = State::MemHeap;
            }
            State::MemHeap => {
                let bytes = self.numeric_field(line, "mem_heap_B")?;
                if let Some(current) = self.current.as_mut() {
                    current.mem_heap_bytes = Some(bytes);
                }
                self.state = State::MemHeapExtra;
            }
            State::MemHeapExtra => {
                let bytes = self.numeric_field(line, "mem_heap_extra_B")?;
                if let Some(current) = self.current.as_mut() {
                    current.mem_heap_extra_bytes = Some(bytes);
                }
                self.state = State::MemStacks;
            }
            State::MemStacks => {
                let bytes = self.numeric_field(line, "mem_stacks_B")?;
                if let Some(current) = self.current.as_mut() {
                    current.mem_stacks_bytes = Some(bytes);
                }
                self.state = State::HeapTreeKind;
            }
            State::HeapTreeKind => {
                let value = match tokenize::split_once(line, "=") {
                    Some(("heap_tree", value)) => value,
                    _ => return Err(self.unexpected_line(line)),
                };
                match value {
                    "empty" => self.finalize_snapshot(line, HeapTreeKind::Empty, None)?,
                    "peak" => self.finalize_snapshot(line, HeapTreeKind::Peak, None)?,
                    "detailed" => {
                        self.tree = TreeBuilder::new();
                        self.state = State::HeapTreeNode;
                    }
                    other => return Err(self.unexpected_value("heap_tree", other)),
                }
            }
            State::HeapTreeNode => {
                let fed = self.tree.feed(line).map_err(|reason| {
                    ParseError::new(self.line_no, ParseErrorKind::MalformedHeapNode(reason))
                })?;
                match fed {
                    FeedResult::TreeContinues => {}
                    FeedResult::TreeComplete(root) => {
                        self.finalize_snapshot(line, HeapTreeKind::Detailed, Some(root))?
                    }
                }
            }
        }

        Ok(())
    }

    fn finish(self) -> Result<Profile, ParseError> {
        match self.state {
            State::AwaitSnapshot if !self.snapshots.is_empty() => {
                debug!(
                    snapshots = self.snapshots.len(),
                    max_time = self.max_time,
                    max_total_bytes = self.max_total_bytes,
                    "parse complete"
                );
                Ok(Profile::new(
                    self.description,
                    self.command,
                    self.time_unit,
                    self.snapshots,
                    self.max_time,
                    self.max_total_bytes,
                ))
            }
            State::Desc | State::Cmd | State::TimeUnit | State::AwaitSnapshot => Err(
                ParseError::new(self.line_no.max(1), ParseErrorKind::NoSnapshots),
            ),
            State::HeapTreeNode => Err(ParseError::new(self.line_no, ParseErrorKind::TruncatedTree)),
            state => Err(ParseError::new(
                self.line_no,
                ParseErrorKind::UnexpectedLine {
                    state: state.describe(),
                    got: "end of input".to_string(),
                },
            )),
        }
    }

    /// `key: value`, free-form value.
    fn header_field(&self, line: &str, key: &'static str) -> Result<String, ParseError> {
        match tokenize::split_once(line, ": ") {
            Some((k, value)) if k == key => Ok(value.to_string()),
            _ => Err(self.unexpected_line(line)),
        }
    }

    /// `key=value`, strict decimal value.
    fn numeric_field(&self, line: &str, key: &'static str) -> Result<u64, ParseError> {
        match tokenize::split_once(line, "=") {
            Some((k, value)) if k == key => {
                tokenize::parse_unsigned(value).ok_or_else(|| self.unexpected_value(key, value))
            }
            _ => Err(self.unexpected_line(line)),
        }
    }

    fn finalize_snapshot(
        &mut self,
        line: &str,
        kind: HeapTreeKind,
        tree: Option<HeapNode>,
    ) -> Result<(), ParseError> {
        let snapshot = self
            .current
            .take()
            .and_then(|builder| builder.finish(kind, tree))
            .ok_or_else(|| self.unexpected_line(line))?;

        self.max_time = self.max_time.max(snapshot.time());
        self.max_total_bytes = self.max_total_bytes.max(snapshot.total_bytes());
        debug!(
            index = snapshot.index(),
            time = snapshot.time(),
            total_bytes = snapshot.total_bytes(),
            kind = ?snapshot.heap_tree_kind(),
            "snapshot complete"
        );

        self.snapshots.push(snapshot);
        self.state = State::AwaitSnapshot;
        Ok(())
    }

    fn io_error(&self, cause: io::Error) -> ParseError {
        // the failure was observed while reading the line after the last
        // successfully delivered one
        ParseError::new(self.line_no + 1, ParseErrorKind::Io(cause))
    }

    fn unexpected_line(&self, line: &str) -> ParseError {
        ParseError::new(
            self.line_no,
            ParseErrorKind::UnexpectedLine {
                state: self.state.describe(),
                got: clip(line),
            },
        )
    }

    fn unexpected_value(&self, field: &'static str, got: &str) -> ParseError {
        ParseError::new(
            self.line_no,
            ParseErrorKind::UnexpectedValue {
                field,
                got: clip(got),
            },
        )
    }

    fn trailing_or_unexpected(&self, line: &str) -> ParseError {
        // a heap-node-shaped line here is a tree body where none is
        // permitted: only `heap_tree=detailed` opens one
        if self.snapshots.is_empty() || looks_like_heap_node(line) {
            self.unexpected_line(line)
        } else {
            ParseError::new(
                self.line_no,
                ParseErrorKind::TrailingData { got: clip(line) },
            )
        }
    }
}

/// Blank lines and `#-----------` separators appear between snapshots and
/// around tree bodies.
fn is_ignorable(line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let mut bytes = line.bytes();
    bytes.next() == Some(b'#') && line.len() > 1 && bytes.all(|b| b == b'-')
}

fn looks_like_heap_node(line: &str) -> bool {
    let body = &line[tokenize::leading_spaces(line)..];
    match tokenize::split_once(body, " ") {
        Some((tok, _)) => tokenize::parse_child_count(tok).is_ok(),
        None => false,
    }
}

/// Keep error messages bounded even when the offending line is not.
fn clip(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.len() <= LIMIT {
        return text.to_string();
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
