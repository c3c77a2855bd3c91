//! The allocation tree attached to detailed snapshots.
//!
//! A tree body is a pre-order serialization, one node per line. Each line
//! carries its own arity in an `n<k>:` prefix and its depth as leading
//! spaces, one space per level:
//!
//! ```text
//! n13: 1411172 (heap allocation functions) malloc/new/new[], --alloc-fns, etc.
//!  n4: 209472 0x5792ABD: dictresize (dictobject.c:517)
//!   n0: 576 in 1 place, below massif's threshold (01.00%)
//! ```
//!
//! There is no end marker: the body is over when every declared child has
//! been seen. `TreeBuilder` reconstructs the tree by keeping the chain of
//! nodes still expecting children on an explicit stack.

use getset::{CopyGetters, Getters};

use crate::error::HeapNodeError;
use crate::tokenize;

/// One node of a snapshot's allocation tree.
///
/// The label is carried verbatim; depending on the sampler's options it is an
/// address plus symbol, a `file:line` fragment, a below-threshold summary, or
/// the allocation-function root marker.
#[derive(Getters, CopyGetters, Debug, Clone, PartialEq, Eq)]
pub struct HeapNode {
    /// The arity from the `n<k>:` prefix. Always equal to `children().len()`
    /// in a finished tree.
    #[get_copy = "pub"]
    declared_children: u32,
    /// Bytes accounted for by this call site and everything below it.
    #[get_copy = "pub"]
    total_bytes: u64,
    /// The rest of the line after the byte count, uninterpreted.
    #[get = "pub"]
    label: String,
    /// Level below the root; equals the leading-space count of the line.
    #[get_copy = "pub"]
    depth: u32,
    /// Child nodes in input order.
    #[get = "pub"]
    children: Vec<HeapNode>,
}

impl HeapNode {
    /// Parse one `n<k>: <bytes> <label>` line into a childless node.
    fn parse(line: &str) -> Result<HeapNode, HeapNodeError> {
        let depth = tokenize::leading_spaces(line);
        let rest = &line[depth..];
        if rest.is_empty() {
            return Err(HeapNodeError::MissingChildCount);
        }

        let (count_tok, rest) = match tokenize::split_once(rest, " ") {
            Some(split) => split,
            None => (rest, ""),
        };
        let declared_children = tokenize::parse_child_count(count_tok)?;

        if rest.is_empty() {
            return Err(HeapNodeError::MissingBytes);
        }
        let (bytes_tok, label) =
            tokenize::split_once(rest, " ").ok_or(HeapNodeError::MissingLabel)?;
        let total_bytes = tokenize::parse_unsigned(bytes_tok).ok_or(HeapNodeError::MissingBytes)?;
        if label.is_empty() {
            return Err(HeapNodeError::MissingLabel);
        }

        Ok(HeapNode {
            declared_children,
            total_bytes,
            label: label.to_string(),
            depth: depth as u32,
            children: Vec::new(),
        })
    }
}

/// What [TreeBuilder::feed] reports after consuming one line.
#[derive(Debug)]
pub(crate) enum FeedResult {
    /// More node lines are expected.
    TreeContinues,
    /// The root just closed; this line was the last of the body.
    TreeComplete(HeapNode),
}

/// Rebuilds a heap tree from its pre-order line serialization.
///
/// The stack holds the chain of nodes whose children are still arriving,
/// outermost first. A subtree is attached to its parent the moment its last
/// descendant closes, so nothing outlives the builder except the finished
/// root handed back through [FeedResult::TreeComplete].
#[derive(Debug)]
pub(crate) struct TreeBuilder {
    stack: Vec<Frame>,
}

#[derive(Debug)]
struct Frame {
    node: HeapNode,
    /// Children declared by `node` but not yet fully built.
    remaining: u32,
}

impl TreeBuilder {
    pub(crate) fn new() -> TreeBuilder {
        TreeBuilder { stack: Vec::new() }
    }

    /// True once a node line has opened the body and until the root closes.
    pub(crate) fn in_body(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Consume one node line.
    ///
    /// In pre-order the next node is always a child of the innermost node
    /// still expecting children, so its depth must be exactly one past the
    /// open chain. Anything else is a shape violation.
    pub(crate) fn feed(&mut self, line: &str) -> Result<FeedResult, HeapNodeError> {
        let node = HeapNode::parse(line)?;

        let expected = self.stack.len() as u32;
        if node.depth > expected {
            return Err(HeapNodeError::DepthJump {
                got: node.depth,
                expected,
            });
        }
        if node.depth < expected {
            return Err(HeapNodeError::DepthMismatch {
                got: node.depth,
                expected,
            });
        }

        if self.stack.is_empty() {
            // the root; a childless root is a complete single-node tree
            if node.declared_children == 0 {
                return Ok(FeedResult::TreeComplete(node));
            }
            self.stack.push(Frame {
                remaining: node.declared_children,
                node,
            });
            return Ok(FeedResult::TreeContinues);
        }

        // arrival accounts for one of the open parent's children
        let top = self.stack.len() - 1;
        self.stack[top].remaining -= 1;

        if node.declared_children > 0 {
            self.stack.push(Frame {
                remaining: node.declared_children,
                node,
            });
            return Ok(FeedResult::TreeContinues);
        }

        Ok(self.close(node))
    }

    /// Attach a finished subtree to its parent, cascading: a parent whose
    /// last child just closed is itself finished.
    fn close(&mut self, mut finished: HeapNode) -> FeedResult {
        loop {
            let mut frame = match self.stack.pop() {
                Some(frame) => frame,
                None => return FeedResult::TreeComplete(finished),
            };
            frame.node.children.push(finished);
            if frame.remaining > 0 {
                self.stack.push(frame);
                return FeedResult::TreeContinues;
            }
            debug_assert_eq!(
                frame.node.declared_children as usize,
                frame.node.children.len()
            );
            finished = frame.node;
        }
    }
}
