//! A library for parsing the output of Valgrind's massif heap profiler.
//!
//! Massif writes one `massif.out.<pid>` text file per run: a short header
//! followed by a sequence of snapshots of the traced program's memory use,
//! some of which carry a full allocation call tree. See [parse_file] or
//! [parse_reader] to get started, or the `analyze_massif` example in the
//! repo.
//!
//! # Examples
//!
//! Counting how many snapshots of each heap tree kind a capture contains:
//!
//! ```
//! use massif_out::{EnumIterable, HeapTreeKind, Profile};
//! use std::collections;
//! use std::path;
//!
//! fn count_tree_kinds(path: &path::Path) -> Result<(), massif_out::ParseError> {
//!     let profile: Profile = massif_out::parse_file(path)?;
//!
//!     // start with zero counts for all kinds
//!     let mut counts = HeapTreeKind::iter()
//!         .map(|kind| (kind, 0_u64))
//!         .collect::<collections::HashMap<HeapTreeKind, u64>>();
//!
//!     // overwrite zeros with real counts for the kinds that occur
//!     for snapshot in profile.snapshots() {
//!         counts
//!             .entry(snapshot.heap_tree_kind())
//!             .and_modify(|c| *c += 1)
//!             .or_insert(1);
//!     }
//!
//!     for (kind, count) in counts {
//!         println!("{:?}: {}", kind, count);
//!     }
//!
//!     Ok(())
//! }
//! ```
// capture format: https://valgrind.org/docs/manual/ms-manual.html
use getset::{CopyGetters, Getters};
use std::fs;
use std::io;
use std::path::Path;
use strum_macros::EnumIter;

pub mod heap_tree;

mod error;
mod line_source;
mod parser;
mod tokenize;

pub use crate::error::{HeapNodeError, ParseError, ParseErrorKind};
pub use crate::heap_tree::HeapNode;

/// The complete content of one massif capture.
///
/// A `Profile` is produced only by a successful parse and is immutable from
/// then on; the two `max_*` aggregates are computed during the parse so a
/// plot can scale its axes without another pass over the snapshots.
#[derive(Getters, CopyGetters, Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Value of the `desc:` header: the massif options the run was captured
    /// with, or `(none)`.
    #[get = "pub"]
    description: String,
    /// Value of the `cmd:` header: the traced command line.
    #[get = "pub"]
    command: String,
    /// Value of the `time_unit:` header, carried verbatim: `i` for
    /// instructions, `ms` for milliseconds, `B` for bytes allocated.
    #[get = "pub"]
    time_unit: String,
    /// Every snapshot of the run, in capture order. Never empty.
    #[get = "pub"]
    snapshots: Vec<Snapshot>,
    /// The largest `time=` value of any snapshot.
    #[get_copy = "pub"]
    max_time: u64,
    /// The largest combined heap + heap overhead + stack usage of any
    /// snapshot.
    #[get_copy = "pub"]
    max_total_bytes: u64,
}

impl Profile {
    pub(crate) fn new(
        description: String,
        command: String,
        time_unit: String,
        snapshots: Vec<Snapshot>,
        max_time: u64,
        max_total_bytes: u64,
    ) -> Profile {
        Profile {
            description,
            command,
            time_unit,
            snapshots,
            max_time,
            max_total_bytes,
        }
    }
}

/// One sample point of the traced program's memory state.
#[derive(Getters, CopyGetters, Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// The number from the `snapshot=` line. Sequential in practice, but
    /// carried as captured rather than recomputed.
    #[get_copy = "pub"]
    index: u32,
    /// When the sample was taken, in the profile's [Profile::time_unit].
    #[get_copy = "pub"]
    time: u64,
    /// Bytes of useful heap allocation.
    #[get_copy = "pub"]
    mem_heap_bytes: u64,
    /// Allocator bookkeeping and alignment overhead, in bytes.
    #[get_copy = "pub"]
    mem_heap_extra_bytes: u64,
    /// Stack usage in bytes; zero unless massif ran with `--stacks=yes`.
    #[get_copy = "pub"]
    mem_stacks_bytes: u64,
    /// Which flavour of allocation detail this snapshot carries.
    #[get_copy = "pub"]
    heap_tree_kind: HeapTreeKind,
    /// The allocation tree. `Some` exactly when [Snapshot::heap_tree_kind]
    /// is [HeapTreeKind::Detailed].
    #[get = "pub"]
    heap_tree: Option<HeapNode>,
}

impl Snapshot {
    pub(crate) fn new(
        index: u32,
        time: u64,
        mem_heap_bytes: u64,
        mem_heap_extra_bytes: u64,
        mem_stacks_bytes: u64,
        heap_tree_kind: HeapTreeKind,
        heap_tree: Option<HeapNode>,
    ) -> Snapshot {
        Snapshot {
            index,
            time,
            mem_heap_bytes,
            mem_heap_extra_bytes,
            mem_stacks_bytes,
            heap_tree_kind,
            heap_tree,
        }
    }

    /// Combined heap, heap overhead and stack usage at this sample point.
    pub fn total_bytes(&self) -> u64 {
        self.mem_heap_bytes + self.mem_heap_extra_bytes + self.mem_stacks_bytes
    }
}

/// How much allocation detail a [Snapshot] carries, from its `heap_tree=`
/// field.
///
/// Most snapshots are `Empty`; massif records a detailed tree every
/// `--detailed-freq`th sample and flags the run's peak sample as `Peak`.
// Since this enum has no data, add EnumIter to allow enumerating across the variants
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum HeapTreeKind {
    /// No allocation tree was recorded.
    Empty,
    /// The sample massif flagged as the peak of the run; carries no tree
    /// body.
    Peak,
    /// A full allocation tree follows the snapshot fields.
    Detailed,
}

/// Parse a massif capture from any byte stream.
///
/// The reader is consumed to end of stream. Anything [io::Read] works: an
/// open file, a pipe, or an in-memory buffer such as `&[u8]`.
pub fn parse_reader<R: io::Read>(reader: R) -> Result<Profile, ParseError> {
    parser::parse(reader)
}

/// Open the file at `path`, parse it, and release the handle.
///
/// The handle is released on every exit path, success or failure.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Profile, ParseError> {
    let file = fs::File::open(path).map_err(|cause| ParseError::new(1, cause.into()))?;
    parse_reader(file)
}

/// Allow iterating over enum variants for enums that have `#[derive(EnumIter)]`.
///
/// Wrapper around `strum`'s `IntoEnumIterator` so that users don't need to know about `strum`
pub trait EnumIterable {
    type Iterator: Iterator<Item = Self>;

    fn iter() -> Self::Iterator;
}

impl<T: strum::IntoEnumIterator> EnumIterable for T {
    type Iterator = T::Iterator;

    fn iter() -> Self::Iterator {
        T::iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use std::io::Write;
    use std::path;

    /// Three snapshots: plain, detailed, peak.
    const CAPTURE: &str = "\
desc: --stacks=yes
cmd: ./factor 1299709
time_unit: i
#-----------
snapshot=0
#-----------
time=1000
mem_heap_B=2000
mem_heap_extra_B=48
mem_stacks_B=120
heap_tree=empty
#-----------
snapshot=1
#-----------
time=5000
mem_heap_B=8000
mem_heap_extra_B=96
mem_stacks_B=240
heap_tree=detailed
n1: 8000 (heap allocation functions) malloc/new/new[], --alloc-fns, etc.
 n0: 8000 0x4005A1: sieve_init (factor.c:31)
#-----------
snapshot=2
#-----------
time=9000
mem_heap_B=4000
mem_heap_extra_B=64
mem_stacks_B=200
heap_tree=peak
";

    #[test]
    fn parse_file_reads_and_releases_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CAPTURE.as_bytes()).unwrap();

        let profile = parse_file(file.path()).unwrap();

        assert_eq!("--stacks=yes", profile.description());
        assert_eq!("./factor 1299709", profile.command());
        let indexes = profile.snapshots().iter().map(|s| s.index()).collect_vec();
        assert_eq!(vec![0, 1, 2], indexes);
        assert_eq!(9000, profile.max_time());
        assert_eq!(8336, profile.max_total_bytes());

        file.close().unwrap();
    }

    #[test]
    fn parse_file_on_a_missing_path_is_io() {
        let err = parse_file(path::Path::new("/this/does/not/exist")).unwrap_err();
        assert_eq!(1, err.line());
        assert!(matches!(err.kind(), ParseErrorKind::Io(_)));
    }

    #[test]
    fn reader_and_file_agree() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CAPTURE.as_bytes()).unwrap();

        let from_file = parse_file(file.path()).unwrap();
        let from_reader = parse_reader(CAPTURE.as_bytes()).unwrap();
        assert_eq!(from_file, from_reader);
    }

    #[test]
    fn total_bytes_is_the_three_way_sum() {
        let profile = parse_reader(CAPTURE.as_bytes()).unwrap();
        let snapshot = &profile.snapshots()[1];
        assert_eq!(8000 + 96 + 240, snapshot.total_bytes());
    }

    #[test]
    fn tree_kinds_follow_the_capture() {
        let profile = parse_reader(CAPTURE.as_bytes()).unwrap();
        let kinds = profile
            .snapshots()
            .iter()
            .map(|s| s.heap_tree_kind())
            .collect_vec();
        assert_eq!(
            vec![
                HeapTreeKind::Empty,
                HeapTreeKind::Detailed,
                HeapTreeKind::Peak
            ],
            kinds
        );
        assert!(profile.snapshots()[1].heap_tree().is_some());
        assert!(profile.snapshots()[2].heap_tree().is_none());
    }

    #[test]
    fn every_kind_is_iterable() {
        let kinds = HeapTreeKind::iter().collect_vec();
        assert_eq!(
            vec![
                HeapTreeKind::Empty,
                HeapTreeKind::Peak,
                HeapTreeKind::Detailed
            ],
            kinds
        );
    }
}
