//! # sparse-intset
//!
//! A compact set of `u64` values for sparse, clustered membership, such as IDs
//! issued by a counter where most are later freed and the live ones sit in a
//! small, shifting window of a huge key space.
//!
//! Keys are split into bytes, most significant first, and stored in an
//! eight-level radix trie. Interior nodes keep a 256-bit presence map plus only
//! their populated children, packed in rank order; the bottom level is a plain
//! 256-bit leaf. Intersection walks the compressed trees directly instead of
//! materializing element lists.
//!
//! ## Example
//!
//! ```rust
//! use sparse_intset::SparseIntSet;
//!
//! let mut live = SparseIntSet::new();
//! live.add(10_000);
//! live.add(9);
//! live.add(99);
//! assert!(live.contains(99));
//! assert_eq!(live.to_string(), "{9, 99, 10000}");
//!
//! let other: SparseIntSet = [99, 100_000_001].into_iter().collect();
//! let both = SparseIntSet::intersection(&[&live, &other]);
//! assert_eq!(both.iter().collect::<Vec<_>>(), vec![99]);
//! ```
//!
//! The structure is single-writer: wrap it in a lock if it must be shared.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod bits;
mod node;

pub use bits::{count_ones64, Bit256, Bit64, BYTE_VALUES, WORD_BITS};
pub use node::{BITS_PER_LEVEL, LEAF_PARENT_SHIFT, ROOT_SHIFT};

use std::fmt;

use log::trace;

use node::{intersect_nodes, Removal, TrieNode};

// =============================================================================
// Configuration
// =============================================================================

/// Keys fetched per refill by [`Iter`].
const ITER_CHUNK: usize = 64;

// =============================================================================
// SparseIntSet
// =============================================================================

/// A set of `u64` stored as a compressed radix trie.
///
/// An empty set owns no nodes. The root is created by the first insertion and
/// dropped again when the last key is removed, so two sets with the same keys
/// always have the same shape and compare equal regardless of history.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SparseIntSet {
    root: Option<TrieNode>,
}

impl SparseIntSet {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Adds `key`, returning `true` if it was not already present.
    pub fn add(&mut self, key: u64) -> bool {
        let root = self.root.get_or_insert_with(|| {
            trace!("sparse set populated by {key}");
            TrieNode::new(ROOT_SHIFT)
        });
        root.add(key)
    }

    /// Removes `key`, returning `true` if it was present.
    pub fn remove(&mut self, key: u64) -> bool {
        let Some(root) = self.root.as_mut() else {
            return false;
        };
        match root.remove(key) {
            Removal::Absent => false,
            Removal::Removed => true,
            Removal::Emptied => {
                trace!("sparse set emptied by removing {key}");
                self.root = None;
                true
            }
        }
    }

    pub fn contains(&self, key: u64) -> bool {
        self.root.as_ref().is_some_and(|root| root.contains(key))
    }

    /// Number of keys. Walks the populated leaves; not cached.
    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, TrieNode::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn clear(&mut self) {
        self.root = None;
    }

    /// Returns how many keys are strictly less than `key`, and whether `key`
    /// itself is present.
    pub fn position(&self, key: u64) -> (usize, bool) {
        self.root
            .as_ref()
            .map_or((0, false), |root| root.position(key))
    }

    /// Writes keys `>= start` in ascending order into `out` and returns how many
    /// were written.
    ///
    /// A result shorter than `out` means the enumeration is complete. Otherwise,
    /// continue from one past the last key written.
    pub fn elements(&self, out: &mut [u64], start: u64) -> usize {
        self.root
            .as_ref()
            .map_or(0, |root| root.elements(out, start, 0))
    }

    /// Replaces the contents of `self` with the intersection of `operands`.
    ///
    /// The result is empty when `operands` is empty or any operand is empty.
    pub fn intersect(&mut self, operands: &[&SparseIntSet]) {
        self.root = None;
        let mut roots = Vec::with_capacity(operands.len());
        for set in operands {
            match &set.root {
                Some(root) => roots.push(root),
                None => {
                    trace!("intersection of {} sets short-circuited by an empty operand", operands.len());
                    return;
                }
            }
        }
        self.root = intersect_nodes(&roots);
        trace!(
            "intersection of {} sets is {}",
            operands.len(),
            if self.root.is_some() { "populated" } else { "empty" }
        );
    }

    /// The intersection of `operands` as a new set.
    pub fn intersection(operands: &[&SparseIntSet]) -> SparseIntSet {
        let mut out = SparseIntSet::new();
        out.intersect(operands);
        out
    }

    /// Ascending iterator over the keys.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            buf: [0; ITER_CHUNK],
            pos: 0,
            filled: 0,
            next_start: (!self.is_empty()).then_some(0),
        }
    }

    /// Best-effort estimate of the bytes used by this set, including child
    /// arrays at their allocated capacity.
    pub fn mem_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.root.as_ref().map_or(0, TrieNode::heap_size)
    }
}

impl fmt::Display for SparseIntSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, key) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for SparseIntSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<u64> for SparseIntSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut set = SparseIntSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<u64> for SparseIntSet {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        for key in iter {
            self.add(key);
        }
    }
}

impl<'a> IntoIterator for &'a SparseIntSet {
    type Item = u64;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Ascending iterator over a [`SparseIntSet`].
///
/// Pulls keys in fixed-size chunks through [`SparseIntSet::elements`], resuming
/// each refill one past the last key seen.
pub struct Iter<'a> {
    set: &'a SparseIntSet,
    buf: [u64; ITER_CHUNK],
    pos: usize,
    filled: usize,
    /// `None` once the enumeration is exhausted.
    next_start: Option<u64>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.pos == self.filled {
            let start = self.next_start?;
            self.filled = self.set.elements(&mut self.buf, start);
            self.pos = 0;
            if self.filled == 0 {
                self.next_start = None;
                return None;
            }
            self.next_start = if self.filled < ITER_CHUNK {
                None
            } else {
                self.buf[self.filled - 1].checked_add(1)
            };
        }
        let key = self.buf[self.pos];
        self.pos += 1;
        Some(key)
    }
}


#[cfg(test)]
mod proptests;
