//! Compressed radix-trie nodes.
//!
//! A node behaves like a 256-slot array of subtrees indexed by one byte of the
//! key, but only populated slots are stored. `presence` records which byte values
//! have a subtree and `children` holds those subtrees densely, in ascending byte
//! order, so the child for byte `b` lives at `presence.position(b).0`.
//!
//! Nodes at `shift > LEAF_PARENT_SHIFT` hold further nodes; the node at
//! `LEAF_PARENT_SHIFT` holds [`Bit256`] leaves covering the least significant byte.

use smallvec::SmallVec;

use crate::bits::{Bit256, BYTE_VALUES};

// =============================================================================
// Configuration
// =============================================================================

/// Key bits consumed per trie level.
pub const BITS_PER_LEVEL: u32 = 8;

/// Shift of the root node: it indexes the most significant byte.
pub const ROOT_SHIFT: u32 = u64::BITS - BITS_PER_LEVEL;

/// Shift of the deepest interior node; its children are leaves.
pub const LEAF_PARENT_SHIFT: u32 = BITS_PER_LEVEL;

/// Operands handled without heap allocation during intersection.
const INLINE_OPERANDS: usize = 8;

#[inline]
fn byte_at(key: u64, shift: u32) -> u8 {
    (key >> shift) as u8
}

// =============================================================================
// Children
// =============================================================================

/// A populated subtree: another node, or a leaf at the bottom level.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Child {
    Inner(TrieNode),
    Leaf(Bit256),
}

impl Child {
    fn add(&mut self, key: u64) -> bool {
        match self {
            Child::Inner(node) => node.add(key),
            Child::Leaf(leaf) => {
                let low = key as u8;
                let added = !leaf.contains(low);
                leaf.add(low);
                added
            }
        }
    }

    fn remove(&mut self, key: u64) -> Removal {
        match self {
            Child::Inner(node) => node.remove(key),
            Child::Leaf(leaf) => {
                let low = key as u8;
                if !leaf.contains(low) {
                    return Removal::Absent;
                }
                leaf.remove(low);
                if leaf.is_empty() {
                    Removal::Emptied
                } else {
                    Removal::Removed
                }
            }
        }
    }

    fn contains(&self, key: u64) -> bool {
        match self {
            Child::Inner(node) => node.contains(key),
            Child::Leaf(leaf) => leaf.contains(key as u8),
        }
    }

    fn len(&self) -> usize {
        match self {
            Child::Inner(node) => node.len(),
            Child::Leaf(leaf) => leaf.len(),
        }
    }

    fn position(&self, key: u64) -> (usize, bool) {
        match self {
            Child::Inner(node) => node.position(key),
            Child::Leaf(leaf) => leaf.position(key as u8),
        }
    }

    fn elements(&self, out: &mut [u64], start: u64, high: u64) -> usize {
        match self {
            Child::Inner(node) => node.elements(out, start, high),
            Child::Leaf(leaf) => leaf.elements64(out, start as u8, high),
        }
    }

    fn heap_size(&self) -> usize {
        match self {
            Child::Inner(node) => node.heap_size(),
            Child::Leaf(_) => 0,
        }
    }

    pub(crate) fn as_inner(&self) -> Option<&TrieNode> {
        match self {
            Child::Inner(node) => Some(node),
            Child::Leaf(_) => None,
        }
    }

    pub(crate) fn as_leaf(&self) -> Option<&Bit256> {
        match self {
            Child::Leaf(leaf) => Some(leaf),
            Child::Inner(_) => None,
        }
    }
}

/// One populated slot: the byte value it stands for, and its subtree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Entry {
    pub(crate) index: u8,
    pub(crate) child: Child,
}

/// Result of removing a key from a subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Removal {
    /// The key was not present; nothing changed.
    Absent,
    /// The key was removed and the subtree still has members.
    Removed,
    /// The key was removed and the subtree is now empty. The caller must drop it;
    /// its internal arrays may not have been cleaned up.
    Emptied,
}

// =============================================================================
// TrieNode
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TrieNode {
    shift: u32,
    presence: Bit256,
    children: Vec<Entry>,
}

impl TrieNode {
    pub(crate) fn new(shift: u32) -> Self {
        debug_assert!(shift % BITS_PER_LEVEL == 0);
        debug_assert!((LEAF_PARENT_SHIFT..=ROOT_SHIFT).contains(&shift));
        Self {
            shift,
            presence: Bit256::new(),
            children: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn shift(&self) -> u32 {
        self.shift
    }

    #[cfg(test)]
    pub(crate) fn presence(&self) -> &Bit256 {
        &self.presence
    }

    #[cfg(test)]
    pub(crate) fn children(&self) -> &[Entry] {
        &self.children
    }

    #[inline]
    fn holds_leaves(&self) -> bool {
        self.shift == LEAF_PARENT_SHIFT
    }

    fn new_child(&self) -> Child {
        if self.holds_leaves() {
            Child::Leaf(Bit256::new())
        } else {
            Child::Inner(TrieNode::new(self.shift - BITS_PER_LEVEL))
        }
    }

    /// Child stored for byte value `index`, if that slot is populated.
    pub(crate) fn child(&self, index: u8) -> Option<&Child> {
        let (pos, found) = self.presence.position(index);
        if !found {
            return None;
        }
        self.children
            .get(pos)
            .filter(|entry| entry.index == index)
            .map(|entry| &entry.child)
    }

    /// Inserts `key`, creating missing levels on the way down. Returns `true` if
    /// the key was not already present.
    pub(crate) fn add(&mut self, key: u64) -> bool {
        let index = byte_at(key, self.shift);
        let (pos, found) = self.presence.position(index);
        if !found {
            self.presence.add(index);
            let child = self.new_child();
            self.children.insert(pos, Entry { index, child });
            debug_assert_eq!(self.children.len(), self.presence.len());
        }
        self.children[pos].child.add(key)
    }

    /// Removes `key`. Emptied subtrees are spliced out; when the last one goes,
    /// this node reports [`Removal::Emptied`] and leaves cleanup to its owner.
    pub(crate) fn remove(&mut self, key: u64) -> Removal {
        let index = byte_at(key, self.shift);
        let (pos, found) = self.presence.position(index);
        if !found {
            return Removal::Absent;
        }
        match self.children[pos].child.remove(key) {
            Removal::Emptied if self.children.len() == 1 => Removal::Emptied,
            Removal::Emptied => {
                self.children.remove(pos);
                self.presence.remove(index);
                debug_assert_eq!(self.children.len(), self.presence.len());
                Removal::Removed
            }
            other => other,
        }
    }

    pub(crate) fn contains(&self, key: u64) -> bool {
        self.child(byte_at(key, self.shift))
            .is_some_and(|child| child.contains(key))
    }

    /// Number of keys in this subtree. Not cached: walks every populated leaf.
    pub(crate) fn len(&self) -> usize {
        self.children.iter().map(|e| e.child.len()).sum()
    }

    /// Number of keys in this subtree strictly below `key`, and whether `key`
    /// is present.
    pub(crate) fn position(&self, key: u64) -> (usize, bool) {
        let (pos, found) = self.presence.position(byte_at(key, self.shift));
        let before: usize = self.children[..pos].iter().map(|e| e.child.len()).sum();
        if !found {
            return (before, false);
        }
        let (within, present) = self.children[pos].child.position(key);
        (before + within, present)
    }

    /// Writes keys `>= start` in ascending order into `out`, each OR'ed with
    /// `high` (the bits fixed by ancestors). Returns the number written.
    ///
    /// Enumeration is resumable by calling again with `start` one past the last
    /// key returned.
    pub(crate) fn elements(&self, out: &mut [u64], start: u64, high: u64) -> usize {
        let prefix = |entry: &Entry| high | (u64::from(entry.index) << self.shift);

        let (mut pos, found) = self.presence.position(byte_at(start, self.shift));
        let mut written = 0;
        if found {
            let entry = &self.children[pos];
            written = entry.child.elements(out, start, prefix(entry));
            pos += 1;
        }
        for entry in &self.children[pos..] {
            if written == out.len() {
                break;
            }
            written += entry.child.elements(&mut out[written..], 0, prefix(entry));
        }
        written
    }

    /// Heap bytes owned by this subtree: child arrays at their allocated
    /// capacity, each entry counted at its inline size. Best effort only.
    pub(crate) fn heap_size(&self) -> usize {
        self.children.capacity() * std::mem::size_of::<Entry>()
            + self.children.iter().map(|e| e.child.heap_size()).sum::<usize>()
    }
}

// =============================================================================
// Structural intersection
// =============================================================================

/// Intersects several subtrees rooted at the same shift without materializing
/// their keys.
///
/// Only byte values present in every operand are visited, so the work at each
/// level is bounded by the narrowest operand. Returns `None` when the
/// intersection is empty, and never returns a node with an empty subtree.
///
/// # Panics
///
/// If the operands disagree on shift, or if a byte marked present in an operand's
/// `presence` has no matching child. Both indicate a corrupted trie.
pub(crate) fn intersect_nodes(nodes: &[&TrieNode]) -> Option<TrieNode> {
    let first = *nodes.first()?;
    assert!(
        nodes.iter().all(|n| n.shift == first.shift),
        "intersect_nodes: operands at different shifts"
    );

    let presences: SmallVec<[&Bit256; INLINE_OPERANDS]> =
        nodes.iter().map(|n| &n.presence).collect();
    let mut presence = Bit256::new();
    presence.intersect_n(&presences);
    if presence.is_empty() {
        return None;
    }

    let mut indices = [0u8; BYTE_VALUES];
    let candidates = presence.elements(&mut indices, 0);

    let mut result = TrieNode {
        shift: first.shift,
        presence,
        children: Vec::with_capacity(candidates),
    };

    for &index in &indices[..candidates] {
        let children: SmallVec<[&Child; INLINE_OPERANDS]> = nodes
            .iter()
            .map(|n| {
                n.child(index)
                    .expect("intersect_nodes: candidate index missing from operand")
            })
            .collect();

        let child = if first.holds_leaves() {
            let leaves: SmallVec<[&Bit256; INLINE_OPERANDS]> = children
                .iter()
                .map(|c| c.as_leaf().expect("intersect_nodes: expected a leaf child"))
                .collect();
            let mut leaf = Bit256::new();
            leaf.intersect_n(&leaves);
            (!leaf.is_empty()).then_some(Child::Leaf(leaf))
        } else {
            let inner: SmallVec<[&TrieNode; INLINE_OPERANDS]> = children
                .iter()
                .map(|c| c.as_inner().expect("intersect_nodes: expected an inner child"))
                .collect();
            intersect_nodes(&inner).map(Child::Inner)
        };

        match child {
            Some(child) => result.children.push(Entry { index, child }),
            // Every operand has this slot, but the slots themselves share nothing.
            None => result.presence.remove(index),
        }
    }

    debug_assert_eq!(result.children.len(), result.presence.len());
    if result.presence.is_empty() {
        None
    } else {
        Some(result)
    }
}
