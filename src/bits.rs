//! Fixed-width bitsets used as the building blocks of the trie.
//!
//! - [`Bit64`] covers `[0, 64)` in a single word.
//! - [`Bit256`] covers every byte value with four words and is used both as the
//!   presence map of interior nodes and as the bottom-level leaf.
//!
//! Neither type bounds-checks its arguments beyond what the index types enforce:
//! `Bit64` expects bits in `0..64`, which is the caller's responsibility.

use std::fmt;

// =============================================================================
// Configuration
// =============================================================================

/// Number of bits in a single [`Bit64`] word.
pub const WORD_BITS: usize = 64;

/// Number of distinct values a [`Bit256`] can hold (one per byte value).
pub const BYTE_VALUES: usize = 256;

const WORDS: usize = BYTE_VALUES / WORD_BITS;

// =============================================================================
// Population count
// =============================================================================

/// Counts set bits with the parallel (SWAR) reduction.
///
/// Pairs, then nibbles, are summed in place, and the byte lanes are folded into
/// the top byte with a single multiply. Faster than a lookup table at this width.
#[inline]
pub const fn count_ones64(mut n: u64) -> u32 {
    n -= (n >> 1) & 0x5555_5555_5555_5555;
    n = ((n >> 2) & 0x3333_3333_3333_3333) + (n & 0x3333_3333_3333_3333);
    n += n >> 4;
    n &= 0x0f0f_0f0f_0f0f_0f0f;
    n = n.wrapping_mul(0x0101_0101_0101_0101);
    (n >> 56) as u32
}

// =============================================================================
// Bit64
// =============================================================================

/// A set of values in `[0, 64)` stored in one word.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bit64(u64);

impl Bit64 {
    #[inline]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Wraps a raw mask; bit `i` set means `i` is a member.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn add(&mut self, bit: u8) {
        debug_assert!((bit as usize) < WORD_BITS);
        self.0 |= 1u64 << bit;
    }

    #[inline]
    pub fn remove(&mut self, bit: u8) {
        debug_assert!((bit as usize) < WORD_BITS);
        self.0 &= !(1u64 << bit);
    }

    #[inline]
    pub fn contains(self, bit: u8) -> bool {
        debug_assert!((bit as usize) < WORD_BITS);
        self.0 & (1u64 << bit) != 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn len(self) -> usize {
        count_ones64(self.0) as usize
    }

    /// Returns the number of members strictly below `bit`, and whether `bit`
    /// itself is a member.
    ///
    /// For a non-member the rank is the slot it would occupy once added.
    #[inline]
    pub fn position(self, bit: u8) -> (usize, bool) {
        debug_assert!((bit as usize) < WORD_BITS);
        let below = self.0 & ((1u64 << bit) - 1);
        (count_ones64(below) as usize, self.contains(bit))
    }

    #[inline]
    pub fn intersect_with(&mut self, other: Bit64) {
        self.0 &= other.0;
    }

    #[inline]
    pub fn union_with(&mut self, other: Bit64) {
        self.0 |= other.0;
    }

    /// Writes members `>= start` in ascending order into `out`.
    ///
    /// Stops when `out` is full or no members remain, and returns the count written.
    pub fn elements(self, out: &mut [u8], start: u8) -> usize {
        self.fill(out, start, |bit| bit)
    }

    /// Shared scan behind the `elements` family: each member `>= start` is
    /// mapped through `f` before being written.
    #[inline]
    pub(crate) fn fill<T>(self, out: &mut [T], start: u8, mut f: impl FnMut(u8) -> T) -> usize {
        debug_assert!((start as usize) < WORD_BITS);
        let mut rest = self.0 & (!0u64 << start);
        let mut written = 0;
        while rest != 0 && written < out.len() {
            out[written] = f(rest.trailing_zeros() as u8);
            written += 1;
            rest &= rest - 1;
        }
        written
    }
}

impl fmt::Debug for Bit64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bit64({:#018x})", self.0)
    }
}

// =============================================================================
// Bit256
// =============================================================================

/// A set of byte values, `[0, 256)`, as four [`Bit64`] words.
///
/// Word `i` covers `[64 * i, 64 * i + 64)`. Ranks are computed across words, which
/// is what lets trie nodes store only their populated children.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bit256 {
    sets: [Bit64; WORDS],
}

#[inline]
fn split(n: u8) -> (usize, u8) {
    ((n as usize) / WORD_BITS, n % WORD_BITS as u8)
}

impl Bit256 {
    #[inline]
    pub const fn new() -> Self {
        Self {
            sets: [Bit64::new(); WORDS],
        }
    }

    #[inline]
    pub fn add(&mut self, n: u8) {
        let (word, bit) = split(n);
        self.sets[word].add(bit);
    }

    #[inline]
    pub fn remove(&mut self, n: u8) {
        let (word, bit) = split(n);
        self.sets[word].remove(bit);
    }

    #[inline]
    pub fn contains(&self, n: u8) -> bool {
        let (word, bit) = split(n);
        self.sets[word].contains(bit)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(|s| s.is_empty())
    }

    #[inline]
    pub fn clear(&mut self) {
        self.sets = [Bit64::new(); WORDS];
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sets.iter().map(|s| s.len()).sum()
    }

    /// Returns the 0-based rank of `n` among the members, and whether `n` is a
    /// member. If the set is `{3, 8, 15}`, the position of `8` is `(1, true)` and
    /// the position of `9` is `(2, false)`.
    #[inline]
    pub fn position(&self, n: u8) -> (usize, bool) {
        let (word, bit) = split(n);
        let before: usize = self.sets[..word].iter().map(|s| s.len()).sum();
        let (local, present) = self.sets[word].position(bit);
        (before + local, present)
    }

    pub fn intersect_with(&mut self, other: &Bit256) {
        for (mine, theirs) in self.sets.iter_mut().zip(other.sets.iter()) {
            mine.intersect_with(*theirs);
        }
    }

    pub fn union_with(&mut self, other: &Bit256) {
        for (mine, theirs) in self.sets.iter_mut().zip(other.sets.iter()) {
            mine.union_with(*theirs);
        }
    }

    /// `a ∩ b` as a new set.
    pub fn intersection_of(a: &Bit256, b: &Bit256) -> Bit256 {
        let mut out = *a;
        out.intersect_with(b);
        out
    }

    /// Replaces `self` with the intersection of every operand.
    ///
    /// No operands yields the empty set.
    pub fn intersect_n(&mut self, operands: &[&Bit256]) {
        let Some((first, rest)) = operands.split_first() else {
            self.clear();
            return;
        };
        for (i, word) in self.sets.iter_mut().enumerate() {
            *word = first.sets[i];
            for other in rest {
                word.intersect_with(other.sets[i]);
            }
        }
    }

    /// Writes members `>= start` in ascending order into `out`, returning the
    /// number written.
    pub fn elements(&self, out: &mut [u8], start: u8) -> usize {
        self.fill(out, start, |n| n)
    }

    /// Like [`elements`](Self::elements), but widens each member to `u64` and ORs
    /// in `high`. Ancestors use this to rebuild full keys from the leaf byte.
    pub fn elements64(&self, out: &mut [u64], start: u8, high: u64) -> usize {
        self.fill(out, start, |n| high | u64::from(n))
    }

    fn fill<T>(&self, out: &mut [T], start: u8, mut f: impl FnMut(u8) -> T) -> usize {
        let (first, bit) = split(start);
        let mut written = 0;
        for word in first..WORDS {
            if written == out.len() {
                break;
            }
            let from = if word == first { bit } else { 0 };
            let base = (word * WORD_BITS) as u8;
            written += self.sets[word].fill(&mut out[written..], from, |b| f(base | b));
        }
        written
    }

    /// Ascending iterator over the members.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.sets.iter().enumerate().flat_map(|(word, set)| {
            let base = (word * WORD_BITS) as u8;
            let mut rest = set.bits();
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as u8;
                rest &= rest - 1;
                Some(base | bit)
            })
        })
    }
}

impl fmt::Display for Bit256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, n) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{n}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for Bit256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
