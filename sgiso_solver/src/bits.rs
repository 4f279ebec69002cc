//! Bit-parallel primitives: a runtime-sized bitset and an adjacency
//! matrix built out of bitset rows.
//!
//! The row-intersection operation is the hottest thing in the whole
//! solver, so the word loops below are written over zipped slices: no
//! index arithmetic survives into the inner loop.

/// Bits per storage word.
pub(crate) const BITS_PER_WORD: usize = u64::BITS as usize;

/// Largest supported target graph, in words. Exceeding this is a
/// configuration error reported before search starts.
pub(crate) const MAX_TARGET_WORDS: usize = 1024;

/// Largest supported target graph, in vertices.
pub(crate) const MAX_TARGET_VERTICES: usize = MAX_TARGET_WORDS * BITS_PER_WORD;

/// A set of vertex indices, sized once at construction.
///
/// All operations stay O(words) and allocation-free. Sets that take
/// part in a binary operation must have been built with the same
/// capacity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// An empty set able to hold indices `0..bits`.
    pub(crate) fn with_capacity(bits: usize) -> Self {
        BitSet {
            words: vec![0; bits.div_ceil(BITS_PER_WORD)],
        }
    }

    pub(crate) fn set(&mut self, index: usize) {
        self.words[index / BITS_PER_WORD] |= 1u64 << (index % BITS_PER_WORD);
    }

    pub(crate) fn unset(&mut self, index: usize) {
        self.words[index / BITS_PER_WORD] &= !(1u64 << (index % BITS_PER_WORD));
    }

    pub(crate) fn unset_all(&mut self) {
        self.words.fill(0);
    }

    pub(crate) fn test(&self, index: usize) -> bool {
        self.words[index / BITS_PER_WORD] & (1u64 << (index % BITS_PER_WORD)) != 0
    }

    pub(crate) fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub(crate) fn union_with(&mut self, other: &BitSet) {
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= o;
        }
    }

    pub(crate) fn intersect_with(&mut self, other: &BitSet) {
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w &= o;
        }
    }

    pub(crate) fn intersect_with_complement(&mut self, other: &BitSet) {
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w &= !o;
        }
    }

    /// Index of the lowest set bit, if any.
    pub(crate) fn first_set(&self) -> Option<usize> {
        self.first_set_from(0)
    }

    /// Index of the lowest set bit at position `from` or later.
    pub(crate) fn first_set_from(&self, from: usize) -> Option<usize> {
        let mut word_index = from / BITS_PER_WORD;
        if word_index >= self.words.len() {
            return None;
        }

        // mask off bits below `from` in the first word we look at
        let mut word = self.words[word_index] & (u64::MAX << (from % BITS_PER_WORD));
        loop {
            if word != 0 {
                return Some(word_index * BITS_PER_WORD + word.trailing_zeros() as usize);
            }
            word_index += 1;
            if word_index >= self.words.len() {
                return None;
            }
            word = self.words[word_index];
        }
    }

    /// Iterate over the set bits in increasing order.
    pub(crate) fn ones(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

/// Iterator over the set bits of a [`BitSet`].
pub(crate) struct Ones<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.word_index * BITS_PER_WORD + bit)
    }
}

/// An adjacency matrix: one bitset row per vertex, row `v` holding the
/// neighbours of `v`.
#[derive(Clone, Debug)]
pub(crate) struct BitGraph {
    size: usize,
    rows: Vec<BitSet>,
}

impl BitGraph {
    pub(crate) fn new(size: usize) -> Self {
        BitGraph {
            size,
            rows: vec![BitSet::with_capacity(size); size],
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Add a directed edge from `a` to `b`.
    pub(crate) fn add_edge(&mut self, a: usize, b: usize) {
        self.rows[a].set(b);
    }

    /// Add edges in both directions.
    pub(crate) fn add_edge_symmetric(&mut self, a: usize, b: usize) {
        self.rows[a].set(b);
        self.rows[b].set(a);
    }

    pub(crate) fn adjacent(&self, a: usize, b: usize) -> bool {
        self.rows[a].test(b)
    }

    pub(crate) fn degree(&self, v: usize) -> usize {
        self.rows[v].count()
    }

    pub(crate) fn row(&self, v: usize) -> &BitSet {
        &self.rows[v]
    }

    /// Intersect `values` with the neighbourhood row of `v`.
    pub(crate) fn intersect_with_row(&self, v: usize, values: &mut BitSet) {
        values.intersect_with(&self.rows[v]);
    }
}
