//! Indexed document representation.
//!
//! An indexed document is the canonical per-document form used by the
//! matching pipeline: the ordered token sequence with line positions, the
//! per-ID frequency table used for the cheap candidate filter, and any
//! copyright pseudo-matches the tokenizer recognized along the way.

use std::collections::HashMap;

use super::searchset::SearchSet;
use super::{Match, Matches};

/// One token of an indexed document. The token's position in the document is
/// its index in the owning vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexedToken {
    /// Dictionary ID of the normalized word.
    pub id: u32,
    /// 1-based line in the original text.
    pub line: usize,
}

/// Tokenized form of a text, plus derived lookup structures.
///
/// The token sequence and frequency table never change after construction.
/// The search set is built eagerly for corpus documents and on demand for
/// query documents.
#[derive(Debug, Clone)]
pub(crate) struct IndexedDocument {
    pub tokens: Vec<IndexedToken>,
    ids: Vec<u32>,
    freq: HashMap<u32, u32>,
    pub copyrights: Matches,
    pub searchset: Option<SearchSet>,
}

impl IndexedDocument {
    pub fn new(tokens: Vec<IndexedToken>, copyrights: Vec<Match>) -> Self {
        let ids: Vec<u32> = tokens.iter().map(|t| t.id).collect();
        let mut freq = HashMap::new();
        for &id in &ids {
            *freq.entry(id).or_insert(0u32) += 1;
        }
        Self {
            tokens,
            ids,
            freq,
            copyrights,
            searchset: None,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token IDs in document order.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn frequencies(&self) -> &HashMap<u32, u32> {
        &self.freq
    }

    /// Fraction of `source`'s token multiset that is covered by this
    /// document's multiset. Monotone in coverage and cheap to compute, this
    /// is the first-pass filter that excludes most corpus entries before any
    /// search set work happens.
    pub fn token_similarity(&self, source: &IndexedDocument) -> f64 {
        if source.is_empty() {
            return 0.0;
        }
        let mut matched = 0u32;
        for (id, &count) in &source.freq {
            matched += count.min(self.freq.get(id).copied().unwrap_or(0));
        }
        f64::from(matched) / source.len() as f64
    }

    /// Builds the search set at window size `q` if it is not present yet.
    pub fn generate_searchset(&mut self, q: usize) {
        if self.searchset.is_none() {
            self.searchset = Some(SearchSet::new(&self.ids, q));
        }
    }
}

/// Derives the q-gram window size from the confidence threshold. A tighter
/// threshold tolerates fewer edits, so longer windows can be required before
/// a candidate is worth diffing.
pub(crate) fn compute_q(threshold: f64) -> usize {
    if threshold >= 1.0 {
        return 10;
    }
    if threshold <= 0.0 {
        return 1;
    }
    ((threshold / (1.0 - threshold)).floor() as i64).clamp(1, 10) as usize
}
