//! Token interning.
//!
//! A corpus owns exactly one dictionary. It grows only while corpus entries
//! are loaded and is frozen afterwards; query documents map through it
//! without mutating it, so unknown query words collapse to a sentinel that
//! can never equal a corpus token.

use std::collections::HashMap;

/// Sentinel ID for words that are not present in the dictionary.
pub(crate) const UNKNOWN_INDEX: u32 = 0;

/// Word form of the sentinel, used when rendering diffs.
pub(crate) const UNKNOWN_WORD: &str = "UNKNOWN";

/// Bijection between normalized token text and compact integer IDs.
///
/// IDs start at 1; ID 0 is reserved for [`UNKNOWN_INDEX`].
#[derive(Debug, Clone)]
pub(crate) struct Dictionary {
    words: Vec<String>,
    indices: HashMap<String, u32>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            // Slot 0 holds the sentinel so real IDs index directly.
            words: vec![UNKNOWN_WORD.to_string()],
            indices: HashMap::new(),
        }
    }

    /// Interns `word`, returning its ID. Re-adding an existing word returns
    /// the original ID and leaves the dictionary unchanged.
    pub fn add(&mut self, word: &str) -> u32 {
        if let Some(&id) = self.indices.get(word) {
            return id;
        }
        let id = self.words.len() as u32;
        self.words.push(word.to_string());
        self.indices.insert(word.to_string(), id);
        id
    }

    /// Looks up a word without interning it. Unknown words map to
    /// [`UNKNOWN_INDEX`].
    pub fn get_index(&self, word: &str) -> u32 {
        self.indices.get(word).copied().unwrap_or(UNKNOWN_INDEX)
    }

    /// Returns the word for an ID, or [`UNKNOWN_WORD`] for the sentinel and
    /// for IDs that were never assigned.
    pub fn get_word(&self, id: u32) -> &str {
        if id == UNKNOWN_INDEX {
            return UNKNOWN_WORD;
        }
        self.words
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_WORD)
    }

    /// Number of interned words, not counting the sentinel.
    pub fn len(&self) -> usize {
        self.words.len() - 1
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_dictionary_is_empty() {
        let d = Dictionary::new();
        assert_eq!(d.len(), 0);
    }

    #[test]
    fn test_add_and_lookup() {
        let mut d = Dictionary::new();
        d.add("hello");

        assert_eq!(d.len(), 1);
        assert_eq!(d.get_index("hello"), 1);
        assert_eq!(d.get_word(1), "hello");
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut d = Dictionary::new();
        let first = d.add("hello");
        let second = d.add("hello");

        assert_eq!(first, second);
        assert_eq!(d.len(), 1);
        assert_eq!(d.get_index("hello"), 1);
    }

    #[test]
    fn test_unknown_index_and_word() {
        let mut d = Dictionary::new();
        d.add("hello");

        // Fetching an unassigned ID returns the sentinel word.
        assert_eq!(d.get_word(2), UNKNOWN_WORD);
        // Fetching an unknown word returns the sentinel ID.
        assert_eq!(d.get_index("unknown"), UNKNOWN_INDEX);
        assert_eq!(d.get_word(UNKNOWN_INDEX), UNKNOWN_WORD);
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut d = Dictionary::new();
        assert_eq!(d.add("the"), 1);
        assert_eq!(d.add("awesome"), 2);
        assert_eq!(d.add("project"), 3);
        assert_eq!(d.add("the"), 1);
    }
}
