//! License text classification engine.
//!
//! A [`Classifier`] owns a corpus of known license texts, all tokenized
//! through one shared dictionary, and answers queries with a list of
//! [`Match`] records. Matching layers cheap exclusion filters over a
//! precise diff: a frequency-table similarity check prunes the corpus, a
//! q-gram search set locates candidate spans that tolerate insertions and
//! deletions, and a word-level diff with an edit policy produces the final
//! confidence. Overlapping candidates are then resolved so each region of
//! the input reports the best covering license.

mod dictionary;
mod document;
mod pq;
mod scoring;
mod searchset;
mod tokenizer;
mod trace;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use walkdir::WalkDir;

use crate::error::Error;
use dictionary::Dictionary;
use document::{compute_q, IndexedDocument, IndexedToken};
use searchset::find_potential_matches;
use trace::{Tracer, PHASE_FREQUENCY, PHASE_TOKENIZE};

pub use trace::{TraceConfiguration, TraceFn};

/// What kind of text a match identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    License,
    Header,
    Copyright,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchType::License => "License",
            MatchType::Header => "Header",
            MatchType::Copyright => "Copyright",
        })
    }
}

/// A single detection in the queried text.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Display name of the license, with internal filename suffixes
    /// stripped.
    pub name: String,
    /// Corpus variant the match came from, e.g. `default.txt` or
    /// `header.txt`.
    pub variant: String,
    pub match_type: MatchType,
    /// In `[0, 1]`; 1.0 is an exact match of the corpus text.
    pub confidence: f64,
    /// 1-based line span in the original input.
    pub start_line: usize,
    pub end_line: usize,
    /// Half-open token index span in the tokenized input.
    pub start_token_index: usize,
    pub end_token_index: usize,
}

impl Match {
    pub(crate) fn copyright(line: usize) -> Self {
        Match {
            name: "Copyright".to_string(),
            variant: String::new(),
            match_type: MatchType::Copyright,
            confidence: 1.0,
            start_line: line,
            end_line: line,
            start_token_index: 0,
            end_token_index: 0,
        }
    }

    fn token_weight(&self) -> f64 {
        (self.end_token_index - self.start_token_index) as f64 * self.confidence
    }
}

pub type Matches = Vec<Match>;

#[derive(Debug)]
struct CorpusEntry {
    name: String,
    variant: String,
    match_type: MatchType,
    doc: IndexedDocument,
}

/// Matches query texts against a corpus of known licenses.
///
/// The corpus is immutable once loading is finished, so a classifier can be
/// shared freely across query workers without synchronization.
#[derive(Debug)]
pub struct Classifier {
    threshold: f64,
    q: usize,
    dict: Dictionary,
    docs: BTreeMap<String, CorpusEntry>,
    tracer: Tracer,
}

impl Classifier {
    /// Creates an empty classifier that reports matches at or above
    /// `threshold` confidence.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            q: compute_q(threshold),
            dict: Dictionary::new(),
            docs: BTreeMap::new(),
            tracer: Tracer::default(),
        }
    }

    pub fn set_trace_configuration(&mut self, tc: TraceConfiguration) {
        self.tracer = Tracer::compile(tc);
    }

    /// Loads a corpus from a directory tree laid out as
    /// `<category>/<name>/<variant>` with license text as file contents.
    pub fn load_licenses(&mut self, root: impl AsRef<Path>) -> Result<(), Error> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::CorpusRoot(root.to_path_buf()));
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                Error::CorpusLoad {
                    path,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let [category, name, variant] = parts.as_slice() else {
                log::warn!(
                    "skipping corpus file outside category/name/variant layout: {}",
                    rel.display()
                );
                continue;
            };
            let data = fs::read(entry.path()).map_err(|e| Error::CorpusLoad {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
            self.add_content(category, name, variant, &data);
        }
        Ok(())
    }

    /// Registers one license text under `category/name/variant`. This is
    /// the only dictionary mutator; the frequency table and search set of
    /// the entry are built eagerly.
    pub fn add_content(&mut self, category: &str, name: &str, variant: &str, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        let text = trim_extraneous_trailing_text(&text);
        let tokenized = tokenizer::tokenize_bytes(text.as_bytes());
        let tokens: Vec<IndexedToken> = tokenized
            .tokens
            .iter()
            .map(|t| IndexedToken {
                id: self.dict.add(&t.text),
                line: t.line,
            })
            .collect();
        let mut doc = IndexedDocument::new(tokens, Vec::new());
        doc.generate_searchset(self.q);

        self.tracer.trace(PHASE_TOKENIZE, name, || {
            format!("corpus entry {category}/{name}/{variant}: {} tokens", doc.len())
        });

        let key = format!("{category}/{name}/{variant}");
        self.docs.insert(
            key,
            CorpusEntry {
                name: display_name(name),
                variant: variant.to_string(),
                match_type: if variant.contains("header") {
                    MatchType::Header
                } else {
                    MatchType::License
                },
                doc,
            },
        );
    }

    /// Reports instances of known licenses in `data`. Never fails; inputs
    /// that tokenize to nothing return an empty list.
    pub fn match_bytes(&self, data: &[u8]) -> Matches {
        self.match_document(self.create_target_document(data))
    }

    /// Like [`Classifier::match_bytes`] but reads the query from a stream.
    /// Read errors are returned instead of a partial result.
    pub fn match_from<R: Read>(&self, reader: R) -> Result<Matches, Error> {
        let tokenized = tokenizer::tokenize_stream(BufReader::new(reader))?;
        Ok(self.match_document(self.index_target(tokenized)))
    }

    fn create_target_document(&self, data: &[u8]) -> IndexedDocument {
        self.index_target(tokenizer::tokenize_bytes(data))
    }

    /// Maps a tokenized query through the frozen dictionary. Words the
    /// corpus never saw collapse to the unknown sentinel.
    fn index_target(&self, tokenized: tokenizer::Document) -> IndexedDocument {
        let tokens: Vec<IndexedToken> = tokenized
            .tokens
            .iter()
            .map(|t| IndexedToken {
                id: self.dict.get_index(&t.text),
                line: t.line,
            })
            .collect();
        IndexedDocument::new(tokens, tokenized.copyrights)
    }

    fn match_document(&self, mut target: IndexedDocument) -> Matches {
        self.tracer.trace(PHASE_TOKENIZE, "", || {
            format!("query tokenized to {} tokens", target.len())
        });
        let copyrights = target.copyrights.clone();

        // First pass: frequency-table similarity excludes most of the
        // corpus before any search set is built.
        let mut first_pass: Vec<&CorpusEntry> = Vec::new();
        for entry in self.docs.values() {
            let sim = target.token_similarity(&entry.doc);
            self.tracer.trace(PHASE_FREQUENCY, &entry.name, || {
                format!("token similarity {sim:.4}")
            });
            if sim >= self.threshold {
                first_pass.push(entry);
            }
        }
        if first_pass.is_empty() {
            return finish_matches(Vec::new(), copyrights);
        }

        // Only now pay for the query's search set.
        target.generate_searchset(self.q);
        let Some(target_set) = target.searchset.as_ref() else {
            return finish_matches(Vec::new(), copyrights);
        };

        let mut candidates: Matches = Vec::new();
        for entry in first_pass {
            let Some(src_set) = entry.doc.searchset.as_ref() else {
                continue;
            };
            for m in
                find_potential_matches(src_set, target_set, self.threshold, &entry.name, &self.tracer)
            {
                let (conf, start_offset, end_offset) = scoring::score(
                    &entry.name,
                    &target,
                    m.target_start,
                    m.target_end,
                    &entry.doc,
                    &self.dict,
                    &self.tracer,
                );
                let start = m.target_start + start_offset;
                let end = m.target_end.saturating_sub(end_offset);
                if conf < self.threshold || end <= start {
                    continue;
                }
                candidates.push(Match {
                    name: entry.name.clone(),
                    variant: entry.variant.clone(),
                    match_type: entry.match_type,
                    confidence: conf,
                    start_line: target.tokens[start].line,
                    end_line: target.tokens[end - 1].line,
                    start_token_index: start,
                    end_token_index: end,
                });
            }
        }

        sort_matches(&mut candidates);
        candidates.dedup_by(|a, b| {
            a.name == b.name
                && a.start_token_index == b.start_token_index
                && a.end_token_index == b.end_token_index
        });
        let retained = resolve_overlaps(candidates);
        finish_matches(retained, copyrights)
    }

    pub(crate) fn q(&self) -> usize {
        self.q
    }

    pub(crate) fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    #[cfg(test)]
    pub(crate) fn corpus_document(&self, key: &str) -> Option<&IndexedDocument> {
        self.docs.get(key).map(|e| &e.doc)
    }
}

/// Highest confidence first, then earliest occurrence, then longest span.
fn match_order(a: &Match, b: &Match) -> std::cmp::Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.start_token_index.cmp(&b.start_token_index))
        .then_with(|| b.end_token_index.cmp(&a.end_token_index))
}

/// Orders matches through the candidate queue; equal keys keep their listed
/// order.
fn sort_matches(matches: &mut Matches) {
    let mut queue = pq::PriorityQueue::new(|a: &(usize, Match), b: &(usize, Match)| {
        match_order(&a.1, &b.1).then(a.0.cmp(&b.0)).is_lt()
    });
    for pair in matches.drain(..).enumerate() {
        queue.push(pair);
    }
    while let Some((_, m)) = queue.pop() {
        matches.push(m);
    }
}

/// Collapses nested and overlapping candidates. Walking in sorted order,
/// each candidate is kept unless an already-retained match claims its
/// region; a candidate that contains an earlier retained match gets a
/// token-weighted contest and evicts it when it carries more matching
/// evidence, which handles licenses that embed other licenses.
fn resolve_overlaps(candidates: Matches) -> Matches {
    let mut retain = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        let c = &candidates[i];
        let mut keep = true;
        let mut eject: Vec<usize> = Vec::new();
        for (j, o) in candidates.iter().enumerate().take(i) {
            if !retain[j] {
                continue;
            }
            if contains(c, o) {
                if c.token_weight() > o.token_weight() {
                    eject.push(j);
                } else {
                    keep = false;
                }
            } else if overlaps(c, o) {
                keep = false;
            }
        }
        if keep {
            retain[i] = true;
            for j in eject {
                retain[j] = false;
            }
        }
    }
    candidates
        .into_iter()
        .zip(retain)
        .filter_map(|(c, keep)| keep.then_some(c))
        .collect()
}

/// Merges copyright pseudo-matches into the resolved list. They describe
/// lines the tokenizer removed, so they bypass overlap resolution.
fn finish_matches(mut resolved: Matches, copyrights: Matches) -> Matches {
    resolved.extend(copyrights);
    sort_matches(&mut resolved);
    resolved
}

/// True when `b` starts inside `a`'s line span.
fn contains(a: &Match, b: &Match) -> bool {
    a.start_line <= b.start_line && a.end_line >= b.start_line
}

fn between(a: usize, b: usize, c: usize) -> bool {
    b <= a && a <= c
}

/// True when either endpoint of `a` lies within `b`'s line span.
fn overlaps(a: &Match, b: &Match) -> bool {
    between(a.start_line, b.start_line, b.end_line)
        || between(a.end_line, b.start_line, b.end_line)
}

/// Produces the display name for a license, removing the internal filename
/// structure: `.txt`, `.header` (with optional tag), and `_no_toc`.
fn display_name(name: &str) -> String {
    let mut out = name;
    for marker in [".txt", ".header", "_no_toc"] {
        if let Some(idx) = out.find(marker) {
            out = &out[..idx];
        }
    }
    out.to_string()
}

/// Cuts appendix material after the end-of-terms marker so only the
/// operative license body is indexed.
fn trim_extraneous_trailing_text(text: &str) -> String {
    match text.find("END OF TERMS AND CONDITIONS") {
        Some(idx) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
