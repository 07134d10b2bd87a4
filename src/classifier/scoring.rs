//! Word-level diffing and candidate scoring.
//!
//! A candidate span is scored by diffing its token sequence against the
//! whole corpus entry and weighing the edits at word granularity. A policy
//! table turns a handful of semantically unacceptable edits into hard
//! rejections: changing the number after "version", adding or removing the
//! "lesser" or "affero" GPL modifiers, and introducing the license's own
//! name. Everything else just counts toward the edit distance.

use similar::{capture_diff_slices, Algorithm, DiffOp};

use super::dictionary::Dictionary;
use super::document::IndexedDocument;
use super::tokenizer::VERSION_SHAPE;
use super::trace::{Tracer, PHASE_SCORE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiffKind {
    Equal,
    Insert,
    Delete,
}

/// One run of the word-level diff. `Insert` text exists only in the corpus
/// entry, `Delete` text only in the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WordDiff {
    pub op: DiffKind,
    pub text: String,
}

impl WordDiff {
    pub fn new(op: DiffKind, text: impl Into<String>) -> Self {
        Self {
            op,
            text: text.into(),
        }
    }
}

/// Outcome of the diff policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiffVerdict {
    /// Acceptable edits with their word-level Levenshtein distance.
    Distance(usize),
    /// An edit changed the numeric token following "version".
    VersionChange,
    /// An edit added or removed a "lesser" or "affero" modifier next to the
    /// GPL family name.
    NameChange,
    /// The license's own name was introduced next to a "license" stem.
    IntroducedPhrase,
}

/// Diffs the target span `[start, end)` against the whole of `source` at
/// word granularity, rendering token IDs back to words for the policy
/// checks. Unknown query words render as the sentinel word and can never
/// equal corpus text.
pub(crate) fn doc_diff(
    target: &IndexedDocument,
    start: usize,
    end: usize,
    source: &IndexedDocument,
    dict: &Dictionary,
) -> Vec<WordDiff> {
    let old = &target.ids()[start..end];
    let new = source.ids();
    let words = |ids: &[u32]| {
        ids.iter()
            .map(|&id| dict.get_word(id))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut out = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, old, new) {
        match op {
            DiffOp::Equal {
                new_index, len, ..
            } => out.push(WordDiff::new(DiffKind::Equal, words(&new[new_index..new_index + len]))),
            DiffOp::Delete {
                old_index, old_len, ..
            } => out.push(WordDiff::new(DiffKind::Delete, words(&old[old_index..old_index + old_len]))),
            DiffOp::Insert {
                new_index, new_len, ..
            } => out.push(WordDiff::new(DiffKind::Insert, words(&new[new_index..new_index + new_len]))),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                out.push(WordDiff::new(DiffKind::Delete, words(&old[old_index..old_index + old_len])));
                out.push(WordDiff::new(DiffKind::Insert, words(&new[new_index..new_index + new_len])));
            }
        }
    }
    out
}

pub(crate) fn word_len(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Word-level Levenshtein distance of a diff. A paired deletion and
/// insertion encodes a substitution and costs the larger of the two sides.
pub(crate) fn diff_levenshtein_word(diffs: &[WordDiff]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < diffs.len() {
        let d = &diffs[i];
        match d.op {
            DiffKind::Equal => i += 1,
            DiffKind::Insert | DiffKind::Delete => {
                if let Some(next) = diffs.get(i + 1) {
                    if next.op != DiffKind::Equal && next.op != d.op {
                        total += word_len(&d.text).max(word_len(&next.text));
                        i += 2;
                        continue;
                    }
                }
                total += word_len(&d.text);
                i += 1;
            }
        }
    }
    total
}

/// Applies the diff policy table, then falls back to the numeric distance.
pub(crate) fn score_diffs(license: &str, diffs: &[WordDiff]) -> DiffVerdict {
    let license_lower = license.to_lowercase();
    let mut prev_equal = "";
    for (i, d) in diffs.iter().enumerate() {
        if d.op == DiffKind::Equal {
            prev_equal = &d.text;
            continue;
        }
        let first = d.text.split_whitespace().next().unwrap_or("");
        let prev_last = prev_equal.split_whitespace().next_back().unwrap_or("");
        let next_first = diffs[i + 1..]
            .iter()
            .find(|n| n.op == DiffKind::Equal)
            .and_then(|n| n.text.split_whitespace().next())
            .unwrap_or("");

        if prev_last == "version" && VERSION_SHAPE.is_match(first) {
            return DiffVerdict::VersionChange;
        }
        if (contains_word(&d.text, "lesser") || contains_word(&d.text, "affero"))
            && (prev_last == "gnu"
                || prev_last == "gpl"
                || next_first == "gnu"
                || next_first == "gpl"
                || next_first == "general")
        {
            return DiffVerdict::NameChange;
        }
        if d.op == DiffKind::Insert
            && !license_lower.is_empty()
            && prev_last.starts_with("licen")
            && d.text.contains(&license_lower)
        {
            return DiffVerdict::IntroducedPhrase;
        }
    }
    DiffVerdict::Distance(diff_levenshtein_word(diffs))
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split_whitespace().any(|w| w == word)
}

/// Confidence for a known text of `klen` words at the given edit distance.
pub(crate) fn confidence_percentage(klen: usize, distance: usize) -> f64 {
    if klen == 0 {
        return if distance == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - distance as f64 / klen as f64).max(0.0)
}

/// Locates the window of diff operations that spans the known text: the
/// first operation carrying source words through the one where the source
/// is fully covered. Operations outside the window are target-only
/// deletions.
pub(crate) fn diff_range(known_len: usize, diffs: &[WordDiff]) -> (usize, usize) {
    let mut start = 0;
    let mut found = false;
    let mut covered = 0;
    let mut end = diffs.len();
    for (i, d) in diffs.iter().enumerate() {
        if d.op == DiffKind::Delete {
            continue;
        }
        if !found {
            start = i;
            found = true;
        }
        covered += word_len(&d.text);
        if covered >= known_len {
            end = i + 1;
            break;
        }
    }
    (start, end)
}

/// Scores the candidate target span `[t_start, t_end)` against `source`.
/// Returns the confidence and the number of target tokens to trim from each
/// end so the reported span hugs matched text. Policy rejections come back
/// as confidence 0.
pub(crate) fn score(
    name: &str,
    target: &IndexedDocument,
    t_start: usize,
    t_end: usize,
    source: &IndexedDocument,
    dict: &Dictionary,
    tracer: &Tracer,
) -> (f64, usize, usize) {
    let tlen = t_end - t_start;
    if tlen == 0 || source.is_empty() {
        let conf = if tlen == 0 && source.is_empty() { 1.0 } else { 0.0 };
        return (conf, 0, 0);
    }

    let diffs = doc_diff(target, t_start, t_end, source, dict);
    let (ds, de) = diff_range(source.len(), &diffs);
    let start_offset: usize = diffs[..ds].iter().map(|d| word_len(&d.text)).sum();
    let end_offset: usize = diffs[de..].iter().map(|d| word_len(&d.text)).sum();

    match score_diffs(name, &diffs[ds..de]) {
        DiffVerdict::Distance(distance) => {
            let trimmed = tlen.saturating_sub(start_offset + end_offset);
            let conf = confidence_percentage(source.len().max(trimmed), distance);
            tracer.trace(PHASE_SCORE, name, || {
                format!("distance {distance}, confidence {conf:.4}")
            });
            (conf, start_offset, end_offset)
        }
        verdict => {
            tracer.trace(PHASE_SCORE, name, || format!("rejected: {verdict:?}"));
            (0.0, 0, 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use DiffKind::{Delete, Equal, Insert};

    fn diff(op: DiffKind, text: &str) -> WordDiff {
        WordDiff::new(op, text)
    }

    #[test]
    fn test_word_len() {
        assert_eq!(word_len("short string"), 2);
        assert_eq!(word_len(""), 0);
        assert_eq!(word_len("word"), 1);
    }

    #[test]
    fn test_diff_levenshtein_word() {
        let tests: [(&str, Vec<WordDiff>, usize); 4] = [
            (
                "identical text",
                vec![diff(Equal, "equivalent text")],
                0,
            ),
            (
                // Adjacent inverse changes score as the larger side.
                "changed text",
                vec![
                    diff(Delete, "removed words"),
                    diff(Insert, "inserted text here"),
                ],
                3,
            ),
            (
                "inserted text",
                vec![diff(Equal, "identical words"), diff(Insert, "inserted")],
                1,
            ),
            (
                "deleted text",
                vec![
                    diff(Delete, "many extraneous deleted words"),
                    diff(Equal, "before the equivalent text"),
                ],
                4,
            ),
        ];
        for (name, diffs, expected) in tests {
            assert_eq!(diff_levenshtein_word(&diffs), expected, "{name}");
        }
    }

    #[test]
    fn test_score_diffs_policy() {
        let tests: [(&str, &str, Vec<WordDiff>, DiffVerdict); 6] = [
            ("identical text", "", vec![], DiffVerdict::Distance(0)),
            (
                "acceptable change",
                "",
                vec![
                    diff(Equal, "license"),
                    diff(Insert, "as needed"),
                    diff(Delete, "when necessary"),
                ],
                DiffVerdict::Distance(2),
            ),
            (
                "version change",
                "",
                vec![diff(Equal, "version"), diff(Insert, "2")],
                DiffVerdict::VersionChange,
            ),
            (
                "license name change by deletion",
                "",
                vec![diff(Equal, "gnu"), diff(Delete, "lesser")],
                DiffVerdict::NameChange,
            ),
            (
                "license name change by insertion",
                "",
                vec![diff(Equal, "gnu"), diff(Insert, "lesser")],
                DiffVerdict::NameChange,
            ),
            (
                "license name change by name insertion",
                "ImageMagick",
                vec![diff(Equal, "license"), diff(Insert, "imagemagick")],
                DiffVerdict::IntroducedPhrase,
            ),
        ];
        for (name, license, diffs, expected) in tests {
            assert_eq!(score_diffs(license, &diffs), expected, "{name}");
        }
    }

    #[test]
    fn test_confidence_percentage() {
        assert_eq!(confidence_percentage(0, 0), 1.0);
        assert_eq!(confidence_percentage(100, 1), 0.99);
        assert_eq!(confidence_percentage(10, 20), 0.0);
    }

    #[test]
    fn test_diff_range() {
        let gettysburg_len = 5;
        let tests: [(&str, Vec<WordDiff>, usize, usize); 4] = [
            (
                "identical",
                vec![diff(Equal, "one two three four five")],
                0,
                1,
            ),
            (
                "extra at beginning",
                vec![
                    diff(Delete, "in the UNKNOWN"),
                    diff(Equal, "one two three four five"),
                ],
                1,
                2,
            ),
            (
                "extra at end",
                vec![
                    diff(Equal, "one two three four five"),
                    diff(Delete, "in the UNKNOWN"),
                ],
                0,
                1,
            ),
            (
                "completely different",
                vec![diff(Delete, "UNKNOWN"), diff(Insert, "that")],
                1,
                2,
            ),
        ];
        for (name, diffs, want_start, want_end) in tests {
            let known = if name == "completely different" {
                1
            } else {
                gettysburg_len
            };
            let (start, end) = diff_range(known, &diffs);
            assert_eq!((start, end), (want_start, want_end), "{name}");
        }
    }

    fn score_pair(known: &str, unknown: &str) -> (f64, usize, usize) {
        let mut c = Classifier::new(0.8);
        c.add_content("test", "known", "default.txt", known.as_bytes());
        let kd = c.corpus_document("test/known/default.txt").unwrap();
        let ud = c.create_target_document(unknown.as_bytes());
        score(
            "known",
            &ud,
            0,
            ud.len(),
            kd,
            c.dictionary(),
            &Tracer::default(),
        )
    }

    #[test]
    fn test_score_identical_text() {
        let (conf, so, eo) = score_pair("here is some sample text", "here is some sample text");
        assert_eq!((conf, so, eo), (1.0, 0, 0));
    }

    #[test]
    fn test_score_close_match_with_matching_sizes() {
        let (conf, so, eo) = score_pair("here is some sample text", "here is different sample text");
        assert_eq!((conf, so, eo), (0.8, 0, 0));
    }

    #[test]
    fn test_score_close_match_with_different_sizes() {
        let (conf, so, eo) = score_pair(
            "here is some sample text",
            "padding before here is different sample text",
        );
        assert_eq!((conf, so, eo), (0.8, 2, 0));
    }

    #[test]
    fn test_score_rejects_unacceptable_diff() {
        let (conf, so, eo) = score_pair(
            "here is some sample text for version 2 of the license",
            "padding before here is different sample text for version 3 of the licenses",
        );
        assert_eq!((conf, so, eo), (0.0, 0, 0));
    }

    #[test]
    fn test_doc_diff_renders_unknown_words() {
        let mut c = Classifier::new(0.8);
        c.add_content("test", "known", "default.txt", b"four score and seven years");
        let kd = c.corpus_document("test/known/default.txt").unwrap();
        let ud = c.create_target_document(b"wholly unrelated four score and seven years");
        let diffs = doc_diff(&ud, 0, ud.len(), kd, c.dictionary());
        assert_eq!(
            diffs,
            vec![
                diff(Delete, "UNKNOWN UNKNOWN"),
                diff(Equal, "four score and seven years"),
            ]
        );
        assert_eq!(diff_range(kd.len(), &diffs), (1, 2));
    }

    #[test]
    fn test_doc_diff_extra_at_both_ends() {
        let mut c = Classifier::new(0.8);
        c.add_content("test", "known", "default.txt", b"alpha beta gamma delta epsilon");
        let kd = c.corpus_document("test/known/default.txt").unwrap();
        let ud =
            c.create_target_document(b"noise ahead alpha beta gamma delta epsilon trailing noise");
        let diffs = doc_diff(&ud, 0, ud.len(), kd, c.dictionary());
        let (start, end) = diff_range(kd.len(), &diffs);
        assert_eq!((start, end), (1, 2));
        let leading: usize = diffs[..start].iter().map(|d| word_len(&d.text)).sum();
        let trailing: usize = diffs[end..].iter().map(|d| word_len(&d.text)).sum();
        assert_eq!((leading, trailing), (2, 2));
    }
}
