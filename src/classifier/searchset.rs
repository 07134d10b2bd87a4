//! q-gram search sets and candidate span recovery.
//!
//! A search set indexes every window of `q` consecutive token IDs by a
//! CRC-32 checksum, plus a ladder of coarser windows (widths n, n/2, n/3, ...
//! down to just above q) so that long identical runs are claimed in a single
//! lookup. The windows form an arena-backed lattice ordered coarse to fine;
//! when a wide window matches, its descendants are skipped via a visited
//! bitset, keeping the traversal linear and deterministic.
//!
//! Matching proceeds in stages: intersect window checksums, coalesce hits
//! that continue the same alignment, locate viable match starts with the
//! threshold's error margin, and fuse the surviving fragments into candidate
//! spans carrying enough claimed tokens to be worth diffing.

use std::collections::HashMap;

use super::trace::{Tracer, PHASE_SEARCHSET};

/// Half-open token index interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TokenRange {
    pub start: usize,
    pub end: usize,
}

/// A pair of corresponding token intervals in source (corpus entry) and
/// target (query), with the number of target tokens the pair accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MatchRange {
    pub src_start: usize,
    pub src_end: usize,
    pub target_start: usize,
    pub target_end: usize,
    pub tokens_claimed: usize,
}

impl MatchRange {
    /// Offset the source text would need in target coordinates for this
    /// fragment's alignment.
    fn alignment(&self) -> i64 {
        self.target_start as i64 - self.src_start as i64
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    checksum: u32,
    start: usize,
    end: usize,
    /// Arena index span of the next finer row's windows contained in this
    /// window.
    children: (u32, u32),
}

#[derive(Debug, Clone)]
struct Row {
    width: usize,
    stride: usize,
    nodes: std::ops::Range<usize>,
}

/// Window index over one document's token IDs.
#[derive(Debug, Clone)]
pub(crate) struct SearchSet {
    q: usize,
    len: usize,
    hashes: HashMap<u32, Vec<TokenRange>>,
    nodes: Vec<Node>,
    rows: Vec<Row>,
}

impl SearchSet {
    pub fn new(ids: &[u32], q: usize) -> Self {
        let len = ids.len();
        let mut set = SearchSet {
            q,
            len,
            hashes: HashMap::new(),
            nodes: Vec::new(),
            rows: Vec::new(),
        };
        if len == 0 {
            return set;
        }
        let q = q.min(len).max(1);
        set.q = q;

        // Coarse widths: len, len/2, len/3, ... while still wider than q.
        let mut widths = Vec::new();
        let mut n = 1;
        loop {
            let w = len / n;
            if w <= q {
                break;
            }
            if widths.last() != Some(&w) {
                widths.push(w);
            }
            n += 1;
        }
        widths.push(q);

        for width in widths {
            let stride = if width == q { 1 } else { (width / 2).max(1) };
            let row_start = set.nodes.len();
            let mut start = 0;
            while start + width <= len {
                let checksum = checksum_of(&ids[start..start + width]);
                set.nodes.push(Node {
                    checksum,
                    start,
                    end: start + width,
                    children: (0, 0),
                });
                set.hashes.entry(checksum).or_default().push(TokenRange {
                    start,
                    end: start + width,
                });
                start += stride;
            }
            set.rows.push(Row {
                width,
                stride,
                nodes: row_start..set.nodes.len(),
            });
        }

        set.link_children();
        set
    }

    /// Records, for every node, which windows of the next finer row fall
    /// inside it. Rows are start-sorted with uniform stride, so each child
    /// set is one contiguous arena span.
    fn link_children(&mut self) {
        for r in 0..self.rows.len().saturating_sub(1) {
            let parent_row = self.rows[r].clone();
            let child_row = self.rows[r + 1].clone();
            let w = child_row.width;
            let stride = child_row.stride;
            let child_count = child_row.nodes.len();
            for idx in parent_row.nodes {
                let (start, end) = (self.nodes[idx].start, self.nodes[idx].end);
                if end < w + start {
                    continue;
                }
                let lo = start.div_ceil(stride);
                let hi = ((end - w) / stride).min(child_count.saturating_sub(1));
                if lo > hi {
                    continue;
                }
                self.nodes[idx].children = (
                    (child_row.nodes.start + lo) as u32,
                    (child_row.nodes.start + hi + 1) as u32,
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    fn qgram_count(&self) -> usize {
        self.rows
            .last()
            .map(|r| r.nodes.len())
            .unwrap_or(0)
    }

    fn mark_descendants(&self, idx: usize, visited: &mut [bool]) {
        let (lo, hi) = self.nodes[idx].children;
        for child in lo as usize..hi as usize {
            if !visited[child] {
                visited[child] = true;
                self.mark_descendants(child, visited);
            }
        }
    }
}

fn checksum_of(ids: &[u32]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for id in ids {
        hasher.update(&id.to_le_bytes());
    }
    hasher.finalize()
}

/// Finds candidate spans of `target` likely to correspond to `src`.
///
/// Returns fused match ranges whose claimed token count clears the
/// threshold; the precise accept or reject decision belongs to the scorer.
pub(crate) fn find_potential_matches(
    src: &SearchSet,
    target: &SearchSet,
    threshold: f64,
    name: &str,
    tracer: &Tracer,
) -> Vec<MatchRange> {
    let matched = match_windows(src, target);
    if matched.is_empty() {
        return Vec::new();
    }
    let matched = coalesce_ranges(matched);
    tracer.trace(PHASE_SEARCHSET, name, || {
        format!("coalesced into {} hash match ranges", matched.len())
    });

    let runs = detect_runs(&matched, target.len, src.len, threshold, src.q);
    if runs.is_empty() {
        tracer.trace(PHASE_SEARCHSET, name, || "no viable runs".to_string());
        return Vec::new();
    }

    let fused = fuse_ranges(&matched, threshold, src.len, &runs);
    tracer.trace(PHASE_SEARCHSET, name, || {
        format!("{} fused candidate ranges", fused.len())
    });
    fused
}

/// Walks the target's window lattice coarse to fine, collecting windows
/// whose checksum also appears in the source. A matched window claims its
/// whole span, so its descendants are skipped.
fn match_windows(src: &SearchSet, target: &SearchSet) -> Vec<MatchRange> {
    let mut visited = vec![false; target.nodes.len()];
    let mut matched = Vec::new();
    for idx in 0..target.nodes.len() {
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        let node = &target.nodes[idx];
        let width = node.end - node.start;
        let Some(src_ranges) = src.hashes.get(&node.checksum) else {
            continue;
        };
        let mut hit = false;
        for sr in src_ranges {
            // A same-hash range of a different width is a collision.
            if sr.end - sr.start != width {
                continue;
            }
            matched.push(MatchRange {
                src_start: sr.start,
                src_end: sr.end,
                target_start: node.start,
                target_end: node.end,
                tokens_claimed: width,
            });
            hit = true;
        }
        if hit {
            target.mark_descendants(idx, &mut visited);
        }
    }
    matched
}

/// Merges overlapping or adjacent hits that continue the same source/target
/// alignment. Hits with different alignments are kept apart so repeated text
/// is never fused across a gap it does not actually span.
fn coalesce_ranges(mut matched: Vec<MatchRange>) -> Vec<MatchRange> {
    matched.sort_by_key(|m| (m.alignment(), m.target_start, m.src_start));
    let mut out: Vec<MatchRange> = Vec::new();
    for m in matched {
        if let Some(last) = out.last_mut() {
            if last.alignment() == m.alignment() && m.target_start <= last.target_end {
                if m.target_end > last.target_end {
                    last.target_end = m.target_end;
                    last.src_end = m.src_end;
                }
                last.tokens_claimed = last.target_end - last.target_start;
                continue;
            }
        }
        out.push(m);
    }
    out.sort_by_key(|m| (m.target_start, m.src_start));
    out
}

/// Determines where in the target a match of the source could legally
/// begin. A window of the source's length starting at `s` is viable when it
/// covers at least `threshold * len` matched positions; viable starts widen
/// match detection by the threshold's error margin, and each maximal run of
/// them is reported ending on a q-gram boundary.
pub(crate) fn detect_runs(
    matched: &[MatchRange],
    target_len: usize,
    src_len: usize,
    threshold: f64,
    q: usize,
) -> Vec<TokenRange> {
    if target_len == 0 || src_len == 0 {
        return Vec::new();
    }
    let mut hits = vec![false; target_len];
    for m in matched {
        for slot in hits
            .iter_mut()
            .take(m.target_end.min(target_len))
            .skip(m.target_start)
        {
            *slot = true;
        }
    }

    let error_margin = (src_len as f64 * (1.0 - threshold)).floor() as usize;
    let needed = src_len.saturating_sub(error_margin).max(1);

    let mut prefix = vec![0usize; target_len + 1];
    for i in 0..target_len {
        prefix[i + 1] = prefix[i] + usize::from(hits[i]);
    }
    let count = |s: usize, e: usize| prefix[e.min(target_len)] - prefix[s.min(target_len)];

    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;
    for s in 0..target_len {
        let viable = count(s, s + src_len) >= needed;
        match (viable, run_start) {
            (true, None) => run_start = Some(s),
            (false, Some(start)) => {
                runs.push(TokenRange {
                    start,
                    end: s - 1 + q,
                });
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push(TokenRange {
            start,
            end: target_len - 1 + q,
        });
    }
    runs
}

/// Fuses short fragments into candidate spans. Fragments are taken in
/// `(target_start, src_start)` order and merged into the first accumulated
/// span they can continue: both coordinate gaps nonnegative and within the
/// error margin. A fused span survives when it claims at least
/// `threshold * src_len` tokens and starts inside a detected run, which
/// makes the result insensitive to the input order of the fragments.
pub(crate) fn fuse_ranges(
    matched: &[MatchRange],
    threshold: f64,
    src_len: usize,
    runs: &[TokenRange],
) -> Vec<MatchRange> {
    let err = (src_len as f64 * (1.0 - threshold)).floor() as i64;
    let mut sorted: Vec<MatchRange> = matched.to_vec();
    sorted.sort_by_key(|m| (m.target_start, m.src_start));

    let mut fused: Vec<MatchRange> = Vec::new();
    'next: for m in sorted {
        for f in fused.iter_mut() {
            // Already accounted for by this span.
            if m.target_start >= f.target_start
                && m.target_end <= f.target_end
                && m.src_start >= f.src_start
                && m.src_end <= f.src_end
            {
                continue 'next;
            }
            let tgap = m.target_start as i64 - f.target_end as i64;
            let sgap = m.src_start as i64 - f.src_end as i64;
            if (0..=err).contains(&tgap) && (0..=err).contains(&sgap) {
                f.target_end = m.target_end;
                f.src_end = m.src_end;
                f.tokens_claimed += m.tokens_claimed;
                continue 'next;
            }
        }
        fused.push(m);
    }

    fused.retain(|f| {
        f.tokens_claimed as f64 >= threshold * src_len as f64
            && runs
                .iter()
                .any(|r| f.target_start >= r.start && f.target_start < r.end)
    });
    fused
}
