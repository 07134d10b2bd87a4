//! Streaming tokenizer and normalizer.
//!
//! Converts raw bytes into an ordered sequence of normalized word tokens
//! with line positions. The stream is processed a line at a time with a
//! one-token carry for words hyphenated across a line break, so inputs never
//! need to be held in memory whole. Ignorable license-file preambles and
//! copyright lines are dropped here; a removed copyright line is reported as
//! a `Copyright` pseudo-match on the resulting document.

use std::collections::HashMap;
use std::io::{self, BufRead};

use once_cell::sync::Lazy;
use regex::Regex;

use super::Match;

/// A normalized word with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub text: String,
    pub line: usize,
}

/// Tokenizer output: the token stream plus pseudo-matches for recognized
/// non-license features.
#[derive(Debug, Default)]
pub(crate) struct Document {
    pub tokens: Vec<Token>,
    pub copyrights: Vec<Match>,
}

/// Leading characters that encode comment syntax, bullets, or horizontal
/// rules rather than words.
const COMMENT_CHARS: &[char] = &['*', '·', '•', '-', '=', '/', '#', ';', '%', '|', '\\'];

/// A leading list enumerator: digits with dots ("1.", "1.2.3."), roman
/// numerals ("iv."), or a single letter, each requiring a trailing '.' or
/// ')'; or a single parenthesized character ("(a)"). Multi-letter
/// parenthesized forms such as "(ii)" are internal references and are kept.
static ENUMERATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)*[.)]|[ivxlcdm]+[.)]|[a-z][.)]|\(\w\))$")
        .expect("invalid enumerator pattern")
});

/// Whole lines that carry no license semantics and are removed before
/// tokenization.
static IGNORABLE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(?:the )?mit license(?: \(mit\))?$",
        r"^(?:new |revised |modified |three clause |3 clause )?bsd license$",
        r"^copyright and permission notice$",
        r"^(?:all|some) rights? reserved\.?$",
        r"^@license\b",
        r"^\d{4}-\d{2}-\d{2}$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid ignorable pattern"))
    .collect()
});

/// A copyright declaration line. Removal of such a line emits a `Copyright`
/// pseudo-match recording where it stood.
static COPYRIGHT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^copyright (?:\(c\) )?(?:\d{4}|\[yyyy\]|<year>)")
        .expect("invalid copyright pattern")
});

/// Digit-led tokens survive only in version shape: digits joined by single
/// dots or dashes.
pub(crate) static VERSION_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:[.-]\d+)*$").expect("invalid version pattern"));

/// British and American spelling pairs folded to one canonical form.
static EQUIVALENCES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("acknowledgment", "acknowledgement"),
        ("analogue", "analog"),
        ("analyse", "analyze"),
        ("artefact", "artifact"),
        ("authorisation", "authorization"),
        ("calibre", "caliber"),
        ("cancelled", "canceled"),
        ("catalogue", "catalog"),
        ("centre", "center"),
        ("emphasised", "emphasized"),
        ("favour", "favor"),
        ("favourite", "favorite"),
        ("fulfil", "fulfill"),
        ("fulfilment", "fulfillment"),
        ("initialise", "initialize"),
        ("judgment", "judgement"),
        ("labelling", "labeling"),
        ("labour", "labor"),
        ("licence", "license"),
        ("maximise", "maximize"),
        ("minimise", "minimize"),
        ("modelled", "modeled"),
        ("modelling", "modeling"),
        ("optimise", "optimize"),
        ("organisation", "organization"),
        ("organise", "organize"),
        ("practise", "practice"),
        ("programme", "program"),
        ("realise", "realize"),
        ("recognise", "recognize"),
        ("signalling", "signaling"),
        ("utilisation", "utilization"),
        ("whilst", "while"),
        ("wilful", "wilfull"),
    ])
});

/// Word pairs that fold into a single canonical token.
const BIGRAMS: &[(&str, &str, &str)] = &[
    ("per", "cent", "percent"),
    ("sub", "license", "sublicense"),
];

/// Tokenizes an in-memory byte slice. Never fails; malformed UTF-8 is
/// replaced, and any byte sequence yields some document, possibly empty.
pub(crate) fn tokenize_bytes(data: &[u8]) -> Document {
    match tokenize_stream(data) {
        Ok(doc) => doc,
        // Reading from a slice cannot fail.
        Err(_) => Document::default(),
    }
}

/// Tokenizes a stream line by line. I/O errors are propagated so callers do
/// not mistake truncated input for absence of a license.
pub(crate) fn tokenize_stream<R: BufRead>(mut reader: R) -> io::Result<Document> {
    let mut state = StreamTokenizer::default();
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        state.feed_line(line.trim_end_matches(|c| c == '\n' || c == '\r'));
    }
    Ok(state.finish())
}

#[derive(Default)]
struct StreamTokenizer {
    tokens: Vec<Token>,
    copyrights: Vec<Match>,
    /// Word hyphenated at the previous line break, dash already removed,
    /// waiting for its continuation.
    pending: Option<Token>,
    line: usize,
}

impl StreamTokenizer {
    fn feed_line(&mut self, raw: &str) {
        self.line += 1;
        if self.line == 1 && raw.starts_with("#!") {
            return;
        }

        let lower = normalize_punctuation(raw).to_lowercase();
        let stripped = strip_line_prefix(&lower);
        let body = strip_enumerator(stripped).trim();
        if body.is_empty() {
            return;
        }
        if COPYRIGHT_LINE.is_match(body) {
            self.copyrights.push(Match::copyright(self.line));
            return;
        }
        if IGNORABLE.iter().any(|re| re.is_match(body)) {
            return;
        }

        let words: Vec<&str> = body.split_whitespace().collect();
        for (i, word) in words.iter().enumerate() {
            let (joined, line) = if i == 0 {
                match self.pending.take() {
                    Some(p) => (format!("{}{}", p.text, word), p.line),
                    None => (word.to_string(), self.line),
                }
            } else {
                (word.to_string(), self.line)
            };
            if i + 1 == words.len() && joined.len() > 1 && joined.ends_with('-') {
                self.pending = Some(Token {
                    text: joined[..joined.len() - 1].to_string(),
                    line,
                });
                continue;
            }
            self.push_word(&joined, line);
        }
    }

    fn push_word(&mut self, word: &str, line: usize) {
        let cleaned = cleanup_token(word);
        let Some(first) = cleaned.chars().next() else {
            return;
        };
        if first.is_ascii_digit() && !VERSION_SHAPE.is_match(&cleaned) {
            return;
        }
        let folded: &str = EQUIVALENCES
            .get(cleaned.as_str())
            .copied()
            .unwrap_or(cleaned.as_str());

        let bigram = self.tokens.last().and_then(|last| {
            BIGRAMS
                .iter()
                .find(|&&(a, b, _)| last.text == a && folded == b)
                .map(|&(_, _, merged)| (last.line, merged))
        });
        if let Some((first_line, merged)) = bigram {
            self.tokens.pop();
            self.tokens.push(Token {
                text: merged.to_string(),
                line: first_line,
            });
            return;
        }
        self.tokens.push(Token {
            text: folded.to_string(),
            line,
        });
    }

    fn finish(mut self) -> Document {
        if let Some(p) = self.pending.take() {
            self.push_word(&p.text, p.line);
        }
        Document {
            tokens: self.tokens,
            copyrights: self.copyrights,
        }
    }
}

/// Replaces unicode punctuation equivalents with their ASCII canonicals.
fn normalize_punctuation(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2212}' => {
                out.push('-')
            }
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '`' | '\u{00B4}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => out.push('"'),
            '\u{00A9}' => out.push_str("(c)"),
            '\u{00A7}' | '\u{00A4}' => out.push_str("(s)"),
            '\u{00A0}' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Strips bullet and comment syntax from the start of a line.
fn strip_line_prefix(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_whitespace() || COMMENT_CHARS.contains(&c))
}

/// Removes a single leading list enumerator. Version numbers are not
/// enumerators: "2.7.8 is recent" keeps its number, "1.2.3. some header"
/// loses it.
fn strip_enumerator(line: &str) -> &str {
    let mut parts = line.splitn(2, char::is_whitespace);
    if let Some(first) = parts.next() {
        if ENUMERATOR.is_match(first) {
            return parts.next().map(str::trim_start).unwrap_or("");
        }
    }
    line
}

/// Reduces a raw word to its significant characters. Words keep only
/// letters; tokens led by a digit keep digits, dots, and dashes, which is
/// enough to preserve version numbers while shedding inconsistent
/// punctuation.
fn cleanup_token(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let digit_led = word.chars().next().is_some_and(|c| c.is_ascii_digit());
    if !digit_led {
        out.extend(word.chars().filter(|c| c.is_alphabetic()));
        return out;
    }
    out.extend(
        word.chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-'),
    );
    while out.ends_with('.') || out.ends_with('-') {
        out.pop();
    }
    out
}
