//! Machine-readable result records.
//!
//! The JSON report is a list of per-file records sorted by filepath, each
//! carrying that file's classifications sorted by starting line. License
//! text is re-read from the scanned file by line range and only included on
//! request.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use crate::scanner::FileResult;

#[derive(Debug, Serialize)]
pub struct Classification {
    pub name: String,
    pub confidence: f64,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileClassifications {
    pub filepath: String,
    pub classifications: Vec<Classification>,
}

/// Builds the JSON report from a batch's results.
pub fn json_result(
    results: &[FileResult],
    include_text: bool,
) -> io::Result<Vec<FileClassifications>> {
    let mut by_file: BTreeMap<String, Vec<Classification>> = BTreeMap::new();
    for result in results {
        let classifications = by_file
            .entry(result.path.to_string_lossy().into_owned())
            .or_default();
        for m in &result.matches {
            let text = if include_text {
                Some(read_file_lines(&result.path, m.start_line, m.end_line)?)
            } else {
                None
            };
            classifications.push(Classification {
                name: m.name.clone(),
                confidence: m.confidence,
                start_line: m.start_line,
                end_line: m.end_line,
                text,
            });
        }
    }

    Ok(by_file
        .into_iter()
        .map(|(filepath, mut classifications)| {
            classifications.sort_by(|a, b| {
                a.start_line
                    .cmp(&b.start_line)
                    .then_with(|| b.end_line.cmp(&a.end_line))
            });
            FileClassifications {
                filepath,
                classifications,
            }
        })
        .collect())
}

/// Reads the 1-based inclusive line range `[start_line, end_line]` of a
/// file. Fails when the file is shorter than the requested range.
fn read_file_lines(path: &Path, start_line: usize, end_line: usize) -> io::Result<String> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = String::new();
    let mut last = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        last = line_no;
        if line_no > end_line {
            break;
        }
        if line_no >= start_line {
            out.push_str(&line?);
            out.push('\n');
        }
    }
    if last < end_line {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "{} ends at line {last}, but the match extends to line {end_line}",
                path.display()
            ),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Match, MatchType};
    use std::fs;
    use std::path::PathBuf;

    fn mk_match(name: &str, start_line: usize, end_line: usize) -> Match {
        Match {
            name: name.to_string(),
            variant: "default.txt".to_string(),
            match_type: MatchType::License,
            confidence: 1.0,
            start_line,
            end_line,
            start_token_index: 0,
            end_token_index: 10,
        }
    }

    #[test]
    fn test_json_result_sorted_by_filepath_then_line() {
        let results = vec![
            FileResult {
                path: PathBuf::from("b.txt"),
                matches: vec![mk_match("MIT", 5, 10), mk_match("Apache-2.0", 1, 4)],
            },
            FileResult {
                path: PathBuf::from("a.txt"),
                matches: vec![mk_match("MIT", 1, 12)],
            },
        ];
        let report = json_result(&results, false).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].filepath, "a.txt");
        assert_eq!(report[1].filepath, "b.txt");
        assert_eq!(report[1].classifications[0].name, "Apache-2.0");
        assert_eq!(report[1].classifications[1].name, "MIT");
    }

    #[test]
    fn test_json_serialization_omits_absent_text() {
        let results = vec![FileResult {
            path: PathBuf::from("a.txt"),
            matches: vec![mk_match("MIT", 1, 2)],
        }];
        let report = json_result(&results, false).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        let record = &value[0]["classifications"][0];
        assert_eq!(record["name"], "MIT");
        assert_eq!(record["confidence"], 1.0);
        assert_eq!(record["start_line"], 1);
        assert!(record.get("text").is_none());
    }

    #[test]
    fn test_include_text_reads_line_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LICENSE");
        fs::write(&path, "first\nsecond\nthird\nfourth\n").unwrap();

        let results = vec![FileResult {
            path: path.clone(),
            matches: vec![mk_match("MIT", 2, 3)],
        }];
        let report = json_result(&results, true).unwrap();
        assert_eq!(
            report[0].classifications[0].text.as_deref(),
            Some("second\nthird\n")
        );
    }

    #[test]
    fn test_include_text_fails_past_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LICENSE");
        fs::write(&path, "only line\n").unwrap();

        let results = vec![FileResult {
            path,
            matches: vec![mk_match("MIT", 1, 9)],
        }];
        assert!(json_result(&results, true).is_err());
    }
}
