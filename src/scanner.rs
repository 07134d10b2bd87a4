//! Parallel batch classification.
//!
//! The matching engine is single-threaded per query; parallelism lives
//! here. A bounded worker pool runs up to `num_tasks` file classifications
//! at once (the bound keeps the number of simultaneously open files in
//! check), results are appended to a mutex-guarded accumulator as tasks
//! complete, and an optional deadline cancels whatever has not started yet
//! while keeping everything already collected.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

use crate::classifier::{Classifier, MatchType, Matches};
use crate::error::Error;

/// Options for a classification batch.
#[derive(Debug)]
pub struct ClassifyOptions {
    /// Upper bound on concurrently processed files.
    pub num_tasks: usize,
    /// Report `Header` matches; they are dropped otherwise.
    pub include_headers: bool,
    /// Deadline for the whole batch. In-flight files finish scoring;
    /// everything else is abandoned and reported as cancelled.
    pub timeout: Option<Duration>,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            num_tasks: 1000,
            include_headers: false,
            timeout: None,
        }
    }
}

/// All matches found in one file. Files without matches produce no result.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: PathBuf,
    pub matches: Matches,
}

/// Classifies a batch of files against a shared corpus.
///
/// Per-file read errors are accumulated rather than fatal, so the returned
/// results always reflect every file that could be processed. Result order
/// follows task completion and is not deterministic; callers that need
/// stability sort the returned list.
pub fn classify_files(
    classifier: &Classifier,
    files: &[PathBuf],
    options: &ClassifyOptions,
) -> (Vec<FileResult>, Vec<Error>) {
    let deadline = options.timeout.map(|t| Instant::now() + t);
    let results = Mutex::new(Vec::new());
    let errors = Mutex::new(Vec::new());
    let cancelled = AtomicBool::new(false);

    let work = |path: &PathBuf| {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                cancelled.store(true, Ordering::Relaxed);
                return;
            }
        }
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                lock(&errors).push(Error::FileRead {
                    path: path.clone(),
                    source: e,
                });
                return;
            }
        };
        log::debug!("classifying {}", path.display());
        let mut matches = classifier.match_bytes(&data);
        if !options.include_headers {
            matches.retain(|m| m.match_type != MatchType::Header);
        }
        if matches.is_empty() {
            return;
        }
        lock(&results).push(FileResult {
            path: path.clone(),
            matches,
        });
    };

    let num_threads = options.num_tasks.clamp(1, files.len().max(1));
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
    {
        Ok(pool) => pool.install(|| files.par_iter().for_each(work)),
        Err(e) => {
            log::warn!("could not size a dedicated pool, using the shared one: {e}");
            files.par_iter().for_each(work);
        }
    }

    let results = into_inner(results);
    let mut errors = into_inner(errors);
    if cancelled.into_inner() {
        errors.push(Error::Cancelled {
            completed: results.len(),
            total: files.len(),
        });
    }
    (results, errors)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn into_inner<T>(mutex: Mutex<T>) -> T {
    mutex
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Expands files and directories into the flat list of files to classify.
/// Directories are walked recursively; markdown files and paths fully
/// matching an ignore pattern are skipped.
pub fn expand_paths(paths: &[PathBuf], ignore: &[Regex]) -> Result<Vec<PathBuf>, Error> {
    let mut out = Vec::new();
    for path in paths {
        if !path.is_dir() {
            if !is_ignored(path, ignore) {
                out.push(path.clone());
            }
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let at = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| path.clone());
                Error::FileRead {
                    path: at,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().is_some_and(|ext| ext == "md") {
                continue;
            }
            if is_ignored(entry.path(), ignore) {
                continue;
            }
            out.push(entry.path().to_path_buf());
        }
    }
    Ok(out)
}

fn is_ignored(path: &Path, ignore: &[Regex]) -> bool {
    let text = path.to_string_lossy();
    ignore.iter().any(|re| {
        re.find(&text)
            .is_some_and(|m| m.start() == 0 && m.end() == text.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const NOTICE: &str = "Permission to include this component in any compilation is granted \
without royalty provided the full notice travels with every copy and derived compilation, \
and the component is offered with no warranty of fitness or merchantability whatsoever.";

    const NOTICE_HEADER: &str = "Distributed under the Notice license; consult the full \
notice text shipped alongside this source tree.";

    fn test_classifier() -> Classifier {
        let mut c = Classifier::new(0.8);
        c.add_content("permissive", "Notice-1.0", "default.txt", NOTICE.as_bytes());
        c.add_content("notice", "Notice-1.0", "header.txt", NOTICE_HEADER.as_bytes());
        c
    }

    #[test]
    fn test_classify_files_basic() {
        let c = test_classifier();
        let dir = tempfile::tempdir().unwrap();
        let license_file = dir.path().join("LICENSE");
        let other_file = dir.path().join("notes.txt");
        fs::write(&license_file, NOTICE).unwrap();
        fs::write(&other_file, "meeting moved to thursday bring the slides").unwrap();

        let files = vec![license_file.clone(), other_file];
        let (results, errors) = classify_files(&c, &files, &ClassifyOptions::default());

        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, license_file);
        assert_eq!(results[0].matches[0].name, "Notice-1.0");
        assert_eq!(results[0].matches[0].confidence, 1.0);
    }

    #[test]
    fn test_classify_files_header_gate() {
        let c = test_classifier();
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("lib.c");
        fs::write(&src, format!("/* {NOTICE_HEADER} */\nint main() {{}}\n")).unwrap();
        let files = vec![src];

        let (results, _) = classify_files(&c, &files, &ClassifyOptions::default());
        assert!(results.is_empty(), "headers are dropped by default");

        let options = ClassifyOptions {
            include_headers: true,
            ..ClassifyOptions::default()
        };
        let (results, _) = classify_files(&c, &files, &options);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matches[0].match_type, MatchType::Header);
    }

    #[test]
    fn test_classify_files_accumulates_read_errors() {
        let c = test_classifier();
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("LICENSE");
        fs::write(&good, NOTICE).unwrap();
        let missing = dir.path().join("does-not-exist");

        let (results, errors) = classify_files(&c, &[missing, good], &ClassifyOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::FileRead { .. }));
    }

    #[test]
    fn test_classify_files_deadline() {
        let c = test_classifier();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("LICENSE");
        fs::write(&file, NOTICE).unwrap();

        let options = ClassifyOptions {
            timeout: Some(Duration::ZERO),
            ..ClassifyOptions::default()
        };
        let (results, errors) = classify_files(&c, &[file], &options);
        assert!(results.is_empty());
        assert!(matches!(errors[0], Error::Cancelled { total: 1, .. }));
    }

    #[test]
    fn test_expand_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("LICENSE"), "text").unwrap();
        fs::write(dir.path().join("README.md"), "skipped").unwrap();
        fs::write(dir.path().join("sub/code.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("sub/skip.tmp"), "ignored").unwrap();

        let ignore = vec![Regex::new(r".*\.tmp").unwrap()];
        let files = expand_paths(&[dir.path().to_path_buf()], &ignore).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["LICENSE".to_string(), "sub/code.rs".to_string()]);
    }

    #[test]
    fn test_expand_paths_keeps_explicit_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("anything.bin");
        fs::write(&file, "data").unwrap();
        let files = expand_paths(&[file.clone()], &[]).unwrap();
        assert_eq!(files, vec![file]);
    }
}
