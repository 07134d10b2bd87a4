use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;

use license_classifier::cli::Cli;
use license_classifier::results::json_result;
use license_classifier::scanner::{classify_files, expand_paths, ClassifyOptions};
use license_classifier::{Classifier, Match, MatchType, TraceConfiguration};

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("no licenses identified");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse();

    let mut classifier = Classifier::new(cli.threshold);
    classifier
        .load_licenses(&cli.licenses)
        .context("loading license corpus")?;
    if !cli.trace_phases.is_empty() || !cli.trace_licenses.is_empty() {
        classifier.set_trace_configuration(TraceConfiguration {
            trace_licenses: cli.trace_licenses.clone(),
            trace_phases: cli.trace_phases.clone(),
            tracer: Some(Box::new(|line| eprintln!("{line}"))),
        });
    }

    let ignore = compile_ignore_patterns(&cli.ignore_paths_re)?;
    let files = expand_paths(&cli.paths, &ignore)?;
    log::info!("classifying {} files", files.len());

    let options = ClassifyOptions {
        num_tasks: cli.tasks,
        include_headers: cli.headers,
        timeout: Some(Duration::from_secs(cli.timeout)),
    };
    let (results, errors) = classify_files(&classifier, &files, &options);
    for err in &errors {
        log::error!("classification failed: {err}");
    }

    let mut rows: Vec<(String, &Match)> = results
        .iter()
        .flat_map(|r| {
            r.matches
                .iter()
                .map(move |m| (r.path.display().to_string(), m))
        })
        .collect();
    rows.sort_by(|a, b| {
        b.1.confidence
            .partial_cmp(&a.1.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.end_line.cmp(&b.1.end_line))
    });
    for (file, m) in &rows {
        let name = match m.match_type {
            MatchType::License | MatchType::Header => m.name.clone(),
            other => format!("{other}:{}", m.name),
        };
        println!(
            "{file} {name} (variant: {}, confidence: {:.3}, start: {}, end: {})",
            m.variant, m.confidence, m.start_line, m.end_line
        );
    }

    if let Some(json_path) = &cli.json {
        let report = json_result(&results, cli.include_text).context("building JSON report")?;
        let payload = serde_json::to_string_pretty(&report)?;
        std::fs::write(json_path, payload)
            .with_context(|| format!("writing {}", json_path.display()))?;
        log::info!("JSON output written to {}", json_path.display());
    }

    Ok(!rows.is_empty())
}

fn compile_ignore_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid ignore pattern {p:?}")))
        .collect()
}
