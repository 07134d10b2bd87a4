//! Phase tracing for the matching pipeline.
//!
//! Tracing is configured per classifier instance with an injected sink
//! function plus two membership patterns, one for license names and one for
//! pipeline phases. The default configuration traces nothing, so callers
//! that never touch it pay only a couple of set lookups per phase.

use std::collections::HashSet;
use std::fmt;

/// Sink invoked with each formatted trace line.
pub type TraceFn = Box<dyn Fn(&str) + Send + Sync>;

/// Pipeline phases that emit trace output.
pub(crate) const PHASE_TOKENIZE: &str = "tokenize";
pub(crate) const PHASE_FREQUENCY: &str = "frequency";
pub(crate) const PHASE_SEARCHSET: &str = "searchset";
pub(crate) const PHASE_SCORE: &str = "score";

/// User-facing trace configuration.
///
/// `trace_licenses` and `trace_phases` are comma-separated pattern lists.
/// A pattern is a literal name, a prefix ending in `*`, or a bare `*`
/// matching everything. An absent tracer falls back to `log::debug!`.
pub struct TraceConfiguration {
    pub trace_licenses: String,
    pub trace_phases: String,
    pub tracer: Option<TraceFn>,
}

impl Default for TraceConfiguration {
    fn default() -> Self {
        Self {
            trace_licenses: String::new(),
            trace_phases: String::new(),
            tracer: None,
        }
    }
}

impl fmt::Debug for TraceConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceConfiguration")
            .field("trace_licenses", &self.trace_licenses)
            .field("trace_phases", &self.trace_phases)
            .field("tracer", &self.tracer.as_ref().map(|_| "fn"))
            .finish()
    }
}

/// Compiled pattern list.
#[derive(Debug, Default)]
struct Patterns {
    all: bool,
    literals: HashSet<String>,
    prefixes: Vec<String>,
}

impl Patterns {
    fn parse(list: &str) -> Self {
        let mut out = Patterns::default();
        for pat in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if pat == "*" {
                out.all = true;
            } else if let Some(prefix) = pat.strip_suffix('*') {
                out.prefixes.push(prefix.to_string());
            } else {
                out.literals.insert(pat.to_string());
            }
        }
        out
    }

    fn matches(&self, name: &str) -> bool {
        self.all
            || self.literals.contains(name)
            || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    fn is_empty(&self) -> bool {
        !self.all && self.literals.is_empty() && self.prefixes.is_empty()
    }
}

/// Compiled form of [`TraceConfiguration`] held by a classifier.
pub(crate) struct Tracer {
    licenses: Patterns,
    phases: Patterns,
    sink: Option<TraceFn>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::compile(TraceConfiguration::default())
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("licenses", &self.licenses)
            .field("phases", &self.phases)
            .finish()
    }
}

impl Tracer {
    pub fn compile(tc: TraceConfiguration) -> Self {
        Self {
            licenses: Patterns::parse(&tc.trace_licenses),
            phases: Patterns::parse(&tc.trace_phases),
            sink: tc.tracer,
        }
    }

    /// True when `phase` is traced for `license`. An empty license name
    /// (corpus-wide work) is gated on the phase pattern alone.
    pub fn should_trace(&self, phase: &str, license: &str) -> bool {
        if self.phases.is_empty() {
            return false;
        }
        self.phases.matches(phase) && (license.is_empty() || self.licenses.matches(license))
    }

    /// Emits one trace line if the phase/license combination is enabled.
    /// The message is built lazily so disabled tracing costs nothing.
    pub fn trace(&self, phase: &str, license: &str, msg: impl FnOnce() -> String) {
        if !self.should_trace(phase, license) {
            return;
        }
        let line = msg();
        match &self.sink {
            Some(sink) => sink(&line),
            None => log::debug!(target: "classifier", "[{phase}] {line}"),
        }
    }
}
