//! Per-stage wall-time capture.
//!
//! Cross-cutting instrumentation, not a pipeline invariant: each stage call
//! is wrapped in [`StageTimings::record`], and the ordered records are read
//! back for reporting.

use std::time::{Duration, Instant};

use crate::diagnostics::Stage;

#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    entries: Vec<(Stage, Duration)>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` and record its duration under `stage`.
    pub fn record<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        self.entries.push((stage, started.elapsed()));
        result
    }

    /// Records in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, Duration)> + '_ {
        self.entries.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a StageTimings {
    type Item = (Stage, Duration);
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, (Stage, Duration)>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_stages_in_capture_order() {
        let mut timings = StageTimings::new();
        let first = timings.record(Stage::Lexer, || 1);
        let second = timings.record(Stage::Parser, || 2);
        assert_eq!((first, second), (1, 2));
        let stages: Vec<Stage> = timings.iter().map(|(stage, _)| stage).collect();
        assert_eq!(stages, [Stage::Lexer, Stage::Parser]);
    }

    #[test]
    fn repeated_stages_keep_separate_records() {
        let mut timings = StageTimings::new();
        timings.record(Stage::Cfg, || ());
        timings.record(Stage::Cfg, || ());
        assert_eq!(timings.iter().count(), 2);
    }
}
