//! Structured records of non-fatal conditions.
//!
//! Operations that can partially succeed take a `&mut dyn DiagnosticSink`
//! and push one [`Diagnostic`] per condition. The records carry a count so
//! callers and tests can check outcomes without parsing log text.

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Placer guard exhausted for `count` fibers.
    PlacementShortfall,
    /// Packer fell back to the placer for a non-circular contour.
    PackerDegraded,
    /// `count` fibers flagged by a collision check.
    CollisionsRemoved,
    /// `count` fibers outside a bounding circle.
    OutliersRemoved,
    /// Expansion factor below 1 was clamped.
    ExpansionClamped,
    /// `count` placed fibers are not inside the current contour.
    OutOfGeometry,
    /// Operation skipped because of the table state.
    NoOp,
    /// A loaded population has no coordinates.
    MissingPositions,
    /// Fit-to-size skipped: the packed population is wider than the contour.
    FitToSizeSkipped,
}

impl DiagnosticKind {
    fn is_warning(self) -> bool {
        !matches!(self, DiagnosticKind::NoOp | DiagnosticKind::MissingPositions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub count: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, count: usize, message: impl Into<String>) -> Self {
        Diagnostic { kind, count, message: message.into() }
    }
}

/// Receiver of non-fatal diagnostics.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Accumulates diagnostics in order and mirrors each one to the `log` facade.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticLog {
    records: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether at least one record of `kind` was reported.
    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.records.iter().any(|d| d.kind == kind)
    }

    /// Sum of the counts of all records of `kind`.
    pub fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.records.iter().filter(|d| d.kind == kind).map(|d| d.count).sum()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.kind.is_warning() {
            warn!("{} ({:?}, count={})", diagnostic.message, diagnostic.kind, diagnostic.count);
        } else {
            info!("{}", diagnostic.message);
        }
        self.records.push(diagnostic);
    }
}

/// Sink that drops everything, for callers that do not care.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl DiagnosticSink for Discard {
    fn report(&mut self, _diagnostic: Diagnostic) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_kind() {
        let mut log = DiagnosticLog::new();
        log.report(Diagnostic::new(DiagnosticKind::CollisionsRemoved, 3, "3 collisions"));
        log.report(Diagnostic::new(DiagnosticKind::OutliersRemoved, 1, "1 outlier"));
        log.report(Diagnostic::new(DiagnosticKind::CollisionsRemoved, 2, "2 collisions"));
        assert_eq!(log.count_of(DiagnosticKind::CollisionsRemoved), 5);
        assert!(log.has(DiagnosticKind::OutliersRemoved));
        assert!(!log.has(DiagnosticKind::ExpansionClamped));
        assert_eq!(log.records().len(), 3);
    }
}
