use std::fmt;

use serde::Serialize;

/// Which ranking a rendered prototype belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RankingScope {
    /// `most_activated_prototypes/`
    Global,
    /// `class_prototypes/top-<rank>_class/`
    Class { rank: usize, class: usize },
}

impl fmt::Display for RankingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("most activated prototypes"),
            Self::Class { rank, class } => write!(f, "prototypes of top-{rank} class ({class})"),
        }
    }
}

/// Milestones of one analysis run, for progress display and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisEvent {
    AlignmentChecked {
        aligned: usize,
        total: usize,
    },
    InferenceFinished {
        predicted_class: usize,
        correct_class: usize,
    },
    RankingStarted {
        scope: RankingScope,
        prototypes: usize,
    },
    PrototypeRendered {
        scope: RankingScope,
        rank: usize,
        prototype: usize,
    },
    RankingFinished {
        scope: RankingScope,
    },
    Finished {
        correct: bool,
    },
}

impl fmt::Display for AnalysisEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AnalysisEvent::*;
        match self {
            AlignmentChecked { aligned, total } => {
                write!(f, "AlignmentChecked {aligned}/{total}")
            }
            InferenceFinished {
                predicted_class,
                correct_class,
            } => write!(
                f,
                "InferenceFinished predicted={predicted_class} correct={correct_class}"
            ),
            RankingStarted { scope, prototypes } => {
                write!(f, "RankingStarted {scope} prototypes={prototypes}")
            }
            PrototypeRendered {
                scope,
                rank,
                prototype,
            } => write!(f, "PrototypeRendered {scope} top-{rank} prototype={prototype}"),
            RankingFinished { scope } => write!(f, "RankingFinished {scope}"),
            Finished { correct } => write!(f, "Finished correct={correct}"),
        }
    }
}

/// Receives [`AnalysisEvent`]s as the run progresses. The default
/// implementation ignores them.
pub trait AnalysisObserver: Send + Sync {
    fn on_event(&self, _event: &AnalysisEvent) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl AnalysisObserver for NoopObserver {}
