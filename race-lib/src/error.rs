use core::fmt::Display;

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::access::SkippedAccess;
use crate::ir::MethodId;

/// Reasons a method gets no summary, or only a degraded one.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("method {method} has no basic blocks")]
    EmptyCfg { method: MethodId },
    #[error("block {block} of method {method} jumps to missing block {target}")]
    MissingBlock {
        method: MethodId,
        block: usize,
        target: usize,
    },
    #[error("method {method} calls unknown method {callee} on line {line}")]
    DanglingCall {
        method: MethodId,
        callee: MethodId,
        line: u32,
    },
    #[error("method id {method} is declared more than once")]
    DuplicateMethod { method: MethodId },
    #[error(
        "summaries of {} did not stabilize within {rounds} rounds",
        .members.iter().join(", ")
    )]
    NonConvergent {
        members: Vec<MethodId>,
        rounds: usize,
    },
    #[error("lock tracking of method {method} exceeded {limit} block visits")]
    BudgetExceeded { method: MethodId, limit: usize },
}

impl AnalysisError {
    /// The methods that lose their summary because of this error.
    pub fn methods(&self) -> Vec<MethodId> {
        match self {
            AnalysisError::EmptyCfg { method }
            | AnalysisError::MissingBlock { method, .. }
            | AnalysisError::DanglingCall { method, .. }
            | AnalysisError::DuplicateMethod { method }
            | AnalysisError::BudgetExceeded { method, .. } => vec![*method],
            AnalysisError::NonConvergent { members, .. } => members.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum NoteKind {
    SkippedAccess,
    BudgetExceeded,
    AnalysisIncomplete,
}

/// Diagnostics about the analysis itself, reported next to the findings.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MethodId>,
    pub severity: Severity,
    pub kind: NoteKind,
    pub message: String,
}

impl Note {
    pub fn skipped_access(method_name: &str, skipped: &SkippedAccess) -> Self {
        Self {
            method: Some(skipped.location.method),
            severity: Severity::Info,
            kind: NoteKind::SkippedAccess,
            message: format!(
                "{method_name}: access to `{}` on line {} is ignored, {}",
                skipped.expr, skipped.location.line, skipped.reason
            ),
        }
    }

    pub fn budget_exceeded(method_name: &str, error: &AnalysisError) -> Self {
        Self {
            method: error.methods().first().copied(),
            severity: Severity::Warning,
            kind: NoteKind::BudgetExceeded,
            message: format!("{method_name}: {error}, no locks are assumed to be held"),
        }
    }

    pub fn incomplete(method: MethodId, method_name: &str, error: &AnalysisError) -> Self {
        Self {
            method: Some(method),
            severity: Severity::Warning,
            kind: NoteKind::AnalysisIncomplete,
            message: format!("{method_name}: analysis incomplete, {error}"),
        }
    }
}

impl Display for Note {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let severity = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
        };
        write!(f, "{severity}: {}", self.message)
    }
}
