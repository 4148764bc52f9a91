use core::cmp::Reverse;
use core::fmt::Display;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::access::{AccessKind, AccessPath, Location};
use crate::hierarchy::ClassHierarchy;
use crate::ir::{MethodId, MethodRecord};
use crate::summary::{AccessEvent, MethodSummary};
use crate::thread::ThreadContext;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Confidence {
    #[default]
    Low,
    High,
}

impl Display for Confidence {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Two accesses to the same path that may happen at the same time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaceCandidate {
    pub path: AccessPath,
    pub first: AccessEvent,
    pub second: AccessEvent,
    pub confidence: Confidence,
}

impl RaceCandidate {
    fn new(a: &AccessEvent, b: &AccessEvent) -> Self {
        let (first, second) = if (a.location, a.kind) <= (b.location, b.kind) {
            (a, b)
        } else {
            (b, a)
        };
        let confidence = if first.thread == ThreadContext::BackgroundReachable
            && second.thread == ThreadContext::BackgroundReachable
        {
            Confidence::High
        } else {
            Confidence::Low
        };
        Self {
            path: first.path.clone(),
            first: first.clone(),
            second: second.clone(),
            confidence,
        }
    }

    fn is_write_write(&self) -> bool {
        self.first.kind.is_write() && self.second.kind.is_write()
    }

    /// Smaller is a better representative for a group of duplicates.
    fn rank(&self) -> (Reverse<Confidence>, bool, Location, Location) {
        (
            Reverse(self.confidence),
            !self.is_write_write(),
            self.first.location,
            self.second.location,
        )
    }
}

/// Whether two accesses to the same path race: one of them writes, they may
/// run in parallel and no lock is held by both.
pub fn conflicts(a: &AccessEvent, b: &AccessEvent, strict: bool) -> bool {
    (a.kind.is_write() || b.kind.is_write())
        && a.thread.may_run_in_parallel(b.thread, strict)
        && a.locks.is_disjoint(&b.locks)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FindingKind {
    RaceCandidate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub kind: FindingKind,
    pub class: String,
    pub access_path: AccessPath,
    pub location_a: Location,
    pub location_b: Location,
    pub kind_a: AccessKind,
    pub kind_b: AccessKind,
    pub method_a: MethodId,
    pub method_b: MethodId,
    pub confidence: Confidence,
    pub message: String,
}

impl Display for Finding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}: {} ({} confidence)",
            self.class, self.message, self.confidence
        )
    }
}

/// Pairs up the accesses of the methods each class exposes.
pub struct RaceCollector<'a, 'p> {
    hierarchy: &'a ClassHierarchy<'p>,
    methods: HashMap<MethodId, &'p MethodRecord>,
    strict: bool,
    min_confidence: Confidence,
}

impl<'a, 'p> RaceCollector<'a, 'p> {
    pub fn new(
        hierarchy: &'a ClassHierarchy<'p>,
        strict: bool,
        min_confidence: Confidence,
    ) -> Self {
        let methods = hierarchy
            .class_names()
            .flat_map(|class| hierarchy.declared_methods(class).iter().copied())
            .map(|method| (method.id, method))
            .collect();
        Self {
            hierarchy,
            methods,
            strict,
            min_confidence,
        }
    }

    /// Findings sorted by class, path and locations. A path and a pair of
    /// methods are reported once, on the class with the fewest ancestors
    /// among those exposing both methods, by name on ties.
    pub fn collect(
        &self,
        summary_of: impl Fn(MethodId) -> Option<Arc<MethodSummary>>,
    ) -> Vec<Finding> {
        let mut best: BTreeMap<(AccessPath, MethodId, MethodId), (&'p str, RaceCandidate)> =
            BTreeMap::new();
        for class in self.hierarchy.class_names() {
            let summaries: Vec<Arc<MethodSummary>> = self
                .hierarchy
                .visible_methods(class)
                .into_iter()
                .filter(|method| method.is_reporting_root())
                .filter_map(|method| summary_of(method.id))
                .collect();

            let mut by_path: BTreeMap<&AccessPath, Vec<&AccessEvent>> = BTreeMap::new();
            for event in summaries.iter().flat_map(|s| s.accesses.iter()) {
                by_path.entry(&event.path).or_default().push(event);
            }

            for (path, events) in by_path {
                for (i, a) in events.iter().enumerate() {
                    for b in &events[i..] {
                        if !conflicts(a, b, self.strict) {
                            continue;
                        }
                        let candidate = RaceCandidate::new(a, b);
                        let key = (path.clone(), a.owner.min(b.owner), a.owner.max(b.owner));
                        let better = best.get(&key).is_none_or(|(kept_class, kept)| {
                            (candidate.rank(), self.hierarchy.ancestors(class).len())
                                < (kept.rank(), self.hierarchy.ancestors(kept_class).len())
                        });
                        if better {
                            best.insert(key, (class, candidate));
                        }
                    }
                }
            }
        }

        let mut findings: Vec<Finding> = best
            .into_values()
            .filter(|(_, candidate)| candidate.confidence >= self.min_confidence)
            .map(|(class, candidate)| self.finding(class, candidate))
            .collect();
        findings.sort_by(|x, y| {
            (&x.class, &x.access_path, x.location_a, x.location_b).cmp(&(
                &y.class,
                &y.access_path,
                y.location_a,
                y.location_b,
            ))
        });
        tracing::debug!(findings = findings.len(), "collected race candidates");
        findings
    }

    fn method_name(&self, method: MethodId) -> String {
        self.methods
            .get(&method)
            .map_or_else(|| method.to_string(), |m| m.qualified_name())
    }

    fn describe(&self, event: &AccessEvent) -> String {
        let verb = match event.kind {
            AccessKind::Read => "reads",
            AccessKind::Write => "writes",
        };
        let mut text = format!(
            "`{}` {verb} it on line {}",
            self.method_name(event.owner),
            event.location.line
        );
        if let Some(via) = event.via {
            text.push_str(&format!(" via `{}`", self.method_name(via)));
        }
        if !event.locks.is_empty() {
            text.push_str(&format!(" holding {}", event.locks));
        }
        text
    }

    fn finding(&self, class: &str, candidate: RaceCandidate) -> Finding {
        let title = if candidate.is_write_write() {
            "Unprotected write"
        } else {
            "Read/Write race"
        };
        let message = format!(
            "{title} on `{}`: {}, {}",
            candidate.path,
            self.describe(&candidate.first),
            self.describe(&candidate.second)
        );
        Finding {
            kind: FindingKind::RaceCandidate,
            class: class.to_owned(),
            access_path: candidate.path,
            location_a: candidate.first.location,
            location_b: candidate.second.location,
            kind_a: candidate.first.kind,
            kind_b: candidate.second.kind,
            method_a: candidate.first.owner,
            method_b: candidate.second.owner,
            confidence: candidate.confidence,
            message,
        }
    }
}

#[cfg(test)]
mod races_tests;
