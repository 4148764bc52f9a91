use std::collections::{BTreeMap, HashMap, HashSet};

use analysis::cfg::{CfgBlock, ControlFlowGraph};
use analysis::solvers::SolverError;
use rayon::prelude::*;
use serde::Serialize;

use crate::access::extract;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Note};
use crate::hierarchy::ClassHierarchy;
use crate::ir::{MethodId, MethodRecord, OpKind, Program};
use crate::lockset::LockSetTracker;
use crate::races::{Finding, RaceCollector};
use crate::summary::{CallGraph, MethodFacts, SummaryBuilder, SummaryStore};
use crate::thread::ThreadClassifier;

/// Everything an analysis run reports, sorted for stable output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub findings: Vec<Finding>,
    pub notes: Vec<Note>,
}

/// Structural checks a method has to pass before it is analyzed.
fn validate(method: &MethodRecord, known: &HashSet<MethodId>) -> Result<(), AnalysisError> {
    let blocks = method.cfg.blocks();
    if blocks.is_empty() {
        return Err(AnalysisError::EmptyCfg { method: method.id });
    }
    for (block_id, block) in blocks.iter().enumerate() {
        if let Some(&target) = block.successors().iter().find(|&&s| s >= blocks.len()) {
            return Err(AnalysisError::MissingBlock {
                method: method.id,
                block: block_id,
                target,
            });
        }
        for op in block.operations() {
            if let OpKind::Call { callee, .. } = op.kind {
                if !known.contains(&callee) {
                    return Err(AnalysisError::DanglingCall {
                        method: method.id,
                        callee,
                        line: op.line,
                    });
                }
            }
        }
    }
    Ok(())
}

struct Prepared {
    facts: MethodFacts,
    notes: Vec<Note>,
}

/// State of one analysis run over a program: the per-method facts and the
/// call graph between them. Summaries are computed by [`Session::run`].
pub struct Session<'p> {
    config: AnalysisConfig,
    hierarchy: ClassHierarchy<'p>,
    names: HashMap<MethodId, String>,
    facts: BTreeMap<MethodId, MethodFacts>,
    graph: CallGraph,
    notes: Vec<Note>,
}

impl<'p> Session<'p> {
    pub fn new(program: &'p Program, config: &AnalysisConfig) -> Self {
        let mut notes = Vec::new();
        let mut unique: Vec<&'p MethodRecord> = Vec::new();
        let mut known = HashSet::new();
        for method in &program.methods {
            if known.insert(method.id) {
                unique.push(method);
            } else {
                let error = AnalysisError::DuplicateMethod { method: method.id };
                tracing::warn!(method = %method.qualified_name(), %error, "method rejected");
                notes.push(Note::incomplete(method.id, &method.qualified_name(), &error));
            }
        }
        let names: HashMap<MethodId, String> = unique
            .iter()
            .map(|method| (method.id, method.qualified_name()))
            .collect();

        let mut accepted = Vec::new();
        for &method in &unique {
            match validate(method, &known) {
                Ok(()) => accepted.push(method),
                Err(error) => {
                    tracing::warn!(method = %names[&method.id], %error, "method rejected");
                    notes.push(Note::incomplete(method.id, &names[&method.id], &error));
                }
            }
        }

        let hierarchy = ClassHierarchy::new(&program.classes, unique.iter().copied());
        let classifier = ThreadClassifier::new(&hierarchy);
        let tracker = LockSetTracker {
            budget: config.per_method_budget,
        };
        let prepared: Vec<Prepared> = accepted
            .par_iter()
            .map(|method| Self::prepare(method, &classifier, tracker))
            .collect();

        let mut facts = BTreeMap::new();
        for item in prepared {
            notes.extend(item.notes);
            facts.insert(item.facts.method, item.facts);
        }
        let graph = CallGraph::new(&facts);
        tracing::debug!(
            methods = facts.len(),
            components = graph.condensation().components().len(),
            "call graph built"
        );

        Self {
            config: config.clone(),
            hierarchy,
            names,
            facts,
            graph,
            notes,
        }
    }

    /// Extraction, lock tracking and thread classification of one method.
    fn prepare(
        method: &MethodRecord,
        classifier: &ThreadClassifier<'_, '_>,
        tracker: LockSetTracker,
    ) -> Prepared {
        let name = method.qualified_name();
        let extraction = extract(method);
        let mut notes: Vec<Note> = extraction
            .skipped
            .iter()
            .map(|skipped| Note::skipped_access(&name, skipped))
            .collect();

        let (tagged, degraded) = match tracker.track(method, &extraction) {
            Ok(tagged) => (tagged, false),
            Err(SolverError::StepLimit { limit }) => {
                let error = AnalysisError::BudgetExceeded {
                    method: method.id,
                    limit,
                };
                tracing::warn!(method = %name, %error, "falling back to empty lock sets");
                notes.push(Note::budget_exceeded(&name, &error));
                (LockSetTracker::untracked(&extraction), true)
            }
        };

        Prepared {
            facts: MethodFacts {
                method: method.id,
                thread: classifier.classify(method),
                tagged,
                degraded,
            },
            notes,
        }
    }

    pub fn facts(&self) -> &BTreeMap<MethodId, MethodFacts> {
        &self.facts
    }

    /// The condensed call graph in graphviz format.
    pub fn print_call_graph(&self) -> String {
        self.graph.print(|method| {
            self.names
                .get(&method)
                .cloned()
                .unwrap_or_else(|| method.to_string())
        })
    }

    /// Summarize every method and collect the races of every class.
    pub fn run(&self) -> AnalysisReport {
        let store = SummaryStore::new();
        let builder = SummaryBuilder::new(
            &self.facts,
            &self.graph,
            &store,
            self.config.max_fixpoint_rounds,
        );
        builder.build_all();

        let mut notes = self.notes.clone();
        for component in 0..self.graph.condensation().components().len() {
            if let Err(error) = builder.component(component).as_ref() {
                for method in error.methods() {
                    notes.push(Note::incomplete(method, &self.names[&method], error));
                }
            }
        }

        let collector = RaceCollector::new(
            &self.hierarchy,
            self.config.strict_thread_context,
            self.config.min_confidence,
        );
        let findings = collector.collect(|method| builder.summary(method));
        notes.sort();
        tracing::info!(
            methods = self.facts.len(),
            findings = findings.len(),
            notes = notes.len(),
            "analysis finished"
        );
        AnalysisReport { findings, notes }
    }
}

/// Analyze a whole program. Identical inputs give identical reports.
pub fn analyze(program: &Program, config: &AnalysisConfig) -> AnalysisReport {
    Session::new(program, config).run()
}
