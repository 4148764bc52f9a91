use core::hash::Hash;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use analysis::domains::JoinSemiLattice;
use analysis::graphs::Condensation;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use rayon::prelude::*;

use crate::access::{AccessKind, AccessPath, Location};
use crate::error::AnalysisError;
use crate::ir::MethodId;
use crate::lockset::{LockSet, TaggedMethod};
use crate::thread::ThreadContext;

/// A heap access a method performs, either directly or through a call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccessEvent {
    pub path: AccessPath,
    pub kind: AccessKind,
    /// Locks held on every path to the access.
    pub locks: LockSet,
    /// The access itself, or the call site it happens through.
    pub location: Location,
    pub thread: ThreadContext,
    /// The method whose summary holds the event.
    pub owner: MethodId,
    /// The callee invoked at `location` for propagated events.
    pub via: Option<MethodId>,
}

impl AccessEvent {
    pub fn may_run_on_background_thread(&self, strict: bool) -> bool {
        self.thread.is_concurrent(strict)
    }
}

type EventKey = (AccessPath, AccessKind, Location, ThreadContext);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSummary {
    pub method: MethodId,
    /// Sorted by path, kind, location and thread context, with at most one
    /// event for each such combination.
    pub accesses: Vec<AccessEvent>,
    pub thread_context: ThreadContext,
    /// Lock tracking gave up on the method itself.
    pub degraded: bool,
}

impl MethodSummary {
    pub fn empty(facts: &MethodFacts) -> Self {
        Self {
            method: facts.method,
            accesses: Vec::new(),
            thread_context: facts.thread,
            degraded: facts.degraded,
        }
    }
}

/// Events collected for one summary. Events with the same key keep the
/// locks common to all of them.
struct SummaryState {
    events: BTreeMap<EventKey, (LockSet, Option<MethodId>)>,
}

impl SummaryState {
    fn new() -> Self {
        Self {
            events: BTreeMap::new(),
        }
    }

    fn add(&mut self, key: EventKey, locks: LockSet, via: Option<MethodId>) {
        self.events
            .entry(key)
            .and_modify(|(held, _)| *held = held.intersection(&locks))
            .or_insert((locks, via));
    }

    fn finish(self, facts: &MethodFacts, thread_context: ThreadContext) -> MethodSummary {
        let accesses = self
            .events
            .into_iter()
            .map(|((path, kind, location, thread), (locks, via))| AccessEvent {
                path,
                kind,
                locks,
                location,
                thread,
                owner: facts.method,
                via,
            })
            .collect();
        MethodSummary {
            method: facts.method,
            accesses,
            thread_context,
            degraded: facts.degraded,
        }
    }
}

/// Everything known about a method before looking at its callers or
/// callees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodFacts {
    pub method: MethodId,
    /// Thread context derived from annotations only.
    pub thread: ThreadContext,
    pub tagged: TaggedMethod,
    pub degraded: bool,
}

/// Concurrency-safe cache computing each value at most once. Concurrent
/// requests for a missing key wait for the first one to finish.
pub struct MemoStore<K, V> {
    cells: DashMap<K, Arc<OnceCell<Arc<V>>>>,
}

impl<K: Eq + Hash + Clone, V> Default for MemoStore<K, V> {
    fn default() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> MemoStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&self, key: K, compute: impl FnOnce() -> V) -> Arc<V> {
        // The map guard must not be held while computing, the computation
        // may ask for other keys.
        let cell = self.cells.entry(key).or_default().clone();
        cell.get_or_init(|| Arc::new(compute())).clone()
    }

    /// Finished values only, never blocks.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.cells.iter().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The call graph between methods that have facts, condensed into its
/// strongly connected components.
#[derive(Clone, Debug)]
pub struct CallGraph {
    methods: Vec<MethodId>,
    index: HashMap<MethodId, usize>,
    condensation: Condensation,
}

impl CallGraph {
    /// Calls to methods without facts are left out.
    pub fn new(facts: &BTreeMap<MethodId, MethodFacts>) -> Self {
        let methods: Vec<MethodId> = facts.keys().copied().collect();
        let index: HashMap<MethodId, usize> =
            methods.iter().enumerate().map(|(i, &m)| (m, i)).collect();
        let edges: Vec<(usize, usize)> = facts
            .values()
            .flat_map(|f| {
                let from = index[&f.method];
                f.tagged
                    .calls
                    .iter()
                    .filter_map(|call| index.get(&call.call.callee))
                    .map(move |&to| (from, to))
                    .collect::<Vec<_>>()
            })
            .collect();
        let condensation = Condensation::new(methods.len(), edges);
        Self {
            methods,
            index,
            condensation,
        }
    }

    pub fn component_of(&self, method: MethodId) -> Option<usize> {
        self.index
            .get(&method)
            .map(|&node| self.condensation.component_of(node))
    }

    /// Members of a component in ascending id order.
    pub fn members(&self, component: usize) -> Vec<MethodId> {
        self.condensation.components()[component]
            .iter()
            .map(|&node| self.methods[node])
            .collect()
    }

    pub fn condensation(&self) -> &Condensation {
        &self.condensation
    }

    /// Render the condensed call graph in graphviz format.
    pub fn print(&self, name: impl Fn(MethodId) -> String) -> String {
        self.condensation.print(|node| name(self.methods[node]))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentSummaries {
    pub summaries: BTreeMap<MethodId, Arc<MethodSummary>>,
    /// Rounds the component needed, one for components without recursion.
    pub rounds: usize,
}

pub type ComponentOutcome = Result<ComponentSummaries, AnalysisError>;

/// Members of a recursive component ordered so that callees come before
/// their callers wherever the cycle allows it: the post order of a depth
/// first walk starting from the smallest id.
fn callee_first<'f>(facts: &[&'f MethodFacts]) -> Vec<&'f MethodFacts> {
    let position: HashMap<MethodId, usize> = facts
        .iter()
        .enumerate()
        .map(|(i, f)| (f.method, i))
        .collect();
    let callees: Vec<Vec<usize>> = facts
        .iter()
        .map(|f| {
            f.tagged
                .calls
                .iter()
                .filter_map(|call| position.get(&call.call.callee).copied())
                .collect()
        })
        .collect();

    let mut visited = vec![false; facts.len()];
    let mut order = Vec::with_capacity(facts.len());
    for root in 0..facts.len() {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack = vec![(root, 0_usize)];
        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            match callees[node].get(next) {
                Some(&callee) => {
                    top.1 += 1;
                    if !visited[callee] {
                        visited[callee] = true;
                        stack.push((callee, 0));
                    }
                }
                None => {
                    stack.pop();
                    order.push(facts[node]);
                }
            }
        }
    }
    order
}

/// Per-run store of finished components, keyed by component number.
pub type SummaryStore = MemoStore<usize, ComponentOutcome>;

/// Computes method summaries bottom-up over the call graph. Summaries of a
/// component are only published once all of its members are final.
pub struct SummaryBuilder<'a> {
    facts: &'a BTreeMap<MethodId, MethodFacts>,
    graph: &'a CallGraph,
    store: &'a SummaryStore,
    max_rounds: Option<usize>,
}

impl<'a> SummaryBuilder<'a> {
    pub fn new(
        facts: &'a BTreeMap<MethodId, MethodFacts>,
        graph: &'a CallGraph,
        store: &'a SummaryStore,
        max_rounds: Option<usize>,
    ) -> Self {
        Self {
            facts,
            graph,
            store,
            max_rounds,
        }
    }

    /// Summarize every component, level by level. Components on the same
    /// level are independent and run in parallel.
    pub fn build_all(&self) {
        for (level, components) in self.graph.condensation().levels().iter().enumerate() {
            tracing::debug!(level, components = components.len(), "summarizing level");
            components.par_iter().for_each(|&component| {
                self.component(component);
            });
        }
    }

    /// The outcome of a component, computing it and its callees on demand.
    pub fn component(&self, component: usize) -> Arc<ComponentOutcome> {
        self.store
            .get_or_compute(component, || self.compute_component(component))
    }

    pub fn summary(&self, method: MethodId) -> Option<Arc<MethodSummary>> {
        let component = self.graph.component_of(method)?;
        let outcome = self.component(component);
        let Ok(finished) = outcome.as_ref() else {
            return None;
        };
        finished.summaries.get(&method).cloned()
    }

    fn compute_component(&self, component: usize) -> ComponentOutcome {
        let members = self.graph.members(component);
        let facts: Vec<&MethodFacts> = members
            .iter()
            .filter_map(|method| self.facts.get(method))
            .collect();

        if !self.graph.condensation().is_cyclic(component) {
            let summaries = facts
                .iter()
                .map(|f| (f.method, Arc::new(self.summarize(f, &BTreeMap::new()))))
                .collect();
            return Ok(ComponentSummaries {
                summaries,
                rounds: 1,
            });
        }

        let facts = callee_first(&facts);
        let cap = self
            .max_rounds
            .unwrap_or_else(|| self.iteration_cap(&facts));
        let mut current: BTreeMap<MethodId, Arc<MethodSummary>> = facts
            .iter()
            .map(|f| (f.method, Arc::new(MethodSummary::empty(f))))
            .collect();
        let mut rounds = 0;
        loop {
            if rounds >= cap {
                tracing::warn!(?members, rounds, "recursive methods did not stabilize");
                return Err(AnalysisError::NonConvergent { members, rounds });
            }
            rounds += 1;
            let mut changed = false;
            for f in &facts {
                let next = self.summarize(f, &current);
                if current.get(&f.method).map(|s| s.as_ref()) != Some(&next) {
                    current.insert(f.method, Arc::new(next));
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        tracing::debug!(?members, rounds, "recursive methods stabilized");
        Ok(ComponentSummaries {
            summaries: current,
            rounds,
        })
    }

    /// Summary of one method given the summaries of the other members of its
    /// component. Callees outside the component are final already.
    fn summarize(
        &self,
        facts: &MethodFacts,
        current: &BTreeMap<MethodId, Arc<MethodSummary>>,
    ) -> MethodSummary {
        let mut state = SummaryState::new();
        for tagged in &facts.tagged.accesses {
            let access = &tagged.access;
            state.add(
                (access.path.clone(), access.kind, access.location, facts.thread),
                tagged.locks.clone(),
                None,
            );
        }

        let mut thread_context = facts.thread;
        for call in &facts.tagged.calls {
            let callee = call.call.callee;
            let Some(summary) = current
                .get(&callee)
                .cloned()
                .or_else(|| self.summary(callee))
            else {
                continue;
            };
            thread_context = thread_context.join(&summary.thread_context, &());
            for event in &summary.accesses {
                state.add(
                    (
                        event.path.clone(),
                        event.kind,
                        call.call.location,
                        facts.thread.join(&event.thread, &()),
                    ),
                    event.locks.union(&call.locks),
                    Some(callee),
                );
            }
        }
        state.finish(facts, thread_context)
    }

    /// Height of the summary lattice of a component plus a confirming round.
    /// Every round that changes something climbs at least one step.
    fn iteration_cap(&self, facts: &[&MethodFacts]) -> usize {
        let members: BTreeSet<MethodId> = facts.iter().map(|f| f.method).collect();
        let mut paths = BTreeSet::new();
        let mut locks = BTreeSet::new();
        let mut locations = 0_usize;
        for f in facts {
            locations += f.tagged.accesses.len() + f.tagged.calls.len();
            for tagged in &f.tagged.accesses {
                paths.insert(tagged.access.path.clone());
                locks.extend(tagged.locks.iter().cloned());
            }
            for call in &f.tagged.calls {
                locks.extend(call.locks.iter().cloned());
                if members.contains(&call.call.callee) {
                    continue;
                }
                let Some(summary) = self.summary(call.call.callee) else {
                    continue;
                };
                for event in &summary.accesses {
                    paths.insert(event.path.clone());
                    locks.extend(event.locks.iter().cloned());
                }
            }
        }
        let keys = paths
            .len()
            .saturating_mul(2)
            .saturating_mul(locations)
            .saturating_mul(3);
        keys.saturating_mul(locks.len() + 2)
            .saturating_add(members.len().saturating_mul(2))
            .saturating_add(1)
    }

    /// Rounds taken by every finished component, in component order.
    pub fn rounds(&self) -> Vec<(Vec<MethodId>, usize)> {
        (0..self.graph.condensation().components().len())
            .filter_map(|component| {
                let outcome = self.store.get(&component)?;
                let Ok(finished) = outcome.as_ref() else {
                    return None;
                };
                Some((self.graph.members(component), finished.rounds))
            })
            .collect()
    }
}
