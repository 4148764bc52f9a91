use core::fmt::Write;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// The strongly connected components of a directed graph over the nodes
/// `0..n`, collapsed into a DAG.
///
/// Components are numbered in reverse topological order: every edge leaving
/// a component points to a component with a smaller number. For call graphs
/// this means callees come before their callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condensation {
    components: Vec<Vec<usize>>,
    component_of: Vec<usize>,
    successors: Vec<Vec<usize>>,
    cyclic: Vec<bool>,
    levels: Vec<Vec<usize>>,
}

impl Condensation {
    pub fn new(node_count: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut graph = DiGraph::<(), ()>::with_capacity(node_count, 0);
        for _ in 0..node_count {
            graph.add_node(());
        }
        let edges: Vec<_> = edges.into_iter().collect();
        for &(from, to) in &edges {
            graph.add_edge(NodeIndex::new(from), NodeIndex::new(to), ());
        }

        let mut components: Vec<Vec<usize>> = tarjan_scc(&graph)
            .into_iter()
            .map(|scc| {
                let mut members: Vec<_> = scc.into_iter().map(NodeIndex::index).collect();
                members.sort_unstable();
                members
            })
            .collect();
        components.shrink_to_fit();

        let mut component_of = vec![0; node_count];
        for (id, members) in components.iter().enumerate() {
            for &node in members {
                component_of[node] = id;
            }
        }

        let mut successors = vec![Vec::new(); components.len()];
        let mut cyclic: Vec<bool> = components.iter().map(|m| m.len() > 1).collect();
        for &(from, to) in &edges {
            let (from, to) = (component_of[from], component_of[to]);
            if from == to {
                cyclic[from] = true;
            } else {
                successors[from].push(to);
            }
        }
        for succs in &mut successors {
            succs.sort_unstable();
            succs.dedup();
        }

        // Successors always have smaller numbers, one pass is enough.
        let mut level_of = vec![0_usize; components.len()];
        let mut levels: Vec<Vec<usize>> = Vec::new();
        for id in 0..components.len() {
            let level = successors[id]
                .iter()
                .map(|&succ| level_of[succ] + 1)
                .max()
                .unwrap_or(0);
            level_of[id] = level;
            if levels.len() <= level {
                levels.resize(level + 1, Vec::new());
            }
            levels[level].push(id);
        }

        Self {
            components,
            component_of,
            successors,
            cyclic,
            levels,
        }
    }

    pub fn components(&self) -> &[Vec<usize>] {
        &self.components
    }

    pub fn component_of(&self, node: usize) -> usize {
        self.component_of[node]
    }

    pub fn successors(&self, component: usize) -> &[usize] {
        &self.successors[component]
    }

    /// A component is cyclic when it has more than one member or a node
    /// with an edge to itself.
    pub fn is_cyclic(&self, component: usize) -> bool {
        self.cyclic[component]
    }

    /// Components grouped by their height in the DAG. Components of the same
    /// level never reach each other, and every successor of a component is on
    /// an earlier level.
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    /// Render the DAG in graphviz format.
    pub fn print(&self, label: impl Fn(usize) -> String) -> String {
        let mut output = "digraph Condensation {\n".to_owned();
        for (id, members) in self.components.iter().enumerate() {
            let names: Vec<_> = members.iter().map(|&m| label(m)).collect();
            let _ = writeln!(output, "  Scc_{id}[label=\"{}\"]", names.join("\\n"));
        }
        output.push('\n');
        for (id, succs) in self.successors.iter().enumerate() {
            for succ in succs {
                let _ = writeln!(output, "  Scc_{id} -> Scc_{succ}");
            }
        }
        output.push_str("}\n");
        output
    }
}
