//! Helpers to build static analysis tools based on
//! [abstract interpretation](https://en.wikipedia.org/wiki/Abstract_interpretation).
//! The building blocks are
//! [control flow graph](https://en.wikipedia.org/wiki/Control-flow_graph)
//! traits, [lattice](https://en.wikipedia.org/wiki/Lattice_(order)) traits
//! with a bit set lattice and its dual, a worklist solver for monotone
//! transfer functions, and the condensation of a graph into its strongly
//! connected components to schedule bottom-up interprocedural work.
//!
//! Some resources to learn more about abstract interpretation:
//! * [Static Program Analysis, Anders Møller and Michael I. Schwartzbach](https://cs.au.dk/~amoeller/spa/)
//! * [Data flow analysis: an informal introduction](https://clang.llvm.org/docs/DataFlowAnalysisIntro.html)
//! * [RacerD: Compositional Static Race Detection](https://dl.acm.org/doi/10.1145/3276514)

/// Traits for defining a control flow graph, and the traversal orders the
/// solvers rely on.
pub mod cfg;

/// Lattice traits and the set lattices used by must and may analyses.
pub mod domains;

/// Strongly connected components of directed graphs.
pub mod graphs;

/// Fixed-point iteration over a control flow graph using a worklist.
pub mod solvers;
