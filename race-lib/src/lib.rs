//! Compositional lock-set race detection in the style of
//! [RacerD](https://dl.acm.org/doi/10.1145/3276514).
//!
//! Every method is analyzed on its own: field accesses are extracted from
//! its control flow graph, tagged with the locks held on every path to them
//! and with the threads the method may run on. Summaries then propagate the
//! accesses of callees into their callers, bottom-up over the call graph.
//! Finally the accesses reachable from the methods each class exposes are
//! paired up, and pairs that may run in parallel without a common lock are
//! reported.

/// Canonical access paths and the accesses of a method.
pub mod access;

pub mod config;

/// Errors and the notes they turn into.
pub mod error;

/// Class hierarchy and the capabilities classes inherit.
pub mod hierarchy;

/// Input format produced by front-ends.
pub mod ir;

/// Locks held at each access of a method.
pub mod lockset;

pub mod pipeline;

/// Pairing accesses into race findings.
pub mod races;

/// Method summaries, bottom-up over the call graph.
pub mod summary;

/// Thread contexts of methods.
pub mod thread;

pub use config::AnalysisConfig;
pub use pipeline::{AnalysisReport, Session, analyze};

#[cfg(test)]
mod test_utils;
