use serde::{Deserialize, Serialize};

use crate::races::Confidence;

/// Knobs of one analysis run. Missing fields take their default value when
/// deserialized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Only code known to run in the background counts as concurrent.
    pub strict_thread_context: bool,
    /// Block visits the lock tracker may spend on one method.
    pub per_method_budget: Option<usize>,
    pub min_confidence: Confidence,
    /// Rounds a recursive component may take before it is given up,
    /// `None` to derive the limit from the size of the component.
    pub max_fixpoint_rounds: Option<usize>,
}
