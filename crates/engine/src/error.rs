//! Failures the engine itself can raise, as distinct from a failed
//! execution (which is a normal, successful [`crate::EngineOutcome`]
//! with `status: Failed` — not an `Err`).

use flowrunner_node::NodeBuildError;
use flowrunner_workflow::NodeKey;
use thiserror::Error;

/// Raised only when the engine cannot even attempt to run a flow:
/// compiling node instances from the graph failed, or the compiled
/// flow and the graph it was built from have drifted apart. A
/// validated [`flowrunner_workflow::Graph`] makes the second case
/// unreachable in practice; it is kept as a named variant rather than
/// a `panic!`/`unreachable!` so a caller sees a `Result`, not a crash,
/// if that invariant is ever violated.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to build node instances for the graph: {0}")]
    Build(#[from] NodeBuildError),

    #[error("node {0:?} is present in the graph but missing from the compiled flow")]
    MissingCompiledNode(NodeKey),
}
