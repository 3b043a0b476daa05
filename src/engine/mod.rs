mod error;
mod fallback;
mod orchestrator;
mod planner;
mod priority;
mod signer_guard;
mod signing;
mod state;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{ExitOptions, ExitOrchestrator, OrchestratorSettings};
pub use planner::Planner;
pub use priority::FeeEscalation;
pub use signing::{KeypairSigner, SigningPath};
pub use state::{OrchestratorState, RunPhase, RunSummary};
pub use types::{DraftTransaction, ExitTask};
