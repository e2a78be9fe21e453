mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;
mod worker_loop;

#[cfg(test)]
mod tests;

pub use orchestrator::{WorkerDependencies, WorkerOrchestrator};
pub use state::ComponentRegistry;
pub use types::{ComponentState, ShutdownReason};
pub use worker_loop::{LoopSettings, TickOutcome, WorkerLoop};
