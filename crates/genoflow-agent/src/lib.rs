pub mod agent;
pub mod dispatcher;
pub mod execution;
pub mod planner;
pub mod reasoning;
pub mod report;
pub mod state;

pub use agent::{AnalysisAgent, AnalysisAgentBuilder};
pub use dispatcher::{resolve_parameters, resolve_value, Dispatcher};
pub use execution::{ExecutionLoop, RunOutcome, RunStatus};
pub use planner::Planner;
pub use reasoning::{Reasoner, Reasoning};
pub use state::{ConversationState, HistoryEntry};
