pub mod config;
pub mod error;
pub mod plan;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{GenoflowError, Result};
pub use plan::{Plan, Schedule, Step, StepAction, StepKind};
pub use types::*;
