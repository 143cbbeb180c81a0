use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use genoflow_core::plan::{Plan, Schedule};
use genoflow_core::types::JsonMap;

use crate::dispatcher::Dispatcher;
use crate::reasoning::Reasoner;
use crate::report;
use crate::state::ConversationState;

/// Terminal state of one plan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every step completed.
    Succeeded,
    /// A step returned a failed result; nothing after it ran.
    FailedAtStep {
        step_id: String,
        description: String,
        error: String,
    },
    /// The iteration cap was hit before the scheduler reported the plan done.
    IterationLimitReached { completed: usize, total: usize },
    /// Steps remain but none has its dependencies satisfied.
    Blocked { pending: Vec<String> },
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Completed step ids in execution order.
    pub completed: Vec<String>,
    /// Outputs stored under their steps' `output_key`, in insertion order.
    pub results: JsonMap,
    pub iterations: usize,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn report(&self, plan: &Plan) -> String {
        report::render(plan, self)
    }
}

/// Drives a [`Plan`] to a terminal [`RunStatus`], one step at a time.
///
/// Steps run strictly sequentially in scheduling order. The loop owns the
/// completed set and the result map for the duration of a run.
pub struct ExecutionLoop {
    dispatcher: Dispatcher,
    reasoner: Option<Reasoner>,
    max_iterations: usize,
}

impl ExecutionLoop {
    pub fn new(dispatcher: Dispatcher, reasoner: Option<Reasoner>, max_iterations: usize) -> Self {
        Self {
            dispatcher,
            reasoner,
            max_iterations,
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run `plan` to completion, failure, blockage or the iteration cap.
    ///
    /// Never fails: every step-level error ends up in the returned status.
    pub async fn run(&self, plan: &Plan, state: &mut ConversationState) -> RunOutcome {
        let start = Instant::now();
        let mut done: HashSet<String> = HashSet::with_capacity(plan.len());
        let mut completed: Vec<String> = Vec::with_capacity(plan.len());
        let mut results = JsonMap::new();
        let mut iterations = 0usize;

        info!(
            goal = %plan.goal(),
            steps = plan.len(),
            max_iterations = self.max_iterations,
            "Starting execution"
        );

        let status = loop {
            if iterations >= self.max_iterations {
                warn!(
                    completed = completed.len(),
                    total = plan.len(),
                    "Max iterations reached"
                );
                break RunStatus::IterationLimitReached {
                    completed: completed.len(),
                    total: plan.len(),
                };
            }
            iterations += 1;

            let step = match plan.schedule(&done) {
                Schedule::Done => break RunStatus::Succeeded,
                Schedule::Blocked { pending } => {
                    warn!(pending = ?pending, "No runnable step, dependencies unsatisfiable");
                    break RunStatus::Blocked {
                        pending: pending.into_iter().map(String::from).collect(),
                    };
                }
                Schedule::Ready(step) => step,
            };

            debug!(iteration = iterations, step_id = %step.id, "Iteration");

            if let Some(reasoner) = &self.reasoner {
                reasoner.reflect(plan, &completed, step, &results).await;
            }

            let result = self.dispatcher.execute_step(step, &results).await;
            if !result.success {
                let message = result
                    .error
                    .unwrap_or_else(|| "step failed without an error message".to_string());
                error!(step_id = %step.id, error = %message, "Step failed");
                state.add_error(format!("Step {} failed: {}", step.id, message));
                break RunStatus::FailedAtStep {
                    step_id: step.id.clone(),
                    description: step.description.clone(),
                    error: message,
                };
            }

            info!(step_id = %step.id, outcome = "success", "Step completed");
            if let Some(key) = &step.output_key {
                results.insert(key.clone(), result.output.clone());
                state.add_intermediate_result(key.clone(), result.output);
            }
            done.insert(step.id.clone());
            completed.push(step.id.clone());
        };

        info!(
            status = ?status,
            iterations,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Execution finished"
        );

        RunOutcome {
            status,
            completed,
            results,
            iterations,
        }
    }
}
