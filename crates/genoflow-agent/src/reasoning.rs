use std::sync::Arc;

use tracing::{debug, warn};

use genoflow_core::plan::{Plan, Step};
use genoflow_core::traits::ReasoningOracle;
use genoflow_core::types::{ChatMessage, JsonMap};

use crate::state::{clip, display_value};

const REACT_PROMPT: &str = "You are an expert bioinformatics agent executing a genomic analysis workflow.

Current Plan:
{plan_summary}

Completed Steps: {completed_steps}

Current Step: {current_step}

Previous Results:
{previous_results}

Your task:
1. THOUGHT: Reason about what needs to be done for the current step
2. ACTION: Specify how to execute this step
3. Wait for OBSERVATION of the result
4. If successful, move to next step. If failed, reason about how to fix it.

Provide your response in this format:

THOUGHT: [Your reasoning about the current step]
ACTION: [What action to take]

Be specific and biological. Consider:
- Are the genomic coordinates valid?
- Is the file format correct?
- What biological meaning do the results have?
";

/// A parsed THOUGHT/ACTION note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reasoning {
    pub thought: String,
    pub action: String,
}

/// Non-binding per-step commentary from the oracle.
///
/// Kept apart from dispatch: a failed reflection is logged and dropped, and
/// never affects whether or how the step runs.
pub struct Reasoner {
    oracle: Arc<dyn ReasoningOracle>,
    clip_chars: usize,
}

impl Reasoner {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, clip_chars: usize) -> Self {
        Self { oracle, clip_chars }
    }

    pub async fn reflect(
        &self,
        plan: &Plan,
        completed: &[String],
        step: &Step,
        results: &JsonMap,
    ) -> Option<Reasoning> {
        let prompt = build_prompt(plan, completed, step, results, self.clip_chars);
        match self.oracle.complete(vec![ChatMessage::user(prompt)]).await {
            Ok(completion) => {
                debug!(step_id = %step.id, reasoning = %completion.content, "Agent reasoning");
                Some(parse_reasoning(&completion.content))
            }
            Err(e) => {
                warn!(step_id = %step.id, error = %e, "Reasoning failed, proceeding with execution");
                None
            }
        }
    }
}

fn format_results(results: &JsonMap, clip_chars: usize) -> String {
    if results.is_empty() {
        return "No previous results".to_string();
    }
    results
        .iter()
        .map(|(key, value)| {
            let text = display_value(value);
            let clipped = clip(&text, clip_chars);
            if clipped.len() < text.len() {
                format!("- {}: {}...", key, clipped)
            } else {
                format!("- {}: {}", key, text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(
    plan: &Plan,
    completed: &[String],
    step: &Step,
    results: &JsonMap,
    clip_chars: usize,
) -> String {
    let completed = if completed.is_empty() {
        "None".to_string()
    } else {
        completed.join(", ")
    };

    REACT_PROMPT
        .replacen("{plan_summary}", &plan.summary(), 1)
        .replacen("{completed_steps}", &completed, 1)
        .replacen("{current_step}", &format!("{}: {}", step.id, step.description), 1)
        .replacen("{previous_results}", &format_results(results, clip_chars), 1)
}

/// Split `THOUGHT:` and `ACTION:` sections; continuation lines are joined
/// with spaces.
pub fn parse_reasoning(text: &str) -> Reasoning {
    let mut parsed = Reasoning::default();
    let mut in_action: Option<bool> = None;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("THOUGHT:") {
            parsed.thought = rest.trim().to_string();
            in_action = Some(false);
        } else if let Some(rest) = line.strip_prefix("ACTION:") {
            parsed.action = rest.trim().to_string();
            in_action = Some(true);
        } else if let (Some(action), false) = (in_action, line.is_empty()) {
            let section = if action {
                &mut parsed.action
            } else {
                &mut parsed.thought
            };
            section.push(' ');
            section.push_str(line);
        }
    }
    parsed
}
