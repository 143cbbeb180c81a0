use std::sync::Arc;

use tracing::{debug, error, info, warn};

use genoflow_core::config::AgentConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::plan::Plan;
use genoflow_core::traits::ReasoningOracle;
use genoflow_core::types::ChatMessage;

use crate::state::{clip, display_value, ConversationState};

const PLANNING_PROMPT: &str = r#"You are an expert bioinformatics workflow planner. Your job is to decompose
a natural language query into a series of executable steps.

Available step types:
- tool_execution: Execute a bioinformatics tool (samtools_view, samtools_stats, samtools_index)
- file_parsing: Parse and extract information from genomic files (VCF, FASTQ, SAM, BAM)
- data_validation: Validate genomic coordinates or variants
- knowledge_query: Query reference databases (Ensembl)
- result_aggregation: Combine and summarize results

Given a query, create a detailed workflow plan. For each step, specify:
1. A unique step_id (step_1, step_2, etc.)
2. The step_type
3. A clear description
4. The tool_name (if tool_execution)
5. Required parameters; a string value "${key}" refers to the output of an earlier step
6. Dependencies (which steps must complete first)

Query: {query}

Context: {context}

Create a JSON workflow plan with the following structure:
{
    "steps": [
        {
            "step_id": "step_1",
            "step_type": "file_parsing",
            "description": "Parse the VCF file to understand its structure",
            "parameters": {"file_path": "sample.vcf"},
            "depends_on": [],
            "output_key": "vcf_metadata"
        },
        ...
    ]
}

Be specific about parameters and ensure steps are in logical order."#;

/// Turns a goal into a [`Plan`] by asking the oracle, falling back to
/// [`Plan::fallback`] on any failure.
pub struct Planner {
    oracle: Arc<dyn ReasoningOracle>,
    history_window: usize,
    clip_chars: usize,
}

impl Planner {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, config: &AgentConfig) -> Self {
        Self {
            oracle,
            history_window: config.history_window,
            clip_chars: config.message_clip_chars,
        }
    }

    /// Never fails; planning errors produce the fallback plan.
    pub async fn plan(&self, goal: &str, state: &ConversationState) -> Plan {
        info!(goal = %goal, "Planning workflow");
        match self.request_plan(goal, state).await {
            Ok(plan) => {
                info!(steps = plan.len(), outcome = "success", "Created plan");
                plan
            }
            Err(e) => {
                error!(error = %e, "Planning failed");
                warn!("Using fallback plan");
                Plan::fallback(goal)
            }
        }
    }

    async fn request_plan(&self, goal: &str, state: &ConversationState) -> Result<Plan> {
        let prompt = build_prompt(goal, &self.context_summary(state));
        let completion = self.oracle.complete(vec![ChatMessage::user(prompt)]).await?;

        let body = extract_json(&completion.content);
        let payload = serde_json::from_str(body).map_err(|e| {
            debug!(response = %body, "Unparseable plan response");
            GenoflowError::Planning(format!("invalid plan JSON: {}", e))
        })?;
        Plan::from_wire(goal, payload)
    }

    /// Context key/values and the recent conversation, clipped.
    pub fn context_summary(&self, state: &ConversationState) -> String {
        let mut parts = Vec::new();

        if !state.context().is_empty() {
            parts.push("Context:".to_string());
            for (key, value) in state.context() {
                parts.push(format!("  {}: {}", key, display_value(value)));
            }
        }

        if !state.messages().is_empty() {
            parts.push("\nRecent conversation:".to_string());
            for msg in state.recent_messages(self.history_window) {
                parts.push(format!(
                    "  {}: {}...",
                    msg.role,
                    clip(&msg.content, self.clip_chars)
                ));
            }
        }

        if parts.is_empty() {
            "No prior context".to_string()
        } else {
            parts.join("\n")
        }
    }
}

/// Fill the planning template with the goal and context summary.
pub fn build_prompt(goal: &str, context: &str) -> String {
    let (head, tail) = PLANNING_PROMPT
        .split_once("{query}")
        .unwrap_or((PLANNING_PROMPT, ""));
    let (middle, rest) = tail.split_once("{context}").unwrap_or((tail, ""));
    format!("{}{}{}{}{}", head, goal, middle, context, rest)
}

/// The JSON payload of an oracle reply: a `json` fence wins, then the first
/// plain fence, then the whole trimmed text.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        return fenced(&trimmed[start + 7..]);
    }
    if let Some(start) = trimmed.find("```") {
        return fenced(&trimmed[start + 3..]);
    }
    trimmed
}

fn fenced(after_open: &str) -> &str {
    match after_open.find("```") {
        Some(end) => after_open[..end].trim(),
        None => after_open.trim(),
    }
}
